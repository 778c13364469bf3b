//! crates/chain_tutor_core/src/alerts.rs
//!
//! The scam-alert feed: two independent fetch slots (system and user credential)
//! publishing into one wholesale-replaced alert list.

use crate::context::{AiContext, ClientHandle, ClientStatus};
use crate::cooldown::Cooldown;
use crate::domain::{AlertRecord, CredentialSlot, Notification};
use crate::error::IngestError;
use crate::interpreter::{build_alerts_request, parse_alerts};
use crate::ports::{GenerateRequest, NotificationSink};
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{error, info};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("A fetch is already running for this slot")]
    Busy,
    #[error("Slot not ready: {0}")]
    NotReady(IngestError),
}

/// Per-slot fetch state.
#[derive(Debug, Clone, Default)]
struct FetchSlot {
    loading: bool,
    cooldown: Cooldown,
    has_fetched_once: bool,
    last_error: Option<String>,
    status_message: String,
}

/// Serializable snapshot of a fetch slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotView {
    pub loading: bool,
    pub rate_limited: bool,
    pub cooldown_remaining_secs: Option<u64>,
    pub has_fetched_once: bool,
    pub last_error: Option<String>,
    pub status_message: String,
    pub button_label: String,
}

/// A started fetch, runnable without holding the feed.
#[derive(Debug, Clone)]
pub struct FetchTicket {
    pub slot: CredentialSlot,
    pub handle: ClientHandle,
    pub request: GenerateRequest,
}

impl FetchTicket {
    pub async fn run(&self) -> Result<Vec<AlertRecord>, IngestError> {
        let response = self.handle.service().generate(self.request.clone()).await?;
        parse_alerts(&response)
    }
}

pub struct AlertFeed {
    model: String,
    cooldown_length: Duration,
    alerts: Vec<AlertRecord>,
    system: FetchSlot,
    user: FetchSlot,
}

impl AlertFeed {
    pub fn new(model: impl Into<String>, cooldown_length: Duration) -> Self {
        Self {
            model: model.into(),
            cooldown_length,
            alerts: Vec::new(),
            system: FetchSlot {
                status_message: "Nhấn nút để tải cảnh báo bằng API hệ thống.".to_string(),
                ..FetchSlot::default()
            },
            user: FetchSlot {
                status_message: "Bạn có thể nhập API Key cá nhân để sử dụng.".to_string(),
                ..FetchSlot::default()
            },
        }
    }

    pub fn alerts(&self) -> &[AlertRecord] {
        &self.alerts
    }

    fn slot(&self, slot: CredentialSlot) -> &FetchSlot {
        match slot {
            CredentialSlot::System => &self.system,
            CredentialSlot::User => &self.user,
        }
    }

    fn slot_mut(&mut self, slot: CredentialSlot) -> &mut FetchSlot {
        match slot {
            CredentialSlot::System => &mut self.system,
            CredentialSlot::User => &mut self.user,
        }
    }

    pub fn view(&self, slot: CredentialSlot, now: Instant) -> SlotView {
        let state = self.slot(slot);
        let remaining = state.cooldown.remaining(now);
        SlotView {
            loading: state.loading,
            rate_limited: remaining.is_some(),
            cooldown_remaining_secs: remaining.map(|d| d.as_secs().max(1)),
            has_fetched_once: state.has_fetched_once,
            last_error: state.last_error.clone(),
            status_message: state.status_message.clone(),
            button_label: button_label(slot, state, remaining.is_some()),
        }
    }

    /// Reflects a client (re)build or removal in the slot's status line.
    ///
    /// `Missing` on the user slot means the stored key was just cleared.
    pub fn on_client_changed(&mut self, slot: CredentialSlot, status: &ClientStatus) {
        let state = self.slot_mut(slot);
        match (slot, status) {
            (CredentialSlot::System, ClientStatus::Ready(_)) => {
                state.last_error = None;
                state.status_message = "API hệ thống sẵn sàng tải cảnh báo.".to_string();
            }
            (CredentialSlot::User, ClientStatus::Ready(_)) => {
                state.last_error = None;
                state.status_message = "API Key của bạn hợp lệ và đã sẵn sàng.".to_string();
            }
            (_, ClientStatus::Failed(reason)) => {
                let message = IngestError::ClientInitialization(reason.clone()).user_message(slot);
                state.last_error = Some(message.clone());
                state.status_message = message;
            }
            (CredentialSlot::System, ClientStatus::Missing) => {
                let message = "API Key hệ thống chưa được cấu hình.".to_string();
                state.last_error = Some(message.clone());
                state.status_message = message;
            }
            (CredentialSlot::User, ClientStatus::Missing) => {
                state.last_error = None;
                state.status_message =
                    "API Key của bạn đã được xóa. Bạn có thể nhập key mới.".to_string();
            }
        }
    }

    /// A blank key was submitted for the user slot; the client is left as it was.
    pub fn on_blank_user_credential(&mut self) {
        self.user.status_message = "API Key không được để trống.".to_string();
    }

    /// Marks the slot loading and returns the request to run.
    ///
    /// The cooldown is advisory and does not block this call.
    pub fn begin_fetch(
        &mut self,
        ctx: &AiContext,
        slot: CredentialSlot,
        notifier: &dyn NotificationSink,
    ) -> Result<FetchTicket, FetchError> {
        if self.slot(slot).loading {
            return Err(FetchError::Busy);
        }

        let handle = match ctx.client(slot) {
            Ok(handle) => handle,
            Err(e) => {
                let message = e.user_message(slot);
                let state = self.slot_mut(slot);
                state.last_error = Some(message.clone());
                state.status_message = message.clone();
                notifier.notify(Notification::error(message));
                return Err(FetchError::NotReady(e));
            }
        };

        let state = self.slot_mut(slot);
        state.loading = true;
        state.last_error = None;
        state.status_message = format!("Đang tải cảnh báo (API {})...", slot.label());
        info!(%slot, "Fetching scam alerts.");

        Ok(FetchTicket {
            slot,
            handle,
            request: build_alerts_request(&self.model),
        })
    }

    /// Applies a fetch result. Success replaces the list wholesale; failure leaves it untouched.
    pub fn complete_fetch(
        &mut self,
        slot: CredentialSlot,
        result: Result<Vec<AlertRecord>, IngestError>,
        now: Instant,
        notifier: &dyn NotificationSink,
    ) {
        let cooldown_length = self.cooldown_length;
        match result {
            Ok(records) => {
                let count = records.len();
                self.alerts = records;
                let state = self.slot_mut(slot);
                state.loading = false;
                state.has_fetched_once = true;
                state.last_error = None;
                if count > 0 {
                    state.status_message =
                        format!("Cảnh báo đã được cập nhật (API {}).", slot.label());
                    notifier.notify(
                        Notification::success(format!(
                            "Đã tải cảnh báo mới nhất (API {})!",
                            slot.label()
                        ))
                        .with_duration(2000),
                    );
                } else {
                    state.status_message = format!("Không có cảnh báo mới (API {}).", slot.label());
                    notifier.notify(
                        Notification::info("Không có cảnh báo mới nào được tìm thấy.")
                            .with_duration(2000),
                    );
                }
                info!(%slot, count, "Scam alerts replaced.");
            }
            Err(e) => {
                error!(%slot, kind = e.kind(), "Failed to fetch scam alerts: {}", e);
                let message = e.user_message(slot);
                let state = self.slot_mut(slot);
                state.loading = false;
                if matches!(e, IngestError::RateLimited(_)) {
                    state.cooldown.start(now, cooldown_length);
                }
                state.last_error = Some(message.clone());
                state.status_message = message.clone();
                notifier.notify(Notification::error(message).with_duration(5000));
            }
        }
    }

    /// Runs a whole fetch for callers that own the feed exclusively.
    pub async fn refresh(
        &mut self,
        ctx: &AiContext,
        slot: CredentialSlot,
        notifier: &dyn NotificationSink,
    ) -> Result<(), FetchError> {
        let ticket = self.begin_fetch(ctx, slot, notifier)?;
        let result = ticket.run().await;
        self.complete_fetch(slot, result, Instant::now(), notifier);
        Ok(())
    }
}

fn button_label(slot: CredentialSlot, state: &FetchSlot, rate_limited: bool) -> String {
    if state.loading {
        return "Đang tải...".to_string();
    }
    if rate_limited {
        return "Thử lại sau...".to_string();
    }
    let label = match (slot, state.has_fetched_once) {
        (CredentialSlot::System, false) => "Tải Cảnh Báo (Hệ Thống)",
        (CredentialSlot::System, true) => "Làm Mới Cảnh Báo (Hệ Thống)",
        (CredentialSlot::User, false) => "Tải Bằng Key Của Bạn",
        (CredentialSlot::User, true) => "Làm Mới Cảnh Báo (Key Của Bạn)",
    };
    label.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::RecordingSink;
    use crate::domain::{Credential, NotificationKind};
    use crate::ports::{
        ClientFactory, GenerateResponse, GenerativeModelService, PortError, PortResult,
    };
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    /// Returns queued results in order.
    struct QueueModel(Arc<Mutex<Vec<PortResult<GenerateResponse>>>>);

    #[async_trait]
    impl GenerativeModelService for QueueModel {
        async fn generate(&self, _request: GenerateRequest) -> PortResult<GenerateResponse> {
            self.0.lock().unwrap().remove(0)
        }
    }

    struct QueueFactory(Arc<Mutex<Vec<PortResult<GenerateResponse>>>>);

    impl ClientFactory for QueueFactory {
        fn build(&self, _credential: &Credential) -> PortResult<Arc<dyn GenerativeModelService>> {
            Ok(Arc::new(QueueModel(self.0.clone())))
        }
    }

    fn text(body: &str) -> PortResult<GenerateResponse> {
        Ok(GenerateResponse {
            text: Some(body.to_string()),
            grounding: None,
        })
    }

    fn setup(results: Vec<PortResult<GenerateResponse>>) -> (AiContext, AlertFeed) {
        let factory = QueueFactory(Arc::new(Mutex::new(results)));
        (
            AiContext::new(Arc::new(factory), Some("sys")),
            AlertFeed::new("gemini-2.5-flash", Duration::from_secs(60)),
        )
    }

    const TWO_ALERTS: &str = r#"```json
[{"tieuDeCanhBao": "A", "moTaChiTiet": "a", "dauHieuNhanBiet": [], "cachPhongTranh": [], "ngayCapNhat": "01/01/2025"},
 {"tieuDeCanhBao": "B", "moTaChiTiet": "b", "dauHieuNhanBiet": [], "cachPhongTranh": [], "ngayCapNhat": "01/01/2025"}]
```"#;

    #[tokio::test]
    async fn success_replaces_the_list() {
        let (ctx, mut feed) = setup(vec![text(TWO_ALERTS), text(r#"[{"tieuDeCanhBao": "C"}]"#)]);
        let sink = RecordingSink::default();

        feed.refresh(&ctx, CredentialSlot::System, &sink).await.unwrap();
        assert_eq!(feed.alerts().len(), 2);

        feed.refresh(&ctx, CredentialSlot::System, &sink).await.unwrap();
        assert_eq!(feed.alerts().len(), 1);
        assert_eq!(feed.alerts()[0].title, "C");

        let view = feed.view(CredentialSlot::System, Instant::now());
        assert!(view.has_fetched_once);
        assert_eq!(view.button_label, "Làm Mới Cảnh Báo (Hệ Thống)");
    }

    #[tokio::test]
    async fn shape_error_leaves_list_unchanged() {
        let (ctx, mut feed) = setup(vec![text(TWO_ALERTS), text(r#"{"not": "an array"}"#)]);
        let sink = RecordingSink::default();

        feed.refresh(&ctx, CredentialSlot::System, &sink).await.unwrap();
        let before = feed.alerts().to_vec();
        feed.refresh(&ctx, CredentialSlot::System, &sink).await.unwrap();

        assert_eq!(feed.alerts(), before.as_slice());
        let view = feed.view(CredentialSlot::System, Instant::now());
        assert!(view.last_error.is_some());
        assert!(!view.loading);
    }

    #[tokio::test]
    async fn empty_array_replaces_and_informs() {
        let (ctx, mut feed) = setup(vec![text(TWO_ALERTS), text("[]")]);
        let sink = RecordingSink::default();

        feed.refresh(&ctx, CredentialSlot::System, &sink).await.unwrap();
        feed.refresh(&ctx, CredentialSlot::System, &sink).await.unwrap();

        assert!(feed.alerts().is_empty());
        let last = sink.0.lock().unwrap().last().cloned().unwrap();
        assert_eq!(last.kind, NotificationKind::Info);
    }

    #[tokio::test]
    async fn rate_limit_sets_advisory_cooldown() {
        let (ctx, mut feed) = setup(vec![
            Err(PortError::Provider {
                status: Some("RESOURCE_EXHAUSTED".into()),
                message: "Quota exceeded".into(),
            }),
            text("[]"),
        ]);
        let sink = RecordingSink::default();

        let ticket = feed.begin_fetch(&ctx, CredentialSlot::System, &sink).unwrap();
        let result = ticket.run().await;
        let t0 = Instant::now();
        feed.complete_fetch(CredentialSlot::System, result, t0, &sink);

        let view = feed.view(CredentialSlot::System, t0);
        assert!(view.rate_limited);
        assert_eq!(view.button_label, "Thử lại sau...");
        assert!(!feed.view(CredentialSlot::System, t0 + Duration::from_secs(60)).rate_limited);

        // Programmatic retries are not blocked by the cooldown.
        assert!(feed.begin_fetch(&ctx, CredentialSlot::System, &sink).is_ok());
    }

    #[test]
    fn user_slot_without_credential_is_not_ready() {
        let (ctx, mut feed) = setup(vec![]);
        let sink = RecordingSink::default();

        let err = feed.begin_fetch(&ctx, CredentialSlot::User, &sink).unwrap_err();
        assert_eq!(err, FetchError::NotReady(IngestError::CredentialMissing));
        let view = feed.view(CredentialSlot::User, Instant::now());
        assert!(!view.loading);
        assert_eq!(
            view.last_error.as_deref(),
            Some("API Key của bạn chưa sẵn sàng hoặc không hợp lệ.")
        );
    }

    #[test]
    fn client_changes_update_the_status_line() {
        let (mut ctx, mut feed) = setup(vec![]);
        let now = Instant::now();

        feed.on_client_changed(CredentialSlot::System, ctx.status(CredentialSlot::System));
        assert_eq!(
            feed.view(CredentialSlot::System, now).status_message,
            "API hệ thống sẵn sàng tải cảnh báo."
        );

        ctx.obtain_client(CredentialSlot::User, &Credential::new("u").unwrap())
            .unwrap();
        feed.on_client_changed(CredentialSlot::User, ctx.status(CredentialSlot::User));
        let view = feed.view(CredentialSlot::User, now);
        assert_eq!(view.status_message, "API Key của bạn hợp lệ và đã sẵn sàng.");
        assert_eq!(view.last_error, None);

        feed.on_client_changed(
            CredentialSlot::User,
            &ClientStatus::Failed("bad header".into()),
        );
        let view = feed.view(CredentialSlot::User, now);
        assert_eq!(
            view.status_message,
            "Lỗi khởi tạo API Key của bạn: bad header. Key có thể không hợp lệ."
        );
        assert_eq!(view.last_error.as_deref(), Some(view.status_message.as_str()));

        feed.on_client_changed(CredentialSlot::User, &ClientStatus::Missing);
        let view = feed.view(CredentialSlot::User, now);
        assert!(view.status_message.contains("đã được xóa"));
        assert_eq!(view.last_error, None);

        feed.on_blank_user_credential();
        assert_eq!(
            feed.view(CredentialSlot::User, now).status_message,
            "API Key không được để trống."
        );
    }

    #[test]
    fn missing_system_key_is_reported_on_the_slot() {
        let mut feed = AlertFeed::new("gemini-2.5-flash", Duration::from_secs(60));
        feed.on_client_changed(CredentialSlot::System, &ClientStatus::Missing);
        let view = feed.view(CredentialSlot::System, Instant::now());
        assert_eq!(view.status_message, "API Key hệ thống chưa được cấu hình.");
        assert!(view.last_error.is_some());
    }

    #[test]
    fn slots_are_independent_and_gated() {
        let (mut ctx, mut feed) = setup(vec![]);
        ctx.obtain_client(CredentialSlot::User, &Credential::new("u").unwrap())
            .unwrap();
        let sink = RecordingSink::default();

        let _system = feed.begin_fetch(&ctx, CredentialSlot::System, &sink).unwrap();
        assert_eq!(
            feed.begin_fetch(&ctx, CredentialSlot::System, &sink).unwrap_err(),
            FetchError::Busy
        );
        assert!(feed.begin_fetch(&ctx, CredentialSlot::User, &sink).is_ok());
        assert_eq!(
            feed.view(CredentialSlot::User, Instant::now()).button_label,
            "Đang tải..."
        );
    }
}
