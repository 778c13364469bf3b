//! crates/chain_tutor_core/src/context.rs
//!
//! The AI context: one client slot per credential source, passed explicitly to
//! the assistant and the alert feed instead of living in process-wide globals.

use crate::domain::{Credential, CredentialSlot, Notification};
use crate::error::IngestError;
use crate::ports::{
    ClientFactory, CredentialStore, GenerativeModelService, NotificationSink, PortResult,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

/// A live client built from one credential.
///
/// `generation` increases every time a slot is rebuilt, so a handle taken
/// before a credential change can be told apart from the current one.
#[derive(Clone)]
pub struct ClientHandle {
    pub slot: CredentialSlot,
    pub generation: u64,
    service: Arc<dyn GenerativeModelService>,
}

impl ClientHandle {
    pub fn service(&self) -> &Arc<dyn GenerativeModelService> {
        &self.service
    }
}

impl std::fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientHandle")
            .field("slot", &self.slot)
            .field("generation", &self.generation)
            .finish()
    }
}

/// What a slot currently holds.
#[derive(Clone, Debug)]
pub enum ClientStatus {
    Missing,
    Ready(ClientHandle),
    Failed(String),
}

impl ClientStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, ClientStatus::Ready(_))
    }
}

/// Serializable view of a slot for status endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SlotReport {
    Missing,
    Ready,
    Failed { reason: String },
}

impl From<&ClientStatus> for SlotReport {
    fn from(status: &ClientStatus) -> Self {
        match status {
            ClientStatus::Missing => SlotReport::Missing,
            ClientStatus::Ready(_) => SlotReport::Ready,
            ClientStatus::Failed(reason) => SlotReport::Failed {
                reason: reason.clone(),
            },
        }
    }
}

pub struct AiContext {
    factory: Arc<dyn ClientFactory>,
    system: ClientStatus,
    user: ClientStatus,
    generation: u64,
}

impl AiContext {
    /// Creates a context and builds the system client once, if a credential is configured.
    pub fn new(factory: Arc<dyn ClientFactory>, system_credential: Option<&str>) -> Self {
        let mut ctx = Self {
            factory,
            system: ClientStatus::Missing,
            user: ClientStatus::Missing,
            generation: 0,
        };
        match system_credential.and_then(Credential::new) {
            Some(credential) => {
                // Failure is recorded in the slot; callers read it back through `client`.
                let _ = ctx.obtain_client(CredentialSlot::System, &credential);
            }
            None => warn!("No system credential configured; system client unavailable."),
        }
        ctx
    }

    /// Builds a client for `slot`, replacing whatever the slot held before.
    pub fn obtain_client(
        &mut self,
        slot: CredentialSlot,
        credential: &Credential,
    ) -> Result<ClientHandle, IngestError> {
        self.generation += 1;
        let generation = self.generation;

        let (status, result) = match self.factory.build(credential) {
            Ok(service) => {
                let handle = ClientHandle {
                    slot,
                    generation,
                    service,
                };
                info!(%slot, generation, "AI client initialized.");
                (ClientStatus::Ready(handle.clone()), Ok(handle))
            }
            Err(e) => {
                error!(%slot, "Failed to initialize AI client: {}", e);
                let reason = e.to_string();
                (
                    ClientStatus::Failed(reason.clone()),
                    Err(IngestError::ClientInitialization(reason)),
                )
            }
        };
        *self.slot_mut(slot) = status;
        result
    }

    /// Returns the live handle, or the not-ready error without touching the network.
    pub fn client(&self, slot: CredentialSlot) -> Result<ClientHandle, IngestError> {
        match self.status(slot) {
            ClientStatus::Ready(handle) => Ok(handle.clone()),
            ClientStatus::Failed(reason) => Err(IngestError::ClientInitialization(reason.clone())),
            ClientStatus::Missing => Err(IngestError::CredentialMissing),
        }
    }

    pub fn status(&self, slot: CredentialSlot) -> &ClientStatus {
        match slot {
            CredentialSlot::System => &self.system,
            CredentialSlot::User => &self.user,
        }
    }

    /// Whether `handle` still belongs to the slot's current client.
    pub fn is_current(&self, handle: &ClientHandle) -> bool {
        matches!(self.status(handle.slot), ClientStatus::Ready(h) if h.generation == handle.generation)
    }

    fn slot_mut(&mut self, slot: CredentialSlot) -> &mut ClientStatus {
        match slot {
            CredentialSlot::System => &mut self.system,
            CredentialSlot::User => &mut self.user,
        }
    }

    //=====================================================================================
    // User Credential Lifecycle
    //=====================================================================================

    /// Restores the user client from the store at startup.
    pub async fn restore_user_credential(&mut self, store: &dyn CredentialStore) -> PortResult<bool> {
        match store.load().await?.and_then(Credential::new) {
            Some(credential) => {
                let _ = self.obtain_client(CredentialSlot::User, &credential);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Persists and activates a user credential.
    ///
    /// A blank credential is rejected before anything is written.
    pub async fn save_user_credential(
        &mut self,
        raw: &str,
        store: &dyn CredentialStore,
        notifier: &dyn NotificationSink,
    ) -> Result<ClientHandle, IngestError> {
        let Some(credential) = Credential::new(raw) else {
            notifier.notify(Notification::error("Vui lòng nhập API Key."));
            return Err(IngestError::CredentialMissing);
        };

        store
            .save(credential.expose())
            .await
            .map_err(|e| IngestError::Unknown(e.to_string()))?;

        match self.obtain_client(CredentialSlot::User, &credential) {
            Ok(handle) => {
                notifier.notify(Notification::success(
                    "API Key của bạn đã được xác thực thành công!",
                ));
                Ok(handle)
            }
            Err(e) => {
                notifier.notify(Notification::error(e.user_message(CredentialSlot::User)));
                Err(e)
            }
        }
    }

    /// Removes the stored user credential and drops its client.
    pub async fn clear_user_credential(
        &mut self,
        store: &dyn CredentialStore,
        notifier: &dyn NotificationSink,
    ) -> PortResult<()> {
        store.clear().await?;
        self.user = ClientStatus::Missing;
        self.generation += 1;
        notifier.notify(Notification::info("Đã xóa API Key cá nhân."));
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ports::{GenerateRequest, GenerateResponse, PortError};
    use async_trait::async_trait;
    use std::sync::Mutex;

    pub struct NullModel;

    #[async_trait]
    impl GenerativeModelService for NullModel {
        async fn generate(&self, _request: GenerateRequest) -> PortResult<GenerateResponse> {
            Ok(GenerateResponse::default())
        }
    }

    /// Rejects credentials containing whitespace, the way an HTTP header would.
    pub struct StrictFactory;

    impl ClientFactory for StrictFactory {
        fn build(&self, credential: &Credential) -> PortResult<Arc<dyn GenerativeModelService>> {
            if credential.expose().chars().any(char::is_whitespace) {
                return Err(PortError::Unexpected("credential is not a valid header value".into()));
            }
            Ok(Arc::new(NullModel))
        }
    }

    #[derive(Default)]
    pub struct MemoryStore(pub Mutex<Option<String>>);

    #[async_trait]
    impl CredentialStore for MemoryStore {
        async fn load(&self) -> PortResult<Option<String>> {
            Ok(self.0.lock().unwrap().clone())
        }
        async fn save(&self, credential: &str) -> PortResult<()> {
            *self.0.lock().unwrap() = Some(credential.to_string());
            Ok(())
        }
        async fn clear(&self) -> PortResult<()> {
            *self.0.lock().unwrap() = None;
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct RecordingSink(pub Mutex<Vec<Notification>>);

    impl NotificationSink for RecordingSink {
        fn notify(&self, notification: Notification) {
            self.0.lock().unwrap().push(notification);
        }
    }

    #[test]
    fn system_slot_is_built_at_startup() {
        let ctx = AiContext::new(Arc::new(StrictFactory), Some("sys-key"));
        assert!(ctx.status(CredentialSlot::System).is_ready());
        assert!(matches!(ctx.status(CredentialSlot::User), ClientStatus::Missing));
    }

    #[test]
    fn missing_system_credential_short_circuits() {
        let ctx = AiContext::new(Arc::new(StrictFactory), Some("   "));
        assert_eq!(
            ctx.client(CredentialSlot::System).unwrap_err(),
            IngestError::CredentialMissing
        );
    }

    #[test]
    fn rejected_credential_reports_initialization_error() {
        let mut ctx = AiContext::new(Arc::new(StrictFactory), None);
        let bad = Credential::new("bad key").unwrap();
        let err = ctx.obtain_client(CredentialSlot::User, &bad).unwrap_err();
        assert!(matches!(err, IngestError::ClientInitialization(_)));
        assert!(ctx.client(CredentialSlot::User).unwrap_err().is_not_ready());
    }

    #[test]
    fn rebuilding_replaces_the_handle() {
        let mut ctx = AiContext::new(Arc::new(StrictFactory), None);
        let first = ctx
            .obtain_client(CredentialSlot::User, &Credential::new("k1").unwrap())
            .unwrap();
        let second = ctx
            .obtain_client(CredentialSlot::User, &Credential::new("k2").unwrap())
            .unwrap();
        assert!(!ctx.is_current(&first));
        assert!(ctx.is_current(&second));
    }

    #[tokio::test]
    async fn clear_then_reenter_classifies_identically() {
        let store = MemoryStore::default();
        let sink = RecordingSink::default();

        for raw in ["good-key", "bad key"] {
            let mut ctx = AiContext::new(Arc::new(StrictFactory), None);
            let before = ctx.save_user_credential(raw, &store, &sink).await.is_ok();
            ctx.clear_user_credential(&store, &sink).await.unwrap();
            assert_eq!(store.load().await.unwrap(), None);
            assert!(matches!(ctx.status(CredentialSlot::User), ClientStatus::Missing));
            let after = ctx.save_user_credential(raw, &store, &sink).await.is_ok();
            assert_eq!(before, after, "classification changed for {raw:?}");
        }
    }

    #[tokio::test]
    async fn blank_user_credential_is_not_persisted() {
        let store = MemoryStore::default();
        let sink = RecordingSink::default();
        let mut ctx = AiContext::new(Arc::new(StrictFactory), None);

        let err = ctx.save_user_credential("  ", &store, &sink).await.unwrap_err();
        assert_eq!(err, IngestError::CredentialMissing);
        assert_eq!(store.load().await.unwrap(), None);
        assert_eq!(sink.0.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn restore_reads_the_store() {
        let store = MemoryStore(Mutex::new(Some("persisted".into())));
        let mut ctx = AiContext::new(Arc::new(StrictFactory), None);
        assert!(ctx.restore_user_credential(&store).await.unwrap());
        assert!(ctx.status(CredentialSlot::User).is_ready());
    }
}
