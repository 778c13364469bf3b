//! crates/chain_tutor_core/src/assistant.rs
//!
//! The conversational assistant: message log, staged attachment, and the
//! begin / run / complete cycle of a single turn.

use crate::attachment::{self, AttachmentError};
use crate::context::{AiContext, ClientHandle};
use crate::cooldown::Cooldown;
use crate::domain::{
    Attachment, ConversationMessage, CredentialSlot, Notification, SourceFile,
};
use crate::error::IngestError;
use crate::interpreter::{build_chat_request, compose_reply, AUTHOR_ATTRIBUTION};
use crate::ports::{GenerateRequest, NotificationSink};
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{error, info};
use uuid::Uuid;

/// The assistant talks through the host-configured credential.
pub const ASSISTANT_SLOT: CredentialSlot = CredentialSlot::System;

pub const THINKING_PLACEHOLDER: &str = "Đang suy nghĩ...";

const NOT_READY_NOTICE: &str = "Chatbot AI chưa sẵn sàng (thiếu API Key hoặc lỗi khởi tạo).";
const NOT_READY_DETAIL: &str = "API Key missing";

/// A suggested prompt offered next to the input box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LearningPath {
    pub label: &'static str,
    pub prompt: &'static str,
}

pub const LEARNING_PATHS: &[LearningPath] = &[
    LearningPath {
        label: "Blockchain là gì?",
        prompt: "Giải thích cơ bản về Blockchain là gì?",
    },
    LearningPath {
        label: "Ví hoạt động thế nào?",
        prompt: "Ví tài sản mã hoá hoạt động như thế nào?",
    },
    LearningPath {
        label: "Sàn giao dịch là gì?",
        prompt: "Sàn giao dịch tài sản mã hoá là gì và có mấy loại chính?",
    },
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    #[error("Nothing to send")]
    EmptyPrompt,
    #[error("A reply is already pending")]
    Busy,
    #[error("Assistant not ready: {0}")]
    NotReady(IngestError),
}

/// Everything needed to run one turn outside of any lock on the assistant.
#[derive(Debug, Clone)]
pub struct PendingTurn {
    pub message_id: Uuid,
    pub handle: ClientHandle,
    pub request: GenerateRequest,
}

impl PendingTurn {
    /// Calls the provider and composes the published body.
    pub async fn run(&self) -> Result<String, IngestError> {
        let response = self.handle.service().generate(self.request.clone()).await?;
        Ok(compose_reply(&response, self.request.web_search))
    }
}

pub struct Assistant {
    model: String,
    max_attachment_mb: u64,
    cooldown_length: Duration,
    messages: Vec<ConversationMessage>,
    staged: Option<Attachment>,
    pending: Option<Uuid>,
    cooldown: Cooldown,
}

impl Assistant {
    pub fn new(model: impl Into<String>, max_attachment_mb: u64, cooldown_length: Duration) -> Self {
        Self {
            model: model.into(),
            max_attachment_mb,
            cooldown_length,
            messages: Vec::new(),
            staged: None,
            pending: None,
            cooldown: Cooldown::default(),
        }
    }

    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    pub fn staged_attachment(&self) -> Option<&Attachment> {
        self.staged.as_ref()
    }

    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    pub fn cooldown_remaining(&self, now: Instant) -> Option<Duration> {
        self.cooldown.remaining(now)
    }

    /// Seeds an empty conversation with a welcome or a not-ready message.
    pub fn open(&mut self, ctx: &AiContext) {
        if !self.messages.is_empty() {
            return;
        }
        let seed = if ctx.client(ASSISTANT_SLOT).is_ok() {
            welcome_message()
        } else {
            not_ready_message()
        };
        self.messages.push(seed);
    }

    //=====================================================================================
    // Attachment Staging
    //=====================================================================================

    /// Validates and stages a file. A rejected file is never encoded.
    pub fn stage_attachment(
        &mut self,
        file: &SourceFile,
        notifier: &dyn NotificationSink,
    ) -> Result<&Attachment, AttachmentError> {
        let staged = if self.staged.is_some() {
            Err(AttachmentError::AlreadyStaged)
        } else {
            attachment::prepare(file, self.max_attachment_mb)
        };

        match staged {
            Ok(attachment) => {
                info!(file = %attachment.source_file, mime = %attachment.mime_type, "Attachment staged.");
                Ok(&*self.staged.insert(attachment))
            }
            Err(e) => {
                notifier.notify(Notification::error(e.user_message()));
                Err(e)
            }
        }
    }

    pub fn clear_attachment(&mut self) -> Option<Attachment> {
        self.staged.take()
    }

    //=====================================================================================
    // Turn Lifecycle
    //=====================================================================================

    /// Appends the user message and a pending reply, consuming the staged attachment.
    pub fn begin_turn(
        &mut self,
        ctx: &AiContext,
        text: &str,
        notifier: &dyn NotificationSink,
    ) -> Result<PendingTurn, ChatError> {
        let text = text.trim();
        if text.is_empty() && self.staged.is_none() {
            return Err(ChatError::EmptyPrompt);
        }
        if self.pending.is_some() {
            return Err(ChatError::Busy);
        }

        let handle = match ctx.client(ASSISTANT_SLOT) {
            Ok(handle) => handle,
            Err(e) => {
                notifier.notify(Notification::error(NOT_READY_NOTICE));
                let already_shown = self
                    .messages
                    .last()
                    .is_some_and(|m| m.error_detail.as_deref() == Some(NOT_READY_DETAIL));
                if !already_shown {
                    self.messages.push(not_ready_message());
                }
                return Err(ChatError::NotReady(e));
            }
        };

        let attachment = self.staged.take();
        let echo = match &attachment {
            Some(a) => format!("[Tệp đã được đính kèm: {}]\n{}", a.source_file, text),
            None => text.to_string(),
        };
        self.messages.push(ConversationMessage::user(echo));

        let placeholder = ConversationMessage::pending(THINKING_PLACEHOLDER);
        let message_id = placeholder.id;
        self.messages.push(placeholder);
        self.pending = Some(message_id);

        Ok(PendingTurn {
            message_id,
            handle,
            request: build_chat_request(&self.model, text, attachment.as_ref()),
        })
    }

    /// Replaces the pending message with its terminal state.
    ///
    /// Returns `None` if `message_id` is not pending, so a message never resolves twice.
    pub fn complete_turn(
        &mut self,
        message_id: Uuid,
        result: Result<String, IngestError>,
        now: Instant,
        notifier: &dyn NotificationSink,
    ) -> Option<&ConversationMessage> {
        if self.pending != Some(message_id) {
            return None;
        }
        let index = self
            .messages
            .iter()
            .position(|m| m.id == message_id && m.is_pending)?;
        self.pending = None;

        let mut resolved = match result {
            Ok(body) => ConversationMessage::assistant(body),
            Err(e) => {
                error!(kind = e.kind(), "Assistant turn failed: {}", e);
                if matches!(e, IngestError::RateLimited(_)) {
                    self.cooldown.start(now, self.cooldown_length);
                }
                let body = format!(
                    "Xin lỗi, tôi gặp sự cố khi xử lý yêu cầu của bạn. Vui lòng thử lại sau.\nChi tiết lỗi: {}{}",
                    e.user_message(ASSISTANT_SLOT),
                    AUTHOR_ATTRIBUTION
                );
                notifier.notify(Notification::error(body.clone()));
                ConversationMessage::failed(body, e.to_string())
            }
        };
        resolved.id = message_id;
        self.messages[index] = resolved;
        self.messages.get(index)
    }

    /// Runs a whole turn for callers that own the assistant exclusively.
    pub async fn send(
        &mut self,
        ctx: &AiContext,
        text: &str,
        notifier: &dyn NotificationSink,
    ) -> Result<ConversationMessage, ChatError> {
        let turn = self.begin_turn(ctx, text, notifier)?;
        let result = turn.run().await;
        self.complete_turn(turn.message_id, result, Instant::now(), notifier)
            .cloned()
            .ok_or(ChatError::Busy)
    }
}

fn welcome_message() -> ConversationMessage {
    ConversationMessage::assistant(format!(
        "Chào bạn! Tôi là Trợ lý AI Blockchain, được phát triển bởi Bộ phận Đào tạo - Viện Công nghệ Blockchain và Trí tuệ nhân tạo (ABAII). Tôi sẵn sàng giải đáp các thắc mắc của bạn về ví, sàn giao dịch tài sản mã hoá, và công nghệ blockchain. Hãy đặt câu hỏi cho tôi, hoặc chọn một chủ đề gợi ý bên dưới!{AUTHOR_ATTRIBUTION}"
    ))
}

fn not_ready_message() -> ConversationMessage {
    ConversationMessage::failed(
        format!(
            "Rất tiếc, Chatbot AI không thể hoạt động do thiếu API Key. Vui lòng kiểm tra cấu hình môi trường.{AUTHOR_ATTRIBUTION}"
        ),
        NOT_READY_DETAIL,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::{RecordingSink, StrictFactory};
    use crate::domain::Author;
    use crate::ports::{
        ClientFactory, ContentPart, GenerateResponse, GenerativeModelService, GroundingChunk,
        PortError, PortResult,
    };
    use crate::domain::Credential;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::{Arc, Mutex};

    /// Replays one canned result and records the request it saw.
    struct ScriptedModel {
        result: PortResult<GenerateResponse>,
        seen: Arc<Mutex<Vec<GenerateRequest>>>,
    }

    #[async_trait]
    impl GenerativeModelService for ScriptedModel {
        async fn generate(&self, request: GenerateRequest) -> PortResult<GenerateResponse> {
            self.seen.lock().unwrap().push(request);
            self.result.clone()
        }
    }

    struct ScriptedFactory {
        result: PortResult<GenerateResponse>,
        seen: Arc<Mutex<Vec<GenerateRequest>>>,
    }

    impl ClientFactory for ScriptedFactory {
        fn build(&self, _credential: &Credential) -> PortResult<Arc<dyn GenerativeModelService>> {
            Ok(Arc::new(ScriptedModel {
                result: self.result.clone(),
                seen: self.seen.clone(),
            }))
        }
    }

    fn context(result: PortResult<GenerateResponse>) -> (AiContext, Arc<Mutex<Vec<GenerateRequest>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let factory = ScriptedFactory {
            result,
            seen: seen.clone(),
        };
        (AiContext::new(Arc::new(factory), Some("sys")), seen)
    }

    fn assistant() -> Assistant {
        Assistant::new("gemini-2.5-flash", 10, Duration::from_secs(60))
    }

    #[tokio::test]
    async fn successful_turn_replaces_pending_in_place() {
        let (ctx, seen) = context(Ok(GenerateResponse {
            text: Some("Blockchain là sổ cái phân tán.".into()),
            grounding: Some(vec![GroundingChunk {
                uri: Some("https://vi.wikipedia.org/wiki/Blockchain".into()),
                title: Some("Wikipedia".into()),
            }]),
        }));
        let sink = RecordingSink::default();
        let mut assistant = assistant();

        let reply = assistant.send(&ctx, "Blockchain là gì?", &sink).await.unwrap();

        assert_eq!(assistant.messages().len(), 2);
        assert_eq!(assistant.messages()[0].author, Author::User);
        assert_eq!(assistant.messages()[1], reply);
        assert!(!reply.is_pending);
        assert!(reply.body.starts_with("Blockchain là sổ cái phân tán.\n\n**Nguồn tham khảo:**"));
        assert!(reply.body.ends_with(AUTHOR_ATTRIBUTION));
        assert!(seen.lock().unwrap()[0].web_search);
        assert!(!assistant.is_busy());
    }

    #[tokio::test]
    async fn attachment_is_sent_first_and_cleared() {
        let (ctx, seen) = context(Ok(GenerateResponse {
            text: Some("Đây là ví giả mạo.".into()),
            grounding: None,
        }));
        let sink = RecordingSink::default();
        let mut assistant = assistant();
        let file = SourceFile {
            name: "wallet.png".into(),
            mime_type: "image/png".into(),
            data: Bytes::from_static(b"\x89PNG"),
        };
        assistant.stage_attachment(&file, &sink).unwrap();

        assistant.send(&ctx, "An toàn không?", &sink).await.unwrap();

        assert!(assistant.staged_attachment().is_none());
        assert_eq!(
            assistant.messages()[0].body,
            "[Tệp đã được đính kèm: wallet.png]\nAn toàn không?"
        );
        let request = seen.lock().unwrap()[0].clone();
        assert!(!request.web_search);
        assert!(matches!(request.parts[0], ContentPart::InlineData { .. }));
    }

    #[test]
    fn rejected_attachment_is_not_staged_and_adds_no_message() {
        let sink = RecordingSink::default();
        let mut assistant = assistant();
        let file = SourceFile {
            name: "tool.exe".into(),
            mime_type: "application/x-msdownload".into(),
            data: Bytes::from_static(b"MZ"),
        };
        assert!(assistant.stage_attachment(&file, &sink).is_err());
        assert!(assistant.staged_attachment().is_none());
        assert!(assistant.messages().is_empty());
        assert_eq!(sink.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn second_attachment_needs_explicit_clear() {
        let sink = RecordingSink::default();
        let mut assistant = assistant();
        let file = SourceFile {
            name: "a.txt".into(),
            mime_type: "text/plain".into(),
            data: Bytes::from_static(b"a"),
        };
        assistant.stage_attachment(&file, &sink).unwrap();
        assert_eq!(
            assistant.stage_attachment(&file, &sink).unwrap_err(),
            AttachmentError::AlreadyStaged
        );
        assistant.clear_attachment();
        assert!(assistant.stage_attachment(&file, &sink).is_ok());
    }

    #[test]
    fn not_ready_short_circuits_without_duplicating_notice() {
        let ctx = AiContext::new(Arc::new(StrictFactory), Some("has space"));
        let sink = RecordingSink::default();
        let mut assistant = assistant();

        for _ in 0..2 {
            let err = assistant.begin_turn(&ctx, "xin chào", &sink).unwrap_err();
            assert!(matches!(err, ChatError::NotReady(IngestError::ClientInitialization(_))));
        }
        assert_eq!(assistant.messages().len(), 1);
        assert_eq!(sink.0.lock().unwrap().len(), 2);
    }

    #[test]
    fn empty_prompt_and_busy_gate() {
        let (ctx, _) = context(Ok(GenerateResponse::default()));
        let sink = RecordingSink::default();
        let mut assistant = assistant();

        assert_eq!(
            assistant.begin_turn(&ctx, "   ", &sink).unwrap_err(),
            ChatError::EmptyPrompt
        );
        let _turn = assistant.begin_turn(&ctx, "một", &sink).unwrap();
        assert_eq!(assistant.begin_turn(&ctx, "hai", &sink).unwrap_err(), ChatError::Busy);
    }

    #[tokio::test]
    async fn rate_limit_resolves_to_error_and_starts_cooldown() {
        let (ctx, _) = context(Err(PortError::Provider {
            status: Some("RESOURCE_EXHAUSTED".into()),
            message: "Resource has been exhausted (e.g. check quota).".into(),
        }));
        let sink = RecordingSink::default();
        let mut assistant = assistant();

        let turn = assistant.begin_turn(&ctx, "giá BTC?", &sink).unwrap();
        let result = turn.run().await;
        let now = Instant::now();
        let resolved = assistant
            .complete_turn(turn.message_id, result, now, &sink)
            .cloned()
            .unwrap();

        assert_eq!(resolved.id, turn.message_id);
        assert!(resolved.error_detail.is_some());
        assert!(!resolved.is_pending);
        assert!(assistant.cooldown_remaining(now).is_some());

        // A second completion for the same id is ignored.
        assert!(assistant
            .complete_turn(turn.message_id, Ok("late".into()), now, &sink)
            .is_none());
        assert_eq!(assistant.messages()[1], resolved);
    }

    #[test]
    fn open_seeds_once() {
        let (ctx, _) = context(Ok(GenerateResponse::default()));
        let mut assistant = assistant();
        assistant.open(&ctx);
        assistant.open(&ctx);
        assert_eq!(assistant.messages().len(), 1);
        assert!(assistant.messages()[0].error_detail.is_none());
    }
}
