//! services/tutor_api/src/web/protocol.rs
//!
//! Defines the JSON payloads exchanged between the browser client and the API server.
//! Core domain types are mapped onto these so the OpenAPI schema stays in this crate.

use chain_tutor_core::alerts::SlotView;
use chain_tutor_core::context::SlotReport;
use chain_tutor_core::domain::{
    AlertRecord, Attachment, Author, Citation, ConversationMessage, Notification, NotificationKind,
};
use chain_tutor_core::markdown;
use chain_tutor_core::LearningPath;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

//=========================================================================================
// Requests FROM the Client
//=========================================================================================

#[derive(Deserialize, Debug, ToSchema)]
pub struct SendMessageRequest {
    pub text: String,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct SaveCredentialRequest {
    pub credential: String,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct RenderRequest {
    pub text: String,
}

//=========================================================================================
// Responses TO the Client
//=========================================================================================

/// A conversation entry, with its markdown body pre-rendered to HTML.
#[derive(Serialize, Debug, Clone, PartialEq, ToSchema)]
pub struct MessageView {
    pub id: Uuid,
    /// `user` or `assistant`.
    pub author: String,
    pub body: String,
    pub html: String,
    pub created_at: DateTime<Utc>,
    pub is_pending: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl From<&ConversationMessage> for MessageView {
    fn from(message: &ConversationMessage) -> Self {
        Self {
            id: message.id,
            author: match message.author {
                Author::User => "user".to_string(),
                Author::Assistant => "assistant".to_string(),
            },
            body: message.body.clone(),
            html: markdown::render(&message.body),
            created_at: message.created_at,
            is_pending: message.is_pending,
            error_detail: message.error_detail.clone(),
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, ToSchema)]
pub struct AttachmentView {
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
}

impl From<&Attachment> for AttachmentView {
    fn from(attachment: &Attachment) -> Self {
        Self {
            file_name: attachment.source_file.clone(),
            mime_type: attachment.mime_type.clone(),
            size_bytes: attachment.size_bytes,
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
pub struct ConversationResponse {
    pub messages: Vec<MessageView>,
    pub busy: bool,
    pub staged_attachment: Option<AttachmentView>,
    pub cooldown_remaining_secs: Option<u64>,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct LearningPathView {
    pub label: String,
    pub prompt: String,
}

impl From<&LearningPath> for LearningPathView {
    fn from(path: &LearningPath) -> Self {
        Self {
            label: path.label.to_string(),
            prompt: path.prompt.to_string(),
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, ToSchema)]
pub struct CitationView {
    pub uri: String,
    pub title: String,
}

impl From<&Citation> for CitationView {
    fn from(citation: &Citation) -> Self {
        Self {
            uri: citation.uri.clone(),
            title: citation.title.clone(),
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, ToSchema)]
pub struct AlertView {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub indicators: Vec<String>,
    pub mitigations: Vec<String>,
    pub last_updated: String,
    pub source_url: Option<String>,
    /// Absent when grounding was not reported; empty when it returned nothing.
    pub citations: Option<Vec<CitationView>>,
}

impl From<&AlertRecord> for AlertView {
    fn from(alert: &AlertRecord) -> Self {
        Self {
            id: alert.id,
            title: alert.title.clone(),
            description: alert.description.clone(),
            indicators: alert.indicators.clone(),
            mitigations: alert.mitigations.clone(),
            last_updated: alert.last_updated.clone(),
            source_url: alert.source_url.clone(),
            citations: alert
                .citations
                .as_ref()
                .map(|list| list.iter().map(CitationView::from).collect()),
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, ToSchema)]
pub struct FetchSlotView {
    pub loading: bool,
    pub rate_limited: bool,
    pub cooldown_remaining_secs: Option<u64>,
    pub has_fetched_once: bool,
    pub last_error: Option<String>,
    pub status_message: String,
    pub button_label: String,
}

impl From<SlotView> for FetchSlotView {
    fn from(view: SlotView) -> Self {
        Self {
            loading: view.loading,
            rate_limited: view.rate_limited,
            cooldown_remaining_secs: view.cooldown_remaining_secs,
            has_fetched_once: view.has_fetched_once,
            last_error: view.last_error,
            status_message: view.status_message,
            button_label: view.button_label,
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
pub struct AlertsResponse {
    pub alerts: Vec<AlertView>,
    pub system: FetchSlotView,
    pub user: FetchSlotView,
}

/// The state of one client slot: `missing`, `ready` or `failed`.
#[derive(Serialize, Debug, Clone, PartialEq, ToSchema)]
pub struct ClientStateView {
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl From<SlotReport> for ClientStateView {
    fn from(report: SlotReport) -> Self {
        match report {
            SlotReport::Missing => Self {
                state: "missing".to_string(),
                reason: None,
            },
            SlotReport::Ready => Self {
                state: "ready".to_string(),
                reason: None,
            },
            SlotReport::Failed { reason } => Self {
                state: "failed".to_string(),
                reason: Some(reason),
            },
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
pub struct CredentialStatusResponse {
    pub system: ClientStateView,
    pub user: ClientStateView,
}

#[derive(Serialize, Debug, Clone, PartialEq, ToSchema)]
pub struct NotificationView {
    pub id: Uuid,
    /// `success`, `error` or `info`.
    pub kind: String,
    pub message: String,
    pub duration_ms: u64,
}

impl From<Notification> for NotificationView {
    fn from(notification: Notification) -> Self {
        Self {
            id: notification.id,
            kind: match notification.kind {
                NotificationKind::Success => "success",
                NotificationKind::Error => "error",
                NotificationKind::Info => "info",
            }
            .to_string(),
            message: notification.message,
            duration_ms: notification.duration_ms,
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
pub struct RenderResponse {
    pub html: String,
    /// Block descriptors produced by the markdown-subset parser.
    #[schema(value_type = Object)]
    pub blocks: Vec<markdown::Block>,
}
