//! crates/chain_tutor_core/src/domain.rs
//!
//! Defines the pure, core data structures for the tutor.
//! These structs carry no transport or storage concerns; `serde` derives are
//! only there so the web layer can hand them to the browser unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

//=========================================================================================
// Credentials
//=========================================================================================

/// Which credential a client was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialSlot {
    /// Supplied by the host environment at startup, immutable afterwards.
    System,
    /// Entered by the end user and persisted in the credential store.
    User,
}

impl CredentialSlot {
    /// Vietnamese label used inside user-facing messages ("API hệ thống" / "API của bạn").
    pub fn label(self) -> &'static str {
        match self {
            CredentialSlot::System => "hệ thống",
            CredentialSlot::User => "của bạn",
        }
    }
}

impl fmt::Display for CredentialSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSlot::System => f.write_str("system"),
            CredentialSlot::User => f.write_str("user"),
        }
    }
}

/// An opaque secret authorizing calls to the generative-AI service.
///
/// `Debug` is redacted so the secret never reaches the logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wraps a raw credential. Returns `None` when it is empty after trimming.
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            None
        } else {
            Some(Self(raw))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

//=========================================================================================
// Conversation
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Author {
    User,
    Assistant,
}

/// A single entry in the assistant conversation.
///
/// A pending entry is replaced in place (same `id`) by exactly one resolved entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub id: Uuid,
    pub author: Author,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub is_pending: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl ConversationMessage {
    pub fn user(body: impl Into<String>) -> Self {
        Self::new(Author::User, body.into(), false, None)
    }

    pub fn assistant(body: impl Into<String>) -> Self {
        Self::new(Author::Assistant, body.into(), false, None)
    }

    pub fn pending(body: impl Into<String>) -> Self {
        Self::new(Author::Assistant, body.into(), true, None)
    }

    pub fn failed(body: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(Author::Assistant, body.into(), false, Some(detail.into()))
    }

    fn new(author: Author, body: String, is_pending: bool, error_detail: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            author,
            body,
            created_at: Utc::now(),
            is_pending,
            error_detail,
        }
    }
}

//=========================================================================================
// Attachments
//=========================================================================================

/// A file selected by the user, before validation.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub mime_type: String,
    pub data: bytes::Bytes,
}

impl SourceFile {
    pub fn size_bytes(&self) -> u64 {
        self.data.len() as u64
    }
}

/// A validated file, base64-encoded and ready to travel as an inline content part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub source_file: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub base64_payload: String,
}

//=========================================================================================
// Alerts
//=========================================================================================

/// A web source backing a generated answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub uri: String,
    pub title: String,
}

/// One scam alert as published to the feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub indicators: Vec<String>,
    pub mitigations: Vec<String>,
    /// Display string as returned by the model; never parsed as a date.
    pub last_updated: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    /// `None` when grounding was not reported, `Some(vec![])` when it was used with no results.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub citations: Option<Vec<Citation>>,
}

//=========================================================================================
// Notifications
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Success,
    Error,
    Info,
}

/// A transient, display-only event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub message: String,
    pub duration_ms: u64,
}

impl Notification {
    pub const DEFAULT_DURATION_MS: u64 = 3000;

    pub fn new(kind: NotificationKind, message: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            message: message.into(),
            duration_ms,
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Success, message, Self::DEFAULT_DURATION_MS)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Error, message, Self::DEFAULT_DURATION_MS)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Info, message, Self::DEFAULT_DURATION_MS)
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_credentials_are_rejected() {
        assert!(Credential::new("").is_none());
        assert!(Credential::new("   \n").is_none());
        assert_eq!(Credential::new("abc").map(|c| c.expose().to_string()), Some("abc".into()));
    }

    #[test]
    fn credential_debug_is_redacted() {
        let credential = Credential::new("super-secret").unwrap();
        assert!(!format!("{credential:?}").contains("super-secret"));
    }

    #[test]
    fn message_ids_are_unique() {
        let a = ConversationMessage::user("hi");
        let b = ConversationMessage::user("hi");
        assert_ne!(a.id, b.id);
    }
}
