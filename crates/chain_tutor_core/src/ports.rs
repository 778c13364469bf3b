//! crates/chain_tutor_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the tutor's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the concrete AI provider, credential storage and UI.

use crate::domain::{Credential, Notification};
use async_trait::async_trait;
use std::sync::Arc;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (HTTP, SDKs, filesystem).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    /// The provider answered with an error payload.
    #[error("{}", provider_message(status.as_deref(), message))]
    Provider {
        status: Option<String>,
        message: String,
    },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Unsupported: {0}")]
    Unsupported(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

fn provider_message(status: Option<&str>, message: &str) -> String {
    match status {
        Some(status) => format!("{status}: {message}"),
        None => message.to_string(),
    }
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Generative Model Request / Response
//=========================================================================================

/// One ordered content part of a user turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    InlineData { mime_type: String, data: String },
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateRequest {
    pub model: String,
    pub parts: Vec<ContentPart>,
    pub system_instruction: Option<String>,
    /// Enables the provider's web-search grounding tool.
    pub web_search: bool,
}

/// A raw grounding chunk as reported by the provider. Either field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroundingChunk {
    pub uri: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerateResponse {
    pub text: Option<String>,
    /// `None` when the provider reported no grounding metadata at all.
    pub grounding: Option<Vec<GroundingChunk>>,
}

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait GenerativeModelService: Send + Sync {
    /// Sends a single non-streaming generation request.
    async fn generate(&self, request: GenerateRequest) -> PortResult<GenerateResponse>;
}

/// Builds a live model client from a credential.
///
/// Construction may reject malformed credentials; no network call is made here.
pub trait ClientFactory: Send + Sync {
    fn build(&self, credential: &Credential) -> PortResult<Arc<dyn GenerativeModelService>>;
}

/// A single persisted key/value entry holding the user-supplied credential.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self) -> PortResult<Option<String>>;
    async fn save(&self, credential: &str) -> PortResult<()>;
    async fn clear(&self) -> PortResult<()>;
}

/// Fire-and-forget sink for display-only notifications.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}
