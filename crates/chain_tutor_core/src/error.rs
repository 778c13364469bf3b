//! crates/chain_tutor_core/src/error.rs
//!
//! The failure taxonomy of the AI ingestion layer and the classifier that maps
//! raw provider errors onto it.

use crate::domain::CredentialSlot;
use crate::ports::PortError;

/// Markers the provider puts in quota / resource-exhaustion failures.
const RATE_LIMIT_MARKERS: &[&str] = &["quota", "RESOURCE_EXHAUSTED"];

/// Lower-cased fragments identifying a rejected credential.
const INVALID_CREDENTIAL_MARKERS: &[&str] =
    &["api key not valid", "invalid api key", "incorrect api key"];

/// Every failure a send or fetch can end in. Each variant has one user-facing template.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IngestError {
    #[error("Client initialization failed: {0}")]
    ClientInitialization(String),
    #[error("No credential configured")]
    CredentialMissing,
    #[error("Rate limited: {0}")]
    RateLimited(String),
    #[error("Invalid credential: {0}")]
    InvalidCredential(String),
    #[error("The model returned an empty payload")]
    EmptyPayload,
    #[error("Malformed JSON: {0}")]
    MalformedJson(String),
    #[error("Unexpected payload shape: {0}")]
    Shape(String),
    #[error("{0}")]
    Unknown(String),
}

impl IngestError {
    /// True for the short-circuit states reached without any network call.
    pub fn is_not_ready(&self) -> bool {
        matches!(
            self,
            IngestError::ClientInitialization(_) | IngestError::CredentialMissing
        )
    }

    /// Stable identifier for logs and API payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::ClientInitialization(_) => "client_initialization",
            IngestError::CredentialMissing => "credential_missing",
            IngestError::RateLimited(_) => "rate_limited",
            IngestError::InvalidCredential(_) => "invalid_credential",
            IngestError::EmptyPayload => "empty_payload",
            IngestError::MalformedJson(_) => "malformed_json",
            IngestError::Shape(_) => "shape",
            IngestError::Unknown(_) => "unknown",
        }
    }

    /// The message shown to the learner for this failure on the given slot.
    pub fn user_message(&self, slot: CredentialSlot) -> String {
        let label = slot.label();
        match self {
            IngestError::ClientInitialization(reason) => match slot {
                CredentialSlot::System => format!("Lỗi khởi tạo API hệ thống: {reason}."),
                CredentialSlot::User => format!(
                    "Lỗi khởi tạo API Key của bạn: {reason}. Key có thể không hợp lệ."
                ),
            },
            IngestError::CredentialMissing => match slot {
                CredentialSlot::System => {
                    "API hệ thống chưa sẵn sàng. Kiểm tra cấu hình API Key của máy chủ.".to_string()
                }
                CredentialSlot::User => {
                    "API Key của bạn chưa sẵn sàng hoặc không hợp lệ.".to_string()
                }
            },
            IngestError::RateLimited(_) => format!(
                "Lỗi: Đã vượt quá giới hạn yêu cầu API Key {label}. Thử lại sau 1 phút."
            ),
            IngestError::InvalidCredential(_) => format!("Lỗi: API Key {label} không hợp lệ."),
            IngestError::MalformedJson(_) => {
                format!("Lỗi xử lý dữ liệu từ AI (JSON không hợp lệ, API {label}).")
            }
            IngestError::EmptyPayload => format!(
                "Lỗi tải dữ liệu từ AI (API {label}): Dữ liệu AI trả về trống sau khi xử lý markdown."
            ),
            IngestError::Shape(_) => format!(
                "Lỗi tải dữ liệu từ AI (API {label}): Dữ liệu AI trả về không phải mảng JSON."
            ),
            IngestError::Unknown(message) => {
                format!("Lỗi tải dữ liệu từ AI (API {label}): {message}.")
            }
        }
    }
}

/// Classifies a failed provider call. Never fails: unrecognised errors become `Unknown`.
pub fn classify(error: &PortError) -> IngestError {
    let message = error.to_string();

    let status_exhausted = matches!(
        error,
        PortError::Provider { status: Some(status), .. }
            if status == "RESOURCE_EXHAUSTED" || status == "429"
    );
    if status_exhausted || RATE_LIMIT_MARKERS.iter().any(|m| message.contains(m)) {
        return IngestError::RateLimited(message);
    }

    let lowered = message.to_lowercase();
    if INVALID_CREDENTIAL_MARKERS.iter().any(|m| lowered.contains(m)) {
        return IngestError::InvalidCredential(message);
    }

    IngestError::Unknown(message)
}

impl From<PortError> for IngestError {
    fn from(error: PortError) -> Self {
        classify(&error)
    }
}
