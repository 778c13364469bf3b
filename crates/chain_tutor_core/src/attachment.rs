//! crates/chain_tutor_core/src/attachment.rs
//!
//! Validation and base64 encoding of user-selected files.

use crate::domain::{Attachment, SourceFile};
use crate::ports::ContentPart;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;

/// Mime types the assistant accepts as attachments.
pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/webp",
    "image/gif",
    "application/pdf",
    "text/plain",
];

pub const DEFAULT_MAX_SIZE_MB: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttachmentError {
    #[error("Unsupported mime type: {0}")]
    UnsupportedMimeType(String),
    #[error("File is {size_bytes} bytes, limit is {limit_mb} MB")]
    TooLarge { size_bytes: u64, limit_mb: u64 },
    #[error("An attachment is already staged")]
    AlreadyStaged,
}

impl AttachmentError {
    /// The validation notice shown to the learner.
    pub fn user_message(&self) -> String {
        match self {
            AttachmentError::UnsupportedMimeType(_) => {
                "Loại tệp không được hỗ trợ. Chỉ cho phép ảnh, PDF, text.".to_string()
            }
            AttachmentError::TooLarge { limit_mb, .. } => {
                format!("Kích thước tệp không được vượt quá {limit_mb}MB.")
            }
            AttachmentError::AlreadyStaged => {
                "Đã có tệp đính kèm. Hãy gỡ tệp hiện tại trước khi chọn tệp mới.".to_string()
            }
        }
    }
}

/// Checks mime type and size without touching the payload.
pub fn validate(file: &SourceFile, max_size_mb: u64) -> Result<(), AttachmentError> {
    if !ALLOWED_MIME_TYPES.contains(&file.mime_type.as_str()) {
        return Err(AttachmentError::UnsupportedMimeType(file.mime_type.clone()));
    }
    if file.size_bytes() > max_size_mb.saturating_mul(1024 * 1024) {
        return Err(AttachmentError::TooLarge {
            size_bytes: file.size_bytes(),
            limit_mb: max_size_mb,
        });
    }
    Ok(())
}

/// Encodes a file that already passed `validate`.
pub fn encode(file: &SourceFile) -> Attachment {
    Attachment {
        source_file: file.name.clone(),
        mime_type: file.mime_type.clone(),
        size_bytes: file.size_bytes(),
        base64_payload: BASE64_STANDARD.encode(&file.data),
    }
}

/// Validates, then encodes. `encode` is never reached for a rejected file.
pub fn prepare(file: &SourceFile, max_size_mb: u64) -> Result<Attachment, AttachmentError> {
    validate(file, max_size_mb)?;
    Ok(encode(file))
}

impl Attachment {
    pub fn to_content_part(&self) -> ContentPart {
        ContentPart::InlineData {
            mime_type: self.mime_type.clone(),
            data: self.base64_payload.clone(),
        }
    }
}
