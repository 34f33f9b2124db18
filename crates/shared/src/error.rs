use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadErrorKind {
    SizeLimit,
    Network,
    AccessDenied,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct UploadError {
    pub kind: UploadErrorKind,
    pub message: String,
}

impl UploadError {
    pub fn new(kind: UploadErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn size_limit() -> Self {
        Self::new(UploadErrorKind::SizeLimit, "File size exceeds 100MB limit")
    }

    pub fn network() -> Self {
        Self::new(
            UploadErrorKind::Network,
            "Network error: Please check your internet connection and try again",
        )
    }

    pub fn access_denied() -> Self {
        Self::new(
            UploadErrorKind::AccessDenied,
            "Access denied: Please check your S3 bucket permissions",
        )
    }

    pub fn unknown(detail: impl AsRef<str>) -> Self {
        Self::new(
            UploadErrorKind::Unknown,
            format!("Upload failed: {}", detail.as_ref()),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyError {
    #[error("Webhook submission failed: {reason}")]
    Status { status: u16, reason: String },
    #[error("Webhook submission failed: {0}")]
    Transport(String),
}
