use shared::{
    domain::EntryId,
    error::{NotifyError, UploadError, UploadErrorKind},
};
use thiserror::Error;

use crate::validation::ValidationErrors;

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("invalid submission: {0}")]
    Validation(ValidationErrors),
    #[error("{source}")]
    Upload {
        index: usize,
        entry_id: EntryId,
        source: UploadError,
    },
    #[error(transparent)]
    Notify(#[from] NotifyError),
    #[error("{0}")]
    Unknown(String),
}

impl SubmissionError {
    /// The single line shown to the user when a submission does not go through.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(errors) => {
                format!("Please correct the highlighted fields: {errors}")
            }
            other => format!("Submission failed: {other}. Please try again."),
        }
    }

    pub fn upload_kind(&self) -> Option<UploadErrorKind> {
        match self {
            Self::Upload { source, .. } => Some(source.kind),
            _ => None,
        }
    }

    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            Self::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}
