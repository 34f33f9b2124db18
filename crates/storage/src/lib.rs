use async_trait::async_trait;
use shared::{domain::LocalFile, error::UploadError};

pub mod key;
mod s3;
pub mod sigv4;

pub use key::{object_key, sanitize_file_name};
pub use s3::{S3BlobStore, S3Config, DEFAULT_MAX_ATTEMPTS, DEFAULT_PART_SIZE};

/// Uploads larger than this are refused before any transfer starts.
pub const MAX_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;

/// Receives transfer progress as whole percentages. Calls are monotonically
/// non-decreasing and a successful upload always ends with 100.
pub trait ProgressListener: Send + Sync {
    fn on_progress(&self, percent: u8);
}

impl<F> ProgressListener for F
where
    F: Fn(u8) + Send + Sync,
{
    fn on_progress(&self, percent: u8) {
        self(percent)
    }
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores `file` under `key` and returns its public location.
    async fn upload_blob(
        &self,
        file: &LocalFile,
        key: &str,
        progress: &dyn ProgressListener,
    ) -> Result<String, UploadError>;
}

pub struct MissingBlobStore;

#[async_trait]
impl BlobStore for MissingBlobStore {
    async fn upload_blob(
        &self,
        _file: &LocalFile,
        _key: &str,
        _progress: &dyn ProgressListener,
    ) -> Result<String, UploadError> {
        Err(UploadError::unknown("blob storage is not configured"))
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
