pub mod local;
pub mod s3;
pub mod traits;

pub use local::LocalBlobStore;
pub use s3::S3BlobStore;
pub use traits::BlobStore;

use async_trait::async_trait;
use cf_core::{Blob, BackoffPolicy, BlobMeta, CfResult, retry_with_backoff};

/// Wraps any [`BlobStore`] so every operation retries transient failures with
/// the storage backoff policy from spec §4.1, centralising retry/jitter logic
/// so individual backends only classify errors.
pub struct RetryingBlobStore<S> {
    inner: S,
}

impl<S: BlobStore> RetryingBlobStore<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<S: BlobStore> BlobStore for RetryingBlobStore<S> {
    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> CfResult<()> {
        retry_with_backoff(BackoffPolicy::STORAGE, |_attempt| {
            self.inner.put(key, data, content_type)
        })
        .await
    }

    async fn get(&self, key: &str) -> CfResult<Blob> {
        retry_with_backoff(BackoffPolicy::STORAGE, |_attempt| self.inner.get(key)).await
    }

    async fn exists(&self, key: &str) -> CfResult<bool> {
        retry_with_backoff(BackoffPolicy::STORAGE, |_attempt| self.inner.exists(key)).await
    }

    async fn delete(&self, key: &str) -> CfResult<()> {
        retry_with_backoff(BackoffPolicy::STORAGE, |_attempt| self.inner.delete(key)).await
    }

    async fn list(&self, prefix: &str) -> CfResult<Vec<BlobMeta>> {
        retry_with_backoff(BackoffPolicy::STORAGE, |_attempt| self.inner.list(prefix)).await
    }

    fn backend_name(&self) -> &str {
        self.inner.backend_name()
    }
}
