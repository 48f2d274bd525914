use async_trait::async_trait;
use cf_core::{Blob, BlobMeta, CfResult};

/// A content-addressed-by-key object store, backing every durable artefact the
/// system produces: job inputs, pipeline outputs, ledger snapshots.
///
/// Implementations retry transient failures internally (see
/// [`crate::with_retry`]) so callers only ever see terminal errors.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> CfResult<()>;

    async fn get(&self, key: &str) -> CfResult<Blob>;

    async fn exists(&self, key: &str) -> CfResult<bool>;

    async fn delete(&self, key: &str) -> CfResult<()>;

    /// List keys under `prefix`, without recursion limits (callers filter further).
    async fn list(&self, prefix: &str) -> CfResult<Vec<BlobMeta>>;

    fn backend_name(&self) -> &str;
}
