use crate::traits::BlobStore;
use async_trait::async_trait;
use aws_sdk_s3::Client;
use cf_core::{Blob, BlobMeta, CfError, CfResult, ErrorKind};

/// S3-compatible [`BlobStore`] (AWS S3, MinIO, and similar via a custom endpoint
/// baked into the loaded `aws_config`).
pub struct S3BlobStore {
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3BlobStore {
    pub async fn new(bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self {
            client: Client::new(&config),
            bucket: bucket.into(),
            prefix: prefix.into(),
        }
    }

    fn s3_key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}/{}", self.prefix.trim_end_matches('/'), key)
        }
    }

    fn guess_content_type(key: &str) -> &'static str {
        if key.ends_with(".png") {
            "image/png"
        } else if key.ends_with(".jpg") || key.ends_with(".jpeg") {
            "image/jpeg"
        } else if key.ends_with(".md") {
            "text/markdown; charset=utf-8"
        } else if key.ends_with(".json") {
            "application/json; charset=utf-8"
        } else if key.ends_with(".jsonl") {
            "application/x-ndjson"
        } else if key.ends_with(".zst") {
            "application/zstd"
        } else {
            "application/octet-stream"
        }
    }
}

/// AWS SDK errors surface as opaque, need-to-inspect types; this heuristic
/// mirrors the transient/permanent split spec §7 requires without depending
/// on the per-operation error enum of every S3 call we make.
fn classify_s3_error<E: std::fmt::Display>(e: &E) -> ErrorKind {
    let msg = e.to_string().to_lowercase();
    if msg.contains("nosuchkey")
        || msg.contains("access denied")
        || msg.contains("accessdenied")
        || msg.contains("invalid")
        || msg.contains("nosuchbucket")
    {
        ErrorKind::StoragePermanent
    } else {
        ErrorKind::StorageTransient
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> CfResult<()> {
        let s3_key = self.s3_key(key);
        let ct = if content_type.is_empty() {
            Self::guess_content_type(key)
        } else {
            content_type
        };
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&s3_key)
            .content_type(ct)
            .body(data.to_vec().into())
            .send()
            .await
            .map_err(|e| CfError::new(classify_s3_error(&e), format!("put {s3_key} failed: {e}")))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> CfResult<Blob> {
        let s3_key = self.s3_key(key);
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&s3_key)
            .send()
            .await
            .map_err(|e| CfError::new(classify_s3_error(&e), format!("get {s3_key} failed: {e}")))?;

        let content_type = output
            .content_type()
            .unwrap_or_else(|| Self::guess_content_type(key))
            .to_string();
        let etag = output.e_tag().map(|s| s.to_string());
        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| {
                CfError::new(ErrorKind::StorageTransient, format!("reading body for {s3_key} failed: {e}"))
            })?
            .into_bytes()
            .to_vec();
        let size_bytes = bytes.len() as u64;
        Ok(Blob {
            meta: BlobMeta {
                key: key.to_string(),
                size_bytes,
                content_type,
                etag,
                last_modified: None,
            },
            bytes,
        })
    }

    async fn exists(&self, key: &str) -> CfResult<bool> {
        let s3_key = self.s3_key(key);
        match self.client.head_object().bucket(&self.bucket).key(&s3_key).send().await {
            Ok(_) => Ok(true),
            Err(e) if classify_s3_error(&e) == ErrorKind::StoragePermanent => Ok(false),
            Err(e) => Err(CfError::new(ErrorKind::StorageTransient, format!("head {s3_key} failed: {e}"))),
        }
    }

    async fn delete(&self, key: &str) -> CfResult<()> {
        let s3_key = self.s3_key(key);
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&s3_key)
            .send()
            .await
            .map_err(|e| CfError::new(classify_s3_error(&e), format!("delete {s3_key} failed: {e}")))?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> CfResult<Vec<BlobMeta>> {
        let s3_prefix = self.s3_key(prefix);
        let mut out = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let mut req = self.client.list_objects_v2().bucket(&self.bucket).prefix(&s3_prefix);
            if let Some(token) = &continuation {
                req = req.continuation_token(token);
            }
            let resp = req
                .send()
                .await
                .map_err(|e| CfError::new(classify_s3_error(&e), format!("list {s3_prefix} failed: {e}")))?;
            for obj in resp.contents() {
                if let Some(key) = obj.key() {
                    let rel = self
                        .prefix
                        .is_empty()
                        .then(|| key.to_string())
                        .unwrap_or_else(|| {
                            key.strip_prefix(&format!("{}/", self.prefix.trim_end_matches('/')))
                                .unwrap_or(key)
                                .to_string()
                        });
                    out.push(BlobMeta {
                        key: rel,
                        size_bytes: obj.size().unwrap_or(0) as u64,
                        content_type: Self::guess_content_type(key).to_string(),
                        etag: obj.e_tag().map(|s| s.to_string()),
                        last_modified: None,
                    });
                }
            }
            if resp.is_truncated().unwrap_or(false) {
                continuation = resp.next_continuation_token().map(|s| s.to_string());
            } else {
                break;
            }
        }
        Ok(out)
    }

    fn backend_name(&self) -> &str {
        "s3"
    }
}
