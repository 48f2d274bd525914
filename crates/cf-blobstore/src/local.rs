use crate::traits::BlobStore;
use async_trait::async_trait;
use cf_core::{Blob, BlobMeta, CfError, CfResult, ErrorKind};
use std::path::{Path, PathBuf};

/// Filesystem-backed [`BlobStore`].
///
/// REDESIGN FLAG vs. the non-atomic `tokio::fs::write` the teacher's
/// `LocalStorage` used directly: every write here lands in a sibling temp file
/// first and is renamed into place, so a reader never observes a half-written
/// object and a crash mid-write never corrupts an existing one.
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn full_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn guess_content_type(path: &Path) -> &'static str {
        match path.extension().and_then(|e| e.to_str()) {
            Some("png") => "image/png",
            Some("jpg") | Some("jpeg") => "image/jpeg",
            Some("md") => "text/markdown; charset=utf-8",
            Some("json") => "application/json; charset=utf-8",
            Some("jsonl") => "application/x-ndjson",
            Some("zst") => "application/zstd",
            _ => "application/octet-stream",
        }
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, key: &str, data: &[u8], _content_type: &str) -> CfResult<()> {
        let full = self.full_path(key);
        let parent = full.parent().ok_or_else(|| {
            CfError::new(ErrorKind::StoragePermanent, format!("key '{key}' has no parent dir"))
        })?;
        tokio::fs::create_dir_all(parent).await?;

        let tmp_name = format!(
            ".{}.tmp-{}",
            full.file_name().and_then(|n| n.to_str()).unwrap_or("blob"),
            uuid::Uuid::new_v4().simple()
        );
        let tmp_path = parent.join(tmp_name);

        tokio::fs::write(&tmp_path, data).await.map_err(|e| {
            CfError::with_source(ErrorKind::StorageTransient, "writing temp file failed", e)
        })?;
        tokio::fs::rename(&tmp_path, &full).await.map_err(|e| {
            CfError::with_source(ErrorKind::StorageTransient, "renaming temp file into place failed", e)
        })?;
        Ok(())
    }

    async fn get(&self, key: &str) -> CfResult<Blob> {
        let full = self.full_path(key);
        let bytes = tokio::fs::read(&full).await?;
        let size_bytes = bytes.len() as u64;
        Ok(Blob {
            meta: BlobMeta {
                key: key.to_string(),
                size_bytes,
                content_type: Self::guess_content_type(&full).to_string(),
                etag: None,
                last_modified: None,
            },
            bytes,
        })
    }

    async fn exists(&self, key: &str) -> CfResult<bool> {
        Ok(tokio::fs::try_exists(self.full_path(key)).await.unwrap_or(false))
    }

    async fn delete(&self, key: &str) -> CfResult<()> {
        match tokio::fs::remove_file(self.full_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, prefix: &str) -> CfResult<Vec<BlobMeta>> {
        let base = self.full_path(prefix);
        let mut out = Vec::new();
        let mut stack = vec![base.clone()];
        while let Some(dir) = stack.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(e) => e,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    stack.push(path);
                    continue;
                }
                let meta = entry.metadata().await?;
                let rel = path
                    .strip_prefix(&self.root)
                    .unwrap_or(&path)
                    .to_string_lossy()
                    .replace('\\', "/");
                out.push(BlobMeta {
                    key: rel,
                    size_bytes: meta.len(),
                    content_type: Self::guess_content_type(&path).to_string(),
                    etag: None,
                    last_modified: None,
                });
            }
        }
        Ok(out)
    }

    fn backend_name(&self) -> &str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());
        store.put("jobs/a/result.json", b"{\"ok\":true}", "application/json").await.unwrap();
        let blob = store.get("jobs/a/result.json").await.unwrap();
        assert_eq!(blob.bytes, b"{\"ok\":true}");
        assert_eq!(blob.meta.content_type, "application/json; charset=utf-8");
    }

    #[tokio::test]
    async fn exists_is_false_before_put_true_after() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());
        assert!(!store.exists("missing.txt").await.unwrap());
        store.put("missing.txt", b"hi", "text/plain").await.unwrap();
        assert!(store.exists("missing.txt").await.unwrap());
    }

    #[tokio::test]
    async fn put_leaves_no_temp_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());
        store.put("out.md", b"# hi", "text/markdown").await.unwrap();
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        while let Some(e) = entries.next_entry().await.unwrap() {
            names.push(e.file_name().to_string_lossy().to_string());
        }
        assert_eq!(names, vec!["out.md".to_string()]);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());
        store.delete("never-existed.txt").await.unwrap();
    }

    #[tokio::test]
    async fn list_recurses_and_returns_relative_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());
        store.put("jobs/a/progress/latest.json", b"{}", "application/json").await.unwrap();
        store.put("jobs/a/result/manifest.json", b"{}", "application/json").await.unwrap();
        let mut keys: Vec<_> = store.list("jobs/a").await.unwrap().into_iter().map(|m| m.key).collect();
        keys.sort();
        assert_eq!(keys, vec!["jobs/a/progress/latest.json", "jobs/a/result/manifest.json"]);
    }
}
