use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata describing a stored object, independent of which backend holds it.
///
/// Mirrors the teacher's `ImageMetadata` shape (one struct describing a stored
/// artefact plus where it came from) generalised from "image produced by a PDF
/// page" to "any blob produced by any stage".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobMeta {
    pub key: String,
    pub size_bytes: u64,
    pub content_type: String,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

/// A retrieved object plus its metadata.
#[derive(Debug, Clone)]
pub struct Blob {
    pub meta: BlobMeta,
    pub bytes: Vec<u8>,
}
