use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Opaque, URL-safe 128-bit job identifier (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub uuid::Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl std::str::FromStr for JobId {
    type Err = uuid::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(uuid::Uuid::parse_str(s)?))
    }
}

/// The pipeline a submitted job runs through (spec §6 `kind` option).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    Pdf,
    JsonUnified,
    JsonSingle,
    Compress,
    Clean,
    Split,
}

impl JobKind {
    /// Which worker-pool bucket this kind is dispatched to (spec §5 defaults).
    pub fn pool_bucket(self) -> &'static str {
        match self {
            JobKind::Pdf => "pdf",
            JobKind::JsonUnified => "json-unified",
            JobKind::JsonSingle | JobKind::Compress | JobKind::Clean | JobKind::Split => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Paused,
}

/// A single input blob reference attached to a submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputDescriptor {
    pub key: String,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: u64,
}

/// A pointer to a produced output artefact, written into `result/manifest.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultDescriptor {
    pub manifest_key: String,
    pub output_keys: Vec<String>,
}

/// A durable job record (spec §3 `Job`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub submitted_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: JobStatus,
    pub progress: u8,
    pub retry_count: u32,
    pub max_retries: u32,
    pub inputs: Vec<InputDescriptor>,
    pub options: HashMap<String, serde_json::Value>,
    pub result: Option<ResultDescriptor>,
    pub last_error: Option<crate::error::ErrorSummary>,
}

impl Job {
    pub fn new(
        kind: JobKind,
        inputs: Vec<InputDescriptor>,
        options: HashMap<String, serde_json::Value>,
        max_retries: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            kind,
            submitted_at: now,
            last_updated_at: now,
            started_at: None,
            finished_at: None,
            status: JobStatus::Pending,
            progress: 0,
            retry_count: 0,
            max_retries,
            inputs,
            options,
            result: None,
            last_error: None,
        }
    }

    /// Look up a string-typed option, as recognised by spec §6.
    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(|v| v.as_str())
    }

    pub fn option_bool(&self, key: &str, default: bool) -> bool {
        self.options
            .get(key)
            .and_then(|v| v.as_bool())
            .unwrap_or(default)
    }

    pub fn option_f64(&self, key: &str, default: f64) -> f64 {
        self.options
            .get(key)
            .and_then(|v| v.as_f64())
            .unwrap_or(default)
    }

    pub fn option_u64(&self, key: &str, default: u64) -> u64 {
        self.options
            .get(key)
            .and_then(|v| v.as_u64())
            .unwrap_or(default)
    }
}

/// A single phase/step progress record (spec §3 `Progress Event`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub job_id: JobId,
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub phase: String,
    pub step: String,
    pub progress: u8,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// Which orchestrator worker emitted this event (ambient addition, SPEC_FULL §3).
    #[serde(default)]
    pub worker_id: Option<String>,
}

/// Snapshot of the latest known state of a job, the ledger's `progress/latest.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    pub last_seq: u64,
    pub phase: String,
    pub step: String,
    pub updated_at: DateTime<Utc>,
}
