use std::time::Duration;

/// The stable machine-readable error taxonomy from the system spec.
///
/// This is what gets written into `result/error.json` and compared against
/// retry policy tables. Never expose a Rust type/variant name where this tag
/// belongs — callers across crates match on `ErrorKind`, not on `CfError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    StorageTransient,
    StoragePermanent,
    GatewayTransient,
    GatewayPermanent,
    SchemaViolation,
    MalformedBeyondRepair,
    PdfUnreadable,
    MissingRequiredField,
    TransformFailed,
    Cancelled,
    DeadlineExceeded,
    SubmissionRejected,
}

impl ErrorKind {
    /// Whether the enclosing stage should retry an error of this kind.
    pub fn retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::StorageTransient
                | ErrorKind::GatewayTransient
                | ErrorKind::SchemaViolation
                | ErrorKind::DeadlineExceeded
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::StorageTransient => "storage-transient",
            ErrorKind::StoragePermanent => "storage-permanent",
            ErrorKind::GatewayTransient => "gateway-transient",
            ErrorKind::GatewayPermanent => "gateway-permanent",
            ErrorKind::SchemaViolation => "schema-violation",
            ErrorKind::MalformedBeyondRepair => "malformed-beyond-repair",
            ErrorKind::PdfUnreadable => "pdf-unreadable",
            ErrorKind::MissingRequiredField => "missing-required-field",
            ErrorKind::TransformFailed => "transform-failed",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::DeadlineExceeded => "deadline-exceeded",
            ErrorKind::SubmissionRejected => "submission-rejected",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single error type shared across every corpusforge crate.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct CfError {
    kind: ErrorKind,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl CfError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn retryable(&self) -> bool {
        self.kind.retryable()
    }
}

impl From<std::io::Error> for CfError {
    fn from(e: std::io::Error) -> Self {
        let kind = match e.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                ErrorKind::StoragePermanent
            }
            _ => ErrorKind::StorageTransient,
        };
        CfError::with_source(kind, "I/O error", e)
    }
}

impl From<serde_json::Error> for CfError {
    fn from(e: serde_json::Error) -> Self {
        CfError::with_source(ErrorKind::MalformedBeyondRepair, "JSON error", e)
    }
}

pub type CfResult<T> = Result<T, CfError>;

/// A terminal error summary, serialized as `result/error.json` (spec §6).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ErrorSummary {
    pub kind: ErrorKind,
    pub message: String,
    pub stage: String,
    pub retryable: bool,
}

impl ErrorSummary {
    pub fn from_error(err: &CfError, stage: impl Into<String>) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            stage: stage.into(),
            retryable: err.retryable(),
        }
    }
}

/// Parameters for a jittered exponential backoff schedule.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub factor: f64,
    pub cap: Duration,
    pub max_attempts: u32,
}

impl BackoffPolicy {
    /// Blob store retry policy from spec §4.1: base 250ms, factor 2, cap 8s, 5 attempts.
    pub const STORAGE: BackoffPolicy = BackoffPolicy {
        base: Duration::from_millis(250),
        factor: 2.0,
        cap: Duration::from_secs(8),
        max_attempts: 5,
    };

    /// LLM gateway retry policy from spec §4.5: base 500ms, factor 2, cap 10s, 3 attempts.
    pub const GATEWAY: BackoffPolicy = BackoffPolicy {
        base: Duration::from_millis(500),
        factor: 2.0,
        cap: Duration::from_secs(10),
        max_attempts: 3,
    };

    /// Delay before the given (0-indexed) retry attempt, with +/-20% jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let unjittered = self.base.mul_f64(self.factor.powi(attempt as i32));
        let capped = unjittered.min(self.cap);
        let jitter_frac = 0.8 + rand::random::<f64>() * 0.4; // [0.8, 1.2)
        capped.mul_f64(jitter_frac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_tags_match_spec_strings() {
        assert_eq!(ErrorKind::StorageTransient.as_str(), "storage-transient");
        assert_eq!(ErrorKind::SubmissionRejected.as_str(), "submission-rejected");
        assert_eq!(ErrorKind::PdfUnreadable.as_str(), "pdf-unreadable");
    }

    #[test]
    fn only_transient_kinds_are_retryable() {
        assert!(ErrorKind::StorageTransient.retryable());
        assert!(ErrorKind::GatewayTransient.retryable());
        assert!(ErrorKind::DeadlineExceeded.retryable());
        assert!(!ErrorKind::StoragePermanent.retryable());
        assert!(!ErrorKind::Cancelled.retryable());
        assert!(!ErrorKind::SubmissionRejected.retryable());
    }

    #[test]
    fn backoff_delay_is_capped_and_jittered() {
        let policy = BackoffPolicy::STORAGE;
        for attempt in 0..10 {
            let d = policy.delay_for_attempt(attempt);
            assert!(d <= policy.cap.mul_f64(1.2) + Duration::from_millis(1));
        }
    }

    #[test]
    fn io_not_found_maps_to_permanent() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "nope");
        let cf: CfError = io_err.into();
        assert_eq!(cf.kind(), ErrorKind::StoragePermanent);
    }

    #[tokio::test]
    async fn retry_with_backoff_stops_after_max_attempts() {
        let mut calls = 0u32;
        let result: CfResult<()> = retry_with_backoff(BackoffPolicy::GATEWAY, |_attempt| {
            calls += 1;
            async move { Err(CfError::new(ErrorKind::GatewayTransient, "down")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls, BackoffPolicy::GATEWAY.max_attempts);
    }

    #[tokio::test]
    async fn retry_with_backoff_returns_first_success() {
        let mut calls = 0u32;
        let result: CfResult<u32> = retry_with_backoff(BackoffPolicy::STORAGE, |attempt| {
            calls += 1;
            async move {
                if attempt < 2 {
                    Err(CfError::new(ErrorKind::StorageTransient, "busy"))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn retry_with_backoff_does_not_retry_permanent_errors() {
        let mut calls = 0u32;
        let result: CfResult<()> = retry_with_backoff(BackoffPolicy::STORAGE, |_attempt| {
            calls += 1;
            async move { Err(CfError::new(ErrorKind::StoragePermanent, "gone")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}

/// Run `op` with the given backoff policy, retrying while the error is retryable.
///
/// `op` is re-invoked from scratch on each attempt; callers are responsible for
/// making retried work idempotent (the blob store and LLM gateway callers do).
pub async fn retry_with_backoff<T, F, Fut>(policy: BackoffPolicy, mut op: F) -> CfResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = CfResult<T>>,
{
    let mut attempt = 0;
    loop {
        match op(attempt).await {
            Ok(v) => return Ok(v),
            Err(e) if e.retryable() && attempt + 1 < policy.max_attempts => {
                let delay = policy.delay_for_attempt(attempt);
                tracing::warn!(
                    attempt = attempt,
                    kind = %e.kind(),
                    delay_ms = delay.as_millis() as u64,
                    "retrying after transient error"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
