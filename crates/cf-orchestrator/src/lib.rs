pub mod pools;

use cf_blobstore::BlobStore;
use cf_core::{
    BackoffPolicy, CfError, CfResult, ErrorKind, ErrorSummary, InputDescriptor, Job, JobId,
    JobKind, JobStatus, ProgressEvent, ProgressSnapshot, ResultDescriptor,
};
use cf_ledger::Ledger;
use cf_llm::LlmGateway;
use chrono::Utc;
use pools::{PoolSizing, WorkerPools};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub pdf: PoolSizing,
    pub json_unified: PoolSizing,
    pub other: PoolSizing,
    pub scratch_dir: PathBuf,
}

impl Default for OrchestratorConfig {
    /// Defaults from spec §5: pdf=4, json-unified=2, other=4 workers; a
    /// generous queue depth so backpressure only triggers under real load.
    fn default() -> Self {
        Self {
            pdf: PoolSizing { workers: 4, queue_depth: 32 },
            json_unified: PoolSizing { workers: 2, queue_depth: 32 },
            other: PoolSizing { workers: 4, queue_depth: 32 },
            scratch_dir: std::env::temp_dir().join("corpusforge-scratch"),
        }
    }
}

struct JobEntry {
    cancel: CancellationToken,
    seq: Arc<AtomicU64>,
}

pub struct Inner<S: BlobStore + 'static> {
    store: Arc<S>,
    ledger: Arc<Ledger<S>>,
    gateway: Option<Arc<LlmGateway>>,
    pools: Arc<WorkerPools>,
    config: OrchestratorConfig,
    table: Mutex<HashMap<JobId, JobEntry>>,
}

/// Owns every job's lifecycle: submission, dispatch onto a per-kind worker
/// pool, retries, cancellation, and durable state via C1/C2. Grounded on the
/// teacher's `JobQueue` (`jobs/queue.rs`) re-platformed off SQLite onto the
/// blob-store-backed ledger, with the `other_examples` `job_runner.rs`
/// atomic-counter and single-owner patterns generalized from image-level to
/// job-level concurrency.
///
/// A thin, cheaply-`Clone`able handle around the shared state, the same
/// shape as a connection pool: cloning bumps a refcount rather than copying
/// anything, so a handle can be moved into a spawned task without the
/// caller losing access to it.
pub struct Orchestrator<S: BlobStore + 'static>(Arc<Inner<S>>);

impl<S: BlobStore + 'static> Clone for Orchestrator<S> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<S: BlobStore + 'static> Deref for Orchestrator<S> {
    type Target = Inner<S>;
    fn deref(&self) -> &Inner<S> {
        &self.0
    }
}

impl<S: BlobStore + 'static> Orchestrator<S> {
    pub fn new(store: Arc<S>, ledger: Arc<Ledger<S>>, gateway: Option<Arc<LlmGateway>>, config: OrchestratorConfig) -> Self {
        let pools = Arc::new(WorkerPools::new(config.pdf, config.json_unified, config.other));
        Self(Arc::new(Inner { store, ledger, gateway, pools, config, table: Mutex::new(HashMap::new()) }))
    }

    /// Reload durable job state on process restart (spec §4.11): paused jobs
    /// stay paused, running jobs (interrupted by the crash) are re-queued as
    /// pending so they resume from where a fresh attempt would start.
    pub async fn recover(&self) -> CfResult<usize> {
        let mut recovered = 0;
        for id in self.ledger.list_job_ids().await? {
            let Some(mut job) = self.ledger.load_job(id).await? else { continue };
            if job.status == JobStatus::Running {
                job.status = JobStatus::Pending;
                self.ledger.save_job(&job).await?;
                let cancel = CancellationToken::new();
                self.table.lock().await.insert(id, JobEntry { cancel: cancel.clone(), seq: Arc::new(AtomicU64::new(0)) });
                if self.pools.try_admit(job.kind.pool_bucket()) {
                    self.spawn_execution(job, cancel);
                    recovered += 1;
                }
            }
        }
        Ok(recovered)
    }

    /// Submit a new job. Rejects with `ErrorKind::SubmissionRejected` if the
    /// job's kind bucket is already at its configured queue depth.
    pub async fn submit(
        &self,
        kind: JobKind,
        inputs: Vec<InputDescriptor>,
        options: HashMap<String, serde_json::Value>,
    ) -> CfResult<JobId> {
        let bucket = kind.pool_bucket();
        if !self.pools.try_admit(bucket) {
            return Err(CfError::new(
                ErrorKind::SubmissionRejected,
                format!("'{bucket}' worker pool queue is at capacity"),
            ));
        }

        let max_retries = options.get("max_retries").and_then(|v| v.as_u64()).unwrap_or(3) as u32;
        let job = Job::new(kind, inputs, options, max_retries);
        let id = job.id;
        self.ledger.save_job(&job).await?;

        let cancel = CancellationToken::new();
        self.table.lock().await.insert(id, JobEntry { cancel: cancel.clone(), seq: Arc::new(AtomicU64::new(0)) });

        self.spawn_execution(job, cancel);
        Ok(id)
    }

    pub async fn state(&self, id: JobId) -> CfResult<Option<ProgressSnapshot>> {
        self.ledger.latest(id).await
    }

    pub async fn job(&self, id: JobId) -> CfResult<Option<Job>> {
        self.ledger.load_job(id).await
    }

    pub async fn history(&self, id: JobId) -> CfResult<Vec<ProgressEvent>> {
        self.ledger.history(id).await
    }

    /// Request cancellation. Cooperative: the running stage observes the
    /// token at its next suspension point and transitions to `paused` rather
    /// than stopping mid-write (spec §5).
    pub async fn cancel(&self, id: JobId) -> CfResult<()> {
        let table = self.table.lock().await;
        match table.get(&id) {
            Some(entry) => {
                entry.cancel.cancel();
                Ok(())
            }
            None => Err(CfError::new(ErrorKind::MissingRequiredField, "no running job with that id")),
        }
    }

    /// Re-submit a failed or paused job for another attempt (spec §4.11:
    /// "only from failed/paused").
    pub async fn retry(&self, id: JobId) -> CfResult<()> {
        let mut job = self
            .ledger
            .load_job(id)
            .await?
            .ok_or_else(|| CfError::new(ErrorKind::MissingRequiredField, "unknown job id"))?;

        if !matches!(job.status, JobStatus::Failed | JobStatus::Paused) {
            return Err(CfError::new(ErrorKind::TransformFailed, "job is not in a retryable state"));
        }

        let bucket = job.kind.pool_bucket();
        if !self.pools.try_admit(bucket) {
            return Err(CfError::new(ErrorKind::SubmissionRejected, format!("'{bucket}' worker pool queue is at capacity")));
        }

        job.status = JobStatus::Pending;
        job.retry_count += 1;
        job.last_error = None;
        self.ledger.save_job(&job).await?;

        let cancel = CancellationToken::new();
        self.table.lock().await.insert(id, JobEntry { cancel: cancel.clone(), seq: Arc::new(AtomicU64::new(0)) });
        self.spawn_execution(job, cancel);
        Ok(())
    }

    fn spawn_execution(&self, job: Job, cancel: CancellationToken) {
        let this = self.clone();
        tokio::spawn(async move {
            this.run_with_retries(job, cancel).await;
        });
    }

    async fn run_with_retries(self, mut job: Job, cancel: CancellationToken) {
        let bucket = job.kind.pool_bucket();
        let seq = {
            let table = self.table.lock().await;
            table.get(&job.id).map(|e| e.seq.clone()).unwrap_or_else(|| Arc::new(AtomicU64::new(0)))
        };

        loop {
            if cancel.is_cancelled() {
                self.finish_paused(&mut job, &seq).await;
                break;
            }

            job.status = JobStatus::Running;
            job.started_at.get_or_insert(Utc::now());
            let _ = self.ledger.save_job(&job).await;

            let semaphore = self.pools.semaphore(bucket);
            let permit = semaphore.acquire_owned().await.expect("worker pool semaphore never closes");
            let result = self.dispatch(&job, &cancel, &seq).await;
            drop(permit);

            match result {
                Ok(descriptor) => {
                    job.status = JobStatus::Completed;
                    job.progress = 100;
                    job.finished_at = Some(Utc::now());
                    job.result = Some(descriptor);
                    job.last_error = None;
                    let _ = self.ledger.save_job(&job).await;
                    self.report(&job.id, &seq, "success", "completed", 100, None).await;
                    break;
                }
                Err(e) if e.kind() == ErrorKind::Cancelled => {
                    self.finish_paused(&mut job, &seq).await;
                    break;
                }
                Err(e) => {
                    let retryable = e.retryable() && job.retry_count < job.max_retries;
                    job.last_error = Some(ErrorSummary::from_error(&e, job.kind.pool_bucket()));
                    if retryable {
                        job.retry_count += 1;
                        job.status = JobStatus::Pending;
                        let _ = self.ledger.save_job(&job).await;
                        self.report(&job.id, &seq, "retry", &format!("retrying after: {e}"), job.progress, None).await;
                        let delay = BackoffPolicy::STORAGE.delay_for_attempt(job.retry_count);
                        tokio::time::sleep(delay).await;
                        continue;
                    } else {
                        job.status = JobStatus::Failed;
                        job.finished_at = Some(Utc::now());
                        let _ = self.ledger.save_job(&job).await;
                        self.report(&job.id, &seq, "failed", &e.to_string(), job.progress, None).await;
                        break;
                    }
                }
            }
        }

        self.pools.release(bucket);
        self.table.lock().await.remove(&job.id);
        self.ledger.forget(job.id).await;
    }

    async fn finish_paused(&self, job: &mut Job, seq: &Arc<AtomicU64>) {
        job.status = JobStatus::Paused;
        job.finished_at = Some(Utc::now());
        job.last_error = Some(ErrorSummary {
            kind: ErrorKind::Cancelled,
            message: "cancelled by caller".to_string(),
            stage: job.kind.pool_bucket().to_string(),
            retryable: false,
        });
        let _ = self.ledger.save_job(job).await;
        self.report(&job.id, seq, "cancelled", "cancelled", job.progress, None).await;
    }

    async fn report(&self, job_id: &JobId, seq: &Arc<AtomicU64>, phase: &str, step: &str, progress: u8, metadata: Option<HashMap<String, serde_json::Value>>) {
        let n = seq.fetch_add(1, Ordering::SeqCst);
        let event = ProgressEvent {
            job_id: *job_id,
            seq: n,
            timestamp: Utc::now(),
            phase: phase.to_string(),
            step: step.to_string(),
            progress,
            metadata: metadata.unwrap_or_default(),
            worker_id: Some("orchestrator".to_string()),
        };
        let _ = self.ledger.record(event).await;
    }

    async fn dispatch(&self, job: &Job, cancel: &CancellationToken, seq: &Arc<AtomicU64>) -> CfResult<ResultDescriptor> {
        self.report(&job.id, seq, "init", "starting", 0, None).await;
        if cancel.is_cancelled() {
            return Err(CfError::new(ErrorKind::Cancelled, "cancelled before start"));
        }
        match job.kind {
            JobKind::Pdf => self.run_pdf(job, cancel, seq).await,
            JobKind::JsonUnified | JobKind::JsonSingle => self.run_json(job, cancel, seq).await,
            JobKind::Compress => self.run_compress(job, cancel, seq).await,
            JobKind::Clean => self.run_clean(job, cancel, seq).await,
            JobKind::Split => self.run_split(job, cancel, seq).await,
        }
    }

    async fn download_inputs(&self, job: &Job) -> CfResult<Vec<(String, Vec<u8>)>> {
        let mut out = Vec::with_capacity(job.inputs.len());
        for input in &job.inputs {
            let blob = self.store.get(&input.key).await?;
            let name = source_name(&input.filename);
            out.push((name, blob.bytes));
        }
        Ok(out)
    }

    async fn run_pdf(&self, job: &Job, cancel: &CancellationToken, seq: &Arc<AtomicU64>) -> CfResult<ResultDescriptor> {
        let input = job
            .inputs
            .first()
            .ok_or_else(|| CfError::new(ErrorKind::MissingRequiredField, "pdf job requires one input"))?;
        let blob = self.store.get(&input.key).await?;

        let scratch = self.config.scratch_dir.join(job.id.to_string());
        tokio::fs::create_dir_all(&scratch).await?;
        let pdf_path = scratch.join(&input.filename);
        tokio::fs::write(&pdf_path, &blob.bytes).await?;

        let stem = source_name(&input.filename);
        let config = pdf_config_from_options(job);
        self.report(&job.id, seq, "extract", "extracting pdf", 15, None).await;
        if cancel.is_cancelled() {
            let _ = tokio::fs::remove_dir_all(&scratch).await;
            return Err(CfError::new(ErrorKind::Cancelled, "cancelled before extraction"));
        }

        let outcome = cf_pdf::extract_pdf(&pdf_path, &stem, config, self.gateway.clone()).await;
        let _ = tokio::fs::remove_dir_all(&scratch).await;
        let outcome = outcome?;

        if cancel.is_cancelled() {
            return Err(CfError::new(ErrorKind::Cancelled, "cancelled after extraction"));
        }
        self.report(&job.id, seq, "upload", "uploading results", 70, None).await;

        let mut output_keys = Vec::new();
        for (blob_key, bytes) in &outcome.image_blobs {
            let key = format!("jobs/{}/result/images/{blob_key}", job.id);
            self.store.put(&key, bytes, "image/png").await?;
            output_keys.push(key);
        }

        let unified = serde_json::json!({
            "meta": outcome.meta,
            "pages": outcome.pages,
            "stats": outcome.stats,
        });
        let unified_key = format!("jobs/{}/result/{stem}_unified.json", job.id);
        self.store.put(&unified_key, serde_json::to_vec_pretty(&unified)?.as_slice(), "application/json").await?;
        output_keys.push(unified_key.clone());

        let manifest = serde_json::json!({
            "unified_key": unified_key,
            "stats": outcome.stats,
        });
        let manifest_key = format!("jobs/{}/result/manifest.json", job.id);
        self.store.put(&manifest_key, serde_json::to_vec_pretty(&manifest)?.as_slice(), "application/json").await?;
        output_keys.push(manifest_key.clone());

        Ok(ResultDescriptor { manifest_key, output_keys })
    }

    async fn run_json(&self, job: &Job, cancel: &CancellationToken, seq: &Arc<AtomicU64>) -> CfResult<ResultDescriptor> {
        if job.inputs.is_empty() {
            return Err(CfError::new(ErrorKind::MissingRequiredField, "json job requires at least one input"));
        }
        let sources = self.download_inputs(job).await?;
        self.report(&job.id, seq, "parse", "parsing sources", 20, None).await;
        if cancel.is_cancelled() {
            return Err(CfError::new(ErrorKind::Cancelled, "cancelled before parsing"));
        }

        let enrich = job.option_bool("enrich", self.gateway.is_some());
        let config = cf_pipeline::PipelineConfig {
            max_concurrency: job.option_u64("max_concurrency", 8) as usize,
            enrich: enrich && self.gateway.is_some(),
            match_config: cf_match::MatchConfig::default(),
        };
        let inputs: Vec<cf_pipeline::SourceInput> =
            sources.into_iter().map(|(name, bytes)| cf_pipeline::SourceInput { name, bytes }).collect();

        let outcome = cf_pipeline::run_pipeline(inputs, self.gateway.clone(), config).await?;
        if cancel.is_cancelled() {
            return Err(CfError::new(ErrorKind::Cancelled, "cancelled after pipeline run"));
        }
        self.report(&job.id, seq, "upload", "uploading results", 80, None).await;

        let mut output_keys = Vec::new();
        for (source, items) in &outcome.items_by_source {
            let bytes = serde_json::to_vec_pretty(items)?;
            let source_key = format!("jobs/{}/result/{source}/{source}.json", job.id);
            self.store.put(&source_key, &bytes, "application/json").await?;
            output_keys.push(source_key);

            let enriched_key = format!("jobs/{}/result/llm_ready/enriched_{source}.json", job.id);
            self.store.put(&enriched_key, &bytes, "application/json").await?;
            output_keys.push(enriched_key);
        }

        let matches_key = format!("jobs/{}/result/matches/matches.json", job.id);
        self.store.put(&matches_key, serde_json::to_vec_pretty(&outcome.matches)?.as_slice(), "application/json").await?;
        output_keys.push(matches_key.clone());

        let report_key = format!("jobs/{}/result/report.md", job.id);
        self.store.put(&report_key, cf_pipeline::render_report(&outcome).as_bytes(), "text/markdown").await?;
        output_keys.push(report_key.clone());

        let manifest_key = format!("jobs/{}/result/manifest.json", job.id);
        let manifest = serde_json::json!({
            "sources": outcome.items_by_source.keys().collect::<Vec<_>>(),
            "matches_key": matches_key,
            "report_key": report_key,
            "duration_ms": outcome.duration_ms,
        });
        self.store.put(&manifest_key, serde_json::to_vec_pretty(&manifest)?.as_slice(), "application/json").await?;
        output_keys.push(manifest_key.clone());

        Ok(ResultDescriptor { manifest_key, output_keys })
    }

    async fn run_compress(&self, job: &Job, cancel: &CancellationToken, seq: &Arc<AtomicU64>) -> CfResult<ResultDescriptor> {
        let input = job
            .inputs
            .first()
            .ok_or_else(|| CfError::new(ErrorKind::MissingRequiredField, "compress job requires one input"))?;
        let blob = self.store.get(&input.key).await?;
        self.report(&job.id, seq, "compress", "compressing", 40, None).await;
        if cancel.is_cancelled() {
            return Err(CfError::new(ErrorKind::Cancelled, "cancelled before compression"));
        }

        let preset = match job.option_str("preset") {
            Some("fast") => cf_compress::Preset::Fast,
            Some("max") => cf_compress::Preset::Max,
            _ => cf_compress::Preset::Balanced,
        };
        let compressed = cf_compress::compress_bytes(&blob.bytes, preset)?;

        let output_key = format!("jobs/{}/result/{}.zst", job.id, input.filename);
        self.store.put(&output_key, &compressed, "application/zstd").await?;
        let manifest_key = format!("jobs/{}/result/manifest.json", job.id);
        let manifest = serde_json::json!({"output_key": output_key, "original_size": blob.bytes.len(), "compressed_size": compressed.len()});
        self.store.put(&manifest_key, serde_json::to_vec_pretty(&manifest)?.as_slice(), "application/json").await?;

        Ok(ResultDescriptor { manifest_key: manifest_key.clone(), output_keys: vec![output_key, manifest_key] })
    }

    async fn run_clean(&self, job: &Job, cancel: &CancellationToken, seq: &Arc<AtomicU64>) -> CfResult<ResultDescriptor> {
        let input = job
            .inputs
            .first()
            .ok_or_else(|| CfError::new(ErrorKind::MissingRequiredField, "clean job requires one input"))?;
        let blob = self.store.get(&input.key).await?;
        let parsed = cf_json::read_json(&blob.bytes, self.gateway.as_deref()).await?;
        self.report(&job.id, seq, "clean", "scrubbing secrets", 50, None).await;
        if cancel.is_cancelled() {
            return Err(CfError::new(ErrorKind::Cancelled, "cancelled before scrubbing"));
        }

        let recursive = job.option_bool("recursive", true);
        let (cleaned, redactions) = if recursive {
            let report = cf_scrub::scrub(&parsed.value);
            (report.value, report.redaction_count)
        } else {
            shallow_scrub(&parsed.value)
        };

        let output_key = format!("jobs/{}/result/cleaned.json", job.id);
        self.store.put(&output_key, serde_json::to_vec_pretty(&cleaned)?.as_slice(), "application/json").await?;
        let manifest_key = format!("jobs/{}/result/manifest.json", job.id);
        let manifest = serde_json::json!({"output_key": output_key, "redactions": redactions, "repairs": parsed.repairs});
        self.store.put(&manifest_key, serde_json::to_vec_pretty(&manifest)?.as_slice(), "application/json").await?;

        Ok(ResultDescriptor { manifest_key: manifest_key.clone(), output_keys: vec![output_key, manifest_key] })
    }

    async fn run_split(&self, job: &Job, cancel: &CancellationToken, seq: &Arc<AtomicU64>) -> CfResult<ResultDescriptor> {
        let input = job
            .inputs
            .first()
            .ok_or_else(|| CfError::new(ErrorKind::MissingRequiredField, "split job requires one input"))?;
        let blob = self.store.get(&input.key).await?;
        let parsed = cf_json::read_json(&blob.bytes, self.gateway.as_deref()).await?;
        let items = match parsed.value {
            serde_json::Value::Array(items) => items,
            other => vec![other],
        };

        let items_per_chunk = job.option_u64("items_per_chunk", 100).max(1) as usize;
        self.report(&job.id, seq, "split", "writing shards", 50, None).await;
        if cancel.is_cancelled() {
            return Err(CfError::new(ErrorKind::Cancelled, "cancelled before writing shards"));
        }

        let mut output_keys = Vec::new();
        for (shard_idx, chunk) in items.chunks(items_per_chunk).enumerate() {
            let key = format!("jobs/{}/result/shard-{shard_idx:04}.json", job.id);
            self.store.put(&key, serde_json::to_vec_pretty(chunk)?.as_slice(), "application/json").await?;
            output_keys.push(key);
        }

        let manifest_key = format!("jobs/{}/result/manifest.json", job.id);
        let manifest = serde_json::json!({"shard_count": output_keys.len(), "items_per_chunk": items_per_chunk, "total_items": items.len()});
        self.store.put(&manifest_key, serde_json::to_vec_pretty(&manifest)?.as_slice(), "application/json").await?;
        output_keys.push(manifest_key.clone());

        Ok(ResultDescriptor { manifest_key, output_keys })
    }
}

fn source_name(filename: &str) -> String {
    Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename)
        .to_string()
}

fn pdf_config_from_options(job: &Job) -> cf_pdf::ExtractionConfig {
    let mut config = cf_pdf::ExtractionConfig::default();
    if let Some(dpi) = job.options.get("dpi").and_then(|v| v.as_u64()) {
        config.dpi = dpi as u32;
    }
    config.table_extraction = job.option_bool("table_extraction", config.table_extraction);
    config.text_only = job.option_bool("text_only", config.text_only);
    config.start_page = job.options.get("start_page").and_then(|v| v.as_u64()).map(|n| n as u32);
    config.end_page = job.options.get("end_page").and_then(|v| v.as_u64()).map(|n| n as u32);
    config.max_images_per_document = job.options.get("max_images_per_document").and_then(|v| v.as_u64()).map(|n| n as usize);
    if let Some(mode) = job.option_str("raster_mode") {
        config.raster_mode = match mode {
            "off" => cf_pdf::RasterMode::Never,
            "manual" => cf_pdf::RasterMode::Manual,
            _ => cf_pdf::RasterMode::Auto,
        };
    }
    config.raster_pages = job.options.get("raster_pages").and_then(|v| v.as_array()).map(|arr| {
        arr.iter().filter_map(|v| v.as_u64()).map(|n| n as u32).collect()
    });
    config
}

/// Scrub only direct string fields of a top-level JSON object, leaving
/// nested structures untouched (spec §6 `recursive=false` for `clean` jobs).
fn shallow_scrub(value: &serde_json::Value) -> (serde_json::Value, usize) {
    let mut redactions = 0;
    let cleaned = match value {
        serde_json::Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                match v {
                    serde_json::Value::String(_) => {
                        let report = cf_scrub::scrub(v);
                        redactions += report.redaction_count;
                        out.insert(k.clone(), report.value);
                    }
                    other => {
                        out.insert(k.clone(), other.clone());
                    }
                }
            }
            serde_json::Value::Object(out)
        }
        other => other.clone(),
    };
    (cleaned, redactions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cf_blobstore::LocalBlobStore;

    async fn orchestrator() -> (Arc<Orchestrator<LocalBlobStore>>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LocalBlobStore::new(dir.path()));
        let ledger = Arc::new(Ledger::new(store.clone()));
        let mut config = OrchestratorConfig::default();
        config.scratch_dir = dir.path().join("scratch");
        let orch = Arc::new(Orchestrator::new(store, ledger, None, config));
        (orch, dir)
    }

    #[tokio::test]
    async fn submit_runs_a_split_job_to_completion() {
        let (orch, dir) = orchestrator().await;
        let store = LocalBlobStore::new(dir.path());
        store.put("inputs/items.json", br#"[{"id":1},{"id":2},{"id":3}]"#, "application/json").await.unwrap();

        let mut options = HashMap::new();
        options.insert("items_per_chunk".to_string(), serde_json::json!(2));
        let id = orch
            .submit(
                JobKind::Split,
                vec![InputDescriptor { key: "inputs/items.json".into(), filename: "items.json".into(), content_type: "application/json".into(), size_bytes: 10 }],
                options,
            )
            .await
            .unwrap();

        let job = wait_for_terminal(&orch, id).await;
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.result.is_some());
    }

    #[tokio::test]
    async fn submission_rejected_once_queue_depth_is_exhausted() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LocalBlobStore::new(dir.path()));
        let ledger = Arc::new(Ledger::new(store.clone()));
        let mut config = OrchestratorConfig::default();
        config.other = PoolSizing { workers: 1, queue_depth: 1 };
        config.scratch_dir = dir.path().join("scratch");
        let orch = Arc::new(Orchestrator::new(store.clone(), ledger, None, config));

        // Occupy the only backlog slot directly so the assertion below can't
        // race the first job running to completion before the second submit.
        assert!(orch.pools.try_admit("other"));

        store.put("inputs/a.json", b"[]", "application/json").await.unwrap();
        let input = InputDescriptor { key: "inputs/a.json".into(), filename: "a.json".into(), content_type: "application/json".into(), size_bytes: 2 };

        let rejected = orch.submit(JobKind::Split, vec![input], HashMap::new()).await;
        assert!(matches!(rejected, Err(e) if e.kind() == ErrorKind::SubmissionRejected));

        orch.pools.release("other");
    }

    #[tokio::test]
    async fn cancel_before_dispatch_ends_in_paused_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LocalBlobStore::new(dir.path()));
        let ledger = Arc::new(Ledger::new(store.clone()));
        let mut config = OrchestratorConfig::default();
        config.other = PoolSizing { workers: 1, queue_depth: 32 };
        config.scratch_dir = dir.path().join("scratch");
        let orch = Arc::new(Orchestrator::new(store.clone(), ledger, None, config));

        store.put("inputs/a.json", b"[1,2,3]", "application/json").await.unwrap();
        let input = InputDescriptor { key: "inputs/a.json".into(), filename: "a.json".into(), content_type: "application/json".into(), size_bytes: 7 };

        // Hold the bucket's only worker permit so the job is guaranteed to
        // still be waiting to dispatch when cancel() is observed.
        let semaphore = orch.pools.semaphore("other");
        let permit = semaphore.acquire().await.unwrap();

        let id = orch.submit(JobKind::Split, vec![input], HashMap::new()).await.unwrap();
        orch.cancel(id).await.unwrap();
        drop(permit);

        let job = wait_for_terminal(&orch, id).await;
        assert_eq!(job.status, JobStatus::Paused);
    }

    async fn wait_for_terminal(orch: &Arc<Orchestrator<LocalBlobStore>>, id: JobId) -> Job {
        for _ in 0..200 {
            if let Some(job) = orch.job(id).await.unwrap() {
                if matches!(job.status, JobStatus::Completed | JobStatus::Failed | JobStatus::Paused) {
                    return job;
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("job did not reach a terminal state in time");
    }
}
