use cf_blobstore::BlobStore;
use cf_core::{CfResult, Job, JobId, ProgressEvent, ProgressSnapshot};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

const EVENT_BROADCAST_CAPACITY: usize = 256;

fn job_prefix(job_id: JobId) -> String {
    format!("jobs/{job_id}")
}

fn event_key(job_id: JobId, seq: u64) -> String {
    format!("jobs/{job_id}/progress/history/{seq:010}.json")
}

fn latest_key(job_id: JobId) -> String {
    format!("jobs/{job_id}/progress/latest.json")
}

fn job_record_key(job_id: JobId) -> String {
    format!("jobs/{job_id}/job.json")
}

/// Durable, append-only progress history plus in-process fan-out for C2.
///
/// Every [`ProgressEvent`] is written under its job's `progress/history/`
/// prefix before the in-memory `latest.json` snapshot is updated, so a reader
/// can always reconstruct full history even if no one was subscribed live.
/// Subscribers reachable through [`Ledger::subscribe`] are orchestrator-internal
/// only — this is not a WebSocket or HTTP surface (see spec §4.2).
pub struct Ledger<S> {
    store: Arc<S>,
    senders: Mutex<HashMap<JobId, broadcast::Sender<ProgressEvent>>>,
}

impl<S: BlobStore> Ledger<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            senders: Mutex::new(HashMap::new()),
        }
    }

    /// Persist the full job record (spec §4.2 durability: job state survives restarts).
    pub async fn save_job(&self, job: &Job) -> CfResult<()> {
        let bytes = serde_json::to_vec_pretty(job)?;
        self.store.put(&job_record_key(job.id), &bytes, "application/json").await
    }

    pub async fn load_job(&self, job_id: JobId) -> CfResult<Option<Job>> {
        if !self.store.exists(&job_record_key(job_id)).await? {
            return Ok(None);
        }
        let blob = self.store.get(&job_record_key(job_id)).await?;
        Ok(Some(serde_json::from_slice(&blob.bytes)?))
    }

    /// List every job id with a persisted record, for restart recovery.
    pub async fn list_job_ids(&self) -> CfResult<Vec<JobId>> {
        let metas = self.store.list("jobs").await?;
        let mut ids = Vec::new();
        for meta in metas {
            if let Some(id_str) = meta.key.strip_prefix("jobs/").and_then(|s| s.split('/').next()) {
                if let Ok(id) = id_str.parse::<JobId>() {
                    if !ids.contains(&id) {
                        ids.push(id);
                    }
                }
            }
        }
        Ok(ids)
    }

    /// Record one progress event: history first, then the latest snapshot,
    /// then fan it out to any live in-process subscribers.
    pub async fn record(&self, event: ProgressEvent) -> CfResult<()> {
        let bytes = serde_json::to_vec(&event)?;
        self.store.put(&event_key(event.job_id, event.seq), &bytes, "application/json").await?;

        let snapshot = ProgressSnapshot {
            job_id: event.job_id,
            status: status_hint(&event),
            progress: event.progress,
            last_seq: event.seq,
            phase: event.phase.clone(),
            step: event.step.clone(),
            updated_at: event.timestamp,
        };
        let snap_bytes = serde_json::to_vec_pretty(&snapshot)?;
        self.store.put(&latest_key(event.job_id), &snap_bytes, "application/json").await?;

        let senders = self.senders.lock().await;
        if let Some(tx) = senders.get(&event.job_id) {
            let _ = tx.send(event);
        }
        Ok(())
    }

    pub async fn latest(&self, job_id: JobId) -> CfResult<Option<ProgressSnapshot>> {
        if !self.store.exists(&latest_key(job_id)).await? {
            return Ok(None);
        }
        let blob = self.store.get(&latest_key(job_id)).await?;
        Ok(Some(serde_json::from_slice(&blob.bytes)?))
    }

    /// Full ordered event history, reconstructed from individually-keyed
    /// history entries (each written atomically by [`Ledger::record`]).
    pub async fn history(&self, job_id: JobId) -> CfResult<Vec<ProgressEvent>> {
        let mut metas = self.store.list(&format!("{}/progress/history", job_prefix(job_id))).await?;
        metas.sort_by(|a, b| a.key.cmp(&b.key));
        let mut events = Vec::with_capacity(metas.len());
        for meta in metas {
            let blob = self.store.get(&meta.key).await?;
            events.push(serde_json::from_slice(&blob.bytes)?);
        }
        Ok(events)
    }

    /// Subscribe to live progress events for a job. Creates the broadcast
    /// channel lazily on first subscriber; subsequent `record` calls fan out
    /// to everyone currently subscribed.
    pub async fn subscribe(&self, job_id: JobId) -> broadcast::Receiver<ProgressEvent> {
        let mut senders = self.senders.lock().await;
        senders
            .entry(job_id)
            .or_insert_with(|| broadcast::channel(EVENT_BROADCAST_CAPACITY).0)
            .subscribe()
    }

    /// Drop the broadcast sender for a finished job so it stops holding memory.
    pub async fn forget(&self, job_id: JobId) {
        self.senders.lock().await.remove(&job_id);
    }
}

/// The snapshot's status must always equal the status implied by the
/// highest-sequence event's `phase` (spec §8) — a `failed`/`cancelled` event
/// recorded mid-progress must not read back as `Running` just because
/// `progress` hasn't reached 100.
fn status_hint(event: &ProgressEvent) -> cf_core::JobStatus {
    match event.phase.as_str() {
        "failed" => cf_core::JobStatus::Failed,
        "cancelled" => cf_core::JobStatus::Paused,
        "success" => cf_core::JobStatus::Completed,
        _ => cf_core::JobStatus::Running,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cf_blobstore::LocalBlobStore;
    use cf_core::JobKind;

    fn sample_event(job_id: JobId, seq: u64, progress: u8) -> ProgressEvent {
        ProgressEvent {
            job_id,
            seq,
            timestamp: chrono::Utc::now(),
            phase: "extract".into(),
            step: format!("page-{seq}"),
            progress,
            metadata: Default::default(),
            worker_id: Some("worker-0".into()),
        }
    }

    #[tokio::test]
    async fn record_then_latest_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LocalBlobStore::new(dir.path()));
        let ledger = Ledger::new(store);
        let job_id = JobId::new();
        ledger.record(sample_event(job_id, 0, 10)).await.unwrap();
        ledger.record(sample_event(job_id, 1, 50)).await.unwrap();
        let snap = ledger.latest(job_id).await.unwrap().unwrap();
        assert_eq!(snap.last_seq, 1);
        assert_eq!(snap.progress, 50);
    }

    #[tokio::test]
    async fn history_is_ordered_by_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LocalBlobStore::new(dir.path()));
        let ledger = Ledger::new(store);
        let job_id = JobId::new();
        for seq in 0..5 {
            ledger.record(sample_event(job_id, seq, (seq * 20) as u8)).await.unwrap();
        }
        let history = ledger.history(job_id).await.unwrap();
        let seqs: Vec<u64> = history.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn subscribers_receive_recorded_events() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LocalBlobStore::new(dir.path()));
        let ledger = Ledger::new(store);
        let job_id = JobId::new();
        let mut rx = ledger.subscribe(job_id).await;
        ledger.record(sample_event(job_id, 0, 5)).await.unwrap();
        let got = rx.recv().await.unwrap();
        assert_eq!(got.seq, 0);
    }

    #[tokio::test]
    async fn failed_event_below_full_progress_yields_failed_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LocalBlobStore::new(dir.path()));
        let ledger = Ledger::new(store);
        let job_id = JobId::new();
        let mut event = sample_event(job_id, 0, 60);
        event.phase = "failed".into();
        ledger.record(event).await.unwrap();
        let snap = ledger.latest(job_id).await.unwrap().unwrap();
        assert_eq!(snap.status, cf_core::JobStatus::Failed);
    }

    #[tokio::test]
    async fn cancelled_event_yields_paused_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LocalBlobStore::new(dir.path()));
        let ledger = Ledger::new(store);
        let job_id = JobId::new();
        let mut event = sample_event(job_id, 0, 40);
        event.phase = "cancelled".into();
        ledger.record(event).await.unwrap();
        let snap = ledger.latest(job_id).await.unwrap().unwrap();
        assert_eq!(snap.status, cf_core::JobStatus::Paused);
    }

    #[tokio::test]
    async fn save_and_load_job_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LocalBlobStore::new(dir.path()));
        let ledger = Ledger::new(store);
        let job = Job::new(JobKind::Pdf, vec![], Default::default(), 3);
        let id = job.id;
        ledger.save_job(&job).await.unwrap();
        let loaded = ledger.load_job(id).await.unwrap().unwrap();
        assert_eq!(loaded.id, id);
        assert_eq!(loaded.kind, JobKind::Pdf);
    }

    #[tokio::test]
    async fn list_job_ids_finds_persisted_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LocalBlobStore::new(dir.path()));
        let ledger = Ledger::new(store);
        let job = Job::new(JobKind::JsonUnified, vec![], Default::default(), 3);
        ledger.save_job(&job).await.unwrap();
        let ids = ledger.list_job_ids().await.unwrap();
        assert!(ids.contains(&job.id));
    }
}
