use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// One worker-pool bucket: a semaphore bounding in-flight concurrency plus an
/// admitted-job counter bounding the backlog (spec §5 per-kind pools,
/// generalized from the teacher's per-operation `Semaphore` to job level).
struct Bucket {
    semaphore: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
    max_queue_depth: usize,
}

pub struct WorkerPools {
    buckets: HashMap<&'static str, Bucket>,
}

#[derive(Debug, Clone, Copy)]
pub struct PoolSizing {
    pub workers: usize,
    pub queue_depth: usize,
}

impl WorkerPools {
    pub fn new(pdf: PoolSizing, json_unified: PoolSizing, other: PoolSizing) -> Self {
        let mut buckets = HashMap::new();
        buckets.insert(
            "pdf",
            Bucket {
                semaphore: Arc::new(Semaphore::new(pdf.workers.max(1))),
                in_flight: Arc::new(AtomicUsize::new(0)),
                max_queue_depth: pdf.queue_depth,
            },
        );
        buckets.insert(
            "json-unified",
            Bucket {
                semaphore: Arc::new(Semaphore::new(json_unified.workers.max(1))),
                in_flight: Arc::new(AtomicUsize::new(0)),
                max_queue_depth: json_unified.queue_depth,
            },
        );
        buckets.insert(
            "other",
            Bucket {
                semaphore: Arc::new(Semaphore::new(other.workers.max(1))),
                in_flight: Arc::new(AtomicUsize::new(0)),
                max_queue_depth: other.queue_depth,
            },
        );
        Self { buckets }
    }

    /// Try to admit one more job into `bucket`'s backlog. Returns `false`
    /// (backpressure, spec §5) if the bucket is already at its queue-depth
    /// limit.
    pub fn try_admit(&self, bucket: &str) -> bool {
        let Some(b) = self.buckets.get(bucket) else { return true };
        loop {
            let current = b.in_flight.load(Ordering::SeqCst);
            if current >= b.max_queue_depth {
                return false;
            }
            if b.in_flight
                .compare_exchange(current, current + 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return true;
            }
        }
    }

    /// Release the backlog slot for a job that has reached a terminal state.
    pub fn release(&self, bucket: &str) {
        if let Some(b) = self.buckets.get(bucket) {
            b.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// The concurrency-bounding semaphore for `bucket`'s worker pool.
    pub fn semaphore(&self, bucket: &str) -> Arc<Semaphore> {
        self.buckets
            .get(bucket)
            .map(|b| b.semaphore.clone())
            .unwrap_or_else(|| Arc::new(Semaphore::new(1)))
    }

    pub fn in_flight(&self, bucket: &str) -> usize {
        self.buckets.get(bucket).map(|b| b.in_flight.load(Ordering::SeqCst)).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizing(workers: usize, queue_depth: usize) -> PoolSizing {
        PoolSizing { workers, queue_depth }
    }

    #[test]
    fn admits_up_to_queue_depth_then_rejects() {
        let pools = WorkerPools::new(sizing(4, 2), sizing(2, 2), sizing(4, 2));
        assert!(pools.try_admit("pdf"));
        assert!(pools.try_admit("pdf"));
        assert!(!pools.try_admit("pdf"));
    }

    #[test]
    fn release_frees_a_backlog_slot() {
        let pools = WorkerPools::new(sizing(4, 1), sizing(2, 1), sizing(4, 1));
        assert!(pools.try_admit("pdf"));
        assert!(!pools.try_admit("pdf"));
        pools.release("pdf");
        assert!(pools.try_admit("pdf"));
    }

    #[test]
    fn buckets_are_independent() {
        let pools = WorkerPools::new(sizing(4, 1), sizing(2, 1), sizing(4, 1));
        assert!(pools.try_admit("pdf"));
        assert!(pools.try_admit("json-unified"));
        assert!(pools.try_admit("other"));
    }
}
