use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing indexing activity since startup.
#[derive(Debug, Default)]
pub struct IndexingMetrics {
    tasks_started: AtomicU64,
    tasks_completed: AtomicU64,
    tasks_failed: AtomicU64,
    documents_indexed: AtomicU64,
    chunks_indexed: AtomicU64,
}

impl IndexingMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an accepted indexing run.
    pub fn record_task_started(&self) {
        self.tasks_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a run that reached 100% with the documents and chunks it indexed.
    pub fn record_task_completed(&self, documents: u64, chunks: u64) {
        self.tasks_completed.fetch_add(1, Ordering::Relaxed);
        self.documents_indexed
            .fetch_add(documents, Ordering::Relaxed);
        self.chunks_indexed.fetch_add(chunks, Ordering::Relaxed);
    }

    /// Record a run that ended on the failure sentinel.
    pub fn record_task_failed(&self) {
        self.tasks_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            tasks_started: self.tasks_started.load(Ordering::Relaxed),
            tasks_completed: self.tasks_completed.load(Ordering::Relaxed),
            tasks_failed: self.tasks_failed.load(Ordering::Relaxed),
            documents_indexed: self.documents_indexed.load(Ordering::Relaxed),
            chunks_indexed: self.chunks_indexed.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of indexing counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Runs accepted.
    pub tasks_started: u64,
    /// Runs that reached 100%.
    pub tasks_completed: u64,
    /// Runs that failed.
    pub tasks_failed: u64,
    /// Documents indexed by completed runs.
    pub documents_indexed: u64,
    /// Chunks upserted by completed runs.
    pub chunks_indexed: u64,
}
