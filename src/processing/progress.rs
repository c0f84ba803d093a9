//! Task progress registry shared by the orchestrator and polling handlers.
//!
//! Values `0..=99` mean in progress, `100` means complete, and [`PROGRESS_FAILED`] marks a failed
//! run. Progress never moves backwards and terminal values are final. Terminal entries are
//! evicted after a TTL, and the oldest terminal entries go first once the registry is full;
//! live tasks are never evicted.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Sentinel recorded when a run fails.
pub const PROGRESS_FAILED: i32 = -1;
/// Value recorded once chunking completes and embedding starts.
pub const PROGRESS_STARTED: i32 = 5;
/// Highest value reported before every batch has committed.
pub const PROGRESS_CEILING: i32 = 95;
/// Value recorded once every batch has committed.
pub const PROGRESS_COMPLETE: i32 = 100;

/// Progress for `processed` of `total` chunks: `5 + floor(90 * processed / total)`, capped at 95.
pub fn banded_progress(processed: usize, total: usize) -> i32 {
    if total == 0 {
        return PROGRESS_STARTED;
    }
    let processed = processed.min(total) as u64;
    let band = (90 * processed / total as u64) as i32;
    (PROGRESS_STARTED + band).min(PROGRESS_CEILING)
}

/// Errors returned by registry lookups.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProgressError {
    /// No task with this identifier is known (never created, or already evicted).
    #[error("task '{0}' not found")]
    NotFound(String),
}

/// Coarse task state derived from the progress value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Still running.
    InProgress,
    /// Every batch committed.
    Complete,
    /// Run aborted.
    Failed,
}

impl TaskStatus {
    fn from_progress(progress: i32) -> Self {
        if progress < 0 {
            Self::Failed
        } else if progress >= PROGRESS_COMPLETE {
            Self::Complete
        } else {
            Self::InProgress
        }
    }
}

/// Snapshot of one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskProgress {
    /// Current progress value.
    pub progress: i32,
    /// State implied by `progress`.
    pub status: TaskStatus,
    /// Chunk count, known once chunking completes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_chunks: Option<usize>,
}

#[derive(Debug)]
struct TaskEntry {
    progress: i32,
    total_chunks: Option<usize>,
    updated_at: Instant,
}

impl TaskEntry {
    fn is_terminal(&self) -> bool {
        self.progress < 0 || self.progress >= PROGRESS_COMPLETE
    }
}

/// In-memory, process-lifetime registry of task progress.
#[derive(Debug)]
pub struct ProgressRegistry {
    tasks: Mutex<HashMap<String, TaskEntry>>,
    ttl: Duration,
    max_tasks: usize,
}

impl ProgressRegistry {
    /// Create a registry evicting terminal tasks after `ttl` or when `max_tasks` is reached.
    pub fn new(ttl: Duration, max_tasks: usize) -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            ttl,
            max_tasks: max_tasks.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, TaskEntry>> {
        self.tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register `task_id` at progress 0, replacing any previous entry.
    pub fn create(&self, task_id: &str) {
        let mut tasks = self.lock();
        self.evict(&mut tasks);
        tasks.insert(
            task_id.to_string(),
            TaskEntry {
                progress: 0,
                total_chunks: None,
                updated_at: Instant::now(),
            },
        );
    }

    /// Record a new progress value.
    ///
    /// Returns `Ok(false)` when the update was ignored because it would move progress backwards
    /// or the task is already terminal. [`PROGRESS_FAILED`] is accepted from any live state.
    pub fn set(&self, task_id: &str, value: i32) -> Result<bool, ProgressError> {
        let mut tasks = self.lock();
        let entry = tasks
            .get_mut(task_id)
            .ok_or_else(|| ProgressError::NotFound(task_id.to_string()))?;
        if entry.is_terminal() {
            return Ok(false);
        }
        let value = value.min(PROGRESS_COMPLETE);
        if value != PROGRESS_FAILED && value < entry.progress {
            return Ok(false);
        }
        entry.progress = value;
        entry.updated_at = Instant::now();
        Ok(true)
    }

    /// Mark `task_id` failed.
    pub fn fail(&self, task_id: &str) -> Result<bool, ProgressError> {
        self.set(task_id, PROGRESS_FAILED)
    }

    /// Record the chunk count of a run.
    pub fn set_total_chunks(&self, task_id: &str, total: usize) -> Result<(), ProgressError> {
        let mut tasks = self.lock();
        let entry = tasks
            .get_mut(task_id)
            .ok_or_else(|| ProgressError::NotFound(task_id.to_string()))?;
        entry.total_chunks = Some(total);
        Ok(())
    }

    /// Current progress of `task_id`.
    pub fn get(&self, task_id: &str) -> Result<TaskProgress, ProgressError> {
        let tasks = self.lock();
        let entry = tasks
            .get(task_id)
            .ok_or_else(|| ProgressError::NotFound(task_id.to_string()))?;
        Ok(TaskProgress {
            progress: entry.progress,
            status: TaskStatus::from_progress(entry.progress),
            total_chunks: entry.total_chunks,
        })
    }

    /// Number of tracked tasks.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no tasks are tracked.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn evict(&self, tasks: &mut HashMap<String, TaskEntry>) {
        let now = Instant::now();
        let before = tasks.len();
        tasks.retain(|_, entry| {
            !(entry.is_terminal() && now.duration_since(entry.updated_at) >= self.ttl)
        });

        if tasks.len() >= self.max_tasks {
            let mut terminal: Vec<(Instant, String)> = tasks
                .iter()
                .filter(|(_, entry)| entry.is_terminal())
                .map(|(id, entry)| (entry.updated_at, id.clone()))
                .collect();
            terminal.sort();
            let excess = tasks.len() + 1 - self.max_tasks;
            for (_, id) in terminal.into_iter().take(excess) {
                tasks.remove(&id);
            }
            if tasks.len() >= self.max_tasks {
                tracing::warn!(
                    tracked = tasks.len(),
                    max_tasks = self.max_tasks,
                    "Progress registry full of live tasks; growing past limit"
                );
            }
        }

        let evicted = before - tasks.len();
        if evicted > 0 {
            tracing::debug!(evicted, remaining = tasks.len(), "Evicted finished tasks");
        }
    }
}

impl Default for ProgressRegistry {
    fn default() -> Self {
        Self::new(Duration::from_secs(3600), 1024)
    }
}
