//! Deferred deletion of generated artifacts.
//!
//! [`RetentionScheduler`] keeps a min-heap of due times served by a single
//! background task. Pending deletions live only in memory, so
//! [`sweep_expired`] is run at startup and periodically to catch anything a
//! restart dropped.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Default lifetime of a generated artifact
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Default)]
struct Queue {
    entries: Mutex<BinaryHeap<Reverse<(Instant, PathBuf)>>>,
    wake: Notify,
}

impl Queue {
    fn lock(&self) -> std::sync::MutexGuard<'_, BinaryHeap<Reverse<(Instant, PathBuf)>>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn next_due(&self) -> Option<Instant> {
        self.lock().peek().map(|Reverse((due, _))| *due)
    }

    fn pop_due(&self, now: Instant) -> Vec<PathBuf> {
        let mut entries = self.lock();
        let mut due = Vec::new();
        while let Some(Reverse((when, _))) = entries.peek() {
            if *when > now {
                break;
            }
            if let Some(Reverse((_, path))) = entries.pop() {
                due.push(path);
            }
        }
        due
    }
}

/// Process-wide registry of "delete this path later" requests
pub struct RetentionScheduler {
    queue: Arc<Queue>,
    worker: JoinHandle<()>,
}

impl RetentionScheduler {
    /// Spawn the background worker on the current tokio runtime
    pub fn start() -> Self {
        let queue = Arc::new(Queue::default());
        let worker = tokio::spawn(run_worker(queue.clone()));
        Self { queue, worker }
    }

    /// Delete `path` once `delay` has elapsed
    pub fn schedule(&self, path: impl Into<PathBuf>, delay: Duration) {
        let path = path.into();
        let due = Instant::now() + delay;
        tracing::debug!("Scheduled deletion of {} in {:?}", path.display(), delay);

        self.queue.lock().push(Reverse((due, path)));
        self.queue.wake.notify_one();
    }

    /// Number of deletions still waiting
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }
}

impl Drop for RetentionScheduler {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

async fn run_worker(queue: Arc<Queue>) {
    loop {
        match queue.next_due() {
            Some(due) if due <= Instant::now() => {
                for path in queue.pop_due(Instant::now()) {
                    remove_path(&path).await;
                }
            }
            Some(due) => {
                tokio::select! {
                    _ = tokio::time::sleep_until(due) => {}
                    _ = queue.wake.notified() => {}
                }
            }
            None => queue.wake.notified().await,
        }
    }
}

async fn remove_path(path: &Path) {
    let result = match tokio::fs::symlink_metadata(path).await {
        Ok(metadata) if metadata.is_dir() => tokio::fs::remove_dir_all(path).await,
        Ok(_) => tokio::fs::remove_file(path).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => tracing::info!("Deleted expired file: {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("Expired file already gone: {}", path.display())
        }
        Err(e) => tracing::warn!("Failed to delete {}: {}", path.display(), e),
    }
}

/// Outcome of an age-based sweep
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub removed: Vec<PathBuf>,
    pub failed: usize,
}

/// Remove entries of `dir` last modified more than `max_age` ago.
///
/// A missing directory is treated as empty.
pub async fn sweep_expired(dir: &Path, max_age: Duration) -> std::io::Result<SweepReport> {
    let mut report = SweepReport::default();

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(report),
        Err(e) => return Err(e),
    };

    let now = SystemTime::now();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let metadata = match entry.metadata().await {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::warn!("Failed to inspect {}: {}", path.display(), e);
                report.failed += 1;
                continue;
            }
        };

        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok());
        if !matches!(age, Some(age) if age > max_age) {
            continue;
        }

        let removed = if metadata.is_dir() {
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        };

        match removed {
            Ok(()) => {
                tracing::info!("Deleted old file: {}", path.display());
                report.removed.push(path);
            }
            Err(e) => {
                tracing::warn!("Failed to delete {}: {}", path.display(), e);
                report.failed += 1;
            }
        }
    }

    Ok(report)
}

/// Sweep `dirs` now and then every `interval`, until the handle is aborted
pub fn spawn_sweeper(dirs: Vec<PathBuf>, max_age: Duration, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            for dir in &dirs {
                match sweep_expired(dir, max_age).await {
                    Ok(report) if !report.removed.is_empty() => tracing::info!(
                        "Swept {} expired entries from {}",
                        report.removed.len(),
                        dir.display()
                    ),
                    Ok(_) => {}
                    Err(e) => tracing::warn!("Sweep of {} failed: {}", dir.display(), e),
                }
            }
        }
    })
}
