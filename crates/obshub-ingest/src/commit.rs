//! Commit batching.
//!
//! Writes land in the store immediately. A durable commit runs at most once
//! per `min_period` as writes arrive, and a background flush task commits
//! trailing writes once the period has passed.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use obshub_db::{ObsSystemDatabase, StoreError};
use tokio::time::sleep;

/// Shortest interval between flush checks.
const MIN_FLUSH_INTERVAL: Duration = Duration::from_millis(100);

struct CommitState {
    last_commit: Instant,
    pending: u64,
}

/// Decides when written data is committed.
pub struct CommitScheduler {
    db: Arc<dyn ObsSystemDatabase>,
    min_period: Duration,
    state: Mutex<CommitState>,
}

impl CommitScheduler {
    pub fn new(db: Arc<dyn ObsSystemDatabase>, min_period: Duration) -> Self {
        Self {
            db,
            min_period,
            state: Mutex::new(CommitState {
                last_commit: Instant::now(),
                pending: 0,
            }),
        }
    }

    pub fn min_period(&self) -> Duration {
        self.min_period
    }

    fn state(&self) -> MutexGuard<'_, CommitState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Writes made since the last successful commit.
    pub fn pending_writes(&self) -> u64 {
        self.state().pending
    }

    /// Notes a write and commits if more than the minimum period has passed
    /// since the previous commit. Returns whether a commit ran.
    ///
    /// # Errors
    ///
    /// Returns the commit failure; the write stays pending.
    pub fn record_write(&self) -> Result<bool, StoreError> {
        let mut state = self.state();
        state.pending += 1;
        if state.last_commit.elapsed() > self.min_period {
            self.commit_locked(&mut state)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Commits pending writes once the minimum period has passed.
    ///
    /// # Errors
    ///
    /// Returns the commit failure.
    pub fn flush_if_due(&self) -> Result<bool, StoreError> {
        let mut state = self.state();
        if state.pending > 0 && state.last_commit.elapsed() >= self.min_period {
            self.commit_locked(&mut state)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Commits now, regardless of the period.
    ///
    /// # Errors
    ///
    /// Returns the commit failure.
    pub fn commit_now(&self) -> Result<(), StoreError> {
        let mut state = self.state();
        self.commit_locked(&mut state)
    }

    fn commit_locked(&self, state: &mut CommitState) -> Result<(), StoreError> {
        self.db.commit()?;
        tracing::debug!(writes = state.pending, "committed pending writes");
        state.last_commit = Instant::now();
        state.pending = 0;
        Ok(())
    }
}

/// Periodically commits trailing writes. Runs until aborted.
pub async fn run_flush_task(scheduler: Arc<CommitScheduler>) {
    let interval = scheduler.min_period().max(MIN_FLUSH_INTERVAL);
    tracing::debug!(interval_ms = interval.as_millis() as u64, "starting commit flush task");

    loop {
        sleep(interval).await;

        let s = scheduler.clone();
        let result = tokio::task::spawn_blocking(move || s.flush_if_due()).await;

        match result {
            Ok(Ok(true)) => tracing::trace!("flushed pending writes"),
            Ok(Ok(false)) => {}
            Ok(Err(e)) => {
                tracing::error!(error = %e, "failed to commit pending writes");
            }
            Err(e) => {
                tracing::error!(error = %e, "commit flush panicked or was cancelled");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obshub_db::SqliteDatabase;

    fn db() -> Arc<dyn ObsSystemDatabase> {
        Arc::new(SqliteDatabase::open_in_memory(1).expect("in-memory db"))
    }

    #[test]
    fn writes_within_the_period_are_batched() {
        let commits = CommitScheduler::new(db(), Duration::from_secs(3600));
        assert!(!commits.record_write().expect("write"));
        assert!(!commits.record_write().expect("write"));
        assert_eq!(commits.pending_writes(), 2);
        assert!(!commits.flush_if_due().expect("flush"), "period has not passed");

        commits.commit_now().expect("commit");
        assert_eq!(commits.pending_writes(), 0);
    }

    #[test]
    fn writes_after_the_period_commit() {
        let commits = CommitScheduler::new(db(), Duration::ZERO);
        std::thread::sleep(Duration::from_millis(2));
        assert!(commits.record_write().expect("write"));
        assert_eq!(commits.pending_writes(), 0);
        assert!(!commits.flush_if_due().expect("flush"), "nothing pending");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn flush_task_commits_trailing_writes() {
        let commits = Arc::new(CommitScheduler::new(db(), Duration::from_millis(50)));
        commits.record_write().expect("write");
        let task = tokio::spawn(run_flush_task(commits.clone()));

        let mut flushed = false;
        for _ in 0..50 {
            sleep(Duration::from_millis(20)).await;
            if commits.pending_writes() == 0 {
                flushed = true;
                break;
            }
        }
        task.abort();
        assert!(flushed, "flush task should commit the pending write");
    }
}
