//! Background Refresh Supervisor
//!
//! Owns the detached refreshes started by stale cache hits. Tasks are
//! tracked by a `TaskTracker` the supervisor keeps for its whole life, so
//! waiting on them can be abandoned without touching the tasks themselves.
//! A cancellation token lets shutdown stop whatever is still running.

use std::future::Future;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

/// Supervised pool of fire-and-forget refresh tasks.
#[derive(Debug)]
pub struct RefreshSupervisor {
    tasks: TaskTracker,
    cancel: CancellationToken,
}

impl Default for RefreshSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshSupervisor {
    pub fn new() -> Self {
        let tasks = TaskTracker::new();
        // Closed for good: `wait` then resolves whenever the tracker is empty
        tasks.close();
        Self {
            tasks,
            cancel: CancellationToken::new(),
        }
    }

    /// Starts `task` unless the supervisor has been shut down.
    ///
    /// Returns `false` when the task was dropped without running. Must be
    /// called from inside a tokio runtime.
    pub fn spawn<F>(&self, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.cancel.is_cancelled() {
            debug!("Refresh supervisor is shut down, dropping task");
            return false;
        }

        let cancel = self.cancel.clone();
        self.tasks.spawn(async move {
            let refresh = tokio::spawn(async move {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => debug!("Refresh cancelled by shutdown"),
                    _ = task => {}
                }
            });
            if let Err(err) = refresh.await {
                if err.is_panic() {
                    warn!("Background refresh panicked: {}", err);
                }
            }
        });
        true
    }

    /// Number of tasks still running.
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Waits until no task is running. Dropping this future leaves the
    /// tasks running.
    pub async fn wait_idle(&self) {
        self.tasks.wait().await;
    }

    /// Cancels outstanding tasks, waits for them, and refuses new ones.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let pending = self.tasks.len();
        self.tasks.wait().await;
        debug!("Refresh supervisor stopped ({} pending tasks)", pending);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_spawned_task_runs() {
        let supervisor = RefreshSupervisor::new();
        let runs = Arc::new(AtomicUsize::new(0));

        let counter = runs.clone();
        assert!(supervisor.spawn(async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        supervisor.wait_idle().await;

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(supervisor.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_running_tasks() {
        let supervisor = RefreshSupervisor::new();
        let finished = Arc::new(AtomicUsize::new(0));

        let counter = finished.clone();
        supervisor.spawn(async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::timeout(Duration::from_secs(1), supervisor.shutdown())
            .await
            .expect("shutdown should not wait for the sleeping task");
        assert_eq!(finished.load(Ordering::SeqCst), 0);
        assert!(supervisor.is_shut_down());
    }

    #[tokio::test]
    async fn test_spawn_after_shutdown_is_refused() {
        let supervisor = RefreshSupervisor::new();
        supervisor.shutdown().await;

        assert!(!supervisor.spawn(async {}));
        assert_eq!(supervisor.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_abandoned_wait_leaves_tasks_running() {
        let supervisor = RefreshSupervisor::new();
        let finished = Arc::new(AtomicUsize::new(0));

        let counter = finished.clone();
        supervisor.spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let waited = tokio::time::timeout(Duration::from_millis(10), supervisor.wait_idle()).await;
        assert!(waited.is_err());
        assert_eq!(supervisor.in_flight(), 1);

        supervisor.wait_idle().await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert_eq!(supervisor.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_panicking_task_is_contained() {
        let supervisor = RefreshSupervisor::new();
        supervisor.spawn(async {
            panic!("refresh blew up");
        });

        supervisor.wait_idle().await;
        assert!(supervisor.spawn(async {}));
        supervisor.wait_idle().await;
    }
}
