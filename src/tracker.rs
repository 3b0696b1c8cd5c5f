//! Completion tracking for launched request tasks.
//!
//! The dispatcher registers each task before spawning it and hands the task
//! a [`Pending`] guard. Dropping the guard marks the task done, so every exit
//! path (success, error, panic unwind) is counted exactly once. `join` waits
//! until the outstanding count drops back to zero.

use std::sync::Arc;
use tokio::sync::watch;

/// Register/done/join primitive.
#[derive(Debug)]
pub struct CompletionTracker {
    outstanding: Arc<watch::Sender<u64>>,
}

/// One registered unit of work. Marks itself done when dropped.
#[derive(Debug)]
#[must_use = "dropping the guard immediately marks the work as done"]
pub struct Pending {
    outstanding: Arc<watch::Sender<u64>>,
}

impl CompletionTracker {
    pub fn new() -> Self {
        let (outstanding, _) = watch::channel(0);
        Self {
            outstanding: Arc::new(outstanding),
        }
    }

    /// Register one unit of work. Must happen before the work starts.
    pub fn register(&self) -> Pending {
        self.outstanding.send_modify(|n| *n += 1);
        Pending {
            outstanding: Arc::clone(&self.outstanding),
        }
    }

    /// Units registered but not yet done.
    pub fn outstanding(&self) -> u64 {
        *self.outstanding.borrow()
    }

    /// Wait until every registered unit is done.
    ///
    /// Returns immediately when nothing is outstanding.
    pub async fn join(&self) {
        let mut rx = self.outstanding.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

impl Default for CompletionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl Pending {
    /// Mark the work done. Equivalent to dropping the guard.
    pub fn done(self) {}
}

impl Drop for Pending {
    fn drop(&mut self) {
        self.outstanding.send_modify(|n| *n -= 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_join_with_nothing_registered() {
        let tracker = CompletionTracker::new();
        tracker.join().await;
        assert_eq!(tracker.outstanding(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_waits_for_last_done() {
        let tracker = Arc::new(CompletionTracker::new());
        let guards: Vec<Pending> = (0..10).map(|_| tracker.register()).collect();
        assert_eq!(tracker.outstanding(), 10);

        let join = {
            let tracker = Arc::clone(&tracker);
            tokio::spawn(async move { tracker.join().await })
        };

        // Finish in reverse order with gaps; join must still be pending
        // until the very last guard is released.
        let mut guards = guards;
        while guards.len() > 1 {
            guards.pop().unwrap().done();
            tokio::time::sleep(Duration::from_millis(5)).await;
            assert!(!join.is_finished());
        }
        assert_eq!(tracker.outstanding(), 1);

        drop(guards);
        join.await.unwrap();
        assert_eq!(tracker.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_done_from_concurrent_tasks() {
        let tracker = Arc::new(CompletionTracker::new());
        for i in 0..100u64 {
            let pending = tracker.register();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(i % 7)).await;
                pending.done();
            });
        }
        tracker.join().await;
        assert_eq!(tracker.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_panicking_task_still_counts_as_done() {
        let tracker = CompletionTracker::new();
        let pending = tracker.register();
        let handle = tokio::spawn(async move {
            let _pending = pending;
            panic!("boom");
        });
        assert!(handle.await.is_err());
        tracker.join().await;
    }
}
