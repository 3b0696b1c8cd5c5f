//! Burst dispatcher and request tasks.
//!
//! The dispatcher launches one batch of request tasks, sleeps for the ramp
//! interval and repeats until the plan's total has been fired. It never waits
//! for tasks to finish; callers do that through the [`CompletionTracker`].
//!
//! There is no cancellation path. Once dispatch starts, every planned task is
//! launched and every launched task runs its statement to completion.

use crate::error::RampError;
use crate::plan::WorkloadPlan;
use crate::pool::ConnectionPool;
use crate::state::RunState;
use crate::tracker::{CompletionTracker, Pending};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error};

/// Receiving end of the failure channel shared by all request tasks.
pub type FailureReceiver = mpsc::UnboundedReceiver<RampError>;

/// Drives the ramp schedule.
pub struct Dispatcher {
    plan: WorkloadPlan,
    statement: Arc<str>,
    pool: Arc<dyn ConnectionPool>,
    state: Arc<RunState>,
    tracker: Arc<CompletionTracker>,
    failures: mpsc::UnboundedSender<RampError>,
}

impl Dispatcher {
    /// Create a dispatcher and the channel its tasks report failures on.
    pub fn new(
        plan: WorkloadPlan,
        statement: impl Into<Arc<str>>,
        pool: Arc<dyn ConnectionPool>,
        state: Arc<RunState>,
        tracker: Arc<CompletionTracker>,
    ) -> (Self, FailureReceiver) {
        let (failures, rx) = mpsc::unbounded_channel();
        let dispatcher = Self {
            plan,
            statement: statement.into(),
            pool,
            state,
            tracker,
            failures,
        };
        (dispatcher, rx)
    }

    /// Launch every planned task. Returns once the last batch is out.
    pub async fn run(&self) {
        let total = self.plan.total_requests;
        let interval = self.plan.interval();

        while self.state.fired() < total {
            let round = self.plan.batch_size.min(total - self.state.fired());
            for _ in 0..round {
                let sequence = self.state.record_fired();
                let task = RequestTask {
                    sequence,
                    statement: Arc::clone(&self.statement),
                    pool: Arc::clone(&self.pool),
                    state: Arc::clone(&self.state),
                    failures: self.failures.clone(),
                    pending: self.tracker.register(),
                };
                tokio::spawn(task.run());
            }
            self.state.record_batch();
            debug!(
                fired = self.state.fired(),
                batch_size = round,
                "batch launched"
            );

            if self.state.fired() < total && !interval.is_zero() {
                tokio::time::sleep(interval).await;
            }
        }
    }
}

/// One in-flight query.
struct RequestTask {
    sequence: u64,
    statement: Arc<str>,
    pool: Arc<dyn ConnectionPool>,
    state: Arc<RunState>,
    failures: mpsc::UnboundedSender<RampError>,
    pending: Pending,
}

impl RequestTask {
    async fn run(self) {
        // The tracker is signalled only after the outcome is recorded.
        let Self {
            sequence,
            statement,
            pool,
            state,
            failures,
            pending,
        } = self;

        match pool.execute(&statement).await {
            Ok(_) => state.record_completed(),
            Err(e) => {
                state.record_failed();
                error!(sequence, error = %e, "query failed");
                // The receiver outlives every task unless the run is torn down.
                let _ = failures.send(RampError::query(sequence, e.0));
            }
        }
        pending.done();
    }
}

/// Collect every failure reported so far.
///
/// Call after [`CompletionTracker::join`] so that no task can still be
/// sending.
pub fn drain_failures(rx: &mut FailureReceiver) -> Vec<RampError> {
    let mut failures = Vec::new();
    while let Ok(err) = rx.try_recv() {
        failures.push(err);
    }
    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::PoolConfig;
    use crate::simulated::SimulatedPool;
    use std::time::Duration;

    struct Harness {
        dispatcher: Arc<Dispatcher>,
        failures: FailureReceiver,
        state: Arc<RunState>,
        tracker: Arc<CompletionTracker>,
    }

    fn harness(plan: WorkloadPlan, pool: SimulatedPool) -> Harness {
        let state = Arc::new(RunState::new());
        let tracker = Arc::new(CompletionTracker::new());
        let (dispatcher, failures) = Dispatcher::new(
            plan,
            "SELECT SLEEP(1)",
            Arc::new(pool),
            Arc::clone(&state),
            Arc::clone(&tracker),
        );
        Harness {
            dispatcher: Arc::new(dispatcher),
            failures,
            state,
            tracker,
        }
    }

    fn pool(open: u32, service_ms: u64) -> SimulatedPool {
        SimulatedPool::new(
            &PoolConfig::default().max_open_connections(open),
            Duration::from_millis(service_ms),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_batches_launch_on_interval() {
        let plan = WorkloadPlan::new(100, 25, 150).unwrap();
        let h = harness(plan, pool(50, 1000));

        let dispatcher = Arc::clone(&h.dispatcher);
        let dispatch = tokio::spawn(async move { dispatcher.run().await });

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(h.state.fired(), 25);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(h.state.fired(), 50);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(h.state.fired(), 75);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(h.state.fired(), 100);

        dispatch.await.unwrap();
        assert_eq!(h.state.counters().batches_fired, 4);

        h.tracker.join().await;
        assert_eq!(h.state.completed(), 100);
        assert_eq!(h.state.fired(), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_last_batch() {
        let plan = WorkloadPlan::new(10, 4, 100).unwrap();
        let h = harness(plan, pool(10, 500));

        let dispatcher = Arc::clone(&h.dispatcher);
        let dispatch = tokio::spawn(async move { dispatcher.run().await });

        let mut seen = Vec::new();
        for _ in 0..3 {
            tokio::time::sleep(Duration::from_millis(1)).await;
            seen.push(h.state.fired());
            tokio::time::sleep(Duration::from_millis(99)).await;
        }
        assert_eq!(seen, vec![4, 8, 10]);

        dispatch.await.unwrap();
        assert_eq!(h.state.counters().batches_fired, 3);
        h.tracker.join().await;
        assert_eq!(h.state.completed(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatcher_does_not_wait_for_tasks() {
        let plan = WorkloadPlan::new(20, 10, 0).unwrap();
        let h = harness(plan, pool(5, 10_000));

        let started = tokio::time::Instant::now();
        h.dispatcher.run().await;
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(h.state.fired(), 20);
        assert_eq!(h.tracker.outstanding(), 20);

        h.tracker.join().await;
        assert_eq!(h.state.completed(), 20);
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_failure_does_not_block_join() {
        let plan = WorkloadPlan::new(100, 25, 150).unwrap();
        let mut h = harness(plan, pool(50, 200).fail_at(37));

        h.dispatcher.run().await;
        h.tracker.join().await;

        let failures = drain_failures(&mut h.failures);
        assert_eq!(failures.len(), 1);
        assert!(matches!(failures[0], RampError::Query { .. }));

        let counters = h.state.counters();
        assert_eq!(counters.fired, 100);
        assert_eq!(counters.completed, 99);
        assert_eq!(counters.failed, 1);
        assert_eq!(counters.running(), 0);
    }
}
