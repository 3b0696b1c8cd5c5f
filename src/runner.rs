//! Run coordination.
//!
//! [`Runner::run`] sequences one run against an already opened pool: raise
//! the server ceiling, start the sampler, dispatch the ramp, wait for every
//! task, stop the sampler and assemble the [`RunHistory`]. Opening and
//! closing the pool stays with the caller so the pool is released on every
//! exit path, including a failed run.

use crate::config::RampConfig;
use crate::dispatch::{drain_failures, Dispatcher};
use crate::error::RampResult;
use crate::history::{RunHistory, RunOutcome};
use crate::pool::{raise_server_ceiling, ConnectionPool};
use crate::progress::ProgressDisplay;
use crate::sampler::StatsSampler;
use crate::state::RunState;
use crate::tracker::CompletionTracker;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::info;

/// Coordinates a single run.
pub struct Runner {
    config: RampConfig,
    progress: bool,
}

impl Runner {
    pub fn new(config: RampConfig) -> Self {
        Self {
            config,
            progress: false,
        }
    }

    /// Show the live progress line on stderr while the run is in flight.
    pub fn progress(mut self, enabled: bool) -> Self {
        self.progress = enabled;
        self
    }

    /// Execute the run.
    ///
    /// Only configuration problems are returned as `Err`; they are detected
    /// before anything is dispatched. Query failures are collected into the
    /// history's outcome after every launched task has finished.
    pub async fn run(&self, pool: Arc<dyn ConnectionPool>) -> RampResult<RunHistory> {
        self.config.validate()?;
        let plan = self.config.plan()?;

        let start_time_unix = chrono::Utc::now().timestamp();
        let started = Instant::now();

        // A refused ceiling is logged inside and does not stop the run.
        let _ = raise_server_ceiling(pool.as_ref(), &self.config.pool).await;

        let state = Arc::new(RunState::new());
        let tracker = Arc::new(CompletionTracker::new());

        let mut sampler = StatsSampler::start(
            self.config.stats_interval(),
            Arc::clone(&state),
            Arc::clone(&pool),
            started,
        );
        let progress = self.progress.then(|| {
            ProgressDisplay::start(
                plan.total_requests,
                self.config.progress_interval(),
                Arc::clone(&state),
                Arc::clone(&pool),
                started,
            )
        });

        info!(
            total = plan.total_requests,
            batch_size = plan.batch_size,
            batches = plan.batch_count,
            interval_ms = plan.interval_millis,
            "ramp started"
        );
        let (dispatcher, mut failures) = Dispatcher::new(
            plan,
            self.config.statement(),
            Arc::clone(&pool),
            Arc::clone(&state),
            Arc::clone(&tracker),
        );
        dispatcher.run().await;
        info!(fired = state.fired(), "all batches launched, waiting for tasks");

        tracker.join().await;
        let samples = sampler.stop().await;
        let end_time_unix = chrono::Utc::now().timestamp();

        if let Some(progress) = progress {
            progress.stop().await;
        }

        let failures = drain_failures(&mut failures);
        let outcome = RunOutcome::new(state.counters(), &failures);
        info!(
            completed = outcome.completed,
            failed = outcome.failed,
            samples = samples.len(),
            "ramp finished"
        );

        Ok(RunHistory {
            start_time_unix,
            end_time_unix,
            config: self.config.pool.clone(),
            plan,
            samples,
            outcome,
        })
    }
}
