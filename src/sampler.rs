//! Periodic stats sampling.
//!
//! The sampler is a background task that wakes on a fixed cadence, reads the
//! run counters and the pool's live occupancy, and appends a
//! [`StatsSnapshot`] to its own history. It is the only writer of that
//! history; the coordinator gets the samples back when it stops the sampler.
//!
//! Every wait races the next tick against the cancel signal, so a stop
//! request is seen within one sampling interval and nothing is appended
//! after it.

use crate::pool::ConnectionPool;
use crate::state::RunState;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error};

/// One best-effort read of counters and pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub timestamp_unix: i64,
    /// Milliseconds since the run started.
    pub elapsed_ms: u64,
    pub open_connections: u32,
    pub in_use_connections: u32,
    pub idle_connections: u32,
    pub fired: u64,
    pub completed: u64,
    pub failed: u64,
    pub running: u64,
    pub batches_fired: u64,
}

impl StatsSnapshot {
    pub fn capture(state: &RunState, pool: &dyn ConnectionPool, started: Instant) -> Self {
        let counters = state.counters();
        let occupancy = pool.occupancy();
        Self {
            timestamp_unix: chrono::Utc::now().timestamp(),
            elapsed_ms: started.elapsed().as_millis() as u64,
            open_connections: occupancy.open,
            in_use_connections: occupancy.in_use,
            idle_connections: occupancy.idle,
            fired: counters.fired,
            completed: counters.completed,
            failed: counters.failed,
            running: counters.running(),
            batches_fired: counters.batches_fired,
        }
    }
}

/// Handle to the running sampler task.
pub struct StatsSampler {
    cancel: watch::Sender<bool>,
    handle: Option<JoinHandle<Vec<StatsSnapshot>>>,
}

impl StatsSampler {
    /// Spawn the sampling loop. The first sample is taken one `interval` in.
    pub fn start(
        interval: Duration,
        state: Arc<RunState>,
        pool: Arc<dyn ConnectionPool>,
        started: Instant,
    ) -> Self {
        let (cancel, rx) = watch::channel(false);
        let handle = tokio::spawn(sample_loop(rx, interval, state, pool, started));
        Self {
            cancel,
            handle: Some(handle),
        }
    }

    /// Signal the loop to stop without waiting for it. Idempotent.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    /// Whether the loop has not been stopped yet.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the loop, wait for it to exit and take its samples.
    ///
    /// Calling this again returns an empty history.
    pub async fn stop(&mut self) -> Vec<StatsSnapshot> {
        self.cancel();
        let Some(handle) = self.handle.take() else {
            return Vec::new();
        };
        match handle.await {
            Ok(samples) => samples,
            Err(e) => {
                error!(error = %e, "stats sampler task failed");
                Vec::new()
            }
        }
    }
}

impl Drop for StatsSampler {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn sample_loop(
    mut cancel: watch::Receiver<bool>,
    interval: Duration,
    state: Arc<RunState>,
    pool: Arc<dyn ConnectionPool>,
    started: Instant,
) -> Vec<StatsSnapshot> {
    let mut samples = Vec::new();
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.wait_for(|stop| *stop) => break,
            _ = ticker.tick() => {
                samples.push(StatsSnapshot::capture(&state, pool.as_ref(), started));
            }
        }
    }

    debug!(samples = samples.len(), "stats sampler stopped");
    samples
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::PoolConfig;
    use crate::simulated::SimulatedPool;

    fn pool() -> Arc<dyn ConnectionPool> {
        Arc::new(SimulatedPool::new(&PoolConfig::default(), Duration::ZERO))
    }

    #[tokio::test(start_paused = true)]
    async fn test_samples_on_cadence() {
        let state = Arc::new(RunState::new());
        let mut sampler =
            StatsSampler::start(Duration::from_millis(150), state, pool(), Instant::now());

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(sampler.is_running());
        let samples = sampler.stop().await;

        assert!((2..=4).contains(&samples.len()), "got {}", samples.len());
        let elapsed: Vec<u64> = samples.iter().map(|s| s.elapsed_ms).collect();
        assert_eq!(elapsed, vec![150, 300, 450]);
        assert!(!sampler.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_appended_after_stop() {
        let state = Arc::new(RunState::new());
        let mut sampler =
            StatsSampler::start(Duration::from_millis(100), state, pool(), Instant::now());

        tokio::time::sleep(Duration::from_millis(250)).await;
        let samples = sampler.stop().await;
        assert_eq!(samples.len(), 2);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert!(sampler.stop().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_stop_is_harmless() {
        let state = Arc::new(RunState::new());
        let mut sampler =
            StatsSampler::start(Duration::from_millis(50), state, pool(), Instant::now());

        tokio::time::sleep(Duration::from_millis(120)).await;
        sampler.cancel();
        sampler.cancel();
        let first = sampler.stop().await;
        let second = sampler.stop().await;
        assert_eq!(first.len(), 2);
        assert!(second.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_reads_counters() {
        let state = Arc::new(RunState::new());
        state.record_fired();
        state.record_fired();
        state.record_completed();

        let snapshot = StatsSnapshot::capture(&state, pool().as_ref(), Instant::now());
        assert_eq!(snapshot.fired, 2);
        assert_eq!(snapshot.completed, 1);
        assert_eq!(snapshot.running, 1);
        assert_eq!(snapshot.open_connections, 0);
    }
}
