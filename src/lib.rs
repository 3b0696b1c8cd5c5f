//! # poolramp
//!
//! A ramp-up load generator for watching a bounded database connection pool
//! under concurrent load.
//!
//! A run fires a fixed number of blocking `SELECT SLEEP(..)` statements at
//! the server, released in equal batches on a fixed interval, while a
//! background sampler records pool occupancy and progress counters. The
//! result is a [`RunHistory`](history::RunHistory) document.
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use poolramp::prelude::*;
//! use std::sync::Arc;
//!
//! let config = RampConfig::default();
//! let pool = Arc::new(MySqlTarget::connect(&config.database.url, &config.pool).await?);
//! let history = Runner::new(config).run(pool.clone()).await;
//! pool.close().await;
//! println!("{}", history?.to_json(true)?);
//! ```
//!
//! ## Pipeline
//!
//! | Stage      | Module       | Role                                  |
//! |------------|--------------|---------------------------------------|
//! | configure  | `pool`       | Client limits, server ceiling         |
//! | plan       | `plan`       | Batch count and sizes                 |
//! | dispatch   | `dispatch`   | Timed bursts of request tasks         |
//! | track      | `tracker`    | Wait for every launched task          |
//! | sample     | `sampler`    | Periodic snapshots into the history   |
//! | coordinate | `runner`     | Sequence the above, build the report  |

pub mod config;
pub mod dispatch;
pub mod error;
pub mod history;
pub mod plan;
pub mod pool;
pub mod progress;
pub mod runner;
pub mod sampler;
pub mod simulated;
pub mod state;
pub mod tracker;

pub mod prelude {
    pub use crate::config::RampConfig;
    pub use crate::error::*;
    pub use crate::history::{RunHistory, RunOutcome, RunStatus};
    pub use crate::plan::WorkloadPlan;
    pub use crate::pool::{ConnectionPool, MySqlTarget, PoolConfig, PoolOccupancy};
    pub use crate::runner::Runner;
    pub use crate::sampler::StatsSnapshot;
    pub use crate::simulated::SimulatedPool;
}

/// Compute the ramp schedule for `total` requests in batches of `batch_size`.
///
/// # Example
///
/// ```
/// let plan = poolramp::plan(100, 25, 150).unwrap();
/// assert_eq!(plan.batch_count, 4);
/// ```
pub fn plan(total: i64, batch_size: i64, interval_ms: u64) -> Result<plan::WorkloadPlan, error::RampError> {
    plan::WorkloadPlan::new(total, batch_size, interval_ms)
}
