//! Ramp schedule planning.
//!
//! A plan turns "N requests, B at a time, every T ms" into a fixed list of
//! bursts. It is computed once before anything is dispatched and never
//! changes afterwards.

use crate::error::{RampError, RampResult};
use serde::Serialize;
use std::time::Duration;

/// The static ramp schedule for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkloadPlan {
    pub total_requests: u64,
    pub batch_size: u64,
    pub interval_millis: u64,
    pub batch_count: u64,
}

impl WorkloadPlan {
    /// Compute the plan for `total` requests released `batch_size` at a time.
    ///
    /// # Example
    ///
    /// ```
    /// use poolramp::plan::WorkloadPlan;
    ///
    /// let plan = WorkloadPlan::new(10, 4, 150).unwrap();
    /// assert_eq!(plan.batch_count, 3);
    /// assert_eq!(plan.last_batch_size(), 2);
    /// ```
    pub fn new(total: i64, batch_size: i64, interval_millis: u64) -> RampResult<Self> {
        if total <= 0 {
            return Err(RampError::Config(format!(
                "total requests must be positive, got {}",
                total
            )));
        }
        if batch_size <= 0 {
            return Err(RampError::Config(format!(
                "batch size must be positive, got {}",
                batch_size
            )));
        }

        let total_requests = total as u64;
        let batch_size = batch_size as u64;

        Ok(Self {
            total_requests,
            batch_size,
            interval_millis,
            batch_count: total_requests.div_ceil(batch_size),
        })
    }

    /// Size of the final batch; absorbs the remainder when it doesn't divide evenly.
    pub fn last_batch_size(&self) -> u64 {
        match self.total_requests % self.batch_size {
            0 => self.batch_size,
            remainder => remainder,
        }
    }

    /// Size of the batch at `index` (zero-based), or `None` past the end.
    pub fn batch_size_at(&self, index: u64) -> Option<u64> {
        if index >= self.batch_count {
            None
        } else if index + 1 == self.batch_count {
            Some(self.last_batch_size())
        } else {
            Some(self.batch_size)
        }
    }

    /// Per-batch sizes in launch order.
    pub fn batch_sizes(&self) -> impl Iterator<Item = u64> + '_ {
        (0..self.batch_count).filter_map(|i| self.batch_size_at(i))
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_millis)
    }

    /// Nominal launch offset of batch `index` from the start of dispatch.
    pub fn launch_offset(&self, index: u64) -> Duration {
        self.interval() * index as u32
    }
}
