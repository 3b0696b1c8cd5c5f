//! The run history document.

use crate::error::{RampError, RampResult};
use crate::plan::WorkloadPlan;
use crate::pool::PoolConfig;
use crate::sampler::StatsSnapshot;
use crate::state::Counters;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::Path;

/// At most this many error messages are copied into the outcome block.
pub const MAX_REPORTED_ERRORS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Succeeded,
    Failed,
}

/// How the run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub fired: u64,
    pub completed: u64,
    pub failed: u64,
    pub batches_fired: u64,
    /// The first few failures, in the order they were reported.
    pub errors: Vec<String>,
}

impl RunOutcome {
    pub fn new(counters: Counters, failures: &[RampError]) -> Self {
        let status = if failures.is_empty() && counters.failed == 0 {
            RunStatus::Succeeded
        } else {
            RunStatus::Failed
        };
        Self {
            status,
            fired: counters.fired,
            completed: counters.completed,
            failed: counters.failed,
            batches_fired: counters.batches_fired,
            errors: failures
                .iter()
                .take(MAX_REPORTED_ERRORS)
                .map(ToString::to_string)
                .collect(),
        }
    }
}

/// Everything recorded about one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunHistory {
    pub start_time_unix: i64,
    pub end_time_unix: i64,
    pub config: PoolConfig,
    pub plan: WorkloadPlan,
    pub samples: Vec<StatsSnapshot>,
    pub outcome: RunOutcome,
}

impl RunHistory {
    pub fn is_success(&self) -> bool {
        self.outcome.status == RunStatus::Succeeded
    }

    pub fn duration_secs(&self) -> i64 {
        self.end_time_unix - self.start_time_unix
    }

    /// Highest open-connection count seen in any sample.
    pub fn peak_open(&self) -> u32 {
        self.samples
            .iter()
            .map(|s| s.open_connections)
            .max()
            .unwrap_or(0)
    }

    /// Highest in-use count seen in any sample.
    pub fn peak_in_use(&self) -> u32 {
        self.samples
            .iter()
            .map(|s| s.in_use_connections)
            .max()
            .unwrap_or(0)
    }

    /// Highest number of unfinished tasks seen in any sample.
    pub fn peak_running(&self) -> u64 {
        self.samples.iter().map(|s| s.running).max().unwrap_or(0)
    }

    pub fn to_json(&self, pretty: bool) -> RampResult<String> {
        let json = if pretty {
            serde_json::to_string_pretty(self)?
        } else {
            serde_json::to_string(self)?
        };
        Ok(json)
    }

    /// Write the document to `path`, or to stdout when `path` is `None`.
    pub fn write(&self, path: Option<&Path>, pretty: bool) -> RampResult<()> {
        let json = self.to_json(pretty)?;
        match path {
            Some(path) => fs::write(path, json + "\n").map_err(RampError::from),
            None => {
                let mut out = std::io::stdout().lock();
                writeln!(out, "{}", json)?;
                out.flush()?;
                Ok(())
            }
        }
    }
}
