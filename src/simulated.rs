//! In-process stand-in for a database pool.
//!
//! Admission is bounded by a semaphore sized to the open-connection limit,
//! each statement holds its slot for a fixed service time, and released
//! connections beyond the idle limit are closed on return. Used by
//! `--dry-run` and by the test suite.

use crate::error::DriverError;
use crate::pool::{ConnectionPool, PoolConfig, PoolOccupancy};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;

/// A simulated connection pool.
pub struct SimulatedPool {
    semaphore: Semaphore,
    occupancy: Mutex<PoolOccupancy>,
    max_idle: u32,
    service_time: Duration,
    executed: AtomicU64,
    fail_at: Option<u64>,
    server_ceiling: AtomicU32,
    closed: AtomicBool,
}

impl SimulatedPool {
    /// Create a pool honoring `config`'s open/idle limits where every query
    /// takes `service_time`.
    pub fn new(config: &PoolConfig, service_time: Duration) -> Self {
        Self {
            semaphore: Semaphore::new(config.max_open_connections as usize),
            occupancy: Mutex::new(PoolOccupancy::default()),
            max_idle: config.effective_idle(),
            service_time,
            executed: AtomicU64::new(0),
            fail_at: None,
            server_ceiling: AtomicU32::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Make the `n`-th query (1-based, in execution order) fail.
    pub fn fail_at(mut self, n: u64) -> Self {
        self.fail_at = Some(n);
        self
    }

    /// Number of queries that have started executing.
    pub fn executed(&self) -> u64 {
        self.executed.load(Ordering::Relaxed)
    }

    /// Last ceiling accepted through `SET GLOBAL max_connections`.
    pub fn server_ceiling(&self) -> u32 {
        self.server_ceiling.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    fn checkout(&self) {
        let mut occ = self.occupancy.lock();
        if occ.idle > 0 {
            occ.idle -= 1;
        } else {
            occ.open += 1;
        }
        occ.in_use += 1;
    }

    fn checkin(&self) {
        let mut occ = self.occupancy.lock();
        occ.in_use -= 1;
        if occ.idle < self.max_idle {
            occ.idle += 1;
        } else {
            occ.open -= 1;
        }
    }

    fn admin(&self, statement: &str) -> Result<u64, DriverError> {
        let value = statement
            .rsplit('=')
            .next()
            .and_then(|v| v.trim().parse::<u32>().ok())
            .ok_or_else(|| DriverError(format!("unsupported statement: {}", statement)))?;
        self.server_ceiling.store(value, Ordering::Relaxed);
        Ok(0)
    }
}

#[async_trait]
impl ConnectionPool for SimulatedPool {
    async fn execute(&self, statement: &str) -> Result<u64, DriverError> {
        if self.is_closed() {
            return Err(DriverError("pool is closed".to_string()));
        }
        if statement.starts_with("SET GLOBAL") {
            return self.admin(statement);
        }

        let permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| DriverError("pool is closed".to_string()))?;
        let n = self.executed.fetch_add(1, Ordering::Relaxed) + 1;

        self.checkout();
        tokio::time::sleep(self.service_time).await;
        self.checkin();
        drop(permit);

        if self.fail_at == Some(n) {
            return Err(DriverError(format!("simulated failure on query {}", n)));
        }
        Ok(1)
    }

    fn occupancy(&self) -> PoolOccupancy {
        *self.occupancy.lock()
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
        self.semaphore.close();
        let mut occ = self.occupancy.lock();
        occ.open = occ.in_use;
        occ.idle = 0;
    }
}
