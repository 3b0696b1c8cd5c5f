//! Live progress line on stderr.
//!
//! Polls the shared counters and pool occupancy and rewrites a single
//! terminal line. It only reads run state; nothing it does ends up in the
//! run history.

use crate::pool::ConnectionPool;
use crate::state::RunState;
use colored::*;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Handle to the background progress printer.
pub struct ProgressDisplay {
    cancel: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl ProgressDisplay {
    pub fn start(
        total: u64,
        interval: Duration,
        state: Arc<RunState>,
        pool: Arc<dyn ConnectionPool>,
        started: Instant,
    ) -> Self {
        let (cancel, mut rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = rx.wait_for(|stop| *stop) => break,
                    _ = tokio::time::sleep(interval) => {
                        draw(&render(total, &state, pool.as_ref(), started));
                    }
                }
            }
            eprintln!();
        });
        Self { cancel, handle }
    }

    /// Stop the printer and end its line.
    pub async fn stop(self) {
        self.cancel.send_replace(true);
        let _ = self.handle.await;
    }
}

fn draw(line: &str) {
    let mut err = std::io::stderr().lock();
    let _ = write!(err, "\r{}", line);
    let _ = err.flush();
}

/// Format one progress line.
pub fn render(total: u64, state: &RunState, pool: &dyn ConnectionPool, started: Instant) -> String {
    let counters = state.counters();
    let in_use = pool.occupancy().in_use;
    let percent = if total == 0 {
        0
    } else {
        counters.completed * 100 / total
    };

    let mut line = format!(
        "Fired {} Running {} Completed {} ({}%)  {}s   ",
        counters.fired.to_string().cyan(),
        in_use.to_string().yellow(),
        counters.completed.to_string().green(),
        percent,
        started.elapsed().as_secs()
    );
    if counters.failed > 0 {
        line.push_str(&format!("{} {}   ", "Failed".red(), counters.failed));
    }
    line
}
