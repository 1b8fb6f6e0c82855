//! Probe cadence: one sequential loop measuring the link and feeding the monitor.

pub mod engine;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub use self::engine::{run_scheduler_loop, CycleReport, ProbeScheduler};

/// Shortest pause between two cycles, however long a cycle took.
pub const MIN_CYCLE_DELAY: Duration = Duration::from_secs(1);

/// Sleep after a cycle that took `elapsed` so cycles start every `interval`.
pub fn next_delay(interval: Duration, elapsed: Duration) -> Duration {
    interval.saturating_sub(elapsed).max(MIN_CYCLE_DELAY)
}

/// Whether the throughput probe should run in `unix_minute`.
///
/// Runs on minutes divisible by `every_minutes`, at most once per such minute.
pub fn throughput_due(unix_minute: i64, every_minutes: u64, last_run_minute: Option<i64>) -> bool {
    let Ok(every) = i64::try_from(every_minutes) else {
        return false;
    };
    every > 0 && unix_minute.rem_euclid(every) == 0 && last_run_minute != Some(unix_minute)
}

/// Synthetic degradation toggle, on when forced or when the flag file exists.
#[derive(Debug, Clone, Default)]
pub struct DegradeSwitch {
    flag_path: Option<PathBuf>,
    forced: Arc<AtomicBool>,
}

impl DegradeSwitch {
    pub fn new(flag_path: impl Into<PathBuf>) -> Self {
        Self {
            flag_path: Some(flag_path.into()),
            forced: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set(&self, on: bool) {
        self.forced.store(on, Ordering::Relaxed);
    }

    pub fn is_on(&self) -> bool {
        self.forced.load(Ordering::Relaxed)
            || self.flag_path.as_ref().is_some_and(|p| p.exists())
    }
}
