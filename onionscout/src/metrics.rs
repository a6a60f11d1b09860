use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::info;

/// Attempt and match counters shared by every worker.
///
/// Workers fold their local attempt counts in with `record_attempts`, so a
/// snapshot may trail the true number of keys tried by up to one chunk per
/// worker. Once all workers have exited the counters are exact.
#[derive(Debug, Default)]
pub struct SearchStats {
    attempts: AtomicU64,
    matches: AtomicU64,
}

impl SearchStats {
    /// Creates a new SearchStats instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a batch of attempts, returning the new total
    pub fn record_attempts(&self, count: u64) -> u64 {
        self.attempts.fetch_add(count, Ordering::Relaxed) + count
    }

    /// Records a saved match, returning the new match total
    pub fn record_match(&self) -> u64 {
        self.matches.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    pub fn matches(&self) -> u64 {
        self.matches.load(Ordering::Acquire)
    }

    /// Gets a copy of the current counters
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            attempts: self.attempts(),
            matches: self.matches(),
        }
    }

    /// Logs the counters along with the achieved key rate
    pub fn log_stats(&self, elapsed: Duration) {
        let stats = self.snapshot();
        info!(
            "Search stats: {} attempts, {} matches in {} ({:.0} keys/s)",
            stats.attempts,
            stats.matches,
            humantime::format_duration(Duration::from_secs(elapsed.as_secs())),
            stats.rate(elapsed)
        );
    }
}

/// A point-in-time copy of the search counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub attempts: u64,
    pub matches: u64,
}

impl StatsSnapshot {
    /// Keys tried per second over `elapsed`
    pub fn rate(&self, elapsed: Duration) -> f64 {
        let secs = elapsed.as_secs_f64();
        if secs > 0.0 {
            self.attempts as f64 / secs
        } else {
            0.0
        }
    }
}
