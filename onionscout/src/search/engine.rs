use crossbeam_channel::{unbounded, RecvTimeoutError};
use rand::{CryptoRng, RngCore};
use rayon::ThreadPoolBuilder;
use serde::{Serialize, Serializer};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::matcher::PatternSet;
use super::worker::{AttemptBudget, SearchWorker, StopSignal, WorkerContext, WorkerEvent};
use crate::errors::{VanityError, VanityResult};
use crate::keys;
use crate::metrics::{SearchStats, StatsSnapshot};
use crate::persist::{ensure_output_dir, SavedMatch};

pub const DEFAULT_OUTPUT_DIR: &str = "hostnames";
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How a search is run and when it ends
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub output_dir: PathBuf,
    pub thread_count: NonZeroUsize,
    /// Stop once at least this many matches are saved
    pub max_matches: Option<u64>,
    /// Stop after exactly this many attempts across all workers
    pub max_attempts: Option<u64>,
    /// Stop once this much wall-clock time has passed
    pub max_duration: Option<Duration>,
    /// Also write a Tor hidden service directory per match
    pub tor_layout: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            thread_count: NonZeroUsize::new(num_cpus::get()).unwrap_or(NonZeroUsize::MIN),
            max_matches: None,
            max_attempts: None,
            max_duration: None,
            tor_layout: false,
        }
    }
}

/// Why a search ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Cancelled,
    MatchTarget,
    AttemptBudget,
    TimeBudget,
}

/// A worker that crashed while the rest of the pool kept going
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerFailure {
    pub worker: usize,
    pub error: String,
}

/// Outcome of a completed search
#[derive(Debug, Clone, Serialize)]
pub struct SearchSummary {
    pub attempts: u64,
    pub matches: u64,
    #[serde(serialize_with = "serialize_duration")]
    pub elapsed: Duration,
    pub stop_reason: StopReason,
    pub found: Vec<SavedMatch>,
    pub failed_workers: Vec<WorkerFailure>,
}

fn serialize_duration<S: Serializer>(
    duration: &Duration,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&humantime::format_duration(*duration))
}

/// Runs a pool of search workers and aggregates what they find.
///
/// ```rust,ignore
/// let patterns = PatternSet::compile(["^cafe"])?;
/// let searcher = Searcher::new(SearchOptions::default(), patterns);
/// let stop = searcher.stop_signal(); // hand to a Ctrl-C handler
/// let summary = searcher.run()?;
/// ```
#[derive(Debug)]
pub struct Searcher {
    options: SearchOptions,
    patterns: Arc<PatternSet>,
    stats: Arc<SearchStats>,
    stop: StopSignal,
}

impl Searcher {
    pub fn new(options: SearchOptions, patterns: PatternSet) -> Self {
        Self {
            options,
            patterns: Arc::new(patterns),
            stats: Arc::new(SearchStats::new()),
            stop: StopSignal::new(),
        }
    }

    pub fn options(&self) -> &SearchOptions {
        &self.options
    }

    /// Live counters, safe to poll from any thread while the search runs
    pub fn stats(&self) -> Arc<SearchStats> {
        self.stats.clone()
    }

    /// Handle that ends the search after each worker's current iteration
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Runs the search to completion
    pub fn run(&self) -> VanityResult<SearchSummary> {
        self.run_with_progress(DEFAULT_PROGRESS_INTERVAL, |_| {})
    }

    /// Runs the search, calling `on_progress` with the counters every
    /// `interval` until the last worker exits.
    pub fn run_with_progress<F>(
        &self,
        interval: Duration,
        on_progress: F,
    ) -> VanityResult<SearchSummary>
    where
        F: FnMut(StatsSnapshot),
    {
        self.run_with_seeder(interval, on_progress, keys::worker_rng)
    }

    /// Same as `run_with_progress`, with each worker's generator built by
    /// `seeder` from the worker index.
    pub(crate) fn run_with_seeder<F, S, R>(
        &self,
        interval: Duration,
        mut on_progress: F,
        seeder: S,
    ) -> VanityResult<SearchSummary>
    where
        F: FnMut(StatsSnapshot),
        S: Fn(usize) -> VanityResult<R> + Sync,
        R: RngCore + CryptoRng,
    {
        info!(
            "Starting search with {} workers and patterns: {:?}",
            self.options.thread_count,
            self.patterns.sources()
        );
        ensure_output_dir(&self.options.output_dir)?;

        let workers = self.options.thread_count.get();
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("onionscout-worker-{}", i))
            .build()
            .map_err(|e| VanityError::ThreadPool(e.to_string()))?;

        let budget = match self.options.max_attempts {
            Some(total) => AttemptBudget::limited(total),
            None => AttemptBudget::unlimited(),
        };
        let ctx = Arc::new(WorkerContext {
            patterns: self.patterns.clone(),
            output_dir: self.options.output_dir.clone(),
            tor_layout: self.options.tor_layout,
            stats: self.stats.clone(),
            budget,
            stop: self.stop.clone(),
        });

        let mut stop_reason = None;
        if self.options.max_matches == Some(0) {
            stop_reason = Some(StopReason::MatchTarget);
            self.stop.stop();
        }

        let start = Instant::now();
        let deadline = self.options.max_duration.map(|d| start + d);
        let mut found = Vec::new();
        let mut failed_workers = Vec::new();
        let (tx, rx) = unbounded();

        pool.in_place_scope(|scope| {
            for index in 0..workers {
                let worker = SearchWorker::new(index, ctx.clone(), tx.clone());
                let seeder = &seeder;
                scope.spawn(move |_| {
                    worker.run_seeded(seeder);
                });
            }
            drop(tx);

            let mut last_progress = Instant::now();
            loop {
                match rx.recv_timeout(POLL_INTERVAL) {
                    Ok(WorkerEvent::Found(saved)) => {
                        info!("Found {} (worker {})", saved.address, saved.worker);
                        found.push(saved);
                        if let Some(target) = self.options.max_matches {
                            if self.stats.matches() >= target && !self.stop.is_stopped() {
                                info!("Reached {} matches, stopping workers", target);
                                stop_reason.get_or_insert(StopReason::MatchTarget);
                                self.stop.stop();
                            }
                        }
                    }
                    Ok(WorkerEvent::Crashed {
                        worker,
                        attempts,
                        error,
                    }) => {
                        warn!(
                            "Worker {} failed after {} attempts, continuing without it: {}",
                            worker, attempts, error
                        );
                        failed_workers.push(WorkerFailure {
                            worker,
                            error: error.to_string(),
                        });
                    }
                    Ok(WorkerEvent::Finished { worker, attempts }) => {
                        debug!("Worker {} finished after {} attempts", worker, attempts);
                    }
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }

                if let Some(deadline) = deadline {
                    if Instant::now() >= deadline && !self.stop.is_stopped() {
                        info!("Time budget reached, stopping workers");
                        stop_reason.get_or_insert(StopReason::TimeBudget);
                        self.stop.stop();
                    }
                }

                if last_progress.elapsed() >= interval {
                    on_progress(self.stats.snapshot());
                    last_progress = Instant::now();
                }
            }
        });

        let elapsed = start.elapsed();
        self.stats.log_stats(elapsed);
        on_progress(self.stats.snapshot());

        if failed_workers.len() == workers {
            let last_error = failed_workers
                .last()
                .map(|f| f.error.clone())
                .unwrap_or_default();
            return Err(VanityError::AllWorkersFailed {
                workers,
                last_error,
            });
        }

        let stop_reason = stop_reason.unwrap_or(if self.stop.is_stopped() {
            StopReason::Cancelled
        } else {
            StopReason::AttemptBudget
        });
        let stats = self.stats.snapshot();
        info!(
            "Search complete ({:?}). Found {} matches in {} attempts",
            stop_reason, stats.matches, stats.attempts
        );

        Ok(SearchSummary {
            attempts: stats.attempts,
            matches: stats.matches,
            elapsed,
            stop_reason,
            found,
            failed_workers,
        })
    }
}

/// Compiles `patterns` and runs a search with `options`
pub fn search<I, S>(patterns: I, options: SearchOptions) -> VanityResult<SearchSummary>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let patterns = PatternSet::compile(patterns)?;
    Searcher::new(options, patterns).run()
}
