use crossbeam_channel::Sender;
use rand::{CryptoRng, RngCore};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

use super::matcher::PatternSet;
use crate::address;
use crate::errors::{VanityError, VanityResult};
use crate::keys::{self, KeyPair};
use crate::metrics::SearchStats;
use crate::persist::{self, MatchRecord, SavedMatch};

/// Attempts a worker runs between folds into the shared counters
pub(crate) const CHUNK_SIZE: u64 = 1024;

/// Cooperative cancellation flag shared by the coordinator, its workers and
/// anything outside that wants to end the search (a Ctrl-C handler, a test).
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks every worker to stop after its current iteration
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Total attempts the workers may still make. Workers reserve attempts in
/// chunks, so a limited budget is spent exactly, never overrun.
#[derive(Debug, Default)]
pub struct AttemptBudget {
    remaining: Option<AtomicU64>,
}

impl AttemptBudget {
    pub fn unlimited() -> Self {
        Self { remaining: None }
    }

    pub fn limited(total: u64) -> Self {
        Self {
            remaining: Some(AtomicU64::new(total)),
        }
    }

    /// Reserves up to `want` attempts and returns how many were granted.
    /// Zero means the budget is spent.
    pub fn claim(&self, want: u64) -> u64 {
        let Some(remaining) = &self.remaining else {
            return want;
        };
        remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |left| {
                (left > 0).then(|| left - left.min(want))
            })
            .map(|left| left.min(want))
            .unwrap_or(0)
    }

    /// Hands back attempts that were reserved but not used
    pub fn refund(&self, unused: u64) {
        if let Some(remaining) = &self.remaining {
            remaining.fetch_add(unused, Ordering::AcqRel);
        }
    }

    pub fn remaining(&self) -> Option<u64> {
        self.remaining.as_ref().map(|r| r.load(Ordering::Acquire))
    }
}

/// Lifecycle of a single worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Seeding,
    Running,
    Stopped,
    Crashed,
}

/// Messages from workers to the coordinator
#[derive(Debug)]
pub enum WorkerEvent {
    Found(SavedMatch),
    Crashed {
        worker: usize,
        attempts: u64,
        error: VanityError,
    },
    Finished {
        worker: usize,
        attempts: u64,
    },
}

/// Everything the workers of one search share
#[derive(Debug)]
pub struct WorkerContext {
    pub patterns: Arc<PatternSet>,
    pub output_dir: PathBuf,
    pub tor_layout: bool,
    pub stats: Arc<SearchStats>,
    pub budget: AttemptBudget,
    pub stop: StopSignal,
}

enum ChunkEnd {
    Exhausted,
    Stopped,
}

/// One search thread: generate, encode, match, save, repeat.
#[derive(Debug)]
pub struct SearchWorker {
    index: usize,
    ctx: Arc<WorkerContext>,
    events: Sender<WorkerEvent>,
    state: WorkerState,
}

impl SearchWorker {
    pub fn new(index: usize, ctx: Arc<WorkerContext>, events: Sender<WorkerEvent>) -> Self {
        Self {
            index,
            ctx,
            events,
            state: WorkerState::Seeding,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Seeds a generator from the OS entropy pool and searches until stopped
    pub fn run(self) -> WorkerState {
        self.run_seeded(keys::worker_rng)
    }

    /// Seeds a generator with `seed`, called with this worker's index, and
    /// searches until stopped. A seeding failure crashes the worker before
    /// its first attempt.
    pub fn run_seeded<R, F>(mut self, seed: F) -> WorkerState
    where
        R: RngCore + CryptoRng,
        F: FnOnce(usize) -> VanityResult<R>,
    {
        match seed(self.index) {
            Ok(mut rng) => self.run_with_rng(&mut rng),
            Err(error) => self.crash(0, error),
        }
    }

    /// Searches with the given generator until stopped, the budget is spent,
    /// or a key cannot be generated or saved.
    pub fn run_with_rng<R: RngCore + CryptoRng>(&mut self, rng: &mut R) -> WorkerState {
        self.state = WorkerState::Running;
        debug!("Worker {} running", self.index);

        let mut total = 0u64;
        loop {
            let granted = self.ctx.budget.claim(CHUNK_SIZE);
            if granted == 0 {
                break;
            }

            let mut done = 0u64;
            let result = self.run_chunk(rng, granted, &mut done);
            self.ctx.stats.record_attempts(done);
            total += done;
            if done < granted {
                self.ctx.budget.refund(granted - done);
            }
            trace!("Worker {} folded {} attempts", self.index, done);

            match result {
                Ok(ChunkEnd::Exhausted) => continue,
                Ok(ChunkEnd::Stopped) => break,
                Err(error) => return self.crash(total, error),
            }
        }

        self.state = WorkerState::Stopped;
        debug!("Worker {} stopped after {} attempts", self.index, total);
        let _ = self.events.send(WorkerEvent::Finished {
            worker: self.index,
            attempts: total,
        });
        self.state
    }

    fn run_chunk<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
        granted: u64,
        done: &mut u64,
    ) -> VanityResult<ChunkEnd> {
        for _ in 0..granted {
            if self.ctx.stop.is_stopped() {
                return Ok(ChunkEnd::Stopped);
            }

            let key_pair = KeyPair::generate(rng)?;
            *done += 1;

            let address = address::encode(key_pair.public_key());
            if !self.ctx.patterns.matches(address.as_str()) {
                continue;
            }

            let record = MatchRecord {
                address,
                key_pair,
                attempt_index: self.ctx.stats.attempts() + *done,
                worker: self.index,
            };
            let saved = self.save(record)?;
            self.ctx.stats.record_match();
            let _ = self.events.send(WorkerEvent::Found(saved));
        }
        Ok(ChunkEnd::Exhausted)
    }

    fn save(&self, record: MatchRecord) -> VanityResult<SavedMatch> {
        let hits: Vec<&str> = self
            .ctx
            .patterns
            .matching_patterns(record.address.as_str())
            .into_iter()
            .map(|p| p.source())
            .collect();
        debug!(
            "Worker {} matched {} with {:?}",
            self.index, record.address, hits
        );

        let saved = persist::persist(&record, &self.ctx.output_dir)?;
        if self.ctx.tor_layout {
            persist::persist_service_dir(&record, &self.ctx.output_dir)?;
        }
        Ok(saved)
    }

    fn crash(&mut self, attempts: u64, error: VanityError) -> WorkerState {
        self.state = WorkerState::Crashed;
        warn!("Worker {} crashed: {}", self.index, error);
        let _ = self.events.send(WorkerEvent::Crashed {
            worker: self.index,
            attempts,
            error,
        });
        self.state
    }
}
