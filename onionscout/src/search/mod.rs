/// This module implements the parallel vanity search.
///
/// # Pipeline
///
/// Every worker runs the same loop on its own OS thread:
/// ```text
/// KeyPair::generate -> address::encode -> PatternSet::matches -> persist (on match)
/// ```
/// Workers share nothing but atomic counters, an attempt budget, a stop flag
/// and the sending half of an event channel. The coordinator (`Searcher`)
/// owns the receiving half and decides when the run ends.
///
/// # Termination
///
/// A search runs until one of the following happens:
/// 1. **Cancellation**: someone calls `StopSignal::stop`
/// 2. **Match target**: at least `max_matches` keys are saved. Workers racing
///    to the same threshold may save a few more; none are discarded
/// 3. **Attempt budget**: exactly `max_attempts` keys have been tried
/// 4. **Time budget**: `max_duration` has passed
///
/// Workers check the stop flag once per iteration and always finish a write
/// they have started.
///
/// # Failures
///
/// A worker that cannot generate or save a key reports `WorkerEvent::Crashed`
/// and exits; the rest of the pool carries on. The run fails only when every
/// worker has crashed.
pub mod engine;
pub mod matcher;
pub mod worker;

pub use engine::{search, SearchOptions, SearchSummary, Searcher, StopReason, WorkerFailure};
pub use matcher::{split_patterns, Pattern, PatternSet};
pub use worker::{AttemptBudget, SearchWorker, StopSignal, WorkerEvent, WorkerState};
