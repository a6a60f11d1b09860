pub mod address;
pub mod config;
pub mod errors;
pub mod keys;
pub mod metrics;
pub mod persist;
pub mod search;

pub use address::OnionAddress;
pub use config::SearchConfig;
pub use errors::{VanityError, VanityResult};
pub use keys::KeyPair;
pub use metrics::{SearchStats, StatsSnapshot};
pub use search::{search, PatternSet, SearchOptions, SearchSummary, Searcher, StopSignal};
