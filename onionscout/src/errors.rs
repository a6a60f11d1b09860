/// Error types for the vanity search engine.
///
/// Errors fall into two groups. Recoverable ones (`InvalidPattern`) are logged
/// and the run continues. Everything else is fatal either to a single worker
/// (`KeyGenerationFailure`, `PersistenceFailure`) or to the whole run
/// (`NoValidPatterns`, `OutputDirectory`, `AllWorkersFailed`).
///
/// ```rust,ignore
/// match PatternSet::compile(&patterns) {
///     Ok(set) => // search with set,
///     Err(VanityError::NoValidPatterns) => // nothing to search for,
///     Err(e) => // other errors
/// }
/// ```
use std::path::PathBuf;
use thiserror::Error;

/// Result type for vanity search operations
pub type VanityResult<T> = Result<T, VanityError>;

/// Errors that can occur while searching for vanity addresses
#[derive(Error, Debug)]
pub enum VanityError {
    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
    #[error("No valid patterns to search for")]
    NoValidPatterns,
    #[error("Key generation failed: {0}")]
    KeyGenerationFailure(String),
    #[error("Failed to save key for {address} to {path}: {source}")]
    PersistenceFailure {
        address: String,
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Cannot create output directory {path}: {source}")]
    OutputDirectory {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("All {workers} workers failed, last error: {last_error}")]
    AllWorkersFailed { workers: usize, last_error: String },
    #[error("Invalid onion address: {0}")]
    InvalidAddress(String),
    #[error("Invalid key: {0}")]
    InvalidKey(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Thread pool error: {0}")]
    ThreadPool(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl VanityError {
    pub fn invalid_pattern(pattern: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            reason: reason.to_string(),
        }
    }

    pub fn key_generation(reason: impl ToString) -> Self {
        Self::KeyGenerationFailure(reason.to_string())
    }

    pub fn persistence(
        address: impl Into<String>,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::PersistenceFailure {
            address: address.into(),
            path: path.into(),
            source,
        }
    }

    pub fn output_directory(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::OutputDirectory {
            path: path.into(),
            source,
        }
    }

    pub fn invalid_address(msg: impl Into<String>) -> Self {
        Self::InvalidAddress(msg.into())
    }

    pub fn invalid_key(msg: impl Into<String>) -> Self {
        Self::InvalidKey(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Whether the error ends the worker that hit it.
    pub fn is_worker_fatal(&self) -> bool {
        matches!(
            self,
            Self::KeyGenerationFailure(_) | Self::PersistenceFailure { .. } | Self::IoError(_)
        )
    }
}
