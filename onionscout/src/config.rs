use config::{Config as ConfigBuilder, ConfigError, File};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{VanityError, VanityResult};
use crate::search::engine::{SearchOptions, DEFAULT_OUTPUT_DIR, DEFAULT_PROGRESS_INTERVAL};

/// Configuration for a vanity search.
///
/// # Configuration Locations
///
/// The configuration can be loaded from multiple locations, later ones
/// overriding earlier ones:
/// 1. Global `$HOME/.config/onionscout/config.yaml`
/// 2. Local `.onionscout.yaml` in the current directory
/// 3. Custom config file specified via `--config`
///
/// Command-line arguments are applied last with `merge_with_cli`.
///
/// # Configuration Format
///
/// ```yaml
/// # Patterns tested against each address (regex, unanchored)
/// patterns: ["^cafe", "^beef"]
///
/// # Where matched keys are written
/// output_dir: "hostnames"
///
/// # Worker threads (default: CPU cores)
/// thread_count: 8
///
/// # Stop conditions, all optional
/// max_matches: 1
/// max_attempts: 100000000
/// max_duration: "2h 30m"
///
/// # Also write a Tor HiddenServiceDir per match
/// tor_layout: true
///
/// # Log level (trace, debug, info, warn, error)
/// log_level: "info"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Patterns to search for (regex)
    #[serde(default)]
    pub patterns: Vec<String>,

    /// Directory matched keys are written to
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Number of worker threads
    /// Defaults to number of CPU cores if not specified
    #[serde(default = "default_thread_count")]
    pub thread_count: NonZeroUsize,

    /// Stop after at least this many matches
    #[serde(default)]
    pub max_matches: Option<u64>,

    /// Stop after exactly this many attempts
    #[serde(default)]
    pub max_attempts: Option<u64>,

    /// Stop after this much time, in humantime format ("90s", "1h 30m")
    #[serde(default)]
    pub max_duration: Option<String>,

    /// Also write a Tor hidden service directory for every match
    #[serde(default)]
    pub tor_layout: bool,

    /// How often progress is reported, in milliseconds
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Values given on the command line. `None` and empty fields leave the
/// configuration file's value alone.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub patterns: Vec<String>,
    pub output_dir: Option<PathBuf>,
    pub thread_count: Option<NonZeroUsize>,
    pub max_matches: Option<u64>,
    pub max_attempts: Option<u64>,
    pub max_duration: Option<String>,
    pub tor_layout: bool,
    pub log_level: Option<String>,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT_DIR)
}

fn default_thread_count() -> NonZeroUsize {
    NonZeroUsize::new(num_cpus::get()).unwrap_or(NonZeroUsize::MIN)
}

fn default_progress_interval_ms() -> u64 {
    DEFAULT_PROGRESS_INTERVAL.as_millis() as u64
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            patterns: Vec::new(),
            output_dir: default_output_dir(),
            thread_count: default_thread_count(),
            max_matches: None,
            max_attempts: None,
            max_duration: None,
            tor_layout: false,
            progress_interval_ms: default_progress_interval_ms(),
            log_level: default_log_level(),
        }
    }
}

impl SearchConfig {
    /// Loads configuration from the default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Loads configuration from the default locations plus a specific file
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        let config_files = [
            dirs::config_dir().map(|p| p.join("onionscout/config.yaml")),
            Some(PathBuf::from(".onionscout.yaml")),
        ];
        for path in config_files.iter().flatten() {
            if path.exists() {
                builder = builder.add_source(File::from(path.as_path()));
            }
        }

        // An explicitly requested file must exist
        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        builder.build()?.try_deserialize()
    }

    /// Applies command-line values on top of the loaded configuration
    pub fn merge_with_cli(mut self, cli: CliOverrides) -> Self {
        if !cli.patterns.is_empty() {
            self.patterns = cli.patterns;
        }
        if let Some(output_dir) = cli.output_dir {
            self.output_dir = output_dir;
        }
        if let Some(thread_count) = cli.thread_count {
            self.thread_count = thread_count;
        }
        if cli.max_matches.is_some() {
            self.max_matches = cli.max_matches;
        }
        if cli.max_attempts.is_some() {
            self.max_attempts = cli.max_attempts;
        }
        if cli.max_duration.is_some() {
            self.max_duration = cli.max_duration;
        }
        if cli.tor_layout {
            self.tor_layout = true;
        }
        if let Some(log_level) = cli.log_level {
            self.log_level = log_level;
        }
        self
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms.max(1))
    }

    /// Converts the configuration into engine options, parsing the time budget
    pub fn search_options(&self) -> VanityResult<SearchOptions> {
        let max_duration = self
            .max_duration
            .as_deref()
            .map(|text| {
                humantime::parse_duration(text).map_err(|e| {
                    VanityError::config_error(format!("invalid max_duration '{}': {}", text, e))
                })
            })
            .transpose()?;

        Ok(SearchOptions {
            output_dir: self.output_dir.clone(),
            thread_count: self.thread_count,
            max_matches: self.max_matches,
            max_attempts: self.max_attempts,
            max_duration,
            tor_layout: self.tor_layout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_config(dir: &tempfile::TempDir, content: &str) -> PathBuf {
        let config_path = dir.path().join("config.yaml");
        let mut file = File::create(&config_path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        config_path
    }

    #[test]
    fn test_load_config_file() {
        let dir = tempdir().unwrap();
        let config_path = write_config(
            &dir,
            r#"
            patterns: ["^cafe", "beef$"]
            output_dir: "keys"
            thread_count: 4
            max_matches: 2
            max_attempts: 1000000
            max_duration: "1h 30m"
            tor_layout: true
            progress_interval_ms: 250
            log_level: "debug"
        "#,
        );

        let config = SearchConfig::load_from(Some(&config_path)).unwrap();
        assert_eq!(config.patterns, vec!["^cafe", "beef$"]);
        assert_eq!(config.output_dir, PathBuf::from("keys"));
        assert_eq!(config.thread_count, NonZeroUsize::new(4).unwrap());
        assert_eq!(config.max_matches, Some(2));
        assert_eq!(config.max_attempts, Some(1_000_000));
        assert!(config.tor_layout);
        assert_eq!(config.progress_interval(), Duration::from_millis(250));
        assert_eq!(config.log_level, "debug");

        let options = config.search_options().unwrap();
        assert_eq!(options.max_duration, Some(Duration::from_secs(5400)));
        assert_eq!(options.max_matches, Some(2));
    }

    #[test]
    fn test_default_values() {
        let dir = tempdir().unwrap();
        let config_path = write_config(&dir, "patterns: [\"^abc\"]\n");

        let config = SearchConfig::load_from(Some(&config_path)).unwrap();
        assert_eq!(config.patterns, vec!["^abc"]);
        assert_eq!(config.output_dir, PathBuf::from("hostnames"));
        assert_eq!(
            config.thread_count,
            NonZeroUsize::new(num_cpus::get()).unwrap()
        );
        assert_eq!(config.max_matches, None);
        assert_eq!(config.max_duration, None);
        assert!(!config.tor_layout);
        assert_eq!(config.log_level, "warn");
    }

    #[test]
    fn test_merge_with_cli() {
        let file_config = SearchConfig {
            patterns: vec!["^abc".to_string()],
            max_matches: Some(5),
            log_level: "info".to_string(),
            ..SearchConfig::default()
        };

        let merged = file_config.merge_with_cli(CliOverrides {
            patterns: vec!["^xyz".to_string()],
            output_dir: Some(PathBuf::from("out")),
            thread_count: NonZeroUsize::new(2),
            max_duration: Some("10m".to_string()),
            ..CliOverrides::default()
        });

        assert_eq!(merged.patterns, vec!["^xyz"]); // CLI value
        assert_eq!(merged.output_dir, PathBuf::from("out")); // CLI value
        assert_eq!(merged.thread_count, NonZeroUsize::new(2).unwrap()); // CLI value
        assert_eq!(merged.max_matches, Some(5)); // File value (CLI None)
        assert_eq!(merged.max_duration.as_deref(), Some("10m")); // CLI value
        assert_eq!(merged.log_level, "info"); // File value (CLI None)
    }

    #[test]
    fn test_cli_log_level_wins() {
        let file_config = SearchConfig {
            log_level: "info".to_string(),
            ..SearchConfig::default()
        };

        let merged = file_config.merge_with_cli(CliOverrides {
            log_level: Some("trace".to_string()),
            ..CliOverrides::default()
        });
        assert_eq!(merged.log_level, "trace");
    }

    #[test]
    fn test_invalid_duration() {
        let config = SearchConfig {
            max_duration: Some("soon".to_string()),
            ..SearchConfig::default()
        };
        let err = config.search_options().unwrap_err();
        assert!(matches!(err, VanityError::ConfigError(_)));
    }

    #[test]
    fn test_invalid_config() {
        let dir = tempdir().unwrap();
        let config_path = write_config(
            &dir,
            r#"
            patterns: 123
            thread_count: "invalid"
        "#,
        );

        let result = SearchConfig::load_from(Some(&config_path));
        assert!(result.is_err(), "Expected error loading invalid config");
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = SearchConfig::load_from(Some(Path::new("nonexistent.yaml")));
        assert!(result.is_err());
    }
}
