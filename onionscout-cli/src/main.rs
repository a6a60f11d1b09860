use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use onionscout::{
    config::{CliOverrides, SearchConfig},
    persist::verify_key_file,
    search::{split_patterns, PatternSet, SearchSummary, Searcher},
    OnionAddress, StatsSnapshot,
};
use std::{num::NonZeroUsize, path::PathBuf, time::Duration};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Parser)]
struct CliSearchConfig {
    /// Comma-separated regular expressions matched against the address (e.g. ^cafe,^beef)
    patterns: Option<String>,

    /// Directory matched keys are written to
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Number of worker threads
    #[arg(short = 'j', long)]
    threads: Option<NonZeroUsize>,

    /// Stop after this many matches
    #[arg(short = 'n', long)]
    max_matches: Option<u64>,

    /// Stop after this many attempts
    #[arg(long)]
    max_attempts: Option<u64>,

    /// Stop after this much time (e.g. 90s, 1h 30m)
    #[arg(long)]
    max_duration: Option<String>,

    /// Also write a Tor hidden service directory for each match
    #[arg(long)]
    tor_layout: bool,

    /// Configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the final summary as JSON
    #[arg(long)]
    json: bool,

    /// Do not show the progress spinner
    #[arg(short, long)]
    quiet: bool,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Search for keys whose address matches the patterns
    Search(Box<CliSearchConfig>),

    /// Check that stored keys derive the address they are named after
    Verify {
        /// Key files or hidden service directories
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Validate an onion address and print its public key
    Decode {
        /// Address, with or without the .onion suffix
        address: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Search(args) => run_search(*args, cli.verbose),
        Commands::Verify { files } => {
            init_logging("warn", cli.verbose);
            run_verify(&files)
        }
        Commands::Decode { address } => {
            init_logging("warn", cli.verbose);
            run_decode(&address)
        }
    }
}

fn init_logging(level: &str, verbose: bool) {
    let level = if verbose { "debug" } else { level };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_search(args: CliSearchConfig, verbose: bool) -> Result<()> {
    let file_config = SearchConfig::load_from(args.config.as_deref())
        .context("Failed to load configuration")?;
    let config = file_config.merge_with_cli(CliOverrides {
        patterns: args
            .patterns
            .as_deref()
            .map(split_patterns)
            .unwrap_or_default(),
        output_dir: args.output,
        thread_count: args.threads,
        max_matches: args.max_matches,
        max_attempts: args.max_attempts,
        max_duration: args.max_duration,
        tor_layout: args.tor_layout,
        log_level: args.log_level,
    });
    init_logging(&config.log_level, verbose);

    if config.patterns.is_empty() {
        bail!("No patterns given. Usage: onionscout-cli search '^name,^other'");
    }

    let patterns = PatternSet::compile(&config.patterns)?;
    if !args.json {
        println!(
            "Searching with {} patterns on {} threads, saving to {}",
            patterns.len(),
            config.thread_count,
            config.output_dir.display()
        );
    }

    let options = config.search_options()?;
    let searcher = Searcher::new(options, patterns);

    let stop = searcher.stop_signal();
    if let Err(e) = ctrlc::set_handler(move || stop.stop()) {
        warn!("Could not install Ctrl-C handler: {}", e);
    }

    let progress = if args.quiet || args.json {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(Duration::from_millis(120));
        bar
    };

    let started = std::time::Instant::now();
    let summary = searcher.run_with_progress(config.progress_interval(), |snapshot| {
        progress.set_message(format_progress(&snapshot, started.elapsed()));
    });
    progress.finish_and_clear();
    let summary = summary?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_search_results(&summary);
    }
    Ok(())
}

fn format_progress(snapshot: &StatsSnapshot, elapsed: Duration) -> String {
    format!(
        "{} keys | {:.0} keys/s | {} found",
        snapshot.attempts,
        snapshot.rate(elapsed),
        snapshot.matches
    )
}

fn print_search_results(summary: &SearchSummary) {
    for saved in &summary.found {
        println!(
            "{} {}.onion -> {}",
            "Found".green().bold(),
            saved.address,
            saved.path.display().to_string().blue()
        );
    }

    for failure in &summary.failed_workers {
        println!(
            "{} worker {}: {}",
            "Failed".red().bold(),
            failure.worker,
            failure.error
        );
    }

    let snapshot = StatsSnapshot {
        attempts: summary.attempts,
        matches: summary.matches,
    };
    println!(
        "\nTried {} keys in {} ({:.0} keys/s), found {} matches",
        summary.attempts,
        humantime::format_duration(Duration::from_secs(summary.elapsed.as_secs())),
        snapshot.rate(summary.elapsed),
        summary.matches
    );
}

fn run_verify(files: &[PathBuf]) -> Result<()> {
    let mut failed = 0;
    for path in files {
        match verify_key_file(path) {
            Ok(address) => {
                println!("{} {}", "OK".green().bold(), address.hostname());
            }
            Err(e) => {
                failed += 1;
                println!("{} {}: {}", "FAIL".red().bold(), path.display(), e);
            }
        }
    }
    debug!("Verified {} key files, {} failed", files.len(), failed);

    if failed > 0 {
        bail!("{} of {} key files failed verification", failed, files.len());
    }
    Ok(())
}

fn run_decode(address: &str) -> Result<()> {
    let address = OnionAddress::parse(address)?;
    let public_key = address.public_key()?;
    println!("{}", address.hostname());
    println!("{}", hex::encode(public_key));
    Ok(())
}
