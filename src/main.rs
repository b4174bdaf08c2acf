use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tracing::{error, info, warn};

use netorb::bench::Coordinator;
use netorb::config::persistence::ResultsStorage;
use netorb::config::{RunConfig, WorkMode};
use netorb::error::{is_config_error, user_friendly_message};
use netorb::output::{ConsoleSink, LogFileSink};
use netorb::util::units::{format_byte_rate, parse_bytes, parse_duration};
use netorb::util::check_descriptor_budget;
use netorb::{work, Result};

#[derive(Parser, Debug)]
#[command(name = "netorb", version)]
#[command(about = "Rate-controlled, time-bounded network load harness")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a load test
    Run {
        #[command(flatten)]
        overrides: Overrides,

        /// Append the summary to the run history
        #[arg(long)]
        save: bool,

        /// No progress bar or interval lines on the terminal
        #[arg(long, short)]
        quiet: bool,
    },
    /// Show recent saved run summaries
    History {
        /// Number of summaries to show
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Print the effective configuration as TOML
    Config {
        #[command(flatten)]
        overrides: Overrides,

        /// Save the effective configuration to the config file
        #[arg(long)]
        write: bool,
    },
}

/// Flags that override the config file
#[derive(Args, Debug)]
struct Overrides {
    /// Config file (defaults to the user config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// `host:port` for tcp-connect, a URL for http
    #[arg(long)]
    target: Option<String>,

    #[arg(long, value_enum)]
    mode: Option<WorkMode>,

    /// Number of concurrent workers
    #[arg(long, short)]
    concurrency: Option<usize>,

    /// Run time, e.g. 30s or 2m
    #[arg(long, short, value_parser = parse_duration)]
    duration: Option<Duration>,

    /// Per-worker limit in operations per second
    #[arg(long, short)]
    rate: Option<f64>,

    /// Upper bound on one unit of work
    #[arg(long, value_parser = parse_duration)]
    timeout: Option<Duration>,

    /// Stats sampling interval
    #[arg(long, value_parser = parse_duration)]
    interval: Option<Duration>,

    /// Bytes written per TCP connection, e.g. 1KiB
    #[arg(long, value_parser = parse_bytes)]
    payload: Option<u64>,

    /// Append interval lines to this CSV file
    #[arg(long)]
    stats_log: Option<PathBuf>,
}

impl Overrides {
    fn load(&self) -> Result<RunConfig> {
        match &self.config {
            Some(path) => RunConfig::load_from(path),
            None => RunConfig::load(),
        }
    }

    fn apply(&self, mut config: RunConfig) -> RunConfig {
        if let Some(target) = &self.target {
            config.target = target.clone();
        }
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(duration) = self.duration {
            config.duration = duration;
        }
        if self.rate.is_some() {
            config.rate_limit = self.rate;
        }
        if let Some(timeout) = self.timeout {
            config.work_timeout = timeout;
        }
        if let Some(interval) = self.interval {
            config.sample_interval = interval;
        }
        if let Some(payload) = self.payload {
            config.payload_size = payload;
        }
        if self.stats_log.is_some() {
            config.stats_log = self.stats_log.clone();
        }
        config
    }

    fn effective(&self) -> Result<RunConfig> {
        Ok(self.apply(self.load()?))
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Run {
            overrides,
            save,
            quiet,
        } => run(overrides, save, quiet).await,
        Command::History { limit } => history(limit),
        Command::Config { overrides, write } => show_config(overrides, write),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "netorb failed");
            eprintln!("Error: {}", user_friendly_message(&e));
            if is_config_error(&e) {
                ExitCode::from(2)
            } else {
                ExitCode::from(1)
            }
        }
    }
}

async fn run(overrides: Overrides, save: bool, quiet: bool) -> Result<()> {
    let config = overrides.effective()?;
    let mut coordinator = Coordinator::new(config)?;
    let config = coordinator.config().clone();

    check_descriptor_budget(config.concurrency);
    let work = work::for_config(&config)?;

    if !quiet {
        coordinator.add_sink(Box::new(ConsoleSink::new(config.duration)));
    }
    if let Some(path) = &config.stats_log {
        let sink = LogFileSink::open(path)?;
        info!(path = %sink.path().display(), "Writing stats log");
        coordinator.add_sink(Box::new(sink));
    }

    let summary = coordinator.run_with_signal_handling(work).await?;

    println!("{}", summary.summary());
    if summary.bytes > 0 {
        println!("Data: {}", format_byte_rate(summary.bytes, summary.elapsed));
    }

    if save {
        match ResultsStorage::new().and_then(|storage| {
            storage.append_result(summary)?;
            Ok(storage)
        }) {
            Ok(storage) => info!(path = %storage.path().display(), "Summary saved"),
            Err(e) => warn!(error = %e, "Failed to save summary"),
        }
    }

    Ok(())
}

fn history(limit: usize) -> Result<()> {
    let storage = ResultsStorage::new()?;
    let results = storage.get_recent_results(limit)?;

    if results.is_empty() {
        println!("No saved runs in {}", storage.path().display());
        return Ok(());
    }

    for summary in results.iter().rev() {
        println!("{}", summary.summary());
    }
    Ok(())
}

fn show_config(overrides: Overrides, write: bool) -> Result<()> {
    let config = overrides.effective()?;
    print!("{}", config.to_toml()?);

    if write {
        let path = match &overrides.config {
            Some(path) => {
                config.save_to(path)?;
                path.clone()
            }
            None => config.save()?,
        };
        info!(path = %path.display(), "Configuration saved");
    }
    Ok(())
}
