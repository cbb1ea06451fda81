/*!
 * Switchyard CLI
 *
 * Reads a switch request (JSON) from a file or stdin, routes it, and prints
 * the response document to stdout.
 */

use clap::{Parser, ValueEnum};
use std::io::Read;
use std::path::PathBuf;
use switchyard::{
    config::{DestinationBackend, LogLevel, RouterConfig},
    error::{Result, SwitchError, EXIT_SUCCESS},
    logging, SwitchRequest, SwitchRouter,
};

#[derive(Parser)]
#[command(name = "switchyard")]
#[command(version, about = "Route a stream of JSON records to N filtered cases", long_about = None)]
struct Cli {
    /// Request document, or '-' for stdin
    #[arg(short = 'r', long = "request", value_name = "FILE", default_value = "-")]
    request: String,

    /// Write the response here instead of stdout
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    output: Option<PathBuf>,

    /// Path to config file (TOML)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level
    #[arg(long = "log-level", value_enum)]
    log_level: Option<LogLevelArg>,

    /// Path to log file (default: stderr)
    #[arg(long, value_name = "FILE")]
    log: Option<PathBuf>,

    /// Enable verbose logging (equivalent to --log-level=debug)
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Records buffered per case before reading pauses
    #[arg(long, value_name = "N")]
    channel_capacity: Option<usize>,

    /// Milliseconds to wait for stored outputs to be acknowledged
    #[arg(long, value_name = "MS")]
    durability_timeout_ms: Option<u64>,

    /// Store receiving outputs when the request names a destination
    #[arg(long, value_enum)]
    destination_backend: Option<DestinationArg>,

    /// Base directory for the local destination backend
    #[arg(long, value_name = "DIR")]
    local_root: Option<PathBuf>,

    /// Print per-case statistics to stderr
    #[arg(long)]
    stats: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevelArg> for LogLevel {
    fn from(arg: LogLevelArg) -> Self {
        match arg {
            LogLevelArg::Error => LogLevel::Error,
            LogLevelArg::Warn => LogLevel::Warn,
            LogLevelArg::Info => LogLevel::Info,
            LogLevelArg::Debug => LogLevel::Debug,
            LogLevelArg::Trace => LogLevel::Trace,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum DestinationArg {
    S3,
    Local,
    Memory,
}

impl From<DestinationArg> for DestinationBackend {
    fn from(arg: DestinationArg) -> Self {
        match arg {
            DestinationArg::S3 => DestinationBackend::S3,
            DestinationArg::Local => DestinationBackend::Local,
            DestinationArg::Memory => DestinationBackend::Memory,
        }
    }
}

fn main() {
    let code = match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    };
    std::process::exit(code);
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let config = build_config(&cli)?;
    logging::init_logging(&config)?;

    let request = read_request(&cli.request)?;

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| SwitchError::Internal(format!("Failed to start async runtime: {}", e)))?;

    let outcome = runtime.block_on(async {
        let router = SwitchRouter::from_config(config).await?;
        router.route(request).await
    })?;

    if cli.stats {
        for stats in &outcome.stats {
            eprintln!(
                "case {}: {} / {} passed, {} predicate errors",
                stats.case_index, stats.passed, stats.seen, stats.predicate_errors
            );
        }
    }

    let response = serde_json::to_string_pretty(&outcome.into_response())?;
    match &cli.output {
        Some(path) => std::fs::write(path, response + "\n")?,
        None => println!("{}", response),
    }

    Ok(())
}

/// Config file first, then command-line overrides
fn build_config(cli: &Cli) -> Result<RouterConfig> {
    let mut config = match &cli.config {
        Some(path) => RouterConfig::from_file(path)?,
        None => RouterConfig::default(),
    };

    if let Some(level) = cli.log_level {
        config.log_level = level.into();
    }
    if cli.log.is_some() {
        config.log_file = cli.log.clone();
    }
    config.verbose |= cli.verbose;
    if let Some(capacity) = cli.channel_capacity {
        config.channel_capacity = capacity;
    }
    if let Some(ms) = cli.durability_timeout_ms {
        config.durability_timeout_ms = ms;
    }
    if let Some(backend) = cli.destination_backend {
        config.destination_backend = backend.into();
    }
    if cli.local_root.is_some() {
        config.local_root = cli.local_root.clone();
    }

    config.validate()?;
    Ok(config)
}

fn read_request(source: &str) -> Result<SwitchRequest> {
    let text = if source == "-" {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        text
    } else {
        std::fs::read_to_string(source).map_err(|e| {
            SwitchError::Config(format!("Failed to read request {}: {}", source, e))
        })?
    };

    SwitchRequest::from_json(&text).map_err(|e| SwitchError::Config(format!("Invalid request: {}", e)))
}
