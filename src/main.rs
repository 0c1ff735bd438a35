mod cli_logger;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::{EnvFilter, Layer as _};

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use cli_logger::CliLogger;
use dlbench::cmd::manifest_cmd::{ManifestCommand, manifest_command};
use dlbench::cmd::run_cmd::RunArgs;
use dlbench::{
    BenchSession, Config, DEFAULT_CONFIG_FILE, Profiler, ReportCommand, StatusFile, report_command,
};

#[derive(Debug, Parser)]
#[command(
    name = "dlbench",
    version,
    about = "Benchmark bulk download tools against a shared manifest"
)]
struct Cli {
    /// Optional TOML config; missing means built-in defaults.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Machine-readable output.
    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run every selected tool `num_runs` times and write the comparison report.
    Run(RunArgs),
    /// Re-render or summarize saved results.
    Report {
        #[command(subcommand)]
        command: ReportCommand,
    },
    /// Inspect a manifest or match it against an existing directory.
    Manifest {
        #[command(subcommand)]
        command: ManifestCommand,
    },
    /// Print the progress status file of the current or last session.
    Status,
}

fn main() {
    let cli = Cli::parse();
    let logger = CliLogger::new(cli.json, cli.no_color);
    if let Err(err) = run(cli, &logger) {
        logger.print_error(&format!("{err:#}"));
        std::process::exit(1);
    }
}

fn run(cli: Cli, logger: &CliLogger) -> Result<()> {
    let mut config = Config::load_optional(&cli.config);
    match &cli.command {
        Command::Run(args) => {
            args.apply(&mut config)?;
            std::fs::create_dir_all(&config.results_dir).with_context(|| {
                format!("cannot create results dir {}", config.results_dir.display())
            })?;
            let profiler = Profiler::new();
            init_tracing(Some(&config.log_path()), Some(&profiler))?;
            let outcome = BenchSession::new(&config, profiler).run(&args.manifest)?;
            logger.print_session_summary(&outcome)?;
        }
        Command::Report { command } => {
            init_tracing(None, None)?;
            logger.print_serialized(&report_command(command)?)?;
        }
        Command::Manifest { command } => {
            init_tracing(None, None)?;
            logger.print_serialized(&manifest_command(&config, command)?)?;
        }
        Command::Status => {
            let status = StatusFile::new(config.status_path()).read()?;
            logger.print_serialized(&status)?;
        }
    }
    Ok(())
}

/// stderr plus an optional append-only log file, both filtered by `RUST_LOG` (default `info`).
/// The profiler layer is unfiltered so it sees every span.
fn init_tracing(log_file: Option<&Path>, profiler: Option<&Profiler>) -> Result<()> {
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(filter());

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .with_filter(filter()),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(profiler.map(Profiler::layer))
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;
    Ok(())
}
