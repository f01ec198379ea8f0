// SPDX-License-Identifier: Apache-2.0

use clap::{Parser, ValueEnum};
use std::io::IsTerminal;
use std::process::ExitCode;
use tokio::select;
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tower::BoxError;
use tracing::metadata::LevelFilter;
use tracing::{error, info, warn};
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_log::LogTracer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};

use rotail::init::args::HarvestArgs;
use rotail::init::{sink, wait};
use rotail::{ChannelConsumer, Harvester, HarvesterConfig};

#[derive(Debug, clap::Subcommand)]
enum Commands {
    /// Tail a rotated log, resuming from the tombstone
    Start(Box<HarvestArgs>),

    /// Return version
    Version,
}

#[derive(Debug, Parser)]
#[command(name = "rotail")]
#[command(bin_name = "rotail")]
#[command(version, about, long_about = None)]
#[command(subcommand_required = true)]
struct Arguments {
    #[arg(
        value_enum,
        long,
        global = true,
        env = "ROTAIL_LOG_FORMAT",
        default_value = "text"
    )]
    /// Log format
    log_format: LogFormatArg,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, ValueEnum)]
pub enum LogFormatArg {
    Text,
    Json,
}

fn main() -> ExitCode {
    let opt = Arguments::parse();

    match opt.command {
        Some(Commands::Version) => {
            println!("{}", get_version())
        }
        Some(Commands::Start(args)) => {
            let config = match args.build_config() {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("ERROR: {}", e);
                    return ExitCode::from(2);
                }
            };

            // Lines own stdout unless they go to a file
            let _logger = match setup_logging(&opt.log_format, args.output.is_none()) {
                Ok(guard) => guard,
                Err(e) => {
                    eprintln!("ERROR: failed to setup logging: {}", e);
                    return ExitCode::from(1);
                }
            };

            if let Err(e) = run_harvester(args, config) {
                error!(error = ?e, "Failed to run harvester.");
                return ExitCode::from(1);
            }
        }
        _ => {
            // subcommand is required
            eprintln!("Must specify a command");
            return ExitCode::from(2);
        }
    }

    ExitCode::SUCCESS
}

#[tokio::main]
async fn run_harvester(args: Box<HarvestArgs>, config: HarvesterConfig) -> Result<(), BoxError> {
    let cancel_token = CancellationToken::new();

    let writer = sink::open_output(args.output.as_deref()).await?;
    let (consumer, lines_rx) = ChannelConsumer::channel(args.queue_size);

    let harvester = Harvester::new(config)?;
    let stats = harvester.stats();
    let handle = harvester.spawn(consumer, cancel_token.clone())?;

    let mut tasks = wait::TaskSet::new();
    tasks.spawn(async move { sink::run_sink(lines_rx, writer).await.map(|_| ()) });
    tasks.spawn(wait::join_harvester(handle));

    let mut result = Ok(());
    select! {
        r = signal_wait() => {
            match r {
                Ok(()) => info!("Shutdown signal received."),
                Err(e) => result = Err(e),
            }
        },
        e = wait::wait_for_any_task(&mut tasks) => {
            match e {
                Ok(()) => warn!("Unexpected early exit of harvester."),
                Err(e) => result = Err(e),
            }
        },
    }
    cancel_token.cancel();

    // The harvester writes its final checkpoint before the sink sees the
    // channel close
    let drained = wait::wait_for_tasks_with_timeout(&mut tasks, args.shutdown_timeout()).await;
    result?;
    drained?;

    let snapshot = stats.snapshot();
    info!(
        lines = snapshot.lines_delivered,
        bytes = snapshot.bytes_delivered,
        checkpoints = snapshot.checkpoints,
        rotations = snapshot.rotations,
        "Harvester shut down."
    );
    Ok(())
}

type LoggerGuard = tracing_appender::non_blocking::WorkerGuard;

fn setup_logging(log_format: &LogFormatArg, to_stderr: bool) -> Result<LoggerGuard, BoxError> {
    LogTracer::init()?;

    let (non_blocking_writer, guard) = if to_stderr {
        tracing_appender::non_blocking(std::io::stderr())
    } else {
        tracing_appender::non_blocking(std::io::stdout())
    };

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env()?
        .add_directive("opentelemetry=warn".parse()?);

    if *log_format == LogFormatArg::Json {
        let app_name = format!("{}-{}", env!("CARGO_PKG_NAME"), get_version());
        let bunyan_formatting_layer = BunyanFormattingLayer::new(app_name, non_blocking_writer);

        let subscriber = Registry::default()
            .with(filter)
            .with(JsonStorageLayer)
            .with(bunyan_formatting_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        // Skip color codes when not in a terminal
        let use_ansi = if to_stderr {
            std::io::stderr().is_terminal()
        } else {
            std::io::stdout().is_terminal()
        };

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking_writer)
            .with_target(false)
            .with_level(true)
            .with_ansi(use_ansi)
            .compact();

        let subscriber = Registry::default().with(filter).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    }
    Ok(guard)
}

fn get_version() -> String {
    // Set during CI
    let version_build = option_env!("BUILD_SHORT_SHA").unwrap_or("dev");

    format!("{}-{}", env!("CARGO_PKG_VERSION"), version_build)
}

async fn signal_wait() -> Result<(), BoxError> {
    let mut sig_term = signal(SignalKind::terminate())?;
    let mut sig_int = signal(SignalKind::interrupt())?;

    select! {
        _ = sig_term.recv() => {},
        _ = sig_int.recv() => {},
    }
    Ok(())
}
