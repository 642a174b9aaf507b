//! # Transporter CLI
//!
//! Command-line entry point: runs a pipeline declared in YAML, and exposes
//! two operator actions — inspecting durability state and clearing a
//! stopped writer's error log.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use transporter_core::{PipelineSpec, ReaderAdaptor, TransformFn, TransporterError, WriterAdaptor};
use transporter_durability::{CommitLog, ErrorLog, OffsetStateStore};
use transporter_runtime::PipelineSupervisor;

#[derive(Parser, Debug)]
#[command(name = "transporter")]
#[command(about = "At-least-once data-movement pipeline runner")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a pipeline until it completes, faults, or Ctrl-C is received.
    Run {
        /// Path to the pipeline YAML configuration file.
        #[arg(short, long)]
        pipeline: PathBuf,
    },
    /// Print per-writer offsets and per-namespace reader state.
    Status {
        #[arg(short, long)]
        pipeline: PathBuf,
    },
    /// Clear a writer's error log so the pipeline can restart.
    TruncateErrors {
        #[arg(short, long)]
        pipeline: PathBuf,
        /// Writer node id whose error log should be truncated.
        writer: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let exit_code = match args.command {
        Command::Run { pipeline } => run(pipeline).await,
        Command::Status { pipeline } => status(pipeline),
        Command::TruncateErrors { pipeline, writer } => truncate_errors(pipeline, writer),
    };

    match exit_code {
        Ok(code) => std::process::exit(code),
        Err(error) => {
            tracing::error!(%error, "transporter failed");
            std::process::exit(1);
        }
    }
}

fn load_spec(path: &PathBuf) -> Result<PipelineSpec> {
    let yaml = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_yaml::from_str(&yaml).with_context(|| format!("parsing {}", path.display()))
}

/// Logs a configuration error and returns its exit code (`2` per spec §6)
/// instead of letting it erase into a bare `anyhow::Error` that would fall
/// through to `main`'s generic `exit(1)` handling.
fn report_configuration_error(error: TransporterError) -> i32 {
    let code = error.exit_code();
    tracing::error!(%error, "invalid pipeline configuration");
    code
}

async fn run(pipeline: PathBuf) -> Result<i32> {
    let spec = load_spec(&pipeline)?;

    let readers = transporter_io::builtin_readers();
    let writers_registry = transporter_io::builtin_writers();
    let transforms_registry = transporter_io::builtin_transforms();

    let reader: Box<dyn ReaderAdaptor> = match readers.build(&spec.reader.adaptor, &spec.reader.options) {
        Ok(reader) => reader,
        Err(error) => return Ok(report_configuration_error(error)),
    };

    let mut transforms: HashMap<String, Arc<dyn TransformFn>> = HashMap::new();
    for t in &spec.transforms {
        let built = match transforms_registry.build(&t.transform, &t.options) {
            Ok(built) => built,
            Err(error) => return Ok(report_configuration_error(error)),
        };
        transforms.insert(t.id.clone(), built);
    }

    let mut writers: HashMap<String, Box<dyn WriterAdaptor>> = HashMap::new();
    for w in &spec.writers {
        let built = match writers_registry.build(&w.adaptor, &w.options) {
            Ok(built) => built,
            Err(error) => return Ok(report_configuration_error(error)),
        };
        writers.insert(w.id.clone(), built);
    }

    let cancel = CancellationToken::new();
    let supervisor = PipelineSupervisor::new(spec, reader, transforms, writers);

    let run_cancel = cancel.clone();
    let report = tokio::select! {
        report = supervisor.run(run_cancel) => report,
        _ = signal::ctrl_c() => {
            tracing::info!("received Ctrl-C, shutting down");
            cancel.cancel();
            return Ok(0);
        }
    };

    match report {
        Ok(report) => match report.cause {
            Some(fault) => {
                tracing::error!(node = %fault.node_id, error = %fault.error, "pipeline stopped on fault");
                Ok(fault.error.exit_code())
            }
            None => Ok(0),
        },
        Err(error) => {
            let code = error.exit_code();
            tracing::error!(%error, "pipeline failed to start");
            Ok(code)
        }
    }
}

fn status(pipeline: PathBuf) -> Result<i32> {
    let spec = load_spec(&pipeline)?;
    let state_dir = PathBuf::from(&spec.state_dir);

    let store = OffsetStateStore::open(state_dir.join("offsets-states"))?;
    println!("pipeline: {}", spec.name);
    println!("reader state:");
    let mut states = store.read_all_states()?;
    states.sort_by(|a, b| a.namespace.cmp(&b.namespace));
    if states.is_empty() {
        println!("  (none persisted yet)");
    }
    for state in &states {
        println!(
            "  {:<30} mode={:?} timestamp={} identifier={:?}",
            state.namespace, state.mode, state.timestamp, state.identifier
        );
    }

    println!("writers:");
    for w in &spec.writers {
        let writer_dir = state_dir.join("writers").join(&w.id);
        let offset = store.read_offset(&w.id)?;
        let error_count = ErrorLog::open(writer_dir.join("error.log"))
            .and_then(|log| log.len())
            .unwrap_or(0);
        let (_, recovered) = CommitLog::open(writer_dir.join("commit.log"))?;
        println!(
            "  {:<20} committed_offset={:?} durable_offset={:?} highest_offset={:?} errors={}",
            w.id, offset, recovered.durable_offset, recovered.highest_offset, error_count
        );
    }

    Ok(0)
}

fn truncate_errors(pipeline: PathBuf, writer: String) -> Result<i32> {
    let spec = load_spec(&pipeline)?;
    let state_dir = PathBuf::from(&spec.state_dir);

    if !spec.writers.iter().any(|w| w.id == writer) {
        return Err(TransporterError::Configuration(format!("no writer {writer:?} in {}", pipeline.display())).into());
    }

    let error_log_path = state_dir.join("writers").join(&writer).join("error.log");
    let error_log = ErrorLog::open(&error_log_path)?;
    let cleared = error_log.len()?;
    error_log.truncate()?;
    println!("truncated {cleared} entries from {}", error_log_path.display());
    Ok(0)
}
