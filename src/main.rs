#[macro_use]
extern crate log;

mod atomic_counter;
mod chunk_processor;
mod progress_reporter;
mod shared_types;

use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use chunk_processor::{inspect_target, ChunkProcessor, ProcessError, ProcessorConfig};
use indicatif::MultiProgress;
use indicatif_log_bridge::LogWrapper;
use progress_reporter::{finish_report, format_speed, ProgressReporter};
use shared_types::{ByteCount, ChunkProgress, DEFAULT_CHUNK_SIZE};

use tokio::{
    sync::{broadcast, mpsc},
    time::Instant,
};

const PROGRESS_QUEUE_DEPTH: usize = 64;

/// CHUNKER: File processing in BITES!
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct CliArgs {
    /// The file to process
    file_path: PathBuf,

    /// Bytes read per chunk
    #[arg(short, long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Simulated work per chunk, in milliseconds
    #[arg(short, long, default_value_t = 100)]
    delay_ms: u64,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn Error>> {
    let args = CliArgs::parse();
    let multi = MultiProgress::new();
    init_logging(&multi, args.verbose)?;

    let file_size = match validate_input(&args.file_path).await {
        Ok(size) => size,
        Err(message) => {
            println!("{message}");
            return Ok(ExitCode::FAILURE);
        }
    };

    let config = ProcessorConfig {
        chunk_size: args.chunk_size,
        process_delay: Duration::from_millis(args.delay_ms),
    };
    debug!("running with {:?}", config);

    let (s_progress, r_progress) = mpsc::channel::<ChunkProgress>(PROGRESS_QUEUE_DEPTH);
    let processor = match ChunkProcessor::new(config) {
        Ok(processor) => processor.with_progress(s_progress),
        Err(e) => {
            error!("{e}");
            return Ok(ExitCode::FAILURE);
        }
    };
    let reporter = ProgressReporter::new(r_progress, Some(file_size), multi).spawn();

    let (s_shutdown, r_shutdown) = broadcast::channel::<()>(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupted, stopping after the current chunk");
            s_shutdown.send(()).ok();
        }
    });

    let started = Instant::now();
    let result = processor.process(&args.file_path, r_shutdown).await;
    let pb = reporter.await?;
    finish_report(&pb, &result);
    let elapsed = started.elapsed();

    match result {
        Ok(summary) => {
            info!(
                "{} chunks, {} bytes, {}",
                summary.chunks,
                summary.bytes,
                format_speed(summary.throughput())
            );
            println!("Elapsed: {}", format_elapsed(elapsed));
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!("{e}");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn init_logging(multi: &MultiProgress, verbose: bool) -> Result<(), Box<dyn Error>> {
    let level = if verbose {
        simplelog::LevelFilter::Debug
    } else {
        simplelog::LevelFilter::Info
    };
    let logger = simplelog::TermLogger::new(
        level,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );
    LogWrapper::new(multi.clone(), logger).try_init()?;
    log::set_max_level(level);
    Ok(())
}

/// Microseconds in Rust's scientific notation, e.g. `3.012e5 µs`.
fn format_elapsed(elapsed: Duration) -> String {
    format!("{:.3e} µs", elapsed.as_secs_f64() * 1e6)
}

/// Caller-side checks, worded for the console.
async fn validate_input(path: &Path) -> Result<ByteCount, String> {
    inspect_target(path).await.map_err(|e| match e {
        ProcessError::NotFound(_) => format!("File '{}' does not exist", path.display()),
        ProcessError::NotAFile(_) => format!("'{}' is not a file", path.display()),
        other => other.to_string(),
    })
}
