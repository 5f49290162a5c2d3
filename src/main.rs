use std::future::Future;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{error::ErrorKind, Parser};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use beat_extractor::{BeatExtractor, Config, ExtractionMode, ExtractorError, FailureKind};

#[derive(Parser, Debug)]
#[command(
    name = "beat-extractor",
    version,
    about = "Extract onset or beat timestamps from an audio file",
    long_about = "Beat-Extractor loads an audio file, detects onsets or tempo-tracked beats, and writes one timestamp in seconds (4 decimal places) per line to the output file."
)]
struct Cli {
    /// Audio file path (WAV, MP3, FLAC, OGG, ...)
    audio_path: PathBuf,

    /// Text file to write timestamps to (overwritten)
    output_path: PathBuf,

    /// Detection mode (onset, beat)
    #[arg(short, long, default_value = "onset")]
    mode: ExtractionMode,

    /// Configuration file (optional)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Abort analysis after this many seconds
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Number of timestamps to echo after writing
    #[arg(short, long)]
    preview: Option<usize>,

    /// Move onsets back to the preceding energy minimum
    #[arg(short, long)]
    backtrack: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => return usage_exit(err),
    };

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let outcome = match run_detached(run(cli)) {
        Ok(outcome) => outcome,
        Err(err) => {
            eprintln!("Error processing audio: cannot start async runtime: {}", err);
            return ExitCode::from(FailureKind::Analysis.exit_code() as u8);
        }
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let kind = err
                .downcast_ref::<ExtractorError>()
                .map(ExtractorError::kind)
                .unwrap_or(FailureKind::Analysis);
            let message = err
                .downcast_ref::<ExtractorError>()
                .map(ExtractorError::user_message)
                .unwrap_or_else(|| err.to_string());

            error!("{:?} failure: {}", kind, err);
            eprintln!("Error processing audio: {}", message);
            ExitCode::from(kind.exit_code() as u8)
        }
    }
}

/// Drive `future` to completion on a fresh runtime, then shut the runtime down
/// without waiting for blocking work a timeout has abandoned.
fn run_detached<F: Future>(future: F) -> std::io::Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let output = runtime.block_on(future);
    runtime.shutdown_background();
    Ok(output)
}

/// Help and version exit 0; every other parse failure prints usage to stdout and exits 1
fn usage_exit(err: clap::Error) -> ExitCode {
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
            let _ = err.print();
            ExitCode::SUCCESS
        }
        _ => {
            println!("{}", err.render());
            ExitCode::from(FailureKind::Usage.exit_code() as u8)
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    debug!("Starting Beat-Extractor v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = match &cli.config {
        Some(config_path) => {
            info!("Loading configuration from {:?}", config_path);
            Config::from_file(config_path)?
        }
        None => Config::default(),
    };

    if let Some(seconds) = cli.timeout {
        config.run.timeout_secs = Some(seconds);
    }
    if let Some(count) = cli.preview {
        config.output.preview_count = count;
    }
    if cli.backtrack {
        config.onset.backtrack = true;
    }
    config.validate()?;

    debug!("Mode: {}", cli.mode);
    let extractor = BeatExtractor::new(config);
    extractor
        .extract(&cli.audio_path, &cli.output_path, cli.mode)
        .await?;

    Ok(())
}
