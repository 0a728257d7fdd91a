use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use waveid::{Config, Engine};

#[derive(Parser)]
#[command(name = "waveid")]
#[command(about = "Landmark acoustic fingerprinting and alignment engine", long_about = None)]
struct Cli {
    /// Path to a JSON configuration file overriding the defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fingerprint every matching file in a directory.
    Fingerprint {
        /// Directory to scan.
        dir: PathBuf,
        /// File extension to include (without the leading dot).
        #[arg(default_value = "wav")]
        ext: String,
        /// Worker pool size; defaults to the available parallelism.
        #[arg(long)]
        nproc: Option<usize>,
    },
    /// Recognize a query against the store.
    Recognize {
        #[command(subcommand)]
        source: RecognizeSource,
    },
}

#[derive(Subcommand)]
enum RecognizeSource {
    /// Recognize a WAV file.
    File { path: PathBuf },
    /// Record from the default microphone and recognize the capture.
    #[cfg(feature = "mic")]
    Mic {
        /// Seconds to record.
        seconds: f64,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::from_json_file(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Ok(Config::default()),
    }
}

fn run() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    let mut engine = Engine::open(config).context("opening store")?;

    match cli.command {
        Command::Fingerprint { dir, ext, nproc } => {
            let summary = engine
                .ingest_directory(&dir, &[ext.as_str()], nproc)
                .with_context(|| format!("ingesting directory {}", dir.display()))?;
            log::info!(
                "ingested {} track(s), skipped {} duplicate(s), {} failure(s)",
                summary.ingested,
                summary.skipped_duplicates,
                summary.failed
            );
        }
        Command::Recognize { source } => match source {
            RecognizeSource::File { path } => {
                let response = engine
                    .recognize_file(&path)
                    .with_context(|| format!("recognizing {}", path.display()))?;
                print_response(&response);
            }
            #[cfg(feature = "mic")]
            RecognizeSource::Mic { seconds } => {
                if seconds <= 0.0 {
                    bail!("recording duration must be positive");
                }
                let (samples, sample_rate) =
                    waveid::mic::capture(seconds).context("capturing from microphone")?;
                let response = engine
                    .recognize_samples(vec![samples], sample_rate)
                    .context("recognizing microphone capture")?;
                print_response(&response);
            }
        },
    }

    Ok(())
}

fn print_response(response: &waveid::RecognitionResponse) {
    if response.results.is_empty() {
        println!("no match");
        return;
    }
    for result in &response.results {
        println!(
            "{}  offset={}f ({:.5}s)  input_confidence={:.2}  fingerprinted_confidence={:.2}",
            result.song_name,
            result.offset,
            result.offset_seconds,
            result.input_confidence,
            result.fingerprinted_confidence,
        );
    }
    println!(
        "total={:?} fingerprint={:?} query={:?} align={:?}",
        response.timings.total_time,
        response.timings.fingerprint_time,
        response.timings.query_time,
        response.timings.align_time,
    );
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
