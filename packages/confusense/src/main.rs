use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use confusion_core::{ConfusionBand, ConfusionState, StepOutcome};
use tokio::task::JoinError;

use confusense::config::Config;
use confusense::engine::{ConfusionEngine, EngineError};
use confusense::logging::init_tracing;
use confusense::rephrase::{EventType, RephraseDispatcher, RephraseRequest};
use confusense::session::{CaptureSession, SessionError};
use confusense::source::{read_frames, JsonlSource, SourceError};
use confusense::store::{load_baseline, JsonFileStore, KeyValueStore, StoreError};

/// Frame spacing assumed when calibrating from recorded frames.
const RECORDED_FRAME_MS: u64 = 200;

#[derive(Parser, Debug)]
#[command(name = "confusense")]
#[command(about = "Detects learner confusion from face landmarks and asks an LLM to rephrase", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a capture session over recorded landmark frames
    Watch {
        /// JSON-lines file, one landmark array (or null) per line
        #[arg(long)]
        frames: PathBuf,
        /// Text sent along with confusion-triggered rephrase requests
        #[arg(long)]
        content: Option<PathBuf>,
    },
    /// Calibrate from a neutral and a confused recording and persist the baseline
    Calibrate {
        #[arg(long)]
        neutral: PathBuf,
        #[arg(long)]
        confused: PathBuf,
    },
    /// Inspect or clear the stored calibration
    Calibration {
        #[command(subcommand)]
        action: CalibrationAction,
    },
    /// Send one rephrase request and print the answer
    Rephrase {
        #[arg(long, default_value = "text-selection")]
        event: String,
        #[arg(long)]
        level: Option<f64>,
        text: String,
    },
}

#[derive(Subcommand, Debug)]
enum CalibrationAction {
    Show,
    Reset,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("capture task failed: {0}")]
    Join(#[from] JoinError),
    #[error("{phase} recording has {have} usable frames, {need} needed")]
    NotEnoughFrames {
        phase: &'static str,
        have: usize,
        need: usize,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let config = Config::from_env();
    let _log_guard = init_tracing(&config.log_level);

    match run(cli.command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "confusense failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, config: &Config) -> Result<(), CliError> {
    match command {
        Command::Watch { frames, content } => watch(config, frames, content).await,
        Command::Calibrate { neutral, confused } => calibrate(config, neutral, confused).await,
        Command::Calibration { action } => calibration(config, action),
        Command::Rephrase { event, level, text } => {
            let request = RephraseRequest {
                event_type: EventType::from(event),
                content: text,
                confusion_level: level,
            };
            let answer = RephraseDispatcher::from_config(config).dispatch(&request).await;
            println!("{answer}");
            Ok(())
        }
    }
}

fn open_store(config: &Config) -> Result<Arc<dyn KeyValueStore>, CliError> {
    Ok(Arc::new(JsonFileStore::open(&config.store_path)?))
}

async fn watch(config: &Config, frames: PathBuf, content: Option<PathBuf>) -> Result<(), CliError> {
    let content = match content {
        Some(path) => tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| CliError::Read { path, source })?,
        None => String::new(),
    };

    let dispatcher = RephraseDispatcher::from_config(config);
    match dispatcher.active_provider() {
        Some(provider) => tracing::info!(provider, "rephrase provider ready"),
        None => tracing::warn!("no rephrase provider key configured"),
    }

    let engine = ConfusionEngine::new(open_store(config)?);
    let source = JsonlSource::open(&frames).await?;
    let session = CaptureSession::new(engine, source, dispatcher)
        .with_tick(config.tick_interval)
        .with_content(content);
    let (handle, mut events, mut task) = session.spawn();

    let initial = events.state.borrow().state;
    let mut last_shown = (initial.label(), initial.band());
    let engine = loop {
        tokio::select! {
            Some(suggestion) = events.suggestions.recv() => println!("{suggestion}"),
            Ok(()) = events.state.changed() => {
                let state = events.state.borrow_and_update().state;
                let shown = (state.label(), state.band());
                if shown != last_shown {
                    tracing::info!(meter = %meter_reading(&state), "confusion state changed");
                    last_shown = shown;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted, stopping capture");
                let _ = handle.stop().await;
            }
            joined = &mut task => break joined??,
        }
    };
    drop(handle);

    // In-flight dispatches still deliver after the session ends.
    while let Some(suggestion) = events.suggestions.recv().await {
        println!("{suggestion}");
    }
    tracing::info!(calibration = ?engine.calibration_phase(), "watch finished");
    Ok(())
}

/// Meter text: label, level as a percentage and colour band.
fn meter_reading(state: &ConfusionState) -> String {
    let band = match state.band() {
        ConfusionBand::Low => "low",
        ConfusionBand::Moderate => "moderate",
        ConfusionBand::High => "high",
    };
    format!("{} {:.0}% ({band})", state.label(), state.level * 100.0)
}

async fn calibrate(config: &Config, neutral: PathBuf, confused: PathBuf) -> Result<(), CliError> {
    let neutral_frames = read_frames(&neutral).await?;
    let confused_frames = read_frames(&confused).await?;

    let mut engine = ConfusionEngine::new(open_store(config)?);
    engine.begin_capture();
    engine.start_calibration()?;

    let mut now = 0;
    for (phase, frames) in [("neutral", &neutral_frames), ("confused", &confused_frames)] {
        for frame in frames {
            engine.tick(frame.as_ref(), now);
            now += RECORDED_FRAME_MS;
        }
        match engine.complete_calibration_step()? {
            StepOutcome::Insufficient { have, need } => {
                return Err(CliError::NotEnoughFrames { phase, have, need });
            }
            StepOutcome::NeutralRecorded { neutral } => println!("neutral: {neutral:.3}"),
            StepOutcome::Completed(baseline) => {
                println!("confused: {:.3}", baseline.confused);
                println!("calibration saved to {}", config.store_path.display());
            }
            StepOutcome::NotCollecting => {}
        }
    }
    engine.end_capture();
    Ok(())
}

fn calibration(config: &Config, action: CalibrationAction) -> Result<(), CliError> {
    let store = open_store(config)?;
    match action {
        CalibrationAction::Show => match load_baseline(store.as_ref()) {
            Some(baseline) => println!(
                "neutral: {:.3}\nconfused: {:.3}",
                baseline.neutral, baseline.confused
            ),
            None => println!("not calibrated"),
        },
        CalibrationAction::Reset => {
            ConfusionEngine::new(store).reset_calibration()?;
            println!("calibration cleared");
        }
    }
    Ok(())
}
