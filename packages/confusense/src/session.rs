//! The capture loop: one tick per interval, a single debounce deadline, and
//! a spawned dispatch for every firing.

use std::fmt;
use std::future::pending;
use std::time::Duration;

use chrono::{DateTime, Local};
use confusion_core::{CalibrationPhase, ConfusionState, StepOutcome};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::engine::{ConfusionEngine, EngineError};
use crate::rephrase::{RephraseDispatcher, RephraseRequest};
use crate::source::{LandmarkSource, SourceError};

pub const DEFAULT_TICK: Duration = Duration::from_millis(200);
const MIN_TICK: Duration = Duration::from_millis(1);

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("capture session is no longer running")]
    Closed,
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Source(#[from] SourceError),
}

/// A rephrase result ready for display.
#[derive(Debug, Clone)]
pub struct Suggestion {
    pub text: String,
    pub request: RephraseRequest,
    pub received_at: DateTime<Local>,
}

impl fmt::Display for Suggestion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AI ({}): {}", self.received_at.format("%H:%M:%S"), self.text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SessionSnapshot {
    pub state: ConfusionState,
    pub calibration: CalibrationPhase,
}

enum Command {
    StartCalibration(oneshot::Sender<Result<CalibrationPhase, EngineError>>),
    CompleteStep(oneshot::Sender<Result<StepOutcome, EngineError>>),
    ResetCalibration(oneshot::Sender<Result<(), EngineError>>),
    SetContent(String),
    RephraseSelection(String),
    Stop,
}

/// Control side of a running [`CaptureSession`].
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
}

impl SessionHandle {
    pub async fn start_calibration(&self) -> Result<CalibrationPhase, SessionError> {
        self.request(Command::StartCalibration).await
    }

    pub async fn complete_calibration_step(&self) -> Result<StepOutcome, SessionError> {
        self.request(Command::CompleteStep).await
    }

    pub async fn reset_calibration(&self) -> Result<(), SessionError> {
        self.request(Command::ResetCalibration).await
    }

    /// Replaces the text sent along with facial-confusion dispatches.
    pub async fn set_content(&self, content: impl Into<String>) -> Result<(), SessionError> {
        self.send(Command::SetContent(content.into())).await
    }

    /// Asks for an explanation of a selected passage. Blank selections are ignored.
    pub async fn rephrase_selection(&self, text: impl Into<String>) -> Result<(), SessionError> {
        self.send(Command::RephraseSelection(text.into())).await
    }

    /// Dispatches already in flight still deliver their suggestions.
    pub async fn stop(&self) -> Result<(), SessionError> {
        self.send(Command::Stop).await
    }

    async fn send(&self, command: Command) -> Result<(), SessionError> {
        self.commands.send(command).await.map_err(|_| SessionError::Closed)
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<Result<T, EngineError>>) -> Command,
    ) -> Result<T, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.send(command(tx)).await?;
        rx.await.map_err(|_| SessionError::Closed)?.map_err(SessionError::from)
    }
}

/// Observation side of a running [`CaptureSession`].
pub struct SessionEvents {
    pub state: watch::Receiver<SessionSnapshot>,
    pub suggestions: mpsc::UnboundedReceiver<Suggestion>,
}

pub struct CaptureSession<S> {
    engine: ConfusionEngine,
    source: S,
    dispatcher: RephraseDispatcher,
    tick: Duration,
    content: String,
}

struct Outputs {
    state: watch::Sender<SessionSnapshot>,
    suggestions: mpsc::UnboundedSender<Suggestion>,
}

impl<S: LandmarkSource + 'static> CaptureSession<S> {
    pub fn new(engine: ConfusionEngine, source: S, dispatcher: RephraseDispatcher) -> Self {
        Self {
            engine,
            source,
            dispatcher,
            tick: DEFAULT_TICK,
            content: String::new(),
        }
    }

    /// Periods under 1 ms are raised to 1 ms.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick.max(MIN_TICK);
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    /// Starts the loop on the current runtime. The task ends on `stop`, when
    /// every handle is dropped, or when the source is exhausted, and yields
    /// the engine back.
    pub fn spawn(
        self,
    ) -> (
        SessionHandle,
        SessionEvents,
        JoinHandle<Result<ConfusionEngine, SessionError>>,
    ) {
        let (command_tx, command_rx) = mpsc::channel(16);
        let (state_tx, state_rx) = watch::channel(SessionSnapshot {
            state: *self.engine.state(),
            calibration: self.engine.calibration_phase(),
        });
        let (suggestion_tx, suggestion_rx) = mpsc::unbounded_channel();
        let outputs = Outputs {
            state: state_tx,
            suggestions: suggestion_tx,
        };

        let task = tokio::spawn(self.run(command_rx, outputs));
        let handle = SessionHandle { commands: command_tx };
        let events = SessionEvents {
            state: state_rx,
            suggestions: suggestion_rx,
        };
        (handle, events, task)
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        outputs: Outputs,
    ) -> Result<ConfusionEngine, SessionError> {
        let started = Instant::now();
        let mut ticker = interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.engine.begin_capture();
        info!(tick_ms = self.tick.as_millis() as u64, "capture session started");

        let result = loop {
            let deadline = self
                .engine
                .pending_deadline()
                .map(|ms| started + Duration::from_millis(ms));

            tokio::select! {
                command = commands.recv() => match command {
                    None | Some(Command::Stop) => break Ok(()),
                    Some(command) => self.handle(command, &outputs),
                },
                _ = ticker.tick() => {
                    let frame = match self.source.detect().await {
                        Ok(frame) => frame,
                        Err(SourceError::Exhausted) => {
                            info!("landmark source exhausted");
                            break Ok(());
                        }
                        Err(err) => break Err(SessionError::from(err)),
                    };
                    let outcome = self.engine.tick(frame.as_ref(), elapsed_ms(started));
                    if outcome.report.is_none() {
                        debug!("no face detected");
                    }
                }
                _ = wait_for(deadline) => {
                    let now = elapsed_ms(started);
                    if self.engine.poll_trigger(now) {
                        let level = self.engine.state().level;
                        info!(level, "sustained confusion, requesting rephrase");
                        self.dispatch(RephraseRequest::facial_confusion(self.content.clone(), level), &outputs);
                    }
                }
            }
            publish(&self.engine, &outputs);
        };

        self.engine.end_capture();
        publish(&self.engine, &outputs);
        info!("capture session stopped");
        result.map(|()| self.engine)
    }

    fn handle(&mut self, command: Command, outputs: &Outputs) {
        match command {
            Command::StartCalibration(reply) => {
                let _ = reply.send(self.engine.start_calibration());
            }
            Command::CompleteStep(reply) => {
                let _ = reply.send(self.engine.complete_calibration_step());
            }
            Command::ResetCalibration(reply) => {
                let _ = reply.send(self.engine.reset_calibration());
            }
            Command::SetContent(content) => self.content = content,
            Command::RephraseSelection(text) => {
                let text = text.trim();
                if !text.is_empty() {
                    self.dispatch(RephraseRequest::text_selection(text), outputs);
                }
            }
            Command::Stop => {}
        }
    }

    fn dispatch(&self, request: RephraseRequest, outputs: &Outputs) {
        let dispatcher = self.dispatcher.clone();
        let suggestions = outputs.suggestions.clone();
        tokio::spawn(async move {
            let text = dispatcher.dispatch(&request).await;
            let suggestion = Suggestion {
                text,
                request,
                received_at: Local::now(),
            };
            if suggestions.send(suggestion).is_err() {
                warn!("suggestion dropped, no listener");
            }
        });
    }
}

fn publish(engine: &ConfusionEngine, outputs: &Outputs) {
    outputs.state.send_replace(SessionSnapshot {
        state: *engine.state(),
        calibration: engine.calibration_phase(),
    });
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}
