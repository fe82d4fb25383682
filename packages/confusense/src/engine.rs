use std::sync::Arc;

use confusion_core::{
    CalibrationBaseline, CalibrationPhase, ConfusionPipeline, ConfusionState, Landmarks, StepOutcome,
    TickOutcome,
};
use thiserror::Error;
use tracing::{debug, info};

use crate::store::{self, KeyValueStore, StoreError};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("calibration needs an active capture session")]
    NoActiveSession,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The confusion pipeline bound to calibration persistence.
pub struct ConfusionEngine {
    pipeline: ConfusionPipeline,
    store: Arc<dyn KeyValueStore>,
    capturing: bool,
}

impl ConfusionEngine {
    /// Restores a previously persisted baseline when one is stored.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        let pipeline = match store::load_baseline(store.as_ref()) {
            Some(baseline) => {
                info!(neutral = baseline.neutral, confused = baseline.confused, "calibration restored");
                ConfusionPipeline::with_baseline(baseline)
            }
            None => ConfusionPipeline::new(),
        };
        Self {
            pipeline,
            store,
            capturing: false,
        }
    }

    pub fn begin_capture(&mut self) {
        self.capturing = true;
    }

    /// Level drops to 0 and the state reads clear.
    pub fn end_capture(&mut self) {
        self.capturing = false;
        self.pipeline.suspend();
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing
    }

    pub fn tick(&mut self, frame: Option<&Landmarks>, now: u64) -> TickOutcome {
        self.pipeline.process(frame, now)
    }

    pub fn poll_trigger(&mut self, now: u64) -> bool {
        self.pipeline.poll_trigger(now)
    }

    pub fn pending_deadline(&self) -> Option<u64> {
        self.pipeline.pending_deadline()
    }

    pub fn state(&self) -> &ConfusionState {
        self.pipeline.state()
    }

    pub fn calibration_phase(&self) -> CalibrationPhase {
        self.pipeline.calibration_phase()
    }

    pub fn baseline(&self) -> Option<&CalibrationBaseline> {
        self.pipeline.baseline()
    }

    pub fn start_calibration(&mut self) -> Result<CalibrationPhase, EngineError> {
        if !self.capturing {
            return Err(EngineError::NoActiveSession);
        }
        Ok(self.pipeline.start_calibration())
    }

    /// Persists the baseline once both steps are recorded. When the save
    /// fails the run stays in its confused step so it can be retried.
    pub fn complete_calibration_step(&mut self) -> Result<StepOutcome, EngineError> {
        let before = self.pipeline.clone();
        let outcome = self.pipeline.complete_calibration_step();
        match &outcome {
            StepOutcome::Insufficient { have, need } => {
                debug!(have, need, "calibration step needs more samples");
            }
            StepOutcome::Completed(baseline) => {
                if let Err(err) = store::save_baseline(self.store.as_ref(), baseline) {
                    self.pipeline = before;
                    return Err(err.into());
                }
                info!("calibration persisted");
            }
            StepOutcome::NotCollecting | StepOutcome::NeutralRecorded { .. } => {}
        }
        Ok(outcome)
    }

    /// The stored baseline is removed first; a failed removal changes nothing.
    pub fn reset_calibration(&mut self) -> Result<(), EngineError> {
        store::clear_baseline(self.store.as_ref())?;
        self.pipeline.reset_calibration();
        info!("calibration reset");
        Ok(())
    }
}
