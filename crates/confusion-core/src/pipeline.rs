use crate::calibration::{CalibrationBaseline, CalibrationPhase, Calibrator, StepOutcome};
use crate::features::{FeatureExtractor, FeatureReport};
use crate::landmarks::Landmarks;
use crate::normalize::normalize;
use crate::state::{ConfusionState, ConfusionStateMachine, Transition};
use crate::window::ScoreWindow;

/// Result of one analysis tick.
#[derive(Debug, Clone)]
pub struct TickOutcome {
    pub state: ConfusionState,
    pub transition: Transition,
    /// `None` when no face was detected.
    pub report: Option<FeatureReport>,
    pub smoothed: f64,
    pub window_len: usize,
}

/// Landmark frame to confusion level, one tick at a time.
#[derive(Debug, Clone, Default)]
pub struct ConfusionPipeline {
    extractor: FeatureExtractor,
    window: ScoreWindow,
    calibrator: Calibrator,
    machine: ConfusionStateMachine,
}

impl ConfusionPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_baseline(baseline: CalibrationBaseline) -> Self {
        Self {
            calibrator: Calibrator::restore(baseline),
            ..Self::default()
        }
    }

    /// Scores one frame observed at `now` (milliseconds).
    pub fn process(&mut self, frame: Option<&Landmarks>, now: u64) -> TickOutcome {
        let Some(landmarks) = frame.filter(|lm| !lm.is_empty()) else {
            let transition = self.machine.observe_absent();
            return TickOutcome {
                state: *self.machine.state(),
                transition,
                report: None,
                smoothed: 0.0,
                window_len: self.window.len(),
            };
        };

        let report = self.extractor.extract(landmarks);
        let smoothed = self.window.update(report.raw_score(), report.confidence, now);
        let level = normalize(smoothed, self.calibrator.baseline());
        let transition = self.machine.observe(level, self.window.len(), now);

        tracing::debug!(
            raw = report.raw_score(),
            confidence = report.confidence,
            smoothed,
            level,
            samples = self.window.len(),
            "confusion tick"
        );

        TickOutcome {
            state: *self.machine.state(),
            transition,
            report: Some(report),
            smoothed,
            window_len: self.window.len(),
        }
    }

    /// True exactly once when an armed debounce deadline passes while confused.
    pub fn poll_trigger(&mut self, now: u64) -> bool {
        self.machine.poll(now)
    }

    pub fn pending_deadline(&self) -> Option<u64> {
        self.machine.pending_deadline()
    }

    pub fn state(&self) -> &ConfusionState {
        self.machine.state()
    }

    /// Capture stopped.
    pub fn suspend(&mut self) {
        self.machine.reset_level();
    }

    pub fn start_calibration(&mut self) -> CalibrationPhase {
        self.calibrator.start(&mut self.window);
        self.calibrator.phase()
    }

    pub fn complete_calibration_step(&mut self) -> StepOutcome {
        self.calibrator.complete_step(&mut self.window)
    }

    pub fn reset_calibration(&mut self) {
        self.calibrator.reset();
    }

    pub fn calibration_phase(&self) -> CalibrationPhase {
        self.calibrator.phase()
    }

    pub fn baseline(&self) -> Option<&CalibrationBaseline> {
        self.calibrator.baseline()
    }

    pub fn window(&self) -> &ScoreWindow {
        &self.window
    }
}
