use serde::{Deserialize, Serialize};

use crate::window::ScoreWindow;

/// Samples required before a calibration step can be completed.
pub const CALIBRATION_SAMPLES: usize = 12;
const IQR_FENCE: f64 = 1.5;

/// Per-user reference scores for a neutral and a confused expression.
///
/// `confused` is expected to exceed `neutral` but this is not enforced; the
/// normalizer guards against a collapsed range instead.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationBaseline {
    pub neutral: f64,
    pub confused: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationPhase {
    #[default]
    Idle,
    CollectingNeutral,
    CollectingConfused,
    Complete,
}

impl CalibrationPhase {
    pub fn step(self) -> u8 {
        match self {
            CalibrationPhase::Idle => 0,
            CalibrationPhase::CollectingNeutral => 1,
            CalibrationPhase::CollectingConfused => 2,
            CalibrationPhase::Complete => 3,
        }
    }

    pub fn is_collecting(self) -> bool {
        matches!(
            self,
            CalibrationPhase::CollectingNeutral | CalibrationPhase::CollectingConfused
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepOutcome {
    /// Not enough samples yet; nothing changed.
    Insufficient { have: usize, need: usize },
    /// No calibration run is in progress; nothing changed.
    NotCollecting,
    NeutralRecorded { neutral: f64 },
    Completed(CalibrationBaseline),
}

/// Two-phase calibration state machine.
#[derive(Debug, Clone, Default)]
pub struct Calibrator {
    phase: CalibrationPhase,
    baseline: Option<CalibrationBaseline>,
}

impl Calibrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a previously persisted baseline.
    pub fn restore(baseline: CalibrationBaseline) -> Self {
        Self {
            phase: CalibrationPhase::Complete,
            baseline: Some(baseline),
        }
    }

    pub fn phase(&self) -> CalibrationPhase {
        self.phase
    }

    /// Baseline used for normalization. While a run is in progress this is
    /// the partially filled baseline, starting from `{0, 0}`.
    pub fn baseline(&self) -> Option<&CalibrationBaseline> {
        self.baseline.as_ref()
    }

    pub fn start(&mut self, window: &mut ScoreWindow) {
        self.phase = CalibrationPhase::CollectingNeutral;
        self.baseline = Some(CalibrationBaseline { neutral: 0.0, confused: 0.0 });
        window.clear();
        tracing::info!("calibration started: collecting neutral expression");
    }

    pub fn complete_step(&mut self, window: &mut ScoreWindow) -> StepOutcome {
        if !self.phase.is_collecting() {
            return StepOutcome::NotCollecting;
        }
        if window.len() < CALIBRATION_SAMPLES {
            return StepOutcome::Insufficient {
                have: window.len(),
                need: CALIBRATION_SAMPLES,
            };
        }
        let Some(average) = robust_average(&window.recent_scores(CALIBRATION_SAMPLES)) else {
            return StepOutcome::Insufficient {
                have: 0,
                need: CALIBRATION_SAMPLES,
            };
        };
        let current = self
            .baseline
            .unwrap_or(CalibrationBaseline { neutral: 0.0, confused: 0.0 });

        match self.phase {
            CalibrationPhase::CollectingNeutral => {
                self.baseline = Some(CalibrationBaseline { neutral: average, ..current });
                self.phase = CalibrationPhase::CollectingConfused;
                window.clear();
                tracing::info!(neutral = average, "calibration: neutral recorded");
                StepOutcome::NeutralRecorded { neutral: average }
            }
            _ => {
                let baseline = CalibrationBaseline { confused: average, ..current };
                self.baseline = Some(baseline);
                self.phase = CalibrationPhase::Complete;
                if baseline.confused <= baseline.neutral {
                    tracing::warn!(
                        neutral = baseline.neutral,
                        confused = baseline.confused,
                        "calibration finished with confused score not above neutral"
                    );
                }
                tracing::info!(neutral = baseline.neutral, confused = baseline.confused, "calibration complete");
                StepOutcome::Completed(baseline)
            }
        }
    }

    pub fn reset(&mut self) {
        self.phase = CalibrationPhase::Idle;
        self.baseline = None;
    }
}

/// Mean of `scores` after discarding values outside the 1.5 IQR fences.
///
/// Quartiles are taken by index on the sorted scores: `floor(n * 0.25)` and
/// `floor(n * 0.75)`. Returns `None` for an empty slice.
pub fn robust_average(scores: &[f64]) -> Option<f64> {
    if scores.is_empty() {
        return None;
    }

    let mut sorted = scores.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let n = sorted.len();
    let q1 = sorted[n / 4];
    let q3 = sorted[(n * 3) / 4];
    let iqr = q3 - q1;
    let lower = q1 - IQR_FENCE * iqr;
    let upper = q3 + IQR_FENCE * iqr;

    let kept: Vec<f64> = scores
        .iter()
        .copied()
        .filter(|&s| s >= lower && s <= upper)
        .collect();
    if kept.is_empty() {
        return None;
    }
    Some(kept.iter().sum::<f64>() / kept.len() as f64)
}
