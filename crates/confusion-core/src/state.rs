use serde::Serialize;

/// Levels strictly above this count as confused.
pub const CONFUSED_THRESHOLD: f64 = 0.42;
/// Window samples required before a rising edge may arm the trigger.
pub const MIN_EVIDENCE_SAMPLES: usize = 6;
pub const DEBOUNCE_MS: u64 = 1_000;

const DISPLAY_CONFUSED: f64 = 0.45;
const BAND_MODERATE: f64 = 0.3;
const BAND_HIGH: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfusionBand {
    Low,
    Moderate,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ConfusionState {
    pub level: f64,
    pub confused: bool,
    pub last_trigger: Option<u64>,
}

impl ConfusionState {
    /// Meter colour band shown next to the level.
    pub fn band(&self) -> ConfusionBand {
        if self.level > BAND_HIGH {
            ConfusionBand::High
        } else if self.level > BAND_MODERATE {
            ConfusionBand::Moderate
        } else {
            ConfusionBand::Low
        }
    }

    /// Text label for the meter. Uses a slightly higher cut than the trigger.
    pub fn label(&self) -> &'static str {
        if self.level > DISPLAY_CONFUSED {
            "Confused"
        } else {
            "Clear"
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Unchanged,
    BecameClear,
    /// Rising edge without enough evidence to arm the trigger.
    BecameConfused,
    /// Rising edge that (re)armed the debounce deadline.
    Armed { deadline: u64 },
}

/// Confused/clear thresholding with a single cancellable debounce deadline.
#[derive(Debug, Clone, Default)]
pub struct ConfusionStateMachine {
    state: ConfusionState,
    pending: Option<u64>,
}

impl ConfusionStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ConfusionState {
        &self.state
    }

    pub fn pending_deadline(&self) -> Option<u64> {
        self.pending
    }

    pub fn observe(&mut self, level: f64, window_len: usize, now: u64) -> Transition {
        let was_confused = self.state.confused;
        let confused = level > CONFUSED_THRESHOLD;
        self.state.level = level;
        self.state.confused = confused;

        match (was_confused, confused) {
            (false, true) if window_len >= MIN_EVIDENCE_SAMPLES => {
                let deadline = now + DEBOUNCE_MS;
                self.pending = Some(deadline);
                Transition::Armed { deadline }
            }
            (false, true) => Transition::BecameConfused,
            (true, false) => Transition::BecameClear,
            _ => Transition::Unchanged,
        }
    }

    /// Frame without a detected face.
    pub fn observe_absent(&mut self) -> Transition {
        let was_confused = self.state.confused;
        self.state.level = 0.0;
        self.state.confused = false;
        if was_confused {
            Transition::BecameClear
        } else {
            Transition::Unchanged
        }
    }

    /// Consumes the pending deadline once it has passed. Returns true when
    /// the trigger fires, which requires the state to still be confused.
    pub fn poll(&mut self, now: u64) -> bool {
        match self.pending {
            Some(deadline) if now >= deadline => {
                self.pending = None;
                if self.state.confused {
                    self.state.last_trigger = Some(now);
                    true
                } else {
                    false
                }
            }
            _ => false,
        }
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }

    /// Capture stopped: level 0 and clear. A pending deadline is left alone
    /// and will not fire because the state is clear.
    pub fn reset_level(&mut self) {
        self.state.level = 0.0;
        self.state.confused = false;
    }
}
