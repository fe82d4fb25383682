use crate::calibration::CalibrationBaseline;

/// Smallest neutral-to-confused span used for scaling.
pub const MIN_RANGE: f64 = 0.1;
/// Exponent below 1 expands sensitivity in the middle of the range.
pub const GAMMA: f64 = 0.8;

/// Maps a smoothed score to a confusion level.
///
/// Without a baseline the smoothed score is passed through unchanged. With
/// one, the score is scaled between `neutral` and `confused`, clamped to
/// [0, 1] and gamma corrected.
pub fn normalize(smoothed: f64, baseline: Option<&CalibrationBaseline>) -> f64 {
    let Some(baseline) = baseline else {
        return smoothed;
    };

    let range = (baseline.confused - baseline.neutral).max(MIN_RANGE);
    let scaled = (smoothed - baseline.neutral) / range;
    // Below neutral the same ratio is negative and clamps to zero.
    let level = if smoothed > baseline.neutral {
        scaled.min(1.0)
    } else {
        scaled.max(0.0)
    };

    level.powf(GAMMA)
}
