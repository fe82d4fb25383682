use serde::Serialize;
use thiserror::Error;

use crate::landmarks::Landmarks;

// MediaPipe Face Mesh indices
const BROW_INNER_LEFT: [usize; 3] = [70, 63, 105];
const BROW_OUTER_LEFT: [usize; 3] = [66, 107, 55];
const BROW_INNER_RIGHT: [usize; 3] = [296, 334, 293];
const BROW_OUTER_RIGHT: [usize; 3] = [300, 276, 285];

const EYE_INNER_LEFT: [usize; 3] = [33, 7, 163];
const EYE_OUTER_LEFT: [usize; 3] = [144, 145, 153];
const EYE_UPPER_LEFT: [usize; 4] = [159, 158, 157, 173];
const EYE_LOWER_LEFT: [usize; 4] = [145, 153, 154, 155];

const EYE_INNER_RIGHT: [usize; 3] = [362, 382, 381];
const EYE_OUTER_RIGHT: [usize; 3] = [380, 374, 373];
const EYE_UPPER_RIGHT: [usize; 4] = [386, 385, 384, 398];
const EYE_LOWER_RIGHT: [usize; 4] = [374, 373, 390, 249];

// 18 appears twice in the upper lip set; the duplicate is part of the tuned average.
const UPPER_LIP: [usize; 6] = [13, 82, 18, 17, 18, 200];
const LOWER_LIP: [usize; 6] = [14, 87, 178, 88, 95, 179];
const MOUTH_LEFT: usize = 61;
const MOUTH_RIGHT: usize = 291;

const NOSE_TIP: usize = 1;
const NOSE_BRIDGE: usize = 168;
const LEFT_CHEEK: usize = 234;
const RIGHT_CHEEK: usize = 454;
const CHIN: usize = 18;

const FOREHEAD: [usize; 5] = [10, 151, 9, 10, 151];
const JAWLINE: [usize; 5] = [172, 136, 150, 149, 176];

/// Face height assumed when the chin landmark is missing.
const DEFAULT_FACE_HEIGHT: f64 = 100.0;

const FACE_LENGTH_MIN: f64 = 120.0;
const FACE_LENGTH_MAX: f64 = 200.0;
const FACE_LENGTH_DISCOUNT: f64 = 0.8;

/// A single geometric observation that adds to the raw confusion score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Cue {
    BrowsLowered,
    BrowAsymmetry,
    BrowSlant,
    NarrowedEyes,
    WideEyes,
    EyeAsymmetry,
    EyeWidthImbalance,
    LipsParted,
    MouthOffset,
    MouthTilt,
    NarrowMouth,
    HeadRoll,
    HeadTurn,
    FaceAspect,
}

impl Cue {
    pub fn weight(self) -> f64 {
        match self {
            Cue::BrowsLowered => 0.4,
            Cue::BrowAsymmetry => 0.3,
            Cue::BrowSlant => 0.25,
            Cue::NarrowedEyes => 0.35,
            Cue::WideEyes => 0.3,
            Cue::EyeAsymmetry => 0.2,
            Cue::EyeWidthImbalance => 0.25,
            Cue::LipsParted => 0.3,
            Cue::MouthOffset => 0.25,
            Cue::MouthTilt => 0.2,
            Cue::NarrowMouth => 0.15,
            Cue::HeadRoll => 0.25,
            Cue::HeadTurn => 0.2,
            Cue::FaceAspect => 0.15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeatureError {
    #[error("{group} features need landmark {index}")]
    MissingLandmark { group: &'static str, index: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BrowFeatures {
    /// Signed vertical distance from the inner brow to the inner eye corner.
    pub left_distance: f64,
    pub right_distance: f64,
    pub average_distance: f64,
    pub asymmetry: f64,
    pub left_angle: f64,
    pub right_angle: f64,
}

impl BrowFeatures {
    pub fn measure(landmarks: &Landmarks) -> Self {
        let left_inner = landmarks.mean_y(&BROW_INNER_LEFT);
        let left_outer = landmarks.mean_y(&BROW_OUTER_LEFT);
        let right_inner = landmarks.mean_y(&BROW_INNER_RIGHT);
        let right_outer = landmarks.mean_y(&BROW_OUTER_RIGHT);

        let left_distance = left_inner - landmarks.mean_y(&EYE_INNER_LEFT);
        let right_distance = right_inner - landmarks.mean_y(&EYE_INNER_RIGHT);

        Self {
            left_distance,
            right_distance,
            average_distance: (left_distance + right_distance) / 2.0,
            asymmetry: (left_distance - right_distance).abs(),
            left_angle: (left_inner - left_outer).abs(),
            right_angle: (right_inner - right_outer).abs(),
        }
    }

    fn cues(&self, out: &mut Vec<Cue>) {
        if self.average_distance < 20.0 {
            out.push(Cue::BrowsLowered);
        }
        if self.asymmetry > 6.0 {
            out.push(Cue::BrowAsymmetry);
        }
        if self.left_angle > 8.0 || self.right_angle > 8.0 {
            out.push(Cue::BrowSlant);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EyeFeatures {
    pub left_aperture: f64,
    pub right_aperture: f64,
    pub average_aperture: f64,
    pub aperture_asymmetry: f64,
    pub left_width: f64,
    pub right_width: f64,
    /// Left over right eye width. Infinite or NaN when the right width is zero.
    pub width_ratio: f64,
}

impl EyeFeatures {
    pub fn measure(landmarks: &Landmarks) -> Self {
        let left_aperture =
            (landmarks.mean_y(&EYE_UPPER_LEFT) - landmarks.mean_y(&EYE_LOWER_LEFT)).abs();
        let right_aperture =
            (landmarks.mean_y(&EYE_UPPER_RIGHT) - landmarks.mean_y(&EYE_LOWER_RIGHT)).abs();

        let left_width =
            (landmarks.mean_x(&EYE_OUTER_LEFT) - landmarks.mean_x(&EYE_INNER_LEFT)).abs();
        let right_width =
            (landmarks.mean_x(&EYE_OUTER_RIGHT) - landmarks.mean_x(&EYE_INNER_RIGHT)).abs();

        Self {
            left_aperture,
            right_aperture,
            average_aperture: (left_aperture + right_aperture) / 2.0,
            aperture_asymmetry: (left_aperture - right_aperture).abs(),
            left_width,
            right_width,
            width_ratio: left_width / right_width,
        }
    }

    fn cues(&self, out: &mut Vec<Cue>) {
        if self.average_aperture < 4.0 {
            out.push(Cue::NarrowedEyes);
        }
        if self.average_aperture > 20.0 {
            out.push(Cue::WideEyes);
        }
        if self.aperture_asymmetry > 4.0 {
            out.push(Cue::EyeAsymmetry);
        }
        // NaN compares false on both sides and adds nothing.
        if self.width_ratio < 0.85 || self.width_ratio > 1.15 {
            out.push(Cue::EyeWidthImbalance);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MouthFeatures {
    pub aperture: f64,
    pub center_offset: f64,
    pub tilt: f64,
    pub width: f64,
}

impl MouthFeatures {
    pub fn measure(landmarks: &Landmarks) -> Self {
        let aperture = (landmarks.mean_y(&UPPER_LIP) - landmarks.mean_y(&LOWER_LIP)).abs();

        let left_x = landmarks.x_or_zero(MOUTH_LEFT);
        let right_x = landmarks.x_or_zero(MOUTH_RIGHT);
        let center = (left_x + right_x) / 2.0;
        let nose_x = match landmarks.x_or_zero(NOSE_TIP) {
            x if x == 0.0 => center,
            x => x,
        };

        Self {
            aperture,
            center_offset: (center - nose_x).abs(),
            tilt: (landmarks.y_or_zero(MOUTH_LEFT) - landmarks.y_or_zero(MOUTH_RIGHT)).abs(),
            width: (left_x - right_x).abs(),
        }
    }

    fn cues(&self, out: &mut Vec<Cue>) {
        if self.aperture > 8.0 && self.aperture < 20.0 {
            out.push(Cue::LipsParted);
        }
        if self.center_offset > 5.0 {
            out.push(Cue::MouthOffset);
        }
        if self.tilt > 3.0 {
            out.push(Cue::MouthTilt);
        }
        if self.width < 25.0 {
            out.push(Cue::NarrowMouth);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HeadPoseFeatures {
    /// Vertical offset between the cheeks.
    pub roll_tilt: f64,
    /// Horizontal offset between nose tip and bridge.
    pub nose_offset: f64,
    pub face_width: f64,
    pub face_height: f64,
    pub aspect_ratio: f64,
}

impl HeadPoseFeatures {
    pub fn measure(landmarks: &Landmarks) -> Result<Self, FeatureError> {
        let require = |index| {
            landmarks
                .get(index)
                .ok_or(FeatureError::MissingLandmark { group: "head pose", index })
        };
        let nose_tip = require(NOSE_TIP)?;
        let nose_bridge = require(NOSE_BRIDGE)?;
        let left_cheek = require(LEFT_CHEEK)?;
        let right_cheek = require(RIGHT_CHEEK)?;

        let face_width = (left_cheek.x - right_cheek.x).abs();
        let face_height = landmarks
            .get(CHIN)
            .map_or(DEFAULT_FACE_HEIGHT, |chin| (nose_bridge.y - chin.y).abs());

        Ok(Self {
            roll_tilt: (left_cheek.y - right_cheek.y).abs(),
            nose_offset: (nose_tip.x - nose_bridge.x).abs(),
            face_width,
            face_height,
            aspect_ratio: face_width / face_height,
        })
    }

    fn cues(&self, out: &mut Vec<Cue>) {
        if self.roll_tilt > 12.0 {
            out.push(Cue::HeadRoll);
        }
        if self.nose_offset > 8.0 {
            out.push(Cue::HeadTurn);
        }
        if self.aspect_ratio < 0.6 || self.aspect_ratio > 1.1 {
            out.push(Cue::FaceAspect);
        }
    }
}

/// Geometric measurements of one frame and the cues they triggered.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureReport {
    pub brow: BrowFeatures,
    pub eye: EyeFeatures,
    pub mouth: MouthFeatures,
    pub head: Option<HeadPoseFeatures>,
    /// Forehead-to-jaw distance.
    pub face_length: f64,
    pub confidence: f64,
    pub cues: Vec<Cue>,
}

impl FeatureReport {
    /// Unbounded additive score; several cues can fire in the same frame.
    pub fn raw_score(&self) -> f64 {
        self.cues.iter().map(|cue| cue.weight()).sum()
    }

    pub fn has_cue(&self, cue: Cue) -> bool {
        self.cues.contains(&cue)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Measures every feature group independently. A group that cannot be
    /// measured contributes nothing; the others still count.
    pub fn extract(&self, landmarks: &Landmarks) -> FeatureReport {
        let brow = BrowFeatures::measure(landmarks);
        let eye = EyeFeatures::measure(landmarks);
        let mouth = MouthFeatures::measure(landmarks);
        let head = match HeadPoseFeatures::measure(landmarks) {
            Ok(head) => Some(head),
            Err(err) => {
                tracing::trace!(error = %err, "skipping feature group");
                None
            }
        };

        let mut cues = Vec::new();
        brow.cues(&mut cues);
        eye.cues(&mut cues);
        mouth.cues(&mut cues);
        if let Some(head) = &head {
            head.cues(&mut cues);
        }

        let face_length = (landmarks.mean_y(&FOREHEAD) - landmarks.mean_y(&JAWLINE)).abs();
        let confidence = if !(FACE_LENGTH_MIN..=FACE_LENGTH_MAX).contains(&face_length) {
            FACE_LENGTH_DISCOUNT
        } else {
            1.0
        };

        FeatureReport {
            brow,
            eye,
            mouth,
            head,
            face_length,
            confidence,
            cues,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::{furrowed_face, neutral_face};
    use super::*;
    use crate::landmarks::Point;

    #[test]
    fn neutral_face_triggers_nothing() {
        let report = FeatureExtractor::new().extract(&neutral_face());
        assert!(report.cues.is_empty(), "unexpected cues: {:?}", report.cues);
        assert_eq!(report.raw_score(), 0.0);
        assert_eq!(report.confidence, 1.0);
        assert!(report.head.is_some());
    }

    #[test]
    fn furrowed_brows_add_lowered_and_slant() {
        let report = FeatureExtractor::new().extract(&furrowed_face());
        assert_eq!(report.cues, vec![Cue::BrowsLowered, Cue::BrowSlant]);
        assert!((report.raw_score() - 0.65).abs() < 1e-12);
    }

    #[test]
    fn brow_asymmetry_threshold() {
        let mut lm = neutral_face();
        for i in [70, 63, 105] {
            lm.set(i, Point::new(0.0, 107.0));
        }
        let report = FeatureExtractor::new().extract(&lm);
        assert!(report.has_cue(Cue::BrowAsymmetry));
        assert!((report.brow.asymmetry - 7.0).abs() < 1e-12);
    }

    #[test]
    fn eye_thresholds() {
        let mut lm = neutral_face();
        for i in [159, 158, 157, 173, 386, 385, 384, 398] {
            let x = lm.get(i).unwrap().x;
            lm.set(i, Point::new(x, 68.0));
        }
        let report = FeatureExtractor::new().extract(&lm);
        assert!(report.has_cue(Cue::NarrowedEyes));
        assert!(!report.has_cue(Cue::WideEyes));

        let mut lm = neutral_face();
        for i in [159, 158, 157, 173, 386, 385, 384, 398] {
            let x = lm.get(i).unwrap().x;
            lm.set(i, Point::new(x, 40.0));
        }
        let report = FeatureExtractor::new().extract(&lm);
        assert!(report.has_cue(Cue::WideEyes));
    }

    #[test]
    fn zero_right_eye_width_counts_as_imbalance() {
        let mut lm = neutral_face();
        for i in [380, 374, 373] {
            let y = lm.get(i).unwrap().y;
            lm.set(i, Point::new(200.0, y));
        }
        let report = FeatureExtractor::new().extract(&lm);
        assert!(report.eye.width_ratio.is_infinite());
        assert!(report.has_cue(Cue::EyeWidthImbalance));
    }

    #[test]
    fn zero_eye_widths_add_nothing_for_ratio() {
        let mut lm = neutral_face();
        for i in [33, 7, 163, 144, 145, 153, 362, 382, 381, 380, 374, 373] {
            let y = lm.get(i).unwrap().y;
            lm.set(i, Point::new(0.0, y));
        }
        let report = FeatureExtractor::new().extract(&lm);
        assert!(report.eye.width_ratio.is_nan());
        assert!(!report.has_cue(Cue::EyeWidthImbalance));
    }

    #[test]
    fn mouth_cues() {
        let mut lm = neutral_face();
        for i in [14, 87, 178, 88, 95, 179] {
            lm.set(i, Point::new(0.0, 210.0));
        }
        lm.set(61, Point::new(150.0, 214.0));
        lm.set(291, Point::new(170.0, 210.0));
        lm.set(1, Point::new(172.0, 150.0));
        let report = FeatureExtractor::new().extract(&lm);
        assert!(report.has_cue(Cue::LipsParted));
        assert!(report.has_cue(Cue::MouthOffset));
        assert!(report.has_cue(Cue::MouthTilt));
        assert!(report.has_cue(Cue::NarrowMouth));
    }

    #[test]
    fn missing_nose_tip_falls_back_to_mouth_center() {
        let mut lm = neutral_face();
        lm.set(61, Point::new(100.0, 210.0));
        lm.set(291, Point::new(160.0, 210.0));
        lm.set(1, Point::new(0.0, 150.0));
        let report = FeatureExtractor::new().extract(&lm);
        assert_eq!(report.mouth.center_offset, 0.0);
    }

    #[test]
    fn head_pose_failure_is_isolated() {
        let face = furrowed_face();
        let mut points: Vec<Option<Point>> = (0..face.len()).map(|i| face.get(i).copied()).collect();
        points[LEFT_CHEEK] = None;
        let lm = Landmarks::new(points);

        let report = FeatureExtractor::new().extract(&lm);
        assert!(report.head.is_none());
        assert!(report.has_cue(Cue::BrowsLowered));
        assert!(report.has_cue(Cue::BrowSlant));
    }

    #[test]
    fn head_pose_cues() {
        let mut lm = neutral_face();
        lm.set(234, Point::new(90.0, 100.0));
        lm.set(1, Point::new(175.0, 150.0));
        let report = FeatureExtractor::new().extract(&lm);
        assert!(report.has_cue(Cue::HeadRoll));
        assert!(report.has_cue(Cue::HeadTurn));
    }

    #[test]
    fn missing_chin_uses_default_height() {
        let face = neutral_face();
        let mut points: Vec<Option<Point>> = (0..face.len()).map(|i| face.get(i).copied()).collect();
        points[CHIN] = None;
        let report = FeatureExtractor::new().extract(&Landmarks::new(points));
        let head = report.head.unwrap();
        assert_eq!(head.face_height, DEFAULT_FACE_HEIGHT);
        assert!(report.has_cue(Cue::FaceAspect));
    }

    #[test]
    fn face_length_outside_range_discounts_confidence() {
        let mut lm = neutral_face();
        for i in [172, 136, 150, 149, 176] {
            lm.set(i, Point::new(0.0, 300.0));
        }
        let report = FeatureExtractor::new().extract(&lm);
        assert_eq!(report.confidence, 0.8);

        let mut lm = neutral_face();
        for i in [172, 136, 150, 149, 176] {
            lm.set(i, Point::new(0.0, 140.0));
        }
        let report = FeatureExtractor::new().extract(&lm);
        assert_eq!(report.face_length, 120.0);
        assert_eq!(report.confidence, 1.0);
    }

    #[test]
    fn sparse_frame_is_scored_without_panicking() {
        let mut lm = Landmarks::default();
        lm.set(61, Point::new(10.0, 10.0));
        let report = FeatureExtractor::new().extract(&lm);
        assert!(report.head.is_none());
        // All-zero brows and eyes: lowered brows and narrowed eyes fire.
        assert!(report.has_cue(Cue::BrowsLowered));
        assert!(report.has_cue(Cue::NarrowedEyes));
        assert_eq!(report.confidence, 0.8);
    }
}
