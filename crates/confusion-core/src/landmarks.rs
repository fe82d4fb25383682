use serde::{Deserialize, Serialize};

/// Number of points in the refined MediaPipe face mesh.
pub const FACE_MESH_POINTS: usize = 478;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: 0.0 }
    }
}

/// One frame of face-mesh keypoints in frame pixel space.
///
/// Points are addressed by their face-mesh index. Any index may be absent,
/// either as a `null` entry or because the detector returned fewer points.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Landmarks {
    points: Vec<Option<Point>>,
}

impl Landmarks {
    pub fn new(points: Vec<Option<Point>>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True when the detector found no face.
    pub fn is_empty(&self) -> bool {
        self.points.iter().all(Option::is_none)
    }

    pub fn get(&self, index: usize) -> Option<&Point> {
        self.points.get(index).and_then(Option::as_ref)
    }

    pub fn set(&mut self, index: usize, point: Point) {
        if index >= self.points.len() {
            self.points.resize(index + 1, None);
        }
        self.points[index] = Some(point);
    }

    /// x coordinate, or 0 when the point is absent or not a finite number.
    #[inline]
    pub fn x_or_zero(&self, index: usize) -> f64 {
        self.get(index).map_or(0.0, |p| finite_or_zero(p.x))
    }

    /// y coordinate, or 0 when the point is absent or not a finite number.
    #[inline]
    pub fn y_or_zero(&self, index: usize) -> f64 {
        self.get(index).map_or(0.0, |p| finite_or_zero(p.y))
    }

    pub fn mean_x(&self, indices: &[usize]) -> f64 {
        mean(indices.iter().map(|&i| self.x_or_zero(i)), indices.len())
    }

    pub fn mean_y(&self, indices: &[usize]) -> f64 {
        mean(indices.iter().map(|&i| self.y_or_zero(i)), indices.len())
    }
}

impl From<Vec<Point>> for Landmarks {
    fn from(points: Vec<Point>) -> Self {
        Self::new(points.into_iter().map(Some).collect())
    }
}

#[inline]
fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

#[inline]
fn mean(values: impl Iterator<Item = f64>, count: usize) -> f64 {
    if count == 0 {
        return 0.0;
    }
    values.sum::<f64>() / count as f64
}
