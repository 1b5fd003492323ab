use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::board::LandmarkId;

/// Where a calibration position came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointSource {
    Detected,
    UserOverride,
}

/// One landmark slot. `position` is in crop space; `None` means the landmark
/// is not available this frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPoint {
    pub landmark: LandmarkId,
    pub position: Option<Point2<f64>>,
    pub source: PointSource,
}

impl CalibrationPoint {
    pub fn absent(landmark: LandmarkId) -> Self {
        Self {
            landmark,
            position: None,
            source: PointSource::Detected,
        }
    }
}

/// Exactly six calibration points, indexed by [`LandmarkId::index`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSet {
    points: [CalibrationPoint; LandmarkId::COUNT],
}

impl Default for CalibrationSet {
    fn default() -> Self {
        Self {
            points: LandmarkId::ALL.map(CalibrationPoint::absent),
        }
    }
}

impl CalibrationSet {
    /// Build a set from per-landmark positions; every point is tagged
    /// [`PointSource::Detected`].
    pub fn from_detected(positions: [Option<Point2<f64>>; LandmarkId::COUNT]) -> Self {
        let mut set = Self::default();
        for (slot, position) in set.points.iter_mut().zip(positions) {
            slot.position = position;
        }
        set
    }

    #[inline]
    pub fn get(&self, landmark: LandmarkId) -> &CalibrationPoint {
        &self.points[landmark.index()]
    }

    pub fn set(&mut self, landmark: LandmarkId, position: Option<Point2<f64>>, source: PointSource) {
        self.points[landmark.index()] = CalibrationPoint {
            landmark,
            position,
            source,
        };
    }

    pub fn points(&self) -> &[CalibrationPoint; LandmarkId::COUNT] {
        &self.points
    }

    /// Present landmarks with their crop-space positions, in canonical order.
    pub fn present(&self) -> impl Iterator<Item = (LandmarkId, Point2<f64>)> + '_ {
        self.points
            .iter()
            .filter_map(|p| p.position.map(|pos| (p.landmark, pos)))
    }

    pub fn present_count(&self) -> usize {
        self.points.iter().filter(|p| p.position.is_some()).count()
    }

    /// True when at least `min_landmarks` positions are available.
    #[inline]
    pub fn is_usable(&self, min_landmarks: usize) -> bool {
        self.present_count() >= min_landmarks
    }
}
