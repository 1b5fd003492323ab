use std::fmt;
use std::str::FromStr;

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::board::{LandmarkId, ParseLandmarkError};

/// Class of a detected item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DetectionLabel {
    Landmark(LandmarkId),
    Dart,
}

impl fmt::Display for DetectionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectionLabel::Landmark(l) => write!(f, "{l}"),
            DetectionLabel::Dart => f.write_str("dart"),
        }
    }
}

impl FromStr for DetectionLabel {
    type Err = ParseLandmarkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("dart") {
            return Ok(DetectionLabel::Dart);
        }
        s.parse().map(DetectionLabel::Landmark)
    }
}

impl TryFrom<String> for DetectionLabel {
    type Error = ParseLandmarkError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DetectionLabel> for String {
    fn from(label: DetectionLabel) -> Self {
        label.to_string()
    }
}

/// One labelled, confidence-scored point from the detector.
///
/// `position` is normalized by the full frame size.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: DetectionLabel,
    pub position: Point2<f64>,
    pub confidence: f32,
}

/// All detections reported for a single camera frame.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionFrame {
    pub detections: Vec<Detection>,
}

impl DetectionFrame {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self { detections }
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    /// Most confident detection per landmark, indexed by [`LandmarkId::index`].
    pub fn best_landmarks(&self) -> [Option<Detection>; LandmarkId::COUNT] {
        let mut best: [Option<Detection>; LandmarkId::COUNT] = [None; LandmarkId::COUNT];
        for d in &self.detections {
            let DetectionLabel::Landmark(l) = d.label else {
                continue;
            };
            let slot = &mut best[l.index()];
            if slot.is_none_or(|cur| d.confidence > cur.confidence) {
                *slot = Some(*d);
            }
        }
        best
    }

    /// Dart detections, most confident first.
    pub fn darts(&self) -> Vec<Detection> {
        let mut darts: Vec<Detection> = self
            .detections
            .iter()
            .filter(|d| d.label == DetectionLabel::Dart)
            .copied()
            .collect();
        darts.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        darts
    }
}
