use dartcam_core::{CalibrationSet, CropWindow, DetectionFrame, LandmarkId, PointSource};
use log::info;
use nalgebra::Point2;

/// Per-landmark operator overrides, merged over detected landmarks.
///
/// Override positions are in crop space. An override always wins over the
/// detector for its landmark until it is cleared.
#[derive(Clone, Debug, Default)]
pub struct Calibrator {
    overrides: [Option<Point2<f64>>; LandmarkId::COUNT],
    corrections: usize,
}

impl Calibrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_override(&mut self, landmark: LandmarkId, position: Point2<f64>) {
        info!(
            "landmark {landmark} overridden at ({:.4}, {:.4})",
            position.x, position.y
        );
        self.overrides[landmark.index()] = Some(position);
        self.corrections += 1;
    }

    pub fn clear_override(&mut self, landmark: LandmarkId) -> Option<Point2<f64>> {
        self.overrides[landmark.index()].take()
    }

    pub fn clear_overrides(&mut self) {
        self.overrides = [None; LandmarkId::COUNT];
    }

    #[inline]
    pub fn override_for(&self, landmark: LandmarkId) -> Option<Point2<f64>> {
        self.overrides[landmark.index()]
    }

    pub fn has_overrides(&self) -> bool {
        self.overrides.iter().any(Option::is_some)
    }

    /// Number of overrides applied since construction. Survives
    /// [`Calibrator::clear_overrides`].
    pub fn corrections(&self) -> usize {
        self.corrections
    }

    /// Merge crop-space detected positions with the overrides.
    pub fn merged(&self, detected: &[Option<Point2<f64>>; LandmarkId::COUNT]) -> CalibrationSet {
        let mut set = CalibrationSet::from_detected(*detected);
        for landmark in LandmarkId::ALL {
            if let Some(p) = self.override_for(landmark) {
                set.set(landmark, Some(p), PointSource::UserOverride);
            }
        }
        set
    }

    /// Adapt the frame's best landmark detections into crop space and merge.
    pub fn merge_frame(&self, frame: &DetectionFrame, crop: &CropWindow) -> CalibrationSet {
        let detected = frame
            .best_landmarks()
            .map(|d| d.map(|d| crop.adapt_landmark(d.position)));
        self.merged(&detected)
    }
}
