//! Frame-space to crop-space re-normalization.

use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

/// Square working crop inside a camera frame.
///
/// `origin` is the top-left corner of the crop in pixels and `size` its side
/// length in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CropWindow {
    pub resolution: Vector2<f64>,
    pub origin: Point2<f64>,
    pub size: f64,
}

impl CropWindow {
    /// Largest square crop centred in a `width x height` frame.
    pub fn centered(width: u32, height: u32) -> Self {
        let w = width as f64;
        let h = height as f64;
        let size = w.min(h);
        Self {
            resolution: Vector2::new(w, h),
            origin: Point2::new(0.5 * w - 0.5 * size, 0.5 * h - 0.5 * size),
            size,
        }
    }

    /// Re-normalize a frame-space point into crop space.
    ///
    /// The result may lie outside `[0,1]^2`.
    #[inline]
    pub fn to_crop(&self, p: Point2<f64>) -> Point2<f64> {
        let px = p.coords.component_mul(&self.resolution);
        Point2::from((px - self.origin.coords) / self.size)
    }

    /// Landmarks are kept even when they fall off the crop: an off-crop
    /// landmark still constrains the homography for on-crop darts.
    #[inline]
    pub fn adapt_landmark(&self, p: Point2<f64>) -> Point2<f64> {
        self.to_crop(p)
    }

    /// Dart points outside the crop are outside the working area.
    pub fn adapt_dart(&self, p: Point2<f64>) -> Option<Point2<f64>> {
        let q = self.to_crop(p);
        in_unit_square(q).then_some(q)
    }

    /// Inverse of [`CropWindow::to_crop`], in pixels.
    pub fn crop_to_pixels(&self, q: Point2<f64>) -> Point2<f64> {
        Point2::from(q.coords * self.size + self.origin.coords)
    }
}

/// Inclusive `[0,1]^2` test.
#[inline]
pub fn in_unit_square(p: Point2<f64>) -> bool {
    (0.0..=1.0).contains(&p.x) && (0.0..=1.0).contains(&p.y)
}
