//! Core geometry for camera-based dart scoring.
//!
//! This crate is purely geometric. It knows the canonical dartboard layout,
//! how to move detector points into the square working crop, and how to
//! solve and apply the crop-to-board homography. It does *not* depend on any
//! concrete detector, camera or scoreboard.
//!
//! Coordinate spaces used throughout the workspace:
//! - *frame space*: detector output, normalized by the full frame size;
//! - *crop space*: normalized by the centred square crop, `[0,1]^2` on-crop;
//! - *board plane*: the canonical, distortion-free board, `[0,1]^2` spanning
//!   the full board diameter with the bull at `(0.5, 0.5)`.

mod board;
mod calibration;
mod crop;
mod detection;
mod homography;
mod logger;

pub use board::{
    board_center, locate, point_on_board, sector_angle, BoardHit, LandmarkId, ParseLandmarkError,
    Ring, RingRadii, BOARD_DIAMETER_MM, SECTOR_ORDER, SECTOR_WIDTH_DEG,
};
pub use calibration::{CalibrationPoint, CalibrationSet, PointSource};
pub use crop::{in_unit_square, CropWindow};
pub use detection::{Detection, DetectionFrame, DetectionLabel};
pub use homography::{
    estimate_board_homography, estimate_homography, find_collinear_triple, homography_from_4pt,
    Homography, HomographyError, HomographyParams,
};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_with_level, log_frame, set_log_frame};
