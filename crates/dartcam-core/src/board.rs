//! Canonical dartboard layout in board-plane units.
//!
//! The board plane is the unit square spanning the full board diameter.
//! `+y` points down (image convention) and sector 20 sits at the top.

use std::fmt;
use std::str::FromStr;

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Physical diameter covered by the unit board-plane square.
pub const BOARD_DIAMETER_MM: f64 = 451.0;

/// Sector numbers clockwise from the top.
pub const SECTOR_ORDER: [u8; 20] = [
    20, 1, 18, 4, 13, 6, 10, 15, 2, 17, 3, 19, 7, 16, 8, 11, 14, 9, 12, 5,
];

/// Angular width of one sector, in degrees.
pub const SECTOR_WIDTH_DEG: f64 = 18.0;

/// Bull position in board-plane coordinates.
#[inline]
pub fn board_center() -> Point2<f64> {
    Point2::new(0.5, 0.5)
}

/// Ring radii in board-plane units (fraction of [`BOARD_DIAMETER_MM`]).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RingRadii {
    pub double_bull: f64,
    pub bull: f64,
    pub treble_inner: f64,
    pub treble_outer: f64,
    pub double_inner: f64,
    pub double_outer: f64,
}

impl RingRadii {
    /// Build radii from millimetre measurements.
    pub fn from_mm(
        double_bull: f64,
        bull: f64,
        treble_inner: f64,
        treble_outer: f64,
        double_inner: f64,
        double_outer: f64,
    ) -> Self {
        let s = 1.0 / BOARD_DIAMETER_MM;
        Self {
            double_bull: double_bull * s,
            bull: bull * s,
            treble_inner: treble_inner * s,
            treble_outer: treble_outer * s,
            double_inner: double_inner * s,
            double_outer: double_outer * s,
        }
    }

    /// Midpoint of the treble ring.
    #[inline]
    pub fn treble_mid(&self) -> f64 {
        0.5 * (self.treble_inner + self.treble_outer)
    }

    /// Midpoint of the double ring.
    #[inline]
    pub fn double_mid(&self) -> f64 {
        0.5 * (self.double_inner + self.double_outer)
    }
}

impl Default for RingRadii {
    /// Regulation board (WDF dimensions).
    fn default() -> Self {
        Self::from_mm(6.35, 15.9, 99.0, 107.0, 162.0, 170.0)
    }
}

/// Scoring ring a board-plane point falls into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ring {
    DoubleBull,
    Bull,
    InnerSingle,
    Treble,
    OuterSingle,
    Double,
    Outside,
}

/// Ring and sector of a board-plane point.
///
/// `sector` is meaningful for every ring; callers ignore it for bulls and
/// misses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoardHit {
    pub ring: Ring,
    pub sector: u8,
}

/// Clockwise angle from the top of the board to the centre of `sector`, in radians.
pub fn sector_angle(sector: u8) -> Option<f64> {
    let idx = SECTOR_ORDER.iter().position(|&s| s == sector)?;
    Some((idx as f64 * SECTOR_WIDTH_DEG).to_radians())
}

/// Board-plane point at `radius` from the bull, centred on `sector`.
pub fn point_on_board(sector: u8, radius: f64) -> Option<Point2<f64>> {
    let theta = sector_angle(sector)?;
    let c = board_center();
    Some(Point2::new(
        c.x + radius * theta.sin(),
        c.y - radius * theta.cos(),
    ))
}

/// Classify a board-plane point into ring and sector.
pub fn locate(p: Point2<f64>, radii: &RingRadii) -> BoardHit {
    let c = board_center();
    let dx = p.x - c.x;
    let dy = p.y - c.y;
    let r = dx.hypot(dy);

    // clockwise from the top; image y grows downwards
    let deg = dx.atan2(-dy).to_degrees().rem_euclid(360.0);
    let idx = ((deg + 0.5 * SECTOR_WIDTH_DEG) / SECTOR_WIDTH_DEG).floor() as usize % 20;
    let sector = SECTOR_ORDER[idx];

    let ring = if r <= radii.double_bull {
        Ring::DoubleBull
    } else if r <= radii.bull {
        Ring::Bull
    } else if r < radii.treble_inner {
        Ring::InnerSingle
    } else if r <= radii.treble_outer {
        Ring::Treble
    } else if r < radii.double_inner {
        Ring::OuterSingle
    } else if r <= radii.double_outer {
        Ring::Double
    } else {
        Ring::Outside
    };

    BoardHit { ring, sector }
}

/// One of the six calibration landmarks.
///
/// Each landmark is the outer edge of the double ring at the angular centre
/// of the sector it is named after. The declaration order is the canonical
/// index order used by [`crate::CalibrationSet`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LandmarkId {
    Twenty,
    Three,
    Eleven,
    Six,
    Nine,
    Fifteen,
}

impl LandmarkId {
    pub const COUNT: usize = 6;

    pub const ALL: [LandmarkId; Self::COUNT] = [
        LandmarkId::Twenty,
        LandmarkId::Three,
        LandmarkId::Eleven,
        LandmarkId::Six,
        LandmarkId::Nine,
        LandmarkId::Fifteen,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Sector number this landmark is named after.
    pub fn sector(self) -> u8 {
        match self {
            LandmarkId::Twenty => 20,
            LandmarkId::Three => 3,
            LandmarkId::Eleven => 11,
            LandmarkId::Six => 6,
            LandmarkId::Nine => 9,
            LandmarkId::Fifteen => 15,
        }
    }

    pub fn from_sector(sector: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|l| l.sector() == sector)
    }

    /// True position on the regulation board.
    pub fn canonical_position(self) -> Point2<f64> {
        let radius = RingRadii::default().double_outer;
        // every landmark sector is in SECTOR_ORDER
        point_on_board(self.sector(), radius).unwrap_or_else(board_center)
    }
}

impl fmt::Display for LandmarkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sector())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown landmark label `{0}`")]
pub struct ParseLandmarkError(pub String);

impl FromStr for LandmarkId {
    type Err = ParseLandmarkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u8>()
            .ok()
            .and_then(Self::from_sector)
            .ok_or_else(|| ParseLandmarkError(s.to_string()))
    }
}
