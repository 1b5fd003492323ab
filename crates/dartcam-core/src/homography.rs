use log::debug;
use nalgebra::{DMatrix, Matrix3, Point2, SMatrix, SVector, Vector3};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::board::LandmarkId;
use crate::calibration::CalibrationSet;

/// Projective transform `dst ~ H * src`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Homography {
    pub h: Matrix3<f64>,
}

impl Homography {
    pub fn new(h: Matrix3<f64>) -> Self {
        Self { h }
    }

    pub fn identity() -> Self {
        Self::new(Matrix3::identity())
    }

    pub fn from_array(rows: [[f64; 3]; 3]) -> Self {
        Self::new(Matrix3::from_row_slice(&[
            rows[0][0], rows[0][1], rows[0][2], rows[1][0], rows[1][1], rows[1][2], rows[2][0],
            rows[2][1], rows[2][2],
        ]))
    }

    pub fn to_array(&self) -> [[f64; 3]; 3] {
        [
            [self.h[(0, 0)], self.h[(0, 1)], self.h[(0, 2)]],
            [self.h[(1, 0)], self.h[(1, 1)], self.h[(1, 2)]],
            [self.h[(2, 0)], self.h[(2, 1)], self.h[(2, 2)]],
        ]
    }

    /// Map a point; `None` when it lands on the line at infinity.
    #[inline]
    pub fn apply(&self, p: Point2<f64>) -> Option<Point2<f64>> {
        let v = self.h * Vector3::new(p.x, p.y, 1.0);
        let w = v[2];
        if w.abs() < 1e-12 {
            return None;
        }
        let q = Point2::new(v[0] / w, v[1] / w);
        (q.x.is_finite() && q.y.is_finite()).then_some(q)
    }

    pub fn inverse(&self) -> Option<Self> {
        self.h.try_inverse().map(Self::new)
    }
}

/// Homography estimation errors. All of them mean "no usable mapping this frame".
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum HomographyError {
    #[error("need at least {required} correspondences, got {found}")]
    TooFewCorrespondences { found: usize, required: usize },
    #[error("source and destination point counts differ ({src} vs {dst})")]
    LengthMismatch { src: usize, dst: usize },
    #[error("points {0:?} are collinear")]
    Collinear([usize; 3]),
    #[error("point {0} is not finite")]
    NonFinite(usize),
    #[error("homography is singular")]
    Singular,
}

/// Calibration requirements for the crop-to-board homography.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HomographyParams {
    /// Minimum present landmarks; values below 4 are treated as 4.
    pub min_landmarks: usize,
    /// Triangles whose `2 * area / longest_side^2` falls below this are
    /// considered collinear.
    pub collinearity_tolerance: f64,
}

impl Default for HomographyParams {
    fn default() -> Self {
        Self {
            min_landmarks: 4,
            collinearity_tolerance: 5e-3,
        }
    }
}

const SVD_MAX_ITERATIONS: usize = 500;

#[inline]
fn is_finite_point(p: &Point2<f64>) -> bool {
    p.x.is_finite() && p.y.is_finite()
}

fn hartley_normalization(cx: f64, cy: f64, mean_dist: f64) -> Matrix3<f64> {
    let s = if mean_dist > 1e-12 {
        (2.0_f64).sqrt() / mean_dist
    } else {
        1.0
    };

    Matrix3::<f64>::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0)
}

fn normalize_points(pts: &[Point2<f64>]) -> (Vec<Point2<f64>>, Matrix3<f64>) {
    // translate to centroid, scale so mean distance = sqrt(2)
    let n = pts.len() as f64;
    let (sx, sy) = pts.iter().fold((0.0, 0.0), |(x, y), p| (x + p.x, y + p.y));
    let cx = sx / n;
    let cy = sy / n;

    let mean_dist = pts
        .iter()
        .map(|p| (p.x - cx).hypot(p.y - cy))
        .sum::<f64>()
        / n;

    let t = hartley_normalization(cx, cy, mean_dist);
    let out = pts
        .iter()
        .map(|p| {
            let v = t * Vector3::new(p.x, p.y, 1.0);
            Point2::new(v[0], v[1])
        })
        .collect();
    (out, t)
}

fn finalize(hn: Matrix3<f64>, t_src: Matrix3<f64>, t_dst: Matrix3<f64>) -> Option<Homography> {
    // H = T_dst^{-1} * Hn * T_src, scaled so h33 = 1
    let h = t_dst.try_inverse()? * hn * t_src;
    let s = h[(2, 2)];
    if s.abs() < 1e-12 {
        return None;
    }
    let h = h / s;
    if !h.iter().all(|v| v.is_finite()) || h.determinant().abs() < 1e-12 {
        return None;
    }
    Some(Homography::new(h))
}

/// First triple of points (by index order) that is collinear within `tolerance`.
///
/// Coincident points count as collinear.
pub fn find_collinear_triple(pts: &[Point2<f64>], tolerance: f64) -> Option<[usize; 3]> {
    let n = pts.len();
    for i in 0..n {
        for j in i + 1..n {
            for k in j + 1..n {
                let ab = pts[j] - pts[i];
                let ac = pts[k] - pts[i];
                let bc = pts[k] - pts[j];
                let longest = ab.norm_squared().max(ac.norm_squared()).max(bc.norm_squared());
                if longest < 1e-24 {
                    return Some([i, j, k]);
                }
                let twice_area = (ab.x * ac.y - ab.y * ac.x).abs();
                if twice_area / longest < tolerance {
                    return Some([i, j, k]);
                }
            }
        }
    }
    None
}

/// Estimate H such that `dst ~ H * src`.
///
/// Exactly four correspondences are solved exactly; more are solved in the
/// least-squares sense with a Hartley-normalized DLT. Collinear source or
/// destination triples are rejected before solving.
pub fn estimate_homography(
    src: &[Point2<f64>],
    dst: &[Point2<f64>],
    collinearity_tolerance: f64,
) -> Result<Homography, HomographyError> {
    if src.len() != dst.len() {
        return Err(HomographyError::LengthMismatch {
            src: src.len(),
            dst: dst.len(),
        });
    }
    if src.len() < 4 {
        return Err(HomographyError::TooFewCorrespondences {
            found: src.len(),
            required: 4,
        });
    }
    if let Some(i) = src
        .iter()
        .zip(dst)
        .position(|(s, d)| !(is_finite_point(s) && is_finite_point(d)))
    {
        return Err(HomographyError::NonFinite(i));
    }
    if let Some(triple) = find_collinear_triple(src, collinearity_tolerance)
        .or_else(|| find_collinear_triple(dst, collinearity_tolerance))
    {
        return Err(HomographyError::Collinear(triple));
    }

    if let (Ok(s4), Ok(d4)) = (
        <&[Point2<f64>; 4]>::try_from(src),
        <&[Point2<f64>; 4]>::try_from(dst),
    ) {
        return homography_from_4pt(s4, d4);
    }

    let (s, ts) = normalize_points(src);
    let (d, td) = normalize_points(dst);

    // Build A (2N x 9)
    let n = src.len();
    let mut a = DMatrix::<f64>::zeros(2 * n, 9);

    for k in 0..n {
        let x = s[k].x;
        let y = s[k].y;
        let u = d[k].x;
        let v = d[k].y;

        // [ -x -y -1   0  0  0   u*x u*y u ]
        a[(2 * k, 0)] = -x;
        a[(2 * k, 1)] = -y;
        a[(2 * k, 2)] = -1.0;
        a[(2 * k, 6)] = u * x;
        a[(2 * k, 7)] = u * y;
        a[(2 * k, 8)] = u;

        // [ 0  0  0  -x -y -1   v*x v*y v ]
        a[(2 * k + 1, 3)] = -x;
        a[(2 * k + 1, 4)] = -y;
        a[(2 * k + 1, 5)] = -1.0;
        a[(2 * k + 1, 6)] = v * x;
        a[(2 * k + 1, 7)] = v * y;
        a[(2 * k + 1, 8)] = v;
    }

    // Ah = 0: h is the right singular vector with the smallest singular value
    let svd = a
        .try_svd(false, true, f64::EPSILON, SVD_MAX_ITERATIONS)
        .ok_or(HomographyError::Singular)?;
    let vt = svd.v_t.ok_or(HomographyError::Singular)?;
    let last = vt.nrows().checked_sub(1).ok_or(HomographyError::Singular)?;
    let h = vt.row(last);

    let hn =
        Matrix3::<f64>::from_row_slice(&[h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]]);

    finalize(hn, ts, td).ok_or(HomographyError::Singular)
}

/// Exact homography from four correspondences (h33 fixed to 1).
///
/// Point order must be consistent between `src` and `dst`.
pub fn homography_from_4pt(
    src: &[Point2<f64>; 4],
    dst: &[Point2<f64>; 4],
) -> Result<Homography, HomographyError> {
    // h11 x + h12 y + h13 - u h31 x - u h32 y = u
    // h21 x + h22 y + h23 - v h31 x - v h32 y = v
    let (src_n, t_src) = normalize_points(src);
    let (dst_n, t_dst) = normalize_points(dst);

    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();

    for k in 0..4 {
        let x = src_n[k].x;
        let y = src_n[k].y;
        let u = dst_n[k].x;
        let v = dst_n[k].y;

        let r0 = 2 * k;
        a[(r0, 0)] = x;
        a[(r0, 1)] = y;
        a[(r0, 2)] = 1.0;
        a[(r0, 6)] = -u * x;
        a[(r0, 7)] = -u * y;
        b[r0] = u;

        let r1 = 2 * k + 1;
        a[(r1, 3)] = x;
        a[(r1, 4)] = y;
        a[(r1, 5)] = 1.0;
        a[(r1, 6)] = -v * x;
        a[(r1, 7)] = -v * y;
        b[r1] = v;
    }

    let x = a.lu().solve(&b).ok_or(HomographyError::Singular)?;

    let hn = Matrix3::<f64>::new(
        x[0], x[1], x[2], //
        x[3], x[4], x[5], //
        x[6], x[7], 1.0,
    );

    finalize(hn, t_src, t_dst).ok_or(HomographyError::Singular)
}

/// Crop-space to board-plane homography from the present landmarks.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(set, params), fields(present = set.present_count()))
)]
pub fn estimate_board_homography(
    set: &CalibrationSet,
    params: &HomographyParams,
) -> Result<Homography, HomographyError> {
    let required = params.min_landmarks.max(4);
    let (landmarks, crop): (Vec<LandmarkId>, Vec<Point2<f64>>) = set.present().unzip();
    if crop.len() < required {
        return Err(HomographyError::TooFewCorrespondences {
            found: crop.len(),
            required,
        });
    }
    let board: Vec<Point2<f64>> = landmarks.iter().map(|l| l.canonical_position()).collect();

    estimate_homography(&crop, &board, params.collinearity_tolerance).inspect_err(|err| {
        match err {
            HomographyError::Collinear([i, j, k]) => debug!(
                "landmarks {}, {}, {} are collinear in the crop",
                landmarks[*i], landmarks[*j], landmarks[*k]
            ),
            HomographyError::NonFinite(i) => {
                debug!("landmark {} has a non-finite position", landmarks[*i])
            }
            _ => {}
        }
    })
}
