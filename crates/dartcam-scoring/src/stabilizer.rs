//! Temporal voting over board-plane dart observations.
//!
//! The detector jitters and occasionally hallucinates darts. A dart is only
//! considered real once observations close to each other have been seen in
//! `repeat_threshold` of the last `depth` frames.

use log::debug;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Parameters for the temporal vote.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilizerParams {
    /// Number of frames kept in the history.
    pub depth: usize,
    /// Observations kept per frame; extra ones are dropped.
    pub width: usize,
    /// Frames a cluster must be sighted in to count as a dart. Also the
    /// number of empty frames that mean "board is clear".
    pub repeat_threshold: usize,
    /// Linking distance in board-plane units.
    pub cluster_epsilon: f64,
}

impl Default for StabilizerParams {
    fn default() -> Self {
        Self {
            depth: 5,
            width: 3,
            repeat_threshold: 3,
            cluster_epsilon: 0.01,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum StabilizerParamsError {
    #[error("history depth and width must be >= 1 (depth={depth}, width={width})")]
    EmptyHistory { depth: usize, width: usize },
    #[error("repeat_threshold must be in 1..={depth}, got {threshold}")]
    InvalidRepeatThreshold { threshold: usize, depth: usize },
    #[error("cluster_epsilon must be positive and finite, got {0}")]
    InvalidEpsilon(f64),
}

impl StabilizerParams {
    pub fn validate(&self) -> Result<(), StabilizerParamsError> {
        if self.depth == 0 || self.width == 0 {
            return Err(StabilizerParamsError::EmptyHistory {
                depth: self.depth,
                width: self.width,
            });
        }
        if self.repeat_threshold == 0 || self.repeat_threshold > self.depth {
            return Err(StabilizerParamsError::InvalidRepeatThreshold {
                threshold: self.repeat_threshold,
                depth: self.depth,
            });
        }
        if !self.cluster_epsilon.is_finite() || self.cluster_epsilon <= 0.0 {
            return Err(StabilizerParamsError::InvalidEpsilon(self.cluster_epsilon));
        }
        Ok(())
    }
}

/// Circular buffer of the last `depth` frames, each padded to `width`
/// optional observations.
#[derive(Clone, Debug)]
pub struct PredictionHistory {
    slots: Vec<Vec<Option<Point2<f64>>>>,
    width: usize,
    cursor: usize,
}

impl PredictionHistory {
    pub fn new(depth: usize, width: usize) -> Self {
        Self {
            slots: vec![vec![None; width]; depth],
            width,
            cursor: 0,
        }
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Slot the next frame will be written to.
    #[inline]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Overwrite the oldest frame. Returns the number of observations that
    /// did not fit.
    pub fn push(&mut self, observations: &[Point2<f64>]) -> usize {
        let depth = self.depth();
        if depth == 0 {
            return observations.len();
        }
        let slot = &mut self.slots[self.cursor];
        slot.fill(None);
        for (dst, &p) in slot.iter_mut().zip(observations) {
            *dst = Some(p);
        }
        self.cursor = (self.cursor + 1) % depth;
        observations.len().saturating_sub(self.width)
    }

    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            slot.fill(None);
        }
        self.cursor = 0;
    }

    /// Frames from oldest to newest.
    pub fn frames(&self) -> impl Iterator<Item = &[Option<Point2<f64>>]> + '_ {
        let (newer, older) = self.slots.split_at(self.cursor);
        older.iter().chain(newer).map(Vec::as_slice)
    }

    /// Frames with no observation at all.
    pub fn empty_frame_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.iter().all(Option::is_none))
            .count()
    }

    pub fn observation_count(&self) -> usize {
        self.slots.iter().flatten().flatten().count()
    }
}

/// A cluster that passed the support vote.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConfirmedDart {
    /// Centroid of the cluster members.
    pub position: Point2<f64>,
    /// Distinct frames the cluster was sighted in.
    pub support: usize,
    /// Number of observations in the cluster.
    pub members: usize,
}

/// Group the buffered observations and keep the ones seen often enough.
///
/// Observations are linked when closer than `cluster_epsilon`; clusters are
/// the connected components of that relation, so two observations within
/// epsilon of each other always share a cluster. Support counts distinct
/// frames. Survivors are ordered by descending support, ties by the order
/// they were first seen (oldest frame first).
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip_all, fields(observations = history.observation_count()))
)]
pub fn cluster_observations(
    history: &PredictionHistory,
    params: &StabilizerParams,
) -> Vec<ConfirmedDart> {
    let observations: Vec<(usize, Point2<f64>)> = history
        .frames()
        .enumerate()
        .flat_map(|(age, frame)| frame.iter().flatten().map(move |&p| (age, p)))
        .collect();

    let n = observations.len();
    let mut component: Vec<Option<usize>> = vec![None; n];
    let mut members_of: Vec<Vec<usize>> = Vec::new();
    let mut stack = Vec::new();

    // label components in first-seen order
    for seed in 0..n {
        if component[seed].is_some() {
            continue;
        }
        let id = members_of.len();
        let mut members = Vec::new();
        component[seed] = Some(id);
        stack.push(seed);
        while let Some(i) = stack.pop() {
            members.push(i);
            for j in 0..n {
                if component[j].is_none()
                    && (observations[i].1 - observations[j].1).norm() < params.cluster_epsilon
                {
                    component[j] = Some(id);
                    stack.push(j);
                }
            }
        }
        members_of.push(members);
    }

    let mut confirmed: Vec<ConfirmedDart> = members_of
        .iter()
        .filter_map(|members| {
            let mut frames: Vec<usize> = members.iter().map(|&i| observations[i].0).collect();
            frames.sort_unstable();
            frames.dedup();
            let support = frames.len();
            if support < params.repeat_threshold {
                return None;
            }
            let sum = members
                .iter()
                .fold(nalgebra::Vector2::zeros(), |acc, &i| acc + observations[i].1.coords);
            Some(ConfirmedDart {
                position: Point2::from(sum / members.len() as f64),
                support,
                members: members.len(),
            })
        })
        .collect();

    // stable: equal support keeps first-seen order
    confirmed.sort_by(|a, b| b.support.cmp(&a.support));

    debug!(
        "{} observations -> {} clusters, {} confirmed",
        n,
        members_of.len(),
        confirmed.len()
    );
    confirmed
}

/// Fixed-depth history plus the two queries the visit logic needs.
///
/// The stabilizer never touches visit state; its answers depend only on the
/// buffered frames.
#[derive(Clone, Debug)]
pub struct DetectionStabilizer {
    params: StabilizerParams,
    history: PredictionHistory,
}

impl DetectionStabilizer {
    pub fn new(params: StabilizerParams) -> Self {
        let history = PredictionHistory::new(params.depth, params.width);
        Self { params, history }
    }

    #[inline]
    pub fn params(&self) -> &StabilizerParams {
        &self.params
    }

    #[inline]
    pub fn history(&self) -> &PredictionHistory {
        &self.history
    }

    /// Record this frame's observations (possibly none).
    pub fn push(&mut self, observations: &[Point2<f64>]) {
        let dropped = self.history.push(observations);
        if dropped > 0 {
            debug!("dropped {dropped} dart observations beyond frame width");
        }
    }

    /// True once at least `repeat_threshold` buffered frames are empty.
    pub fn is_board_clear(&self) -> bool {
        self.history.empty_frame_count() >= self.params.repeat_threshold
    }

    pub fn confirmed_darts(&self) -> Vec<ConfirmedDart> {
        cluster_observations(&self.history, &self.params)
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn p(x: f64, y: f64) -> Point2<f64> {
        Point2::new(x, y)
    }

    /// Five frames; `frames` lists which ones contain `point`.
    fn history_with(point: Point2<f64>, frames: &[usize]) -> PredictionHistory {
        let mut h = PredictionHistory::new(5, 3);
        for f in 0..5 {
            if frames.contains(&f) {
                h.push(&[point]);
            } else {
                h.push(&[]);
            }
        }
        h
    }

    #[test]
    fn two_sightings_are_not_enough() {
        let h = history_with(p(0.3, 0.3), &[0, 2]);
        assert!(cluster_observations(&h, &StabilizerParams::default()).is_empty());
    }

    #[test]
    fn three_sightings_confirm() {
        let h = history_with(p(0.25, 0.75), &[0, 1, 2]);
        let confirmed = cluster_observations(&h, &StabilizerParams::default());
        assert_eq!(confirmed.len(), 1);
        assert_eq!(confirmed[0].support, 3);
        assert_eq!(confirmed[0].position, p(0.25, 0.75));
    }

    #[test]
    fn near_observations_merge_into_centroid() {
        let mut h = PredictionHistory::new(5, 3);
        for _ in 0..3 {
            h.push(&[p(0.500, 0.500), p(0.505, 0.505)]);
        }
        let confirmed = cluster_observations(&h, &StabilizerParams::default());
        assert_eq!(confirmed.len(), 1);
        assert_eq!(confirmed[0].members, 6);
        assert_eq!(confirmed[0].support, 3);
        assert_abs_diff_eq!(confirmed[0].position.x, 0.5025, epsilon = 1e-12);
        assert_abs_diff_eq!(confirmed[0].position.y, 0.5025, epsilon = 1e-12);
    }

    #[test]
    fn duplicate_detections_in_one_frame_do_not_add_support() {
        let mut h = PredictionHistory::new(5, 3);
        h.push(&[p(0.4, 0.4), p(0.401, 0.4), p(0.4, 0.401)]);
        h.push(&[p(0.4, 0.4)]);
        let confirmed = cluster_observations(&h, &StabilizerParams::default());
        assert!(confirmed.is_empty());
    }

    #[test]
    fn ranked_by_support_then_first_seen() {
        let mut h = PredictionHistory::new(5, 3);
        h.push(&[p(0.25, 0.25), p(0.75, 0.75)]);
        h.push(&[p(0.25, 0.25), p(0.75, 0.75), p(0.5, 0.875)]);
        h.push(&[p(0.5, 0.875), p(0.75, 0.75), p(0.25, 0.25)]);
        h.push(&[p(0.5, 0.875)]);
        h.push(&[p(0.5, 0.875)]);
        let confirmed = cluster_observations(&h, &StabilizerParams::default());
        let order: Vec<Point2<f64>> = confirmed.iter().map(|c| c.position).collect();
        assert_eq!(order, vec![p(0.5, 0.875), p(0.25, 0.25), p(0.75, 0.75)]);
    }

    #[test]
    fn far_observations_stay_apart() {
        let mut h = PredictionHistory::new(5, 3);
        for _ in 0..3 {
            h.push(&[p(0.5, 0.5), p(0.52, 0.5)]);
        }
        assert_eq!(
            cluster_observations(&h, &StabilizerParams::default()).len(),
            2
        );
    }

    #[test]
    fn cursor_wraps_and_overwrites_oldest() {
        let mut h = PredictionHistory::new(5, 3);
        for _ in 0..5 {
            h.push(&[p(0.1, 0.1)]);
        }
        assert_eq!(h.cursor(), 0);
        h.push(&[]);
        h.push(&[]);
        assert_eq!(h.cursor(), 2);
        assert_eq!(h.empty_frame_count(), 2);
        let oldest_first: Vec<bool> = h.frames().map(|f| f[0].is_some()).collect();
        assert_eq!(oldest_first, vec![true, true, true, false, false]);
    }

    #[test]
    fn push_truncates_to_width() {
        let mut h = PredictionHistory::new(5, 3);
        let dropped = h.push(&[p(0.1, 0.1), p(0.25, 0.25), p(0.3, 0.3), p(0.4, 0.4)]);
        assert_eq!(dropped, 1);
        assert_eq!(h.observation_count(), 3);
    }

    #[test]
    fn board_clear_needs_three_empty_frames() {
        let mut s = DetectionStabilizer::new(StabilizerParams::default());
        for _ in 0..5 {
            s.push(&[p(0.3, 0.3)]);
        }
        assert!(!s.is_board_clear());
        s.push(&[]);
        s.push(&[]);
        assert!(!s.is_board_clear());
        s.push(&[]);
        assert!(s.is_board_clear());
    }

    #[test]
    fn clear_resets_history() {
        let mut s = DetectionStabilizer::new(StabilizerParams::default());
        s.push(&[p(0.3, 0.3)]);
        s.clear();
        assert_eq!(s.history().observation_count(), 0);
        assert_eq!(s.history().cursor(), 0);
    }

    #[test]
    fn params_validation() {
        assert!(StabilizerParams::default().validate().is_ok());
        let bad = StabilizerParams {
            repeat_threshold: 6,
            ..StabilizerParams::default()
        };
        assert_eq!(
            bad.validate(),
            Err(StabilizerParamsError::InvalidRepeatThreshold {
                threshold: 6,
                depth: 5
            })
        );
        let bad = StabilizerParams {
            cluster_epsilon: 0.0,
            ..StabilizerParams::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn params_deserialize_with_defaults() {
        let params: StabilizerParams = serde_json::from_str(r#"{"repeat_threshold": 4}"#).unwrap();
        assert_eq!(params.repeat_threshold, 4);
        assert_eq!(params.depth, 5);
    }
}
