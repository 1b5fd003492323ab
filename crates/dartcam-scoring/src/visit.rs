//! Per-visit state machine.

use log::{debug, info};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::score::{classify_remaining, ScoreLabel, VisitOutcome};
use crate::scoreboard::Scoreboard;
use crate::stabilizer::{ConfirmedDart, DetectionStabilizer};

pub const MAX_DARTS_PER_VISIT: usize = 3;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitPhase {
    /// Fewer than three darts locked and the visit is not final.
    #[default]
    Accumulating,
    /// The visit was committed; waiting for the darts to be pulled.
    AwaitingRemoval,
}

/// A dart accepted into the visit.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LockedDart {
    pub position: Point2<f64>,
    pub label: ScoreLabel,
}

/// One player's turn.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Visit {
    pub darts: Vec<LockedDart>,
    pub phase: VisitPhase,
    /// Set once the scoreboard has been given this visit.
    pub committed: bool,
    /// Frozen at finalization.
    pub outcome: Option<VisitOutcome>,
    /// Sum of point values of the locked darts.
    pub score: i32,
    /// Thrower's score when the visit was finalized.
    pub starting_score: Option<i32>,
}

impl Visit {
    pub fn labels(&self) -> Vec<ScoreLabel> {
        self.darts.iter().map(|d| d.label).collect()
    }

    #[inline]
    pub fn is_final(&self) -> bool {
        self.phase == VisitPhase::AwaitingRemoval
    }

    /// Score the thrower has left after this visit. `None` until committed.
    pub fn thrower_score(&self) -> Option<i32> {
        if !self.committed {
            return None;
        }
        self.outcome
            .and_then(|outcome| outcome.remaining().or(self.starting_score))
    }
}

/// What changed during one [`VisitScorer::step`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VisitUpdate {
    pub phase: VisitPhase,
    pub newly_locked: Vec<LockedDart>,
    /// `None` until at least one dart is locked.
    pub visit_score: Option<i32>,
    pub outcome: Option<VisitOutcome>,
    /// The scoreboard was committed to on this step.
    pub committed: bool,
    /// The board was seen clear and the visit was reset on this step.
    pub reset: bool,
}

/// Locks confirmed darts into the visit and decides when it is final.
#[derive(Clone, Debug)]
pub struct VisitScorer {
    visit: Visit,
    epsilon: f64,
}

impl VisitScorer {
    /// `epsilon` is the distance within which a confirmed dart is taken to
    /// be an already locked one.
    pub fn new(epsilon: f64) -> Self {
        Self {
            visit: Visit::default(),
            epsilon,
        }
    }

    #[inline]
    pub fn visit(&self) -> &Visit {
        &self.visit
    }

    #[inline]
    pub fn phase(&self) -> VisitPhase {
        self.visit.phase
    }

    /// Drop the current visit and start accumulating the next one.
    pub fn reset(&mut self) {
        self.visit = Visit::default();
    }

    /// Advance the state machine by one frame.
    ///
    /// While accumulating this reads the stabilizer's confirmed darts; while
    /// awaiting removal it only checks whether the board is clear. A `reset`
    /// update means the caller should clear the per-turn state it owns.
    pub fn step<S: Scoreboard + ?Sized>(
        &mut self,
        stabilizer: &DetectionStabilizer,
        scoreboard: &mut S,
    ) -> VisitUpdate {
        match self.visit.phase {
            VisitPhase::Accumulating => {
                let confirmed = stabilizer.confirmed_darts();
                self.accumulate(&confirmed, scoreboard)
            }
            VisitPhase::AwaitingRemoval => {
                if stabilizer.is_board_clear() {
                    info!("board clear, starting next visit");
                    self.reset();
                    VisitUpdate {
                        reset: true,
                        ..VisitUpdate::default()
                    }
                } else {
                    self.snapshot()
                }
            }
        }
    }

    /// Accumulating-phase step over an explicit set of confirmed darts, in
    /// ranked order.
    pub fn accumulate<S: Scoreboard + ?Sized>(
        &mut self,
        confirmed: &[ConfirmedDart],
        scoreboard: &mut S,
    ) -> VisitUpdate {
        if self.visit.is_final() {
            return self.snapshot();
        }

        let mut newly_locked = Vec::new();
        for candidate in confirmed {
            if self.visit.darts.len() >= MAX_DARTS_PER_VISIT {
                break;
            }
            let duplicate = self
                .visit
                .darts
                .iter()
                .any(|d| (d.position - candidate.position).norm() <= self.epsilon);
            if duplicate {
                continue;
            }
            let dart = LockedDart {
                position: candidate.position,
                label: scoreboard.label_for_position(candidate.position),
            };
            info!(
                "locked dart {} as {} (support {})",
                self.visit.darts.len() + 1,
                dart.label,
                candidate.support
            );
            self.visit.darts.push(dart);
            newly_locked.push(dart);
        }

        if self.visit.darts.is_empty() {
            return VisitUpdate {
                newly_locked,
                ..VisitUpdate::default()
            };
        }

        // calibration may have moved since a dart was locked
        for dart in &mut self.visit.darts {
            dart.label = scoreboard.label_for_position(dart.position);
        }

        let player_score = scoreboard.current_player_score();
        let values: Vec<i32> = self
            .visit
            .darts
            .iter()
            .map(|d| scoreboard.point_value(d.label))
            .collect();
        let score: i32 = values.iter().sum();
        let remaining = player_score - score;
        self.visit.score = score;

        let mut committed = false;
        if remaining <= 1 || self.visit.darts.len() >= MAX_DARTS_PER_VISIT {
            self.finalize(player_score, &values, scoreboard);
            committed = true;
        } else {
            self.visit.outcome = Some(VisitOutcome::Remaining(remaining));
            debug!("visit score {score}, {remaining} remaining");
        }

        VisitUpdate {
            newly_locked,
            committed,
            ..self.snapshot()
        }
    }

    fn finalize<S: Scoreboard + ?Sized>(
        &mut self,
        player_score: i32,
        values: &[i32],
        scoreboard: &mut S,
    ) {
        if self.visit.committed {
            return;
        }
        // the first dart that takes the score to <= 1 decides the visit
        let mut running = player_score;
        let deciding = values
            .iter()
            .position(|v| {
                running -= v;
                running <= 1
            })
            .unwrap_or(values.len() - 1);
        if deciding + 1 < self.visit.darts.len() {
            debug!(
                "discarding {} dart(s) after the deciding one",
                self.visit.darts.len() - deciding - 1
            );
            self.visit.darts.truncate(deciding + 1);
        }
        let score: i32 = values[..=deciding].iter().sum();
        let outcome = classify_remaining(
            player_score - score,
            self.visit.darts.last().map(|d| d.label),
        );
        self.visit.score = score;
        self.visit.outcome = Some(outcome);
        self.visit.starting_score = Some(player_score);

        let labels = self.visit.labels();
        scoreboard.commit_visit(&labels);
        self.visit.committed = true;
        self.visit.phase = VisitPhase::AwaitingRemoval;
        info!("visit committed: {score} scored, outcome {outcome}");
    }

    fn snapshot(&self) -> VisitUpdate {
        let has_darts = !self.visit.darts.is_empty();
        VisitUpdate {
            phase: self.visit.phase,
            newly_locked: Vec::new(),
            visit_score: has_darts.then_some(self.visit.score),
            outcome: if has_darts { self.visit.outcome } else { None },
            committed: false,
            reset: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Labels every position the same and records commits.
    struct Stub {
        score: i32,
        label: ScoreLabel,
        commits: Vec<Vec<ScoreLabel>>,
    }

    impl Stub {
        fn new(score: i32, label: ScoreLabel) -> Self {
            Self {
                score,
                label,
                commits: Vec::new(),
            }
        }
    }

    impl Scoreboard for Stub {
        fn label_for_position(&self, _position: Point2<f64>) -> ScoreLabel {
            self.label
        }

        fn current_player_score(&self) -> i32 {
            self.score
        }

        fn commit_visit(&mut self, labels: &[ScoreLabel]) {
            self.commits.push(labels.to_vec());
            let total: i32 = labels.iter().map(|l| l.value() as i32).sum();
            if let Some(r) = classify_remaining(self.score - total, labels.last().copied())
                .remaining()
            {
                self.score = r;
            }
        }
    }

    fn dart(x: f64, y: f64) -> ConfirmedDart {
        ConfirmedDart {
            position: Point2::new(x, y),
            support: 3,
            members: 3,
        }
    }

    #[test]
    fn locks_and_scores_single_dart() {
        let mut scorer = VisitScorer::new(0.01);
        let mut board = Stub::new(501, ScoreLabel::Treble(20));
        let update = scorer.accumulate(&[dart(0.5, 0.2)], &mut board);
        assert_eq!(update.newly_locked.len(), 1);
        assert_eq!(update.visit_score, Some(60));
        assert_eq!(update.outcome, Some(VisitOutcome::Remaining(441)));
        assert_eq!(update.phase, VisitPhase::Accumulating);
        assert!(board.commits.is_empty());
        assert_eq!(scorer.visit().thrower_score(), None);
    }

    #[test]
    fn thrower_score_survives_the_handover() {
        let mut scorer = VisitScorer::new(0.01);
        let mut board = Stub::new(100, ScoreLabel::Treble(20));
        scorer.accumulate(&[dart(0.2, 0.2)], &mut board);
        scorer.accumulate(&[dart(0.2, 0.2), dart(0.6, 0.6)], &mut board);
        assert!(scorer.visit().committed);
        assert_eq!(scorer.visit().outcome, Some(VisitOutcome::Bust));
        // a bust leaves the thrower where they started
        assert_eq!(scorer.visit().thrower_score(), Some(100));

        let mut scorer = VisitScorer::new(0.01);
        let mut board = Stub::new(301, ScoreLabel::Treble(20));
        let darts = [dart(0.2, 0.2), dart(0.4, 0.4), dart(0.6, 0.6)];
        scorer.accumulate(&darts, &mut board);
        assert_eq!(scorer.visit().thrower_score(), Some(121));
    }

    #[test]
    fn duplicate_confirmation_is_not_locked_twice() {
        let mut scorer = VisitScorer::new(0.01);
        let mut board = Stub::new(501, ScoreLabel::Single(1));
        scorer.accumulate(&[dart(0.5, 0.5)], &mut board);
        let update = scorer.accumulate(&[dart(0.505, 0.5), dart(0.3, 0.3)], &mut board);
        assert_eq!(update.newly_locked.len(), 1);
        assert_eq!(scorer.visit().darts.len(), 2);
    }

    #[test]
    fn no_darts_no_score() {
        let mut scorer = VisitScorer::new(0.01);
        let mut board = Stub::new(501, ScoreLabel::Single(1));
        let update = scorer.accumulate(&[], &mut board);
        assert_eq!(update.visit_score, None);
        assert_eq!(update.outcome, None);
    }

    #[test]
    fn third_dart_commits_exactly_once() {
        let mut scorer = VisitScorer::new(0.01);
        let mut board = Stub::new(501, ScoreLabel::Single(5));
        let darts = [dart(0.2, 0.2), dart(0.4, 0.4), dart(0.6, 0.6)];
        let first = scorer.accumulate(&darts, &mut board);
        assert!(first.committed);
        assert_eq!(first.phase, VisitPhase::AwaitingRemoval);
        assert_eq!(first.visit_score, Some(15));
        assert_eq!(first.outcome, Some(VisitOutcome::Remaining(486)));

        for _ in 0..5 {
            let again = scorer.accumulate(&darts, &mut board);
            assert!(!again.committed);
            assert_eq!(again.outcome, Some(VisitOutcome::Remaining(486)));
        }
        assert_eq!(board.commits.len(), 1);
    }

    #[test]
    fn fourth_dart_is_ignored() {
        let mut scorer = VisitScorer::new(0.01);
        let mut board = Stub::new(501, ScoreLabel::Single(5));
        let darts = [
            dart(0.2, 0.2),
            dart(0.4, 0.4),
            dart(0.6, 0.6),
            dart(0.8, 0.8),
        ];
        scorer.accumulate(&darts, &mut board);
        assert_eq!(board.commits[0].len(), 3);
    }

    #[test]
    fn overshoot_busts() {
        let mut scorer = VisitScorer::new(0.01);
        let mut board = Stub::new(40, ScoreLabel::Treble(20));
        let update = scorer.accumulate(&[dart(0.5, 0.2)], &mut board);
        assert!(update.committed);
        assert_eq!(update.outcome, Some(VisitOutcome::Bust));
        assert_eq!(board.score, 40);
    }

    #[test]
    fn leaving_one_busts() {
        let mut scorer = VisitScorer::new(0.01);
        let mut board = Stub::new(3, ScoreLabel::Double(1));
        let update = scorer.accumulate(&[dart(0.5, 0.2)], &mut board);
        assert_eq!(update.outcome, Some(VisitOutcome::Bust));
    }

    #[test]
    fn double_checkout() {
        let mut scorer = VisitScorer::new(0.01);
        let mut board = Stub::new(2, ScoreLabel::Double(1));
        let update = scorer.accumulate(&[dart(0.5, 0.2)], &mut board);
        assert_eq!(update.outcome, Some(VisitOutcome::Checkout));
        assert_eq!(board.score, 0);
    }

    #[test]
    fn deciding_dart_truncates_later_darts() {
        let mut scorer = VisitScorer::new(0.01);
        let mut board = Stub::new(60, ScoreLabel::Treble(20));
        // two darts confirmed in the same frame, the first already decides
        let update = scorer.accumulate(&[dart(0.5, 0.2), dart(0.6, 0.2)], &mut board);
        assert_eq!(update.outcome, Some(VisitOutcome::Bust));
        assert_eq!(scorer.visit().darts.len(), 1);
        assert_eq!(board.commits, vec![vec![ScoreLabel::Treble(20)]]);
    }

    #[test]
    fn relabels_locked_darts_every_frame() {
        let mut scorer = VisitScorer::new(0.01);
        let mut board = Stub::new(501, ScoreLabel::Single(20));
        scorer.accumulate(&[dart(0.5, 0.2)], &mut board);
        board.label = ScoreLabel::Treble(20);
        let update = scorer.accumulate(&[], &mut board);
        assert_eq!(update.visit_score, Some(60));
        assert_eq!(scorer.visit().darts[0].label, ScoreLabel::Treble(20));
    }

    #[test]
    fn step_resets_once_board_is_clear() {
        use crate::stabilizer::{DetectionStabilizer, StabilizerParams};

        let mut stabilizer = DetectionStabilizer::new(StabilizerParams::default());
        let mut scorer = VisitScorer::new(0.01);
        let mut board = Stub::new(50, ScoreLabel::Bull);
        let p = Point2::new(0.5, 0.5);
        for _ in 0..3 {
            stabilizer.push(&[p]);
        }
        let update = scorer.step(&stabilizer, &mut board);
        assert!(update.committed);
        assert_eq!(update.outcome, Some(VisitOutcome::Checkout));

        stabilizer.push(&[]);
        stabilizer.push(&[]);
        let waiting = scorer.step(&stabilizer, &mut board);
        assert!(!waiting.reset);
        assert_eq!(waiting.phase, VisitPhase::AwaitingRemoval);

        stabilizer.push(&[]);
        let cleared = scorer.step(&stabilizer, &mut board);
        assert!(cleared.reset);
        assert_eq!(scorer.phase(), VisitPhase::Accumulating);
        assert!(scorer.visit().darts.is_empty());
        assert_eq!(board.commits.len(), 1);
    }
}
