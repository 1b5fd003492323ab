use dartcam_core::in_unit_square;
use log::{debug, info};
use nalgebra::Point2;

use crate::calibration::Calibrator;
use crate::scoreboard::Scoreboard;
use crate::stabilizer::{DetectionStabilizer, StabilizerParams, StabilizerParamsError};
use crate::visit::{VisitPhase, VisitScorer, VisitUpdate};

/// All per-turn mutable state in one place.
///
/// A reset after the board is cleared drops the locked darts, the
/// prediction history and the operator overrides together.
#[derive(Clone, Debug)]
pub struct Session {
    calibrator: Calibrator,
    stabilizer: DetectionStabilizer,
    scorer: VisitScorer,
    visits_completed: usize,
}

impl Session {
    pub fn new(params: StabilizerParams) -> Result<Self, StabilizerParamsError> {
        params.validate()?;
        let scorer = VisitScorer::new(params.cluster_epsilon);
        Ok(Self {
            calibrator: Calibrator::new(),
            stabilizer: DetectionStabilizer::new(params),
            scorer,
            visits_completed: 0,
        })
    }

    pub fn calibrator(&self) -> &Calibrator {
        &self.calibrator
    }

    pub fn calibrator_mut(&mut self) -> &mut Calibrator {
        &mut self.calibrator
    }

    pub fn stabilizer(&self) -> &DetectionStabilizer {
        &self.stabilizer
    }

    pub fn scorer(&self) -> &VisitScorer {
        &self.scorer
    }

    #[inline]
    pub fn phase(&self) -> VisitPhase {
        self.scorer.phase()
    }

    /// Visits reset after the board was cleared.
    pub fn visits_completed(&self) -> usize {
        self.visits_completed
    }

    /// Feed one calibrated frame of board-plane dart points, most confident
    /// first. Points off the board square are dropped.
    pub fn observe<S: Scoreboard + ?Sized>(
        &mut self,
        observations: &[Point2<f64>],
        scoreboard: &mut S,
    ) -> VisitUpdate {
        let on_board: Vec<Point2<f64>> = observations
            .iter()
            .copied()
            .filter(|&p| in_unit_square(p))
            .collect();
        if on_board.len() < observations.len() {
            debug!(
                "{} dart point(s) outside the board square",
                observations.len() - on_board.len()
            );
        }
        self.stabilizer.push(&on_board);

        let update = self.scorer.step(&self.stabilizer, scoreboard);
        if update.reset {
            self.clear_turn_state();
            self.visits_completed += 1;
        }
        update
    }

    /// Operator-forced reset of the current visit. Nothing is committed.
    pub fn reset(&mut self) {
        info!("visit reset");
        self.scorer.reset();
        self.clear_turn_state();
    }

    fn clear_turn_state(&mut self) {
        self.stabilizer.clear();
        self.calibrator.clear_overrides();
    }
}
