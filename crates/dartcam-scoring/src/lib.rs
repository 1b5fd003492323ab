//! Dart confirmation and visit scoring.
//!
//! Board-plane dart observations flow through three stages:
//!
//! 1. [`DetectionStabilizer`] keeps the last few frames of observations and
//!    votes: a dart is real once it has been sighted in enough frames.
//! 2. [`VisitScorer`] locks confirmed darts into the current visit, asks the
//!    [`Scoreboard`] what they are worth and decides, exactly once per visit,
//!    when the visit is final.
//! 3. After a final visit the scorer waits for the board to be cleared and
//!    the [`Session`] resets all per-turn state for the next player.
//!
//! [`Calibrator`] holds operator overrides for landmark positions and merges
//! them over the detector's landmarks every frame.

mod calibration;
mod score;
mod scoreboard;
mod session;
mod stabilizer;
mod visit;

pub use calibration::Calibrator;
pub use score::{classify_remaining, ParseScoreLabelError, ScoreLabel, VisitOutcome};
pub use scoreboard::{GameError, GameParams, Player, Scoreboard, VisitRecord, X01Scoreboard};
pub use session::Session;
pub use stabilizer::{
    cluster_observations, ConfirmedDart, DetectionStabilizer, PredictionHistory, StabilizerParams,
    StabilizerParamsError,
};
pub use visit::{LockedDart, Visit, VisitPhase, VisitScorer, VisitUpdate, MAX_DARTS_PER_VISIT};
