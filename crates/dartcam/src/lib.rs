//! Camera-based dart scoring.
//!
//! This crate ties the workspace together:
//! - re-exports of the geometry (`dartcam::core`) and scoring
//!   (`dartcam::scoring`) crates
//! - [`pipeline`]: detections in, visit decisions out, plus the cooperative
//!   frame loop with operator commands and bounded read retries
//! - [`publish`]: best-effort status broadcast to observers
//! - [`replay`]: JSON-lines recordings of detector output as a frame source
//!
//! ## Quickstart
//!
//! ```no_run
//! use dartcam::pipeline::{FrameLoop, NullSink, ScoringPipeline};
//! use dartcam::replay::{RecordedDetector, ReplaySource};
//! use dartcam::scoring::X01Scoreboard;
//! use dartcam::PipelineConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PipelineConfig::default();
//! let board = X01Scoreboard::new(&config.game)?;
//! let pipeline = ScoringPipeline::new(config, 1280, 720, board)?;
//! let (mut frame_loop, _control) = FrameLoop::new(pipeline);
//!
//! let mut source = ReplaySource::open("throws.jsonl")?;
//! let stats = frame_loop.run(&mut source, &mut RecordedDetector, &mut NullSink)?;
//! println!("{} frames, {} visits", stats.frames_processed, stats.visits_committed);
//! # Ok(())
//! # }
//! ```

pub use dartcam_core as core;
pub use dartcam_scoring as scoring;

pub mod config;
pub mod pipeline;
pub mod publish;
pub mod replay;

pub use config::{ConfigError, LoopParams, PipelineConfig, PublishParams};
pub use dartcam_core::{CalibrationSet, DetectionFrame, Homography, LandmarkId};
pub use dartcam_scoring::{ScoreLabel, Scoreboard, VisitOutcome, VisitPhase, X01Scoreboard};
pub use pipeline::{
    CalibrationStatus, ControlCommand, ControlHandle, FrameLoop, FrameReport, PipelineError,
    RunStats, ScoringPipeline,
};
