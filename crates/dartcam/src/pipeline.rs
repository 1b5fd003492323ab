//! Per-frame scoring and the cooperative frame loop around it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dartcam_core::{
    estimate_board_homography, set_log_frame, CalibrationSet, CropWindow, DetectionFrame,
    DetectionLabel, Homography, LandmarkId,
};
use dartcam_scoring::{Scoreboard, Session, VisitUpdate};
use log::{debug, info, warn};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::config::{ConfigError, LoopParams, PipelineConfig};
use crate::publish::{Broadcaster, StatusPayload};

/// A recoverable read failure. The loop backs off and tries again.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("frame read failed: {message}")]
pub struct ReadError {
    message: String,
}

impl ReadError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("frame resolution must be non-zero, got {width}x{height}")]
    InvalidResolution { width: u32, height: u32 },
    #[error("giving up after {failures} consecutive read failures: {last}")]
    SourceExhausted { failures: u32, last: ReadError },
}

/// Camera or recording. `Ok(None)` ends the stream.
pub trait FrameSource {
    type Frame;

    fn next_frame(&mut self) -> Result<Option<Self::Frame>, ReadError>;
}

/// Object detector run on every frame. Keeps no state between frames that
/// the pipeline relies on.
pub trait Detector<F> {
    fn detect(&mut self, frame: &F) -> DetectionFrame;
}

impl<F, T> Detector<F> for T
where
    T: FnMut(&F) -> DetectionFrame,
{
    fn detect(&mut self, frame: &F) -> DetectionFrame {
        self(frame)
    }
}

/// Presentation layer, called once per processed frame.
pub trait FrameSink {
    fn render(&mut self, report: &FrameReport, fps: f64);
}

/// Sink that discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl FrameSink for NullSink {
    fn render(&mut self, _report: &FrameReport, _fps: f64) {}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CalibrationStatus {
    /// Not enough usable landmarks, or they are degenerate.
    Searching { landmarks: usize },
    Calibrated { landmarks: usize },
}

impl CalibrationStatus {
    #[inline]
    pub fn is_calibrated(self) -> bool {
        matches!(self, CalibrationStatus::Calibrated { .. })
    }

    pub fn landmarks(self) -> usize {
        match self {
            CalibrationStatus::Searching { landmarks } | CalibrationStatus::Calibrated { landmarks } => {
                landmarks
            }
        }
    }
}

/// Everything the renderer needs about one frame.
#[derive(Clone, Debug)]
pub struct FrameReport {
    pub frame_index: u64,
    pub status: CalibrationStatus,
    pub crop: CropWindow,
    pub calibration: CalibrationSet,
    /// This frame's homography, or the last good one while searching.
    pub homography: Option<Homography>,
    /// Board-plane dart points fed to the stabilizer this frame.
    pub dart_points: Vec<Point2<f64>>,
    /// `None` when the frame was skipped for calibration.
    pub update: Option<VisitUpdate>,
}

/// Operator input applied between frames.
#[derive(Clone, Debug, PartialEq)]
pub enum ControlCommand {
    /// Crop-space landmark position.
    SetOverride(LandmarkId, Point2<f64>),
    /// Several overrides that must reach the same frame.
    SetOverrides(Vec<(LandmarkId, Point2<f64>)>),
    ClearOverride(LandmarkId),
    /// Discard the current visit without committing it.
    ResetVisit,
    Stop,
}

/// Detections in, visit updates out.
pub struct ScoringPipeline<B> {
    config: PipelineConfig,
    crop: CropWindow,
    session: Session,
    scoreboard: B,
    last_homography: Option<Homography>,
    frame_index: u64,
}

impl<B: Scoreboard> ScoringPipeline<B> {
    pub fn new(
        config: PipelineConfig,
        width: u32,
        height: u32,
        scoreboard: B,
    ) -> Result<Self, PipelineError> {
        if width == 0 || height == 0 {
            return Err(PipelineError::InvalidResolution { width, height });
        }
        config.validate()?;
        let session = Session::new(config.stabilizer.clone()).map_err(ConfigError::from)?;
        Ok(Self {
            crop: CropWindow::centered(width, height),
            config,
            session,
            scoreboard,
            last_homography: None,
            frame_index: 0,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn scoreboard(&self) -> &B {
        &self.scoreboard
    }

    pub fn into_scoreboard(self) -> B {
        self.scoreboard
    }

    pub fn crop(&self) -> &CropWindow {
        &self.crop
    }

    /// Frames processed so far.
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn apply(&mut self, command: ControlCommand) {
        match command {
            ControlCommand::SetOverride(landmark, p) => self.set_override(landmark, p),
            ControlCommand::SetOverrides(overrides) => {
                for (landmark, p) in overrides {
                    self.set_override(landmark, p);
                }
            }
            ControlCommand::ClearOverride(landmark) => {
                self.session.calibrator_mut().clear_override(landmark);
            }
            ControlCommand::ResetVisit => self.session.reset(),
            ControlCommand::Stop => {}
        }
    }

    fn set_override(&mut self, landmark: LandmarkId, p: Point2<f64>) {
        if !(p.x.is_finite() && p.y.is_finite()) {
            warn!("ignoring non-finite override for landmark {landmark}");
            return;
        }
        self.session.calibrator_mut().set_override(landmark, p);
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip_all, fields(frame = self.frame_index))
    )]
    pub fn process(&mut self, frame: &DetectionFrame) -> FrameReport {
        let frame_index = self.frame_index;
        self.frame_index += 1;
        set_log_frame(Some(frame_index));
        let interval = self.config.loop_params.debug_dump_interval;
        if interval > 0 && frame_index % interval == 0 {
            dump_frame(frame_index, frame);
        }

        let calibration = self.session.calibrator().merge_frame(frame, &self.crop);
        let landmarks = calibration.present_count();
        let homography = if calibration.is_usable(self.config.homography.min_landmarks.max(4)) {
            estimate_board_homography(&calibration, &self.config.homography)
                .inspect_err(|err| debug!("no homography: {err}"))
                .ok()
        } else {
            debug!("{landmarks} landmarks, searching");
            None
        };

        let Some(h) = homography else {
            return FrameReport {
                frame_index,
                status: CalibrationStatus::Searching { landmarks },
                crop: self.crop,
                calibration,
                homography: self.last_homography,
                dart_points: Vec::new(),
                update: None,
            };
        };
        self.last_homography = Some(h);

        let dart_points: Vec<Point2<f64>> = frame
            .darts()
            .iter()
            .filter_map(|d| self.crop.adapt_dart(d.position))
            .filter_map(|p| h.apply(p))
            .collect();
        let update = self.session.observe(&dart_points, &mut self.scoreboard);

        FrameReport {
            frame_index,
            status: CalibrationStatus::Calibrated { landmarks },
            crop: self.crop,
            calibration,
            homography: Some(h),
            dart_points,
            update: Some(update),
        }
    }

    pub fn status(&self, report: &FrameReport, fps: f64) -> StatusPayload {
        let visit = self.session.scorer().visit();
        let has_darts = !visit.darts.is_empty();
        StatusPayload {
            frame: report.frame_index,
            calibrated: report.status.is_calibrated(),
            landmarks: report.status.landmarks(),
            phase: visit.phase,
            darts: visit.darts.iter().map(|d| d.label.to_string()).collect(),
            visit_score: has_darts.then_some(visit.score),
            outcome: if has_darts { visit.outcome } else { None },
            player_score: visit
                .thrower_score()
                .unwrap_or_else(|| self.scoreboard.current_player_score()),
            fps,
        }
    }
}

fn dump_frame(frame_index: u64, frame: &DetectionFrame) {
    debug!(
        "frame {frame_index}: {} detections",
        frame.detections.len()
    );
    let best = frame.best_landmarks();
    for landmark in LandmarkId::ALL {
        match best[landmark.index()] {
            Some(d) => debug!(
                "  landmark {landmark:>2} at ({:.4}, {:.4}) conf {:.2}",
                d.position.x, d.position.y, d.confidence
            ),
            None => debug!("  landmark {landmark:>2} missing"),
        }
    }
    for d in frame.detections.iter().filter(|d| d.label == DetectionLabel::Dart) {
        debug!(
            "  dart at ({:.4}, {:.4}) conf {:.2}",
            d.position.x, d.position.y, d.confidence
        );
    }
}

/// Counters for one run of the frame loop.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub frames_processed: u64,
    /// Frames without a usable homography.
    pub frames_searching: u64,
    pub read_failures: u64,
    pub corrections: usize,
    pub visits_committed: u64,
    /// Darts in committed visits.
    pub darts_thrown: u64,
    pub elapsed_secs: f64,
}

impl RunStats {
    pub fn fps(&self) -> f64 {
        if self.elapsed_secs > 0.01 {
            self.frames_processed as f64 / self.elapsed_secs
        } else {
            0.0
        }
    }
}

/// Retry delay before the `failures`-th consecutive retry (1-based).
pub fn retry_delay(params: &LoopParams, failures: u32) -> Duration {
    let shift = failures.saturating_sub(1).min(16);
    let ms = params
        .retry_initial_ms
        .saturating_mul(1u64 << shift)
        .min(params.retry_max_ms);
    Duration::from_millis(ms)
}

/// Sends operator commands into a running loop. Cheap to clone.
#[derive(Clone, Debug)]
pub struct ControlHandle {
    commands: Sender<ControlCommand>,
    stop: Arc<AtomicBool>,
}

impl ControlHandle {
    /// Queue a command for the next frame. Returns `false` once the loop is gone.
    pub fn send(&self, command: ControlCommand) -> bool {
        if command == ControlCommand::Stop {
            self.stop();
            return true;
        }
        self.commands.send(command).is_ok()
    }

    pub fn set_override(&self, landmark: LandmarkId, position: Point2<f64>) -> bool {
        self.send(ControlCommand::SetOverride(landmark, position))
    }

    /// Queue several overrides as one command; no frame sees only some of them.
    pub fn set_overrides(
        &self,
        overrides: impl IntoIterator<Item = (LandmarkId, Point2<f64>)>,
    ) -> bool {
        self.send(ControlCommand::SetOverrides(overrides.into_iter().collect()))
    }

    pub fn clear_override(&self, landmark: LandmarkId) -> bool {
        self.send(ControlCommand::ClearOverride(landmark))
    }

    pub fn reset_visit(&self) -> bool {
        self.send(ControlCommand::ResetVisit)
    }

    /// Ask the loop to end after the current frame.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

/// Single-threaded capture, detect, score loop.
///
/// Commands queued through [`ControlHandle`] are applied together before a
/// frame is processed, so a frame never sees half of an operator's edits.
pub struct FrameLoop<B> {
    pipeline: ScoringPipeline<B>,
    commands: Receiver<ControlCommand>,
    stop: Arc<AtomicBool>,
    broadcaster: Option<Broadcaster>,
}

impl<B: Scoreboard> FrameLoop<B> {
    pub fn new(pipeline: ScoringPipeline<B>) -> (Self, ControlHandle) {
        let (tx, rx) = mpsc::channel();
        let stop = Arc::new(AtomicBool::new(false));
        let handle = ControlHandle {
            commands: tx,
            stop: Arc::clone(&stop),
        };
        let frame_loop = Self {
            pipeline,
            commands: rx,
            stop,
            broadcaster: None,
        };
        (frame_loop, handle)
    }

    pub fn with_broadcaster(mut self, broadcaster: Broadcaster) -> Self {
        self.broadcaster = Some(broadcaster);
        self
    }

    pub fn pipeline(&self) -> &ScoringPipeline<B> {
        &self.pipeline
    }

    pub fn into_pipeline(self) -> ScoringPipeline<B> {
        self.pipeline
    }

    /// Apply queued commands. Returns `true` if a stop was requested.
    fn drain_commands(&mut self) -> bool {
        loop {
            match self.commands.try_recv() {
                Ok(ControlCommand::Stop) => return true,
                Ok(command) => self.pipeline.apply(command),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => return false,
            }
        }
    }

    fn publish(&self, report: &FrameReport, fps: f64) {
        if let Some(broadcaster) = &self.broadcaster {
            broadcaster.publish(&self.pipeline.status(report, fps));
        }
    }

    /// Run until the source ends, a stop is requested, the game is over or
    /// the source keeps failing.
    pub fn run<S, D, K>(
        &mut self,
        source: &mut S,
        detector: &mut D,
        sink: &mut K,
    ) -> Result<RunStats, PipelineError>
    where
        S: FrameSource,
        D: Detector<S::Frame>,
        K: FrameSink,
    {
        let params = self.pipeline.config().loop_params.clone();
        let publish_interval = Duration::from_millis(self.pipeline.config().publish.interval_ms);
        let corrections_before = self.pipeline.session().calibrator().corrections();
        let started = Instant::now();
        let mut stats = RunStats::default();
        let mut consecutive_failures = 0u32;
        let mut last_published: Option<Instant> = None;
        let mut last_report: Option<FrameReport> = None;

        loop {
            if self.stop.load(Ordering::SeqCst) || self.drain_commands() {
                info!("stop requested");
                break;
            }
            if self.pipeline.scoreboard().is_game_over() {
                info!("game over");
                break;
            }

            let frame = match source.next_frame() {
                Ok(Some(frame)) => {
                    consecutive_failures = 0;
                    frame
                }
                Ok(None) => {
                    info!("end of stream");
                    break;
                }
                Err(err) => {
                    stats.read_failures += 1;
                    consecutive_failures += 1;
                    if consecutive_failures > params.max_consecutive_read_failures {
                        return Err(PipelineError::SourceExhausted {
                            failures: consecutive_failures,
                            last: err,
                        });
                    }
                    let delay = retry_delay(&params, consecutive_failures);
                    warn!("{err}; retrying in {} ms", delay.as_millis());
                    std::thread::sleep(delay);
                    continue;
                }
            };

            let detections = detector.detect(&frame);
            let report = self.pipeline.process(&detections);
            stats.frames_processed += 1;
            if !report.status.is_calibrated() {
                stats.frames_searching += 1;
            }
            let event = report.update.as_ref().is_some_and(|u| {
                if u.committed {
                    stats.visits_committed += 1;
                    stats.darts_thrown += self.pipeline.session().scorer().visit().darts.len() as u64;
                }
                u.committed || u.reset || !u.newly_locked.is_empty()
            });

            let elapsed = started.elapsed().as_secs_f64();
            let fps = if elapsed > 0.0 {
                stats.frames_processed as f64 / elapsed
            } else {
                0.0
            };
            sink.render(&report, fps);

            let due = last_published.is_none_or(|t| t.elapsed() >= publish_interval);
            if event || due {
                self.publish(&report, fps);
                last_published = Some(Instant::now());
            }
            last_report = Some(report);
        }

        set_log_frame(None);
        stats.elapsed_secs = started.elapsed().as_secs_f64();
        stats.corrections = self
            .pipeline
            .session()
            .calibrator()
            .corrections()
            .saturating_sub(corrections_before);
        if let Some(report) = &last_report {
            self.publish(report, stats.fps());
        }
        info!(
            "{} frames ({} searching), {} read failures, {} visits, {} darts, {:.1} fps",
            stats.frames_processed,
            stats.frames_searching,
            stats.read_failures,
            stats.visits_committed,
            stats.darts_thrown,
            stats.fps()
        );
        Ok(stats)
    }
}
