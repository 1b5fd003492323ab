//! Recorded detector output, one JSON frame per line.
//!
//! ```text
//! {"detections": [{"label": "20", "x": 0.51, "y": 0.12, "confidence": 0.93},
//!                 {"label": "dart", "x": 0.48, "y": 0.33, "confidence": 0.71}]}
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use dartcam_core::{Detection, DetectionFrame, DetectionLabel};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::pipeline::{Detector, FrameSource, ReadError};

#[derive(thiserror::Error, Debug)]
pub enum ReplayError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct RecordedDetection {
    label: DetectionLabel,
    x: f64,
    y: f64,
    #[serde(default = "full_confidence")]
    confidence: f32,
}

fn full_confidence() -> f32 {
    1.0
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct RecordedFrame {
    #[serde(default)]
    detections: Vec<RecordedDetection>,
}

/// Parse one non-blank line.
pub fn parse_frame(line: &str, line_no: usize) -> Result<DetectionFrame, ReplayError> {
    let record: RecordedFrame = serde_json::from_str(line).map_err(|source| ReplayError::Parse {
        line: line_no,
        source,
    })?;
    Ok(DetectionFrame::new(
        record
            .detections
            .into_iter()
            .map(|d| Detection {
                label: d.label,
                position: Point2::new(d.x, d.y),
                confidence: d.confidence,
            })
            .collect(),
    ))
}

/// Serialize a frame in the replay format.
pub fn format_frame(frame: &DetectionFrame) -> String {
    let record = RecordedFrame {
        detections: frame
            .detections
            .iter()
            .map(|d| RecordedDetection {
                label: d.label,
                x: d.position.x,
                y: d.position.y,
                confidence: d.confidence,
            })
            .collect(),
    };
    // plain data with string labels; serialization cannot fail
    serde_json::to_string(&record).unwrap_or_default()
}

/// Frame source over a JSON-lines recording.
///
/// Blank lines are skipped; a malformed line is a failed read and the loop
/// moves on to the next one.
pub struct ReplaySource<R> {
    lines: std::io::Lines<R>,
    line_no: usize,
}

impl ReplaySource<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ReplayError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| ReplayError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> ReplaySource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
        }
    }

    /// Line number of the last line read, 1-based.
    pub fn line_no(&self) -> usize {
        self.line_no
    }
}

impl<R: BufRead> FrameSource for ReplaySource<R> {
    type Frame = DetectionFrame;

    fn next_frame(&mut self) -> Result<Option<DetectionFrame>, ReadError> {
        loop {
            let Some(line) = self.lines.next() else {
                return Ok(None);
            };
            self.line_no += 1;
            let line = line.map_err(|e| ReadError::new(format!("line {}: {e}", self.line_no)))?;
            if line.trim().is_empty() {
                continue;
            }
            return parse_frame(&line, self.line_no)
                .map(Some)
                .map_err(|e| ReadError::new(e.to_string()));
        }
    }
}

/// Recordings already hold detector output.
#[derive(Clone, Copy, Debug, Default)]
pub struct RecordedDetector;

impl Detector<DetectionFrame> for RecordedDetector {
    fn detect(&mut self, frame: &DetectionFrame) -> DetectionFrame {
        frame.clone()
    }
}
