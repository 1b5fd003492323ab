#![cfg(feature = "cli")]

use std::io::Write;

use assert_cmd::Command;
use dartcam::core::{Detection, DetectionLabel};
use dartcam::replay::format_frame;
use dartcam::{DetectionFrame, LandmarkId};
use nalgebra::Point2;
use predicates::prelude::*;
use tempfile::NamedTempFile;

/// Square frames so frame coordinates equal board coordinates.
fn recording(dart: Option<Point2<f64>>, frames: usize) -> NamedTempFile {
    let mut detections: Vec<Detection> = LandmarkId::ALL
        .iter()
        .map(|&l| Detection {
            label: DetectionLabel::Landmark(l),
            position: l.canonical_position(),
            confidence: 0.9,
        })
        .collect();
    if let Some(p) = dart {
        detections.push(Detection {
            label: DetectionLabel::Dart,
            position: p,
            confidence: 0.8,
        });
    }
    let line = format_frame(&DetectionFrame::new(detections));

    let mut file = NamedTempFile::new().unwrap();
    for _ in 0..frames {
        writeln!(file, "{line}").unwrap();
        writeln!(file).unwrap();
    }
    file.flush().unwrap();
    file
}

fn dartcam() -> Command {
    Command::cargo_bin("dartcam").unwrap()
}

#[test]
fn bull_checkout_wins() {
    let file = recording(Some(Point2::new(0.5, 0.5)), 5);
    dartcam()
        .args(["replay", "--width", "640", "--height", "640"])
        .arg(file.path())
        .args(["--players", "Ann", "Bob", "--start", "50"])
        .assert()
        .success()
        .stdout(predicate::str::contains("visits: 1"))
        .stdout(predicate::str::contains("Ann: 0 (1 darts)"))
        .stdout(predicate::str::contains("Bob: 50 (0 darts)"))
        .stdout(predicate::str::contains("winner: Ann"));
}

#[test]
fn status_payloads_are_printed() {
    let file = recording(Some(Point2::new(0.5, 0.3)), 3);
    dartcam()
        .args(["replay", "--width", "640", "--height", "640", "--status"])
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""phase":"accumulating""#))
        .stdout(predicate::str::contains(r#""calibrated":true"#));
}

#[test]
fn malformed_lines_are_skipped() {
    let mut file = recording(None, 2);
    writeln!(file, "not json").unwrap();
    file.flush().unwrap();
    dartcam()
        .args(["replay", "--width", "640", "--height", "640"])
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("frames: 2 (0 searching)"));
}

#[test]
fn config_file_is_applied() {
    let file = recording(None, 1);
    let mut config = NamedTempFile::new().unwrap();
    write!(config, r#"{{"game": {{"players": ["Zed"], "starting_score": 301}}}}"#).unwrap();
    config.flush().unwrap();
    dartcam()
        .arg("replay")
        .arg(file.path())
        .arg("--config")
        .arg(config.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Zed: 301 (0 darts)"));
}

#[test]
fn missing_recording_fails() {
    dartcam()
        .args(["replay", "/nonexistent/throws.jsonl"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to open"));
}

#[test]
fn invalid_config_fails() {
    let file = recording(None, 1);
    let mut config = NamedTempFile::new().unwrap();
    write!(config, r#"{{"stabilizer": {{"repeat_threshold": 9}}}}"#).unwrap();
    config.flush().unwrap();
    dartcam()
        .arg("replay")
        .arg(file.path())
        .arg("--config")
        .arg(config.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("repeat_threshold"));
}
