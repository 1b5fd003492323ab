//! Pipeline configuration, loadable from JSON.

use std::path::{Path, PathBuf};

use dartcam_core::HomographyParams;
use dartcam_scoring::{GameError, GameParams, StabilizerParams, StabilizerParamsError};
use serde::{Deserialize, Serialize};

/// Frame loop policy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopParams {
    /// Consecutive failed reads tolerated before the loop gives up.
    pub max_consecutive_read_failures: u32,
    /// First retry delay after a failed read; doubles per failure.
    pub retry_initial_ms: u64,
    /// Upper bound on the retry delay.
    pub retry_max_ms: u64,
    /// Frames between debug dumps of the raw detections. 0 disables.
    pub debug_dump_interval: u64,
}

impl Default for LoopParams {
    fn default() -> Self {
        Self {
            max_consecutive_read_failures: 30,
            retry_initial_ms: 10,
            retry_max_ms: 1000,
            debug_dump_interval: 30,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishParams {
    /// Minimum time between periodic status payloads. Visit events are
    /// always published.
    pub interval_ms: u64,
    /// Payloads queued per observer before new ones are dropped for it.
    pub max_pending: usize,
}

impl Default for PublishParams {
    fn default() -> Self {
        Self {
            interval_ms: 200,
            max_pending: 64,
        }
    }
}

/// Everything the pipeline and the CLI need.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub stabilizer: StabilizerParams,
    pub homography: HomographyParams,
    #[serde(rename = "loop")]
    pub loop_params: LoopParams,
    pub publish: PublishParams,
    pub game: GameParams,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error(transparent)]
    Stabilizer(#[from] StabilizerParamsError),
    #[error(transparent)]
    Game(#[from] GameError),
    #[error("collinearity_tolerance must be finite and non-negative, got {0}")]
    InvalidTolerance(f64),
    #[error("retry_initial_ms ({initial}) exceeds retry_max_ms ({max})")]
    InvalidRetry { initial: u64, max: u64 },
    #[error("publish.max_pending must be at least 1")]
    EmptyPublishQueue,
}

impl PipelineConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.stabilizer.validate()?;
        self.game.validate()?;
        let tol = self.homography.collinearity_tolerance;
        if !tol.is_finite() || tol < 0.0 {
            return Err(ConfigError::InvalidTolerance(tol));
        }
        if self.loop_params.retry_initial_ms > self.loop_params.retry_max_ms {
            return Err(ConfigError::InvalidRetry {
                initial: self.loop_params.retry_initial_ms,
                max: self.loop_params.retry_max_ms,
            });
        }
        if self.publish.max_pending == 0 {
            return Err(ConfigError::EmptyPublishQueue);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = PipelineConfig::from_json(
            r#"{"stabilizer": {"repeat_threshold": 2}, "loop": {"retry_initial_ms": 0},
                "game": {"players": ["Ann"], "starting_score": 301}}"#,
        )
        .unwrap();
        assert_eq!(config.stabilizer.repeat_threshold, 2);
        assert_eq!(config.stabilizer.depth, 5);
        assert_eq!(config.loop_params.retry_initial_ms, 0);
        assert_eq!(config.loop_params.max_consecutive_read_failures, 30);
        assert_eq!(config.game.players, vec!["Ann".to_string()]);
        assert_eq!(config.game.starting_score, 301);
    }

    #[test]
    fn invalid_sections_are_reported() {
        let err = PipelineConfig::from_json(r#"{"homography": {"collinearity_tolerance": -1.0}}"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTolerance(_)));

        let err = PipelineConfig::from_json(r#"{"game": {"players": []}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Game(GameError::NoPlayers)));

        let err = PipelineConfig::from_json(r#"{"stabilizer": {"depth": 2}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Stabilizer(_)));

        assert!(matches!(
            PipelineConfig::from_json("{not json").unwrap_err(),
            ConfigError::Parse(_)
        ));
    }

    #[test]
    fn missing_file() {
        let err = PipelineConfig::load("/nonexistent/dartcam.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn publish_queue_needs_room() {
        let err = PipelineConfig::from_json(r#"{"publish": {"max_pending": 0}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyPublishQueue));
        let config = PipelineConfig::from_json(r#"{"publish": {"interval_ms": 50}}"#).unwrap();
        assert_eq!(config.publish.max_pending, 64);
    }
}
