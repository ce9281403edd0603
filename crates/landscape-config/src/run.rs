// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while loading or validating a [`LandscapeConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field holds a value outside its admissible range.
    #[error("invalid landscape config: {0}")]
    Invalid(String),
    /// The JSON document could not be parsed.
    #[error("failed to parse landscape config: {0}")]
    Parse(#[from] serde_json::Error),
    /// The config file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Inclusive range sampled with `num` evenly spaced points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisRange {
    pub min: f64,
    pub max: f64,
    pub num: usize,
}

impl AxisRange {
    pub fn new(min: f64, max: f64, num: usize) -> Self {
        Self { min, max, num }
    }

    fn validate(&self, label: &str) -> Result<(), ConfigError> {
        if !self.min.is_finite() || !self.max.is_finite() {
            return Err(ConfigError::Invalid(format!(
                "{label} range must be finite, got [{}, {}]",
                self.min, self.max
            )));
        }
        if self.min >= self.max {
            return Err(ConfigError::Invalid(format!(
                "{label} range must satisfy min < max, got [{}, {}]",
                self.min, self.max
            )));
        }
        if self.num < 2 {
            return Err(ConfigError::Invalid(format!(
                "{label} axis needs at least 2 points, got {}",
                self.num
            )));
        }
        Ok(())
    }
}

impl Default for AxisRange {
    fn default() -> Self {
        Self::new(-1.0, 1.0, 51)
    }
}

/// Coordinate grid of the surface. A `y` range makes the surface 2D.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub x: AxisRange,
    pub y: Option<AxisRange>,
}

impl GridConfig {
    pub fn is_two_dimensional(&self) -> bool {
        self.y.is_some()
    }
}

/// Parameters of the crunch loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Batch size used when the model evaluates the dataset.
    pub batch_size: usize,
    /// Number of grid points between two checkpoints of the surface file.
    pub checkpoint_every: usize,
    /// Field that receives the loss values.
    pub loss_key: String,
    /// Field that receives the accuracy values.
    pub acc_key: String,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            batch_size: 128,
            checkpoint_every: 1,
            loss_key: "train_loss".to_string(),
            acc_key: "train_acc".to_string(),
        }
    }
}

/// Direction sampling options.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectionConfig {
    /// Explicit seed for the direction RNG. Falls back to the process
    /// determinism settings when absent.
    pub seed: Option<u64>,
}

/// Full description of one landscape run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LandscapeConfig {
    pub grid: GridConfig,
    pub evaluation: EvaluationConfig,
    pub directions: DirectionConfig,
}

impl LandscapeConfig {
    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.grid.x.validate("x")?;
        if let Some(y) = &self.grid.y {
            y.validate("y")?;
        }
        let eval = &self.evaluation;
        if eval.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be >= 1".to_string()));
        }
        if eval.checkpoint_every == 0 {
            return Err(ConfigError::Invalid(
                "checkpoint_every must be >= 1".to_string(),
            ));
        }
        if eval.loss_key.trim().is_empty() || eval.acc_key.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "loss_key and acc_key must be non-empty".to_string(),
            ));
        }
        if eval.loss_key == eval.acc_key {
            return Err(ConfigError::Invalid(format!(
                "loss_key and acc_key must differ, both are {:?}",
                eval.loss_key
            )));
        }
        Ok(())
    }

    /// Parses and validates a JSON document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid_and_one_dimensional() {
        let config = LandscapeConfig::default();
        config.validate().unwrap();
        assert!(!config.grid.is_two_dimensional());
        assert_eq!(config.grid.x.num, 51);
        assert_eq!(config.evaluation.batch_size, 128);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = LandscapeConfig::from_json(
            r#"{ "grid": { "y": { "min": -0.2, "max": 0.2, "num": 41 } },
                 "evaluation": { "loss_key": "test_loss", "acc_key": "test_acc" } }"#,
        )
        .unwrap();
        assert!(config.grid.is_two_dimensional());
        assert_eq!(config.grid.x, AxisRange::default());
        assert_eq!(config.grid.y.unwrap().num, 41);
        assert_eq!(config.evaluation.checkpoint_every, 1);
        assert_eq!(config.evaluation.loss_key, "test_loss");
    }

    #[test]
    fn rejects_degenerate_axes() {
        let mut config = LandscapeConfig::default();
        config.grid.x.num = 1;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = LandscapeConfig::default();
        config.grid.y = Some(AxisRange::new(1.0, -1.0, 5));
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_colliding_field_keys() {
        let mut config = LandscapeConfig::default();
        config.evaluation.acc_key = config.evaluation.loss_key.clone();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("must differ"));
    }

    #[test]
    fn json_roundtrip_and_file_loading() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("landscape.json");
        let mut config = LandscapeConfig::default();
        config.directions.seed = Some(123);
        config.evaluation.batch_size = 32;
        std::fs::write(&path, config.to_json().unwrap()).unwrap();
        assert_eq!(LandscapeConfig::from_path(&path).unwrap(), config);

        let missing = LandscapeConfig::from_path(dir.path().join("absent.json"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }
}
