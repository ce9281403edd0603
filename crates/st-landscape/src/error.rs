// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use std::path::PathBuf;
use thiserror::Error;

/// Root error type for direction generation, surface persistence,
/// evaluation and metrics.
#[derive(Debug, Error)]
pub enum LandscapeError {
    /// Two tensor lists (direction/weights, snapshot/snapshot, field/grid)
    /// disagree in length or per-index shape.
    #[error("shape mismatch in {context}: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        context: String,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    /// The requested direction axis is not stored.
    #[error("direction axis {label:?} is missing from the direction store")]
    MissingAxis { label: String },

    /// A surface file already exists where a fresh one was requested.
    #[error("surface file {} already exists; open it in resume mode instead", path.display())]
    AlreadyExists { path: PathBuf },

    /// Sharpness needs a unique centre point.
    #[error("grid of shape ({rows}, {cols}) has no unique centre; both axes must have an odd number of points")]
    EvenGrid { rows: usize, cols: usize },

    /// A metric was requested on a field the surface file does not hold.
    #[error("{name} is not in surface file: {}", path.display())]
    UnknownField { name: String, path: PathBuf },

    /// A coordinate axis could not be built from the requested range.
    #[error("invalid coordinate axis: {reason}")]
    InvalidAxis { reason: String },

    /// A resumed surface file was built on different coordinates.
    #[error("surface file {} was created with a different {axis} axis", path.display())]
    GridMismatch { path: PathBuf, axis: &'static str },

    /// A field cannot be used for the requested computation.
    #[error("field {name} cannot be used: {reason}")]
    InvalidField { name: String, reason: String },

    /// The model under evaluation failed.
    #[error("model evaluation failed: {message}")]
    Model { message: String },

    /// Wrapper around I/O failures while persisting or restoring files.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The run configuration was rejected.
    #[error(transparent)]
    Config(#[from] landscape_config::ConfigError),

    /// Wrapper around serde failures.
    #[error("serialization error: {message}")]
    Serialization { message: String },
}

pub type LandscapeResult<T> = Result<T, LandscapeError>;

impl LandscapeError {
    pub(crate) fn shape(context: impl Into<String>, expected: &[usize], got: &[usize]) -> Self {
        LandscapeError::ShapeMismatch {
            context: context.into(),
            expected: expected.to_vec(),
            got: got.to_vec(),
        }
    }

    /// Convenience for model implementations reporting their own failures.
    pub fn model(message: impl ToString) -> Self {
        LandscapeError::Model {
            message: message.to_string(),
        }
    }
}
