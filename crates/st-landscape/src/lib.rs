// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Loss-landscape exploration for SpiralTorch models.
//!
//! A model's parameters are perturbed along one or two filter-normalised
//! directions, loss and accuracy are sampled on a coordinate grid into a
//! resumable surface file, and curvature diagnostics are derived from the
//! resulting fields.
//!
//! ```text
//! snapshot ─▶ DirectionSet ─▶ DirectionStore
//!                  │
//!                  ▼
//! SurfaceGrid ─▶ SurfaceFile ◀─ SurfaceEvaluator::crunch ─▶ metrics
//! ```

pub mod direction;
pub mod error;
pub mod evaluator;
pub mod grid;
pub mod io;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod probe;
pub mod store;
pub mod surface;

pub use direction::{normalize_direction, random_direction, target_direction, Direction, DirectionSet};
pub use error::{LandscapeError, LandscapeResult};
pub use evaluator::{CrunchOptions, CrunchReport, FieldKeys, SurfaceEvaluator};
pub use grid::{CoordinateAxis, GridPoint, SurfaceGrid};
pub use io::{load_state, read_parameters, save_state};
pub use metrics::{
    apply_angle, apply_curvature, apply_zero_shift, curvature, evaluate_sharpness, gradient,
    normal_angle, sharpness, zero_shift, SharpnessReport,
};
pub use model::{EvalSet, Evaluation, Parameter, SurfaceModel, WeightSnapshot};
pub use probe::SoftmaxProbe;
pub use store::{DirectionStore, X_AXIS, Y_AXIS};
pub use surface::{OpenMode, SurfaceFile, SENTINEL};
