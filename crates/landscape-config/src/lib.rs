// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Process-level configuration for loss-landscape runs.
//!
//! Nothing in here is ambient: callers build a [`DeterminismConfig`] and a
//! [`LandscapeConfig`] at start-up and hand them to the surface engine, and
//! binaries opt into structured logging through [`init_tracing`].

pub mod determinism;
pub mod run;
pub mod tracing;

pub use determinism::DeterminismConfig;
pub use run::{AxisRange, ConfigError, DirectionConfig, EvaluationConfig, GridConfig, LandscapeConfig};
pub use tracing::{init_tracing, init_tracing_with, InitError, TracingOptions};
