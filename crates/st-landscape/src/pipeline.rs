// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! End-to-end driver: draw directions, store them, set up the surface
//! file and crunch it.

use crate::direction::DirectionSet;
use crate::error::LandscapeResult;
use crate::evaluator::{CrunchOptions, CrunchReport, FieldKeys, SurfaceEvaluator};
use crate::grid::SurfaceGrid;
use crate::model::{EvalSet, SurfaceModel};
use crate::store::DirectionStore;
use crate::surface::{OpenMode, SurfaceFile};
use landscape_config::{DeterminismConfig, LandscapeConfig};
use std::path::{Path, PathBuf};
use tracing::info;

/// Label the direction RNG stream is derived from.
pub const DIRECTION_RNG_LABEL: &str = "landscape.directions";

/// Files produced by one pipeline run.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineOutput {
    pub directions: PathBuf,
    pub surface: PathBuf,
    pub report: CrunchReport,
}

/// Direction and surface paths for `model_name` under `output_dir`:
/// `<model>_<1D|2D>.bin` and `<model>_<1D|2D>_surface.bin`.
pub fn output_paths(output_dir: &Path, model_name: &str, two_dimensional: bool) -> (PathBuf, PathBuf) {
    let kind = if two_dimensional { "2D" } else { "1D" };
    let stem = format!("{model_name}_{kind}");
    (
        output_dir.join(format!("{stem}.bin")),
        output_dir.join(format!("{stem}_surface.bin")),
    )
}

/// Runs the whole flow for `model`. An existing direction file is reused
/// and the surface file is resumed, so a repeated call only evaluates the
/// points an earlier run left pending.
pub fn run<M: SurfaceModel + ?Sized>(
    config: &LandscapeConfig,
    determinism: &DeterminismConfig,
    model: &mut M,
    model_name: &str,
    data: &EvalSet,
    output_dir: &Path,
) -> LandscapeResult<PipelineOutput> {
    config.validate()?;
    let grid = SurfaceGrid::from_config(&config.grid)?;
    let two_dimensional = grid.is_two_dimensional();
    let (dir_path, surf_path) = output_paths(output_dir, model_name, two_dimensional);

    let weights = model.snapshot()?;
    if !dir_path.exists() {
        let mut rng = determinism.rng_from_optional(config.directions.seed, DIRECTION_RNG_LABEL);
        let directions = DirectionSet::random(model_name, &weights, two_dimensional, &mut rng);
        let mut store = DirectionStore::create(&dir_path, model_name);
        store.write_set(&directions);
        store.save()?;
        info!(directions = %dir_path.display(), two_dimensional, "direction file created");
    }

    let directions = DirectionStore::open(&dir_path)?.read_set()?;
    let mut surface = SurfaceFile::create(
        &surf_path,
        dir_path.to_string_lossy(),
        grid,
        OpenMode::Resume,
    )?;
    let mut evaluator = SurfaceEvaluator::new(weights, directions)?;
    let report = evaluator.crunch(
        &mut surface,
        model,
        data,
        &FieldKeys::from(&config.evaluation),
        CrunchOptions::from(&config.evaluation),
    )?;
    evaluator.restore_weights(model)?;

    Ok(PipelineOutput {
        directions: dir_path,
        surface: surf_path,
        report,
    })
}
