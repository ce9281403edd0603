// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Perturbation directions in parameter space.
//!
//! A direction holds one array per model parameter. Random directions are
//! drawn from a standard normal and then rescaled filter by filter so that
//! each output channel moves proportionally to its own weight norm, which
//! keeps surfaces comparable across layers and across models.

use crate::error::{LandscapeError, LandscapeResult};
use crate::model::WeightSnapshot;
use ndarray::{ArrayD, Axis};
use rand::Rng;
use rand_distr::StandardNormal;

/// Guards the filter rescale against all-zero direction slices.
pub const FILTER_NORM_EPS: f64 = 1e-10;

/// Ordered list of arrays shaped like a model's parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct Direction {
    tensors: Vec<ArrayD<f32>>,
}

impl Direction {
    pub fn new(tensors: Vec<ArrayD<f32>>) -> Self {
        Self { tensors }
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    pub fn tensors(&self) -> &[ArrayD<f32>] {
        &self.tensors
    }

    pub fn into_tensors(self) -> Vec<ArrayD<f32>> {
        self.tensors
    }

    /// Elementwise negation.
    pub fn negated(&self) -> Direction {
        Direction::new(self.tensors.iter().map(|t| t.mapv(|v| -v)).collect())
    }

    /// Fails with `ShapeMismatch` unless every entry matches `weights`.
    pub fn check_against(&self, weights: &WeightSnapshot, context: &str) -> LandscapeResult<()> {
        check_shapes(self.tensors(), weights.tensors(), context)
    }
}

fn check_shapes(left: &[ArrayD<f32>], right: &[ArrayD<f32>], context: &str) -> LandscapeResult<()> {
    if left.len() != right.len() {
        return Err(LandscapeError::shape(
            format!("{context} (tensor count)"),
            &[right.len()],
            &[left.len()],
        ));
    }
    for (idx, (l, r)) in left.iter().zip(right).enumerate() {
        if l.shape() != r.shape() {
            return Err(LandscapeError::shape(
                format!("{context} (tensor {idx})"),
                r.shape(),
                l.shape(),
            ));
        }
    }
    Ok(())
}

/// Samples a standard-normal tensor for every weight, then filter-normalises
/// it against the weights.
pub fn random_direction<R: Rng + ?Sized>(weights: &WeightSnapshot, rng: &mut R) -> Direction {
    let raw = weights
        .tensors()
        .iter()
        .map(|w| {
            ArrayD::from_shape_simple_fn(w.raw_dim(), || rng.sample::<f32, _>(StandardNormal))
        })
        .collect();
    // Shapes come from the weights themselves, so normalisation cannot fail.
    normalize_tensors(raw, weights.tensors())
}

/// `b - a`, tensor by tensor.
pub fn target_direction(a: &WeightSnapshot, b: &WeightSnapshot) -> LandscapeResult<Direction> {
    check_shapes(b.tensors(), a.tensors(), "target direction")?;
    let tensors = a
        .tensors()
        .iter()
        .zip(b.tensors())
        .map(|(wa, wb)| wb - wa)
        .collect();
    Ok(Direction::new(tensors))
}

/// Filter-wise normalisation of `direction` against `weights`.
///
/// Tensors of rank <= 1 (biases, normalisation scalars) are zeroed. For
/// higher ranks every slice along the last axis is rescaled to
/// `|w_f| / (|d_f| + eps)` times itself.
pub fn normalize_direction(direction: &Direction, weights: &WeightSnapshot) -> LandscapeResult<Direction> {
    direction.check_against(weights, "direction normalisation")?;
    Ok(normalize_tensors(direction.tensors.clone(), weights.tensors()))
}

fn normalize_tensors(mut tensors: Vec<ArrayD<f32>>, weights: &[ArrayD<f32>]) -> Direction {
    for (d, w) in tensors.iter_mut().zip(weights) {
        if d.ndim() <= 1 {
            d.fill(0.0);
        } else {
            normalize_filters(d, w);
        }
    }
    Direction::new(tensors)
}

fn normalize_filters(direction: &mut ArrayD<f32>, weights: &ArrayD<f32>) {
    let filter_axis = Axis(direction.ndim() - 1);
    for (mut d, w) in direction
        .axis_iter_mut(filter_axis)
        .zip(weights.axis_iter(filter_axis))
    {
        let d_norm = l2_norm(d.iter());
        let w_norm = l2_norm(w.iter());
        let scale = (w_norm / (d_norm + FILTER_NORM_EPS)) as f32;
        d.mapv_inplace(|v| v * scale);
    }
}

fn l2_norm<'a>(values: impl Iterator<Item = &'a f32>) -> f64 {
    values
        .map(|&v| f64::from(v) * f64::from(v))
        .sum::<f64>()
        .sqrt()
}

/// The `x` direction and optional `y` direction of one surface, plus a
/// reference to the model they were generated from.
#[derive(Clone, Debug, PartialEq)]
pub struct DirectionSet {
    pub model: String,
    pub x: Direction,
    pub y: Option<Direction>,
}

impl DirectionSet {
    /// Draws one random direction, or two when `two_dimensional` is set.
    pub fn random<R: Rng + ?Sized>(
        model: impl Into<String>,
        weights: &WeightSnapshot,
        two_dimensional: bool,
        rng: &mut R,
    ) -> Self {
        let x = random_direction(weights, rng);
        let y = two_dimensional.then(|| random_direction(weights, rng));
        Self {
            model: model.into(),
            x,
            y,
        }
    }

    pub fn is_two_dimensional(&self) -> bool {
        self.y.is_some()
    }

    pub fn check_against(&self, weights: &WeightSnapshot) -> LandscapeResult<()> {
        self.x.check_against(weights, "x direction")?;
        if let Some(y) = &self.y {
            y.check_against(weights, "y direction")?;
        }
        Ok(())
    }
}
