// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Grid evaluation ("crunch").
//!
//! Every pending grid point is evaluated at `base + cx·x (+ cy·y)`, never
//! by accumulating onto the previous point. Completed values are flushed
//! to the surface file every `checkpoint_every` points, so an interrupted
//! run resumes by rescanning the sentinel entries.

use crate::direction::DirectionSet;
use crate::error::{LandscapeError, LandscapeResult};
use crate::model::{EvalSet, SurfaceModel, WeightSnapshot};
use crate::store::Y_AXIS;
use crate::surface::{SurfaceFile, SENTINEL};
use landscape_config::EvaluationConfig;
use ndarray::ArrayD;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Names of the loss and accuracy fields a crunch fills.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldKeys {
    pub loss: String,
    pub acc: String,
}

impl FieldKeys {
    pub fn new(loss: impl Into<String>, acc: impl Into<String>) -> Self {
        Self {
            loss: loss.into(),
            acc: acc.into(),
        }
    }

    /// Both fields live in the same surface, so the names must differ.
    pub fn validate(&self) -> LandscapeResult<()> {
        if self.loss == self.acc {
            return Err(LandscapeError::InvalidField {
                name: self.loss.clone(),
                reason: "loss and accuracy keys must differ".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for FieldKeys {
    fn default() -> Self {
        Self::new("train_loss", "train_acc")
    }
}

impl From<&EvaluationConfig> for FieldKeys {
    fn from(config: &EvaluationConfig) -> Self {
        Self::new(config.loss_key.clone(), config.acc_key.clone())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CrunchOptions {
    pub batch_size: usize,
    /// Points between two flushes; zero behaves like one.
    pub checkpoint_every: usize,
}

impl Default for CrunchOptions {
    fn default() -> Self {
        Self {
            batch_size: 128,
            checkpoint_every: 1,
        }
    }
}

impl From<&EvaluationConfig> for CrunchOptions {
    fn from(config: &EvaluationConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            checkpoint_every: config.checkpoint_every,
        }
    }
}

/// Outcome of one crunch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CrunchReport {
    pub evaluated: usize,
    pub skipped: usize,
    pub elapsed: Duration,
}

/// Owns the baseline weights, the directions and a scratch parameter
/// buffer that is rebuilt from the baseline at every grid point.
#[derive(Debug)]
pub struct SurfaceEvaluator {
    base: WeightSnapshot,
    directions: DirectionSet,
    buffer: Vec<ArrayD<f32>>,
}

impl SurfaceEvaluator {
    pub fn new(base: WeightSnapshot, directions: DirectionSet) -> LandscapeResult<Self> {
        directions.check_against(&base)?;
        let buffer = base.tensors().to_vec();
        Ok(Self {
            base,
            directions,
            buffer,
        })
    }

    pub fn base(&self) -> &WeightSnapshot {
        &self.base
    }

    pub fn directions(&self) -> &DirectionSet {
        &self.directions
    }

    /// Fills every pending point of the `keys` fields of `surface`.
    pub fn crunch<M: SurfaceModel + ?Sized>(
        &mut self,
        surface: &mut SurfaceFile,
        model: &mut M,
        data: &EvalSet,
        keys: &FieldKeys,
        options: CrunchOptions,
    ) -> LandscapeResult<CrunchReport> {
        keys.validate()?;
        if surface.grid().is_two_dimensional() && self.directions.y.is_none() {
            return Err(LandscapeError::MissingAxis {
                label: Y_AXIS.to_string(),
            });
        }
        surface.ensure_field(&keys.loss)?;
        surface.ensure_field(&keys.acc)?;

        let started = Instant::now();
        let every = options.checkpoint_every.max(1);
        let points: Vec<_> = surface.grid().points().collect();
        info!(
            surface = %surface.path().display(),
            points = points.len(),
            loss = %keys.loss,
            acc = %keys.acc,
            "crunch started"
        );

        let mut evaluated = 0usize;
        let mut skipped = 0usize;
        let mut unflushed = 0usize;
        for point in &points {
            let index = point.index.as_slice();
            let loss_done = surface.field(&keys.loss)?[index] != SENTINEL;
            let acc_done = surface.field(&keys.acc)?[index] != SENTINEL;
            if loss_done && acc_done {
                skipped += 1;
                continue;
            }

            self.displace(point.x, point.y);
            let evaluation = model
                .load_weights(&self.buffer)
                .and_then(|()| model.evaluate(data, options.batch_size));
            let evaluation = match evaluation {
                Ok(evaluation) => evaluation,
                Err(err) => return Err(abort(surface, unflushed, err)),
            };
            for (name, value) in [(&keys.loss, evaluation.loss), (&keys.acc, evaluation.accuracy)] {
                if !surface.can_store(value) {
                    let err = LandscapeError::InvalidField {
                        name: name.clone(),
                        reason: format!(
                            "value {value} at {:?} cannot be stored in JSON surface {}",
                            point.index,
                            surface.path().display()
                        ),
                    };
                    return Err(abort(surface, unflushed, err));
                }
            }

            surface.field_mut(&keys.loss)?[index] = evaluation.loss;
            surface.field_mut(&keys.acc)?[index] = evaluation.accuracy;
            evaluated += 1;
            unflushed += 1;
            debug!(
                index = ?point.index,
                x = point.x,
                y = ?point.y,
                loss = evaluation.loss,
                acc = evaluation.accuracy,
                "grid point evaluated"
            );

            if unflushed >= every {
                surface.flush()?;
                unflushed = 0;
            }
        }
        surface.flush()?;

        let report = CrunchReport {
            evaluated,
            skipped,
            elapsed: started.elapsed(),
        };
        info!(
            evaluated,
            skipped,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "crunch finished"
        );
        Ok(report)
    }

    /// Loads the baseline weights back into `model`.
    pub fn restore_weights<M: SurfaceModel + ?Sized>(&self, model: &mut M) -> LandscapeResult<()> {
        model.load_weights(self.base.tensors())
    }

    fn displace(&mut self, cx: f64, cy: Option<f64>) {
        for (k, buffer) in self.buffer.iter_mut().enumerate() {
            buffer.assign(&self.base.tensors()[k]);
            buffer.scaled_add(cx as f32, &self.directions.x.tensors()[k]);
            if let (Some(cy), Some(y)) = (cy, &self.directions.y) {
                buffer.scaled_add(cy as f32, &y.tensors()[k]);
            }
        }
    }
}

/// Checkpoints the points completed so far and hands `err` back.
fn abort(surface: &SurfaceFile, unflushed: usize, err: LandscapeError) -> LandscapeError {
    if unflushed > 0 {
        if let Err(flush_err) = surface.flush() {
            warn!(error = %flush_err, "failed to checkpoint before aborting");
        }
    }
    err
}
