// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::error::{LandscapeError, LandscapeResult};
use ndarray::{s, Array2, ArrayD, ArrayView2};

/// Named parameter tensor owned by a model. Its shape is fixed at
/// construction; only values are ever overwritten.
#[derive(Clone, Debug, PartialEq)]
pub struct Parameter {
    name: String,
    value: ArrayD<f32>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: ArrayD<f32>) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &ArrayD<f32> {
        &self.value
    }

    pub fn shape(&self) -> &[usize] {
        self.value.shape()
    }

    /// Overwrites the values in place. The incoming tensor must have the
    /// parameter's shape.
    pub fn load_value(&mut self, value: &ArrayD<f32>) -> LandscapeResult<()> {
        if self.value.shape() != value.shape() {
            return Err(LandscapeError::shape(
                format!("parameter {}", self.name),
                self.value.shape(),
                value.shape(),
            ));
        }
        self.value.assign(value);
        Ok(())
    }
}

/// Loss and accuracy of a model over an evaluation set.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Evaluation {
    pub loss: f64,
    pub accuracy: f64,
}

/// Fixed evaluation data: one row of features per sample and its class.
#[derive(Clone, Debug)]
pub struct EvalSet {
    inputs: Array2<f32>,
    labels: Vec<usize>,
}

impl EvalSet {
    pub fn new(inputs: Array2<f32>, labels: Vec<usize>) -> LandscapeResult<Self> {
        if inputs.nrows() != labels.len() {
            return Err(LandscapeError::shape(
                "evaluation labels",
                &[inputs.nrows()],
                &[labels.len()],
            ));
        }
        Ok(Self { inputs, labels })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn features(&self) -> usize {
        self.inputs.ncols()
    }

    pub fn inputs(&self) -> &Array2<f32> {
        &self.inputs
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Iterates over consecutive batches of at most `batch_size` samples.
    /// A zero batch size is treated as one.
    pub fn batches(&self, batch_size: usize) -> impl Iterator<Item = (ArrayView2<'_, f32>, &[usize])> {
        let step = batch_size.max(1);
        (0..self.len()).step_by(step).map(move |start| {
            let end = (start + step).min(self.len());
            (
                self.inputs.slice(s![start..end, ..]),
                &self.labels[start..end],
            )
        })
    }
}

/// Contract the surface engine expects from a trained model.
///
/// Parameters must be visited in the same order on every call; that order
/// is the canonical index of snapshots and directions.
pub trait SurfaceModel {
    /// Visits immutable parameters in canonical order.
    fn visit_parameters(
        &self,
        visitor: &mut dyn FnMut(&Parameter) -> LandscapeResult<()>,
    ) -> LandscapeResult<()>;

    /// Visits mutable parameters in canonical order.
    fn visit_parameters_mut(
        &mut self,
        visitor: &mut dyn FnMut(&mut Parameter) -> LandscapeResult<()>,
    ) -> LandscapeResult<()>;

    /// Mean loss and accuracy over `data`, processed `batch_size` samples
    /// at a time.
    fn evaluate(&mut self, data: &EvalSet, batch_size: usize) -> LandscapeResult<Evaluation>;

    /// Copies the current parameters.
    fn snapshot(&self) -> LandscapeResult<WeightSnapshot> {
        let mut names = Vec::new();
        let mut tensors = Vec::new();
        self.visit_parameters(&mut |param| {
            names.push(param.name().to_string());
            tensors.push(param.value().clone());
            Ok(())
        })?;
        Ok(WeightSnapshot { names, tensors })
    }

    /// Overwrites every parameter, in canonical order, with `weights`.
    fn load_weights(&mut self, weights: &[ArrayD<f32>]) -> LandscapeResult<()> {
        let mut index = 0usize;
        self.visit_parameters_mut(&mut |param| {
            let Some(value) = weights.get(index) else {
                return Err(LandscapeError::shape(
                    "weight list",
                    &[index + 1],
                    &[weights.len()],
                ));
            };
            index += 1;
            param.load_value(value)
        })?;
        if index != weights.len() {
            return Err(LandscapeError::shape("weight list", &[index], &[weights.len()]));
        }
        Ok(())
    }
}

/// Immutable ordered copy of a model's parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct WeightSnapshot {
    names: Vec<String>,
    tensors: Vec<ArrayD<f32>>,
}

impl WeightSnapshot {
    /// Builds a snapshot from explicit tensors; names default to their index.
    pub fn from_tensors(tensors: Vec<ArrayD<f32>>) -> Self {
        let names = (0..tensors.len()).map(|idx| format!("param{idx}")).collect();
        Self { names, tensors }
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn tensors(&self) -> &[ArrayD<f32>] {
        &self.tensors
    }

    pub fn shapes(&self) -> Vec<Vec<usize>> {
        self.tensors.iter().map(|t| t.shape().to_vec()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, IxDyn};

    struct Pair {
        kernel: Parameter,
        bias: Parameter,
    }

    impl SurfaceModel for Pair {
        fn visit_parameters(
            &self,
            visitor: &mut dyn FnMut(&Parameter) -> LandscapeResult<()>,
        ) -> LandscapeResult<()> {
            visitor(&self.kernel)?;
            visitor(&self.bias)
        }

        fn visit_parameters_mut(
            &mut self,
            visitor: &mut dyn FnMut(&mut Parameter) -> LandscapeResult<()>,
        ) -> LandscapeResult<()> {
            visitor(&mut self.kernel)?;
            visitor(&mut self.bias)
        }

        fn evaluate(&mut self, _data: &EvalSet, _batch_size: usize) -> LandscapeResult<Evaluation> {
            Ok(Evaluation {
                loss: 0.0,
                accuracy: 1.0,
            })
        }
    }

    fn pair() -> Pair {
        Pair {
            kernel: Parameter::new("kernel", ArrayD::zeros(IxDyn(&[2, 3]))),
            bias: Parameter::new("bias", ArrayD::zeros(IxDyn(&[3]))),
        }
    }

    #[test]
    fn snapshot_preserves_visit_order() {
        let snapshot = pair().snapshot().unwrap();
        assert_eq!(snapshot.names(), ["kernel", "bias"]);
        assert_eq!(snapshot.shapes(), vec![vec![2, 3], vec![3]]);
    }

    #[test]
    fn load_weights_checks_count_and_shape() {
        let mut model = pair();
        let kernel = ArrayD::from_elem(IxDyn(&[2, 3]), 1.5f32);
        let bias = ArrayD::from_elem(IxDyn(&[3]), -0.5f32);
        model.load_weights(&[kernel.clone(), bias.clone()]).unwrap();
        assert_eq!(model.kernel.value(), &kernel);
        assert_eq!(model.bias.value(), &bias);

        let short = model.load_weights(&[kernel.clone()]);
        assert!(matches!(short, Err(LandscapeError::ShapeMismatch { .. })));

        let wrong = ArrayD::zeros(IxDyn(&[3, 2]));
        let err = model.load_weights(&[wrong, bias]).unwrap_err();
        assert!(err.to_string().contains("parameter kernel"));
    }

    #[test]
    fn eval_set_batches_cover_every_sample() {
        let inputs = array![[0.0f32, 1.0], [2.0, 3.0], [4.0, 5.0]];
        let data = EvalSet::new(inputs, vec![0, 1, 0]).unwrap();
        let sizes: Vec<usize> = data.batches(2).map(|(x, y)| {
            assert_eq!(x.nrows(), y.len());
            y.len()
        })
        .collect();
        assert_eq!(sizes, vec![2, 1]);
        assert_eq!(data.batches(0).count(), 3);

        let mismatched = EvalSet::new(array![[0.0f32]], vec![0, 1]);
        assert!(mismatched.is_err());
    }
}
