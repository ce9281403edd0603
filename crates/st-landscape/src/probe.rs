// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::error::{LandscapeError, LandscapeResult};
use crate::model::{EvalSet, Evaluation, Parameter, SurfaceModel};
use ndarray::{Array1, ArrayD, ArrayView2, Axis, Ix1, Ix2, IxDyn};
use rand::Rng;
use rand_distr::StandardNormal;

/// Probabilities are clamped to this floor before taking the log.
pub const PROBABILITY_EPSILON: f64 = 1e-9;

/// Softmax linear classifier `softmax(x·W + b)` scored with categorical
/// cross entropy.
#[derive(Clone, Debug)]
pub struct SoftmaxProbe {
    weight: Parameter,
    bias: Parameter,
}

impl SoftmaxProbe {
    /// Creates a probe with deterministic small weights and zero bias.
    pub fn new(name: impl Into<String>, features: usize, classes: usize) -> LandscapeResult<Self> {
        check_dims(features, classes)?;
        let name = name.into();
        let mut scale = 0.01f32;
        let weight = ArrayD::from_shape_simple_fn(IxDyn(&[features, classes]), || {
            let value = scale;
            scale += 0.01;
            value
        });
        Ok(Self::assemble(&name, weight, ArrayD::zeros(IxDyn(&[classes]))))
    }

    /// Creates a probe with `N(0, 0.1²)` weights and zero bias.
    pub fn random<R: Rng + ?Sized>(
        name: impl Into<String>,
        features: usize,
        classes: usize,
        rng: &mut R,
    ) -> LandscapeResult<Self> {
        check_dims(features, classes)?;
        let name = name.into();
        let weight = ArrayD::from_shape_simple_fn(IxDyn(&[features, classes]), || {
            0.1 * rng.sample::<f32, _>(StandardNormal)
        });
        Ok(Self::assemble(&name, weight, ArrayD::zeros(IxDyn(&[classes]))))
    }

    /// Rebuilds a probe from a `(features, classes)` weight followed by a
    /// `(classes,)` bias, as written by [`crate::io::save_state`].
    pub fn from_parameters(parameters: Vec<Parameter>) -> LandscapeResult<Self> {
        let [weight, bias]: [Parameter; 2] = parameters.try_into().map_err(|rest: Vec<Parameter>| {
            LandscapeError::shape("probe parameter count", &[2], &[rest.len()])
        })?;
        match (weight.shape(), bias.shape()) {
            ([_, classes], [bias_classes]) if classes == bias_classes && *classes > 0 => {}
            (w, b) => {
                return Err(LandscapeError::Model {
                    message: format!("probe needs a 2D weight and a matching bias, got {w:?} and {b:?}"),
                })
            }
        }
        Ok(Self { weight, bias })
    }

    fn assemble(name: &str, weight: ArrayD<f32>, bias: ArrayD<f32>) -> Self {
        Self {
            weight: Parameter::new(format!("{name}::weight"), weight),
            bias: Parameter::new(format!("{name}::bias"), bias),
        }
    }

    pub fn features(&self) -> usize {
        self.weight.shape()[0]
    }

    pub fn classes(&self) -> usize {
        self.weight.shape()[1]
    }

    pub fn weight(&self) -> &Parameter {
        &self.weight
    }

    pub fn bias(&self) -> &Parameter {
        &self.bias
    }

    /// Per-sample negative log-likelihood summed over the batch, and the
    /// number of correct argmax predictions.
    fn score_batch(&self, inputs: ArrayView2<'_, f32>, labels: &[usize]) -> LandscapeResult<(f64, usize)> {
        let weight = self
            .weight
            .value()
            .view()
            .into_dimensionality::<Ix2>()
            .map_err(LandscapeError::model)?;
        let bias = self
            .bias
            .value()
            .view()
            .into_dimensionality::<Ix1>()
            .map_err(LandscapeError::model)?;
        let logits = inputs.dot(&weight) + &bias;

        let mut nll = 0.0f64;
        let mut correct = 0usize;
        for (row, &label) in logits.axis_iter(Axis(0)).zip(labels) {
            if label >= row.len() {
                return Err(LandscapeError::model(format!(
                    "label {label} out of range for {} classes",
                    row.len()
                )));
            }
            let row: Array1<f64> = row.mapv(f64::from);
            let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let exp = row.mapv(|v| (v - max).exp());
            let total = exp.sum();
            let p = (exp[label] / total).clamp(PROBABILITY_EPSILON, 1.0);
            nll -= p.ln();
            // First maximum wins ties.
            let predicted = row
                .iter()
                .enumerate()
                .fold((0usize, f64::NEG_INFINITY), |best, (idx, &v)| if v > best.1 { (idx, v) } else { best })
                .0;
            if predicted == label {
                correct += 1;
            }
        }
        Ok((nll, correct))
    }
}

fn check_dims(features: usize, classes: usize) -> LandscapeResult<()> {
    if features == 0 || classes == 0 {
        return Err(LandscapeError::model(format!(
            "probe dimensions must be positive, got ({features}, {classes})"
        )));
    }
    Ok(())
}

impl SurfaceModel for SoftmaxProbe {
    fn visit_parameters(
        &self,
        visitor: &mut dyn FnMut(&Parameter) -> LandscapeResult<()>,
    ) -> LandscapeResult<()> {
        visitor(&self.weight)?;
        visitor(&self.bias)
    }

    fn visit_parameters_mut(
        &mut self,
        visitor: &mut dyn FnMut(&mut Parameter) -> LandscapeResult<()>,
    ) -> LandscapeResult<()> {
        visitor(&mut self.weight)?;
        visitor(&mut self.bias)
    }

    fn evaluate(&mut self, data: &EvalSet, batch_size: usize) -> LandscapeResult<Evaluation> {
        if data.features() != self.features() {
            return Err(LandscapeError::shape(
                "probe input features",
                &[self.features()],
                &[data.features()],
            ));
        }
        if data.is_empty() {
            return Err(LandscapeError::model("empty evaluation set"));
        }
        let mut nll = 0.0f64;
        let mut correct = 0usize;
        for (inputs, labels) in data.batches(batch_size) {
            let (batch_nll, batch_correct) = self.score_batch(inputs, labels)?;
            nll += batch_nll;
            correct += batch_correct;
        }
        let total = data.len() as f64;
        Ok(Evaluation {
            loss: nll / total,
            accuracy: correct as f64 / total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{array, Array2};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn data() -> EvalSet {
        EvalSet::new(array![[1.0f32, 0.0], [0.0, 1.0], [1.0, 1.0]], vec![0, 1, 1]).unwrap()
    }

    #[test]
    fn zero_weights_give_uniform_predictions() {
        let mut probe = SoftmaxProbe::new("probe", 2, 4).unwrap();
        let zeros = vec![ArrayD::zeros(IxDyn(&[2, 4])), ArrayD::zeros(IxDyn(&[4]))];
        probe.load_weights(&zeros).unwrap();
        let eval = probe.evaluate(&data(), 2).unwrap();
        assert_relative_eq!(eval.loss, 4.0f64.ln(), epsilon = 1e-9);
        // Every row predicts class 0 on ties.
        assert_relative_eq!(eval.accuracy, 1.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn batch_size_does_not_change_the_result() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut probe = SoftmaxProbe::random("probe", 2, 3, &mut rng).unwrap();
        let whole = probe.evaluate(&data(), 128).unwrap();
        let single = probe.evaluate(&data(), 1).unwrap();
        assert_relative_eq!(whole.loss, single.loss, epsilon = 1e-12);
        assert_eq!(whole.accuracy, single.accuracy);
    }

    #[test]
    fn confident_probe_scores_perfectly() {
        let mut probe = SoftmaxProbe::new("probe", 2, 2).unwrap();
        let weight = ArrayD::from_shape_vec(IxDyn(&[2, 2]), vec![10.0, -10.0, -10.0, 30.0]).unwrap();
        probe.load_weights(&[weight, ArrayD::zeros(IxDyn(&[2]))]).unwrap();
        let eval = probe.evaluate(&data(), 8).unwrap();
        assert_eq!(eval.accuracy, 1.0);
        assert!(eval.loss < 1e-6);
    }

    #[test]
    fn feature_mismatch_and_bad_labels_fail() {
        let mut probe = SoftmaxProbe::new("probe", 3, 2).unwrap();
        assert!(matches!(
            probe.evaluate(&data(), 4),
            Err(LandscapeError::ShapeMismatch { .. })
        ));

        let mut narrow = SoftmaxProbe::new("probe", 2, 1).unwrap();
        assert!(matches!(
            narrow.evaluate(&data(), 4),
            Err(LandscapeError::Model { .. })
        ));
    }

    #[test]
    fn empty_evaluation_set_is_an_error() {
        let mut model = SoftmaxProbe::new("linear", 2, 2).unwrap();
        let empty = EvalSet::new(Array2::zeros((0, 2)), Vec::new()).unwrap();
        let err = model.evaluate(&empty, 4).unwrap_err();
        assert!(matches!(err, LandscapeError::Model { .. }));
        assert_eq!(err.to_string(), LandscapeError::model("empty evaluation set").to_string());
    }

    #[test]
    fn parameters_round_trip_through_from_parameters() {
        let probe = SoftmaxProbe::new("probe", 2, 3).unwrap();
        let params = vec![probe.weight().clone(), probe.bias().clone()];
        let rebuilt = SoftmaxProbe::from_parameters(params).unwrap();
        assert_eq!(rebuilt.features(), 2);
        assert_eq!(rebuilt.classes(), 3);
        assert_eq!(rebuilt.weight().name(), "probe::weight");

        let err = SoftmaxProbe::from_parameters(vec![probe.bias().clone()]).unwrap_err();
        assert!(matches!(err, LandscapeError::ShapeMismatch { .. }));
    }
}
