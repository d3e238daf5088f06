use crate::error::{LossError, Result};
use crate::loss::weight_profile::WeightProfile;
use crate::math::tensor::Tensor;

/// Squared error reweighted per timestep, `mean((pred - target)² · w)`.
///
/// `pred` and `target` are `[batch, L]` or `[batch, L, C, ...]`; the `[L]`
/// weight vector is broadcast along axis 1.
#[derive(Debug, Clone)]
pub struct WeightedMseLoss {
    profile: WeightProfile,
}

impl WeightedMseLoss {
    pub fn new(profile: WeightProfile) -> Self {
        WeightedMseLoss { profile }
    }

    pub fn profile(&self) -> &WeightProfile {
        &self.profile
    }

    pub fn loss(&self, predicted: &Tensor, expected: &Tensor) -> Result<f64> {
        Self::compute(predicted, expected, self.profile.weights())
    }

    pub fn derivative(&self, predicted: &Tensor, expected: &Tensor) -> Result<Tensor> {
        Self::compute_derivative(predicted, expected, self.profile.weights())
    }

    /// Scalar weighted MSE with an explicit `[L]` weight vector.
    pub fn compute(predicted: &Tensor, expected: &Tensor, weights: &Tensor) -> Result<f64> {
        let axis = TimeAxis::of(predicted, expected, weights)?;
        let total: f64 = predicted.data.iter().zip(expected.data.iter()).enumerate()
            .map(|(k, (p, t))| (p - t).powi(2) * weights.data[axis.step(k)])
            .sum();
        Ok(total / predicted.len() as f64)
    }

    /// Gradient w.r.t. `predicted`: 2·w·(predicted - expected) / n
    pub fn compute_derivative(predicted: &Tensor, expected: &Tensor, weights: &Tensor) -> Result<Tensor> {
        let axis = TimeAxis::of(predicted, expected, weights)?;
        let n = predicted.len() as f64;
        let mut grad = predicted.zip_map(expected, "weighted mse", |p, t| 2.0 * (p - t) / n)?;
        for (k, g) in grad.data.iter_mut().enumerate() {
            *g *= weights.data[axis.step(k)];
        }
        Ok(grad)
    }
}

/// Maps a flat element index onto its position along axis 1.
struct TimeAxis {
    len: usize,
    inner: usize,
}

impl TimeAxis {
    fn of(predicted: &Tensor, expected: &Tensor, weights: &Tensor) -> Result<TimeAxis> {
        expected.ensure_shape(&predicted.shape, "weighted mse target")?;
        if predicted.rank() < 2 {
            return Err(LossError::Shape {
                context: "weighted mse (needs [batch, L, ...])",
                expected: vec![predicted.len(), weights.len()],
                found: predicted.shape.clone(),
            });
        }
        predicted.ensure_non_empty("weighted mse")?;
        let len = predicted.shape[1];
        weights.ensure_shape(&[len], "weighted mse weights")?;
        Ok(TimeAxis { len, inner: predicted.shape[2..].iter().product() })
    }

    fn step(&self, flat: usize) -> usize {
        (flat / self.inner) % self.len
    }
}
