use crate::error::Result;
use crate::math::tensor::Tensor;

pub struct MseLoss;

impl MseLoss {
    /// Scalar MSE: mean((predicted - expected)²)
    pub fn loss(predicted: &Tensor, expected: &Tensor) -> Result<f64> {
        predicted.ensure_non_empty("mse")?;
        let se = predicted.zip_map(expected, "mse", |a, b| (a - b).powi(2))?;
        Ok(se.mean())
    }

    /// Gradient w.r.t. `predicted`: 2·(predicted - expected) / n
    pub fn derivative(predicted: &Tensor, expected: &Tensor) -> Result<Tensor> {
        predicted.ensure_non_empty("mse")?;
        let n = predicted.len() as f64;
        predicted.zip_map(expected, "mse", |a, b| 2.0 * (a - b) / n)
    }
}
