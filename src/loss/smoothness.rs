use crate::error::{LossError, Result};
use crate::math::tensor::Tensor;

/// Roughness penalty over a single-channel sequence `[batch, 1, L]`.
///
/// A fixed length-2 convolution with kernel `[-1, 1]` and bias `1` gives
/// `d[i] = pred[i+1] - pred[i] + 1` for each adjacent pair; the penalty is
/// `mean(d²)` over all `batch · (L-1)` outputs.
///
/// Because of the bias, a sequence falling by exactly 1 per step
/// (`pred[i+1] - pred[i] == -1`) scores zero, a constant sequence scores 1
/// and a sequence rising by 1 per step scores 4. Trained reference behavior
/// depends on this offset, so it is kept as-is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SmoothnessPenalty;

/// Fixed convolution kernel, applied as `KERNEL[0]·pred[i] + KERNEL[1]·pred[i+1]`.
pub const KERNEL: [f64; 2] = [-1.0, 1.0];
/// Fixed convolution bias.
pub const BIAS: f64 = 1.0;

impl SmoothnessPenalty {
    /// Scalar penalty: mean((pred[i+1] - pred[i] + 1)²)
    pub fn penalty(&self, pred: &Tensor) -> Result<f64> {
        let (batch, len) = Self::dims(pred)?;
        let diffs = Self::differences(pred, batch, len);
        Ok(diffs.iter().map(|d| d * d).sum::<f64>() / diffs.len() as f64)
    }

    /// Gradient w.r.t. `pred`, same `[batch, 1, L]` shape.
    ///
    /// Each position receives `2·d[i-1]·KERNEL[1] + 2·d[i]·KERNEL[0]` from the
    /// (at most two) windows it participates in, divided by the output count.
    pub fn derivative(&self, pred: &Tensor) -> Result<Tensor> {
        let (batch, len) = Self::dims(pred)?;
        let diffs = Self::differences(pred, batch, len);
        let scale = 2.0 / diffs.len() as f64;

        let mut grad = Tensor::zeros(&pred.shape).to_device(pred.device);
        for b in 0..batch {
            let row = &diffs[b * (len - 1)..(b + 1) * (len - 1)];
            for (i, d) in row.iter().enumerate() {
                grad.data[b * len + i] += scale * d * KERNEL[0];
                grad.data[b * len + i + 1] += scale * d * KERNEL[1];
            }
        }
        Ok(grad)
    }

    fn dims(pred: &Tensor) -> Result<(usize, usize)> {
        match pred.shape.as_slice() {
            &[batch, 1, len] if batch > 0 && len >= 2 => Ok((batch, len)),
            _ => Err(LossError::Shape {
                context: "smoothness penalty (needs [batch, 1, L] with L >= 2)",
                expected: vec![pred.shape.first().copied().unwrap_or(0), 1, pred.shape.last().copied().unwrap_or(0)],
                found: pred.shape.clone(),
            }),
        }
    }

    fn differences(pred: &Tensor, batch: usize, len: usize) -> Vec<f64> {
        (0..batch)
            .flat_map(|b| {
                let row = &pred.data[b * len..(b + 1) * len];
                row.windows(2)
                    .map(|w| KERNEL[0] * w[0] + KERNEL[1] * w[1] + BIAS)
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}
