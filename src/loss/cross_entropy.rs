use crate::error::{LossError, Result};
use crate::math::tensor::Tensor;

/// Categorical cross-entropy over raw logits.
///
/// Axis 1 is the class axis: `[batch, C]` or `[batch, C, d1, ...]`. The target
/// has the same shape and holds class probabilities (one-hot or soft). The
/// loss is averaged over every position except the class axis.
pub struct CrossEntropyLoss;

impl CrossEntropyLoss {
    /// L = mean over positions of -sum_c(expected_c * log_softmax(predicted)_c)
    pub fn loss(predicted: &Tensor, expected: &Tensor) -> Result<f64> {
        let layout = ClassLayout::of(predicted, expected)?;
        let mut total = 0.0;
        for (n, j) in layout.positions() {
            let logits = layout.gather(predicted, n, j);
            let lse = log_sum_exp(&logits);
            total += logits.iter().enumerate()
                .map(|(c, z)| -layout.at(expected, n, c, j) * (z - lse))
                .sum::<f64>();
        }
        Ok(total / layout.count() as f64)
    }

    /// Gradient w.r.t. the logits: (softmax(z)·sum(t) - t) / positions.
    ///
    /// For a proper target distribution this reduces to the familiar
    /// `softmax(z) - t`, scaled by the mean reduction.
    pub fn derivative(predicted: &Tensor, expected: &Tensor) -> Result<Tensor> {
        let layout = ClassLayout::of(predicted, expected)?;
        let scale = 1.0 / layout.count() as f64;
        let mut grad = Tensor::zeros(&predicted.shape).to_device(predicted.device);
        for (n, j) in layout.positions() {
            let logits = layout.gather(predicted, n, j);
            let lse = log_sum_exp(&logits);
            let mass: f64 = (0..layout.classes).map(|c| layout.at(expected, n, c, j)).sum();
            for (c, z) in logits.iter().enumerate() {
                let p = (z - lse).exp();
                let idx = layout.index(n, c, j);
                grad.data[idx] = (p * mass - expected.data[idx]) * scale;
            }
        }
        Ok(grad)
    }
}

struct ClassLayout {
    batch: usize,
    classes: usize,
    inner: usize,
}

impl ClassLayout {
    fn of(predicted: &Tensor, expected: &Tensor) -> Result<ClassLayout> {
        expected.ensure_shape(&predicted.shape, "cross entropy")?;
        if predicted.rank() < 2 || predicted.shape[1] == 0 {
            return Err(LossError::Shape {
                context: "cross entropy (needs [batch, classes, ...])",
                expected: vec![predicted.shape.first().copied().unwrap_or(0), 1],
                found: predicted.shape.clone(),
            });
        }
        predicted.ensure_non_empty("cross entropy")?;
        Ok(ClassLayout {
            batch: predicted.shape[0],
            classes: predicted.shape[1],
            inner: predicted.shape[2..].iter().product(),
        })
    }

    fn count(&self) -> usize {
        self.batch * self.inner
    }

    fn positions(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.batch).flat_map(move |n| (0..self.inner).map(move |j| (n, j)))
    }

    fn index(&self, n: usize, c: usize, j: usize) -> usize {
        (n * self.classes + c) * self.inner + j
    }

    fn at(&self, t: &Tensor, n: usize, c: usize, j: usize) -> f64 {
        t.data[self.index(n, c, j)]
    }

    fn gather(&self, t: &Tensor, n: usize, j: usize) -> Vec<f64> {
        (0..self.classes).map(|c| self.at(t, n, c, j)).collect()
    }
}

/// Numerically stable log(sum(exp(z))).
fn log_sum_exp(z: &[f64]) -> f64 {
    let max = z.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    max + z.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_uniform_logits() {
        let pred = Tensor::from_rows(vec![vec![0.0, 0.0, 0.0, 0.0]]).unwrap();
        let target = Tensor::from_rows(vec![vec![0.0, 1.0, 0.0, 0.0]]).unwrap();
        assert_relative_eq!(CrossEntropyLoss::loss(&pred, &target).unwrap(), 4.0_f64.ln(), epsilon = 1e-12);
    }

    #[test]
    fn test_confident_correct_prediction_is_near_zero() {
        let pred = Tensor::from_rows(vec![vec![50.0, 0.0], vec![0.0, 50.0]]).unwrap();
        let target = Tensor::from_rows(vec![vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
        assert!(CrossEntropyLoss::loss(&pred, &target).unwrap() < 1e-12);
    }

    #[test]
    fn test_derivative_is_softmax_minus_target() {
        let pred = Tensor::from_rows(vec![vec![0.0, 0.0]]).unwrap();
        let target = Tensor::from_rows(vec![vec![1.0, 0.0]]).unwrap();
        let grad = CrossEntropyLoss::derivative(&pred, &target).unwrap();
        assert_relative_eq!(grad.data[0], -0.5, epsilon = 1e-12);
        assert_relative_eq!(grad.data[1], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_class_axis_is_axis_one() {
        // [batch=1, classes=2, positions=2]; position 0 favors class 0, position 1 class 1.
        let pred = Tensor::from_vec(vec![1, 2, 2], vec![9.0, 0.0, 0.0, 9.0]).unwrap();
        let target = Tensor::from_vec(vec![1, 2, 2], vec![1.0, 0.0, 0.0, 1.0]).unwrap();
        assert!(CrossEntropyLoss::loss(&pred, &target).unwrap() < 1e-3);
    }

    #[test]
    fn test_empty_batch_rejected() {
        let empty = Tensor::zeros(&[0, 4]);
        assert!(CrossEntropyLoss::loss(&empty, &empty).unwrap_err().is_shape());
        assert!(CrossEntropyLoss::derivative(&empty, &empty).unwrap_err().is_shape());
        // No positions besides the class axis.
        let no_positions = Tensor::zeros(&[2, 3, 0]);
        assert!(CrossEntropyLoss::loss(&no_positions, &no_positions).is_err());
    }

    #[test]
    fn test_rank_one_rejected() {
        let pred = Tensor::zeros(&[4]);
        assert!(CrossEntropyLoss::loss(&pred, &pred.clone()).unwrap_err().is_shape());
    }
}
