use rand::Rng;
use serde::{Serialize, Deserialize};
use std::f64::consts::PI;

use crate::error::{LossError, Result};
use crate::math::device::Device;

/// Dense row-major `f64` tensor.
///
/// Shapes used by the losses: `[batch, L]`, `[batch, L, C]` for predictions and
/// targets, `[batch, 1, L]` for the smoothness filter and `[L]` for weight
/// vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    pub shape: Vec<usize>,
    pub data: Vec<f64>,
    #[serde(default)]
    pub device: Device,
}

impl Tensor {
    pub fn zeros(shape: &[usize]) -> Tensor {
        Tensor {
            shape: shape.to_vec(),
            data: vec![0.0; shape.iter().product()],
            device: Device::Cpu,
        }
    }

    /// Wraps `data` with `shape`; the element count must match.
    pub fn from_vec(shape: Vec<usize>, data: Vec<f64>) -> Result<Tensor> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(LossError::Shape {
                context: "tensor construction",
                expected: shape,
                found: vec![data.len()],
            });
        }
        Ok(Tensor { shape, data, device: Device::Cpu })
    }

    /// Builds a `[rows, cols]` tensor from nested rows, e.g. `[batch, L]`.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Tensor> {
        let cols = rows.first().map_or(0, Vec::len);
        if let Some(bad) = rows.iter().find(|row| row.len() != cols) {
            return Err(LossError::Shape {
                context: "ragged rows",
                expected: vec![cols],
                found: vec![bad.len()],
            });
        }
        let shape = vec![rows.len(), cols];
        Tensor::from_vec(shape, rows.into_iter().flatten().collect())
    }

    /// Uniform samples in [-1, 1).
    pub fn random<R: Rng>(shape: &[usize], rng: &mut R) -> Tensor {
        let mut res = Tensor::zeros(shape);
        for x in res.data.iter_mut() {
            *x = rng.gen::<f64>() * 2.0 - 1.0;
        }
        res
    }

    /// Samples from N(0, 1) with the Box-Muller transform.
    pub fn randn<R: Rng>(shape: &[usize], rng: &mut R) -> Tensor {
        let mut res = Tensor::zeros(shape);
        for x in res.data.iter_mut() {
            // (0, 1] keeps ln() finite.
            let u1: f64 = 1.0 - rng.gen::<f64>();
            let u2: f64 = 1.0 - rng.gen::<f64>();
            *x = (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos();
        }
        res
    }

    /// Retags the tensor with `device`.
    pub fn to_device(mut self, device: Device) -> Tensor {
        self.device = device;
        self
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn map<F>(&self, functor: F) -> Tensor
    where
        F: Fn(f64) -> f64,
    {
        Tensor {
            shape: self.shape.clone(),
            data: self.data.iter().map(|&x| functor(x)).collect(),
            device: self.device,
        }
    }

    /// Element-wise combination of two same-shape tensors.
    pub fn zip_map<F>(&self, other: &Tensor, context: &'static str, functor: F) -> Result<Tensor>
    where
        F: Fn(f64, f64) -> f64,
    {
        other.ensure_shape(&self.shape, context)?;
        Ok(Tensor {
            shape: self.shape.clone(),
            data: self.data.iter().zip(other.data.iter()).map(|(&a, &b)| functor(a, b)).collect(),
            device: self.device,
        })
    }

    pub fn scale(&self, factor: f64) -> Tensor {
        self.map(|x| x * factor)
    }

    /// Mean over every element; `NaN` for an empty tensor.
    pub fn mean(&self) -> f64 {
        self.data.iter().sum::<f64>() / self.data.len() as f64
    }

    pub fn reshape(mut self, shape: Vec<usize>) -> Result<Tensor> {
        if shape.iter().product::<usize>() != self.data.len() {
            return Err(LossError::Shape {
                context: "reshape",
                expected: shape,
                found: self.shape,
            });
        }
        self.shape = shape;
        Ok(self)
    }

    /// Inserts a length-1 axis at `axis`.
    pub fn unsqueeze(self, axis: usize) -> Result<Tensor> {
        if axis > self.rank() {
            return Err(LossError::Shape {
                context: "unsqueeze",
                expected: vec![axis],
                found: self.shape,
            });
        }
        let mut shape = self.shape.clone();
        shape.insert(axis, 1);
        self.reshape(shape)
    }

    pub fn ensure_shape(&self, expected: &[usize], context: &'static str) -> Result<()> {
        if self.shape != expected {
            return Err(LossError::Shape {
                context,
                expected: expected.to_vec(),
                found: self.shape.clone(),
            });
        }
        Ok(())
    }

    /// Rejects tensors with no elements, e.g. a `[0, L]` batch.
    pub fn ensure_non_empty(&self, context: &'static str) -> Result<()> {
        if self.is_empty() {
            return Err(LossError::Shape {
                context,
                expected: vec![1],
                found: self.shape.clone(),
            });
        }
        Ok(())
    }

    pub fn ensure_device(&self, expected: Device) -> Result<()> {
        if self.device != expected {
            return Err(LossError::DeviceMismatch { expected, found: self.device });
        }
        Ok(())
    }
}

impl Default for Tensor {
    fn default() -> Self {
        Tensor { shape: vec![0], data: vec![], device: Device::Cpu }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_from_rows_shape() {
        let t = Tensor::from_rows(vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]).unwrap();
        assert_eq!(t.shape, vec![2, 3]);
        assert_eq!(t.data, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_from_rows_ragged_is_shape_error() {
        let err = Tensor::from_rows(vec![vec![1.0, 2.0], vec![3.0]]).unwrap_err();
        assert!(err.is_shape());
    }

    #[test]
    fn test_from_vec_count_mismatch() {
        assert!(Tensor::from_vec(vec![2, 2], vec![1.0; 3]).is_err());
    }

    #[test]
    fn test_unsqueeze_and_reshape() {
        let t = Tensor::zeros(&[3, 5]).unsqueeze(1).unwrap();
        assert_eq!(t.shape, vec![3, 1, 5]);
        let t = t.reshape(vec![15]).unwrap();
        assert_eq!(t.shape, vec![15]);
        assert!(t.reshape(vec![4, 4]).is_err());
    }

    #[test]
    fn test_zip_map_checks_shape() {
        let a = Tensor::zeros(&[2, 3]);
        let b = Tensor::zeros(&[3, 2]);
        assert!(a.zip_map(&b, "test", |x, y| x + y).is_err());
    }

    #[test]
    fn test_ensure_non_empty() {
        assert!(Tensor::zeros(&[2, 3]).ensure_non_empty("test").is_ok());
        assert!(Tensor::zeros(&[0, 3]).ensure_non_empty("test").unwrap_err().is_shape());
        assert!(Tensor::zeros(&[2, 0, 3]).ensure_non_empty("test").is_err());
    }

    #[test]
    fn test_ensure_device() {
        let t = Tensor::zeros(&[1]).to_device(Device::Cuda(0));
        assert!(t.ensure_device(Device::Cuda(0)).is_ok());
        assert!(matches!(
            t.ensure_device(Device::Cpu),
            Err(LossError::DeviceMismatch { .. })
        ));
    }

    #[test]
    fn test_seeded_random_is_reproducible() {
        let a = Tensor::randn(&[4, 4], &mut StdRng::seed_from_u64(7));
        let b = Tensor::randn(&[4, 4], &mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);
        assert!(a.data.iter().all(|x| x.is_finite()));
        let u = Tensor::random(&[64], &mut StdRng::seed_from_u64(1));
        assert!(u.data.iter().all(|&x| (-1.0..1.0).contains(&x)));
    }
}
