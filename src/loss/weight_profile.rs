use serde::{Serialize, Deserialize};
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use crate::error::{LossError, Result};
use crate::math::device::Device;
use crate::math::tensor::Tensor;

/// Shape of the per-timestep weighting curve.
///
/// - `Gaussian` — left half of a normal density peaking at the final timestep,
///   lifted by a constant floor so early timesteps keep a non-zero weight.
/// - `Last`     — all weight on the final timestep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightType {
    Gaussian,
    Last,
}

impl FromStr for WeightType {
    type Err = LossError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "gaussian" => Ok(WeightType::Gaussian),
            "last" => Ok(WeightType::Last),
            other => Err(LossError::UnknownWeightType(other.to_string())),
        }
    }
}

impl fmt::Display for WeightType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WeightType::Gaussian => write!(f, "gaussian"),
            WeightType::Last => write!(f, "last"),
        }
    }
}

/// Parameters a `WeightMSE` criterion builds its profile from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfileParams {
    pub seq_length: usize,
    pub weight_type: WeightType,
    pub sigma_factor: f64,
    pub tail_fraction: f64,
}

impl ProfileParams {
    pub fn build(&self, device: Device) -> Result<WeightProfile> {
        WeightProfile::build(self.seq_length, self.weight_type, self.sigma_factor, self.tail_fraction, device)
    }
}

/// Relative tolerance for the `sum(weights) == L` invariant.
const SUM_TOLERANCE: f64 = 1e-9;

/// Immutable per-timestep weight vector of length `seq_length`, normalized to
/// sum to `seq_length` so a weighted mean keeps the scale of a plain mean.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightProfile {
    weight_type: WeightType,
    weights: Tensor,
}

impl WeightProfile {
    /// Builds the profile on `device`.
    ///
    /// For `Gaussian` the density has standard deviation
    /// `seq_length / sigma_factor` and mean `seq_length`, evaluated at
    /// positions `1..=seq_length`; `max / tail_fraction` is added before
    /// renormalizing. `Last` ignores both parameters.
    ///
    /// Fails with `InvalidConfig` for a zero length or non-positive Gaussian
    /// parameters, and with `NumericDegeneracy` if the resulting curve is not
    /// finite or (for `Gaussian`) not strictly positive.
    pub fn build(
        seq_length: usize,
        weight_type: WeightType,
        sigma_factor: f64,
        tail_fraction: f64,
        device: Device,
    ) -> Result<WeightProfile> {
        if seq_length == 0 {
            return Err(LossError::InvalidConfig("seq_length must be positive".to_string()));
        }

        let values = match weight_type {
            WeightType::Gaussian => gaussian_curve(seq_length, sigma_factor, tail_fraction)?,
            WeightType::Last => {
                let mut y = vec![0.0; seq_length];
                y[seq_length - 1] = seq_length as f64;
                y
            }
        };

        check_degeneracy(&values, weight_type)?;

        let weights = Tensor::from_vec(vec![seq_length], values)?.to_device(device);
        Ok(WeightProfile { weight_type, weights })
    }

    pub fn weight_type(&self) -> WeightType {
        self.weight_type
    }

    pub fn seq_length(&self) -> usize {
        self.weights.len()
    }

    pub fn device(&self) -> Device {
        self.weights.device
    }

    /// The weight curve as a `[L]` tensor.
    pub fn weights(&self) -> &Tensor {
        &self.weights
    }

    /// The weight curve as plain values, e.g. for plotting.
    pub fn values(&self) -> &[f64] {
        &self.weights.data
    }
}

fn gaussian_curve(seq_length: usize, sigma_factor: f64, tail_fraction: f64) -> Result<Vec<f64>> {
    if !(sigma_factor.is_finite() && sigma_factor > 0.0) {
        return Err(LossError::InvalidConfig(format!(
            "sigma_factor must be positive and finite, got {sigma_factor}"
        )));
    }
    if !(tail_fraction.is_finite() && tail_fraction > 0.0) {
        return Err(LossError::InvalidConfig(format!(
            "tail_fraction must be positive and finite, got {tail_fraction}"
        )));
    }

    let n = seq_length as f64;
    let sigma = n / sigma_factor;
    let mu = n;

    let mut y: Vec<f64> = (1..=seq_length)
        .map(|i| normal_pdf(i as f64, mu, sigma))
        .collect();

    let peak = y.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let floor = peak / tail_fraction;
    y.iter_mut().for_each(|v| *v += floor);

    let total: f64 = y.iter().sum();
    y.iter_mut().for_each(|v| *v = *v / total * n);
    Ok(y)
}

fn normal_pdf(x: f64, mu: f64, sigma: f64) -> f64 {
    let z = (x - mu) / sigma;
    (-0.5 * z * z).exp() / (sigma * (2.0 * PI).sqrt())
}

fn check_degeneracy(values: &[f64], weight_type: WeightType) -> Result<()> {
    if let Some((i, w)) = values.iter().enumerate().find(|(_, w)| !w.is_finite()) {
        return Err(LossError::NumericDegeneracy(format!(
            "{weight_type} weight at position {i} is {w}"
        )));
    }
    if weight_type == WeightType::Gaussian {
        if let Some((i, w)) = values.iter().enumerate().find(|(_, w)| **w <= 0.0) {
            return Err(LossError::NumericDegeneracy(format!(
                "gaussian weight at position {i} is non-positive ({w})"
            )));
        }
    }
    let n = values.len() as f64;
    let total: f64 = values.iter().sum();
    if (total - n).abs() > SUM_TOLERANCE * n {
        return Err(LossError::NumericDegeneracy(format!(
            "{weight_type} weights sum to {total}, expected {n}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn gaussian(seq_length: usize, sigma_factor: f64, tail_fraction: f64) -> Result<WeightProfile> {
        WeightProfile::build(seq_length, WeightType::Gaussian, sigma_factor, tail_fraction, Device::Cpu)
    }

    #[test]
    fn test_last_profile() {
        let profile = WeightProfile::build(4, WeightType::Last, 10.0, 15.0, Device::Cpu).unwrap();
        assert_eq!(profile.values(), &[0.0, 0.0, 0.0, 4.0]);
        assert_eq!(profile.weights().shape, vec![4]);
    }

    #[test]
    fn test_last_profile_ignores_gaussian_parameters() {
        let profile = WeightProfile::build(3, WeightType::Last, -1.0, 0.0, Device::Cpu).unwrap();
        assert_eq!(profile.values(), &[0.0, 0.0, 3.0]);
    }

    #[test]
    fn test_gaussian_default_parameters() {
        let profile = gaussian(40, 10.0, 15.0).unwrap();
        let values = profile.values();
        assert_relative_eq!(values.iter().sum::<f64>(), 40.0, epsilon = 1e-9);
        // Peak sits on the final timestep.
        let last = values[39];
        assert!(values.iter().all(|&w| w <= last));
        // Far from the end the curve is flat at the floor value: floor / (floor + peak)
        // of the final weight, i.e. 1/16 with tail_fraction = 15.
        assert_relative_eq!(values[0] / last, 1.0 / 16.0, epsilon = 1e-6);
    }

    #[test]
    fn test_gaussian_single_step() {
        let profile = gaussian(1, 10.0, 15.0).unwrap();
        assert_relative_eq!(profile.values()[0], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_unknown_weight_type() {
        let err = "cosine".parse::<WeightType>().unwrap_err();
        assert!(matches!(err, LossError::UnknownWeightType(ref s) if s == "cosine"));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_zero_length_rejected() {
        assert!(gaussian(0, 10.0, 15.0).unwrap_err().is_configuration());
    }

    #[test]
    fn test_non_positive_parameters_rejected() {
        assert!(gaussian(10, 0.0, 15.0).unwrap_err().is_configuration());
        assert!(gaussian(10, 10.0, -2.0).unwrap_err().is_configuration());
        assert!(gaussian(10, f64::NAN, 15.0).unwrap_err().is_configuration());
    }

    #[test]
    fn test_pathological_sigma_is_degenerate() {
        // A narrow peak divided by a vanishing tail fraction overflows the floor.
        let err = gaussian(10, 1e10, 1e-300).unwrap_err();
        assert!(matches!(err, LossError::NumericDegeneracy(_)), "{err}");
    }

    #[test]
    fn test_profile_keeps_device() {
        let profile = WeightProfile::build(5, WeightType::Last, 1.0, 1.0, Device::Cuda(1)).unwrap();
        assert_eq!(profile.device(), Device::Cuda(1));
    }

    proptest! {
        #[test]
        fn prop_gaussian_sums_to_length_and_is_positive(
            seq_length in 1usize..200,
            sigma_factor in 0.5f64..50.0,
            tail_fraction in 0.5f64..100.0,
        ) {
            let profile = gaussian(seq_length, sigma_factor, tail_fraction).unwrap();
            let values = profile.values();
            let total: f64 = values.iter().sum();
            prop_assert!((total - seq_length as f64).abs() < 1e-6);
            prop_assert!(values.iter().all(|&w| w > 0.0));
        }

        #[test]
        fn prop_gaussian_is_non_decreasing(
            seq_length in 2usize..200,
            sigma_factor in 0.5f64..50.0,
            tail_fraction in 0.5f64..100.0,
        ) {
            let profile = gaussian(seq_length, sigma_factor, tail_fraction).unwrap();
            for pair in profile.values().windows(2) {
                prop_assert!(pair[0] <= pair[1]);
            }
        }

        #[test]
        fn prop_last_is_one_hot(seq_length in 1usize..200) {
            let profile = WeightProfile::build(seq_length, WeightType::Last, 1.0, 1.0, Device::Cpu).unwrap();
            let values = profile.values();
            prop_assert_eq!(values[seq_length - 1], seq_length as f64);
            prop_assert!(values[..seq_length - 1].iter().all(|&w| w == 0.0));
        }
    }
}
