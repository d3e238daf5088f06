use serde::{Serialize, Deserialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{LossError, Result};
use crate::loss::cross_entropy::CrossEntropyLoss;
use crate::loss::mse::MseLoss;
use crate::loss::smoothness::SmoothnessPenalty;
use crate::loss::weight_profile::{ProfileParams, WeightProfile};
use crate::loss::weighted_mse::WeightedMseLoss;
use crate::math::device::Device;
use crate::math::tensor::Tensor;

/// The closed set of elementary losses a composite engine can be built from.
///
/// Each variant has a fixed registry name used in configuration files:
///
/// - `Mse`          — `"MSE"`, unweighted mean squared error.
/// - `CrossEntropy` — `"CrossEntropy"`, categorical cross-entropy over logits.
/// - `WeightMse`    — `"WeightMSE"`, squared error weighted by a `WeightProfile`.
/// - `SmoothMse`    — `"smooth_mse"`, the `SmoothnessPenalty` regularizer.
///
/// The first three compare a prediction with a target and resolve to a
/// `Criterion`; `SmoothMse` only looks at the prediction and resolves to a
/// `SmoothnessPenalty`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LossKind {
    #[serde(rename = "MSE")]
    Mse,
    #[serde(rename = "CrossEntropy")]
    CrossEntropy,
    #[serde(rename = "WeightMSE")]
    WeightMse,
    #[serde(rename = "smooth_mse")]
    SmoothMse,
}

impl LossKind {
    pub const ALL: [LossKind; 4] = [
        LossKind::Mse,
        LossKind::CrossEntropy,
        LossKind::WeightMse,
        LossKind::SmoothMse,
    ];

    /// Registry name of this kind.
    pub fn name(&self) -> &'static str {
        match self {
            LossKind::Mse => "MSE",
            LossKind::CrossEntropy => "CrossEntropy",
            LossKind::WeightMse => "WeightMSE",
            LossKind::SmoothMse => "smooth_mse",
        }
    }

    /// Looks up a registry name; unknown names are a configuration error.
    pub fn resolve(name: &str) -> Result<LossKind> {
        LossKind::ALL.into_iter()
            .find(|kind| kind.name() == name)
            .ok_or_else(|| LossError::UnknownLossKind(name.to_string()))
    }

    /// True for kinds that compare a prediction against a target.
    pub fn is_criterion(&self) -> bool {
        !matches!(self, LossKind::SmoothMse)
    }

    /// Builds the prediction-vs-target criterion for this kind.
    ///
    /// `profile` is only consulted by `WeightMse`, which builds its own
    /// `WeightProfile` on `device`.
    pub fn build_criterion(&self, profile: &ProfileParams, device: Device) -> Result<Criterion> {
        match self {
            LossKind::Mse => Ok(Criterion::Mse),
            LossKind::CrossEntropy => Ok(Criterion::CrossEntropy),
            LossKind::WeightMse => {
                let profile = profile.build(device)?;
                Ok(Criterion::WeightedMse(WeightedMseLoss::new(profile)))
            }
            LossKind::SmoothMse => Err(LossError::InvalidConfig(format!(
                "`{}` penalizes a single prediction and cannot be used as a prediction loss",
                self.name()
            ))),
        }
    }

    /// Builds the smoothness regularizer; only valid for `SmoothMse`.
    pub fn build_smoothness(&self) -> Result<SmoothnessPenalty> {
        match self {
            LossKind::SmoothMse => Ok(SmoothnessPenalty),
            other => Err(LossError::InvalidConfig(format!(
                "`{}` is not a smoothness loss",
                other.name()
            ))),
        }
    }
}

impl FromStr for LossKind {
    type Err = LossError;

    fn from_str(s: &str) -> Result<Self> {
        LossKind::resolve(s)
    }
}

impl fmt::Display for LossKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A resolved prediction-vs-target loss.
#[derive(Debug, Clone)]
pub enum Criterion {
    Mse,
    CrossEntropy,
    WeightedMse(WeightedMseLoss),
}

impl Criterion {
    pub fn kind(&self) -> LossKind {
        match self {
            Criterion::Mse => LossKind::Mse,
            Criterion::CrossEntropy => LossKind::CrossEntropy,
            Criterion::WeightedMse(_) => LossKind::WeightMse,
        }
    }

    pub fn loss(&self, predicted: &Tensor, expected: &Tensor) -> Result<f64> {
        match self {
            Criterion::Mse => MseLoss::loss(predicted, expected),
            Criterion::CrossEntropy => CrossEntropyLoss::loss(predicted, expected),
            Criterion::WeightedMse(inner) => inner.loss(predicted, expected),
        }
    }

    pub fn derivative(&self, predicted: &Tensor, expected: &Tensor) -> Result<Tensor> {
        match self {
            Criterion::Mse => MseLoss::derivative(predicted, expected),
            Criterion::CrossEntropy => CrossEntropyLoss::derivative(predicted, expected),
            Criterion::WeightedMse(inner) => inner.derivative(predicted, expected),
        }
    }

    /// The weight profile, for `WeightedMse` criteria.
    pub fn profile(&self) -> Option<&WeightProfile> {
        match self {
            Criterion::WeightedMse(inner) => Some(inner.profile()),
            _ => None,
        }
    }
}
