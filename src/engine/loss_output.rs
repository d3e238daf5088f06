use serde::{Serialize, Deserialize};

use crate::math::tensor::Tensor;

/// Unweighted value of every sub-loss that took part in one evaluation.
///
/// A field is `None` when that sub-loss is not part of the configured
/// composition (or its prediction was ignored).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LossBreakdown {
    pub enc_loss: Option<f64>,
    pub final_loss: Option<f64>,
    pub smooth_loss: Option<f64>,
    pub final_smooth_loss: Option<f64>,
}

/// Result of `CompositeLossEngine::evaluate`.
///
/// `enc_grad` / `final_grad` are the gradients of `loss` with respect to the
/// encoder and decoder predictions, shaped like those predictions. A
/// prediction that does not influence `loss` gets `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LossOutput {
    pub loss: f64,
    pub enc_grad: Option<Tensor>,
    pub final_grad: Option<Tensor>,
    pub breakdown: LossBreakdown,
}
