//! Error types for loss construction and evaluation.

use thiserror::Error;

use crate::math::device::Device;

/// Everything that can go wrong while building or evaluating a loss.
///
/// Configuration-class errors are raised by `CompositeLossEngine::new` and
/// never by `evaluate`; shape-class errors are raised per batch.
#[derive(Debug, Error)]
pub enum LossError {
    #[error("unknown loss kind `{0}`")]
    UnknownLossKind(String),

    #[error("unknown weight type `{0}` (expected `gaussian` or `last`)")]
    UnknownWeightType(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("device mismatch: engine lives on {expected}, tensor lives on {found}")]
    DeviceMismatch { expected: Device, found: Device },

    #[error("shape mismatch in {context}: expected {expected:?}, found {found:?}")]
    Shape {
        context: &'static str,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("expected {expected} model output(s), got {found}")]
    OutputArity { expected: usize, found: usize },

    #[error("numeric degeneracy: {0}")]
    NumericDegeneracy(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl LossError {
    /// True for errors that mean the configuration itself is unusable.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            LossError::UnknownLossKind(_)
                | LossError::UnknownWeightType(_)
                | LossError::InvalidConfig(_)
                | LossError::DeviceMismatch { .. }
        )
    }

    /// True for per-batch shape errors (the batch should be dropped).
    pub fn is_shape(&self) -> bool {
        matches!(self, LossError::Shape { .. } | LossError::OutputArity { .. })
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, LossError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert!(LossError::UnknownLossKind("L1".into()).is_configuration());
        assert!(LossError::DeviceMismatch { expected: Device::Cpu, found: Device::Cuda(0) }
            .is_configuration());
        assert!(LossError::OutputArity { expected: 2, found: 1 }.is_shape());
        let degenerate = LossError::NumericDegeneracy("nan".into());
        assert!(!degenerate.is_configuration());
        assert!(!degenerate.is_shape());
    }

    #[test]
    fn test_error_messages() {
        let err = LossError::Shape { context: "weighted mse", expected: vec![4], found: vec![5] };
        assert_eq!(err.to_string(), "shape mismatch in weighted mse: expected [4], found [5]");
        assert_eq!(
            LossError::UnknownWeightType("cosine".into()).to_string(),
            "unknown weight type `cosine` (expected `gaussian` or `last`)"
        );
    }
}
