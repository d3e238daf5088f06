pub mod error;
pub mod math;
pub mod loss;
pub mod engine;

// Convenience re-exports
pub use error::{LossError, Result};
pub use math::device::Device;
pub use math::tensor::Tensor;
pub use loss::loss_type::{Criterion, LossKind};
pub use loss::weight_profile::{WeightProfile, WeightType};
pub use loss::smoothness::SmoothnessPenalty;
pub use loss::weighted_mse::WeightedMseLoss;
pub use engine::composite::CompositeLossEngine;
pub use engine::loss_config::LossConfig;
pub use engine::loss_output::{LossBreakdown, LossOutput};
