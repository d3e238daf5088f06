pub mod mse;
pub mod cross_entropy;
pub mod weighted_mse;
pub mod smoothness;
pub mod weight_profile;
pub mod loss_type;

pub use mse::MseLoss;
pub use cross_entropy::CrossEntropyLoss;
pub use weighted_mse::WeightedMseLoss;
pub use smoothness::SmoothnessPenalty;
pub use weight_profile::{ProfileParams, WeightProfile, WeightType};
pub use loss_type::{Criterion, LossKind};
