pub mod loss_config;
pub mod loss_output;
pub mod composite;

pub use loss_config::{LossConfig, ResolvedConfig};
pub use loss_output::{LossBreakdown, LossOutput};
pub use composite::CompositeLossEngine;
