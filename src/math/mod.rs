pub mod device;
pub mod tensor;

pub use device::Device;
pub use tensor::Tensor;
