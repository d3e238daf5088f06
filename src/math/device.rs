use serde::{Serialize, Deserialize};
use std::fmt;
use std::str::FromStr;

use crate::error::LossError;

/// Identifies where a tensor's storage lives.
///
/// The engine only computes on the host, but tensors carry the identifier so
/// that a batch coming from a different device is rejected instead of being
/// silently mixed with the engine's weight vectors.
///
/// Serialized as its string form: `"cpu"`, `"cuda"` (ordinal 0) or `"cuda:N"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Device {
    #[default]
    Cpu,
    Cuda(usize),
}

impl FromStr for Device {
    type Err = LossError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        match s.as_str() {
            "cpu" => Ok(Device::Cpu),
            "cuda" => Ok(Device::Cuda(0)),
            other => other
                .strip_prefix("cuda:")
                .and_then(|ordinal| ordinal.parse::<usize>().ok())
                .map(Device::Cuda)
                .ok_or_else(|| LossError::InvalidConfig(format!("unknown device `{other}`"))),
        }
    }
}

impl TryFrom<String> for Device {
    type Error = LossError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Device> for String {
    fn from(device: Device) -> Self {
        device.to_string()
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda(ordinal) => write!(f, "cuda:{ordinal}"),
        }
    }
}
