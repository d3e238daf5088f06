use serde::{Serialize, Deserialize};
use std::path::Path;

use crate::error::{LossError, Result};
use crate::loss::loss_type::LossKind;
use crate::loss::weight_profile::{ProfileParams, WeightType};
use crate::math::device::Device;

/// Declarative description of a `CompositeLossEngine`.
///
/// # Fields
/// - `enc_pred_loss`       — registry name of the encoder-stage loss
/// - `final_pred_loss`     — registry name of the decoder-stage loss; must be
///                           set iff `decoder_layers > 0`
/// - `seq_length`          — timesteps per example (length of weight vectors)
/// - `weight_type`         — `"gaussian"` or `"last"`, used by `WeightMSE`
/// - `sigma_factor`        — Gaussian spread: std-dev = `seq_length / sigma_factor`
/// - `tail_fraction`       — Gaussian floor: `max(curve) / tail_fraction` is added
/// - `smooth_loss`         — smoothness applied to the encoder prediction when
///                           there is no decoder
/// - `final_smooth_loss`   — smoothness applied to the decoder prediction,
///                           scaled by `lambda_final_smooth`; off unless set
/// - `decoder_layers`      — `0` means the model has no decoder stage
/// - `lambda_final_pred`   — blend coefficient of the decoder-stage loss
/// - `lambda_final_smooth` — blend coefficient of `final_smooth_loss`
/// - `include_enc_loss`    — with a decoder, also train on the encoder loss
/// - `device`              — `"cpu"`, `"cuda"` or `"cuda:N"`
///
/// Names are kept as strings so that a misspelled name in a config file
/// surfaces as `UnknownLossKind` / `UnknownWeightType` when the engine is
/// built, rather than as a generic parse failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LossConfig {
    pub enc_pred_loss: String,
    pub final_pred_loss: Option<String>,
    pub seq_length: usize,
    pub weight_type: String,
    pub sigma_factor: f64,
    pub tail_fraction: f64,
    pub smooth_loss: Option<String>,
    pub final_smooth_loss: Option<String>,
    pub decoder_layers: usize,
    pub lambda_final_pred: f64,
    pub lambda_final_smooth: f64,
    pub include_enc_loss: bool,
    pub device: String,
}

impl Default for LossConfig {
    fn default() -> Self {
        LossConfig {
            enc_pred_loss: LossKind::Mse.name().to_string(),
            final_pred_loss: Some(LossKind::WeightMse.name().to_string()),
            seq_length: 40,
            weight_type: WeightType::Gaussian.to_string(),
            sigma_factor: 10.0,
            tail_fraction: 15.0,
            smooth_loss: None,
            final_smooth_loss: None,
            decoder_layers: 2,
            lambda_final_pred: 2.0,
            lambda_final_smooth: 1.0,
            include_enc_loss: false,
            device: Device::Cpu.to_string(),
        }
    }
}

/// A `LossConfig` whose names have been resolved and whose structure has
/// been checked for consistency.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedConfig {
    pub enc_pred_loss: LossKind,
    pub final_pred_loss: Option<LossKind>,
    pub smooth_loss: Option<LossKind>,
    pub final_smooth_loss: Option<LossKind>,
    pub profile: ProfileParams,
    pub device: Device,
}

impl LossConfig {
    /// Creates an encoder-only configuration (`decoder_layers = 0`).
    pub fn encoder_only(enc_pred_loss: LossKind, seq_length: usize) -> Self {
        LossConfig {
            enc_pred_loss: enc_pred_loss.name().to_string(),
            final_pred_loss: None,
            seq_length,
            decoder_layers: 0,
            ..LossConfig::default()
        }
    }

    pub fn with_enc_pred_loss(mut self, kind: LossKind) -> Self {
        self.enc_pred_loss = kind.name().to_string();
        self
    }

    pub fn with_final_pred_loss(mut self, kind: Option<LossKind>) -> Self {
        self.final_pred_loss = kind.map(|k| k.name().to_string());
        self
    }

    pub fn with_seq_length(mut self, seq_length: usize) -> Self {
        self.seq_length = seq_length;
        self
    }

    pub fn with_weight_type(mut self, weight_type: WeightType) -> Self {
        self.weight_type = weight_type.to_string();
        self
    }

    pub fn with_sigma_factor(mut self, sigma_factor: f64) -> Self {
        self.sigma_factor = sigma_factor;
        self
    }

    pub fn with_tail_fraction(mut self, tail_fraction: f64) -> Self {
        self.tail_fraction = tail_fraction;
        self
    }

    pub fn with_smooth_loss(mut self, kind: Option<LossKind>) -> Self {
        self.smooth_loss = kind.map(|k| k.name().to_string());
        self
    }

    pub fn with_final_smooth_loss(mut self, kind: Option<LossKind>) -> Self {
        self.final_smooth_loss = kind.map(|k| k.name().to_string());
        self
    }

    pub fn with_decoder_layers(mut self, decoder_layers: usize) -> Self {
        self.decoder_layers = decoder_layers;
        self
    }

    pub fn with_lambda_final_pred(mut self, lambda: f64) -> Self {
        self.lambda_final_pred = lambda;
        self
    }

    pub fn with_lambda_final_smooth(mut self, lambda: f64) -> Self {
        self.lambda_final_smooth = lambda;
        self
    }

    pub fn with_include_enc_loss(mut self, include: bool) -> Self {
        self.include_enc_loss = include;
        self
    }

    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device.to_string();
        self
    }

    /// True when the model has a decoder stage.
    pub fn decoder_present(&self) -> bool {
        self.decoder_layers > 0
    }

    /// Checks names and structural consistency.
    ///
    /// Numeric checks on the weight curve itself happen when the profile is
    /// built by `CompositeLossEngine::new`.
    pub fn validate(&self) -> Result<()> {
        self.resolve().map(|_| ())
    }

    /// Resolves every name and rejects inconsistent combinations.
    pub fn resolve(&self) -> Result<ResolvedConfig> {
        if self.seq_length == 0 {
            return Err(LossError::InvalidConfig("seq_length must be positive".to_string()));
        }

        let enc_pred_loss = resolve_criterion("enc_pred_loss", &self.enc_pred_loss)?;
        let final_pred_loss = self.final_pred_loss.as_deref()
            .map(|name| resolve_criterion("final_pred_loss", name))
            .transpose()?;
        let smooth_loss = self.smooth_loss.as_deref()
            .map(|name| resolve_smoothness("smooth_loss", name))
            .transpose()?;
        let final_smooth_loss = self.final_smooth_loss.as_deref()
            .map(|name| resolve_smoothness("final_smooth_loss", name))
            .transpose()?;

        let weight_type: WeightType = self.weight_type.parse()?;
        let device: Device = self.device.parse()?;

        if self.decoder_present() {
            if final_pred_loss.is_none() {
                return Err(LossError::InvalidConfig(format!(
                    "decoder_layers = {} requires final_pred_loss",
                    self.decoder_layers
                )));
            }
        } else {
            if let Some(kind) = final_pred_loss {
                return Err(LossError::InvalidConfig(format!(
                    "final_pred_loss `{kind}` given but decoder_layers = 0"
                )));
            }
            if let Some(kind) = final_smooth_loss {
                return Err(LossError::InvalidConfig(format!(
                    "final_smooth_loss `{kind}` given but decoder_layers = 0"
                )));
            }
        }

        if (smooth_loss.is_some() || final_smooth_loss.is_some()) && self.seq_length < 2 {
            return Err(LossError::InvalidConfig(format!(
                "smoothness needs seq_length >= 2, got {}",
                self.seq_length
            )));
        }

        for (field, value) in [
            ("lambda_final_pred", self.lambda_final_pred),
            ("lambda_final_smooth", self.lambda_final_smooth),
        ] {
            if !value.is_finite() {
                return Err(LossError::InvalidConfig(format!("{field} must be finite, got {value}")));
            }
        }

        Ok(ResolvedConfig {
            enc_pred_loss,
            final_pred_loss,
            smooth_loss,
            final_smooth_loss,
            profile: ProfileParams {
                seq_length: self.seq_length,
                weight_type,
                sigma_factor: self.sigma_factor,
                tail_fraction: self.tail_fraction,
            },
            device,
        })
    }

    /// Serializes the configuration to a pretty-printed JSON file.
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Deserializes a configuration from a JSON file; missing fields take
    /// their default values.
    pub fn load_json(path: impl AsRef<Path>) -> Result<LossConfig> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }
}

fn resolve_criterion(field: &str, name: &str) -> Result<LossKind> {
    let kind = LossKind::resolve(name)?;
    if !kind.is_criterion() {
        return Err(LossError::InvalidConfig(format!(
            "{field}: `{kind}` is a smoothness loss, not a prediction loss"
        )));
    }
    Ok(kind)
}

fn resolve_smoothness(field: &str, name: &str) -> Result<LossKind> {
    let kind = LossKind::resolve(name)?;
    if kind.is_criterion() {
        return Err(LossError::InvalidConfig(format!(
            "{field}: `{kind}` is not a smoothness loss"
        )));
    }
    Ok(kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let resolved = LossConfig::default().resolve().unwrap();
        assert_eq!(resolved.enc_pred_loss, LossKind::Mse);
        assert_eq!(resolved.final_pred_loss, Some(LossKind::WeightMse));
        assert_eq!(resolved.smooth_loss, None);
        assert_eq!(resolved.profile.seq_length, 40);
        assert_eq!(resolved.profile.weight_type, WeightType::Gaussian);
        assert_eq!(resolved.device, Device::Cpu);
    }

    #[test]
    fn test_final_loss_without_decoder_rejected() {
        let config = LossConfig::default().with_decoder_layers(0);
        let err = config.validate().unwrap_err();
        assert!(err.is_configuration(), "{err}");
    }

    #[test]
    fn test_decoder_without_final_loss_rejected() {
        for include in [true, false] {
            let config = LossConfig::default()
                .with_final_pred_loss(None)
                .with_include_enc_loss(include);
            assert!(config.validate().unwrap_err().is_configuration());
        }
    }

    #[test]
    fn test_final_smoothness_without_decoder_rejected() {
        let config = LossConfig::encoder_only(LossKind::Mse, 8)
            .with_final_smooth_loss(Some(LossKind::SmoothMse));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_names() {
        let mut config = LossConfig::default();
        config.enc_pred_loss = "Huber".to_string();
        assert!(matches!(config.validate(), Err(LossError::UnknownLossKind(_))));

        let mut config = LossConfig::default();
        config.weight_type = "triangle".to_string();
        assert!(matches!(config.validate(), Err(LossError::UnknownWeightType(_))));

        let mut config = LossConfig::default();
        config.device = "tpu:0".to_string();
        assert!(config.validate().unwrap_err().is_configuration());
    }

    #[test]
    fn test_loss_roles_enforced() {
        let config = LossConfig::default().with_enc_pred_loss(LossKind::SmoothMse);
        assert!(matches!(config.validate(), Err(LossError::InvalidConfig(_))));

        let config = LossConfig::encoder_only(LossKind::Mse, 8).with_smooth_loss(Some(LossKind::Mse));
        assert!(matches!(config.validate(), Err(LossError::InvalidConfig(_))));
    }

    #[test]
    fn test_smoothness_needs_two_steps() {
        let config = LossConfig::encoder_only(LossKind::Mse, 1).with_smooth_loss(Some(LossKind::SmoothMse));
        assert!(config.validate().is_err());
        let config = LossConfig::encoder_only(LossKind::Mse, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_non_finite_lambda_rejected() {
        let config = LossConfig::default().with_lambda_final_pred(f64::NAN);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let config: LossConfig = serde_json::from_str(
            r#"{ "enc_pred_loss": "WeightMSE", "decoder_layers": 0, "final_pred_loss": null, "weight_type": "last" }"#,
        ).unwrap();
        assert_eq!(config.seq_length, 40);
        assert_eq!(config.sigma_factor, 10.0);
        assert!(!config.decoder_present());
        assert_eq!(config.resolve().unwrap().profile.weight_type, WeightType::Last);
    }

    #[test]
    fn test_json_file_round_trip() {
        let path = std::env::temp_dir().join(format!("hts_loss_config_{}.json", std::process::id()));
        let config = LossConfig::encoder_only(LossKind::WeightMse, 12)
            .with_smooth_loss(Some(LossKind::SmoothMse))
            .with_device(Device::Cuda(1));
        config.save_json(&path).unwrap();
        let loaded = LossConfig::load_json(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[cfg(unix)]
    #[test]
    fn test_json_file_round_trip_non_utf8_path() {
        use std::ffi::OsString;
        use std::os::unix::ffi::OsStringExt;

        let mut name = format!("hts_loss_config_{}_", std::process::id()).into_bytes();
        name.extend_from_slice(b"\xff\xfe.json");
        let path = std::env::temp_dir().join(OsString::from_vec(name));
        assert!(path.to_str().is_none());

        let config = LossConfig::default();
        config.save_json(&path).unwrap();
        let loaded = LossConfig::load_json(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = LossConfig::load_json("/nonexistent/hts_loss.json").unwrap_err();
        assert!(matches!(err, LossError::Io(_)));
    }
}
