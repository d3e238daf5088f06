use tracing::{debug, trace};

use crate::engine::loss_config::LossConfig;
use crate::engine::loss_output::{LossBreakdown, LossOutput};
use crate::error::{LossError, Result};
use crate::loss::loss_type::Criterion;
use crate::loss::smoothness::SmoothnessPenalty;
use crate::loss::weight_profile::WeightProfile;
use crate::math::device::Device;
use crate::math::tensor::Tensor;

/// Decoder-stage part of the composition; only exists when `decoder_layers > 0`.
#[derive(Debug, Clone)]
struct DecoderStage {
    criterion: Criterion,
    smooth: Option<SmoothnessPenalty>,
    lambda_final_pred: f64,
    lambda_final_smooth: f64,
    include_enc_loss: bool,
}

/// Combines the elementary losses of a two-stage forecasting model into one
/// scalar per batch.
///
/// Built once from a `LossConfig`; every check that can fail on configuration
/// alone runs in `new`. `evaluate` only reads the engine, so a shared
/// reference can serve concurrent batches.
///
/// Composition, given outputs `(enc_pred, final_pred?)`:
///
/// | decoder | include_enc_loss | loss                                                    |
/// |---------|------------------|---------------------------------------------------------|
/// | no      | -                | `enc(enc_pred) [+ smooth(enc_pred)]`                    |
/// | yes     | true             | `enc(enc_pred) + λp·final(final_pred) [+ λs·fsmooth(final_pred)]` |
/// | yes     | false            | `final(final_pred)`                                     |
///
/// `smooth` is the encoder-path `smooth_loss` and is only used without a
/// decoder. `fsmooth` is `final_smooth_loss`, which is unset by default, so
/// `lambda_final_smooth` has no effect unless it is configured explicitly.
#[derive(Debug, Clone)]
pub struct CompositeLossEngine {
    config: LossConfig,
    device: Device,
    enc_criterion: Criterion,
    smooth: Option<SmoothnessPenalty>,
    decoder: Option<DecoderStage>,
}

impl CompositeLossEngine {
    /// Validates `config` and builds every criterion and weight profile.
    pub fn new(config: LossConfig) -> Result<CompositeLossEngine> {
        let resolved = config.resolve()?;
        let device = resolved.device;

        let enc_criterion = resolved.enc_pred_loss.build_criterion(&resolved.profile, device)?;
        debug!(kind = %enc_criterion.kind(), "enc_pred criterion");
        log_profile("enc", enc_criterion.profile());

        let smooth = resolved.smooth_loss.map(|kind| kind.build_smoothness()).transpose()?;
        if let Some(kind) = resolved.smooth_loss {
            debug!(%kind, "smoothness criterion");
        }

        let decoder = match resolved.final_pred_loss {
            Some(kind) if config.decoder_present() => {
                // Independent profile, even when both stages use WeightMSE.
                let criterion = kind.build_criterion(&resolved.profile, device)?;
                debug!(kind = %criterion.kind(), "final_pred criterion");
                log_profile("final", criterion.profile());

                let smooth = resolved.final_smooth_loss.map(|k| k.build_smoothness()).transpose()?;
                Some(DecoderStage {
                    criterion,
                    smooth,
                    lambda_final_pred: config.lambda_final_pred,
                    lambda_final_smooth: config.lambda_final_smooth,
                    include_enc_loss: config.include_enc_loss,
                })
            }
            _ => None,
        };

        debug!(
            seq_length = config.seq_length,
            decoder_layers = config.decoder_layers,
            include_enc_loss = config.include_enc_loss,
            %device,
            "composite loss engine ready"
        );

        Ok(CompositeLossEngine { config, device, enc_criterion, smooth, decoder })
    }

    pub fn config(&self) -> &LossConfig {
        &self.config
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn seq_length(&self) -> usize {
        self.config.seq_length
    }

    pub fn has_decoder(&self) -> bool {
        self.decoder.is_some()
    }

    /// Weight curve of the encoder-stage loss, if it is `WeightMSE`.
    pub fn enc_weights(&self) -> Option<&WeightProfile> {
        self.enc_criterion.profile()
    }

    /// Weight curve of the decoder-stage loss, if it is `WeightMSE`.
    pub fn final_weights(&self) -> Option<&WeightProfile> {
        self.decoder.as_ref().and_then(|stage| stage.criterion.profile())
    }

    /// Evaluates the composite loss for one batch.
    ///
    /// `outputs[0]` is the encoder-stage prediction; with a decoder,
    /// `outputs[1]` is the final prediction. Without a decoder any extra
    /// outputs are ignored.
    pub fn evaluate(&self, outputs: &[Tensor], target: &Tensor) -> Result<LossOutput> {
        target.ensure_device(self.device)?;

        let output = match &self.decoder {
            None => {
                let enc_pred = outputs.first()
                    .ok_or(LossError::OutputArity { expected: 1, found: 0 })?;
                self.evaluate_encoder_only(enc_pred, target)?
            }
            Some(stage) => {
                let (enc_pred, final_pred) = match outputs {
                    [enc_pred, final_pred, ..] => (enc_pred, final_pred),
                    _ => return Err(LossError::OutputArity { expected: 2, found: outputs.len() }),
                };
                if stage.include_enc_loss {
                    self.evaluate_blended(stage, enc_pred, final_pred, target)?
                } else {
                    Self::evaluate_final_only(stage, self.device, final_pred, target)?
                }
            }
        };

        trace!(loss = output.loss, breakdown = ?output.breakdown, "composite loss");
        Ok(output)
    }

    /// Convenience wrapper returning only the scalar.
    pub fn loss(&self, outputs: &[Tensor], target: &Tensor) -> Result<f64> {
        self.evaluate(outputs, target).map(|output| output.loss)
    }

    fn evaluate_encoder_only(&self, enc_pred: &Tensor, target: &Tensor) -> Result<LossOutput> {
        enc_pred.ensure_device(self.device)?;

        let enc_loss = self.enc_criterion.loss(enc_pred, target)?;
        let mut enc_grad = self.enc_criterion.derivative(enc_pred, target)?;
        let mut breakdown = LossBreakdown { enc_loss: Some(enc_loss), ..LossBreakdown::default() };
        let mut loss = enc_loss;

        if let Some(smooth) = &self.smooth {
            let (penalty, grad) = smoothness_of(smooth, enc_pred)?;
            loss += penalty;
            enc_grad = enc_grad.zip_map(&grad, "smoothness gradient", |a, b| a + b)?;
            breakdown.smooth_loss = Some(penalty);
        }

        Ok(LossOutput { loss, enc_grad: Some(enc_grad), final_grad: None, breakdown })
    }

    fn evaluate_blended(
        &self,
        stage: &DecoderStage,
        enc_pred: &Tensor,
        final_pred: &Tensor,
        target: &Tensor,
    ) -> Result<LossOutput> {
        enc_pred.ensure_device(self.device)?;
        final_pred.ensure_device(self.device)?;

        let enc_loss = self.enc_criterion.loss(enc_pred, target)?;
        let enc_grad = self.enc_criterion.derivative(enc_pred, target)?;
        let final_loss = stage.criterion.loss(final_pred, target)?;
        let mut final_grad = stage.criterion.derivative(final_pred, target)?
            .scale(stage.lambda_final_pred);

        let mut loss = enc_loss + stage.lambda_final_pred * final_loss;
        let mut breakdown = LossBreakdown {
            enc_loss: Some(enc_loss),
            final_loss: Some(final_loss),
            ..LossBreakdown::default()
        };

        if let Some(smooth) = &stage.smooth {
            let (penalty, grad) = smoothness_of(smooth, final_pred)?;
            let lambda = stage.lambda_final_smooth;
            loss += lambda * penalty;
            final_grad = final_grad.zip_map(&grad, "smoothness gradient", |a, b| a + lambda * b)?;
            breakdown.final_smooth_loss = Some(penalty);
        }

        Ok(LossOutput { loss, enc_grad: Some(enc_grad), final_grad: Some(final_grad), breakdown })
    }

    fn evaluate_final_only(
        stage: &DecoderStage,
        device: Device,
        final_pred: &Tensor,
        target: &Tensor,
    ) -> Result<LossOutput> {
        final_pred.ensure_device(device)?;

        let final_loss = stage.criterion.loss(final_pred, target)?;
        let final_grad = stage.criterion.derivative(final_pred, target)?;
        Ok(LossOutput {
            loss: final_loss,
            enc_grad: None,
            final_grad: Some(final_grad),
            breakdown: LossBreakdown { final_loss: Some(final_loss), ..LossBreakdown::default() },
        })
    }
}

/// Smoothness penalty of a `[batch, L]` prediction and its gradient in the
/// prediction's own shape.
fn smoothness_of(smooth: &SmoothnessPenalty, pred: &Tensor) -> Result<(f64, Tensor)> {
    let shape = pred.shape.clone();
    let sequence = pred.clone().unsqueeze(1)?;
    let penalty = smooth.penalty(&sequence)?;
    let grad = smooth.derivative(&sequence)?.reshape(shape)?;
    Ok((penalty, grad))
}

fn log_profile(stage: &str, profile: Option<&WeightProfile>) {
    if let Some(profile) = profile {
        let values = profile.values();
        let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        debug!(
            stage,
            weight_type = %profile.weight_type(),
            seq_length = profile.seq_length(),
            min,
            max,
            sum = values.iter().sum::<f64>(),
            "weight profile"
        );
    }
}
