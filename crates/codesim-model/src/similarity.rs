//! Twin-encoder similarity model.
//!
//! Two RoBERTa towers with separate weights embed the two snippets of a pair.
//! Each pooled vector goes through its own dropout draw, and the cosine
//! similarity of the two is the model's logit. With labels, the loss is
//! binary cross-entropy with logits over that cosine value.
//!
//! The cosine value lives in [-1, 1], so sigmoid(logit) never leaves
//! [0.27, 0.73] and the 0.5 decision threshold sits at cosine 0.5. Trained
//! fold checkpoints depend on exactly this behavior.

use std::path::Path;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;

use crate::batch::EncodedBatch;
use crate::config::{tensor_name, RobertaConfig};
use crate::error::{tensor_err, ModelError, ModelResult};
use crate::output::SimilarityOutput;
use crate::snapshot::WeightFile;
use crate::tower::{dropout, ForwardOptions, PoolerInit, RobertaTower, TowerInput};

/// Tensor-name prefix of the first tower inside a twin checkpoint.
pub const TOWER_A_PREFIX: &str = "reoberta_model1";

/// Tensor-name prefix of the second tower inside a twin checkpoint.
pub const TOWER_B_PREFIX: &str = "reoberta_model2";

/// Prefix used by HuggingFace `RobertaModel` exports wrapped in a task head.
pub const BASE_MODEL_PREFIX: &str = "roberta";

/// Epsilon guarding each vector norm in the cosine similarity.
pub const COSINE_EPS: f64 = 1e-8;

/// Dual RoBERTa encoder scored by cosine similarity.
#[derive(Debug)]
pub struct TwinEncoderModel {
    config: RobertaConfig,
    tower_a: RobertaTower,
    tower_b: RobertaTower,
    device: Device,
}

impl TwinEncoderModel {
    /// Initialize both towers from one base RoBERTa snapshot.
    ///
    /// Each tower reads its own copy of the base weights, so the two never
    /// share parameters. A pooler missing from the snapshot is drawn fresh
    /// per tower.
    pub fn from_pretrained(base_dir: &Path, config: &RobertaConfig, device: &Device) -> ModelResult<Self> {
        let weights = WeightFile::locate(base_dir)?;
        let vb = weights.open(device)?;

        let probe = tensor_name(BASE_MODEL_PREFIX, "embeddings.word_embeddings.weight");
        let prefix = if vb.contains_tensor(&probe) {
            BASE_MODEL_PREFIX
        } else {
            ""
        };

        tracing::info!(
            path = %weights.path.display(),
            prefix,
            "Initializing twin towers from base snapshot"
        );

        let tower_a = RobertaTower::load(&vb, config, prefix, PoolerInit::RandomIfMissing)?;
        let tower_b = RobertaTower::load(&vb, config, prefix, PoolerInit::RandomIfMissing)?;
        Self::from_towers(config, tower_a, tower_b, device)
    }

    /// Load a fine-tuned twin checkpoint (one fold directory).
    pub fn load(checkpoint_dir: &Path, config: &RobertaConfig, device: &Device) -> ModelResult<Self> {
        let weights = WeightFile::locate(checkpoint_dir)?;
        let vb = weights.open(device)?;

        let model = Self::from_var_builder(&vb, config, device).map_err(|e| match e {
            ModelError::WeightLoadError { tensor, message } => ModelError::CheckpointError {
                path: weights.path.clone(),
                message: format!("tensor '{}': {}", tensor, message),
            },
            other => other,
        })?;

        tracing::info!(path = %weights.path.display(), "Twin checkpoint loaded");
        Ok(model)
    }

    /// Build from a `VarBuilder` holding both towers under their twin prefixes.
    pub fn from_var_builder(vb: &VarBuilder, config: &RobertaConfig, device: &Device) -> ModelResult<Self> {
        let tower_a = RobertaTower::load(vb, config, TOWER_A_PREFIX, PoolerInit::Required)?;
        let tower_b = RobertaTower::load(vb, config, TOWER_B_PREFIX, PoolerInit::Required)?;
        Self::from_towers(config, tower_a, tower_b, device)
    }

    /// Assemble from two loaded towers.
    ///
    /// Both pooled widths must equal `config.hidden_size`; anything else is a
    /// configuration error.
    pub fn from_towers(
        config: &RobertaConfig,
        tower_a: RobertaTower,
        tower_b: RobertaTower,
        device: &Device,
    ) -> ModelResult<Self> {
        config.validate()?;

        let dim_a = tower_a.pooled_dim()?;
        let dim_b = tower_b.pooled_dim()?;
        if dim_a != config.hidden_size || dim_b != config.hidden_size {
            return Err(ModelError::ConfigError {
                message: format!(
                    "pooled sizes of the towers ({}, {}) must both equal hidden_size {}",
                    dim_a, dim_b, config.hidden_size
                ),
            });
        }

        Ok(Self {
            config: config.clone(),
            tower_a,
            tower_b,
            device: device.clone(),
        })
    }

    pub fn config(&self) -> &RobertaConfig {
        &self.config
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Score a batch of pairs.
    pub fn forward(&self, batch: &EncodedBatch, options: &ForwardOptions) -> ModelResult<SimilarityOutput> {
        if let Some(position_ids) = &batch.position_ids {
            for ids in [&batch.input_ids_a, &batch.input_ids_b] {
                if position_ids.dims() != ids.dims() {
                    return Err(ModelError::ShapeMismatch {
                        context: "position ids".to_string(),
                        expected: ids.dims().to_vec(),
                        actual: position_ids.dims().to_vec(),
                    });
                }
            }
        }

        let out_a = self.tower_a.forward(
            TowerInput {
                input_ids: &batch.input_ids_a,
                attention_mask: &batch.attention_mask_a,
                position_ids: batch.position_ids.as_ref(),
                head_mask: batch.head_mask.as_ref(),
            },
            options,
        )?;
        let out_b = self.tower_b.forward(
            TowerInput {
                input_ids: &batch.input_ids_b,
                attention_mask: &batch.attention_mask_b,
                position_ids: batch.position_ids.as_ref(),
                head_mask: batch.head_mask.as_ref(),
            },
            options,
        )?;

        let rate = self.config.classifier_dropout_prob();
        let pooled_a = dropout(&out_a.pooled, rate, options.train)?;
        let pooled_b = dropout(&out_b.pooled, rate, options.train)?;

        let logits = cosine_similarity(&pooled_a, &pooled_b, COSINE_EPS)?;
        let loss = batch
            .labels
            .as_ref()
            .map(|labels| similarity_loss(&logits, labels))
            .transpose()?;

        Ok(SimilarityOutput {
            loss,
            logits,
            pooled_a,
            pooled_b,
            hidden_states_a: out_a.hidden_states,
            attentions_a: out_a.attentions,
            hidden_states_b: out_b.hidden_states,
            attentions_b: out_b.attentions,
        })
    }

    /// Eval-mode logits on the host.
    pub fn predict(&self, batch: &EncodedBatch) -> ModelResult<Vec<f32>> {
        self.forward(batch, &ForwardOptions::eval())?.logits_vec()
    }
}

/// Row-wise cosine similarity of two [batch, dim] tensors.
///
/// Each norm is clamped to at least `eps` before dividing, so a zero vector
/// scores 0 against anything. The quotient is clamped to [-1, 1] since f32
/// rounding can overshoot for parallel vectors.
pub fn cosine_similarity(a: &Tensor, b: &Tensor, eps: f64) -> ModelResult<Tensor> {
    if a.dims() != b.dims() {
        return Err(ModelError::ShapeMismatch {
            context: "cosine similarity operands".to_string(),
            expected: a.dims().to_vec(),
            actual: b.dims().to_vec(),
        });
    }
    let a = a.to_dtype(DType::F32).map_err(tensor_err("cosine dtype"))?;
    let b = b.to_dtype(DType::F32).map_err(tensor_err("cosine dtype"))?;
    let batch_size = a.dim(0).map_err(tensor_err("cosine batch"))?;

    let floor = Tensor::full(eps as f32, batch_size, a.device()).map_err(tensor_err("cosine eps"))?;
    let norm = |x: &Tensor| -> ModelResult<Tensor> {
        x.sqr()
            .and_then(|sq| sq.sum(1))
            .and_then(|sum| sum.sqrt())
            .and_then(|n| n.maximum(&floor))
            .map_err(tensor_err("cosine norm"))
    };

    let dot = a
        .mul(&b)
        .and_then(|p| p.sum(1))
        .map_err(tensor_err("cosine dot"))?;
    let denom = norm(&a)?.mul(&norm(&b)?).map_err(tensor_err("cosine denominator"))?;
    dot.div(&denom)
        .and_then(|cos| cos.clamp(-1f32, 1f32))
        .map_err(tensor_err("cosine divide"))
}

/// Binary cross-entropy with logits, applied to the cosine score directly.
pub fn similarity_loss(logits: &Tensor, labels: &Tensor) -> ModelResult<Tensor> {
    let labels = labels.to_dtype(DType::F32).map_err(tensor_err("labels dtype"))?;
    if logits.dims() != labels.dims() {
        return Err(ModelError::ShapeMismatch {
            context: "loss labels".to_string(),
            expected: logits.dims().to_vec(),
            actual: labels.dims().to_vec(),
        });
    }
    candle_nn::loss::binary_cross_entropy_with_logit(logits, &labels).map_err(tensor_err("BCE loss"))
}
