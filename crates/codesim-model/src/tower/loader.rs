//! Tower weight loading from a `VarBuilder`.
//!
//! Every tensor is requested with its expected shape, so a checkpoint that
//! was trained with a different geometry fails here with the offending
//! tensor name instead of producing garbage later.

use candle_core::{DType, Tensor};
use candle_nn::{Embedding, LayerNorm, Linear, VarBuilder};

use crate::config::{tensor_name, RobertaConfig};
use crate::error::{tensor_err, ModelError, ModelResult};

use super::weights::{
    AttentionWeights, EmbeddingWeights, EncoderLayerWeights, FfnWeights, PoolerWeights,
    TowerWeights,
};

/// What to do when the snapshot has no pooler weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolerInit {
    /// Pooler must be present (fine-tuned fold checkpoints).
    Required,
    /// Draw a fresh N(0, initializer_range) pooler (masked-LM base snapshots).
    RandomIfMissing,
}

/// Load all weights of one tower stored under `prefix`.
pub fn load_tower(
    vb: &VarBuilder,
    config: &RobertaConfig,
    prefix: &str,
    pooler: PoolerInit,
) -> ModelResult<TowerWeights> {
    let embeddings = load_embeddings(vb, config, prefix)?;

    let mut layers = Vec::with_capacity(config.num_hidden_layers);
    for layer_idx in 0..config.num_hidden_layers {
        layers.push(load_encoder_layer(vb, config, prefix, layer_idx)?);
    }

    let pooler = load_pooler(vb, config, prefix, pooler)?;

    tracing::debug!(
        prefix,
        layers = config.num_hidden_layers,
        hidden_size = config.hidden_size,
        "Encoder tower loaded"
    );

    Ok(TowerWeights {
        embeddings,
        layers,
        pooler,
    })
}

fn get(vb: &VarBuilder, shape: &[usize], prefix: &str, suffix: &str) -> ModelResult<Tensor> {
    let name = tensor_name(prefix, suffix);
    vb.get(shape, &name)
        .map_err(|e| ModelError::WeightLoadError {
            tensor: name,
            message: e.to_string(),
        })
}

fn linear(
    vb: &VarBuilder,
    out_dim: usize,
    in_dim: usize,
    prefix: &str,
    module: &str,
) -> ModelResult<Linear> {
    let weight = get(vb, &[out_dim, in_dim], prefix, &format!("{}.weight", module))?;
    let bias = get(vb, &[out_dim], prefix, &format!("{}.bias", module))?;
    Ok(Linear::new(weight, Some(bias)))
}

fn layer_norm(
    vb: &VarBuilder,
    config: &RobertaConfig,
    prefix: &str,
    module: &str,
) -> ModelResult<LayerNorm> {
    let weight = get(vb, &[config.hidden_size], prefix, &format!("{}.weight", module))?;
    let bias = get(vb, &[config.hidden_size], prefix, &format!("{}.bias", module))?;
    Ok(LayerNorm::new(weight, bias, config.layer_norm_eps))
}

fn load_embeddings(
    vb: &VarBuilder,
    config: &RobertaConfig,
    prefix: &str,
) -> ModelResult<EmbeddingWeights> {
    let h = config.hidden_size;
    let word = get(vb, &[config.vocab_size, h], prefix, "embeddings.word_embeddings.weight")?;
    let position = get(
        vb,
        &[config.max_position_embeddings, h],
        prefix,
        "embeddings.position_embeddings.weight",
    )?;
    let token_type = get(
        vb,
        &[config.type_vocab_size, h],
        prefix,
        "embeddings.token_type_embeddings.weight",
    )?;

    Ok(EmbeddingWeights {
        word_embeddings: Embedding::new(word, h),
        position_embeddings: Embedding::new(position, h),
        token_type_embeddings: Embedding::new(token_type, h),
        layer_norm: layer_norm(vb, config, prefix, "embeddings.LayerNorm")?,
    })
}

fn load_encoder_layer(
    vb: &VarBuilder,
    config: &RobertaConfig,
    prefix: &str,
    layer_idx: usize,
) -> ModelResult<EncoderLayerWeights> {
    let h = config.hidden_size;
    let layer = format!("encoder.layer.{}", layer_idx);

    let attention = AttentionWeights {
        query: linear(vb, h, h, prefix, &format!("{}.attention.self.query", layer))?,
        key: linear(vb, h, h, prefix, &format!("{}.attention.self.key", layer))?,
        value: linear(vb, h, h, prefix, &format!("{}.attention.self.value", layer))?,
        output: linear(vb, h, h, prefix, &format!("{}.attention.output.dense", layer))?,
        layer_norm: layer_norm(vb, config, prefix, &format!("{}.attention.output.LayerNorm", layer))?,
    };

    let ffn = FfnWeights {
        intermediate: linear(
            vb,
            config.intermediate_size,
            h,
            prefix,
            &format!("{}.intermediate.dense", layer),
        )?,
        output: linear(
            vb,
            h,
            config.intermediate_size,
            prefix,
            &format!("{}.output.dense", layer),
        )?,
        layer_norm: layer_norm(vb, config, prefix, &format!("{}.output.LayerNorm", layer))?,
    };

    Ok(EncoderLayerWeights { attention, ffn })
}

fn load_pooler(
    vb: &VarBuilder,
    config: &RobertaConfig,
    prefix: &str,
    init: PoolerInit,
) -> ModelResult<PoolerWeights> {
    let h = config.hidden_size;
    let weight_name = tensor_name(prefix, "pooler.dense.weight");

    if init == PoolerInit::RandomIfMissing && !vb.contains_tensor(&weight_name) {
        tracing::warn!(
            tensor = %weight_name,
            "Pooler weights not found in snapshot; initializing randomly"
        );
        let std = config.initializer_range as f32;
        let weight = Tensor::randn(0f32, std, (h, h), vb.device())
            .map_err(tensor_err("pooler weight init"))?;
        let bias = Tensor::zeros(h, DType::F32, vb.device())
            .map_err(tensor_err("pooler bias init"))?;
        return Ok(PoolerWeights {
            dense: Linear::new(weight, Some(bias)),
        });
    }

    Ok(PoolerWeights {
        dense: linear(vb, h, h, prefix, "pooler.dense")?,
    })
}
