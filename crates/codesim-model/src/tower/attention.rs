//! Multi-head self-attention for the RoBERTa tower.

use candle_core::{Tensor, D};
use candle_nn::Module;

use crate::config::RobertaConfig;
use crate::error::{tensor_err, ModelResult};

use super::ops::dropout;
use super::weights::AttentionWeights;

/// Output of one attention block.
pub struct AttentionOutput {
    /// Post-LayerNorm hidden states [batch, seq, hidden].
    pub hidden_states: Tensor,
    /// Attention probabilities [batch, heads, seq, seq].
    pub probs: Tensor,
}

/// Split [batch, seq, hidden] into [batch, heads, seq, head_dim].
fn split_heads(xs: &Tensor, config: &RobertaConfig) -> ModelResult<Tensor> {
    let (batch_size, seq_len, _) = xs.dims3().map_err(tensor_err("split heads dims"))?;
    xs.reshape((batch_size, seq_len, config.num_attention_heads, config.head_dim()))
        .map_err(tensor_err("split heads reshape"))?
        .transpose(1, 2)
        .map_err(tensor_err("split heads transpose"))?
        .contiguous()
        .map_err(tensor_err("split heads contiguous"))
}

/// Self-attention, output projection, residual and LayerNorm.
///
/// `extended_mask` is the additive [batch, 1, 1, seq] mask; `head_mask`, when
/// given, is a [heads] multiplier applied to the attention probabilities.
pub fn self_attention_forward(
    hidden_states: &Tensor,
    attention: &AttentionWeights,
    extended_mask: &Tensor,
    head_mask: Option<&Tensor>,
    config: &RobertaConfig,
    train: bool,
) -> ModelResult<AttentionOutput> {
    let (batch_size, seq_len, hidden_size) = hidden_states
        .dims3()
        .map_err(tensor_err("attention input dims"))?;

    let query = attention.query.forward(hidden_states).map_err(tensor_err("query projection"))?;
    let key = attention.key.forward(hidden_states).map_err(tensor_err("key projection"))?;
    let value = attention.value.forward(hidden_states).map_err(tensor_err("value projection"))?;

    let query = split_heads(&query, config)?;
    let key = split_heads(&key, config)?;
    let value = split_heads(&value, config)?;

    let scale = 1.0 / (config.head_dim() as f64).sqrt();
    let key_t = key
        .t()
        .map_err(tensor_err("key transpose"))?
        .contiguous()
        .map_err(tensor_err("key contiguous"))?;
    let scores = query
        .matmul(&key_t)
        .map_err(tensor_err("attention scores"))?
        .affine(scale, 0.0)
        .map_err(tensor_err("attention scale"))?
        .broadcast_add(extended_mask)
        .map_err(tensor_err("attention mask add"))?;

    let probs = candle_nn::ops::softmax(&scores, D::Minus1).map_err(tensor_err("attention softmax"))?;
    let probs = dropout(&probs, config.attention_probs_dropout_prob, train)?;
    let probs = match head_mask {
        Some(mask) => {
            let mask = mask
                .reshape((1, config.num_attention_heads, 1, 1))
                .map_err(tensor_err("head mask reshape"))?;
            probs.broadcast_mul(&mask).map_err(tensor_err("head mask apply"))?
        }
        None => probs,
    };

    let context = probs
        .matmul(&value)
        .map_err(tensor_err("attention context"))?
        .transpose(1, 2)
        .map_err(tensor_err("context transpose"))?
        .contiguous()
        .map_err(tensor_err("context contiguous"))?
        .reshape((batch_size, seq_len, hidden_size))
        .map_err(tensor_err("context reshape"))?;

    let projected = attention.output.forward(&context).map_err(tensor_err("attention output"))?;
    let projected = dropout(&projected, config.hidden_dropout_prob, train)?;
    let residual = projected.add(hidden_states).map_err(tensor_err("attention residual"))?;
    let hidden_states = attention
        .layer_norm
        .forward(&residual)
        .map_err(tensor_err("attention LayerNorm"))?;

    Ok(AttentionOutput {
        hidden_states,
        probs,
    })
}
