//! Encoder layer stack: attention block followed by the FFN block.

use candle_core::{DType, Tensor};
use candle_nn::Module;

use crate::config::RobertaConfig;
use crate::error::{tensor_err, ModelError, ModelResult};

use super::attention::self_attention_forward;
use super::ops::{activate, dropout};
use super::weights::{EncoderLayerWeights, FfnWeights};
use super::ForwardOptions;

/// Output of the full encoder stack.
pub struct EncoderOutput {
    pub last_hidden_state: Tensor,
    /// Embedding output plus every layer output, when requested.
    pub hidden_states: Option<Vec<Tensor>>,
    /// Attention probabilities of every layer, when requested.
    pub attentions: Option<Vec<Tensor>>,
}

/// Per-layer head mask, normalized from a [heads] or [layers, heads] tensor.
pub(crate) fn head_mask_for_layer(
    head_mask: Option<&Tensor>,
    layer_idx: usize,
    config: &RobertaConfig,
) -> ModelResult<Option<Tensor>> {
    let Some(mask) = head_mask else {
        return Ok(None);
    };
    let mask = mask.to_dtype(DType::F32).map_err(tensor_err("head mask dtype"))?;
    let heads = config.num_attention_heads;
    match mask.dims() {
        [h] if *h == heads => Ok(Some(mask)),
        [l, h] if *l == config.num_hidden_layers && *h == heads => Ok(Some(
            mask.get(layer_idx).map_err(tensor_err("head mask layer select"))?,
        )),
        other => Err(ModelError::ShapeMismatch {
            context: "head mask".to_string(),
            expected: vec![config.num_hidden_layers, heads],
            actual: other.to_vec(),
        }),
    }
}

/// Run every encoder layer over the embedding output.
pub fn run_encoder(
    embeddings: Tensor,
    extended_mask: &Tensor,
    head_mask: Option<&Tensor>,
    layers: &[EncoderLayerWeights],
    config: &RobertaConfig,
    options: &ForwardOptions,
) -> ModelResult<EncoderOutput> {
    let mut all_hidden = options
        .output_hidden_states
        .then(|| Vec::with_capacity(layers.len() + 1));
    let mut all_attentions = options
        .output_attentions
        .then(|| Vec::with_capacity(layers.len()));

    let mut hidden_states = embeddings;
    for (layer_idx, layer) in layers.iter().enumerate() {
        if let Some(all) = all_hidden.as_mut() {
            all.push(hidden_states.clone());
        }

        let layer_head_mask = head_mask_for_layer(head_mask, layer_idx, config)?;
        let attention = self_attention_forward(
            &hidden_states,
            &layer.attention,
            extended_mask,
            layer_head_mask.as_ref(),
            config,
            options.train,
        )?;
        if let Some(all) = all_attentions.as_mut() {
            all.push(attention.probs);
        }

        hidden_states = ffn_forward(&attention.hidden_states, &layer.ffn, config, options.train)?;
    }

    if let Some(all) = all_hidden.as_mut() {
        all.push(hidden_states.clone());
    }

    Ok(EncoderOutput {
        last_hidden_state: hidden_states,
        hidden_states: all_hidden,
        attentions: all_attentions,
    })
}

/// Intermediate dense + activation, output dense, residual, LayerNorm.
fn ffn_forward(
    hidden_states: &Tensor,
    ffn: &FfnWeights,
    config: &RobertaConfig,
    train: bool,
) -> ModelResult<Tensor> {
    let intermediate = ffn
        .intermediate
        .forward(hidden_states)
        .map_err(tensor_err("FFN intermediate"))?;
    let intermediate = activate(&intermediate, config.hidden_act)?;

    let output = ffn.output.forward(&intermediate).map_err(tensor_err("FFN output"))?;
    let output = dropout(&output, config.hidden_dropout_prob, train)?;
    let residual = output.add(hidden_states).map_err(tensor_err("FFN residual"))?;

    ffn.layer_norm.forward(&residual).map_err(tensor_err("FFN LayerNorm"))
}
