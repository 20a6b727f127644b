//! RoBERTa encoder tower.
//!
//! One tower turns a padded batch of token ids into a pooled vector per
//! example (dense + tanh over the first token). The twin model owns two of
//! these, loaded independently.
//!
//! # Module Structure
//!
//! - `weights`: Weight structures
//! - `loader`: Shape-checked loading from a `VarBuilder`
//! - `ops`: Masks, position ids, activation, dropout
//! - `attention`: Multi-head self-attention block
//! - `encoder`: Layer stack and FFN block

mod attention;
mod encoder;
mod loader;
mod ops;
mod weights;

use candle_core::{DType, Tensor};
use candle_nn::{Module, VarBuilder};

use crate::config::RobertaConfig;
use crate::error::{tensor_err, ModelError, ModelResult};

pub use loader::PoolerInit;
pub use ops::create_position_ids;
pub use weights::TowerWeights;

pub(crate) use ops::dropout;

use encoder::run_encoder;
use ops::extended_attention_mask;

/// Forward-pass switches shared by both towers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwardOptions {
    /// Enable dropout. Off means deterministic eval mode.
    pub train: bool,
    /// Collect the embedding output and every layer output.
    pub output_hidden_states: bool,
    /// Collect every layer's attention probabilities.
    pub output_attentions: bool,
}

impl ForwardOptions {
    /// Deterministic inference with no traces.
    pub fn eval() -> Self {
        Self::default()
    }

    /// Dropout enabled.
    pub fn train() -> Self {
        Self {
            train: true,
            ..Self::default()
        }
    }

    /// Also return hidden states and attentions of both towers.
    #[must_use]
    pub fn with_traces(mut self) -> Self {
        self.output_hidden_states = true;
        self.output_attentions = true;
        self
    }
}

/// Inputs for one tower.
#[derive(Debug, Clone, Copy)]
pub struct TowerInput<'a> {
    /// Token ids [batch, seq] (u32).
    pub input_ids: &'a Tensor,
    /// 0/1 attention mask [batch, seq].
    pub attention_mask: &'a Tensor,
    /// Explicit position ids [batch, seq]; derived from padding when absent.
    pub position_ids: Option<&'a Tensor>,
    /// [heads] or [layers, heads] attention-probability multiplier.
    pub head_mask: Option<&'a Tensor>,
}

/// Output of one tower.
#[derive(Debug, Clone)]
pub struct TowerOutput {
    /// Final layer hidden states [batch, seq, hidden].
    pub last_hidden_state: Tensor,
    /// Pooled first-token representation [batch, hidden].
    pub pooled: Tensor,
    pub hidden_states: Option<Vec<Tensor>>,
    pub attentions: Option<Vec<Tensor>>,
}

/// A single RoBERTa encoder with pooling head.
#[derive(Debug)]
pub struct RobertaTower {
    weights: TowerWeights,
    config: RobertaConfig,
}

impl RobertaTower {
    /// Load a tower stored under `prefix` in `vb`.
    pub fn load(
        vb: &VarBuilder,
        config: &RobertaConfig,
        prefix: &str,
        pooler: PoolerInit,
    ) -> ModelResult<Self> {
        config.validate()?;
        let weights = loader::load_tower(vb, config, prefix, pooler)?;
        Ok(Self {
            weights,
            config: config.clone(),
        })
    }

    /// Width of the pooled vector, read from the loaded pooler weights.
    pub fn pooled_dim(&self) -> ModelResult<usize> {
        self.weights
            .pooler
            .dense
            .weight()
            .dim(0)
            .map_err(tensor_err("pooler weight dims"))
    }

    /// Encode a batch and pool it.
    pub fn forward(&self, input: TowerInput<'_>, options: &ForwardOptions) -> ModelResult<TowerOutput> {
        let (batch_size, seq_len) = input
            .input_ids
            .dims2()
            .map_err(tensor_err("input ids dims"))?;
        let mask_dims = input.attention_mask.dims();
        if mask_dims != [batch_size, seq_len] {
            return Err(ModelError::ShapeMismatch {
                context: "attention mask".to_string(),
                expected: vec![batch_size, seq_len],
                actual: mask_dims.to_vec(),
            });
        }
        if seq_len > self.config.max_sequence_length() {
            return Err(ModelError::ConfigError {
                message: format!(
                    "sequence length {} exceeds the position table limit {}",
                    seq_len,
                    self.config.max_sequence_length()
                ),
            });
        }

        let embeddings = self.embed(input.input_ids, input.position_ids, options.train)?;
        let extended_mask = extended_attention_mask(input.attention_mask)?;

        let encoded = run_encoder(
            embeddings,
            &extended_mask,
            input.head_mask,
            &self.weights.layers,
            &self.config,
            options,
        )?;

        let pooled = self.pool(&encoded.last_hidden_state)?;

        Ok(TowerOutput {
            last_hidden_state: encoded.last_hidden_state,
            pooled,
            hidden_states: encoded.hidden_states,
            attentions: encoded.attentions,
        })
    }

    /// word + position + token_type embeddings, LayerNorm, dropout.
    fn embed(&self, input_ids: &Tensor, position_ids: Option<&Tensor>, train: bool) -> ModelResult<Tensor> {
        let device = input_ids.device();
        let embeddings = &self.weights.embeddings;

        let position_ids = match position_ids {
            Some(ids) => ids.clone(),
            None => create_position_ids(input_ids, self.config.pad_token_id, device)?,
        };
        let token_type_ids = input_ids.zeros_like().map_err(tensor_err("token type ids"))?;

        let words = embeddings
            .word_embeddings
            .forward(input_ids)
            .map_err(tensor_err("word embedding lookup"))?;
        let positions = embeddings
            .position_embeddings
            .forward(&position_ids.to_dtype(DType::U32).map_err(tensor_err("position ids dtype"))?)
            .map_err(tensor_err("position embedding lookup"))?;
        let token_types = embeddings
            .token_type_embeddings
            .forward(&token_type_ids)
            .map_err(tensor_err("token type embedding lookup"))?;

        let summed = (words + positions)
            .and_then(|x| x + token_types)
            .map_err(tensor_err("embedding sum"))?;
        let normed = embeddings
            .layer_norm
            .forward(&summed)
            .map_err(tensor_err("embedding LayerNorm"))?;

        dropout(&normed, self.config.hidden_dropout_prob, train)
    }

    /// Dense + tanh over the first token.
    fn pool(&self, hidden_states: &Tensor) -> ModelResult<Tensor> {
        let first_token = hidden_states
            .narrow(1, 0, 1)
            .map_err(tensor_err("pooler first token"))?
            .squeeze(1)
            .map_err(tensor_err("pooler squeeze"))?;
        self.weights
            .pooler
            .dense
            .forward(&first_token)
            .map_err(tensor_err("pooler dense"))?
            .tanh()
            .map_err(tensor_err("pooler tanh"))
    }
}
