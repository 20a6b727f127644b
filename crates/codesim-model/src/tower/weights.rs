//! Weight structures for one RoBERTa encoder tower.

use candle_nn::{Embedding, LayerNorm, Linear};

/// Embedding block: word + position + token type, then LayerNorm.
#[derive(Debug)]
pub struct EmbeddingWeights {
    /// Word embeddings: [vocab_size, hidden_size]
    pub word_embeddings: Embedding,
    /// Position embeddings: [max_position_embeddings, hidden_size]
    pub position_embeddings: Embedding,
    /// Token type embeddings: [type_vocab_size, hidden_size]
    pub token_type_embeddings: Embedding,
    /// Embedding LayerNorm.
    pub layer_norm: LayerNorm,
}

/// Self-attention block including its output projection and LayerNorm.
#[derive(Debug)]
pub struct AttentionWeights {
    /// Query projection: [hidden_size, hidden_size]
    pub query: Linear,
    /// Key projection: [hidden_size, hidden_size]
    pub key: Linear,
    /// Value projection: [hidden_size, hidden_size]
    pub value: Linear,
    /// Output projection: [hidden_size, hidden_size]
    pub output: Linear,
    /// Post-attention LayerNorm.
    pub layer_norm: LayerNorm,
}

/// Feed-forward block.
#[derive(Debug)]
pub struct FfnWeights {
    /// Intermediate projection: [intermediate_size, hidden_size]
    pub intermediate: Linear,
    /// Output projection: [hidden_size, intermediate_size]
    pub output: Linear,
    /// Post-FFN LayerNorm.
    pub layer_norm: LayerNorm,
}

/// One encoder layer.
#[derive(Debug)]
pub struct EncoderLayerWeights {
    pub attention: AttentionWeights,
    pub ffn: FfnWeights,
}

/// Pooling head: dense + tanh over the first token.
#[derive(Debug)]
pub struct PoolerWeights {
    /// Dense projection: [hidden_size, hidden_size]
    pub dense: Linear,
}

/// Complete tower weights.
#[derive(Debug)]
pub struct TowerWeights {
    pub embeddings: EmbeddingWeights,
    pub layers: Vec<EncoderLayerWeights>,
    pub pooler: PoolerWeights,
}
