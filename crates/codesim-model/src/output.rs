//! Output of the twin-encoder forward pass.

use candle_core::Tensor;

use crate::error::{tensor_err, ModelResult};

/// Similarity scores, optional loss, and optional per-tower traces.
#[derive(Debug, Clone)]
pub struct SimilarityOutput {
    /// Scalar BCE-with-logits loss, present when the batch carried labels.
    pub loss: Option<Tensor>,
    /// Cosine similarity per example [batch], bounded in [-1, 1].
    pub logits: Tensor,
    /// Post-dropout pooled vector of snippet A [batch, hidden].
    pub pooled_a: Tensor,
    /// Post-dropout pooled vector of snippet B [batch, hidden].
    pub pooled_b: Tensor,
    pub hidden_states_a: Option<Vec<Tensor>>,
    pub attentions_a: Option<Vec<Tensor>>,
    pub hidden_states_b: Option<Vec<Tensor>>,
    pub attentions_b: Option<Vec<Tensor>>,
}

impl SimilarityOutput {
    /// Logits copied to the host.
    pub fn logits_vec(&self) -> ModelResult<Vec<f32>> {
        self.logits.to_vec1::<f32>().map_err(tensor_err("logits to host"))
    }

    /// Loss copied to the host.
    pub fn loss_value(&self) -> ModelResult<Option<f32>> {
        self.loss
            .as_ref()
            .map(|loss| loss.to_scalar::<f32>().map_err(tensor_err("loss to host")))
            .transpose()
    }
}
