//! Batched, padded model inputs for a pair of snippets.

use candle_core::{DType, Device, Tensor};

use crate::error::{tensor_err, ModelError, ModelResult};

/// Two independently tokenized and padded sequences per example, aligned by
/// batch index. Snippet A feeds the first tower, snippet B the second.
#[derive(Debug, Clone)]
pub struct EncodedBatch {
    /// [batch, seq_a] u32
    pub input_ids_a: Tensor,
    /// [batch, seq_a] u32, 1 = token, 0 = padding
    pub attention_mask_a: Tensor,
    /// [batch, seq_b] u32
    pub input_ids_b: Tensor,
    /// [batch, seq_b] u32
    pub attention_mask_b: Tensor,
    /// Optional explicit position ids, passed to both towers.
    pub position_ids: Option<Tensor>,
    /// Optional [heads] or [layers, heads] head mask, passed to both towers.
    pub head_mask: Option<Tensor>,
    /// Optional binary labels [batch] (f32); triggers loss computation.
    pub labels: Option<Tensor>,
}

/// One side of a batch on the host: row-major ids and mask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaddedSide {
    pub input_ids: Vec<u32>,
    pub attention_mask: Vec<u32>,
    pub seq_len: usize,
}

impl EncodedBatch {
    /// Build a batch from device tensors, checking that both sides agree on
    /// the batch dimension and each mask matches its ids.
    pub fn new(
        input_ids_a: Tensor,
        attention_mask_a: Tensor,
        input_ids_b: Tensor,
        attention_mask_b: Tensor,
    ) -> ModelResult<Self> {
        let (batch_a, _) = input_ids_a.dims2().map_err(tensor_err("input_ids_a dims"))?;
        let (batch_b, _) = input_ids_b.dims2().map_err(tensor_err("input_ids_b dims"))?;
        if batch_a != batch_b {
            return Err(ModelError::ShapeMismatch {
                context: "pair batch size".to_string(),
                expected: vec![batch_a],
                actual: vec![batch_b],
            });
        }
        for (ids, mask, side) in [
            (&input_ids_a, &attention_mask_a, "a"),
            (&input_ids_b, &attention_mask_b, "b"),
        ] {
            if ids.dims() != mask.dims() {
                return Err(ModelError::ShapeMismatch {
                    context: format!("attention_mask_{}", side),
                    expected: ids.dims().to_vec(),
                    actual: mask.dims().to_vec(),
                });
            }
        }

        Ok(Self {
            input_ids_a,
            attention_mask_a,
            input_ids_b,
            attention_mask_b,
            position_ids: None,
            head_mask: None,
            labels: None,
        })
    }

    /// Upload two host-side padded sides.
    pub fn from_host(
        a: PaddedSide,
        b: PaddedSide,
        batch_size: usize,
        device: &Device,
    ) -> ModelResult<Self> {
        let upload = |values: Vec<u32>, seq_len: usize, what: &str| {
            Tensor::from_vec(values, (batch_size, seq_len), device).map_err(|e| {
                ModelError::TensorError {
                    message: format!("{} upload failed: {}", what, e),
                }
            })
        };
        Self::new(
            upload(a.input_ids, a.seq_len, "input_ids_a")?,
            upload(a.attention_mask, a.seq_len, "attention_mask_a")?,
            upload(b.input_ids, b.seq_len, "input_ids_b")?,
            upload(b.attention_mask, b.seq_len, "attention_mask_b")?,
        )
    }

    /// Attach binary labels.
    pub fn with_labels(mut self, labels: &[f32]) -> ModelResult<Self> {
        let batch_size = self.batch_size()?;
        if labels.len() != batch_size {
            return Err(ModelError::ShapeMismatch {
                context: "labels".to_string(),
                expected: vec![batch_size],
                actual: vec![labels.len()],
            });
        }
        let device = self.input_ids_a.device().clone();
        self.labels = Some(
            Tensor::from_slice(labels, batch_size, &device)
                .and_then(|t| t.to_dtype(DType::F32))
                .map_err(tensor_err("labels upload"))?,
        );
        Ok(self)
    }

    /// Attach explicit position ids (shared by both towers).
    #[must_use]
    pub fn with_position_ids(mut self, position_ids: Tensor) -> Self {
        self.position_ids = Some(position_ids);
        self
    }

    /// Attach a head mask (shared by both towers).
    #[must_use]
    pub fn with_head_mask(mut self, head_mask: Tensor) -> Self {
        self.head_mask = Some(head_mask);
        self
    }

    /// Number of examples.
    pub fn batch_size(&self) -> ModelResult<usize> {
        self.input_ids_a.dim(0).map_err(tensor_err("batch size"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn side(ids: Vec<u32>, mask: Vec<u32>, seq_len: usize) -> PaddedSide {
        PaddedSide {
            input_ids: ids,
            attention_mask: mask,
            seq_len,
        }
    }

    #[test]
    fn test_sides_may_differ_in_length() {
        let a = side(vec![0, 5, 2, 0, 2, 1], vec![1, 1, 1, 1, 1, 0], 3);
        let b = side(vec![0, 2, 0, 2], vec![1, 1, 1, 1], 2);
        let batch = EncodedBatch::from_host(a, b, 2, &Device::Cpu).unwrap();
        assert_eq!(batch.batch_size().unwrap(), 2);
        assert_eq!(batch.input_ids_a.dims(), &[2, 3]);
        assert_eq!(batch.input_ids_b.dims(), &[2, 2]);
    }

    #[test]
    fn test_batch_size_mismatch_rejected() {
        let device = Device::Cpu;
        let a = Tensor::zeros((2, 3), DType::U32, &device).unwrap();
        let b = Tensor::zeros((3, 3), DType::U32, &device).unwrap();
        let err = EncodedBatch::new(a.clone(), a, b.clone(), b).unwrap_err();
        assert!(matches!(err, ModelError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_label_count_must_match() {
        let device = Device::Cpu;
        let ids = Tensor::zeros((2, 3), DType::U32, &device).unwrap();
        let batch = EncodedBatch::new(ids.clone(), ids.clone(), ids.clone(), ids).unwrap();
        assert!(batch.clone().with_labels(&[1.0]).is_err());
        let labelled = batch.with_labels(&[1.0, 0.0]).unwrap();
        assert_eq!(labelled.labels.unwrap().dims(), &[2]);
    }
}
