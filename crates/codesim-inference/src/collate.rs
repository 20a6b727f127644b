//! Dynamic padding of encoded pairs into model batches.

use candle_core::Device;
use codesim_model::{EncodedBatch, PaddedSide};

use crate::encode::EncodedPair;
use crate::error::InferenceResult;

/// Pads each side of a batch to its own longest sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Collator {
    pad_token_id: u32,
}

impl Collator {
    pub fn new(pad_token_id: u32) -> Self {
        Self { pad_token_id }
    }

    /// Right-pad `sequences` with the pad id; mask is 1 on tokens, 0 on padding.
    pub fn pad<'a, I>(&self, sequences: I) -> PaddedSide
    where
        I: IntoIterator<Item = &'a [u32]>,
        I::IntoIter: Clone,
    {
        let sequences = sequences.into_iter();
        let seq_len = sequences.clone().map(<[u32]>::len).max().unwrap_or(0).max(1);

        let mut input_ids = Vec::new();
        let mut attention_mask = Vec::new();
        for ids in sequences {
            input_ids.extend_from_slice(ids);
            input_ids.resize(input_ids.len() + seq_len - ids.len(), self.pad_token_id);
            attention_mask.extend(std::iter::repeat(1u32).take(ids.len()));
            attention_mask.extend(std::iter::repeat(0u32).take(seq_len - ids.len()));
        }

        PaddedSide {
            input_ids,
            attention_mask,
            seq_len,
        }
    }

    /// Build a device batch from a slice of pairs.
    pub fn collate(&self, pairs: &[EncodedPair], device: &Device) -> InferenceResult<EncodedBatch> {
        let side_a = self.pad(pairs.iter().map(|p| p.ids_a.as_slice()));
        let side_b = self.pad(pairs.iter().map(|p| p.ids_b.as_slice()));
        Ok(EncodedBatch::from_host(side_a, side_b, pairs.len(), device)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(a: &[u32], b: &[u32]) -> EncodedPair {
        EncodedPair {
            ids_a: a.to_vec(),
            ids_b: b.to_vec(),
        }
    }

    #[test]
    fn test_pads_with_pad_id_and_zero_mask() {
        let collator = Collator::new(1);
        let side = collator.pad([&[0u32, 9, 2][..], &[0, 2][..]]);
        assert_eq!(side.seq_len, 3);
        assert_eq!(side.input_ids, vec![0, 9, 2, 0, 2, 1]);
        assert_eq!(side.attention_mask, vec![1, 1, 1, 1, 1, 0]);
    }

    #[test]
    fn test_sides_padded_independently() {
        let collator = Collator::new(1);
        let pairs = vec![pair(&[0, 4, 5, 6, 2], &[0, 2]), pair(&[0, 2], &[0, 7, 2])];
        let batch = collator.collate(&pairs, &Device::Cpu).unwrap();

        assert_eq!(batch.input_ids_a.dims(), &[2, 5]);
        assert_eq!(batch.input_ids_b.dims(), &[2, 3]);
        let mask_b: Vec<Vec<u32>> = batch.attention_mask_b.to_vec2().unwrap();
        assert_eq!(mask_b, vec![vec![1, 1, 0], vec![1, 1, 1]]);
        let ids_a: Vec<Vec<u32>> = batch.input_ids_a.to_vec2().unwrap();
        assert_eq!(ids_a[1], vec![0, 2, 1, 1, 1]);
    }

    #[test]
    fn test_custom_pad_id() {
        let side = Collator::new(0).pad([&[5u32][..], &[5, 6, 7][..]]);
        assert_eq!(side.input_ids, vec![5, 0, 0, 5, 6, 7]);
    }
}
