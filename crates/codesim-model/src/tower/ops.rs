//! Small tensor helpers shared by the tower forward pass.

use candle_core::{DType, Device, Tensor};

use crate::config::HiddenAct;
use crate::error::{tensor_err, ModelResult};

/// Additive value for masked attention positions.
const MASKED_SCORE: f64 = -10000.0;

/// Turn a [batch, seq] 0/1 attention mask into an additive
/// [batch, 1, 1, seq] mask: 0 where attended, -10000 where padded.
pub fn extended_attention_mask(attention_mask: &Tensor) -> ModelResult<Tensor> {
    let (batch_size, seq_len) = attention_mask
        .dims2()
        .map_err(tensor_err("attention mask dims"))?;

    attention_mask
        .to_dtype(DType::F32)
        .map_err(tensor_err("attention mask dtype"))?
        // m * 10000 - 10000 == (1 - m) * -10000
        .affine(-MASKED_SCORE, MASKED_SCORE)
        .map_err(tensor_err("attention mask invert"))?
        .reshape((batch_size, 1, 1, seq_len))
        .map_err(tensor_err("attention mask reshape"))
}

/// RoBERTa position ids: non-pad tokens count up from `pad_token_id + 1`,
/// pad tokens keep `pad_token_id`.
pub fn create_position_ids(input_ids: &Tensor, pad_token_id: u32, device: &Device) -> ModelResult<Tensor> {
    let (batch_size, seq_len) = input_ids.dims2().map_err(tensor_err("input ids dims"))?;
    let rows: Vec<Vec<u32>> = input_ids
        .to_dtype(DType::U32)
        .map_err(tensor_err("input ids dtype"))?
        .to_vec2()
        .map_err(tensor_err("input ids to host"))?;

    let mut positions = Vec::with_capacity(batch_size * seq_len);
    for row in &rows {
        let mut next = pad_token_id;
        for &id in row {
            if id == pad_token_id {
                positions.push(pad_token_id);
            } else {
                next += 1;
                positions.push(next);
            }
        }
    }

    Tensor::from_vec(positions, (batch_size, seq_len), device).map_err(tensor_err("position ids"))
}

/// Apply the configured FFN activation.
pub fn activate(xs: &Tensor, act: HiddenAct) -> ModelResult<Tensor> {
    match act {
        HiddenAct::Gelu => xs.gelu_erf(),
        HiddenAct::GeluNew => xs.gelu(),
        HiddenAct::Relu => xs.relu(),
    }
    .map_err(tensor_err("activation"))
}

/// Dropout that is the identity outside training or at rate 0.
pub fn dropout(xs: &Tensor, rate: f64, train: bool) -> ModelResult<Tensor> {
    if !train || rate <= 0.0 {
        return Ok(xs.clone());
    }
    candle_nn::ops::dropout(xs, rate as f32).map_err(tensor_err("dropout"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_ids_skip_padding() {
        let device = Device::Cpu;
        // pad = 1; second row is right-padded
        let ids = Tensor::new(&[[0u32, 5, 6, 2], [0, 7, 2, 1]], &device).unwrap();
        let positions: Vec<Vec<u32>> = create_position_ids(&ids, 1, &device)
            .unwrap()
            .to_vec2()
            .unwrap();
        assert_eq!(positions, vec![vec![2, 3, 4, 5], vec![2, 3, 4, 1]]);
    }

    #[test]
    fn test_extended_mask_values() {
        let device = Device::Cpu;
        let mask = Tensor::new(&[[1u32, 1, 0]], &device).unwrap();
        let ext = extended_attention_mask(&mask).unwrap();
        assert_eq!(ext.dims(), &[1, 1, 1, 3]);
        let values: Vec<f32> = ext.flatten_all().unwrap().to_vec1().unwrap();
        assert_eq!(values, vec![0.0, 0.0, -10000.0]);
    }

    #[test]
    fn test_dropout_is_identity_in_eval() {
        let device = Device::Cpu;
        let xs = Tensor::new(&[1.0f32, 2.0, 3.0], &device).unwrap();
        let out: Vec<f32> = dropout(&xs, 0.5, false).unwrap().to_vec1().unwrap();
        assert_eq!(out, vec![1.0, 2.0, 3.0]);
    }
}
