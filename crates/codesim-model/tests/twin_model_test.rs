//! Integration tests for loading and running the twin model from real
//! safetensors checkpoints on disk.

use candle_core::{DType, Device, Tensor};
use codesim_model::{
    EncodedBatch, ForwardOptions, ModelError, RobertaConfig, TwinEncoderModel,
};
use codesim_test_utils::{
    tiny_config, write_base_model, write_config, write_mirrored_checkpoint, write_twin_checkpoint,
    write_twin_weights,
};

fn pair_batch(device: &Device) -> EncodedBatch {
    // <s> def x ( ) </s> / <s> return x + 1 </s>, second row padded
    let ids_a = Tensor::new(&[[0u32, 4, 13, 21, 22, 2], [0, 5, 13, 2, 1, 1]], device).unwrap();
    let mask_a = Tensor::new(&[[1u32, 1, 1, 1, 1, 1], [1, 1, 1, 1, 0, 0]], device).unwrap();
    let ids_b = Tensor::new(&[[0u32, 4, 14, 2], [0, 5, 26, 2]], device).unwrap();
    let mask_b = Tensor::new(&[[1u32, 1, 1, 1], [1, 1, 1, 1]], device).unwrap();
    EncodedBatch::new(ids_a, mask_a, ids_b, mask_b).unwrap()
}

fn identical_pair_batch(device: &Device) -> EncodedBatch {
    let ids = Tensor::new(&[[0u32, 6, 21, 13, 22, 2], [0, 7, 15, 8, 9, 2]], device).unwrap();
    let mask = Tensor::ones((2, 6), DType::U32, device).unwrap();
    EncodedBatch::new(ids.clone(), mask.clone(), ids, mask).unwrap()
}

fn load_fold(dir: &std::path::Path) -> TwinEncoderModel {
    let config = RobertaConfig::from_dir(dir).unwrap();
    TwinEncoderModel::load(dir, &config, &Device::Cpu).unwrap()
}

#[test]
fn test_eval_forward_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    write_twin_checkpoint(dir.path(), &tiny_config(), 7);
    let model = load_fold(dir.path());
    let batch = pair_batch(&Device::Cpu);

    let first = model.predict(&batch).unwrap();
    let second = model.predict(&batch).unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(first, second);
    for score in first {
        assert!((-1.0..=1.0).contains(&score), "score {} out of range", score);
    }
}

#[test]
fn test_train_mode_applies_dropout() {
    let dir = tempfile::tempdir().unwrap();
    let config = RobertaConfig {
        hidden_dropout_prob: 0.5,
        ..tiny_config()
    };
    write_twin_checkpoint(dir.path(), &config, 3);
    let model = load_fold(dir.path());
    let batch = pair_batch(&Device::Cpu);

    let eval = model.predict(&batch).unwrap();
    let train = model
        .forward(&batch, &ForwardOptions::train())
        .unwrap()
        .logits_vec()
        .unwrap();
    assert_ne!(eval, train);
}

#[test]
fn test_traces_cover_every_layer() {
    let dir = tempfile::tempdir().unwrap();
    let config = tiny_config();
    write_twin_checkpoint(dir.path(), &config, 11);
    let model = load_fold(dir.path());

    let out = model
        .forward(&pair_batch(&Device::Cpu), &ForwardOptions::eval().with_traces())
        .unwrap();

    let hidden_a = out.hidden_states_a.unwrap();
    let hidden_b = out.hidden_states_b.unwrap();
    assert_eq!(hidden_a.len(), config.num_hidden_layers + 1);
    assert_eq!(hidden_b.len(), config.num_hidden_layers + 1);
    assert_eq!(hidden_a[0].dims(), &[2, 6, config.hidden_size]);
    assert_eq!(hidden_b[0].dims(), &[2, 4, config.hidden_size]);

    let attn_a = out.attentions_a.unwrap();
    assert_eq!(attn_a.len(), config.num_hidden_layers);
    assert_eq!(attn_a[0].dims(), &[2, config.num_attention_heads, 6, 6]);
    assert_eq!(out.attentions_b.unwrap().len(), config.num_hidden_layers);

    assert_eq!(out.pooled_a.dims(), &[2, config.hidden_size]);
    assert!(out.loss.is_none());
}

#[test]
fn test_no_traces_by_default() {
    let dir = tempfile::tempdir().unwrap();
    write_twin_checkpoint(dir.path(), &tiny_config(), 5);
    let model = load_fold(dir.path());

    let out = model.forward(&pair_batch(&Device::Cpu), &ForwardOptions::eval()).unwrap();
    assert!(out.hidden_states_a.is_none());
    assert!(out.attentions_b.is_none());
}

#[test]
fn test_zero_head_mask_silences_attention() {
    let dir = tempfile::tempdir().unwrap();
    let config = tiny_config();
    write_twin_checkpoint(dir.path(), &config, 13);
    let model = load_fold(dir.path());

    let head_mask = Tensor::zeros(
        (config.num_hidden_layers, config.num_attention_heads),
        DType::F32,
        &Device::Cpu,
    )
    .unwrap();
    let batch = pair_batch(&Device::Cpu).with_head_mask(head_mask);
    let out = model
        .forward(&batch, &ForwardOptions::eval().with_traces())
        .unwrap();

    for probs in out.attentions_a.unwrap() {
        let total: f32 = probs.sum_all().unwrap().to_scalar().unwrap();
        assert_eq!(total, 0.0);
    }
}

#[test]
fn test_labels_give_finite_positive_loss() {
    let dir = tempfile::tempdir().unwrap();
    write_twin_checkpoint(dir.path(), &tiny_config(), 17);
    let model = load_fold(dir.path());

    let batch = pair_batch(&Device::Cpu).with_labels(&[1.0, 0.0]).unwrap();
    let out = model.forward(&batch, &ForwardOptions::eval()).unwrap();
    let loss = out.loss_value().unwrap().unwrap();
    assert!(loss.is_finite());
    assert!(loss > 0.0);
}

#[test]
fn test_shape_mismatched_checkpoint_names_tensor() {
    let dir = tempfile::tempdir().unwrap();
    let config = tiny_config();
    let wider = RobertaConfig {
        intermediate_size: 24,
        ..config.clone()
    };
    write_config(dir.path(), &config);
    write_twin_weights(dir.path(), &wider, 19);

    let err = TwinEncoderModel::load(dir.path(), &config, &Device::Cpu).unwrap_err();
    match err {
        ModelError::CheckpointError { message, .. } => {
            assert!(message.contains("intermediate.dense"), "message: {}", message);
        }
        other => panic!("expected CheckpointError, got {:?}", other),
    }
}

#[test]
fn test_missing_weight_file_is_checkpoint_error() {
    let dir = tempfile::tempdir().unwrap();
    write_config(dir.path(), &tiny_config());

    let err = TwinEncoderModel::load(dir.path(), &tiny_config(), &Device::Cpu).unwrap_err();
    assert!(matches!(err, ModelError::CheckpointError { .. }));
}

#[test]
fn test_mirrored_towers_score_identical_snippets_as_one() {
    let dir = tempfile::tempdir().unwrap();
    write_mirrored_checkpoint(dir.path(), &tiny_config(), 23);
    let model = load_fold(dir.path());

    for score in model.predict(&identical_pair_batch(&Device::Cpu)).unwrap() {
        assert!((score - 1.0).abs() < 1e-5, "score {}", score);
    }
}

#[test]
fn test_from_pretrained_copies_base_into_both_towers() {
    let dir = tempfile::tempdir().unwrap();
    let config = tiny_config();
    write_base_model(dir.path(), &config, "roberta", 29, true);

    let model = TwinEncoderModel::from_pretrained(dir.path(), &config, &Device::Cpu).unwrap();
    for score in model.predict(&identical_pair_batch(&Device::Cpu)).unwrap() {
        assert!((score - 1.0).abs() < 1e-5, "score {}", score);
    }
}

#[test]
fn test_from_pretrained_accepts_unprefixed_keys() {
    let dir = tempfile::tempdir().unwrap();
    let config = tiny_config();
    write_base_model(dir.path(), &config, "", 31, true);

    let model = TwinEncoderModel::from_pretrained(dir.path(), &config, &Device::Cpu).unwrap();
    assert_eq!(model.predict(&pair_batch(&Device::Cpu)).unwrap().len(), 2);
}

#[test]
fn test_from_pretrained_draws_independent_poolers() {
    let dir = tempfile::tempdir().unwrap();
    let config = tiny_config();
    write_base_model(dir.path(), &config, "roberta", 37, false);

    let model = TwinEncoderModel::from_pretrained(dir.path(), &config, &Device::Cpu).unwrap();
    let out = model
        .forward(&identical_pair_batch(&Device::Cpu), &ForwardOptions::eval())
        .unwrap();

    // Same encoder weights and inputs, different poolers.
    let diff: f32 = (&out.pooled_a - &out.pooled_b)
        .unwrap()
        .abs()
        .unwrap()
        .sum_all()
        .unwrap()
        .to_scalar()
        .unwrap();
    assert!(diff > 0.0);
}

#[test]
fn test_sequence_longer_than_position_table_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = tiny_config();
    write_twin_checkpoint(dir.path(), &config, 41);
    let model = load_fold(dir.path());

    let too_long = config.max_sequence_length() + 1;
    let ids = Tensor::full(4u32, (1, too_long), &Device::Cpu).unwrap();
    let mask = Tensor::ones((1, too_long), DType::U32, &Device::Cpu).unwrap();
    let batch = EncodedBatch::new(ids.clone(), mask.clone(), ids, mask).unwrap();

    assert!(matches!(
        model.predict(&batch),
        Err(ModelError::ConfigError { .. })
    ));
}
