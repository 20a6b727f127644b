//! Fixtures for codesim tests.
//!
//! Everything here writes real files: safetensors checkpoints with seeded
//! weights, a word-level `tokenizer.json`, and CSV inputs. Nothing is mocked
//! at the file-format level, so loaders under test run their production path.

use std::collections::HashMap;
use std::path::Path;

use codesim_model::{RobertaConfig, CONFIG_FILE, SAFETENSORS_FILE, TOWER_A_PREFIX, TOWER_B_PREFIX};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// File name of the tokenizer inside a base model directory.
pub const TOKENIZER_FILE: &str = "tokenizer.json";

/// Vocabulary of the fixture tokenizer. Ids line up with RoBERTa's specials
/// (`<s>` = 0, `<pad>` = 1, `</s>` = 2).
pub const VOCAB: &[&str] = &[
    "<s>", "<pad>", "</s>", "<unk>", "def", "return", "print", "for", "in", "range", "if",
    "else", "import", "x", "y", "i", "n", "a", "b", "=", "+", "(", ")", ":", ",", "0", "1",
    "2", "while", "sum", "len", "list",
];

/// A two-layer, 8-wide RoBERTa small enough to run in unit tests.
pub fn tiny_config() -> RobertaConfig {
    RobertaConfig {
        vocab_size: VOCAB.len(),
        hidden_size: 8,
        num_hidden_layers: 2,
        num_attention_heads: 2,
        intermediate_size: 16,
        max_position_embeddings: 40,
        ..RobertaConfig::default()
    }
}

/// Seeded values for every tensor of one tower under `prefix`.
///
/// LayerNorm scales start at 1 so activations keep their spread.
pub fn tower_tensors(config: &RobertaConfig, prefix: &str, seed: u64) -> Vec<(String, Vec<usize>, Vec<f32>)> {
    let mut rng = StdRng::seed_from_u64(seed);
    config
        .tower_tensor_shapes(prefix)
        .into_iter()
        .map(|(name, shape)| {
            let len = shape.iter().product();
            let values = if name.ends_with("LayerNorm.weight") {
                vec![1.0; len]
            } else if name.ends_with("LayerNorm.bias") {
                vec![0.0; len]
            } else {
                (0..len).map(|_| rng.gen_range(-0.2f32..0.2)).collect()
            };
            (name, shape, values)
        })
        .collect()
}

/// Serialize named F32 tensors into a safetensors file.
pub fn write_safetensors(path: &Path, tensors: &[(String, Vec<usize>, Vec<f32>)]) {
    let bytes: Vec<Vec<u8>> = tensors
        .iter()
        .map(|(_, _, values)| values.iter().flat_map(|v| v.to_le_bytes()).collect())
        .collect();

    let mut views: HashMap<String, safetensors::tensor::TensorView<'_>> = HashMap::new();
    for ((name, shape, _), data) in tensors.iter().zip(&bytes) {
        let view = safetensors::tensor::TensorView::new(safetensors::Dtype::F32, shape.clone(), data)
            .expect("Failed to create tensor view");
        views.insert(name.clone(), view);
    }

    safetensors::serialize_to_file(&views, &None, path).expect("Failed to write safetensors file");
}

/// Write `config.json` for `config` into `dir`.
pub fn write_config(dir: &Path, config: &RobertaConfig) {
    std::fs::create_dir_all(dir).expect("Failed to create model dir");
    let json = serde_json::to_string_pretty(config).expect("Failed to serialize config");
    std::fs::write(dir.join(CONFIG_FILE), json).expect("Failed to write config.json");
}

/// Write only the twin weight file (both towers) into `dir`.
pub fn write_twin_weights(dir: &Path, config: &RobertaConfig, seed: u64) {
    std::fs::create_dir_all(dir).expect("Failed to create checkpoint dir");
    let mut tensors = tower_tensors(config, TOWER_A_PREFIX, seed);
    tensors.extend(tower_tensors(config, TOWER_B_PREFIX, seed.wrapping_add(1)));
    write_safetensors(&dir.join(SAFETENSORS_FILE), &tensors);
}

/// Write a complete fold checkpoint: `config.json` plus twin weights.
pub fn write_twin_checkpoint(dir: &Path, config: &RobertaConfig, seed: u64) {
    write_config(dir, config);
    write_twin_weights(dir, config, seed);
}

/// Write a twin checkpoint whose two towers carry the same weights.
pub fn write_mirrored_checkpoint(dir: &Path, config: &RobertaConfig, seed: u64) {
    write_config(dir, config);
    let mut tensors = tower_tensors(config, TOWER_A_PREFIX, seed);
    tensors.extend(tower_tensors(config, TOWER_B_PREFIX, seed));
    write_safetensors(&dir.join(SAFETENSORS_FILE), &tensors);
}

/// Write a base model directory: config, tokenizer, and single-tower weights
/// under `prefix` (`"roberta"` or `""`). `with_pooler = false` mimics a
/// masked-LM export without pooler tensors.
pub fn write_base_model(dir: &Path, config: &RobertaConfig, prefix: &str, seed: u64, with_pooler: bool) {
    write_config(dir, config);
    write_tokenizer(dir);
    let tensors: Vec<_> = tower_tensors(config, prefix, seed)
        .into_iter()
        .filter(|(name, _, _)| with_pooler || !name.contains("pooler."))
        .collect();
    write_safetensors(&dir.join(SAFETENSORS_FILE), &tensors);
}

/// JSON for a whitespace/word-level tokenizer with RoBERTa-style specials.
pub fn tokenizer_json() -> String {
    let vocab: serde_json::Map<String, serde_json::Value> = VOCAB
        .iter()
        .enumerate()
        .map(|(id, token)| (token.to_string(), serde_json::json!(id)))
        .collect();

    let added_tokens: Vec<serde_json::Value> = ["<s>", "<pad>", "</s>", "<unk>"]
        .iter()
        .enumerate()
        .map(|(id, content)| {
            serde_json::json!({
                "id": id,
                "content": content,
                "single_word": false,
                "lstrip": false,
                "rstrip": false,
                "normalized": false,
                "special": true
            })
        })
        .collect();

    serde_json::json!({
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": added_tokens,
        "normalizer": null,
        "pre_tokenizer": { "type": "Whitespace" },
        "post_processor": {
            "type": "RobertaProcessing",
            "sep": ["</s>", 2],
            "cls": ["<s>", 0],
            "trim_offsets": true,
            "add_prefix_space": false
        },
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": vocab,
            "unk_token": "<unk>"
        }
    })
    .to_string()
}

/// Write `tokenizer.json` into `dir`.
pub fn write_tokenizer(dir: &Path) {
    std::fs::create_dir_all(dir).expect("Failed to create tokenizer dir");
    std::fs::write(dir.join(TOKENIZER_FILE), tokenizer_json()).expect("Failed to write tokenizer.json");
}

/// Write `test.csv` with `pair_id,code1,code2` and an optional `similar`
/// column.
pub fn write_test_csv(dir: &Path, pairs: &[(&str, &str)], labels: Option<&[u8]>) {
    std::fs::create_dir_all(dir).expect("Failed to create data dir");
    let mut writer = csv::Writer::from_path(dir.join("test.csv")).expect("Failed to create test.csv");

    let mut header = vec!["pair_id", "code1", "code2"];
    if labels.is_some() {
        header.push("similar");
    }
    writer.write_record(&header).expect("Failed to write header");

    for (i, (code1, code2)) in pairs.iter().enumerate() {
        let id = i.to_string();
        let mut record = vec![id, code1.to_string(), code2.to_string()];
        if let Some(labels) = labels {
            record.push(labels[i].to_string());
        }
        writer.write_record(&record).expect("Failed to write row");
    }
    writer.flush().expect("Failed to flush test.csv");
}

/// Write `sample_submission.csv` with `rows` ids and a zeroed `similar`
/// column.
pub fn write_sample_submission(dir: &Path, rows: usize) {
    std::fs::create_dir_all(dir).expect("Failed to create data dir");
    let mut writer = csv::Writer::from_path(dir.join("sample_submission.csv"))
        .expect("Failed to create sample_submission.csv");
    writer.write_record(["pair_id", "similar"]).expect("Failed to write header");
    for i in 0..rows {
        writer
            .write_record([i.to_string(), "0".to_string()])
            .expect("Failed to write row");
    }
    writer.flush().expect("Failed to flush sample_submission.csv");
}

/// Read a CSV back as (headers, rows) for assertions.
pub fn read_csv(path: &Path) -> (Vec<String>, Vec<Vec<String>>) {
    let mut reader = csv::Reader::from_path(path).expect("Failed to open CSV");
    let headers = reader
        .headers()
        .expect("Failed to read headers")
        .iter()
        .map(str::to_string)
        .collect();
    let rows = reader
        .records()
        .map(|r| r.expect("Failed to read row").iter().map(str::to_string).collect())
        .collect();
    (headers, rows)
}
