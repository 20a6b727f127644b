//! RoBERTa configuration parsed from a HuggingFace-style `config.json`.
//!
//! The same structure describes one encoder tower and the similarity head
//! on top of the pair (`classifier_dropout`, `num_labels`). Both towers of a
//! twin model always share one configuration.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// File name of the model configuration inside a model or fold directory.
pub const CONFIG_FILE: &str = "config.json";

/// Activation used inside the encoder feed-forward block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HiddenAct {
    /// Exact (erf) GELU. RoBERTa's default.
    #[default]
    Gelu,
    /// Tanh-approximated GELU.
    GeluNew,
    /// ReLU.
    Relu,
}

/// Encoder and similarity-head configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RobertaConfig {
    /// Vocabulary size.
    pub vocab_size: usize,
    /// Hidden size of every tower; also the pooled vector dimension.
    pub hidden_size: usize,
    /// Number of encoder layers.
    pub num_hidden_layers: usize,
    /// Number of attention heads.
    pub num_attention_heads: usize,
    /// Intermediate FFN size.
    pub intermediate_size: usize,
    /// FFN activation.
    pub hidden_act: HiddenAct,
    /// Dropout on embeddings and sublayer outputs.
    pub hidden_dropout_prob: f64,
    /// Dropout on attention probabilities.
    pub attention_probs_dropout_prob: f64,
    /// Maximum position embeddings (includes the padding offset).
    pub max_position_embeddings: usize,
    /// Token type vocabulary size (1 for RoBERTa).
    pub type_vocab_size: usize,
    /// LayerNorm epsilon.
    pub layer_norm_eps: f64,
    /// Padding token id; also the RoBERTa position offset.
    pub pad_token_id: u32,
    /// Dropout applied to pooled vectors before comparison. `None` falls back
    /// to `hidden_dropout_prob`.
    pub classifier_dropout: Option<f64>,
    /// Number of output labels declared by the checkpoint.
    pub num_labels: usize,
    /// Standard deviation for freshly initialized weights.
    pub initializer_range: f64,
}

impl Default for RobertaConfig {
    /// `roberta-base` / `microsoft/codebert-base` geometry.
    fn default() -> Self {
        Self {
            vocab_size: 50265,
            hidden_size: 768,
            num_hidden_layers: 12,
            num_attention_heads: 12,
            intermediate_size: 3072,
            hidden_act: HiddenAct::Gelu,
            hidden_dropout_prob: 0.1,
            attention_probs_dropout_prob: 0.1,
            max_position_embeddings: 514,
            type_vocab_size: 1,
            layer_norm_eps: 1e-5,
            pad_token_id: 1,
            classifier_dropout: None,
            num_labels: 2,
            initializer_range: 0.02,
        }
    }
}

#[derive(Deserialize)]
struct RawConfig {
    #[serde(default = "default_vocab")]
    vocab_size: usize,
    #[serde(default = "default_hidden")]
    hidden_size: usize,
    #[serde(default = "default_layers")]
    num_hidden_layers: usize,
    #[serde(default = "default_heads")]
    num_attention_heads: usize,
    #[serde(default = "default_intermediate")]
    intermediate_size: usize,
    #[serde(default)]
    hidden_act: HiddenAct,
    #[serde(default = "default_dropout")]
    hidden_dropout_prob: f64,
    #[serde(default = "default_dropout")]
    attention_probs_dropout_prob: f64,
    #[serde(default = "default_max_positions")]
    max_position_embeddings: usize,
    #[serde(default = "default_type_vocab")]
    type_vocab_size: usize,
    #[serde(default = "default_layer_norm_eps")]
    layer_norm_eps: f64,
    #[serde(default = "default_pad")]
    pad_token_id: u32,
    #[serde(default)]
    classifier_dropout: Option<f64>,
    #[serde(default)]
    num_labels: Option<usize>,
    #[serde(default)]
    id2label: Option<HashMap<String, String>>,
    #[serde(default = "default_initializer_range")]
    initializer_range: f64,
}

fn default_vocab() -> usize {
    50265
}

fn default_hidden() -> usize {
    768
}

fn default_layers() -> usize {
    12
}

fn default_heads() -> usize {
    12
}

fn default_intermediate() -> usize {
    3072
}

fn default_dropout() -> f64 {
    0.1
}

fn default_max_positions() -> usize {
    514
}

fn default_type_vocab() -> usize {
    1
}

fn default_layer_norm_eps() -> f64 {
    1e-5
}

fn default_pad() -> u32 {
    1
}

fn default_initializer_range() -> f64 {
    0.02
}

impl RobertaConfig {
    /// Load `config.json` from a model directory.
    pub fn from_dir(model_dir: &Path) -> ModelResult<Self> {
        let config_path = model_dir.join(CONFIG_FILE);
        let content = std::fs::read_to_string(&config_path).map_err(|e| ModelError::ConfigError {
            message: format!("Failed to read {}: {}", config_path.display(), e),
        })?;
        Self::from_json_str(&content).map_err(|e| match e {
            ModelError::ConfigError { message } => ModelError::ConfigError {
                message: format!("{} ({})", message, config_path.display()),
            },
            other => other,
        })
    }

    /// Parse and validate a configuration from JSON text.
    pub fn from_json_str(content: &str) -> ModelResult<Self> {
        let raw: RawConfig = serde_json::from_str(content).map_err(|e| ModelError::ConfigError {
            message: format!("config.json parse failed: {}", e),
        })?;

        // HF configs usually carry id2label rather than num_labels.
        let num_labels = raw
            .num_labels
            .or_else(|| raw.id2label.as_ref().map(HashMap::len))
            .unwrap_or(2);

        let config = Self {
            vocab_size: raw.vocab_size,
            hidden_size: raw.hidden_size,
            num_hidden_layers: raw.num_hidden_layers,
            num_attention_heads: raw.num_attention_heads,
            intermediate_size: raw.intermediate_size,
            hidden_act: raw.hidden_act,
            hidden_dropout_prob: raw.hidden_dropout_prob,
            attention_probs_dropout_prob: raw.attention_probs_dropout_prob,
            max_position_embeddings: raw.max_position_embeddings,
            type_vocab_size: raw.type_vocab_size,
            layer_norm_eps: raw.layer_norm_eps,
            pad_token_id: raw.pad_token_id,
            classifier_dropout: raw.classifier_dropout,
            num_labels,
            initializer_range: raw.initializer_range,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate internal consistency.
    pub fn validate(&self) -> ModelResult<()> {
        let sizes = [
            ("vocab_size", self.vocab_size),
            ("hidden_size", self.hidden_size),
            ("num_hidden_layers", self.num_hidden_layers),
            ("num_attention_heads", self.num_attention_heads),
            ("intermediate_size", self.intermediate_size),
            ("max_position_embeddings", self.max_position_embeddings),
            ("type_vocab_size", self.type_vocab_size),
            ("num_labels", self.num_labels),
        ];
        for (name, value) in sizes {
            if value == 0 {
                return Err(ModelError::ConfigError {
                    message: format!("{} must be > 0", name),
                });
            }
        }

        if self.hidden_size % self.num_attention_heads != 0 {
            return Err(ModelError::ConfigError {
                message: format!(
                    "hidden_size ({}) must be divisible by num_attention_heads ({})",
                    self.hidden_size, self.num_attention_heads
                ),
            });
        }

        if self.pad_token_id as usize >= self.vocab_size {
            return Err(ModelError::ConfigError {
                message: format!(
                    "pad_token_id ({}) must be < vocab_size ({})",
                    self.pad_token_id, self.vocab_size
                ),
            });
        }

        let rates = [
            ("hidden_dropout_prob", Some(self.hidden_dropout_prob)),
            ("attention_probs_dropout_prob", Some(self.attention_probs_dropout_prob)),
            ("classifier_dropout", self.classifier_dropout),
        ];
        for (name, rate) in rates {
            if let Some(p) = rate {
                if !(0.0..1.0).contains(&p) {
                    return Err(ModelError::ConfigError {
                        message: format!("{} must be in [0, 1), got {}", name, p),
                    });
                }
            }
        }

        if self.layer_norm_eps <= 0.0 || self.layer_norm_eps.is_nan() {
            return Err(ModelError::ConfigError {
                message: format!("layer_norm_eps must be > 0, got {}", self.layer_norm_eps),
            });
        }

        Ok(())
    }

    /// Per-head dimension.
    pub fn head_dim(&self) -> usize {
        self.hidden_size / self.num_attention_heads
    }

    /// Dropout rate applied to each pooled vector before the cosine comparison.
    pub fn classifier_dropout_prob(&self) -> f64 {
        self.classifier_dropout.unwrap_or(self.hidden_dropout_prob)
    }

    /// Longest token sequence the position table can address.
    pub fn max_sequence_length(&self) -> usize {
        self.max_position_embeddings
            .saturating_sub(self.pad_token_id as usize + 1)
    }

    /// Check that `other` describes the same tower architecture.
    ///
    /// Dropout, label count and initializer range may differ between a base
    /// model and a fine-tuned fold; tensor geometry may not.
    pub fn ensure_same_architecture(&self, other: &RobertaConfig) -> ModelResult<()> {
        let fields = [
            ("vocab_size", self.vocab_size, other.vocab_size),
            ("hidden_size", self.hidden_size, other.hidden_size),
            ("num_hidden_layers", self.num_hidden_layers, other.num_hidden_layers),
            ("num_attention_heads", self.num_attention_heads, other.num_attention_heads),
            ("intermediate_size", self.intermediate_size, other.intermediate_size),
            (
                "max_position_embeddings",
                self.max_position_embeddings,
                other.max_position_embeddings,
            ),
            ("type_vocab_size", self.type_vocab_size, other.type_vocab_size),
            ("pad_token_id", self.pad_token_id as usize, other.pad_token_id as usize),
        ];
        let mismatched: Vec<String> = fields
            .iter()
            .filter(|(_, a, b)| a != b)
            .map(|(name, a, b)| format!("{} (base {} vs {})", name, a, b))
            .collect();

        if mismatched.is_empty() {
            Ok(())
        } else {
            Err(ModelError::ConfigError {
                message: format!("architecture mismatch: {}", mismatched.join(", ")),
            })
        }
    }

    /// Every tensor one tower owns, with its expected shape, under `prefix`.
    ///
    /// Names follow the HuggingFace RoBERTa layout. An empty prefix yields
    /// bare names (`embeddings.word_embeddings.weight`).
    pub fn tower_tensor_shapes(&self, prefix: &str) -> Vec<(String, Vec<usize>)> {
        let h = self.hidden_size;
        let name = |suffix: String| tensor_name(prefix, &suffix);

        let mut shapes = vec![
            (name("embeddings.word_embeddings.weight".into()), vec![self.vocab_size, h]),
            (
                name("embeddings.position_embeddings.weight".into()),
                vec![self.max_position_embeddings, h],
            ),
            (
                name("embeddings.token_type_embeddings.weight".into()),
                vec![self.type_vocab_size, h],
            ),
            (name("embeddings.LayerNorm.weight".into()), vec![h]),
            (name("embeddings.LayerNorm.bias".into()), vec![h]),
        ];

        for i in 0..self.num_hidden_layers {
            let layer = format!("encoder.layer.{}", i);
            for proj in ["query", "key", "value"] {
                shapes.push((name(format!("{}.attention.self.{}.weight", layer, proj)), vec![h, h]));
                shapes.push((name(format!("{}.attention.self.{}.bias", layer, proj)), vec![h]));
            }
            shapes.push((name(format!("{}.attention.output.dense.weight", layer)), vec![h, h]));
            shapes.push((name(format!("{}.attention.output.dense.bias", layer)), vec![h]));
            shapes.push((name(format!("{}.attention.output.LayerNorm.weight", layer)), vec![h]));
            shapes.push((name(format!("{}.attention.output.LayerNorm.bias", layer)), vec![h]));
            shapes.push((
                name(format!("{}.intermediate.dense.weight", layer)),
                vec![self.intermediate_size, h],
            ));
            shapes.push((
                name(format!("{}.intermediate.dense.bias", layer)),
                vec![self.intermediate_size],
            ));
            shapes.push((
                name(format!("{}.output.dense.weight", layer)),
                vec![h, self.intermediate_size],
            ));
            shapes.push((name(format!("{}.output.dense.bias", layer)), vec![h]));
            shapes.push((name(format!("{}.output.LayerNorm.weight", layer)), vec![h]));
            shapes.push((name(format!("{}.output.LayerNorm.bias", layer)), vec![h]));
        }

        shapes.push((name("pooler.dense.weight".into()), vec![h, h]));
        shapes.push((name("pooler.dense.bias".into()), vec![h]));
        shapes
    }
}

/// Join a tensor-name prefix and suffix with a dot, tolerating an empty prefix.
pub fn tensor_name(prefix: &str, suffix: &str) -> String {
    if prefix.is_empty() {
        suffix.to_string()
    } else {
        format!("{}.{}", prefix, suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CODEBERT_CONFIG: &str = r#"{
        "architectures": ["RobertaModel"],
        "attention_probs_dropout_prob": 0.1,
        "bos_token_id": 0,
        "eos_token_id": 2,
        "hidden_act": "gelu",
        "hidden_dropout_prob": 0.1,
        "hidden_size": 768,
        "initializer_range": 0.02,
        "intermediate_size": 3072,
        "layer_norm_eps": 1e-05,
        "max_position_embeddings": 514,
        "model_type": "roberta",
        "num_attention_heads": 12,
        "num_hidden_layers": 12,
        "pad_token_id": 1,
        "type_vocab_size": 1,
        "vocab_size": 50265,
        "classifier_dropout": null,
        "id2label": {"0": "LABEL_0"}
    }"#;

    #[test]
    fn test_parse_hf_config() {
        let config = RobertaConfig::from_json_str(CODEBERT_CONFIG).unwrap();
        assert_eq!(config.hidden_size, 768);
        assert_eq!(config.num_hidden_layers, 12);
        assert_eq!(config.pad_token_id, 1);
        assert_eq!(config.hidden_act, HiddenAct::Gelu);
        assert_eq!(config.num_labels, 1, "num_labels derives from id2label");
        assert_eq!(config.classifier_dropout, None);
        assert_eq!(config, RobertaConfig { num_labels: 1, ..RobertaConfig::default() });
    }

    #[test]
    fn test_classifier_dropout_falls_back_to_hidden_dropout() {
        let mut config = RobertaConfig { hidden_dropout_prob: 0.15, ..Default::default() };
        assert_eq!(config.classifier_dropout_prob(), 0.15);
        config.classifier_dropout = Some(0.3);
        assert_eq!(config.classifier_dropout_prob(), 0.3);
    }

    #[test]
    fn test_heads_must_divide_hidden() {
        let json = r#"{"hidden_size": 100, "num_attention_heads": 12}"#;
        let err = RobertaConfig::from_json_str(json).unwrap_err();
        assert!(matches!(err, ModelError::ConfigError { .. }));
        assert!(err.to_string().contains("divisible"));
    }

    #[test]
    fn test_dropout_out_of_range_rejected() {
        let json = r#"{"classifier_dropout": 1.0}"#;
        let err = RobertaConfig::from_json_str(json).unwrap_err();
        assert!(err.to_string().contains("classifier_dropout"));
    }

    #[test]
    fn test_unknown_activation_rejected() {
        let json = r#"{"hidden_act": "swish"}"#;
        assert!(matches!(
            RobertaConfig::from_json_str(json),
            Err(ModelError::ConfigError { .. })
        ));
    }

    #[test]
    fn test_architecture_mismatch_lists_fields() {
        let base = RobertaConfig::default();
        let fold = RobertaConfig { hidden_size: 1024, num_hidden_layers: 24, ..base.clone() };
        let err = base.ensure_same_architecture(&fold).unwrap_err().to_string();
        assert!(err.contains("hidden_size (base 768 vs 1024)"), "{}", err);
        assert!(err.contains("num_hidden_layers"), "{}", err);

        let fine_tuned = RobertaConfig { classifier_dropout: Some(0.2), ..base.clone() };
        assert!(base.ensure_same_architecture(&fine_tuned).is_ok());
    }

    #[test]
    fn test_tower_tensor_shapes() {
        let config = RobertaConfig { num_hidden_layers: 2, ..Default::default() };
        let shapes = config.tower_tensor_shapes("reoberta_model1");
        // 5 embedding tensors + 16 per layer + 2 pooler tensors
        assert_eq!(shapes.len(), 5 + 16 * 2 + 2);
        assert!(shapes.contains(&(
            "reoberta_model1.encoder.layer.1.intermediate.dense.weight".to_string(),
            vec![3072, 768]
        )));

        let bare = config.tower_tensor_shapes("");
        assert_eq!(bare[0].0, "embeddings.word_embeddings.weight");
    }

    #[test]
    fn test_max_sequence_length_accounts_for_offset() {
        assert_eq!(RobertaConfig::default().max_sequence_length(), 512);
    }
}
