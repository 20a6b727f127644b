//! Inference configuration.
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! `CODESIM_*` environment variables. The binary applies its flags on top and
//! calls [`InferenceConfig::validate`] before anything runs.
//!
//! ```toml
//! [paths]
//! model_dir = "./checkpoints/codebert"
//! base_model = "./models/codebert-base"
//! data_dir = "./data"
//! output_dir = "./results"
//!
//! [data]
//! max_length = 512
//! batch_size = 32
//!
//! [ensemble]
//! fold_size = 5
//! ```

use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{InferenceError, InferenceResult};

/// Prefix of every environment override.
pub const ENV_PREFIX: &str = "CODESIM_";

/// Input file with the pairs to score.
pub const TEST_FILE: &str = "test.csv";

/// Template that fixes output row ids and order.
pub const SUBMISSION_TEMPLATE_FILE: &str = "sample_submission.csv";

/// Tokenizer file inside the base model directory.
pub const TOKENIZER_FILE: &str = "tokenizer.json";

// ============================================================================
// PATHS
// ============================================================================

/// Filesystem locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory holding `fold0`..`fold{N-1}`.
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,

    /// Base model directory (`config.json`, `tokenizer.json`).
    #[serde(default = "default_base_model")]
    pub base_model: PathBuf,

    /// Directory holding `test.csv` and `sample_submission.csv`.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Where the submission is written. Created if missing.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Submission file name inside `output_dir`.
    #[serde(default = "default_output_file")]
    pub output_file: String,
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("./checkpoints")
}

fn default_base_model() -> PathBuf {
    PathBuf::from("./models/codebert-base")
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./results")
}

fn default_output_file() -> String {
    "soft_voting.csv".to_string()
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            model_dir: default_model_dir(),
            base_model: default_base_model(),
            data_dir: default_data_dir(),
            output_dir: default_output_dir(),
            output_file: default_output_file(),
        }
    }
}

impl PathsConfig {
    pub fn validate(&self) -> InferenceResult<()> {
        let dirs = [
            ("model_dir", &self.model_dir),
            ("base_model", &self.base_model),
            ("data_dir", &self.data_dir),
            ("output_dir", &self.output_dir),
        ];
        for (name, dir) in dirs {
            if dir.as_os_str().is_empty() {
                return Err(InferenceError::config(format!("{} cannot be empty", name)));
            }
        }

        let file = Path::new(&self.output_file);
        if self.output_file.is_empty() || file.file_name() != Some(file.as_os_str()) {
            return Err(InferenceError::config(format!(
                "output_file must be a bare file name, got '{}'",
                self.output_file
            )));
        }
        Ok(())
    }
}

// ============================================================================
// DATA
// ============================================================================

/// Preprocessing, tokenization and batching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    /// Maximum tokens per snippet, special tokens included.
    #[serde(default = "default_max_length")]
    pub max_length: usize,

    /// Pairs per forward pass.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Tokenization worker threads.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Normalize code before tokenizing.
    #[serde(default = "default_preprocess")]
    pub preprocess: bool,

    /// Identifier column in `test.csv`. Optional in the file.
    #[serde(default = "default_id_column")]
    pub id_column: String,
}

fn default_max_length() -> usize {
    512
}

fn default_batch_size() -> usize {
    32
}

fn default_workers() -> usize {
    4
}

fn default_preprocess() -> bool {
    true
}

fn default_id_column() -> String {
    "pair_id".to_string()
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            max_length: default_max_length(),
            batch_size: default_batch_size(),
            workers: default_workers(),
            preprocess: default_preprocess(),
            id_column: default_id_column(),
        }
    }
}

impl DataConfig {
    pub fn validate(&self) -> InferenceResult<()> {
        // room for <s> and </s>
        if self.max_length < 2 {
            return Err(InferenceError::config(format!(
                "max_length must be >= 2, got {}",
                self.max_length
            )));
        }
        if self.batch_size == 0 {
            return Err(InferenceError::config("batch_size must be > 0"));
        }
        if self.workers == 0 {
            return Err(InferenceError::config("workers must be > 0"));
        }
        if self.id_column.is_empty() {
            return Err(InferenceError::config("id_column cannot be empty"));
        }
        Ok(())
    }
}

// ============================================================================
// ENSEMBLE
// ============================================================================

/// K-fold ensemble layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleConfig {
    /// Number of fold checkpoints; every `fold{i}` for `i < fold_size` must exist.
    #[serde(default = "default_fold_size")]
    pub fold_size: usize,
}

fn default_fold_size() -> usize {
    5
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            fold_size: default_fold_size(),
        }
    }
}

impl EnsembleConfig {
    pub fn validate(&self) -> InferenceResult<()> {
        if self.fold_size == 0 {
            return Err(InferenceError::config("fold_size must be > 0"));
        }
        Ok(())
    }
}

// ============================================================================
// RUNTIME
// ============================================================================

/// Process-wide settings consumed by the binary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Force CPU even when CUDA is available.
    #[serde(default)]
    pub cpu: bool,

    /// Device RNG seed.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Max log level (`error`, `warn`, `info`, `debug`, `trace`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_seed() -> u64 {
    42
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            cpu: false,
            seed: default_seed(),
            log_level: default_log_level(),
        }
    }
}

impl RuntimeConfig {
    /// Parsed log level.
    pub fn log_level(&self) -> InferenceResult<tracing::Level> {
        tracing::Level::from_str(&self.log_level).map_err(|_| {
            InferenceError::config(format!(
                "log_level must be one of error, warn, info, debug, trace; got '{}'",
                self.log_level
            ))
        })
    }

    pub fn validate(&self) -> InferenceResult<()> {
        self.log_level().map(|_| ())
    }
}

// ============================================================================
// ROOT
// ============================================================================

/// Complete inference configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InferenceConfig {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub ensemble: EnsembleConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

impl InferenceConfig {
    /// Load from a TOML file. Missing keys take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> InferenceResult<Self> {
        let path = path.as_ref();

        let contents = std::fs::read_to_string(path).map_err(|e| {
            InferenceError::config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;

        toml::from_str(&contents).map_err(|e| {
            InferenceError::config(format!("Failed to parse TOML in '{}': {}", path.display(), e))
        })
    }

    /// Apply `CODESIM_*` environment variables.
    pub fn with_env_overrides(self) -> InferenceResult<Self> {
        self.with_overrides_from(|key| env::var(key).ok())
    }

    /// Apply overrides from any key lookup. A value that does not parse is
    /// an error, not a silent skip.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> InferenceResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(val) = var("MODEL_DIR") {
            self.paths.model_dir = PathBuf::from(val);
        }
        if let Some(val) = var("BASE_MODEL") {
            self.paths.base_model = PathBuf::from(val);
        }
        if let Some(val) = var("DATA_DIR") {
            self.paths.data_dir = PathBuf::from(val);
        }
        if let Some(val) = var("OUTPUT_DIR") {
            self.paths.output_dir = PathBuf::from(val);
        }
        if let Some(val) = var("OUTPUT_FILE") {
            self.paths.output_file = val;
        }

        if let Some(val) = var("MAX_LENGTH") {
            self.data.max_length = parse_env("MAX_LENGTH", &val)?;
        }
        if let Some(val) = var("BATCH_SIZE") {
            self.data.batch_size = parse_env("BATCH_SIZE", &val)?;
        }
        if let Some(val) = var("WORKERS") {
            self.data.workers = parse_env("WORKERS", &val)?;
        }
        if let Some(val) = var("PREPROCESS") {
            self.data.preprocess = parse_env("PREPROCESS", &val)?;
        }
        if let Some(val) = var("ID_COLUMN") {
            self.data.id_column = val;
        }

        if let Some(val) = var("FOLD_SIZE") {
            self.ensemble.fold_size = parse_env("FOLD_SIZE", &val)?;
        }

        if let Some(val) = var("CPU") {
            self.runtime.cpu = parse_env("CPU", &val)?;
        }
        if let Some(val) = var("SEED") {
            self.runtime.seed = parse_env("SEED", &val)?;
        }
        if let Some(val) = var("LOG_LEVEL") {
            self.runtime.log_level = val;
        }

        Ok(self)
    }

    /// Validate every section, returning the first error found.
    pub fn validate(&self) -> InferenceResult<()> {
        self.paths.validate()?;
        self.data.validate()?;
        self.ensemble.validate()?;
        self.runtime.validate()?;
        Ok(())
    }

    pub fn test_csv(&self) -> PathBuf {
        self.paths.data_dir.join(TEST_FILE)
    }

    pub fn submission_template(&self) -> PathBuf {
        self.paths.data_dir.join(SUBMISSION_TEMPLATE_FILE)
    }

    pub fn tokenizer_path(&self) -> PathBuf {
        self.paths.base_model.join(TOKENIZER_FILE)
    }

    pub fn output_path(&self) -> PathBuf {
        self.paths.output_dir.join(&self.paths.output_file)
    }
}

fn parse_env<T: FromStr>(name: &str, value: &str) -> InferenceResult<T>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| {
        InferenceError::config(format!("{}{}='{}' is invalid: {}", ENV_PREFIX, name, value, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = InferenceConfig::default();
        config.validate().unwrap();
        assert_eq!(config.data.workers, 4);
        assert_eq!(config.paths.output_file, "soft_voting.csv");
        assert_eq!(config.output_path(), PathBuf::from("./results/soft_voting.csv"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("codesim.toml");
        std::fs::write(
            &path,
            "[ensemble]\nfold_size = 3\n\n[data]\nmax_length = 256\npreprocess = false\n",
        )
        .unwrap();

        let config = InferenceConfig::from_file(&path).unwrap();
        assert_eq!(config.ensemble.fold_size, 3);
        assert_eq!(config.data.max_length, 256);
        assert!(!config.data.preprocess);
        assert_eq!(config.data.batch_size, 32);
        assert_eq!(config.paths, PathsConfig::default());
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[ensemble\nfold_size = ").unwrap();
        assert!(matches!(
            InferenceConfig::from_file(&path),
            Err(InferenceError::ConfigError { .. })
        ));
    }

    #[test]
    fn test_env_overrides_apply() {
        let config = InferenceConfig::default()
            .with_overrides_from(lookup(&[
                ("CODESIM_FOLD_SIZE", "2"),
                ("CODESIM_MODEL_DIR", "/ckpt"),
                ("CODESIM_CPU", "true"),
                ("CODESIM_ID_COLUMN", "id"),
            ]))
            .unwrap();
        assert_eq!(config.ensemble.fold_size, 2);
        assert_eq!(config.paths.model_dir, PathBuf::from("/ckpt"));
        assert!(config.runtime.cpu);
        assert_eq!(config.data.id_column, "id");
    }

    #[test]
    fn test_unparseable_env_value_is_error() {
        let err = InferenceConfig::default()
            .with_overrides_from(lookup(&[("CODESIM_BATCH_SIZE", "lots")]))
            .unwrap_err();
        assert!(err.to_string().contains("CODESIM_BATCH_SIZE"));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = InferenceConfig::default();
        config.ensemble.fold_size = 0;
        assert!(config.validate().is_err());

        let mut config = InferenceConfig::default();
        config.data.max_length = 1;
        assert!(config.validate().is_err());

        let mut config = InferenceConfig::default();
        config.paths.output_file = "nested/out.csv".to_string();
        assert!(config.validate().is_err());

        let mut config = InferenceConfig::default();
        config.runtime.log_level = "loud".to_string();
        assert!(config.validate().is_err());
    }
}
