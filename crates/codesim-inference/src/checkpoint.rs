//! Fold checkpoint layout: `<model_dir>/fold{i}/{config.json, weights}`.
//!
//! Every fold is located and checked before the first one is scored, so a
//! broken ensemble fails fast instead of after hours of prediction.

use std::path::{Path, PathBuf};

use codesim_model::{
    ModelError, RobertaConfig, WeightFile, WeightFormat, CONFIG_FILE, TOWER_A_PREFIX,
    TOWER_B_PREFIX,
};

use crate::error::{InferenceError, InferenceResult};

/// How many missing tensors to list in an error message.
const MAX_REPORTED_TENSORS: usize = 5;

/// One fold of the ensemble, ready to load.
#[derive(Debug, Clone)]
pub struct FoldCheckpoint {
    pub fold: usize,
    pub dir: PathBuf,
    pub config: RobertaConfig,
    pub weights: WeightFile,
}

/// Directory of fold `fold` under `model_dir`.
pub fn fold_dir(model_dir: &Path, fold: usize) -> PathBuf {
    model_dir.join(format!("fold{}", fold))
}

/// Locate and check folds `0..fold_size`.
///
/// Missing fold directories are a configuration error listing every missing
/// fold. A fold with a missing, unreadable, or incomplete weight file, or a
/// configuration whose architecture differs from `base`, fails here too.
pub fn discover_folds(
    model_dir: &Path,
    fold_size: usize,
    base: &RobertaConfig,
) -> InferenceResult<Vec<FoldCheckpoint>> {
    if !model_dir.is_dir() {
        return Err(InferenceError::config(format!(
            "model directory '{}' does not exist",
            model_dir.display()
        )));
    }

    let missing: Vec<String> = (0..fold_size)
        .filter(|&i| !fold_dir(model_dir, i).is_dir())
        .map(|i| format!("fold{}", i))
        .collect();
    if !missing.is_empty() {
        return Err(InferenceError::config(format!(
            "fold_size is {} but {} missing under '{}': {}",
            fold_size,
            if missing.len() == 1 { "this fold is" } else { "these folds are" },
            model_dir.display(),
            missing.join(", ")
        )));
    }

    let folds = (0..fold_size)
        .map(|fold| open_fold(model_dir, fold, base))
        .collect::<InferenceResult<Vec<_>>>()?;

    tracing::info!(
        model_dir = %model_dir.display(),
        folds = folds.len(),
        "Fold checkpoints verified"
    );
    Ok(folds)
}

fn open_fold(model_dir: &Path, fold: usize, base: &RobertaConfig) -> InferenceResult<FoldCheckpoint> {
    let dir = fold_dir(model_dir, fold);
    let checkpoint_err = |path: &Path, message: String| InferenceError::CheckpointError {
        fold,
        path: path.to_path_buf(),
        message,
    };

    let config_path = dir.join(CONFIG_FILE);
    if !config_path.is_file() {
        return Err(checkpoint_err(&config_path, "missing fold configuration".to_string()));
    }
    let config = RobertaConfig::from_dir(&dir).map_err(|e| checkpoint_err(&config_path, e.to_string()))?;
    base.ensure_same_architecture(&config).map_err(|e| match e {
        ModelError::ConfigError { message } => {
            InferenceError::config(format!("fold{} does not match the base model: {}", fold, message))
        }
        other => InferenceError::Model(other),
    })?;

    let weights = WeightFile::locate(&dir).map_err(|e| checkpoint_err(&dir, e.to_string()))?;
    inspect_weights(&weights, &config).map_err(|message| checkpoint_err(&weights.path, message))?;

    tracing::debug!(
        fold,
        path = %weights.path.display(),
        format = ?weights.format,
        "Fold checkpoint found"
    );

    Ok(FoldCheckpoint {
        fold,
        dir,
        config,
        weights,
    })
}

/// Check a safetensors header against every tensor both towers need.
///
/// Only the header is read. PyTorch pickles cannot be inspected without
/// loading them and are checked when the fold is loaded.
fn inspect_weights(weights: &WeightFile, config: &RobertaConfig) -> Result<(), String> {
    if weights.format != WeightFormat::SafeTensors {
        return Ok(());
    }

    // SAFETY: read-only mapping of a file nothing else writes during the run.
    let mmaped = unsafe { candle_core::safetensors::MmapedSafetensors::new(&weights.path) }
        .map_err(|e| format!("unreadable safetensors file: {}", e))?;

    let stored: std::collections::HashMap<String, Vec<usize>> = mmaped
        .tensors()
        .into_iter()
        .map(|(name, view)| (name, view.shape().to_vec()))
        .collect();

    let mut problems = Vec::new();
    for prefix in [TOWER_A_PREFIX, TOWER_B_PREFIX] {
        for (name, shape) in config.tower_tensor_shapes(prefix) {
            match stored.get(&name) {
                None => problems.push(format!("missing '{}'", name)),
                Some(found) if *found != shape => {
                    problems.push(format!("'{}' has shape {:?}, expected {:?}", name, found, shape))
                }
                Some(_) => {}
            }
        }
    }

    if problems.is_empty() {
        return Ok(());
    }
    let total = problems.len();
    problems.truncate(MAX_REPORTED_TENSORS);
    let more = if total > MAX_REPORTED_TENSORS {
        format!(" (and {} more)", total - MAX_REPORTED_TENSORS)
    } else {
        String::new()
    };
    Err(format!("{}{}", problems.join("; "), more))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_dir_naming() {
        assert_eq!(fold_dir(Path::new("/m"), 3), PathBuf::from("/m/fold3"));
    }

    #[test]
    fn test_missing_model_dir_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = discover_folds(&dir.path().join("nope"), 1, &RobertaConfig::default()).unwrap_err();
        assert!(matches!(err, InferenceError::ConfigError { .. }));
    }

    #[test]
    fn test_every_missing_fold_is_listed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("fold1")).unwrap();

        let err = discover_folds(dir.path(), 4, &RobertaConfig::default()).unwrap_err();
        let message = err.to_string();
        assert!(matches!(err, InferenceError::ConfigError { .. }));
        assert!(message.contains("fold0"));
        assert!(message.contains("fold2"));
        assert!(message.contains("fold3"));
        assert!(!message.contains("fold1,"));
    }

    #[test]
    fn test_fold_without_config_is_checkpoint_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("fold0")).unwrap();

        match discover_folds(dir.path(), 1, &RobertaConfig::default()).unwrap_err() {
            InferenceError::CheckpointError { fold, .. } => assert_eq!(fold, 0),
            other => panic!("expected CheckpointError, got {:?}", other),
        }
    }
}
