//! Error types for the inference driver.

use std::path::PathBuf;

use codesim_model::ModelError;
use thiserror::Error;

/// Errors that abort an inference run.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// Invalid configuration, missing directories, or fold layout that does
    /// not match `fold_size`.
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Malformed input CSV. Raised before any model is loaded.
    #[error("Data error in {}: {message}", path.display())]
    DataError { path: PathBuf, message: String },

    /// Missing or corrupt checkpoint files for one fold.
    #[error("Checkpoint error for fold {fold} at {}: {message}", path.display())]
    CheckpointError {
        fold: usize,
        path: PathBuf,
        message: String,
    },

    /// Tokenizer could not be loaded or failed on an input.
    #[error("Tokenization error: {message}")]
    TokenizationError { message: String },

    /// A fold returned a score vector of the wrong length.
    #[error("Fold {fold} produced {actual} scores, expected {expected}")]
    ScoreCountMismatch {
        fold: usize,
        expected: usize,
        actual: usize,
    },

    /// Model construction or forward pass failed.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for inference operations.
pub type InferenceResult<T> = Result<T, InferenceError>;

impl InferenceError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    pub(crate) fn data(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::DataError {
            path: path.into(),
            message: message.into(),
        }
    }
}
