//! Error types for the twin-encoder model.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while configuring, loading, or running the similarity model.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Invalid or inconsistent model configuration.
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// A weight snapshot is missing, unreadable, or incomplete.
    #[error("Checkpoint error at {}: {message}", path.display())]
    CheckpointError { path: PathBuf, message: String },

    /// A single tensor could not be fetched from a weight snapshot
    /// (missing name or wrong shape).
    #[error("Failed to load tensor '{tensor}': {message}")]
    WeightLoadError { tensor: String, message: String },

    /// Two tensors that must agree on shape do not.
    #[error("Shape mismatch in {context}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        context: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// A tensor operation failed during the forward pass.
    #[error("Tensor operation failed: {message}")]
    TensorError { message: String },

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Wrap a candle error with the operation that produced it.
pub(crate) fn tensor_err(context: &str) -> impl FnOnce(candle_core::Error) -> ModelError + '_ {
    move |e| ModelError::TensorError {
        message: format!("{}: {}", context, e),
    }
}
