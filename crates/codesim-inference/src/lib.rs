//! K-fold soft-voting inference for the codesim twin encoder.
//!
//! Reads `test.csv`, normalizes and tokenizes both snippets of every pair,
//! scores the set with each `fold{i}` checkpoint in turn, averages the
//! scores, thresholds the mean at 0.5, and writes the template rows with the
//! decision filled in.
//!
//! # Module Structure
//!
//! - `config`: Layered run configuration
//! - `data`: CSV inputs
//! - `preprocess`: Code normalization
//! - `encode`: Parallel pair tokenization
//! - `collate`: Dynamic padding into model batches
//! - `checkpoint`: Fold layout discovery and up-front verification
//! - `ensemble`: Fold scoring seam and soft voting
//! - `metrics`: Evaluation against labelled inputs
//! - `submission`: Output writer
//! - `pipeline`: The whole run

pub mod checkpoint;
pub mod collate;
pub mod config;
pub mod data;
pub mod encode;
pub mod ensemble;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod preprocess;
pub mod submission;

pub use checkpoint::{discover_folds, fold_dir, FoldCheckpoint};
pub use collate::Collator;
pub use config::InferenceConfig;
pub use data::{CodePairExample, SubmissionTemplate, TestSet};
pub use encode::{EncodedPair, PairEncoder};
pub use ensemble::{
    run_ensemble, EnsemblePrediction, FoldScorer, SoftVoteAccumulator, TwinEncoderScorer,
    DECISION_THRESHOLD,
};
pub use error::{InferenceError, InferenceResult};
pub use metrics::BinaryMetrics;
pub use pipeline::{run, run_with_scorer, RunSummary};
pub use preprocess::Preprocessor;
