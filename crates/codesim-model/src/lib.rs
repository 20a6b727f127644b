//! Twin RoBERTa encoder for code-pair similarity.
//!
//! Two independently weighted encoder towers embed the two snippets of a
//! pair; the cosine similarity of their pooled vectors is the model's logit.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use candle_core::Device;
//! use codesim_model::{RobertaConfig, TwinEncoderModel};
//!
//! # fn main() -> codesim_model::ModelResult<()> {
//! let fold_dir = Path::new("models/codebert/fold0");
//! let config = RobertaConfig::from_dir(fold_dir)?;
//! let model = TwinEncoderModel::load(fold_dir, &config, &Device::Cpu)?;
//! # let _ = model;
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod config;
pub mod error;
pub mod output;
pub mod similarity;
pub mod snapshot;
pub mod tower;

pub use batch::{EncodedBatch, PaddedSide};
pub use config::{tensor_name, HiddenAct, RobertaConfig, CONFIG_FILE};
pub use error::{ModelError, ModelResult};
pub use output::SimilarityOutput;
pub use similarity::{
    cosine_similarity, similarity_loss, TwinEncoderModel, BASE_MODEL_PREFIX, COSINE_EPS,
    TOWER_A_PREFIX, TOWER_B_PREFIX,
};
pub use snapshot::{WeightFile, WeightFormat, PYTORCH_FILE, SAFETENSORS_FILE};
pub use tower::{create_position_ids, ForwardOptions, PoolerInit, RobertaTower, TowerInput, TowerOutput};
