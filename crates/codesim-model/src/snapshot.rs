//! Locating and opening weight snapshots on disk.
//!
//! A model directory holds `config.json` plus one weight file. safetensors is
//! preferred; a PyTorch pickle (`pytorch_model.bin`) is accepted as written
//! by the original training runs.

use std::path::{Path, PathBuf};

use candle_core::{DType, Device};
use candle_nn::VarBuilder;

use crate::error::{ModelError, ModelResult};

/// Preferred weight file name.
pub const SAFETENSORS_FILE: &str = "model.safetensors";

/// PyTorch state-dict file name.
pub const PYTORCH_FILE: &str = "pytorch_model.bin";

/// On-disk weight format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightFormat {
    SafeTensors,
    PyTorch,
}

/// A resolved weight file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightFile {
    pub path: PathBuf,
    pub format: WeightFormat,
}

impl WeightFile {
    /// Find the weight file inside `dir`.
    pub fn locate(dir: &Path) -> ModelResult<Self> {
        let safetensors = dir.join(SAFETENSORS_FILE);
        if safetensors.is_file() {
            return Ok(Self {
                path: safetensors,
                format: WeightFormat::SafeTensors,
            });
        }

        let pytorch = dir.join(PYTORCH_FILE);
        if pytorch.is_file() {
            return Ok(Self {
                path: pytorch,
                format: WeightFormat::PyTorch,
            });
        }

        Err(ModelError::CheckpointError {
            path: dir.to_path_buf(),
            message: format!("no weight file ({} or {}) found", SAFETENSORS_FILE, PYTORCH_FILE),
        })
    }

    /// Open the file as an F32 `VarBuilder` on `device`.
    pub fn open(&self, device: &Device) -> ModelResult<VarBuilder<'static>> {
        let opened = match self.format {
            // SAFETY: the file is memory-mapped read-only and not modified
            // while the model is alive.
            WeightFormat::SafeTensors => unsafe {
                VarBuilder::from_mmaped_safetensors(&[&self.path], DType::F32, device)
            },
            WeightFormat::PyTorch => VarBuilder::from_pth(&self.path, DType::F32, device),
        };

        opened.map_err(|e| ModelError::CheckpointError {
            path: self.path.clone(),
            message: format!("failed to open weights: {}", e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_weights_is_checkpoint_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = WeightFile::locate(dir.path()).unwrap_err();
        assert!(matches!(err, ModelError::CheckpointError { .. }));
        assert!(err.to_string().contains(SAFETENSORS_FILE));
    }

    #[test]
    fn test_safetensors_preferred_over_pickle() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(PYTORCH_FILE), b"x").unwrap();
        assert_eq!(WeightFile::locate(dir.path()).unwrap().format, WeightFormat::PyTorch);

        std::fs::write(dir.path().join(SAFETENSORS_FILE), b"x").unwrap();
        assert_eq!(
            WeightFile::locate(dir.path()).unwrap().format,
            WeightFormat::SafeTensors
        );
    }

    #[test]
    fn test_corrupt_safetensors_fails_on_open() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SAFETENSORS_FILE), b"not a safetensors file").unwrap();
        let file = WeightFile::locate(dir.path()).unwrap();
        match file.open(&Device::Cpu) {
            Err(err) => assert!(matches!(err, ModelError::CheckpointError { .. })),
            Ok(_) => panic!("corrupt safetensors file opened"),
        }
    }
}
