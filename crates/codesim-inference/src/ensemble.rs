//! Soft voting over fold checkpoints.
//!
//! Each fold scores the whole evaluation set; the per-example scores are
//! averaged across folds and the mean is thresholded once.

use std::time::Instant;

use candle_core::Device;
use codesim_model::{ModelError, TwinEncoderModel};

use crate::checkpoint::FoldCheckpoint;
use crate::collate::Collator;
use crate::encode::EncodedPair;
use crate::error::{InferenceError, InferenceResult};

/// Mean score at or above which a pair is labelled similar.
pub const DECISION_THRESHOLD: f64 = 0.5;

/// Final decision for one example.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnsemblePrediction {
    /// Mean of the fold scores.
    pub mean_probability: f64,
    /// 1 if `mean_probability >= DECISION_THRESHOLD`, else 0.
    pub predicted_label: u8,
}

impl EnsemblePrediction {
    pub fn from_mean(mean_probability: f64) -> Self {
        Self {
            mean_probability,
            predicted_label: u8::from(mean_probability >= DECISION_THRESHOLD),
        }
    }
}

/// Scores a full evaluation set with one fold checkpoint.
pub trait FoldScorer {
    /// One raw score per pair, in input order.
    fn score_fold(&mut self, fold: &FoldCheckpoint, pairs: &[EncodedPair]) -> InferenceResult<Vec<f32>>;
}

/// Loads the twin model of each fold and runs batched eval-mode prediction.
#[derive(Debug)]
pub struct TwinEncoderScorer {
    collator: Collator,
    batch_size: usize,
    device: Device,
}

impl TwinEncoderScorer {
    pub fn new(collator: Collator, batch_size: usize, device: Device) -> Self {
        Self {
            collator,
            batch_size,
            device,
        }
    }
}

impl FoldScorer for TwinEncoderScorer {
    fn score_fold(&mut self, fold: &FoldCheckpoint, pairs: &[EncodedPair]) -> InferenceResult<Vec<f32>> {
        let model = TwinEncoderModel::load(&fold.dir, &fold.config, &self.device).map_err(|e| match e {
            ModelError::CheckpointError { path, message } => InferenceError::CheckpointError {
                fold: fold.fold,
                path,
                message,
            },
            other => InferenceError::Model(other),
        })?;

        let mut scores = Vec::with_capacity(pairs.len());
        for (batch_idx, chunk) in pairs.chunks(self.batch_size).enumerate() {
            let batch = self.collator.collate(chunk, &self.device)?;
            scores.extend(model.predict(&batch)?);
            tracing::trace!(fold = fold.fold, batch = batch_idx, scored = scores.len(), "Batch scored");
        }
        Ok(scores)
    }
}

/// Running mean of per-example fold scores.
///
/// The mean is updated incrementally in f64, so a single fold reproduces its
/// scores exactly and identical folds leave the mean unchanged.
#[derive(Debug, Clone)]
pub struct SoftVoteAccumulator {
    mean: Vec<f64>,
    folds: usize,
}

impl SoftVoteAccumulator {
    pub fn new(examples: usize) -> Self {
        Self {
            mean: vec![0.0; examples],
            folds: 0,
        }
    }

    /// Number of folds added so far.
    pub fn folds(&self) -> usize {
        self.folds
    }

    /// Fold one score vector into the mean.
    pub fn add(&mut self, fold: usize, scores: &[f32]) -> InferenceResult<()> {
        if scores.len() != self.mean.len() {
            return Err(InferenceError::ScoreCountMismatch {
                fold,
                expected: self.mean.len(),
                actual: scores.len(),
            });
        }

        self.folds += 1;
        let k = self.folds as f64;
        for (m, &x) in self.mean.iter_mut().zip(scores) {
            *m += (f64::from(x) - *m) / k;
        }
        Ok(())
    }

    /// Threshold the mean. Fails if no fold was added.
    pub fn finish(self) -> InferenceResult<Vec<EnsemblePrediction>> {
        if self.folds == 0 {
            return Err(InferenceError::config("no fold scores to average"));
        }
        Ok(self.mean.into_iter().map(EnsemblePrediction::from_mean).collect())
    }
}

/// Score every fold in index order and soft-vote the results.
///
/// Any fold failure aborts the run; there is no partial ensemble.
pub fn run_ensemble<S: FoldScorer>(
    scorer: &mut S,
    folds: &[FoldCheckpoint],
    pairs: &[EncodedPair],
) -> InferenceResult<Vec<EnsemblePrediction>> {
    let mut votes = SoftVoteAccumulator::new(pairs.len());

    for fold in folds {
        let start = Instant::now();
        let scores = scorer.score_fold(fold, pairs)?;
        votes.add(fold.fold, &scores)?;

        let fold_mean = if scores.is_empty() {
            0.0
        } else {
            scores.iter().map(|&s| f64::from(s)).sum::<f64>() / scores.len() as f64
        };
        tracing::info!(
            fold = fold.fold,
            pairs = scores.len(),
            mean_score = fold_mean,
            latency_ms = start.elapsed().as_millis() as u64,
            "Fold scored"
        );
    }

    votes.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_is_inclusive() {
        assert_eq!(EnsemblePrediction::from_mean(0.5).predicted_label, 1);
        assert_eq!(EnsemblePrediction::from_mean(0.4999).predicted_label, 0);
        assert_eq!(EnsemblePrediction::from_mean(-0.2).predicted_label, 0);
        assert_eq!(EnsemblePrediction::from_mean(1.0).predicted_label, 1);
    }

    #[test]
    fn test_single_fold_is_exact() {
        let scores = [0.1f32, -0.73, 0.5000001, 0.999];
        let mut votes = SoftVoteAccumulator::new(scores.len());
        votes.add(0, &scores).unwrap();

        let preds = votes.finish().unwrap();
        for (pred, &score) in preds.iter().zip(&scores) {
            assert_eq!(pred.mean_probability, f64::from(score));
        }
    }

    #[test]
    fn test_identical_folds_keep_score() {
        let scores = [0.3f32, 0.62, -0.91];
        let mut votes = SoftVoteAccumulator::new(scores.len());
        for fold in 0..5 {
            votes.add(fold, &scores).unwrap();
        }
        assert_eq!(votes.folds(), 5);

        let preds = votes.finish().unwrap();
        for (pred, &score) in preds.iter().zip(&scores) {
            assert_eq!(pred.mean_probability, f64::from(score));
        }
    }

    #[test]
    fn test_mean_across_folds() {
        let mut votes = SoftVoteAccumulator::new(2);
        votes.add(0, &[0.2, 0.9]).unwrap();
        votes.add(1, &[0.6, 0.0]).unwrap();
        votes.add(2, &[0.7, 0.3]).unwrap();

        let preds = votes.finish().unwrap();
        assert!((preds[0].mean_probability - 0.5).abs() < 1e-6);
        assert!((preds[1].mean_probability - 0.4).abs() < 1e-6);
        assert_eq!(preds[1].predicted_label, 0);
    }

    #[test]
    fn test_wrong_score_count_rejected() {
        let mut votes = SoftVoteAccumulator::new(3);
        assert!(matches!(
            votes.add(2, &[0.1, 0.2]),
            Err(InferenceError::ScoreCountMismatch { fold: 2, expected: 3, actual: 2 })
        ));
    }

    #[test]
    fn test_no_folds_is_error() {
        assert!(SoftVoteAccumulator::new(1).finish().is_err());
    }
}
