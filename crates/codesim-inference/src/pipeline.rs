//! End-to-end inference run.
//!
//! Order matters: input files are validated first, then the base model and
//! every fold checkpoint, and only then is anything tokenized or scored.

use std::path::PathBuf;
use std::time::Instant;

use candle_core::Device;
use codesim_model::RobertaConfig;

use crate::checkpoint::{discover_folds, FoldCheckpoint};
use crate::collate::Collator;
use crate::config::InferenceConfig;
use crate::data::{SubmissionTemplate, TestSet};
use crate::encode::{EncodedPair, PairEncoder};
use crate::ensemble::{run_ensemble, EnsemblePrediction, FoldScorer, TwinEncoderScorer};
use crate::error::{InferenceError, InferenceResult};
use crate::metrics::BinaryMetrics;
use crate::preprocess::Preprocessor;
use crate::submission::write_submission;

/// Everything needed to score folds, checked and encoded.
#[derive(Debug)]
pub struct PreparedRun {
    pub test_set: TestSet,
    pub template: SubmissionTemplate,
    pub base_config: RobertaConfig,
    pub folds: Vec<FoldCheckpoint>,
    pub pairs: Vec<EncodedPair>,
    pub collator: Collator,
}

/// Outcome of a completed run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub output_path: PathBuf,
    pub folds: usize,
    pub predictions: Vec<EnsemblePrediction>,
    /// Present when `test.csv` carried labels.
    pub metrics: Option<BinaryMetrics>,
}

impl RunSummary {
    pub fn positives(&self) -> usize {
        self.predictions.iter().filter(|p| p.predicted_label == 1).count()
    }
}

/// Validate inputs, load and check checkpoints, preprocess and tokenize.
pub fn prepare(config: &InferenceConfig) -> InferenceResult<PreparedRun> {
    config.validate()?;

    let mut test_set = TestSet::read(&config.test_csv(), &config.data.id_column)?;
    let template = SubmissionTemplate::read(&config.submission_template())?;
    template.ensure_rows(test_set.len())?;

    let base_dir = &config.paths.base_model;
    if !base_dir.is_dir() {
        return Err(InferenceError::config(format!(
            "base model directory '{}' does not exist",
            base_dir.display()
        )));
    }
    let base_config = RobertaConfig::from_dir(base_dir)?;
    if config.data.max_length > base_config.max_sequence_length() {
        return Err(InferenceError::config(format!(
            "max_length {} exceeds what the base model can address ({})",
            config.data.max_length,
            base_config.max_sequence_length()
        )));
    }

    let folds = discover_folds(&config.paths.model_dir, config.ensemble.fold_size, &base_config)?;

    let preprocessor = Preprocessor::new(config.data.preprocess);
    for example in &mut test_set.examples {
        example.code1 = preprocessor.apply(&example.code1);
        example.code2 = preprocessor.apply(&example.code2);
    }

    let encoder = PairEncoder::from_file(
        &config.tokenizer_path(),
        config.data.max_length,
        config.data.workers,
    )?;
    let pairs = encoder.encode_all(&test_set.examples)?;

    Ok(PreparedRun {
        test_set,
        template,
        collator: Collator::new(base_config.pad_token_id),
        base_config,
        folds,
        pairs,
    })
}

/// Score every fold with `scorer`, soft-vote, and write the submission.
pub fn execute<S: FoldScorer>(
    config: &InferenceConfig,
    prepared: PreparedRun,
    scorer: &mut S,
) -> InferenceResult<RunSummary> {
    let predictions = run_ensemble(scorer, &prepared.folds, &prepared.pairs)?;

    let labels: Vec<u8> = predictions.iter().map(|p| p.predicted_label).collect();
    let metrics = prepared
        .test_set
        .labels()
        .and_then(|truth| BinaryMetrics::compute(&labels, &truth));
    if let Some(m) = &metrics {
        tracing::info!(
            accuracy = m.accuracy,
            precision = m.precision,
            recall = m.recall,
            f1 = m.f1,
            support = m.support,
            "Ensemble evaluation"
        );
    }

    let output_path = config.output_path();
    write_submission(&prepared.template, &predictions, &output_path)?;

    Ok(RunSummary {
        output_path,
        folds: prepared.folds.len(),
        predictions,
        metrics,
    })
}

/// Prepare and execute with a caller-supplied scorer.
pub fn run_with_scorer<S: FoldScorer>(config: &InferenceConfig, scorer: &mut S) -> InferenceResult<RunSummary> {
    let prepared = prepare(config)?;
    execute(config, prepared, scorer)
}

/// Full run with the twin-encoder model on `device`.
pub fn run(config: &InferenceConfig, device: &Device) -> InferenceResult<RunSummary> {
    let start = Instant::now();
    let prepared = prepare(config)?;

    tracing::info!(
        rows = prepared.pairs.len(),
        folds = prepared.folds.len(),
        device = ?device,
        batch_size = config.data.batch_size,
        "Starting soft-voting inference"
    );

    let mut scorer = TwinEncoderScorer::new(prepared.collator, config.data.batch_size, device.clone());
    let summary = execute(config, prepared, &mut scorer)?;

    tracing::info!(
        output = %summary.output_path.display(),
        positives = summary.positives(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Inference complete"
    );
    Ok(summary)
}
