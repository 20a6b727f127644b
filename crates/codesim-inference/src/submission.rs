//! Submission writer: the template's rows with `similar` filled in.

use std::path::Path;

use csv::StringRecord;

use crate::data::{SubmissionTemplate, LABEL_COLUMN};
use crate::ensemble::EnsemblePrediction;
use crate::error::{InferenceError, InferenceResult};

/// Write `predictions` into a copy of `template` at `path`.
///
/// Rows keep the template's order and identifiers. An existing `similar`
/// column is overwritten; otherwise one is appended. Parent directories are
/// created as needed.
pub fn write_submission(
    template: &SubmissionTemplate,
    predictions: &[EnsemblePrediction],
    path: &Path,
) -> InferenceResult<()> {
    template.ensure_rows(predictions.len())?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let write_err = |e: csv::Error| InferenceError::data(path, format!("failed to write submission: {}", e));
    let mut writer = csv::Writer::from_path(path).map_err(write_err)?;

    let label_idx = template.label_column();
    let mut headers = template.headers.clone();
    if label_idx.is_none() {
        headers.push_field(LABEL_COLUMN);
    }
    writer.write_record(&headers).map_err(write_err)?;

    for (row, prediction) in template.rows.iter().zip(predictions) {
        let label = prediction.predicted_label.to_string();
        let record: StringRecord = match label_idx {
            Some(idx) => row
                .iter()
                .enumerate()
                .map(|(i, field)| if i == idx { label.as_str() } else { field })
                .collect(),
            None => {
                let mut record = row.clone();
                record.push_field(&label);
                record
            }
        };
        writer.write_record(&record).map_err(write_err)?;
    }
    writer.flush()?;

    let positives = predictions.iter().filter(|p| p.predicted_label == 1).count();
    tracing::info!(
        path = %path.display(),
        rows = predictions.len(),
        positives,
        "Submission written"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(contents: &str) -> (tempfile::TempDir, SubmissionTemplate) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample_submission.csv");
        std::fs::write(&path, contents).unwrap();
        let template = SubmissionTemplate::read(&path).unwrap();
        (dir, template)
    }

    fn preds(means: &[f64]) -> Vec<EnsemblePrediction> {
        means.iter().copied().map(EnsemblePrediction::from_mean).collect()
    }

    #[test]
    fn test_overwrites_label_column_in_place() {
        let (dir, template) = template("pair_id,similar,extra\nTEST_00,0,x\nTEST_01,0,y\n");
        let out = dir.path().join("out/soft_voting.csv");

        write_submission(&template, &preds(&[0.9, 0.1]), &out).unwrap();

        let written = std::fs::read_to_string(&out).unwrap();
        assert_eq!(written, "pair_id,similar,extra\nTEST_00,1,x\nTEST_01,0,y\n");
    }

    #[test]
    fn test_appends_missing_label_column() {
        let (dir, template) = template("pair_id\na\nb\n");
        let out = dir.path().join("soft_voting.csv");

        write_submission(&template, &preds(&[0.5, 0.49]), &out).unwrap();

        let written = std::fs::read_to_string(&out).unwrap();
        assert_eq!(written, "pair_id,similar\na,1\nb,0\n");
    }

    #[test]
    fn test_row_count_mismatch_rejected() {
        let (dir, template) = template("pair_id,similar\na,0\n");
        let out = dir.path().join("soft_voting.csv");
        assert!(write_submission(&template, &preds(&[0.9, 0.9]), &out).is_err());
        assert!(!out.exists());
    }
}
