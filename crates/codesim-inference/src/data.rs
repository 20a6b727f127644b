//! CSV inputs: the pairs to score and the submission template.

use std::path::{Path, PathBuf};

use csv::StringRecord;

use crate::error::{InferenceError, InferenceResult};

/// First snippet column.
pub const CODE1_COLUMN: &str = "code1";

/// Second snippet column.
pub const CODE2_COLUMN: &str = "code2";

/// Binary label column, in the test file (optional) and the template.
pub const LABEL_COLUMN: &str = "similar";

/// One row of `test.csv`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodePairExample {
    /// Zero-based data row index.
    pub row: usize,
    /// Value of the id column, when the file has one.
    pub id: Option<String>,
    pub code1: String,
    pub code2: String,
    /// Ground truth, when the file carries a `similar` column.
    pub label: Option<u8>,
}

/// Parsed `test.csv`.
#[derive(Debug, Clone)]
pub struct TestSet {
    pub path: PathBuf,
    pub examples: Vec<CodePairExample>,
}

impl TestSet {
    /// Read pairs from `path`. `code1` and `code2` are required and must be
    /// non-empty; `id_column` and `similar` are optional.
    pub fn read(path: &Path, id_column: &str) -> InferenceResult<Self> {
        let mut reader = csv::Reader::from_path(path).map_err(|e| csv_error(path, e))?;
        let headers = reader.headers().map_err(|e| csv_error(path, e))?.clone();

        let code1_idx = require_column(path, &headers, CODE1_COLUMN)?;
        let code2_idx = require_column(path, &headers, CODE2_COLUMN)?;
        let id_idx = column_index(&headers, id_column);
        let label_idx = column_index(&headers, LABEL_COLUMN);

        let mut examples = Vec::new();
        for (row, record) in reader.records().enumerate() {
            let record = record.map_err(|e| csv_error(path, e))?;
            let field = |idx: usize| record.get(idx).unwrap_or_default();

            let code1 = field(code1_idx);
            let code2 = field(code2_idx);
            if code1.is_empty() || code2.is_empty() {
                return Err(InferenceError::data(
                    path,
                    format!("row {} has an empty {} or {}", row, CODE1_COLUMN, CODE2_COLUMN),
                ));
            }

            let label = label_idx
                .map(|idx| parse_label(path, row, field(idx)))
                .transpose()?;

            examples.push(CodePairExample {
                row,
                id: id_idx.map(|idx| field(idx).to_string()),
                code1: code1.to_string(),
                code2: code2.to_string(),
                label,
            });
        }

        tracing::info!(
            path = %path.display(),
            rows = examples.len(),
            labelled = label_idx.is_some(),
            "Test pairs loaded"
        );

        Ok(Self {
            path: path.to_path_buf(),
            examples,
        })
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// Ground-truth labels, if every row has one.
    pub fn labels(&self) -> Option<Vec<u8>> {
        self.examples.iter().map(|e| e.label).collect()
    }
}

/// Parsed `sample_submission.csv`: the output rows in order.
#[derive(Debug, Clone)]
pub struct SubmissionTemplate {
    pub path: PathBuf,
    pub headers: StringRecord,
    pub rows: Vec<StringRecord>,
}

impl SubmissionTemplate {
    pub fn read(path: &Path) -> InferenceResult<Self> {
        let mut reader = csv::Reader::from_path(path).map_err(|e| csv_error(path, e))?;
        let headers = reader.headers().map_err(|e| csv_error(path, e))?.clone();
        let rows = reader
            .records()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| csv_error(path, e))?;

        Ok(Self {
            path: path.to_path_buf(),
            headers,
            rows,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of the `similar` column, if the template has one.
    pub fn label_column(&self) -> Option<usize> {
        column_index(&self.headers, LABEL_COLUMN)
    }

    /// Fail unless the template has exactly `expected` rows.
    pub fn ensure_rows(&self, expected: usize) -> InferenceResult<()> {
        if self.len() != expected {
            return Err(InferenceError::data(
                &self.path,
                format!("template has {} rows but the test set has {}", self.len(), expected),
            ));
        }
        Ok(())
    }
}

fn column_index(headers: &StringRecord, name: &str) -> Option<usize> {
    headers.iter().position(|h| h.trim() == name)
}

fn require_column(path: &Path, headers: &StringRecord, name: &str) -> InferenceResult<usize> {
    column_index(headers, name).ok_or_else(|| {
        InferenceError::data(path, format!("missing required column '{}'", name))
    })
}

fn parse_label(path: &Path, row: usize, value: &str) -> InferenceResult<u8> {
    match value.trim() {
        "0" | "0.0" | "False" | "false" => Ok(0),
        "1" | "1.0" | "True" | "true" => Ok(1),
        other => Err(InferenceError::data(
            path,
            format!("row {} has non-binary {} value '{}'", row, LABEL_COLUMN, other),
        )),
    }
}

fn csv_error(path: &Path, err: csv::Error) -> InferenceError {
    InferenceError::data(path, err.to_string())
}
