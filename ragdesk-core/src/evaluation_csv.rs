//! Evaluation dataset loading.
//!
//! Evaluation files are plain comma-separated text with a header row that
//! names a `query` and an `answer` column. Values are split on bare commas
//! and trimmed; quoting is not supported, so a value containing a comma
//! shifts every column after it.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::ValidationError;

/// Number of records shown in a dataset preview.
pub const PREVIEW_ROWS: usize = 3;

/// One expected question/answer pair from an evaluation file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub query: String,
    pub answer: String,
}

/// Parse evaluation CSV text into records, in file order.
///
/// The first line is the header. Blank data lines are skipped; short lines
/// yield empty strings for the missing columns.
pub fn parse_evaluation_csv(text: &str) -> Result<Vec<EvaluationRecord>, ValidationError> {
    let mut lines = text.split('\n');
    let header: Vec<&str> = lines
        .next()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .collect();

    let query_col = header.iter().position(|h| *h == "query");
    let answer_col = header.iter().position(|h| *h == "answer");
    let (Some(query_col), Some(answer_col)) = (query_col, answer_col) else {
        return Err(ValidationError::MissingCsvColumns);
    };

    let records = lines
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let values: Vec<&str> = line.split(',').map(str::trim).collect();
            let column = |idx: usize| values.get(idx).copied().unwrap_or_default().to_string();
            EvaluationRecord {
                query: column(query_col),
                answer: column(answer_col),
            }
        })
        .collect();

    Ok(records)
}

/// The currently loaded evaluation dataset.
///
/// Loading replaces the whole set. A rejected file leaves the set empty,
/// never half-updated.
#[derive(Debug, Clone, Default)]
pub struct EvaluationSet {
    source: Option<PathBuf>,
    records: Vec<EvaluationRecord>,
}

impl EvaluationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the dataset with the parsed contents of `text`.
    pub fn load_str(
        &mut self,
        source: impl Into<PathBuf>,
        text: &str,
    ) -> Result<usize, ValidationError> {
        match parse_evaluation_csv(text) {
            Ok(records) => {
                let source = source.into();
                info!(
                    file = %source.display(),
                    records = records.len(),
                    "Loaded evaluation dataset"
                );
                self.source = Some(source);
                self.records = records;
                Ok(self.records.len())
            }
            Err(e) => {
                self.clear();
                Err(e)
            }
        }
    }

    /// Read and parse an evaluation file from disk.
    pub async fn load_file(&mut self, path: &Path) -> Result<usize, ValidationError> {
        if !is_csv_path(path) {
            return Err(ValidationError::NotCsv {
                path: path.to_path_buf(),
            });
        }
        debug!(file = %path.display(), "Reading evaluation CSV");
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ValidationError::Unreadable {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        self.load_str(path, &text)
    }

    pub fn clear(&mut self) {
        self.source = None;
        self.records.clear();
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn records(&self) -> &[EvaluationRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The first `n` records.
    pub fn preview(&self, n: usize) -> &[EvaluationRecord] {
        &self.records[..n.min(self.records.len())]
    }
}

fn is_csv_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
}
