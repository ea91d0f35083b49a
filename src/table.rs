//! JSON Lines tables
//!
//! One JSON object per line. Batch scoring reads a text column and writes
//! the same rows back with a `discrepancy` column appended; calibration reads
//! a score column and a label column.

use serde_json::{Map, Value};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use thiserror::Error;

/// Column written by batch scoring
pub const SCORE_COLUMN: &str = "discrepancy";

#[derive(Error, Debug)]
pub enum TableError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Line {line}: expected a JSON object")]
    NotAnObject { line: usize },

    #[error("Column '{0}' not found")]
    MissingColumn(String),

    #[error("Row {row}: column '{column}' is {found}, expected {expected}")]
    BadCell {
        row: usize,
        column: String,
        expected: &'static str,
        found: String,
    },
}

pub type TableResult<T> = Result<T, TableError>;

/// Score/label pairs read for calibration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabeledScores {
    pub scores: Vec<f64>,
    pub labels: Vec<i64>,
    /// Rows left out because the score or label was null
    pub skipped: usize,
}

/// An in-memory JSON Lines table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    rows: Vec<Map<String, Value>>,
}

impl Table {
    pub fn from_rows(rows: Vec<Map<String, Value>>) -> Self {
        Self { rows }
    }

    pub fn load(path: &Path) -> TableResult<Self> {
        let file = std::fs::File::open(path)?;
        Self::read(BufReader::new(file))
    }

    /// Parse JSON Lines; blank lines are skipped.
    pub fn read<R: BufRead>(reader: R) -> TableResult<Self> {
        let mut rows = Vec::new();
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let value: Value =
                serde_json::from_str(&line).map_err(|source| TableError::Parse { line: i + 1, source })?;
            match value {
                Value::Object(map) => rows.push(map),
                _ => return Err(TableError::NotAnObject { line: i + 1 }),
            }
        }
        Ok(Self { rows })
    }

    pub fn save(&self, path: &Path) -> TableResult<()> {
        let file = std::fs::File::create(path)?;
        let mut out = BufWriter::new(file);
        self.write(&mut out)?;
        out.flush()?;
        Ok(())
    }

    pub fn write<W: Write>(&self, out: &mut W) -> TableResult<()> {
        for row in &self.rows {
            serde_json::to_writer(&mut *out, row).map_err(std::io::Error::from)?;
            out.write_all(b"\n")?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.rows.iter().any(|r| r.contains_key(column))
    }

    /// String cells of a column. Null or absent cells become empty strings.
    pub fn text_column(&self, column: &str) -> TableResult<Vec<String>> {
        if !self.is_empty() && !self.has_column(column) {
            return Err(TableError::MissingColumn(column.to_string()));
        }
        self.rows
            .iter()
            .enumerate()
            .map(|(row, r)| match r.get(column) {
                None | Some(Value::Null) => Ok(String::new()),
                Some(Value::String(s)) => Ok(s.clone()),
                Some(other) => Err(bad_cell(row, column, "a string", other)),
            })
            .collect()
    }

    /// Numeric cells of a column; every row must hold a number.
    pub fn f64_column(&self, column: &str) -> TableResult<Vec<f64>> {
        if !self.is_empty() && !self.has_column(column) {
            return Err(TableError::MissingColumn(column.to_string()));
        }
        self.rows
            .iter()
            .enumerate()
            .map(|(row, r)| {
                let cell = r.get(column).unwrap_or(&Value::Null);
                cell.as_f64().ok_or_else(|| bad_cell(row, column, "a number", cell))
            })
            .collect()
    }

    /// Integer cells of a column; every row must hold an integer.
    pub fn i64_column(&self, column: &str) -> TableResult<Vec<i64>> {
        if !self.is_empty() && !self.has_column(column) {
            return Err(TableError::MissingColumn(column.to_string()));
        }
        self.rows
            .iter()
            .enumerate()
            .map(|(row, r)| {
                let cell = r.get(column).unwrap_or(&Value::Null);
                cell.as_i64()
                    .ok_or_else(|| bad_cell(row, column, "an integer", cell))
            })
            .collect()
    }

    /// Parallel score and label columns for calibration.
    ///
    /// Rows where either cell is null or absent (a text that failed to
    /// score) are skipped and counted. Any other non-numeric cell is an error.
    pub fn labeled_scores(&self, score_column: &str, label_column: &str) -> TableResult<LabeledScores> {
        for column in [score_column, label_column] {
            if !self.is_empty() && !self.has_column(column) {
                return Err(TableError::MissingColumn(column.to_string()));
            }
        }

        let mut out = LabeledScores::default();
        for (row, r) in self.rows.iter().enumerate() {
            let score = r.get(score_column).unwrap_or(&Value::Null);
            let label = r.get(label_column).unwrap_or(&Value::Null);
            if score.is_null() || label.is_null() {
                out.skipped += 1;
                continue;
            }
            out.scores.push(
                score
                    .as_f64()
                    .ok_or_else(|| bad_cell(row, score_column, "a number", score))?,
            );
            out.labels.push(
                label
                    .as_i64()
                    .ok_or_else(|| bad_cell(row, label_column, "an integer", label))?,
            );
        }
        Ok(out)
    }

    /// The first `scores.len()` rows with `column` set to each score
    /// (`null` where scoring failed). Rows past the scored prefix are dropped.
    pub fn with_scores(&self, column: &str, scores: &[Option<f64>]) -> Self {
        let rows = self
            .rows
            .iter()
            .zip(scores)
            .map(|(row, score)| {
                let mut row = row.clone();
                let cell = score
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or(Value::Null);
                row.insert(column.to_string(), cell);
                row
            })
            .collect();
        Self { rows }
    }
}

fn bad_cell(row: usize, column: &str, expected: &'static str, found: &Value) -> TableError {
    let found = match found {
        Value::Null => "null".to_string(),
        Value::Bool(_) => "a boolean".to_string(),
        Value::Number(n) => format!("the number {}", n),
        Value::String(_) => "a string".to_string(),
        Value::Array(_) => "an array".to_string(),
        Value::Object(_) => "an object".to_string(),
    };
    TableError::BadCell {
        row,
        column: column.to_string(),
        expected,
        found,
    }
}
