//! Decision threshold calibration
//!
//! Given discrepancy scores with ground-truth labels, finds the cutoff and
//! direction that maximize the F-beta score. Malformed input is reported as
//! a [`CalibrationError`], never as a zero-valued result.

mod threshold;

pub use threshold::{
    find_optimal_threshold, sweep, Direction, ScoredSample, SweepPoint, ThresholdOptimizer,
    ThresholdResult,
};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("Column mismatch: {scores} scores but {labels} labels")]
    LengthMismatch { scores: usize, labels: usize },

    #[error("No samples to calibrate on")]
    Empty,

    #[error("Row {index}: label must be 0 (human) or 1 (AI), got {label}")]
    InvalidLabel { index: usize, label: i64 },

    #[error("Row {index}: score is not a finite number")]
    NonFiniteScore { index: usize },

    #[error("Beta must be a positive finite number, got {0}")]
    InvalidBeta(f64),
}
