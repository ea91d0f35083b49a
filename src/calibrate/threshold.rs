//! F-beta threshold sweep
//!
//! Samples are sorted once, then swept in both directions:
//!
//! - lower is machine: `score <= threshold` ⇒ machine-generated
//! - higher is machine: `score >= threshold` ⇒ machine-generated
//!
//! Metrics are evaluated only at the end of each run of equal scores, since
//! no threshold can split tied samples. The reported result is the best
//! F-beta across both sweeps; ties between directions go to lower-is-machine.

use super::CalibrationError;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Which side of the threshold is classified as machine-generated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    LowerIsMachine,
    HigherIsMachine,
}

impl Direction {
    pub fn describe(&self) -> &'static str {
        match self {
            Direction::LowerIsMachine => "Score <= Threshold => AI",
            Direction::HigherIsMachine => "Score >= Threshold => AI",
        }
    }
}

/// A scored text with its ground-truth label (1 = machine-generated)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredSample {
    pub score: f64,
    pub label: u8,
}

impl ScoredSample {
    pub fn new(score: f64, label: u8) -> Self {
        Self { score, label }
    }

    pub fn is_machine(&self) -> bool {
        self.label == 1
    }
}

/// Confusion counts and metrics at one candidate threshold
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SweepPoint {
    pub threshold: f64,
    pub true_positives: usize,
    pub false_positives: usize,
    pub true_negatives: usize,
    pub false_negatives: usize,
    pub precision: f64,
    pub recall: f64,
    pub f_score: f64,
    pub accuracy: f64,
}

impl SweepPoint {
    fn new(threshold: f64, tp: usize, fp: usize, total_positive: usize, total_negative: usize, beta: f64) -> Self {
        let precision = if tp + fp > 0 {
            tp as f64 / (tp + fp) as f64
        } else {
            0.0
        };
        let recall = if total_positive > 0 {
            tp as f64 / total_positive as f64
        } else {
            0.0
        };

        let beta_sq = beta * beta;
        let denominator = beta_sq * precision + recall;
        let f_score = if denominator > 0.0 {
            (1.0 + beta_sq) * precision * recall / denominator
        } else {
            0.0
        };

        let tn = total_negative - fp;
        let n = total_positive + total_negative;

        Self {
            threshold,
            true_positives: tp,
            false_positives: fp,
            true_negatives: tn,
            false_negatives: total_positive - tp,
            precision,
            recall,
            f_score,
            accuracy: (tp + tn) as f64 / n as f64,
        }
    }
}

/// Outcome of a calibration run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdResult {
    pub threshold: f64,
    pub f_score: f64,
    pub precision: f64,
    pub recall: f64,
    /// (TP + TN) / n at the chosen threshold and direction
    pub accuracy: f64,
    pub is_lower_better: bool,
}

impl ThresholdResult {
    fn from_point(point: &SweepPoint, direction: Direction) -> Self {
        Self {
            threshold: point.threshold,
            f_score: point.f_score,
            precision: point.precision,
            recall: point.recall,
            accuracy: point.accuracy,
            is_lower_better: direction == Direction::LowerIsMachine,
        }
    }

    pub fn direction(&self) -> Direction {
        if self.is_lower_better {
            Direction::LowerIsMachine
        } else {
            Direction::HigherIsMachine
        }
    }

    /// Apply the calibrated rule: `true` means machine-generated.
    pub fn classify(&self, score: f64) -> bool {
        match self.direction() {
            Direction::LowerIsMachine => score <= self.threshold,
            Direction::HigherIsMachine => score >= self.threshold,
        }
    }
}

/// Every candidate point of one sweep. `sorted` must be ascending by score.
pub fn sweep(sorted: &[ScoredSample], beta: f64, direction: Direction) -> Vec<SweepPoint> {
    let total_positive = sorted.iter().filter(|s| s.is_machine()).count();
    let total_negative = sorted.len() - total_positive;

    let ordered: Vec<&ScoredSample> = match direction {
        Direction::LowerIsMachine => sorted.iter().collect(),
        Direction::HigherIsMachine => sorted.iter().rev().collect(),
    };

    let mut points = Vec::new();
    let mut tp = 0;
    let mut fp = 0;

    for (i, sample) in ordered.iter().enumerate() {
        if sample.is_machine() {
            tp += 1;
        } else {
            fp += 1;
        }

        let group_ends = ordered
            .get(i + 1)
            .map_or(true, |next| next.score != sample.score);
        if group_ends {
            points.push(SweepPoint::new(sample.score, tp, fp, total_positive, total_negative, beta));
        }
    }

    points
}

/// Finds the F-beta-maximizing cutoff over labeled scores.
#[derive(Debug, Clone, Copy)]
pub struct ThresholdOptimizer {
    beta: f64,
}

impl Default for ThresholdOptimizer {
    fn default() -> Self {
        Self { beta: 1.0 }
    }
}

impl ThresholdOptimizer {
    pub fn new(beta: f64) -> Result<Self, CalibrationError> {
        if !beta.is_finite() || beta <= 0.0 {
            return Err(CalibrationError::InvalidBeta(beta));
        }
        Ok(Self { beta })
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }

    pub fn optimize(&self, samples: &[ScoredSample]) -> Result<ThresholdResult, CalibrationError> {
        if samples.is_empty() {
            return Err(CalibrationError::Empty);
        }
        for (index, s) in samples.iter().enumerate() {
            if !s.score.is_finite() {
                return Err(CalibrationError::NonFiniteScore { index });
            }
            if s.label > 1 {
                return Err(CalibrationError::InvalidLabel {
                    index,
                    label: i64::from(s.label),
                });
            }
        }

        let mut sorted = samples.to_vec();
        sorted.par_sort_by(|a, b| a.score.total_cmp(&b.score));

        let lower = sweep(&sorted, self.beta, Direction::LowerIsMachine);
        let higher = sweep(&sorted, self.beta, Direction::HigherIsMachine);

        let mut best = ThresholdResult::from_point(&lower[0], Direction::LowerIsMachine);
        for point in &lower {
            if point.f_score > best.f_score {
                best = ThresholdResult::from_point(point, Direction::LowerIsMachine);
            }
        }
        for point in &higher {
            if point.f_score > best.f_score {
                best = ThresholdResult::from_point(point, Direction::HigherIsMachine);
            }
        }

        tracing::debug!(
            "Swept {} samples ({} candidates per direction), best F{}={:.4} at {} ({})",
            sorted.len(),
            lower.len(),
            self.beta,
            best.f_score,
            best.threshold,
            best.direction().describe()
        );

        Ok(best)
    }
}

/// Calibrate from two parallel columns, as read from a scored table.
pub fn find_optimal_threshold(
    scores: &[f64],
    labels: &[i64],
    beta: f64,
) -> Result<ThresholdResult, CalibrationError> {
    if scores.len() != labels.len() {
        return Err(CalibrationError::LengthMismatch {
            scores: scores.len(),
            labels: labels.len(),
        });
    }

    let samples = scores
        .iter()
        .zip(labels)
        .enumerate()
        .map(|(index, (&score, &label))| match label {
            0 | 1 => Ok(ScoredSample::new(score, label as u8)),
            _ => Err(CalibrationError::InvalidLabel { index, label }),
        })
        .collect::<Result<Vec<_>, _>>()?;

    ThresholdOptimizer::new(beta)?.optimize(&samples)
}
