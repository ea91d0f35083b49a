//! Precomputed logits produced by an external inference runner
//!
//! File layout (JSON):
//!
//! ```text
//! { "vocab_size": 32000, "tokens": [1, 415, ...], "logits": [[...], [...], ...] }
//! ```
//!
//! `logits[t]` is the model's prediction for `tokens[t + 1]`; a trailing row
//! for the last position is allowed and ignored.

use super::{score_logits, InferenceError, InferenceResult, Logits};
use crate::detect::{Discrepancy, DiscrepancyScorer, TokenId};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct LogitsDump {
    pub vocab_size: usize,
    pub tokens: Vec<TokenId>,
    pub logits: Vec<Vec<f32>>,
}

impl LogitsDump {
    pub fn load(path: &Path) -> InferenceResult<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json(&data)
    }

    pub fn from_json(data: &str) -> InferenceResult<Self> {
        let dump: Self = serde_json::from_str(data)?;
        if dump.vocab_size == 0 {
            return Err(InferenceError::InvalidModel("vocab_size must be positive".to_string()));
        }
        Ok(dump)
    }

    pub fn score(&self, scorer: &mut DiscrepancyScorer) -> InferenceResult<Discrepancy> {
        let logits = Logits::from_rows(self.vocab_size, &self.logits)?;
        score_logits(scorer, &logits, &self.tokens)
    }
}
