//! Inference seam
//!
//! The scorer never runs a model itself. Anything that can tokenize a text
//! and return one logits row per position implements [`LanguageModel`].
//!
//! - [`NgramModel`]: a small smoothed bigram model trained from a local
//!   corpus, useful as a reference detector and in tests
//! - [`LogitsDump`]: tokens and logits precomputed by an external runner
//!   and stored as JSON, scored without any model

mod dump;
mod ngram;

pub use dump::LogitsDump;
pub use ngram::NgramModel;

use crate::detect::{Discrepancy, DiscrepancyScorer, TokenId};
use thiserror::Error;

/// Errors raised while turning a text into logits
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("Not enough tokens provided: {found} (minimum 2 tokens)")]
    TooFewTokens { found: usize },

    #[error("Too many tokens provided: {found} (maximum {max})")]
    ContextOverflow { found: usize, max: usize },

    #[error("Model returned {rows} logits rows for {tokens} tokens")]
    MissingLogits { rows: usize, tokens: usize },

    #[error("Inference failed: {0}")]
    Forward(String),

    #[error("Invalid model file: {0}")]
    InvalidModel(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type InferenceResult<T> = Result<T, InferenceError>;

/// Row-major logits for a whole sequence, `rows × vocab_size` values.
#[derive(Debug, Clone, PartialEq)]
pub struct Logits {
    vocab_size: usize,
    data: Vec<f32>,
}

impl Logits {
    /// Wrap a flat buffer. Fails if its length is not a multiple of `vocab_size`.
    pub fn from_flat(vocab_size: usize, data: Vec<f32>) -> InferenceResult<Self> {
        if vocab_size == 0 || data.len() % vocab_size != 0 {
            return Err(InferenceError::Forward(format!(
                "logits buffer of {} values does not divide into rows of {}",
                data.len(),
                vocab_size
            )));
        }
        Ok(Self { vocab_size, data })
    }

    /// Build from individual rows, each of which must have `vocab_size` values.
    pub fn from_rows(vocab_size: usize, rows: &[Vec<f32>]) -> InferenceResult<Self> {
        let mut data = Vec::with_capacity(rows.len() * vocab_size);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != vocab_size {
                return Err(InferenceError::Forward(format!(
                    "logits row {} has {} values, expected {}",
                    i,
                    row.len(),
                    vocab_size
                )));
            }
            data.extend_from_slice(row);
        }
        Self::from_flat(vocab_size, data)
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    pub fn num_rows(&self) -> usize {
        self.data.len() / self.vocab_size
    }

    pub fn row(&self, index: usize) -> &[f32] {
        &self.data[index * self.vocab_size..(index + 1) * self.vocab_size]
    }

    /// First `n` rows as slices, ready for the scorer.
    pub fn rows(&self, n: usize) -> Vec<&[f32]> {
        self.data.chunks_exact(self.vocab_size).take(n).collect()
    }
}

/// A causal language model as seen by the scorer.
pub trait LanguageModel {
    /// Number of entries in every logits row
    fn vocab_size(&self) -> usize;

    /// Tokenize a text, including the leading beginning-of-sequence token.
    fn tokenize(&self, text: &str) -> InferenceResult<Vec<TokenId>>;

    /// Run the model over `tokens`; row `t` is the prediction for position `t + 1`.
    fn forward(&mut self, tokens: &[TokenId]) -> InferenceResult<Logits>;
}

/// Tokenize, bound-check, run the model and score one text.
pub fn analyze_text<M: LanguageModel + ?Sized>(
    model: &mut M,
    scorer: &mut DiscrepancyScorer,
    text: &str,
    n_ctx: usize,
) -> InferenceResult<Discrepancy> {
    let tokens = model.tokenize(text)?;

    if tokens.len() < 2 {
        return Err(InferenceError::TooFewTokens { found: tokens.len() });
    }
    if tokens.len() > n_ctx {
        return Err(InferenceError::ContextOverflow {
            found: tokens.len(),
            max: n_ctx,
        });
    }

    let logits = model.forward(&tokens)?;
    score_logits(scorer, &logits, &tokens)
}

/// Score already-computed logits against their token sequence.
pub fn score_logits(
    scorer: &mut DiscrepancyScorer,
    logits: &Logits,
    tokens: &[TokenId],
) -> InferenceResult<Discrepancy> {
    if tokens.len() < 2 {
        return Err(InferenceError::TooFewTokens { found: tokens.len() });
    }
    let steps = tokens.len() - 1;
    if logits.num_rows() < steps {
        return Err(InferenceError::MissingLogits {
            rows: logits.num_rows(),
            tokens: tokens.len(),
        });
    }

    let rows = logits.rows(steps);
    Ok(scorer.score_detailed(&rows, tokens, logits.vocab_size()))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fixed-distribution model over a 4-token vocabulary
    struct FixedModel {
        row: Vec<f32>,
        forward_calls: usize,
    }

    impl LanguageModel for FixedModel {
        fn vocab_size(&self) -> usize {
            self.row.len()
        }

        fn tokenize(&self, text: &str) -> InferenceResult<Vec<TokenId>> {
            let mut tokens = vec![0];
            tokens.extend(text.bytes().map(|b| (b % 4) as TokenId));
            Ok(tokens)
        }

        fn forward(&mut self, tokens: &[TokenId]) -> InferenceResult<Logits> {
            self.forward_calls += 1;
            let rows = vec![self.row.clone(); tokens.len()];
            Logits::from_rows(self.row.len(), &rows)
        }
    }

    fn fixed() -> FixedModel {
        FixedModel {
            row: vec![1.0, 2.0, 3.0, 4.0],
            forward_calls: 0,
        }
    }

    #[test]
    fn test_logits_rows() {
        let logits = Logits::from_flat(2, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        assert_eq!(logits.num_rows(), 3);
        assert_eq!(logits.row(1), &[3.0, 4.0]);
        assert_eq!(logits.rows(2), vec![&[1.0f32, 2.0][..], &[3.0, 4.0][..]]);
    }

    #[test]
    fn test_logits_rejects_ragged_buffers() {
        assert!(Logits::from_flat(3, vec![1.0, 2.0]).is_err());
        assert!(Logits::from_flat(0, vec![]).is_err());
        assert!(Logits::from_rows(2, &[vec![1.0, 2.0], vec![1.0]]).is_err());
    }

    #[test]
    fn test_too_few_tokens() {
        let mut model = fixed();
        let mut scorer = DiscrepancyScorer::new();
        let err = analyze_text(&mut model, &mut scorer, "", 16).unwrap_err();
        assert!(matches!(err, InferenceError::TooFewTokens { found: 1 }));
        assert_eq!(model.forward_calls, 0);
    }

    #[test]
    fn test_context_overflow() {
        let mut model = fixed();
        let mut scorer = DiscrepancyScorer::new();
        let err = analyze_text(&mut model, &mut scorer, "abcdefgh", 4).unwrap_err();
        assert!(matches!(err, InferenceError::ContextOverflow { found: 9, max: 4 }));
        assert_eq!(model.forward_calls, 0);
    }

    #[test]
    fn test_analyze_matches_direct_computation() {
        let mut model = fixed();
        let mut scorer = DiscrepancyScorer::new();
        let result = analyze_text(&mut model, &mut scorer, "ab", 16).unwrap();

        let tokens = model.tokenize("ab").unwrap();
        let rows = vec![model.row.clone(); tokens.len() - 1];
        let expected = crate::detect::compute_discrepancy(&rows, &tokens, 4);

        assert_eq!(result.positions, 2);
        assert!((result.score - expected).abs() < 1e-12);
    }

    #[test]
    fn test_missing_logits_rows() {
        let logits = Logits::from_flat(2, vec![0.0, 1.0]).unwrap();
        let mut scorer = DiscrepancyScorer::new();
        let err = score_logits(&mut scorer, &logits, &[0, 1, 1]).unwrap_err();
        assert!(matches!(err, InferenceError::MissingLogits { rows: 1, tokens: 3 }));
    }
}
