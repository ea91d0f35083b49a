//! Discrepancy scoring
//!
//! Turns per-position model logits into a single z-score-like statistic:
//! how much more predictable the text is than the model itself expects.
//!
//! # Scoring Formula
//!
//! ```text
//! For each position t, with lp(i) = log-softmax(logits[t])[i]:
//!   ll_t   = lp(tokens[t+1])
//!   mean_t = Σ p(i)·lp(i)              (negative entropy)
//!   var_t  = Σ p(i)·lp(i)² − mean_t²
//!
//! discrepancy = (Σ ll_t − Σ mean_t) / sqrt(Σ var_t)     (0.0 if Σ var_t ≤ 1e-9)
//! ```
//!
//! Large positive values mean the text sits in the model's high-probability
//! region more than the model's own distribution would predict, which is
//! the signature of machine-generated continuations.

pub mod batch;

use serde::Serialize;

/// Token identifier as produced by a tokenizer.
pub type TokenId = u32;

/// Accumulated variance at or below this is treated as "no signal".
pub const MIN_TOTAL_VARIANCE: f64 = 1e-9;

/// Log-likelihood statistics for one position
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct TokenStats {
    /// Log-probability of the token that actually followed
    pub log_likelihood: f64,
    /// Expected log-probability under the model's own distribution
    pub mean: f64,
    /// Variance of the log-probability under the model's own distribution
    pub variance: f64,
}

/// Compute [`TokenStats`] for a single position.
///
/// `scratch` is overwritten; its contents afterwards are unspecified and
/// must not be read by the caller. A `token_id` outside `[0, vocab_size)`
/// contributes a log-likelihood of `0.0` (the position's signal is
/// discarded rather than treated as an error).
///
/// # Panics
///
/// Panics if `logits` or `scratch` is shorter than `vocab_size`.
pub fn token_stats(
    vocab_size: usize,
    token_id: TokenId,
    logits: &[f32],
    scratch: &mut [f64],
) -> TokenStats {
    let logits = &logits[..vocab_size];
    let scratch = &mut scratch[..vocab_size];

    let max_logit = logits
        .iter()
        .fold(f64::NEG_INFINITY, |acc, &l| acc.max(f64::from(l)));

    let mut sum_exp = 0.0;
    for (slot, &logit) in scratch.iter_mut().zip(logits) {
        *slot = (f64::from(logit) - max_logit).exp();
        sum_exp += *slot;
    }
    let log_sum_exp = sum_exp.ln();

    let log_likelihood = match logits.get(token_id as usize) {
        Some(&logit) => f64::from(logit) - max_logit - log_sum_exp,
        None => {
            tracing::trace!(token_id, vocab_size, "token id outside vocabulary, ignoring");
            0.0
        }
    };

    let mut mean = 0.0;
    let mut expected_square = 0.0;
    for (&weight, &logit) in scratch.iter().zip(logits) {
        let p = weight / sum_exp;
        let lp = f64::from(logit) - max_logit - log_sum_exp;
        mean += p * lp;
        expected_square += p * lp * lp;
    }

    TokenStats {
        log_likelihood,
        mean,
        variance: expected_square - mean * mean,
    }
}

/// Full breakdown of a discrepancy computation
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Discrepancy {
    /// Final normalized score
    pub score: f64,
    /// Σ log-likelihood over all positions
    pub total_log_likelihood: f64,
    /// Σ expected log-likelihood
    pub total_mean: f64,
    /// Σ variance
    pub total_variance: f64,
    /// Number of scored positions
    pub positions: usize,
}

impl Discrepancy {
    fn from_totals(total_log_likelihood: f64, total_mean: f64, total_variance: f64, positions: usize) -> Self {
        let score = if total_variance <= MIN_TOTAL_VARIANCE {
            0.0
        } else {
            (total_log_likelihood - total_mean) / total_variance.sqrt()
        };
        Self {
            score,
            total_log_likelihood,
            total_mean,
            total_variance,
            positions,
        }
    }
}

/// Reusable scorer that owns the per-vocabulary scratch buffer.
///
/// Keep one per thread and feed it every text; the buffer only grows when a
/// larger vocabulary shows up.
#[derive(Debug, Default)]
pub struct DiscrepancyScorer {
    scratch: Vec<f64>,
}

impl DiscrepancyScorer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-size the scratch buffer for a known vocabulary.
    pub fn with_vocab_size(vocab_size: usize) -> Self {
        Self {
            scratch: vec![0.0; vocab_size],
        }
    }

    /// Score a text: `rows[t]` predicts `tokens[t + 1]`.
    ///
    /// Callers must supply at least two tokens. Extra trailing rows beyond
    /// `tokens.len() - 1` are ignored.
    pub fn score<R: AsRef<[f32]>>(&mut self, rows: &[R], tokens: &[TokenId], vocab_size: usize) -> f64 {
        self.score_detailed(rows, tokens, vocab_size).score
    }

    /// Same as [`score`](Self::score) but keeps the accumulated sums.
    pub fn score_detailed<R: AsRef<[f32]>>(
        &mut self,
        rows: &[R],
        tokens: &[TokenId],
        vocab_size: usize,
    ) -> Discrepancy {
        debug_assert!(tokens.len() >= 2, "need at least two tokens to score");
        debug_assert!(rows.len() + 1 >= tokens.len(), "one logits row per predicted token");

        if self.scratch.len() < vocab_size {
            self.scratch.resize(vocab_size, 0.0);
        }

        let mut sum_ll = 0.0;
        let mut sum_mean = 0.0;
        let mut sum_var = 0.0;
        let mut positions = 0;

        for (row, &next_token) in rows.iter().zip(tokens.iter().skip(1)) {
            let stats = token_stats(vocab_size, next_token, row.as_ref(), &mut self.scratch);
            sum_ll += stats.log_likelihood;
            sum_mean += stats.mean;
            sum_var += stats.variance;
            positions += 1;
        }

        Discrepancy::from_totals(sum_ll, sum_mean, sum_var, positions)
    }
}

/// One-shot convenience wrapper around [`DiscrepancyScorer`].
pub fn compute_discrepancy<R: AsRef<[f32]>>(rows: &[R], tokens: &[TokenId], vocab_size: usize) -> f64 {
    DiscrepancyScorer::with_vocab_size(vocab_size).score(rows, tokens, vocab_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn stats_for(logits: &[f32], token: TokenId) -> TokenStats {
        let mut scratch = vec![0.0; logits.len()];
        token_stats(logits.len(), token, logits, &mut scratch)
    }

    fn log_probs(logits: &[f32]) -> Vec<f64> {
        let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max) as f64;
        let sum: f64 = logits.iter().map(|&l| (l as f64 - max).exp()).sum();
        logits.iter().map(|&l| l as f64 - max - sum.ln()).collect()
    }

    #[test]
    fn test_worked_example() {
        let stats = stats_for(&[1.0, 2.0, 3.0, 4.0], 3);

        let expected_ll = -((-3.0f64).exp() + (-2.0f64).exp() + (-1.0f64).exp() + 1.0).ln();
        assert!((stats.log_likelihood - expected_ll).abs() < 1e-12);
        assert!((stats.log_likelihood - (-0.4402)).abs() < 1e-4);
        assert!((stats.mean - (-0.9475)).abs() < 1e-4);
        assert!((stats.variance - 0.6166).abs() < 1e-4);
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let logits = [0.3f32, -12.0, 7.5, 7.4, 0.0, 1e-3, -0.5];
        let mut scratch = vec![0.0; logits.len()];
        let total: f64 = (0..logits.len() as TokenId)
            .map(|id| token_stats(logits.len(), id, &logits, &mut scratch).log_likelihood.exp())
            .sum();
        assert!((total - 1.0).abs() < 1e-12);

        // Mean must equal Σ p·lp computed independently
        let lps = log_probs(&logits);
        let expected_mean: f64 = lps.iter().map(|lp| lp.exp() * lp).sum();
        let stats = stats_for(&logits, 2);
        assert!((stats.mean - expected_mean).abs() < 1e-12);
    }

    #[test]
    fn test_shift_invariance() {
        let logits = [0.5f32, -1.25, 3.0, 2.0, -4.0];
        for shift in [-100.0f32, -3.5, 0.25, 42.0] {
            let shifted: Vec<f32> = logits.iter().map(|l| l + shift).collect();
            let a = stats_for(&logits, 1);
            let b = stats_for(&shifted, 1);
            assert!((a.log_likelihood - b.log_likelihood).abs() < 1e-5, "shift {}", shift);
            assert!((a.mean - b.mean).abs() < 1e-5, "shift {}", shift);
            assert!((a.variance - b.variance).abs() < 1e-5, "shift {}", shift);
        }
    }

    #[test]
    fn test_out_of_range_token_contributes_zero() {
        let stats = stats_for(&[1.0, 2.0, 3.0], 3);
        assert_eq!(stats.log_likelihood, 0.0);
        // Distribution moments are still reported
        assert!(stats.mean < 0.0);
    }

    #[test]
    fn test_large_logits_do_not_overflow() {
        let stats = stats_for(&[1000.0, 999.0, -1000.0], 0);
        assert!(stats.log_likelihood.is_finite());
        assert!(stats.mean.is_finite());
        assert!(stats.variance.is_finite());
    }

    #[test]
    fn test_uniform_logits_give_zero_discrepancy() {
        let rows = vec![vec![0.7f32; 8]; 5];
        let tokens = [0, 1, 2, 3, 4, 5];
        assert_eq!(compute_discrepancy(&rows, &tokens, 8), 0.0);
    }

    #[test]
    fn test_discrepancy_matches_manual_sums() {
        let rows = vec![vec![1.0f32, 2.0, 3.0, 4.0], vec![0.0f32, 0.5, -1.0, 2.0]];
        let tokens = [0, 3, 1];

        let a = stats_for(&rows[0], 3);
        let b = stats_for(&rows[1], 1);
        let expected = (a.log_likelihood + b.log_likelihood - a.mean - b.mean)
            / (a.variance + b.variance).sqrt();

        let got = compute_discrepancy(&rows, &tokens, 4);
        assert!((got - expected).abs() < EPS);
    }

    #[test]
    fn test_discrepancy_is_shift_invariant_per_row() {
        let rows = vec![vec![1.0f32, 2.0, 3.0, 4.0], vec![0.0f32, 0.5, -1.0, 2.0]];
        let shifted = vec![
            rows[0].iter().map(|l| l + 10.0).collect::<Vec<f32>>(),
            rows[1].iter().map(|l| l - 3.0).collect::<Vec<f32>>(),
        ];
        let tokens = [2, 3, 0];
        let a = compute_discrepancy(&rows, &tokens, 4);
        let b = compute_discrepancy(&shifted, &tokens, 4);
        assert!((a - b).abs() < 1e-5);
    }

    #[test]
    fn test_predictable_text_scores_higher() {
        // Peaked distribution; following the argmax beats the model's expectation
        let row = vec![5.0f32, 0.0, 0.0, 0.0];
        let rows = vec![row.clone(), row.clone(), row];
        let likely = compute_discrepancy(&rows, &[0, 0, 0, 0], 4);
        let unlikely = compute_discrepancy(&rows, &[0, 2, 3, 1], 4);
        assert!(likely > 0.0);
        assert!(unlikely < 0.0);
    }

    #[test]
    fn test_extra_trailing_row_is_ignored() {
        let rows = vec![vec![1.0f32, 2.0, 3.0], vec![3.0f32, 2.0, 1.0], vec![9.0f32, 0.0, 0.0]];
        let with_extra = compute_discrepancy(&rows, &[0, 2, 0], 3);
        let exact = compute_discrepancy(&rows[..2], &[0, 2, 0], 3);
        assert_eq!(with_extra, exact);
    }

    #[test]
    fn test_scorer_reuses_buffer_across_vocab_sizes() {
        let mut scorer = DiscrepancyScorer::new();
        let small = scorer.score(&[vec![1.0f32, 0.0]], &[0, 0], 2);
        let large = scorer.score(&[vec![1.0f32, 0.0, 0.0, 0.0]], &[0, 0], 4);
        assert!(small.is_finite());
        assert!(large.is_finite());
        // Single position: numerator is ll - mean, denominator is sqrt(var)
        let detailed = scorer.score_detailed(&[vec![1.0f32, 0.0]], &[0, 0], 2);
        assert_eq!(detailed.positions, 1);
        assert_eq!(detailed.score, small);
    }
}
