//! Batch scoring with cooperative cancellation
//!
//! The cancellation token is checked before every text, never inside one:
//! scores finished before the signal stay valid and are returned.

use crate::detect::DiscrepancyScorer;
use crate::inference::{analyze_text, LanguageModel};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Result of a (possibly interrupted) batch run
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    /// One entry per processed text, `None` where scoring failed
    pub scores: Vec<Option<f64>>,
    /// Index of the first text that was NOT processed, if cancelled
    pub interrupted_at: Option<usize>,
}

impl BatchOutcome {
    pub fn is_complete(&self) -> bool {
        self.interrupted_at.is_none()
    }

    /// Number of texts that produced a score
    pub fn scored(&self) -> usize {
        self.scores.iter().filter(|s| s.is_some()).count()
    }
}

/// Score every text in order until done or `cancel` fires.
///
/// `on_row` is called after each text with its index and result, which is
/// where the CLI advances its progress bar.
pub fn score_batch<M, S, F>(
    model: &mut M,
    texts: &[S],
    n_ctx: usize,
    cancel: &CancellationToken,
    mut on_row: F,
) -> BatchOutcome
where
    M: LanguageModel + ?Sized,
    S: AsRef<str>,
    F: FnMut(usize, Option<f64>),
{
    let mut scorer = DiscrepancyScorer::with_vocab_size(model.vocab_size());
    let mut outcome = BatchOutcome {
        scores: Vec::with_capacity(texts.len()),
        interrupted_at: None,
    };

    for (i, text) in texts.iter().enumerate() {
        if cancel.is_cancelled() {
            info!("Batch interrupted at row {} of {}", i, texts.len());
            outcome.interrupted_at = Some(i);
            break;
        }

        let score = match analyze_text(model, &mut scorer, text.as_ref(), n_ctx) {
            Ok(d) => {
                debug!(row = i, score = d.score, positions = d.positions, "scored");
                Some(d.score)
            }
            Err(e) => {
                warn!("Row {} skipped: {}", i, e);
                None
            }
        };

        outcome.scores.push(score);
        on_row(i, score);
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::NgramModel;

    fn trained_model() -> NgramModel {
        let mut model = NgramModel::new();
        for _ in 0..20 {
            model.train_on_text("the cat sat on the mat. the dog sat on the rug.");
        }
        model.finalize(1);
        model
    }

    #[test]
    fn test_scores_every_text() {
        let mut model = trained_model();
        let texts = ["the cat sat on the mat.", "the dog sat on the rug.", "zebra quantum"];
        let cancel = CancellationToken::new();
        let mut seen = Vec::new();

        let outcome = score_batch(&mut model, &texts, 512, &cancel, |i, _| seen.push(i));

        assert!(outcome.is_complete());
        assert_eq!(outcome.scores.len(), 3);
        assert_eq!(outcome.scored(), 3);
        assert_eq!(seen, vec![0, 1, 2]);
    }

    #[test]
    fn test_pre_cancelled_token_scores_nothing() {
        let mut model = trained_model();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = score_batch(&mut model, &["the cat sat."], 512, &cancel, |_, _| {});

        assert!(outcome.scores.is_empty());
        assert_eq!(outcome.interrupted_at, Some(0));
    }

    #[test]
    fn test_cancel_mid_batch_keeps_prefix() {
        let mut model = trained_model();
        let texts = ["the cat sat.", "the dog sat.", "the cat sat on the rug.", "the mat."];
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        let outcome = score_batch(&mut model, &texts, 512, &cancel, |i, _| {
            if i == 1 {
                trigger.cancel();
            }
        });

        assert_eq!(outcome.scores.len(), 2);
        assert_eq!(outcome.interrupted_at, Some(2));
        assert!(outcome.scores.iter().all(|s| s.is_some()));
    }

    #[test]
    fn test_failed_rows_are_recorded_as_none() {
        let mut model = trained_model();
        // Empty text only yields the BOS token
        let texts = ["", "the cat sat on the mat."];
        let cancel = CancellationToken::new();

        let outcome = score_batch(&mut model, &texts, 512, &cancel, |_, _| {});

        assert!(outcome.is_complete());
        assert_eq!(outcome.scores[0], None);
        assert!(outcome.scores[1].is_some());
    }
}
