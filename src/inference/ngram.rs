//! Word bigram language model
//!
//! Learns "how this corpus writes" from plain text and exposes it through
//! [`LanguageModel`], so the discrepancy scorer can run fully offline.
//!
//! ```text
//! P(w | c) = λ · (count(c, w) + k) / (count(c) + k·V)
//!          + (1 − λ) · (count(w) + k) / (N + k·V)
//! ```
//!
//! Logits are the natural-log probabilities, so every row is already
//! normalized.

use super::{InferenceError, InferenceResult, LanguageModel, Logits};
use crate::detect::TokenId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Beginning-of-sequence token (always id 0)
pub const BOS: &str = "<s>";
/// Out-of-vocabulary token (always id 1)
pub const UNK: &str = "<unk>";
/// Replacement for numeric literals
const NUM: &str = "<num>";

/// Add-k smoothing constant
const DEFAULT_SMOOTHING: f64 = 0.1;

/// Weight of the bigram estimate against the unigram backoff
const DEFAULT_BIGRAM_WEIGHT: f64 = 0.8;

/// Minimum training tokens before the model is considered reliable
const MIN_TOKENS_FOR_CONFIDENCE: usize = 5000;

/// A smoothed word bigram model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NgramModel {
    version: u32,
    /// When the vocabulary was last built
    trained_at: Option<String>,
    smoothing: f64,
    bigram_weight: f64,
    /// id -> token
    vocab: Vec<String>,
    /// Times each id was observed as a prediction target
    unigram_counts: Vec<u32>,
    /// context id -> (next id -> count)
    successors: Vec<HashMap<TokenId, u32>>,
    /// Training tokens seen (excluding BOS)
    total_tokens: usize,
    #[serde(skip)]
    index: HashMap<String, TokenId>,
    #[serde(skip)]
    context_totals: Vec<u32>,
    #[serde(skip)]
    pending: PendingCounts,
}

/// Raw string-keyed counts gathered before the vocabulary is fixed
#[derive(Debug, Clone, Default)]
struct PendingCounts {
    unigrams: HashMap<String, u32>,
    bigrams: HashMap<(String, String), u32>,
    tokens: usize,
}

impl NgramModel {
    pub const VERSION: u32 = 1;

    pub fn new() -> Self {
        Self {
            version: Self::VERSION,
            trained_at: None,
            smoothing: DEFAULT_SMOOTHING,
            bigram_weight: DEFAULT_BIGRAM_WEIGHT,
            vocab: Vec::new(),
            unigram_counts: Vec::new(),
            successors: Vec::new(),
            total_tokens: 0,
            index: HashMap::new(),
            context_totals: Vec::new(),
            pending: PendingCounts::default(),
        }
    }

    /// Feed one document. Call [`finalize`](Self::finalize) once all text is in.
    pub fn train_on_text(&mut self, text: &str) {
        let words = Self::tokenize_words(text);
        if words.is_empty() {
            return;
        }

        let mut prev = BOS.to_string();
        for word in words {
            *self.pending.unigrams.entry(word.clone()).or_insert(0) += 1;
            *self
                .pending
                .bigrams
                .entry((prev, word.clone()))
                .or_insert(0) += 1;
            self.pending.tokens += 1;
            prev = word;
        }
    }

    /// Fix the vocabulary and build id-space counts.
    ///
    /// Words seen fewer than `min_count` times are folded into `<unk>`.
    pub fn finalize(&mut self, min_count: u32) {
        let mut words: Vec<(&String, &u32)> = self
            .pending
            .unigrams
            .iter()
            .filter(|&(_, &c)| c >= min_count.max(1))
            .collect();
        words.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

        let mut vocab = vec![BOS.to_string(), UNK.to_string()];
        vocab.extend(words.into_iter().map(|(w, _)| w.clone()));
        self.vocab = vocab;
        self.rebuild_index();

        let v = self.vocab.len();
        let mut unigram_counts = vec![0u32; v];
        let mut successors: Vec<HashMap<TokenId, u32>> = vec![HashMap::new(); v];

        for (word, &count) in &self.pending.unigrams {
            unigram_counts[self.id_of(word) as usize] += count;
        }
        for ((prev, next), &count) in &self.pending.bigrams {
            let ctx = self.id_of(prev) as usize;
            *successors[ctx].entry(self.id_of(next)).or_insert(0) += count;
        }

        self.unigram_counts = unigram_counts;
        self.successors = successors;
        self.total_tokens = self.pending.tokens;
        self.trained_at = Some(chrono::Utc::now().to_rfc3339());
        self.rebuild_context_totals();

        tracing::info!(
            "Built bigram model: {} tokens, vocabulary {} (min count {})",
            self.total_tokens,
            self.vocab.len(),
            min_count
        );
    }

    /// Split text into lower-cased words, `<num>` and single punctuation marks.
    pub fn tokenize_words(text: &str) -> Vec<String> {
        let mut tokens = Vec::new();
        let mut chars = text.chars().peekable();

        while let Some(&ch) = chars.peek() {
            if ch.is_whitespace() {
                chars.next();
            } else if ch.is_ascii_digit() {
                while chars
                    .peek()
                    .map_or(false, |c| c.is_ascii_digit() || *c == '.' || *c == ',')
                {
                    chars.next();
                }
                tokens.push(NUM.to_string());
            } else if ch.is_alphanumeric() {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || c == '\'' || c == '-' {
                        word.extend(c.to_lowercase());
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(word);
            } else {
                chars.next();
                tokens.push(ch.to_string());
            }
        }

        tokens
    }

    /// Load a model saved with [`save`](Self::save).
    pub fn load(path: &Path) -> InferenceResult<Self> {
        let data = std::fs::read_to_string(path)?;
        let mut model: Self = serde_json::from_str(&data)?;
        if model.version != Self::VERSION {
            return Err(InferenceError::InvalidModel(format!(
                "model version mismatch ({} vs {})",
                model.version,
                Self::VERSION
            )));
        }
        if model.vocab.len() < 2
            || model.unigram_counts.len() != model.vocab.len()
            || model.successors.len() != model.vocab.len()
        {
            return Err(InferenceError::InvalidModel(
                "vocabulary and count tables disagree".to_string(),
            ));
        }
        let vocab_size = model.vocab.len();
        if let Some((ctx, id)) = model
            .successors
            .iter()
            .enumerate()
            .find_map(|(ctx, next)| next.keys().find(|&&id| id as usize >= vocab_size).map(|&id| (ctx, id)))
        {
            return Err(InferenceError::InvalidModel(format!(
                "successor id {} of context {} is outside the vocabulary ({} tokens)",
                id, ctx, vocab_size
            )));
        }
        model.rebuild_index();
        model.rebuild_context_totals();
        Ok(model)
    }

    pub fn save(&self, path: &Path) -> InferenceResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.vocab.len() >= 2
    }

    pub fn is_confident(&self) -> bool {
        self.total_tokens >= MIN_TOKENS_FOR_CONFIDENCE
    }

    pub fn total_tokens(&self) -> usize {
        self.total_tokens
    }

    pub fn trained_at(&self) -> Option<&str> {
        self.trained_at.as_deref()
    }

    /// Id for a token, `<unk>` when unknown
    pub fn id_of(&self, token: &str) -> TokenId {
        self.index.get(token).copied().unwrap_or(1)
    }

    pub fn token(&self, id: TokenId) -> Option<&str> {
        self.vocab.get(id as usize).map(String::as_str)
    }

    fn rebuild_index(&mut self) {
        self.index = self
            .vocab
            .iter()
            .enumerate()
            .map(|(i, w)| (w.clone(), i as TokenId))
            .collect();
    }

    fn rebuild_context_totals(&mut self) {
        self.context_totals = self
            .successors
            .iter()
            .map(|next| next.values().sum())
            .collect();
    }

    /// Fill `row` with log P(· | context).
    fn fill_row(&self, context: TokenId, row: &mut [f32]) {
        let v = self.vocab.len() as f64;
        let k = self.smoothing;
        let lambda = self.bigram_weight;
        let uni_denom = self.total_tokens as f64 + k * v;

        let ctx = context as usize;
        let ctx_total = self.context_totals.get(ctx).copied().unwrap_or(0) as f64;
        let bi_denom = ctx_total + k * v;

        let mut probs: Vec<f64> = self
            .unigram_counts
            .iter()
            .map(|&c| lambda * k / bi_denom + (1.0 - lambda) * (c as f64 + k) / uni_denom)
            .collect();

        if let Some(next) = self.successors.get(ctx) {
            for (&id, &count) in next {
                probs[id as usize] += lambda * count as f64 / bi_denom;
            }
        }

        for (slot, p) in row.iter_mut().zip(probs) {
            *slot = p.ln() as f32;
        }
    }
}

impl Default for NgramModel {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageModel for NgramModel {
    fn vocab_size(&self) -> usize {
        self.vocab.len()
    }

    fn tokenize(&self, text: &str) -> InferenceResult<Vec<TokenId>> {
        if !self.is_ready() {
            return Err(InferenceError::InvalidModel("model has no vocabulary".to_string()));
        }
        let mut ids = vec![0];
        ids.extend(Self::tokenize_words(text).iter().map(|w| self.id_of(w)));
        Ok(ids)
    }

    fn forward(&mut self, tokens: &[TokenId]) -> InferenceResult<Logits> {
        let v = self.vocab.len();
        if v < 2 {
            return Err(InferenceError::InvalidModel("model has no vocabulary".to_string()));
        }
        let mut data = vec![0.0f32; tokens.len() * v];
        for (row, &context) in data.chunks_exact_mut(v).zip(tokens) {
            self.fill_row(context, row);
        }
        Logits::from_flat(v, data)
    }
}
