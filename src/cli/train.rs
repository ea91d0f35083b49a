//! Train command - build the bigram reference model from a corpus

use super::is_table;
use anyhow::{Context, Result};
use console::style;
use fastdetect::inference::{LanguageModel, NgramModel};
use fastdetect::table::Table;
use std::path::Path;
use tracing::warn;

pub fn run(file: &Path, output: &Path, min_count: u32, column: &str) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("Corpus not found: {}", file.display());
    }

    let documents = if is_table(file) {
        Table::load(file)
            .with_context(|| format!("Failed to read {}", file.display()))?
            .text_column(column)?
    } else {
        let content = std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read {}", file.display()))?;
        split_paragraphs(&content)
    };

    let mut model = NgramModel::new();
    for doc in &documents {
        model.train_on_text(doc);
    }
    model.finalize(min_count);

    if model.total_tokens() == 0 {
        anyhow::bail!("Corpus {} contains no words", file.display());
    }
    if !model.is_confident() {
        warn!(
            "Only {} training tokens; scores from this model will be noisy",
            model.total_tokens()
        );
    }

    model
        .save(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!(
        "{} Trained on {} documents ({} tokens, vocabulary {})",
        style("✓").green(),
        documents.len(),
        model.total_tokens(),
        model.vocab_size()
    );
    println!("  {} {}", style("Model:").dim(), output.display());
    Ok(())
}

/// Paragraphs are separated by one or more blank lines.
fn split_paragraphs(content: &str) -> Vec<String> {
    let mut docs = Vec::new();
    let mut current = String::new();
    for line in content.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                docs.push(std::mem::take(&mut current));
            }
        } else {
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(line);
        }
    }
    if !current.is_empty() {
        docs.push(current);
    }
    docs
}
