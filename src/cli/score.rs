//! Score command - single texts, logits dumps and batch tables

use super::is_table;
use anyhow::{Context, Result};
use console::style;
use fastdetect::detect::batch::score_batch;
use fastdetect::detect::{Discrepancy, DiscrepancyScorer};
use fastdetect::inference::{analyze_text, LogitsDump, NgramModel};
use fastdetect::table::{Table, SCORE_COLUMN};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub fn run(
    file: &Path,
    model_path: &Path,
    n_ctx: usize,
    column: &str,
    output: &Path,
    format: &str,
) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("Input file not found: {}", file.display());
    }
    if !model_path.exists() {
        anyhow::bail!(
            "Model file not found: {}\nTrain one with: fastdetect train -f corpus.txt -o {}",
            model_path.display(),
            model_path.display()
        );
    }

    let mut model = NgramModel::load(model_path)
        .with_context(|| format!("Failed to load model {}", model_path.display()))?;
    info!(
        "Loaded model {} ({} tokens seen)",
        model_path.display(),
        model.total_tokens()
    );
    if !model.is_confident() {
        warn!(
            "Model was trained on only {} tokens; scores may be noisy",
            model.total_tokens()
        );
    }

    if is_table(file) {
        run_batch(&mut model, file, n_ctx, column, output)
    } else {
        let text = std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read {}", file.display()))?;
        let mut scorer = DiscrepancyScorer::new();
        let result = analyze_text(&mut model, &mut scorer, &text, n_ctx)
            .with_context(|| format!("Failed to score {}", file.display()))?;
        print_single(&result, format)
    }
}

/// Score a precomputed logits dump; no model is involved.
pub fn run_dump(file: &Path, format: &str) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("Input file not found: {}", file.display());
    }
    let dump = LogitsDump::load(file)
        .with_context(|| format!("Failed to read logits dump {}", file.display()))?;
    let result = dump.score(&mut DiscrepancyScorer::with_vocab_size(dump.vocab_size))?;
    print_single(&result, format)
}

fn print_single(result: &Discrepancy, format: &str) -> Result<()> {
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(result)?),
        _ => println!("DISCREPANCY: {:.4}", result.score),
    }
    Ok(())
}

fn run_batch(
    model: &mut NgramModel,
    file: &Path,
    n_ctx: usize,
    column: &str,
    output: &Path,
) -> Result<()> {
    let table = Table::load(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let texts = table.text_column(column)?;

    eprintln!(
        "{} Scoring {} rows from column '{}'",
        style("▸").cyan(),
        texts.len(),
        column
    );

    let cancel = CancellationToken::new();
    if let Err(e) = install_ctrlc_handler(cancel.clone()) {
        warn!("Ctrl-C handling unavailable: {}", e);
    }

    let bar = ProgressBar::new(texts.len() as u64);
    bar.set_style(progress_style()?);
    let outcome = score_batch(model, &texts, n_ctx, &cancel, |_, _| bar.inc(1));
    bar.finish_and_clear();

    let scored = table.with_scores(SCORE_COLUMN, &outcome.scores);
    scored
        .save(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    match outcome.interrupted_at {
        Some(at) => {
            warn!("Interrupted after {} of {} rows", at, texts.len());
            eprintln!(
                "{} Interrupted: saved the first {} of {} rows to {}",
                style("!").yellow(),
                at,
                texts.len(),
                output.display()
            );
        }
        None => {
            let failed = outcome.scores.len() - outcome.scored();
            eprintln!(
                "{} Saved {} rows to {}{}",
                style("✓").green(),
                scored.len(),
                output.display(),
                if failed > 0 {
                    style(format!(" ({} could not be scored)", failed)).dim().to_string()
                } else {
                    String::new()
                }
            );
        }
    }

    Ok(())
}

fn progress_style() -> Result<ProgressStyle> {
    Ok(ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
        .progress_chars("█▓▒░  "))
}

#[cfg(unix)]
fn listen_for_interrupt() -> std::io::Result<tokio::signal::unix::Signal> {
    tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
}

#[cfg(windows)]
fn listen_for_interrupt() -> std::io::Result<tokio::signal::windows::CtrlC> {
    tokio::signal::windows::ctrl_c()
}

/// Cancel `token` on the first Ctrl-C.
///
/// The listener is registered before this returns, so an interrupt can no
/// longer fall through to the default handler once scoring starts. Waiting
/// happens on a watcher thread so scoring stays synchronous.
fn install_ctrlc_handler(token: CancellationToken) -> Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let mut interrupt = {
        let _guard = rt.enter();
        listen_for_interrupt()?
    };

    std::thread::Builder::new()
        .name("ctrlc".to_string())
        .spawn(move || {
            rt.block_on(async move {
                if interrupt.recv().await.is_some() {
                    token.cancel();
                }
            });
        })?;
    Ok(())
}
