//! Threshold command - calibrate a decision threshold from labeled scores

use anyhow::{Context, Result};
use console::style;
use fastdetect::calibrate::{find_optimal_threshold, ThresholdResult};
use fastdetect::table::Table;
use std::path::Path;
use tracing::warn;

pub fn run(file: &Path, score_col: &str, label_col: &str, beta: f64, format: &str) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("Input file not found: {}", file.display());
    }

    let table = Table::load(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let pairs = table.labeled_scores(score_col, label_col)?;
    if pairs.skipped > 0 {
        warn!(
            "Skipped {} of {} rows with a null '{}' or '{}'",
            pairs.skipped,
            table.len(),
            score_col,
            label_col
        );
    }

    let result = find_optimal_threshold(&pairs.scores, &pairs.labels, beta)
        .with_context(|| format!("Calibration failed on {}", file.display()))?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_results(&result, beta, pairs.scores.len()),
    }
    Ok(())
}

fn print_results(result: &ThresholdResult, beta: f64, rows: usize) {
    println!("{}", style("RESULTS").bold());
    println!("  {} {}", style("Rows:").dim(), rows);
    println!("  {} {:.4}", style("Optimal threshold:").cyan(), result.threshold);
    println!("  {} {:.4}", style(format!("F{}-score:", beta)).cyan(), result.f_score);
    println!("  {} {:.4}", style("Precision:").cyan(), result.precision);
    println!("  {} {:.4}", style("Recall:").cyan(), result.recall);
    println!("  {} {:.4}", style("Accuracy:").cyan(), result.accuracy);
    println!(
        "  {} {}",
        style("Direction:").cyan(),
        style(result.direction().describe()).green()
    );
}
