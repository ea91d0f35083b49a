//! CLI command definitions and handlers

mod score;
mod threshold;
mod train;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Parse and validate the context size (2 - 1048576 tokens)
fn parse_ctx(s: &str) -> Result<usize, String> {
    let n: usize = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number", s))?;
    if n < 2 {
        Err("context must hold at least 2 tokens".to_string())
    } else if n > 1 << 20 {
        Err("context cannot exceed 1048576 tokens".to_string())
    } else {
        Ok(n)
    }
}

/// fastdetect - discrepancy-based detection of machine-generated text
#[derive(Parser, Debug)]
#[command(name = "fastdetect")]
#[command(
    version,
    about = "Score texts for machine-generation likelihood and calibrate a decision threshold",
    long_about = "fastdetect compares how predictable a text is under a language model with \
how predictable the model itself expects it to be. The normalized gap (the discrepancy) is \
high for machine-generated text.\n\n\
Labeled scores can then be used to calibrate the best decision threshold.",
    after_help = "\
Examples:
  fastdetect train -f corpus.txt -o model.json        Build a local reference model
  fastdetect score -f essay.txt -m model.json         Score a single text
  fastdetect score -f rows.jsonl -o scored.jsonl      Score every row of a table
  fastdetect threshold -f scored.jsonl                Calibrate a threshold from labels"
)]
pub struct Cli {
    /// Log level (error, warn, info, debug, trace); RUST_LOG takes precedence
    #[arg(long, global = true, default_value = "warn", value_parser = ["error", "warn", "info", "debug", "trace"])]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compute the discrepancy score of a text file or of every row in a .jsonl table
    #[command(after_help = "\
Examples:
  fastdetect score -f essay.txt -m model.json           Single text, 4 decimals
  fastdetect score -f essay.txt --format json           Full breakdown as JSON
  fastdetect score -f rows.jsonl --col body             Score the 'body' column
  fastdetect score -f dump.json --logits                Score precomputed logits

Press Ctrl-C during a batch to stop; rows scored so far are still saved.")]
    Score {
        /// Input: plain text file, .jsonl table, or logits dump (with --logits)
        #[arg(long, short = 'f')]
        file: PathBuf,

        /// Model file (default: [model].path in config or FASTDETECT_MODEL)
        #[arg(long, short = 'm')]
        model: Option<PathBuf>,

        /// Treat the input as a precomputed logits dump
        #[arg(long, conflicts_with = "model")]
        logits: bool,

        /// Maximum tokens per text
        #[arg(long, short = 'c', value_parser = parse_ctx)]
        ctx: Option<usize>,

        /// Column to analyze (.jsonl only)
        #[arg(long)]
        col: Option<String>,

        /// Output file path (.jsonl only)
        #[arg(long, short = 'o', default_value = "output_scored.jsonl")]
        output: PathBuf,

        /// Output format for single texts: text, json
        #[arg(long, default_value = "text", value_parser = ["text", "json"])]
        format: String,
    },

    /// Find the threshold that best separates labeled scores (maximizes F-beta)
    #[command(after_help = "\
Examples:
  fastdetect threshold -f scored.jsonl                     F1 over 'discrepancy' and 'label'
  fastdetect threshold -f scored.jsonl --beta 2            Favour recall
  fastdetect threshold -f scored.jsonl --format json       Machine-readable result")]
    Threshold {
        /// Scored .jsonl table
        #[arg(long, short = 'f')]
        file: PathBuf,

        /// Column holding scores (default: discrepancy)
        #[arg(long)]
        score_col: Option<String>,

        /// Name of the label column (0=Human, 1=AI)
        #[arg(long)]
        label_col: Option<String>,

        /// F-beta weight (default: 1.0)
        #[arg(long)]
        beta: Option<f64>,

        /// Output format: text, json
        #[arg(long, default_value = "text", value_parser = ["text", "json"])]
        format: String,
    },

    /// Train the local bigram reference model from a text corpus
    Train {
        /// Corpus: plain text (paragraphs separated by blank lines) or .jsonl table
        #[arg(long, short = 'f')]
        file: PathBuf,

        /// Where to write the model
        #[arg(long, short = 'o', default_value = "model.json")]
        output: PathBuf,

        /// Words seen fewer times than this map to <unk>
        #[arg(long, default_value = "1")]
        min_count: u32,

        /// Column holding texts (.jsonl only)
        #[arg(long)]
        col: Option<String>,
    },

    /// Manage configuration (init or show)
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Initialize config file with example settings
    Init,
    /// Show effective config and paths
    Show,
}

/// Run the CLI with parsed arguments
pub fn run(cli: Cli) -> Result<()> {
    let config = fastdetect::config::UserConfig::load()?;

    match cli.command {
        Commands::Score {
            file,
            model,
            logits,
            ctx,
            col,
            output,
            format,
        } => {
            let n_ctx = ctx.unwrap_or_else(|| config.n_ctx());
            let column = col.unwrap_or_else(|| config.text_column().to_string());

            if logits {
                return score::run_dump(&file, &format);
            }

            let model_path = model
                .or_else(|| config.model_path().map(|p| p.to_path_buf()))
                .ok_or_else(|| {
                    anyhow::anyhow!(
                        "No model given. Pass --model, set FASTDETECT_MODEL, or run 'fastdetect train' first."
                    )
                })?;

            score::run(&file, &model_path, n_ctx, &column, &output, &format)
        }

        Commands::Threshold {
            file,
            score_col,
            label_col,
            beta,
            format,
        } => threshold::run(
            &file,
            score_col.as_deref().unwrap_or(config.score_column()),
            label_col.as_deref().unwrap_or(config.label_column()),
            beta.unwrap_or(config.beta()),
            &format,
        ),

        Commands::Train {
            file,
            output,
            min_count,
            col,
        } => {
            let column = col.unwrap_or_else(|| config.text_column().to_string());
            train::run(&file, &output, min_count, &column)
        }

        Commands::Config { action } => run_config_action(action, &config),

        Commands::Version => {
            println!("fastdetect {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// `.jsonl` inputs are tables, everything else is a single text
fn is_table(path: &std::path::Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| e.eq_ignore_ascii_case("jsonl"))
}

fn run_config_action(action: ConfigAction, config: &fastdetect::config::UserConfig) -> Result<()> {
    use fastdetect::config::UserConfig;
    match action {
        ConfigAction::Init => {
            let path = UserConfig::init_user_config()?;
            println!("✅ Config initialized at: {}", path.display());
            println!("\nOr set via environment:");
            println!("  export FASTDETECT_MODEL=\"/path/to/model.json\"");
            Ok(())
        }
        ConfigAction::Show => {
            println!("📁 Config path:");
            if let Some(user_path) = UserConfig::user_config_path() {
                let status = if user_path.exists() { "✓" } else { "(not found)" };
                println!("  User: {} {}", user_path.display(), status);
            }
            println!();
            println!(
                "  model.path:               {}",
                config
                    .model_path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(not set)".to_string())
            );
            println!("  model.n_ctx:              {}", config.n_ctx());
            println!("  model.text_column:        {}", config.text_column());
            println!("  calibration.beta:         {}", config.beta());
            println!("  calibration.score_column: {}", config.score_column());
            println!("  calibration.label_column: {}", config.label_column());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ctx_bounds() {
        assert_eq!(parse_ctx("4096"), Ok(4096));
        assert!(parse_ctx("1").is_err());
        assert!(parse_ctx("abc").is_err());
        assert!(parse_ctx("2000000").is_err());
    }

    #[test]
    fn test_is_table() {
        assert!(is_table(std::path::Path::new("rows.jsonl")));
        assert!(is_table(std::path::Path::new("ROWS.JSONL")));
        assert!(!is_table(std::path::Path::new("essay.txt")));
        assert!(!is_table(std::path::Path::new("noext")));
    }

    #[test]
    fn test_cli_parses_threshold_flags() {
        let cli = Cli::try_parse_from([
            "fastdetect", "threshold", "-f", "s.jsonl", "--beta", "2", "--label-col", "y",
        ])
        .unwrap();
        match cli.command {
            Commands::Threshold { beta, label_col, .. } => {
                assert_eq!(beta, Some(2.0));
                assert_eq!(label_col.as_deref(), Some("y"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_cli_rejects_model_with_logits() {
        let res = Cli::try_parse_from([
            "fastdetect", "score", "-f", "d.json", "--logits", "-m", "model.json",
        ]);
        assert!(res.is_err());
    }
}
