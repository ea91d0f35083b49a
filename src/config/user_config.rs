//! User-level configuration for fastdetect
//!
//! Supports loading config from:
//! - Environment variables
//! - ~/.config/fastdetect/config.toml

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default context window (tokens) when nothing else is configured
pub const DEFAULT_N_CTX: usize = 4096;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct UserConfig {
    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub calibration: CalibrationConfig,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ModelConfig {
    /// Path to a trained model file
    pub path: Option<PathBuf>,

    /// Maximum tokens per text
    pub n_ctx: Option<usize>,

    /// Column holding the texts in batch input
    pub text_column: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct CalibrationConfig {
    /// F-beta weight (1.0 = F1)
    pub beta: Option<f64>,

    /// Column holding discrepancy scores
    pub score_column: Option<String>,

    /// Column holding 0/1 labels
    pub label_column: Option<String>,
}

impl UserConfig {
    /// Load config from all sources, with priority:
    /// 1. Environment variables (highest)
    /// 2. User config (~/.config/fastdetect/config.toml)
    pub fn load() -> Result<Self> {
        let mut config = UserConfig::default();

        if let Some(user_config) = Self::user_config_path()
            .filter(|p| p.exists())
            .and_then(|p| std::fs::read_to_string(&p).ok())
            .and_then(|content| match toml::from_str::<UserConfig>(&content) {
                Ok(c) => Some(c),
                Err(e) => {
                    tracing::warn!("Ignoring invalid user config: {}", e);
                    None
                }
            })
        {
            config.merge(user_config);
        }

        if let Ok(path) = std::env::var("FASTDETECT_MODEL") {
            config.model.path = Some(PathBuf::from(path));
        }
        if let Some(n_ctx) = std::env::var("FASTDETECT_CTX")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.model.n_ctx = Some(n_ctx);
        }

        Ok(config)
    }

    /// Get the user config file path
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("fastdetect").join("config.toml"))
    }

    /// Merge another config into this one (other takes priority)
    fn merge(&mut self, other: UserConfig) {
        if other.model.path.is_some() {
            self.model.path = other.model.path;
        }
        if other.model.n_ctx.is_some() {
            self.model.n_ctx = other.model.n_ctx;
        }
        if other.model.text_column.is_some() {
            self.model.text_column = other.model.text_column;
        }
        if other.calibration.beta.is_some() {
            self.calibration.beta = other.calibration.beta;
        }
        if other.calibration.score_column.is_some() {
            self.calibration.score_column = other.calibration.score_column;
        }
        if other.calibration.label_column.is_some() {
            self.calibration.label_column = other.calibration.label_column;
        }
    }

    pub fn model_path(&self) -> Option<&std::path::Path> {
        self.model.path.as_deref()
    }

    pub fn n_ctx(&self) -> usize {
        self.model.n_ctx.unwrap_or(DEFAULT_N_CTX)
    }

    pub fn text_column(&self) -> &str {
        self.model.text_column.as_deref().unwrap_or("text")
    }

    pub fn beta(&self) -> f64 {
        self.calibration.beta.unwrap_or(1.0)
    }

    pub fn score_column(&self) -> &str {
        self.calibration
            .score_column
            .as_deref()
            .unwrap_or(crate::table::SCORE_COLUMN)
    }

    pub fn label_column(&self) -> &str {
        self.calibration.label_column.as_deref().unwrap_or("label")
    }

    /// Initialize user config directory and create example config
    pub fn init_user_config() -> Result<PathBuf> {
        let config_path = Self::user_config_path()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        if !config_path.exists() {
            let example = r#"# fastdetect user configuration

[model]
# Model file produced by `fastdetect train`
# path = "/path/to/model.json"

# Maximum tokens per text
# n_ctx = 4096

# Column holding texts in .jsonl input
# text_column = "text"

[calibration]
# F-beta weight: 1.0 = F1, >1 favours recall, <1 favours precision
# beta = 1.0
# score_column = "discrepancy"
# label_column = "label"
"#;
            std::fs::write(&config_path, example)?;
        }

        Ok(config_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = UserConfig::default();
        assert!(config.model_path().is_none());
        assert_eq!(config.n_ctx(), DEFAULT_N_CTX);
        assert_eq!(config.text_column(), "text");
        assert_eq!(config.beta(), 1.0);
        assert_eq!(config.score_column(), "discrepancy");
        assert_eq!(config.label_column(), "label");
    }

    #[test]
    fn test_toml_parsing_full() {
        let toml_str = r#"
[model]
path = "/models/news.json"
n_ctx = 512
text_column = "body"

[calibration]
beta = 0.5
score_column = "score"
label_column = "is_ai"
"#;
        let config: UserConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.model_path(), Some(std::path::Path::new("/models/news.json")));
        assert_eq!(config.n_ctx(), 512);
        assert_eq!(config.text_column(), "body");
        assert_eq!(config.beta(), 0.5);
        assert_eq!(config.score_column(), "score");
        assert_eq!(config.label_column(), "is_ai");
    }

    #[test]
    fn test_toml_parsing_minimal() {
        let config: UserConfig = toml::from_str("").unwrap();
        assert_eq!(config.n_ctx(), DEFAULT_N_CTX);
    }

    #[test]
    fn test_invalid_toml_does_not_crash() {
        let bad_toml = "this is [[ not valid toml {{{}}}";
        assert!(toml::from_str::<UserConfig>(bad_toml).is_err());
    }

    #[test]
    fn test_merge_overrides_set_fields() {
        let mut base = UserConfig::default();
        let other = UserConfig {
            model: ModelConfig {
                path: Some(PathBuf::from("m.json")),
                n_ctx: Some(128),
                text_column: None,
            },
            calibration: CalibrationConfig {
                beta: Some(2.0),
                score_column: None,
                label_column: Some("y".to_string()),
            },
        };
        base.merge(other);
        assert_eq!(base.model_path(), Some(std::path::Path::new("m.json")));
        assert_eq!(base.n_ctx(), 128);
        assert_eq!(base.text_column(), "text");
        assert_eq!(base.beta(), 2.0);
        assert_eq!(base.label_column(), "y");
    }

    #[test]
    fn test_merge_preserves_base_when_other_is_none() {
        let mut base = UserConfig::default();
        base.model.n_ctx = Some(64);
        base.merge(UserConfig::default());
        assert_eq!(base.n_ctx(), 64);
    }

    #[test]
    fn test_user_config_path_returns_some() {
        if let Some(p) = UserConfig::user_config_path() {
            assert!(p.ends_with("fastdetect/config.toml"));
        }
    }
}
