//! Configuration module for fastdetect
//!
//! Settings resolve in this order (later wins):
//! - built-in defaults
//! - ~/.config/fastdetect/config.toml
//! - FASTDETECT_* environment variables
//! - command-line flags

mod user_config;

pub use user_config::{CalibrationConfig, ModelConfig, UserConfig, DEFAULT_N_CTX};
