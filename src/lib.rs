//! fastdetect - discrepancy-based detection of machine-generated text
//!
//! A text is scored by how much more predictable it is to a language model
//! than the model's own distribution says it should be. Labeled scores are
//! then used to calibrate a decision threshold.

pub mod calibrate;
pub mod config;
pub mod detect;
pub mod inference;
pub mod table;
