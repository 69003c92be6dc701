//! tagx-analysis: statistical signals and validation for decrypted candidates
//!
//! # Overview
//! - `entropy`: byte histogram and base-2 Shannon entropy
//! - `pattern`: repeating-period detection, printable ratio, ASCII runs
//! - `validate`: hard structural checks plus weighted soft scoring
//!
//! Nothing here decrypts anything; the engine hands candidates in and gets
//! plain result values back.

pub mod entropy;
pub mod pattern;
pub mod validate;

use tagx_core::AnalysisResult;
use thiserror::Error;

pub use entropy::{histogram, shannon_entropy};
pub use pattern::{is_printable, longest_ascii_run, printable_ratio, repeating_period, MAX_PERIOD};
pub use validate::{validate, validate_tag};

/// Runs at or above this length set `has_ascii_runs`.
pub const ASCII_RUN_SIGNAL: usize = 4;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("cannot analyze an empty buffer")]
    EmptyInput,

    #[error("no validation profile for tag type {0}")]
    UnknownTagType(u16),
}

/// Compute every statistic the validator scores on.
pub fn analyze(buf: &[u8]) -> Result<AnalysisResult, AnalysisError> {
    if buf.is_empty() {
        return Err(AnalysisError::EmptyInput);
    }
    let hist = histogram(buf);
    let longest = longest_ascii_run(buf);
    Ok(AnalysisResult {
        len: buf.len(),
        entropy: shannon_entropy(&hist, buf.len()),
        repeating_pattern_length: repeating_period(buf),
        has_ascii_runs: longest >= ASCII_RUN_SIGNAL,
        longest_ascii_run: longest,
        printable_ratio: printable_ratio(buf),
        distinct_bytes: hist.iter().filter(|&&c| c > 0).count(),
        histogram: hist,
    })
}
