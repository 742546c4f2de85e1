//! Error types for churnscope

use std::path::PathBuf;
use thiserror::Error;

/// Fatal failures while reading the transaction source.
///
/// Any of these halts the pipeline before a single chart or summary is
/// produced; there is no degraded result.
#[derive(Error, Debug)]
pub enum SourceError {
    /// Input file does not exist
    #[error("input file not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// File exists but could not be read or parsed as CSV
    #[error("failed to read {}: {reason}", path.display())]
    Unreadable { path: PathBuf, reason: String },

    /// A required column is absent (matching ignores case and whitespace)
    #[error("missing required column '{column}' (found: {found})")]
    MissingColumn { column: &'static str, found: String },

    /// A row carries a value the pipeline cannot use
    #[error("row {row}: invalid {column}: {reason}")]
    InvalidValue {
        row: usize,
        column: &'static str,
        reason: String,
    },

    /// Header present but no data rows
    #[error("input file contains no transactions")]
    Empty,
}

/// Rejected control input from the interactive session or the CLI.
#[derive(Error, Debug, PartialEq)]
pub enum InputError {
    #[error("unknown command '{0}' (try: threshold, range, reset, show, export, quit)")]
    UnknownCommand(String),

    #[error("'{command}' expects {expected}")]
    Arity {
        command: &'static str,
        expected: &'static str,
    },

    #[error("not a whole number of days: '{0}'")]
    NotANumber(String),

    #[error("recency range is reversed: {low} > {high}")]
    ReversedRange { low: i64, high: i64 },
}
