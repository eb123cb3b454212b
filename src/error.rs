//! Typed failures of the batch pipeline
//!
//! Application-level plumbing (files, terminal, startup) goes through
//! [`anyhow`], but the failures that the pipeline needs to make decisions
//! about are spelled out here so that they can be matched upon.

use crate::{Word, Year};
use reqwest::StatusCode;
use thiserror::Error;

/// Invalid run configuration, detected before any network activity
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("the word list is empty")]
    NoWords,

    #[error("word #{position} is blank")]
    BlankWord { position: usize },

    #[error("batch size {0} is out of the accepted range 1..={max}", max = crate::MAX_BATCH_SIZE)]
    BatchSize(i64),

    #[error("year range {start}..={end} is empty")]
    YearRange { start: Year, end: Year },

    #[error("at least one fetch attempt per batch is needed")]
    NoAttempts,

    #[error("failed to read input file {path}: {source}")]
    InputFile {
        path: Box<str>,
        source: std::io::Error,
    },

    #[error("input is not a valid JSON input object: {0}")]
    InputJson(#[from] serde_json::Error),
}

/// Failure of a single batch fetch, which may go away if retried
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("server replied with HTTP status {0}")]
    Status(StatusCode),

    #[error("request failed: {0}")]
    Network(#[source] reqwest::Error),

    #[error("could not parse response body: {0}")]
    Parse(#[source] serde_json::Error),
}

/// A batch whose retry budget has been used up
#[derive(Debug, Error)]
#[error("batch [{}] failed after {attempts} attempt(s): {last_error}", .words.join(","))]
pub struct BatchExhausted {
    /// Words of the batch that could not be fetched
    pub words: Box<[Word]>,

    /// Number of fetch attempts that were made
    pub attempts: u32,

    /// Error from the final attempt
    #[source]
    pub last_error: FetchError,
}
