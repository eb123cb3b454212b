//! Run configuration

use crate::{
    error::ConfigError,
    query::{CorpusParams, YearRange},
    retry::{RetryPolicy, DEFAULT_BASE_DELAY, DEFAULT_MAX_JITTER, DEFAULT_MAX_RETRIES},
    Args, Word, Year, MAX_BATCH_SIZE,
};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::{collections::HashSet, num::NonZeroUsize, path::PathBuf, sync::Arc, time::Duration};

/// Default first year of the queried range
pub const DEFAULT_YEAR_START: Year = 2021;

/// Default last year of the queried range
pub const DEFAULT_YEAR_END: Year = 2022;

/// Default number of words per API request
pub const DEFAULT_BATCH_SIZE: i64 = 12;

/// Default pause between two batches
pub const DEFAULT_PACING_DELAY: Duration = Duration::from_millis(2000);

/// Run input, as provided by the user
///
/// This is what the `--input-file` and `--input` options contain, and what
/// individual command-line settings are collected into when neither is used.
#[allow(missing_docs)]
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct RunInput {
    // Fields have the same meaning as the matching options in Args
    pub words: Vec<String>,
    pub year_start: Year,
    pub year_end: Year,
    pub batch_size: i64,
    pub max_retries: Option<u32>,
    pub base_delay_ms: Option<u64>,
    pub pacing_delay_ms: Option<u64>,
    pub pacing_jitter_ms: Option<u64>,
    pub resume: Option<bool>,
}
//
impl Default for RunInput {
    fn default() -> Self {
        Self {
            words: Vec::new(),
            year_start: DEFAULT_YEAR_START,
            year_end: DEFAULT_YEAR_END,
            batch_size: DEFAULT_BATCH_SIZE,
            max_retries: None,
            base_delay_ms: None,
            pacing_delay_ms: None,
            pacing_jitter_ms: None,
            resume: None,
        }
    }
}

/// Where the run input comes from, by decreasing priority
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum InputSource {
    /// JSON file
    File(PathBuf),

    /// JSON string
    Inline(String),

    /// Individual command-line settings
    Settings(RunInput),
}
//
impl InputSource {
    /// Pick the first input source that the user provided
    pub(crate) fn from_args(args: &Args) -> Self {
        if let Some(path) = &args.input_file {
            Self::File(path.clone())
        } else if let Some(json) = &args.input {
            Self::Inline(json.clone())
        } else {
            Self::Settings(RunInput {
                words: args.words.iter().chain(&args.word_args).cloned().collect(),
                year_start: args.year_start.unwrap_or(DEFAULT_YEAR_START),
                year_end: args.year_end.unwrap_or(DEFAULT_YEAR_END),
                batch_size: args.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
                max_retries: args.max_retries,
                base_delay_ms: args.base_delay_ms,
                pacing_delay_ms: args.pacing_delay_ms,
                pacing_jitter_ms: args.pacing_jitter_ms,
                resume: None,
            })
        }
    }

    /// Load the run input
    pub fn resolve(self) -> Result<RunInput, ConfigError> {
        match self {
            Self::File(path) => {
                let json = std::fs::read_to_string(&path).map_err(|source| {
                    ConfigError::InputFile {
                        path: path.display().to_string().into(),
                        source,
                    }
                })?;
                Ok(serde_json::from_str(&json)?)
            }
            Self::Inline(json) => Ok(serde_json::from_str(&json)?),
            Self::Settings(input) => Ok(input),
        }
    }
}

/// Final, validated run configuration
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    /// Words to be queried, trimmed and deduplicated
    pub words: Box<[Word]>,

    /// Publication years of interest
    pub years: YearRange,

    /// Maximal number of words per request
    pub batch_size: NonZeroUsize,

    /// Retry policy for each batch
    pub retry: RetryPolicy,

    /// Pause between two batches
    pub pacing_delay: Duration,

    /// Exclusive upper bound on the random extra pause between two batches
    pub pacing_jitter: Duration,

    /// Truth that progress from a previous run should be picked up
    pub resume: bool,

    /// Corpus-side query settings
    pub corpus: CorpusParams,

    /// Timeout of individual HTTP requests, if any
    pub request_timeout: Option<Duration>,
}
//
impl Config {
    /// Determine the run configuration from CLI arguments
    pub(crate) fn new(args: &Args) -> Result<Arc<Self>, ConfigError> {
        let mut input = InputSource::from_args(args).resolve()?;
        if args.no_resume {
            input.resume = Some(false);
        }
        let corpus = CorpusParams {
            corpus: args.corpus.clone(),
            smoothing: args.smoothing,
        };
        let request_timeout = args.request_timeout_secs.map(Duration::from_secs);
        Self::from_input(input, corpus, request_timeout)
    }

    /// Validate user input into a run configuration
    pub fn from_input(
        input: RunInput,
        corpus: CorpusParams,
        request_timeout: Option<Duration>,
    ) -> Result<Arc<Self>, ConfigError> {
        let RunInput {
            words,
            year_start,
            year_end,
            batch_size,
            max_retries,
            base_delay_ms,
            pacing_delay_ms,
            pacing_jitter_ms,
            resume,
        } = input;

        let words = check_words(words)?;
        let batch_size = usize::try_from(batch_size)
            .ok()
            .filter(|&size| size <= MAX_BATCH_SIZE)
            .and_then(NonZeroUsize::new)
            .ok_or(ConfigError::BatchSize(batch_size))?;
        if year_start > year_end {
            return Err(ConfigError::YearRange {
                start: year_start,
                end: year_end,
            });
        }
        let max_retries = max_retries.unwrap_or(DEFAULT_MAX_RETRIES);
        if max_retries == 0 {
            return Err(ConfigError::NoAttempts);
        }

        Ok(Arc::new(Self {
            words,
            years: YearRange {
                start: year_start,
                end: year_end,
            },
            batch_size,
            retry: RetryPolicy {
                max_retries,
                base_delay: base_delay_ms.map_or(DEFAULT_BASE_DELAY, Duration::from_millis),
                max_jitter: DEFAULT_MAX_JITTER,
            },
            pacing_delay: pacing_delay_ms.map_or(DEFAULT_PACING_DELAY, Duration::from_millis),
            pacing_jitter: pacing_jitter_ms.map_or(Duration::ZERO, Duration::from_millis),
            resume: resume.unwrap_or(true),
            corpus,
            request_timeout,
        }))
    }

    /// Number of batches needed to cover all words
    pub fn num_batches(&self) -> usize {
        self.words.len().div_ceil(self.batch_size.get())
    }

    /// Hex digest of the settings that checkpoint offsets are relative to
    ///
    /// The batch size is left out, as a run may be resumed with another one.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update((self.words.len() as u64).to_le_bytes());
        for word in self.words.iter() {
            hasher.update((word.len() as u64).to_le_bytes());
            hasher.update(word.as_bytes());
        }
        hasher.update(self.years.start.to_le_bytes());
        hasher.update(self.years.end.to_le_bytes());
        hasher.update(self.corpus.corpus.as_bytes());
        hasher.update(self.corpus.smoothing.to_le_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Trim words, reject blank ones, and drop duplicates
fn check_words(words: Vec<String>) -> Result<Box<[Word]>, ConfigError> {
    if words.is_empty() {
        return Err(ConfigError::NoWords);
    }
    let mut seen = HashSet::new();
    let mut checked = Vec::with_capacity(words.len());
    for (idx, word) in words.iter().enumerate() {
        let word = word.trim();
        if word.is_empty() {
            return Err(ConfigError::BlankWord { position: idx + 1 });
        }
        if seen.insert(word) {
            checked.push(Word::from(word));
        } else {
            log::warn!("Ignoring duplicate word {word:?}");
        }
    }
    Ok(checked.into())
}
