//! This program queries the Google Books Ngram Viewer's JSON API, whose web
//! interface you can find at <https://books.google.com/ngrams>, for the recent
//! usage frequency of a list of words.

mod checkpoint;
mod config;
mod error;
mod fetch;
mod pipeline;
mod progress;
mod query;
mod response;
mod retry;
mod sink;

use crate::{
    checkpoint::{Checkpoint, FileStore},
    config::Config,
    fetch::Fetcher,
    progress::ProgressReport,
    retry::TokioSleeper,
    sink::JsonLinesSink,
};
use anyhow::Context;
use clap::Parser;
use directories::ProjectDirs;
use log::LevelFilter;
use std::path::PathBuf;

/// Fetch word frequencies from the Google Books Ngram dataset
///
/// Words are queried in small batches, one batch at a time, and results are
/// appended to a JSON Lines file as they come. Progress is saved after every
/// batch, so an interrupted run can be restarted and will pick up where it
/// left off.
#[derive(Parser, Debug)]
#[command(version, author)]
struct Args {
    /// JSON file with the run input
    ///
    /// The file should contain an object with a "words" list and optionally
    /// "yearStart", "yearEnd", "batchSize", "maxRetries", "baseDelayMs",
    /// "pacingDelayMs", "pacingJitterMs" and "resume" settings. When this is
    /// specified, --input and the individual input settings are ignored.
    #[arg(long)]
    input_file: Option<PathBuf>,

    /// Run input as an inline JSON object
    ///
    /// Same format as --input-file. When this is specified, the individual
    /// input settings are ignored.
    #[arg(long)]
    input: Option<String>,

    /// Comma-separated list of words to look up
    #[arg(short, long, value_delimiter = ',')]
    words: Vec<String>,

    /// More words to look up, after those of --words
    #[arg(value_name = "WORD")]
    word_args: Vec<String>,

    /// First year of the publication range [default: 2021]
    #[arg(long)]
    year_start: Option<i32>,

    /// Last year of the publication range [default: 2022]
    ///
    /// Reported frequencies are those of this year.
    #[arg(long)]
    year_end: Option<i32>,

    /// Number of words per API request, from 1 to 12 [default: 12]
    #[arg(short, long, allow_negative_numbers = true)]
    batch_size: Option<i64>,

    /// Number of attempts per batch before it is recorded as failed
    /// [default: 5]
    #[arg(long)]
    max_retries: Option<u32>,

    /// Backoff delay after a failed attempt, doubled on every failure
    /// [default: 2000]
    ///
    /// A random jitter of up to one second is added to each backoff.
    #[arg(long)]
    base_delay_ms: Option<u64>,

    /// Pause between two batches [default: 2000]
    ///
    /// The Ngram Viewer quickly starts rejecting requests that come in too
    /// fast, so this should not be reduced much.
    #[arg(long)]
    pacing_delay_ms: Option<u64>,

    /// Maximal random extra pause between two batches [default: 0]
    #[arg(long)]
    pacing_jitter_ms: Option<u64>,

    /// Start from the first word even if a previous run made progress
    ///
    /// Progress is still saved, so that this run can be resumed later.
    #[arg(long)]
    no_resume: bool,

    /// Forget about the progress of previous runs before starting
    #[arg(long)]
    reset_checkpoint: bool,

    /// Ngram Viewer corpus
    #[arg(long, default_value = query::DEFAULT_CORPUS)]
    corpus: Box<str>,

    /// Ngram Viewer smoothing window
    #[arg(long, default_value_t = query::DEFAULT_SMOOTHING)]
    smoothing: u32,

    /// Timeout of individual API requests, in seconds
    ///
    /// By default, requests can take as long as the network allows. Timed out
    /// requests are retried like any other failed request.
    #[arg(long)]
    request_timeout_secs: Option<u64>,

    /// JSON Lines file to which results are appended
    #[arg(short, long, default_value = "ngram-results.jsonl")]
    output: PathBuf,

    /// JSON file that is overwritten with the latest result of each batch
    #[arg(long, default_value = "latest-result.json")]
    latest: PathBuf,

    /// Do not maintain the latest result file
    #[arg(long)]
    no_latest: bool,

    /// JSON file where progress is saved
    ///
    /// Defaults to a file in the user's local data directory.
    #[arg(long)]
    state: Option<PathBuf>,

    /// Do not display progress bars
    #[arg(long)]
    no_progress: bool,
}
//
impl Args {
    /// Location of the progress checkpoint
    fn state_path(&self) -> Result<PathBuf> {
        if let Some(state) = &self.state {
            return Ok(state.clone());
        }
        let dirs = ProjectDirs::from("", "", env!("CARGO_PKG_NAME"))
            .context("determining the state file's location")?;
        Ok(dirs.data_local_dir().join("state.json"))
    }
}
//
#[tokio::main]
async fn main() -> Result<()> {
    // Set up logging
    if let Err(e) = setup_logging() {
        eprintln!("Could not connect to syslog, logs will be discarded: {e}");
    }

    // Decode CLI arguments and check the run configuration
    let args = Args::parse();
    let config = Config::new(&args).context("invalid run configuration")?;
    log::info!(
        "Starting run over {} words in {} batch(es) of up to {}",
        config.words.len(),
        config.num_batches(),
        config.batch_size
    );

    // Set up progress tracking
    let state_path = args.state_path()?;
    let checkpoint = Checkpoint::new(FileStore::open(state_path).await?);
    if args.reset_checkpoint {
        checkpoint.reset().await?;
    }
    log::debug!("Saving progress to {}", checkpoint.store().path().display());

    // Set up outputs
    let latest = (!args.no_latest).then(|| args.latest.clone());
    let mut sink = JsonLinesSink::open(&args.output, latest).await?;
    let report = if args.no_progress {
        ProgressReport::hidden()
    } else {
        ProgressReport::new()
    };

    // Fetch all batches
    let fetcher = Fetcher::new(config.corpus.clone(), config.request_timeout)?;
    let summary = pipeline::run(
        &config,
        &fetcher,
        &TokioSleeper,
        &mut sink,
        &checkpoint,
        &report,
    )
    .await?;

    // Report the outcome
    log::info!(
        "Run completed: {} successful and {} failed batch(es)",
        summary.successful_batches,
        summary.failed_batches
    );
    println!("{summary}");
    println!("Results:            {}", sink.path().display());
    Ok(())
}

/// Use anyhow for Result type erasure
pub use anyhow::Result;

/// Largest number of words that can be sent in one API request
pub const MAX_BATCH_SIZE: usize = 12;

/// Word or short phrase whose frequency is looked up
pub type Word = Box<str>;

/// Year of Gregorian Calendar
pub type Year = i32;

/// Set up logging
fn setup_logging() -> syslog::Result<()> {
    syslog::init(
        syslog::Facility::LOG_USER,
        if cfg!(feature = "log-trace") {
            LevelFilter::Trace
        } else if cfg!(debug_assertions) {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        },
        None,
    )
}
