//! Batch-by-batch driver of a whole run
//!
//! Words are split into batches that fit in one API request, and batches are
//! fetched strictly one after another, with a pause in between to stay clear
//! of upstream rate limiting. Each batch ends up in the output as either a
//! success or a failure record, and the checkpoint is only moved forward once
//! a successful batch has been committed to the output, so that an
//! interrupted run resumes by refetching the batch it was working on. Once the
//! last batch has been committed, the checkpoint is cleared.

use crate::{
    checkpoint::{Checkpoint, KeyValueStore},
    config::Config,
    fetch::{self, BatchFetcher},
    progress::{ProgressConfig, ProgressReport},
    retry::{self, Sleeper},
    sink::{FailureRecord, OutputRecord, RecordSink, SuccessRecord},
    Result, Word,
};
use std::{
    fmt,
    num::NonZeroUsize,
    ops::Range,
    time::{Duration, Instant},
};

/// Batch that a run has yet to fetch
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct PlannedBatch {
    /// 1-based position of the batch within the full partition of the words
    pub number: usize,

    /// Range of word indices covered by this batch
    pub words: Range<usize>,
}

/// Split `num_words` words into consecutive batches of at most `batch_size`
/// words, omitting the first `offset` words
///
/// Returns the number of batches that were entirely skipped, and the batches
/// that remain to be fetched, none of which is empty. If `offset` falls in the
/// middle of a batch, the rest of that batch is kept as a shorter batch.
pub fn plan_batches(
    num_words: usize,
    batch_size: NonZeroUsize,
    offset: usize,
) -> (usize, Vec<PlannedBatch>) {
    let batch_size = batch_size.get();
    let offset = offset.min(num_words);
    let skipped = if offset == num_words {
        num_words.div_ceil(batch_size)
    } else {
        offset / batch_size
    };
    let remaining = (skipped * batch_size..num_words)
        .step_by(batch_size)
        .enumerate()
        .map(|(idx, start)| PlannedBatch {
            number: skipped + idx + 1,
            words: start.max(offset)..(start + batch_size).min(num_words),
        })
        .collect();
    (skipped, remaining)
}

/// Outcome of a run
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RunSummary {
    /// Number of words in the run
    pub total_words: usize,

    /// Number of batches in the run, including skipped ones
    pub total_batches: usize,

    /// Number of batches that a previous run already committed
    pub skipped_batches: usize,

    /// Number of batches that were fetched successfully
    pub successful_batches: usize,

    /// Number of batches that were given up on
    pub failed_batches: usize,

    /// Wall-clock duration of the run
    pub elapsed: Duration,
}
//
impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Words:              {}", self.total_words)?;
        writeln!(f, "Batches:            {}", self.total_batches)?;
        if self.skipped_batches > 0 {
            writeln!(f, "Resumed past:       {}", self.skipped_batches)?;
        }
        writeln!(f, "Successful batches: {}", self.successful_batches)?;
        writeln!(f, "Failed batches:     {}", self.failed_batches)?;
        write!(f, "Elapsed time:       {:.1?}", self.elapsed)
    }
}

/// Fetch frequencies for all configured words
///
/// Batch failures are recorded in the output and do not interrupt the run,
/// but failing to write the output or the checkpoint does, since the run could
/// not be resumed correctly otherwise.
pub async fn run(
    config: &Config,
    fetcher: &impl BatchFetcher,
    sleeper: &impl Sleeper,
    sink: &mut impl RecordSink,
    checkpoint: &Checkpoint<impl KeyValueStore>,
    report: &ProgressReport,
) -> Result<RunSummary> {
    let started = Instant::now();
    let total_words = config.words.len();
    let fingerprint = config.fingerprint();

    // Figure out where to start
    let mut offset = if config.resume {
        checkpoint.load(&fingerprint).await?
    } else {
        0
    };
    if offset > total_words {
        log::warn!(
            "Checkpoint is at word {offset}, but there are only {total_words} words, \
             was the word list changed since the last run?"
        );
        offset = total_words;
    }
    let (skipped_batches, batches) = plan_batches(total_words, config.batch_size, offset);
    if offset > 0 {
        log::info!("Resuming at word {offset}, skipping {skipped_batches} committed batch(es)");
    }
    let mut summary = RunSummary {
        total_words,
        total_batches: config.num_batches(),
        skipped_batches,
        ..RunSummary::default()
    };

    // Process remaining batches
    let tracker = report.add("Fetching frequencies", ProgressConfig::words(total_words));
    tracker.skip(offset as u64);
    let mut committed = offset;
    for (idx, batch) in batches.iter().enumerate() {
        let words = &config.words[batch.words.clone()];
        tracker.set_message(format!("(batch {}/{})", batch.number, summary.total_batches));
        log::info!(
            "Fetching batch {}/{} ({} words)",
            batch.number,
            summary.total_batches,
            words.len()
        );
        match config
            .retry
            .fetch_batch(fetcher, sleeper, words, config.years)
            .await
        {
            Ok(result) => {
                let record = SuccessRecord {
                    result,
                    processed_index: batch.words.end,
                    total_words,
                };
                sink.append(&OutputRecord::Success(record.clone())).await?;
                if let Err(e) = sink.mirror_latest(&record.result).await {
                    log::warn!("Failed to update the latest result mirror: {e:#}");
                }
                checkpoint.save(batch.words.end, &fingerprint).await?;
                committed = batch.words.end;
                summary.successful_batches += 1;
            }
            Err(exhausted) => {
                log::error!("Giving up on batch {}: {exhausted}", batch.number);
                tracker.println(format!(
                    "Batch {} [{}] failed: {}",
                    batch.number,
                    words.join(", "),
                    exhausted.last_error
                ));
                let record = failure_record(batch.number, words, &exhausted.last_error);
                sink.append(&OutputRecord::Failure(record)).await?;
                summary.failed_batches += 1;
            }
        }
        tracker.make_progress(words.len() as u64);

        // Pace requests
        if idx + 1 < batches.len() {
            let delay = config
                .pacing_delay
                .saturating_add(retry::random_below(config.pacing_jitter));
            log::debug!("Waiting {delay:?} before the next batch");
            sleeper.sleep(delay).await;
        }
    }
    tracker.finish();

    // Trailing failed batches are left for a resumed run to retry
    if committed == total_words {
        log::info!("All words were committed, clearing checkpoint");
        checkpoint.reset().await?;
    }

    summary.elapsed = started.elapsed();
    Ok(summary)
}

/// Output record of a batch that could not be fetched
fn failure_record(number: usize, words: &[Word], error: &impl fmt::Display) -> FailureRecord {
    FailureRecord {
        error: true,
        batch_number: number,
        failed_words: words.into(),
        error_message: error.to_string().into(),
        timestamp: fetch::now_iso8601(),
    }
}
