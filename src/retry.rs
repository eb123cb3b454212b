//! Bounded exponential backoff around batch fetches

use crate::{
    error::{BatchExhausted, FetchError},
    fetch::BatchFetcher,
    query::YearRange,
    response::BatchResult,
    Word,
};
use rand::Rng;
use std::{future::Future, time::Duration};

/// Default number of fetch attempts per batch
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Default backoff delay, before exponentiation
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(2000);

/// Default upper bound on the random jitter added to backoff delays
pub const DEFAULT_MAX_JITTER: Duration = Duration::from_millis(1000);

/// Mechanism for waiting, which tests can replace with a fake clock
pub trait Sleeper {
    /// Wait for a certain amount of time
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

/// Sleeper backed by the tokio timer
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioSleeper;
//
impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}

/// Retry policy for a single batch
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct RetryPolicy {
    /// Total number of attempts before a batch is given up on
    pub max_retries: u32,

    /// Backoff delay, doubled on every failed attempt
    pub base_delay: Duration,

    /// Exclusive upper bound of the uniform jitter added to each backoff
    pub max_jitter: Duration,
}
//
impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_jitter: DEFAULT_MAX_JITTER,
        }
    }
}
//
impl RetryPolicy {
    /// Backoff delay after the `attempt`-th failure, without jitter
    ///
    /// Saturates instead of overflowing for silly attempt counts.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Fetch a batch, retrying transient failures with exponential backoff
    pub async fn fetch_batch(
        &self,
        fetcher: &impl BatchFetcher,
        sleeper: &impl Sleeper,
        words: &[Word],
        years: YearRange,
    ) -> Result<BatchResult, BatchExhausted> {
        self.run(sleeper, words, || fetcher.fetch(words, years)).await
    }

    /// Run an operation until it succeeds or the attempt budget is used up
    pub async fn run<T, F, Fut>(
        &self,
        sleeper: &impl Sleeper,
        words: &[Word],
        mut operation: F,
    ) -> Result<T, BatchExhausted>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut attempt = 0;
        loop {
            let error = match operation().await {
                Ok(result) => return Ok(result),
                Err(error) => error,
            };
            attempt += 1;
            if attempt >= self.max_retries {
                return Err(BatchExhausted {
                    words: words.into(),
                    attempts: attempt,
                    last_error: error,
                });
            }
            let delay = self.backoff(attempt).saturating_add(self.jitter());
            log::warn!(
                "Attempt {attempt}/{} for [{}] failed ({error}), retrying in {delay:?}",
                self.max_retries,
                words.join(","),
            );
            sleeper.sleep(delay).await;
        }
    }

    /// Random extra delay, uniformly distributed in `[0, max_jitter)`
    fn jitter(&self) -> Duration {
        random_below(self.max_jitter)
    }
}

/// Uniformly distributed duration in `[0, bound)`, or zero if `bound` is zero
pub fn random_below(bound: Duration) -> Duration {
    let bound_ms = u64::try_from(bound.as_millis()).unwrap_or(u64::MAX);
    if bound_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..bound_ms))
}
