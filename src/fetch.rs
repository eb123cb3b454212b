//! Single round trip to the Google Books Ngram API

use crate::{
    error::FetchError,
    query::{self, CorpusParams, YearRange},
    response::{self, ApiEntry, BatchResult},
    Result, Word,
};
use anyhow::Context;
use chrono::{SecondsFormat, Utc};
use reqwest::{
    header::{self, HeaderMap, HeaderValue},
    StatusCode,
};
use std::{future::Future, time::Duration};

/// Something that can fetch the frequencies of one batch of words
///
/// Implementations must perform at most one request per call and must not
/// retry on their own, retries are handled by [`crate::retry`].
pub trait BatchFetcher {
    /// Fetch frequency data for `words` over `years`
    fn fetch(
        &self,
        words: &[Word],
        years: YearRange,
    ) -> impl Future<Output = Result<BatchResult, FetchError>> + Send;
}

/// HTTP client for the Ngram API
#[derive(Clone, Debug)]
pub struct Fetcher {
    /// Underlying HTTP client, with browser-like default headers
    client: reqwest::Client,

    /// Corpus and smoothing settings
    params: CorpusParams,
}
//
impl Fetcher {
    /// Set up the HTTP client
    pub fn new(params: CorpusParams, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder().default_headers(browser_headers());
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().context("setting up the HTTP client")?;
        Ok(Self { client, params })
    }
}
//
impl BatchFetcher for Fetcher {
    async fn fetch(&self, words: &[Word], years: YearRange) -> Result<BatchResult, FetchError> {
        let url = query::batch_url(words, years, &self.params);
        log::debug!("Requesting {url}");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(FetchError::Network)?;
        let status = response.status();
        let body = response.bytes().await.map_err(FetchError::Network)?;
        log::trace!("Received {} bytes with status {status}", body.len());
        interpret_response(status, &body, words, years)
    }
}

/// Turn a raw HTTP response into a batch result
pub fn interpret_response(
    status: StatusCode,
    body: &[u8],
    words: &[Word],
    years: YearRange,
) -> Result<BatchResult, FetchError> {
    if !status.is_success() {
        return Err(FetchError::Status(status));
    }
    let entries: Vec<ApiEntry> = serde_json::from_slice(body).map_err(FetchError::Parse)?;
    Ok(BatchResult {
        year: years.end.to_string().into(),
        word_freq: response::normalize(entries, words),
        timestamp: now_iso8601(),
        batch_size: words.len(),
    })
}

/// Current time, in the ISO-8601 format used by output records
pub fn now_iso8601() -> Box<str> {
    Utc::now()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .into()
}

/// Header set of a regular browser visiting the Ngram Viewer
fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in [
        (
            header::USER_AGENT,
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        ),
        (header::ACCEPT, "application/json, text/plain, */*"),
        (header::ACCEPT_LANGUAGE, "en-US,en;q=0.9"),
        (header::ORIGIN, "https://books.google.com"),
        (header::REFERER, query::NGRAM_VIEWER_URL),
    ] {
        headers.insert(name, HeaderValue::from_static(value));
    }
    headers
}
