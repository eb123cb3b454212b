//! Construction of Google Books Ngram API queries

use crate::{Word, Year};
use reqwest::Url;
use serde::{Deserialize, Serialize};

/// Web page of the Google Books Ngram Viewer
pub const NGRAM_VIEWER_URL: &str = "https://books.google.com/ngrams";

/// JSON endpoint of the Google Books Ngram Viewer
pub const NGRAM_API_URL: &str = "https://books.google.com/ngrams/json";

/// Default corpus: English, 2019 edition of the dataset
pub const DEFAULT_CORPUS: &str = "en-2019";

/// Default smoothing window, same as the Ngram Viewer web page
pub const DEFAULT_SMOOTHING: u32 = 3;

/// Inclusive range of publication years
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct YearRange {
    /// First year of the range
    pub start: Year,

    /// Last year of the range, no earlier than `start`
    pub end: Year,
}

/// Corpus-side query settings which are passed through as-is
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct CorpusParams {
    /// Corpus identifier, e.g. "en-2019"
    pub corpus: Box<str>,

    /// Smoothing window, in years
    pub smoothing: u32,
}
//
impl Default for CorpusParams {
    fn default() -> Self {
        Self {
            corpus: DEFAULT_CORPUS.into(),
            smoothing: DEFAULT_SMOOTHING,
        }
    }
}

/// Build the API URL for a batch of words
pub fn batch_url(words: &[Word], years: YearRange, params: &CorpusParams) -> Url {
    let content = words.join(",");
    let year_start = years.start.to_string();
    let year_end = years.end.to_string();
    let smoothing = params.smoothing.to_string();
    Url::parse_with_params(
        NGRAM_API_URL,
        [
            ("content", &*content),
            ("year_start", &*year_start),
            ("year_end", &*year_end),
            ("corpus", &*params.corpus),
            ("smoothing", &*smoothing),
            ("case_insensitive", "true"),
        ],
    )
    .expect("the API base URL is a valid URL")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(list: &[&str]) -> Vec<Word> {
        list.iter().map(|&w| w.into()).collect()
    }

    #[test]
    fn encodes_all_parameters() {
        let url = batch_url(
            &words(&["apple", "banana"]),
            YearRange {
                start: 2019,
                end: 2022,
            },
            &CorpusParams::default(),
        );
        assert_eq!(url.host_str(), Some("books.google.com"));
        assert_eq!(url.path(), "/ngrams/json");
        let pairs = url.query_pairs().into_owned().collect::<Vec<_>>();
        let expected = [
            ("content", "apple,banana"),
            ("year_start", "2019"),
            ("year_end", "2022"),
            ("corpus", "en-2019"),
            ("smoothing", "3"),
            ("case_insensitive", "true"),
        ];
        assert_eq!(pairs.len(), expected.len());
        for ((key, value), (expected_key, expected_value)) in pairs.iter().zip(expected) {
            assert_eq!(key, expected_key);
            assert_eq!(value, expected_value);
        }
    }

    #[test]
    fn escapes_multiword_ngrams() {
        let url = batch_url(
            &words(&["ice cream", "café"]),
            YearRange {
                start: 2021,
                end: 2021,
            },
            &CorpusParams {
                corpus: "fr-2019".into(),
                smoothing: 0,
            },
        );
        let content = url
            .query_pairs()
            .find(|(key, _)| key == "content")
            .map(|(_, value)| value.into_owned());
        assert_eq!(content.as_deref(), Some("ice cream,café"));
        assert!(!url.as_str().contains(' '));
    }
}
