//! Shaping of Google Books Ngram API responses into per-word frequencies

use crate::Word;
use serde::{Deserialize, Serialize};
use std::collections::{hash_map, HashMap};
use unicase::UniCase;

/// Frequency reported for words which the API did not return
pub const NOT_FOUND_FREQ: &str = "-1.0000000000";

/// Type tag of the entries that aggregate all casings of an ngram
const CASE_INSENSITIVE: &str = "CASE_INSENSITIVE";

/// Entry from the API's JSON response
///
/// The API also sends a few other fields (like `parent`), which we don't need.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ApiEntry {
    /// Ngram label, possibly followed by a corpus annotation like " (All)"
    pub ngram: String,

    /// Kind of entry, e.g. "NGRAM" or "CASE_INSENSITIVE"
    #[serde(rename = "type")]
    pub kind: String,

    /// Frequency of the ngram on each year of the requested range, as a
    /// fraction of all ngrams from that year
    pub timeseries: Vec<f64>,
}

/// Frequency of one word
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct FrequencyRecord {
    /// Word as it was queried
    pub word: Word,

    /// Percentage frequency with 10 decimals, or [`NOT_FOUND_FREQ`]
    pub freq: Box<str>,
}

/// Normalized result of a batch query
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct BatchResult {
    /// Year which the frequencies refer to
    pub year: Box<str>,

    /// One record per queried word, in query order
    pub word_freq: Vec<FrequencyRecord>,

    /// ISO-8601 time at which the result was obtained
    pub timestamp: Box<str>,

    /// Number of words in the batch
    pub batch_size: usize,
}

/// Turn API entries into one frequency record per batch word
///
/// The API may omit words, reorder them, or report them with a different
/// casing, so records are emitted in `batch` order by case-insensitive lookup.
pub fn normalize(entries: Vec<ApiEntry>, batch: &[Word]) -> Vec<FrequencyRecord> {
    let mut freqs = HashMap::<UniCase<String>, Box<str>>::new();
    for entry in entries {
        if entry.kind != CASE_INSENSITIVE {
            log::trace!("Ignoring case-sensitive entry {:?}", entry.ngram);
            continue;
        }
        let Some(&last) = entry.timeseries.last() else {
            log::debug!("Entry {:?} has no data points", entry.ngram);
            continue;
        };
        let word = strip_annotation(&entry.ngram);
        match freqs.entry(UniCase::new(word.to_owned())) {
            hash_map::Entry::Occupied(_) => {
                log::debug!("Ignoring duplicate entry {:?}", entry.ngram);
            }
            hash_map::Entry::Vacant(v) => {
                v.insert(format_freq(last));
            }
        }
    }

    batch
        .iter()
        .map(|word| {
            let freq = freqs.get(&UniCase::new(word.to_string()));
            if freq.is_none() {
                log::debug!("No frequency data for {word:?}");
            }
            FrequencyRecord {
                word: word.clone(),
                freq: freq.cloned().unwrap_or_else(|| NOT_FOUND_FREQ.into()),
            }
        })
        .collect()
}

/// Convert a fractional frequency into a percentage with 10 decimals
pub fn format_freq(fraction: f64) -> Box<str> {
    format!("{:.10}", fraction * 100.0).into()
}

/// Remove a trailing corpus annotation such as " (All)" from an ngram label
fn strip_annotation(label: &str) -> &str {
    let trimmed = label.trim_end();
    if trimmed.ends_with(')') {
        if let Some(open) = trimmed.rfind(" (") {
            return trimmed[..open].trim_end();
        }
    }
    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(ngram: &str, kind: &str, timeseries: &[f64]) -> ApiEntry {
        ApiEntry {
            ngram: ngram.into(),
            kind: kind.into(),
            timeseries: timeseries.to_vec(),
        }
    }

    fn words(list: &[&str]) -> Vec<Word> {
        list.iter().map(|&w| w.into()).collect()
    }

    fn freqs(records: &[FrequencyRecord]) -> Vec<(&str, &str)> {
        records
            .iter()
            .map(|r| (&*r.word, &*r.freq))
            .collect()
    }

    #[test]
    fn uses_last_value_as_percentage() {
        assert_eq!(&*format_freq(0.000_012_5), "0.0012500000");
        let records = normalize(
            vec![entry("cat (All)", CASE_INSENSITIVE, &[0.5, 0.000_012_5])],
            &words(&["cat"]),
        );
        assert_eq!(freqs(&records), [("cat", "0.0012500000")]);
    }

    #[test]
    fn follows_batch_order_and_fills_missing() {
        let records = normalize(
            vec![
                entry("c (All)", CASE_INSENSITIVE, &[0.02]),
                entry("a (All)", CASE_INSENSITIVE, &[0.01]),
            ],
            &words(&["a", "b", "c"]),
        );
        assert_eq!(
            freqs(&records),
            [
                ("a", "1.0000000000"),
                ("b", NOT_FOUND_FREQ),
                ("c", "2.0000000000"),
            ]
        );
    }

    #[test]
    fn skips_case_sensitive_variants() {
        let records = normalize(
            vec![
                entry("Paris", "NGRAM", &[0.9]),
                entry("paris", "NGRAM", &[0.1]),
                entry("Paris (All)", CASE_INSENSITIVE, &[0.25]),
            ],
            &words(&["paris"]),
        );
        assert_eq!(freqs(&records), [("paris", "25.0000000000")]);
    }

    #[test]
    fn keeps_first_duplicate() {
        let records = normalize(
            vec![
                entry("dog (All)", CASE_INSENSITIVE, &[0.03]),
                entry("Dog (All)", CASE_INSENSITIVE, &[0.07]),
            ],
            &words(&["dog"]),
        );
        assert_eq!(freqs(&records), [("dog", "3.0000000000")]);
    }

    #[test]
    fn empty_response_is_all_sentinels() {
        let records = normalize(Vec::new(), &words(&["x", "y"]));
        assert_eq!(freqs(&records), [("x", NOT_FOUND_FREQ), ("y", NOT_FOUND_FREQ)]);
    }

    #[test]
    fn empty_timeseries_counts_as_missing() {
        let records = normalize(
            vec![entry("ghost (All)", CASE_INSENSITIVE, &[])],
            &words(&["ghost"]),
        );
        assert_eq!(freqs(&records), [("ghost", NOT_FOUND_FREQ)]);
    }

    #[test]
    fn strips_annotations() {
        assert_eq!(strip_annotation("apple (All)"), "apple");
        assert_eq!(strip_annotation("ice cream (All)"), "ice cream");
        assert_eq!(strip_annotation("apple"), "apple");
        assert_eq!(strip_annotation("(All)"), "(All)");
    }

    #[test]
    fn decodes_api_json() {
        let json = r#"[
            {"ngram": "tea (All)", "parent": "", "type": "CASE_INSENSITIVE", "timeseries": [1e-5, 2e-5]},
            {"ngram": "tea", "parent": "tea (All)", "type": "NGRAM", "timeseries": [1e-5, 1.5e-5]}
        ]"#;
        let entries: Vec<ApiEntry> = serde_json::from_str(json).unwrap();
        let records = normalize(entries, &words(&["tea"]));
        assert_eq!(freqs(&records), [("tea", "0.0020000000")]);
    }
}
