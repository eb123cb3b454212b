//! Append-only output of batch results

use crate::{response::BatchResult, Result, Word};
use anyhow::Context;
use serde::Serialize;
use std::{
    future::Future,
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, File, OpenOptions},
    io::AsyncWriteExt,
};

/// Record of the output dataset
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutputRecord {
    /// A batch was fetched successfully
    Success(SuccessRecord),

    /// A batch could not be fetched even after retries
    Failure(FailureRecord),
}

/// Record of a successfully fetched batch
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SuccessRecord {
    /// Normalized batch result
    #[serde(flatten)]
    pub result: BatchResult,

    /// Number of words committed once this record is stored
    #[serde(rename = "processedIndex")]
    pub processed_index: usize,

    /// Total number of words in the run
    #[serde(rename = "totalWords")]
    pub total_words: usize,
}

/// Record of a batch that could not be fetched
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FailureRecord {
    /// Always true, to tell failures apart from successes
    pub error: bool,

    /// 1-based position of the batch in the run
    pub batch_number: usize,

    /// Words of the batch
    pub failed_words: Box<[Word]>,

    /// Description of the last error
    pub error_message: Box<str>,

    /// ISO-8601 time at which the batch was given up on
    pub timestamp: Box<str>,
}

/// Append-only destination of output records
pub trait RecordSink {
    /// Durably append a record
    fn append(&mut self, record: &OutputRecord) -> impl Future<Output = Result<()>> + Send;

    /// Expose the latest successful result for human inspection
    ///
    /// This copy is not authoritative, so sinks may ignore it.
    fn mirror_latest(&mut self, _result: &BatchResult) -> impl Future<Output = Result<()>> + Send {
        std::future::ready(Ok(()))
    }
}

/// Output dataset stored as JSON Lines, with an optional mirror of the latest
/// result as a standalone pretty-printed JSON file
#[derive(Debug)]
pub struct JsonLinesSink {
    /// Dataset file, opened in append mode
    file: File,

    /// Location of the dataset file
    path: PathBuf,

    /// Location of the latest result mirror, if enabled
    latest_path: Option<PathBuf>,
}
//
impl JsonLinesSink {
    /// Open the dataset file for appending, creating it if needed
    pub async fn open(path: impl Into<PathBuf>, latest_path: Option<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("opening output file {}", path.display()))?;
        Ok(Self {
            file,
            path,
            latest_path,
        })
    }

    /// Location of the dataset file
    pub fn path(&self) -> &Path {
        &self.path
    }
}
//
impl RecordSink for JsonLinesSink {
    async fn append(&mut self, record: &OutputRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record).context("serializing output record")?;
        line.push(b'\n');
        let context = || format!("appending to output file {}", self.path.display());
        self.file.write_all(&line).await.with_context(context)?;
        self.file.sync_data().await.with_context(context)
    }

    async fn mirror_latest(&mut self, result: &BatchResult) -> Result<()> {
        let Some(latest_path) = &self.latest_path else {
            return Ok(());
        };
        let json = serde_json::to_vec_pretty(result).context("serializing latest result")?;
        fs::write(latest_path, json)
            .await
            .with_context(|| format!("writing latest result to {}", latest_path.display()))
    }
}

/// In-memory sink, for tests
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemorySink {
    /// Appended records
    pub records: Vec<OutputRecord>,

    /// Last mirrored result
    pub latest: Option<BatchResult>,
}
//
#[cfg(test)]
impl RecordSink for MemorySink {
    async fn append(&mut self, record: &OutputRecord) -> Result<()> {
        self.records.push(record.clone());
        Ok(())
    }

    async fn mirror_latest(&mut self, result: &BatchResult) -> Result<()> {
        self.latest = Some(result.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::FrequencyRecord;
    use serde_json::{json, Value};

    fn result() -> BatchResult {
        BatchResult {
            year: "2022".into(),
            word_freq: vec![FrequencyRecord {
                word: "owl".into(),
                freq: "0.0001000000".into(),
            }],
            timestamp: "2024-05-01T10:00:00.000Z".into(),
            batch_size: 1,
        }
    }

    #[test]
    fn success_record_shape() {
        let record = OutputRecord::Success(SuccessRecord {
            result: result(),
            processed_index: 13,
            total_words: 40,
        });
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({
                "year": "2022",
                "word_freq": [{"word": "owl", "freq": "0.0001000000"}],
                "timestamp": "2024-05-01T10:00:00.000Z",
                "batch_size": 1,
                "processedIndex": 13,
                "totalWords": 40,
            })
        );
    }

    #[test]
    fn failure_record_shape() {
        let record = OutputRecord::Failure(FailureRecord {
            error: true,
            batch_number: 3,
            failed_words: vec![Word::from("x"), Word::from("y")].into_boxed_slice(),
            error_message: "server replied with HTTP status 429 Too Many Requests".into(),
            timestamp: "2024-05-01T10:00:00.000Z".into(),
        });
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({
                "error": true,
                "batch_number": 3,
                "failed_words": ["x", "y"],
                "error_message": "server replied with HTTP status 429 Too Many Requests",
                "timestamp": "2024-05-01T10:00:00.000Z",
            })
        );
    }

    #[tokio::test]
    async fn json_lines_sink_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");
        let latest = dir.path().join("latest.json");
        for processed_index in [1, 2] {
            let mut sink = JsonLinesSink::open(&path, Some(latest.clone())).await.unwrap();
            let record = OutputRecord::Success(SuccessRecord {
                result: result(),
                processed_index,
                total_words: 2,
            });
            sink.append(&record).await.unwrap();
            sink.mirror_latest(&result()).await.unwrap();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines = contents
            .lines()
            .map(|line| serde_json::from_str::<Value>(line).unwrap())
            .collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["processedIndex"], 1);
        assert_eq!(lines[1]["processedIndex"], 2);

        let latest: BatchResult =
            serde_json::from_str(&std::fs::read_to_string(&latest).unwrap()).unwrap();
        assert_eq!(latest, result());
    }
}
