//! Durable record of run progress, used to resume interrupted runs

use crate::Result;
use anyhow::Context;
use std::{
    collections::BTreeMap,
    future::Future,
    path::{Path, PathBuf},
};
use tokio::fs;

/// Key under which the number of committed words is stored
pub const CHECKPOINT_KEY: &str = "lastProcessedIndex";

/// Key under which the fingerprint of the run that saved the checkpoint is
/// stored
pub const FINGERPRINT_KEY: &str = "runFingerprint";

/// Persistent string-keyed storage
pub trait KeyValueStore {
    /// Look up a value, if present
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>>> + Send;

    /// Insert or replace several values at once
    ///
    /// Either all values are updated or none is.
    fn set_all(&self, entries: Vec<(&str, String)>) -> impl Future<Output = Result<()>> + Send;

    /// Remove a value, if present
    fn remove(&self, key: &str) -> impl Future<Output = Result<()>> + Send;
}

/// Key-value store backed by a JSON object on disk
///
/// The whole file is rewritten on every update, through a temporary file that
/// is then renamed over the original so that a crash never leaves a truncated
/// store behind.
#[derive(Debug)]
pub struct FileStore {
    /// Location of the JSON file
    path: PathBuf,
}
//
impl FileStore {
    /// Open a store at a certain location, creating parent directories
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating state directory {}", parent.display()))?;
        }
        Ok(Self { path })
    }

    /// Location of the underlying file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the current contents of the store
    async fn load(&self) -> Result<BTreeMap<String, String>> {
        match fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("parsing state file {}", self.path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => {
                Err(e).with_context(|| format!("reading state file {}", self.path.display()))
            }
        }
    }

    /// Replace the contents of the store
    async fn store(&self, contents: &BTreeMap<String, String>) -> Result<()> {
        let json = serde_json::to_vec_pretty(contents).context("serializing state")?;
        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);
        fs::write(&tmp_path, &json)
            .await
            .with_context(|| format!("writing state file {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.path)
            .await
            .with_context(|| format!("replacing state file {}", self.path.display()))
    }
}
//
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.load().await?.remove(key))
    }

    async fn set_all(&self, entries: Vec<(&str, String)>) -> Result<()> {
        let mut contents = self.load().await?;
        for (key, value) in entries {
            contents.insert(key.to_owned(), value);
        }
        self.store(&contents).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut contents = self.load().await?;
        if contents.remove(key).is_some() {
            self.store(&contents).await?;
        }
        Ok(())
    }
}

/// Volatile key-value store, for tests
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryStore(std::sync::Mutex<BTreeMap<String, String>>);
//
#[cfg(test)]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }

    async fn set_all(&self, entries: Vec<(&str, String)>) -> Result<()> {
        let mut contents = self.lock();
        for (key, value) in entries {
            contents.insert(key.to_owned(), value);
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.lock().remove(key);
        Ok(())
    }
}
//
#[cfg(test)]
impl MemoryStore {
    /// Access the contents, ignoring poisoning since writes can't panic midway
    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Number of words that have been committed to the output, persisted in a
/// key-value store
///
/// The count is saved along with a fingerprint of the run that produced it,
/// and is only trusted by runs with the same fingerprint, since it would
/// refer to other words otherwise.
#[derive(Debug)]
pub struct Checkpoint<S> {
    /// Underlying storage
    store: S,
}
//
impl<S: KeyValueStore> Checkpoint<S> {
    /// Track progress in a certain store
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Number of words committed by previous runs with the same fingerprint,
    /// or 0 if none
    pub async fn load(&self, fingerprint: &str) -> Result<usize> {
        let Some(value) = self.store.get(CHECKPOINT_KEY).await? else {
            return Ok(0);
        };
        let index: usize = value
            .trim()
            .parse()
            .with_context(|| format!("decoding checkpoint value {value:?}"))?;
        let saved_by = self.store.get(FINGERPRINT_KEY).await?;
        if index > 0 && saved_by.as_deref() != Some(fingerprint) {
            log::warn!(
                "Ignoring checkpoint at word {index}, it was saved by a run over other words \
                 or settings"
            );
            return Ok(0);
        }
        Ok(index)
    }

    /// Record that the first `index` words of the run with a certain
    /// fingerprint have been committed
    pub async fn save(&self, index: usize, fingerprint: &str) -> Result<()> {
        log::debug!("Saving checkpoint at word {index}");
        self.store
            .set_all(vec![
                (CHECKPOINT_KEY, index.to_string()),
                (FINGERPRINT_KEY, fingerprint.to_owned()),
            ])
            .await
            .context("saving checkpoint")
    }

    /// Forget about previous progress
    pub async fn reset(&self) -> Result<()> {
        for key in [CHECKPOINT_KEY, FINGERPRINT_KEY] {
            self.store
                .remove(key)
                .await
                .context("resetting checkpoint")?;
        }
        Ok(())
    }

    /// Underlying storage
    pub fn store(&self) -> &S {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn defaults_to_zero() {
        let checkpoint = Checkpoint::new(MemoryStore::default());
        assert_eq!(checkpoint.load("run").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn saves_and_resets() {
        let checkpoint = Checkpoint::new(MemoryStore::default());
        checkpoint.save(24, "run").await.unwrap();
        assert_eq!(checkpoint.load("run").await.unwrap(), 24);
        checkpoint.reset().await.unwrap();
        assert_eq!(checkpoint.load("run").await.unwrap(), 0);
        assert_eq!(checkpoint.store().get(FINGERPRINT_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn ignores_progress_of_other_runs() {
        let checkpoint = Checkpoint::new(MemoryStore::default());
        checkpoint.save(24, "old words").await.unwrap();
        assert_eq!(checkpoint.load("new words").await.unwrap(), 0);
        assert_eq!(checkpoint.load("old words").await.unwrap(), 24);
    }

    #[tokio::test]
    async fn ignores_progress_without_fingerprint() {
        let store = MemoryStore::default();
        store
            .set_all(vec![(CHECKPOINT_KEY, "24".into())])
            .await
            .unwrap();
        assert_eq!(Checkpoint::new(store).load("run").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn rejects_garbage() {
        let store = MemoryStore::default();
        store
            .set_all(vec![(CHECKPOINT_KEY, "twelve".into())])
            .await
            .unwrap();
        assert!(Checkpoint::new(store).load("run").await.is_err());
    }

    #[tokio::test]
    async fn file_store_survives_reopening() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");
        {
            let store = FileStore::open(&path).await.unwrap();
            store
                .set_all(vec![("unrelated", "kept".into())])
                .await
                .unwrap();
            Checkpoint::new(store).save(36, "run").await.unwrap();
        }
        let store = FileStore::open(&path).await.unwrap();
        assert_eq!(store.get("unrelated").await.unwrap().as_deref(), Some("kept"));
        let checkpoint = Checkpoint::new(store);
        assert_eq!(checkpoint.load("run").await.unwrap(), 36);

        let raw = std::fs::read_to_string(&path).unwrap();
        let json: BTreeMap<String, String> = serde_json::from_str(&raw).unwrap();
        assert_eq!(json.get(CHECKPOINT_KEY).map(String::as_str), Some("36"));
        assert_eq!(json.get(FINGERPRINT_KEY).map(String::as_str), Some("run"));
        assert!(!dir.path().join("nested").join("state.json.tmp").exists());
    }

    #[tokio::test]
    async fn file_store_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("state.json")).await.unwrap();
        assert_eq!(store.get(CHECKPOINT_KEY).await.unwrap(), None);
        store.remove(CHECKPOINT_KEY).await.unwrap();
    }
}
