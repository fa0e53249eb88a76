//! Persistent keyed storage for the active answer key and saved results.
//!
//! Each key maps to one JSON document in the storage directory. Documents
//! that fail to parse are discarded and replaced by an empty default rather
//! than failing startup.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::model::AnswerKey;
use crate::report::GradedResult;

/// Storage key of the active answer key.
pub const ANSWER_KEY: &str = "answerKey";
/// Storage key of the saved results.
pub const SCAN_HISTORY: &str = "scanHistory";

/// A keyed storage area rooted in a directory.
#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    /// Open (and create if needed) a storage directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("failed to create data directory: {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }

    /// Read a document. Missing and unreadable documents are `Ok(None)`;
    /// unparseable ones are discarded and also `Ok(None)`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(
                    "ignoring unreadable stored value '{key}' ({}): {e}",
                    path.display()
                );
                return Ok(None);
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!(
                    "discarding corrupted stored value '{key}' ({}): {e}",
                    path.display()
                );
                self.remove(key)?;
                Ok(None)
            }
        }
    }

    /// Write a document atomically.
    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let path = self.path_for(key);
        let json = serde_json::to_vec_pretty(value)
            .with_context(|| format!("failed to serialize '{key}'"))?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.root)
            .with_context(|| format!("failed to create temp file in {}", self.root.display()))?;
        tmp.write_all(&json)?;
        tmp.persist(&path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    /// Delete a document; missing documents are fine.
    pub fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("failed to remove {}", path.display())),
        }
    }
}

/// Append-only history of graded results, cached in memory.
#[derive(Debug)]
pub struct ResultStore {
    storage: Storage,
    results: Vec<GradedResult>,
}

impl ResultStore {
    /// Load the history; a corrupted history starts empty.
    pub fn load(storage: Storage) -> Result<Self> {
        let results = storage
            .get::<Vec<GradedResult>>(SCAN_HISTORY)?
            .unwrap_or_default();
        tracing::debug!("loaded {} saved result(s)", results.len());
        Ok(Self { storage, results })
    }

    /// Append a result and persist the history. The in-memory history only
    /// changes once the write succeeded.
    pub fn append(&mut self, result: GradedResult) -> Result<()> {
        let mut results = self.results.clone();
        results.push(result);
        self.storage.set(SCAN_HISTORY, &results)?;
        self.results = results;
        Ok(())
    }

    /// All results in insertion order.
    pub fn list_all(&self) -> &[GradedResult] {
        &self.results
    }

    /// All results, newest first.
    pub fn list_recent(&self) -> Vec<&GradedResult> {
        let mut recent: Vec<&GradedResult> = self.results.iter().collect();
        recent.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        recent
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Remove every saved result.
    pub fn clear(&mut self) -> Result<()> {
        self.results.clear();
        self.storage.remove(SCAN_HISTORY)
    }
}

/// The persisted active answer key.
#[derive(Debug)]
pub struct KeyStore {
    storage: Storage,
    key: Option<AnswerKey>,
}

impl KeyStore {
    /// Load the active key; a corrupted key is discarded.
    pub fn load(storage: Storage) -> Result<Self> {
        let key = storage.get::<AnswerKey>(ANSWER_KEY)?;
        Ok(Self { storage, key })
    }

    pub fn get(&self) -> Option<&AnswerKey> {
        self.key.as_ref()
    }

    /// Replace the active key wholesale.
    pub fn save(&mut self, key: AnswerKey) -> Result<()> {
        self.storage.set(ANSWER_KEY, &key)?;
        self.key = Some(key);
        Ok(())
    }

    pub fn clear(&mut self) -> Result<()> {
        self.key = None;
        self.storage.remove(ANSWER_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grading::grade;
    use crate::model::{AnswerValue, Choice, RecognizedAnswers};
    use crate::report::ResultLabels;

    fn result(student: &str) -> GradedResult {
        let key = AnswerKey::from_sequence("AB").unwrap();
        let recognized: RecognizedAnswers = [(1, AnswerValue::Choice(Choice::A))]
            .into_iter()
            .collect();
        let summary = grade(&key, &recognized, 2);
        GradedResult::new(
            &summary,
            &key,
            &recognized,
            2,
            ResultLabels {
                student: Some(student.into()),
                ..Default::default()
            },
        )
    }

    #[test]
    fn history_persists_across_loads() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path()).unwrap();

        let mut store = ResultStore::load(storage.clone()).unwrap();
        assert!(store.is_empty());
        store.append(result("first")).unwrap();
        store.append(result("second")).unwrap();

        let reloaded = ResultStore::load(storage).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.list_all()[0].student.as_deref(), Some("first"));
        assert_eq!(reloaded.list_all(), store.list_all());
    }

    #[test]
    fn list_recent_is_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ResultStore::load(Storage::open(dir.path()).unwrap()).unwrap();
        let mut older = result("older");
        older.created_at -= chrono::Duration::hours(1);
        store.append(older).unwrap();
        store.append(result("newer")).unwrap();
        let recent = store.list_recent();
        assert_eq!(recent[0].student.as_deref(), Some("newer"));
        assert_eq!(recent[1].student.as_deref(), Some("older"));
    }

    #[test]
    fn clear_empties_history() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path()).unwrap();
        let mut store = ResultStore::load(storage.clone()).unwrap();
        store.append(result("x")).unwrap();
        store.clear().unwrap();
        assert!(store.is_empty());
        assert!(ResultStore::load(storage).unwrap().is_empty());
    }

    #[test]
    fn corrupted_history_resets_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("scanHistory.json"), "{not json").unwrap();
        let storage = Storage::open(dir.path()).unwrap();
        let store = ResultStore::load(storage).unwrap();
        assert!(store.is_empty());
        assert!(!dir.path().join("scanHistory.json").exists());
    }

    #[test]
    fn non_utf8_history_resets_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("scanHistory.json"), [0xFF, 0xFE, 0x00, 0x7B]).unwrap();
        let storage = Storage::open(dir.path()).unwrap();

        let mut store = ResultStore::load(storage.clone()).unwrap();
        assert!(store.is_empty());
        assert!(!dir.path().join("scanHistory.json").exists());

        store.append(result("after")).unwrap();
        assert_eq!(ResultStore::load(storage).unwrap().len(), 1);
    }

    #[test]
    fn unreadable_history_does_not_fail_load() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("scanHistory.json")).unwrap();
        let store = ResultStore::load(Storage::open(dir.path()).unwrap()).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn failed_append_leaves_history_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path()).unwrap();
        let mut store = ResultStore::load(storage.clone()).unwrap();
        store.append(result("kept")).unwrap();

        // A directory in place of the document makes the rename fail.
        let path = dir.path().join("scanHistory.json");
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();
        assert!(store.append(result("lost")).is_err());
        assert_eq!(store.len(), 1);

        std::fs::remove_dir(&path).unwrap();
        store.append(result("next")).unwrap();
        let reloaded = ResultStore::load(storage).unwrap();
        let students: Vec<_> = reloaded
            .list_all()
            .iter()
            .map(|r| r.student.as_deref().unwrap_or(""))
            .collect();
        assert_eq!(students, vec!["kept", "next"]);
    }

    #[test]
    fn key_store_roundtrip_and_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path()).unwrap();

        let mut keys = KeyStore::load(storage.clone()).unwrap();
        assert!(keys.get().is_none());
        keys.save(AnswerKey::from_sequence("ABC").unwrap()).unwrap();
        let reloaded = KeyStore::load(storage.clone()).unwrap();
        assert_eq!(reloaded.get().unwrap().get(3), Some(Choice::C));

        std::fs::write(dir.path().join("answerKey.json"), r#"{"1": "Q"}"#).unwrap();
        assert!(KeyStore::load(storage.clone()).unwrap().get().is_none());

        keys.clear().unwrap();
        assert!(KeyStore::load(storage).unwrap().get().is_none());
    }
}
