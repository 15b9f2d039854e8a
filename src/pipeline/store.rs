// Result store - persisted, order-preserving, first-wins dedup index
//
// Records are keyed by video id (or the id parsed from their url, or the raw url).
// Once a key is present its record is never replaced, not even by richer data.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info, warn};

use super::errors::{PipelineError, PipelineResult};
use super::identifier::dedup_key;
use super::models::VideoRecord;

/// Counts from one merge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Records appended to the store
    pub appended: usize,
    /// Records whose key was already present
    pub already_known: usize,
    /// Records with nothing to key on
    pub unkeyed: usize,
}

pub struct ResultStore {
    path: PathBuf,
    records: Vec<VideoRecord>,
    index: HashMap<String, usize>,
    /// Original url of each stored record, for inputs whose key only the adapter knows
    by_url: HashMap<String, usize>,
}

impl ResultStore {
    /// Empty store bound to `path`; nothing is read or written
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            records: Vec::new(),
            index: HashMap::new(),
            by_url: HashMap::new(),
        }
    }

    /// Load the store at `path`. A missing or unreadable file is an empty store.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let mut store = Self::empty(path);

        let content = match std::fs::read_to_string(&store.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %store.path.display(), "no result store yet, starting empty");
                return store;
            }
            Err(e) => {
                warn!(path = %store.path.display(), error = %e, "result store unreadable, starting empty");
                return store;
            }
        };

        let items = match serde_json::from_str::<Value>(&content) {
            Ok(Value::Array(items)) => items,
            Ok(_) => {
                warn!(path = %store.path.display(), "result store is not a JSON array, starting empty");
                return store;
            }
            Err(e) => {
                warn!(path = %store.path.display(), error = %e, "result store is corrupt, starting empty");
                return store;
            }
        };

        for (pos, item) in items.into_iter().enumerate() {
            match serde_json::from_value::<VideoRecord>(item) {
                Ok(record) => {
                    store.insert(record);
                }
                Err(e) => {
                    warn!(position = pos, error = %e, "skipping undecodable store entry");
                }
            }
        }

        info!(path = %store.path.display(), records = store.len(), "loaded result store");
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in insertion order
    pub fn records(&self) -> &[VideoRecord] {
        &self.records
    }

    /// Previously merged record for a dedup key
    pub fn lookup(&self, key: &str) -> Option<&VideoRecord> {
        self.index.get(key).map(|&i| &self.records[i])
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Stored record for an input url: by the key derived from the url, else by the
    /// url the record was fetched from.
    pub fn lookup_input(&self, url: &str) -> Option<&VideoRecord> {
        dedup_key(None, url)
            .and_then(|key| self.lookup(&key))
            .or_else(|| {
                self.by_url
                    .get(url.trim())
                    .map(|&i| &self.records[i])
            })
    }

    /// First-wins union with `batch`, in encounter order
    pub fn merge<I>(&mut self, batch: I) -> MergeOutcome
    where
        I: IntoIterator<Item = VideoRecord>,
    {
        let mut outcome = MergeOutcome::default();

        for record in batch {
            match self.insert(record) {
                Insert::Appended => outcome.appended += 1,
                Insert::Known => outcome.already_known += 1,
                Insert::Unkeyed => outcome.unkeyed += 1,
            }
        }

        info!(
            appended = outcome.appended,
            already_known = outcome.already_known,
            unkeyed = outcome.unkeyed,
            "merged results into store"
        );
        outcome
    }

    fn insert(&mut self, record: VideoRecord) -> Insert {
        let Some(key) = dedup_key(record.video_id.as_deref(), &record.url) else {
            warn!("record has neither video id nor url, not storing it");
            return Insert::Unkeyed;
        };

        if self.index.contains_key(&key) {
            debug!(key = %key, "key already stored, keeping first record");
            return Insert::Known;
        }

        let position = self.records.len();
        self.index.insert(key, position);
        let url = record.url.trim();
        if !url.is_empty() {
            self.by_url.entry(url.to_string()).or_insert(position);
        }
        self.records.push(record);
        Insert::Appended
    }

    /// Rewrite the whole store.
    ///
    /// Writes to a temp file beside the target and renames it over the old file, so
    /// a crash mid-write leaves the previous store intact. The temp file is removed
    /// on every failure path.
    pub fn persist(&self) -> PipelineResult<()> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let json = serde_json::to_vec_pretty(&self.records)
            .map_err(|e| PipelineError::persist(&self.path, e.into()))?;

        let mut tmp = tempfile::Builder::new()
            .prefix(".results-")
            .suffix(".tmp")
            .tempfile_in(&parent)
            .map_err(|e| PipelineError::persist(&self.path, e))?;

        tmp.write_all(&json)
            .and_then(|_| tmp.write_all(b"\n"))
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| PipelineError::persist(&self.path, e))?;

        tmp.persist(&self.path)
            .map_err(|e| PipelineError::persist(&self.path, e.error))?;

        info!(path = %self.path.display(), records = self.records.len(), "persisted result store");
        Ok(())
    }
}

enum Insert {
    Appended,
    Known,
    Unkeyed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::models::RecordStatus;

    fn record(url: &str, id: Option<&str>, title: &str) -> VideoRecord {
        VideoRecord {
            url: url.to_string(),
            video_id: id.map(String::from),
            title: Some(title.to_string()),
            duration: Some(60.0),
            subtitles: Some("text".to_string()),
            status: RecordStatus::Success,
            error: None,
            extra: serde_json::Map::new(),
        }
    }

    #[test]
    fn missing_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::load(dir.path().join("results.json"));
        assert!(store.is_empty());
    }

    #[test]
    fn corrupt_file_is_empty_store_and_persist_recovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        std::fs::write(&path, "{ this is not json").unwrap();

        let mut store = ResultStore::load(&path);
        assert!(store.is_empty());

        store.merge(vec![record("https://youtu.be/AAAAAAAAAAA", None, "A")]);
        store.persist().unwrap();

        let reloaded = ResultStore::load(&path);
        assert_eq!(reloaded.len(), 1);
        assert!(reloaded.contains("AAAAAAAAAAA"));
    }

    #[test]
    fn merge_is_first_wins() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ResultStore::empty(dir.path().join("r.json"));

        let first = store.merge(vec![record("https://youtu.be/AAAAAAAAAAA", Some("AAAAAAAAAAA"), "old")]);
        assert_eq!(first.appended, 1);

        let second = store.merge(vec![
            record("https://www.youtube.com/watch?v=AAAAAAAAAAA", Some("AAAAAAAAAAA"), "new and richer"),
            record("https://youtu.be/BBBBBBBBBBB", None, "B"),
        ]);
        assert_eq!(second.appended, 1);
        assert_eq!(second.already_known, 1);

        let kept = store.lookup("AAAAAAAAAAA").unwrap();
        assert_eq!(kept.title.as_deref(), Some("old"));
        assert_eq!(kept.url, "https://youtu.be/AAAAAAAAAAA");

        let order: Vec<_> = store.records().iter().map(|r| r.title.clone().unwrap()).collect();
        assert_eq!(order, vec!["old", "B"]);
    }

    #[test]
    fn input_lookup_finds_records_keyed_by_adapter_id() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ResultStore::empty(dir.path().join("r.json"));
        store.merge(vec![
            record("https://vimeo.com/123456", Some("123456"), "talk"),
            record("https://youtu.be/AAAAAAAAAAA", Some("AAAAAAAAAAA"), "A"),
        ]);

        assert!(store.lookup("https://vimeo.com/123456").is_none());
        let found = store.lookup_input(" https://vimeo.com/123456 ").unwrap();
        assert_eq!(found.title.as_deref(), Some("talk"));

        let by_id = store.lookup_input("https://www.youtube.com/watch?v=AAAAAAAAAAA").unwrap();
        assert_eq!(by_id.title.as_deref(), Some("A"));
        assert!(store.lookup_input("https://vimeo.com/999").is_none());
    }

    #[test]
    fn raw_url_is_the_key_of_last_resort() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ResultStore::empty(dir.path().join("r.json"));

        let outcome = store.merge(vec![
            record("https://example.com/talk", None, "first"),
            record("https://example.com/talk", None, "second"),
            record("", None, "nothing to key on"),
        ]);

        assert_eq!(outcome.appended, 1);
        assert_eq!(outcome.already_known, 1);
        assert_eq!(outcome.unkeyed, 1);
        assert!(store.contains("https://example.com/talk"));
    }

    #[test]
    fn persist_round_trips_unicode_and_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        let mut store = ResultStore::empty(&path);
        store.merge(vec![
            record("https://youtu.be/BBBBBBBBBBB", None, "Bài giảng số 2"),
            record("https://youtu.be/AAAAAAAAAAA", None, "Bài giảng số 1"),
        ]);
        store.persist().unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("Bài giảng số 2"));

        let reloaded = ResultStore::load(&path);
        let ids: Vec<_> = reloaded
            .records()
            .iter()
            .map(|r| crate::pipeline::identifier::extract_video_id(&r.url).unwrap())
            .collect();
        assert_eq!(ids, vec!["BBBBBBBBBBB", "AAAAAAAAAAA"]);

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn load_skips_bad_entries_and_duplicate_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        std::fs::write(
            &path,
            r#"[
                {"url": "https://youtu.be/AAAAAAAAAAA", "title": "keep"},
                {"url": 42},
                {"url": "https://www.youtube.com/watch?v=AAAAAAAAAAA", "title": "dup"},
                {"url": "https://youtu.be/BBBBBBBBBBB", "status": "error", "error": "boom"}
            ]"#,
        )
        .unwrap();

        let store = ResultStore::load(&path);
        assert_eq!(store.len(), 2);
        assert_eq!(store.lookup("AAAAAAAAAAA").unwrap().title.as_deref(), Some("keep"));
        assert_eq!(store.lookup("BBBBBBBBBBB").unwrap().status, RecordStatus::Error);
    }

    #[test]
    fn persist_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::empty(dir.path().join("missing-dir").join("results.json"));

        let err = store.persist().unwrap_err();
        assert!(err.is_persist());
    }
}
