// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 The HBox Registry Contributors
//
// Crash-consistent JSON snapshot store.
//
// The whole document is held in memory behind an `RwLock`. A mutation runs
// against a clone; only after the clone has been written to a temp file in
// the same directory and renamed over the original does it replace the
// cached copy. A failed write therefore leaves memory and disk on the last
// saved state, and readers never see a half-written file.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use hbox_core::error::{Result, TrustError};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, instrument};

/// A top-level persisted document: `{ <entities>: [...], lastUpdate }`.
pub trait Document: Serialize + DeserializeOwned + Clone + Send + Sync {
    /// Document for a store that has never been written.
    fn empty(now: DateTime<Utc>) -> Self;

    /// Record the time of a successful save.
    fn stamp(&mut self, now: DateTime<Utc>);
}

/// What a mutation wants done with its modified copy.
pub enum Change<R> {
    /// Persist the copy, then return `R`.
    Commit(R),
    /// Discard the copy and return `R`; nothing is written.
    Keep(R),
}

/// One document on disk plus its in-memory cache.
pub struct SnapshotFile<D> {
    path: PathBuf,
    state: RwLock<D>,
}

impl<D: Document> SnapshotFile<D> {
    /// Load the document at `path`, or start empty if it does not exist.
    ///
    /// The parent directory is created if needed. An unreadable or corrupt
    /// file is an error rather than a silent reset, so a later save cannot
    /// overwrite data that merely failed to parse.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = parent_dir(&path) {
            fs::create_dir_all(parent).map_err(|e| persistence(&path, e))?;
        }

        let document = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).map_err(|e| persistence(&path, e))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("no snapshot yet, starting empty");
                D::empty(Utc::now())
            }
            Err(e) => return Err(persistence(&path, e)),
        };

        Ok(Self {
            path,
            state: RwLock::new(document),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run a read-only query against the cached document.
    pub fn read<R>(&self, query: impl FnOnce(&D) -> R) -> R {
        let state = self.state.read().expect("snapshot lock poisoned");
        query(&state)
    }

    /// Apply `mutation` and persist the result atomically.
    ///
    /// Mutations on one store are serialised. If `mutation` fails, or the
    /// write fails, the cached document is left exactly as it was.
    pub fn update<R>(&self, mutation: impl FnOnce(&mut D) -> Result<Change<R>>) -> Result<R> {
        let mut state = self.state.write().expect("snapshot lock poisoned");
        let mut next = state.clone();

        match mutation(&mut next)? {
            Change::Keep(out) => Ok(out),
            Change::Commit(out) => {
                next.stamp(Utc::now());
                write_atomic(&self.path, &next)?;
                *state = next;
                debug!(path = %self.path.display(), "snapshot saved");
                Ok(out)
            }
        }
    }
}

fn parent_dir(path: &Path) -> Option<&Path> {
    path.parent().filter(|p| !p.as_os_str().is_empty())
}

fn persistence(path: &Path, err: impl std::fmt::Display) -> TrustError {
    TrustError::PersistenceFailed(format!("{}: {err}", path.display()))
}

/// Write `document` next to `path` and rename it into place.
fn write_atomic<D: Serialize>(path: &Path, document: &D) -> Result<()> {
    let dir = parent_dir(path).unwrap_or_else(|| Path::new("."));

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| persistence(path, e))?;
    serde_json::to_writer_pretty(tmp.as_file_mut(), document)
        .map_err(|e| persistence(path, e))?;
    tmp.as_file_mut()
        .write_all(b"\n")
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| persistence(path, e))?;
    tmp.persist(path).map_err(|e| persistence(path, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Names {
        names: Vec<String>,
        last_update: DateTime<Utc>,
    }

    impl Document for Names {
        fn empty(now: DateTime<Utc>) -> Self {
            Self {
                names: Vec::new(),
                last_update: now,
            }
        }

        fn stamp(&mut self, now: DateTime<Utc>) {
            self.last_update = now;
        }
    }

    fn push(store: &SnapshotFile<Names>, name: &str) -> Result<usize> {
        store.update(|doc| {
            doc.names.push(name.to_owned());
            Ok(Change::Commit(doc.names.len()))
        })
    }

    #[test]
    fn missing_file_starts_empty_and_creates_parent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("names.json");
        let store = SnapshotFile::<Names>::open(&path).expect("open");
        assert!(store.read(|d| d.names.is_empty()));
        assert!(path.parent().expect("parent").is_dir());
        assert!(!path.exists());
    }

    #[test]
    fn commit_is_visible_after_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("names.json");
        let store = SnapshotFile::<Names>::open(&path).expect("open");
        assert_eq!(push(&store, "a").expect("push"), 1);
        assert_eq!(push(&store, "b").expect("push"), 2);

        let reopened = SnapshotFile::<Names>::open(&path).expect("reopen");
        assert_eq!(reopened.read(|d| d.names.clone()), vec!["a", "b"]);

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).expect("read")).expect("json");
        assert!(raw["lastUpdate"].is_string());
    }

    #[test]
    fn keep_writes_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("names.json");
        let store = SnapshotFile::<Names>::open(&path).expect("open");
        let out = store
            .update(|doc| {
                doc.names.push("ignored".into());
                Ok(Change::Keep(7))
            })
            .expect("update");
        assert_eq!(out, 7);
        assert!(store.read(|d| d.names.is_empty()));
        assert!(!path.exists());
    }

    #[test]
    fn failed_mutation_rolls_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SnapshotFile::<Names>::open(dir.path().join("names.json")).expect("open");
        push(&store, "a").expect("push");

        let result: Result<()> = store.update(|doc| {
            doc.names.clear();
            Err(TrustError::InvalidRequest("nope".into()))
        });
        assert!(result.is_err());
        assert_eq!(store.read(|d| d.names.clone()), vec!["a"]);
    }

    #[test]
    fn failed_write_rolls_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let data_dir = dir.path().join("data");
        let path = data_dir.join("names.json");
        let store = SnapshotFile::<Names>::open(&path).expect("open");
        push(&store, "a").expect("push");

        fs::remove_dir_all(&data_dir).expect("remove data dir");
        assert!(matches!(
            push(&store, "b"),
            Err(TrustError::PersistenceFailed(_))
        ));
        assert_eq!(store.read(|d| d.names.clone()), vec!["a"]);
    }

    #[test]
    fn concurrent_writers_are_serialised_and_readers_see_whole_documents() {
        use std::sync::Arc;

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("names.json");
        let store = Arc::new(SnapshotFile::<Names>::open(&path).expect("open"));
        push(&store, "seed").expect("seed");

        let writers: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..10 {
                        push(&store, &format!("w{t}-{i}")).expect("push");
                    }
                })
            })
            .collect();
        let reader = {
            let path = path.clone();
            std::thread::spawn(move || {
                for _ in 0..50 {
                    let text = fs::read_to_string(&path).expect("read snapshot");
                    let doc: Names = serde_json::from_str(&text).expect("whole document");
                    assert!(!doc.names.is_empty());
                }
            })
        };

        for handle in writers {
            handle.join().expect("writer");
        }
        reader.join().expect("reader");

        let reopened = SnapshotFile::<Names>::open(&path).expect("reopen");
        let names = reopened.read(|d| d.names.clone());
        assert_eq!(names.len(), 81);
        for t in 0..8 {
            for i in 0..10 {
                assert!(names.contains(&format!("w{t}-{i}")));
            }
        }
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("names.json");
        fs::write(&path, "{ not json").expect("write");
        assert!(matches!(
            SnapshotFile::<Names>::open(&path),
            Err(TrustError::PersistenceFailed(_))
        ));
    }
}
