//! A filesystem-backed zone using the crash-safe write-fsync-rename
//! pattern for every entry.
//!
//! Entries are sharded two levels deep, first by the storage key and then
//! by the commit id, so no directory ever holds more than a handful of
//! thousand files even for a store with millions of commits:
//!
//! ```text
//! <root>/<shard(key)>/<key>/<shard(commit_id)>/<commit_id>.json
//! ```
//!
//! where `shard(s)` is the 2-character prefix of `s`'s *last* `/`-
//! separated path segment (so `key = "values/ab12cd34"` shards on
//! `"ab"`, matching the value id rather than the literal string
//! `"values/ab12cd34"`). This single scheme covers the three categories
//! dagstore persists — commit records, value payloads, and index nodes —
//! by having callers pass category-qualified keys (`"versions"`,
//! `"values/<value_id>"`, `"maps/<logical_key>"`).

use crate::Zone;
use dagstore_core::{key_prefix, Error, Result};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Filesystem zone rooted at a directory, created if absent.
pub struct FsZone {
    root: PathBuf,
}

impl FsZone {
    /// Open (creating if necessary) a zone rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(FsZone { root })
    }

    /// The zone's root directory, for callers (like compaction) that need
    /// to place sibling files such as `compaction.json`.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn shard_of(s: &str) -> String {
        let last = s.rsplit('/').next().unwrap_or(s);
        key_prefix(last)
    }

    fn entry_path(&self, key: &str, commit_id: &str) -> PathBuf {
        self.root
            .join(Self::shard_of(key))
            .join(key)
            .join(Self::shard_of(commit_id))
            .join(format!("{commit_id}.json"))
    }

    fn entry_dir(&self, key: &str) -> PathBuf {
        self.root.join(Self::shard_of(key)).join(key)
    }
}

impl Zone for FsZone {
    fn store(&self, key: &str, commit_id: &str, data: &[u8]) -> Result<()> {
        let final_path = self.entry_path(key, commit_id);
        let parent = final_path.parent().expect("entry path always has a parent");
        fs::create_dir_all(parent)?;

        let temp_path = parent.join(format!(".{commit_id}.tmp"));
        {
            let mut file = File::create(&temp_path)?;
            file.write_all(data)?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &final_path)?;
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
        Ok(())
    }

    fn get(&self, key: &str, commit_id: &str) -> Result<Option<Vec<u8>>> {
        let path = self.entry_path(key, commit_id);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn list_commit_ids_for_key(&self, key: &str) -> Result<Vec<String>> {
        let dir = self.entry_dir(key);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for shard_entry in fs::read_dir(&dir)? {
            let shard_entry = shard_entry?;
            if !shard_entry.file_type()?.is_dir() {
                continue;
            }
            for file_entry in fs::read_dir(shard_entry.path())? {
                let file_entry = file_entry?;
                let file_name = file_entry.file_name();
                let name = file_name.to_string_lossy();
                if let Some(id) = name.strip_suffix(".json") {
                    ids.push(id.to_string());
                }
            }
        }
        Ok(ids)
    }

    fn remove(&self, key: &str, commit_id: &str) -> Result<()> {
        let path = self.entry_path(key, commit_id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }
}
