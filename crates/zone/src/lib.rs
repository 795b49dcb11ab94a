//! The zone: a content-addressed blob store keyed by `(key, commit_id)`
//! (spec §4.A).
//!
//! A zone is the only capability that actually touches durable storage.
//! Everything above it — history, the index, the commit/merge engines —
//! reads and writes through this trait, so an in-memory zone can stand in
//! for tests while a filesystem zone backs a real store.

pub mod fs;
pub mod in_memory;
pub mod snapshot;

pub use fs::FsZone;
pub use in_memory::InMemoryZone;

use dagstore_core::Result;

/// Storage abstraction for everything dagstore persists: index nodes,
/// value payloads, and commit records all live in the same keyspace,
/// distinguished only by the `key` they're stored under.
///
/// Thread safety: implementations must be safe to call concurrently from
/// multiple threads.
pub trait Zone: Send + Sync {
    /// Store `data` under `(key, commit_id)`. Overwrites any existing
    /// entry at that exact pair (entries are otherwise immutable by
    /// convention — callers never store twice at the same pair except to
    /// repair a partial write).
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying backend fails to write.
    fn store(&self, key: &str, commit_id: &str, data: &[u8]) -> Result<()>;

    /// Fetch the bytes stored under `(key, commit_id)`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying backend fails to read (a
    /// missing entry is `Ok(None)`, not an error).
    fn get(&self, key: &str, commit_id: &str) -> Result<Option<Vec<u8>>>;

    /// List every commit id under which something has been stored for
    /// `key`. Order is unspecified; callers that need a particular order
    /// must sort.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying backend fails to enumerate.
    fn list_commit_ids_for_key(&self, key: &str) -> Result<Vec<String>>;

    /// Remove the entry at `(key, commit_id)`, if present. Used by
    /// compaction to reclaim compressed commits' payloads.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying backend fails to delete.
    fn remove(&self, key: &str, commit_id: &str) -> Result<()>;

    /// Store several `(key, commit_id, data)` triples. The default
    /// implementation just loops over [`Zone::store`]; backends that can
    /// batch writes more cheaply should override this.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered; earlier entries in the batch
    /// may already be durable.
    fn store_many(&self, entries: &[(&str, &str, &[u8])]) -> Result<()> {
        for (key, commit_id, data) in entries {
            self.store(key, commit_id, data)?;
        }
        Ok(())
    }

    /// Fetch several `(key, commit_id)` pairs. The default implementation
    /// just loops over [`Zone::get`].
    ///
    /// # Errors
    ///
    /// Returns the first error encountered.
    fn get_many(&self, pairs: &[(&str, &str)]) -> Result<Vec<Option<Vec<u8>>>> {
        pairs.iter().map(|(key, commit_id)| self.get(key, commit_id)).collect()
    }
}
