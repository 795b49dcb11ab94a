//! `dagstore`: a local-first, decentralized, versioned key-value store.
//!
//! Clients write changes as immutable commits; each commit has zero or
//! more predecessors and a set of insert/update/remove changes. The
//! store keeps the full commit DAG, can materialize the value set at
//! any commit, diff or three-way merge divergent commits, exchange
//! commits with remote peers, and compact old history into a baseline
//! snapshot.
//!
//! ```
//! use dagstore::Store;
//! use dagstore_commit::KeyedChange;
//! use dagstore_core::Value;
//!
//! let store = Store::open_in_memory();
//! let commit = store
//!     .commit(None, vec![KeyedChange::insert("greeting", Value::new("v0", b"hello".to_vec()))], None)
//!     .unwrap();
//! assert_eq!(
//!     store.lookup("greeting", &commit.identifier).unwrap().unwrap().value_id,
//!     "v0",
//! );
//! ```

use dagstore_commit::{CommitEngine, KeyedChange};
use dagstore_compaction::{CompactionEngine, CompactionReport};
use dagstore_core::{Commit, Delta, Fork, MetadataValue, Predecessors, Result, ValueRef};
use dagstore_exchange::{retrieve, send, Exchange, RetrieveReport, SendReport};
use dagstore_history::History;
use dagstore_index::VersionedIndex;
use dagstore_merge::{Arbiter, MergeEngine, MergeOutcome};
use dagstore_zone::{FsZone, InMemoryZone, Zone};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// The store: a single handle combining the zone, history, index, commit
/// engine, merge engine, and compaction engine over one backing [`Zone`].
pub struct Store {
    zone: Arc<dyn Zone>,
    history: Arc<History>,
    index: Arc<VersionedIndex>,
    commits: CommitEngine,
    merges: MergeEngine,
    compaction: CompactionEngine,
}

impl Store {
    fn open_over(zone: Arc<dyn Zone>) -> Result<Self> {
        let history = Arc::new(History::open(zone.clone())?);
        let index = Arc::new(VersionedIndex::new(zone.clone()));
        let commits = CommitEngine::new(zone.clone(), history.clone(), index.clone());
        let merges = MergeEngine::new(history.clone(), index.clone());
        let compaction = CompactionEngine::new(zone.clone(), history.clone(), index.clone());
        compaction.resume_if_needed()?;
        Ok(Store { zone, history, index, commits, merges, compaction })
    }

    /// Open a store backed by an in-memory zone. Nothing persists past
    /// process exit; useful for tests and ephemeral replicas.
    #[must_use]
    pub fn open_in_memory() -> Self {
        Self::open_over(Arc::new(InMemoryZone::new())).expect("in-memory zone never fails to open")
    }

    /// Open (or create) a store rooted at `path` on the filesystem,
    /// resuming any compaction cleanup left `pending` by a prior crash.
    ///
    /// # Errors
    ///
    /// Returns an error if the root directory cannot be created, an
    /// existing commit record fails to decode, or pending cleanup fails.
    pub fn open_fs(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_over(Arc::new(FsZone::new(path.as_ref())?))
    }

    /// Create and persist a new commit (spec §4.E.1).
    ///
    /// # Errors
    ///
    /// Returns an error if a change key is empty, a named predecessor is
    /// unknown, or the underlying zone write fails.
    pub fn commit(
        &self,
        predecessors: Option<Predecessors>,
        changes: Vec<KeyedChange>,
        metadata: Option<HashMap<String, MetadataValue>>,
    ) -> Result<Commit> {
        self.commits.commit(predecessors, changes, metadata)
    }

    /// Reconstruct the changes `commit_id` made (spec §4.E.2).
    ///
    /// # Errors
    ///
    /// Returns an error if the commit or its index state is missing, or
    /// if `commit_id` has been compressed away by compaction.
    pub fn changes_made_at(&self, commit_id: &str) -> Result<Vec<KeyedChange>> {
        self.compaction.check_accessible(commit_id)?;
        self.commits.changes_made_at(commit_id)
    }

    /// Look up the value ref visible under `key` at `commit_id`.
    ///
    /// # Errors
    ///
    /// Returns [`dagstore_core::Error::AccessToCompressedVersion`] if
    /// `commit_id` was compressed away, or any index-read error.
    pub fn lookup(&self, key: &str, commit_id: &str) -> Result<Option<ValueRef>> {
        self.compaction.check_accessible(commit_id)?;
        self.index.lookup(key, commit_id)
    }

    /// Every `(key, value_ref)` visible at `commit_id`.
    ///
    /// # Errors
    ///
    /// Returns [`dagstore_core::Error::AccessToCompressedVersion`] if
    /// `commit_id` was compressed away, or any index-read error.
    pub fn enumerate(&self, commit_id: &str) -> Result<Vec<(String, ValueRef)>> {
        self.compaction.check_accessible(commit_id)?;
        self.index.enumerate(commit_id)
    }

    /// Every commit id the store currently has no unresolved child for.
    #[must_use]
    pub fn heads(&self) -> Vec<String> {
        self.history.heads()
    }

    /// The most recently created head, ties broken by commit id.
    ///
    /// # Errors
    ///
    /// Returns an error if history cannot be read.
    pub fn most_recent_head(&self) -> Result<Option<String>> {
        self.history.most_recent_head()
    }

    /// Merge two heads under `arbiter`, authoring the resulting commit
    /// if the merge isn't a fast-forward.
    ///
    /// # Errors
    ///
    /// Returns an error if either commit is unknown, the merge cannot
    /// find a usable common ancestor, or the arbiter fails.
    pub fn merge(&self, first: &str, second: &str, arbiter: &dyn Arbiter) -> Result<Commit> {
        match self.merges.merge(first, second, arbiter)? {
            MergeOutcome::FastForward { descendant } => self.history.version(&descendant),
            MergeOutcome::Changes(changes) => {
                let predecessors = Predecessors::merge(first, second)
                    .expect("merge() only reaches here when first != second, since is_ancestor(first,first) would have fast-forwarded");
                self.commits.commit(Some(predecessors), changes, None)
            }
        }
    }

    /// Pull every commit `remote` has that this store doesn't (spec
    /// §4.G.1).
    ///
    /// # Errors
    ///
    /// Returns an error if the remote cannot be reached or a retrieved
    /// commit fails to apply.
    pub fn retrieve(&self, remote: &dyn Exchange) -> Result<RetrieveReport> {
        retrieve(remote, self.zone.as_ref(), &self.history, &self.index)
    }

    /// Push every commit this store has that `remote` doesn't (spec
    /// §4.G.2).
    ///
    /// # Errors
    ///
    /// Returns an error if the remote rejects the batch or a commit's
    /// changes cannot be reconstructed.
    pub fn send(&self, remote: &dyn Exchange) -> Result<SendReport> {
        send(remote, &self.commits, &self.history)
    }

    /// Collapse history older than `before_date` into a baseline commit,
    /// keeping at least `min_retained_count` newer commits uncompressed
    /// (spec §4.H).
    ///
    /// # Errors
    ///
    /// Returns an error if history/index reads fail or the compaction
    /// record cannot be persisted.
    pub fn compact(&self, before_date: f64, min_retained_count: usize) -> Result<Option<CompactionReport>> {
        self.compaction.compact(before_date, min_retained_count)
    }

    /// The underlying zone, for callers that need direct payload access
    /// (e.g. bootstrap snapshot export/import via
    /// [`dagstore_zone::snapshot`]).
    #[must_use]
    pub fn zone(&self) -> &Arc<dyn Zone> {
        &self.zone
    }

    /// A shared handle to the store's history, for callers building a
    /// custom [`dagstore_merge::Arbiter`] that needs to consult it.
    #[must_use]
    pub fn history_handle(&self) -> Arc<History> {
        self.history.clone()
    }

    /// Classify every key that differs between `first` and `second`
    /// relative to `ancestor` (spec §4.D.4).
    ///
    /// # Errors
    ///
    /// Returns an error if any of the three commits' index state is
    /// missing.
    pub fn index_diff(&self, ancestor: &str, first: &str, second: &str) -> Result<HashMap<String, Fork>> {
        self.index.diff(Some(ancestor), first, second)
    }

    /// Apply deltas to the index under an already-allocated commit id,
    /// without going through [`Store::commit`]'s validation or payload
    /// writes. This is the "add existing commit" path spec §4.G.1
    /// describes retrieve using to apply a remote commit under its
    /// original id.
    ///
    /// # Errors
    ///
    /// Returns an error if `base_commit_id` is given but its index state
    /// is missing.
    pub fn index_add_commit(&self, commit_id: &str, base_commit_id: Option<&str>, deltas: &[Delta]) -> Result<()> {
        self.index.add_commit(commit_id, base_commit_id, deltas)
    }

    /// Register an already-built commit in history directly, the
    /// counterpart to [`Store::index_add_commit`] for the same
    /// add-existing-commit path.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit already exists or names a missing
    /// predecessor.
    pub fn history_add(&self, commit: Commit) -> Result<()> {
        self.history.add(commit)
    }
}

impl Exchange for Store {
    fn retrieve_all_ids(&self) -> Result<Vec<String>> {
        Ok(self.history.topological_order())
    }

    fn retrieve_commits(&self, ids: &[String]) -> Result<Vec<Commit>> {
        ids.iter().map(|id| self.history.version(id)).collect()
    }

    fn retrieve_changes(&self, commit_id: &str) -> Result<Vec<KeyedChange>> {
        self.commits.changes_made_at(commit_id)
    }

    fn send_commits(&self, batch: &[(Commit, Vec<KeyedChange>)]) -> Result<()> {
        for (commit, changes) in batch {
            for kc in changes {
                if let dagstore_core::Change::Insert(v) | dagstore_core::Change::Update(v) = &kc.change {
                    self.zone.store(&format!("values/{}", v.value_id), &commit.identifier, &v.payload)?;
                }
            }
            let deltas: Vec<dagstore_core::Delta> = changes
                .iter()
                .map(|kc| match &kc.change {
                    dagstore_core::Change::Insert(v) | dagstore_core::Change::Update(v) => {
                        dagstore_core::Delta::add(kc.key.clone(), ValueRef::new(v.value_id.clone(), commit.identifier.clone()))
                    }
                    dagstore_core::Change::Remove { value_id } => dagstore_core::Delta::remove(kc.key.clone(), value_id.clone()),
                    dagstore_core::Change::Preserve(r) => dagstore_core::Delta::add(kc.key.clone(), r.clone()),
                    dagstore_core::Change::PreserveRemoval { value_id } => dagstore_core::Delta::remove(kc.key.clone(), value_id.clone()),
                })
                .collect();
            let base = commit.predecessors.as_ref().map(|p| p.first().to_string());
            self.index.add_commit(&commit.identifier, base.as_deref(), &deltas)?;
            self.history.add(commit.clone())?;
        }
        Ok(())
    }

    fn restoration_state(&self) -> Result<Vec<String>> {
        let compressed = &self.compaction.info()?.compressed_commit_ids;
        Ok(self.history.topological_order().into_iter().filter(|id| !compressed.contains(id)).collect())
    }
}
