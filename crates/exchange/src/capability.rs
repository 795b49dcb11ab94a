//! The remote peer capability exchange is built against.

use dagstore_commit::KeyedChange;
use dagstore_core::{Commit, Result};

/// What a remote peer must expose for exchange to pull from or push to
/// it. A real implementation speaks some wire protocol underneath; tests
/// and same-process replication can implement this directly over a
/// second local store.
pub trait Exchange: Send + Sync {
    /// Prepare the remote side for a retrieval session (e.g. open a
    /// connection, authenticate). The default implementation is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if preparation fails.
    fn prepare_to_retrieve(&self) -> Result<()> {
        Ok(())
    }

    /// Prepare the remote side for a send session. The default
    /// implementation is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if preparation fails.
    fn prepare_to_send(&self) -> Result<()> {
        Ok(())
    }

    /// Every commit id the remote currently has.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote cannot be reached or enumerated.
    fn retrieve_all_ids(&self) -> Result<Vec<String>>;

    /// Fetch full commit records for `ids`, in the order requested.
    ///
    /// # Errors
    ///
    /// Returns an error if any id is unknown to the remote or the
    /// remote cannot be reached.
    fn retrieve_commits(&self, ids: &[String]) -> Result<Vec<Commit>>;

    /// Fetch the changes authored at `commit_id` (spec §4.E.2), so the
    /// local side can replay them into its own index without needing the
    /// remote's full index state.
    ///
    /// # Errors
    ///
    /// Returns an error if `commit_id` is unknown to the remote.
    fn retrieve_changes(&self, commit_id: &str) -> Result<Vec<KeyedChange>>;

    /// Push a batch of commits (with their authored changes) to the
    /// remote, in the order given.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote rejects the batch, including when
    /// a commit's predecessor isn't present remotely yet and the batch
    /// needs to grow to include it.
    fn send_commits(&self, batch: &[(Commit, Vec<KeyedChange>)]) -> Result<()>;

    /// The ids of commits the remote is able to restore from right now
    /// (e.g. after compaction, commits older than its baseline may no
    /// longer be individually retrievable). Used to decide whether a
    /// resync needs a snapshot bootstrap instead of incremental
    /// retrieval.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote cannot be reached.
    fn restoration_state(&self) -> Result<Vec<String>> {
        self.retrieve_all_ids()
    }
}
