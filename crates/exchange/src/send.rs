//! Send: push commits the local store has that a remote doesn't (spec
//! §4.G.2), batched by cost, growing the batch when the remote reports a
//! missing predecessor.

use crate::capability::Exchange;
use dagstore_commit::CommitEngine;
use dagstore_concurrency::{BatchOutcome, Batcher};
use dagstore_core::{Commit, Result};
use dagstore_history::History;
use std::collections::HashSet;

/// Default number of commits a single send round trip targets.
pub const DEFAULT_SEND_BATCH_SIZE: usize = 16;

/// Summary of a completed send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendReport {
    /// How many commits were pushed to the remote.
    pub sent: usize,
}

/// Push every commit `history` has that `remote` doesn't, gathering each
/// commit's authored changes via `commits` so the remote can apply them
/// without needing the local index state.
///
/// Local commits are pushed in topological order, so a grown batch always
/// widens to include a commit's own predecessor rather than some
/// unrelated later commit; a remote implementation is not expected to
/// out-of-order-apply a batch the way `retrieve` tolerates from a peer.
///
/// # Errors
///
/// Returns an error if a commit's changes cannot be reconstructed, the
/// remote rejects a batch for a reason other than a missing predecessor,
/// or the batcher exhausts the remaining window without the remote
/// accepting the batch.
pub fn send(remote: &dyn Exchange, commits: &CommitEngine, history: &History) -> Result<SendReport> {
    remote.prepare_to_send()?;
    let remote_ids: HashSet<String> = remote.retrieve_all_ids()?.into_iter().collect();
    // topological_order() yields heads first; reverse it so a batch's
    // predecessors are always walked before their descendants.
    let missing: Vec<String> = history.topological_order().into_iter().rev().filter(|id| !remote_ids.contains(id)).collect();

    if missing.is_empty() {
        return Ok(SendReport { sent: 0 });
    }

    let mut sent = HashSet::new();
    let total = missing.len();
    let batch_target = DEFAULT_SEND_BATCH_SIZE.min(total).max(1);
    let mut batcher = Batcher::new(total, move |_| 1.0 / batch_target as f64);

    batcher.run::<dagstore_core::Error>(|start, len| {
        let batch_ids = &missing[start..start + len];
        let pending: Vec<&String> = batch_ids.iter().filter(|id| !sent.contains(*id)).collect();
        if pending.is_empty() {
            return Ok(BatchOutcome::Success);
        }

        let all_predecessors_covered = pending.iter().all(|id| {
            let commit = history.version(id).expect("id came from this history's own topological order");
            commit.parent_ids().iter().all(|p| remote_ids.contains(*p) || sent.contains(*p) || pending.iter().any(|q| q.as_str() == *p))
        });
        if !all_predecessors_covered {
            return Ok(BatchOutcome::GrowAndReExecute);
        }

        let mut payload: Vec<(Commit, Vec<dagstore_commit::KeyedChange>)> = Vec::with_capacity(pending.len());
        for id in &pending {
            let commit = history.version(id)?;
            let changes = commits.changes_made_at(id)?;
            payload.push((commit, changes));
        }

        remote.send_commits(&payload)?;
        for id in pending {
            sent.insert(id.clone());
        }
        Ok(BatchOutcome::Success)
    })
    .map_err(Into::into)?;

    Ok(SendReport { sent: sent.len() })
}
