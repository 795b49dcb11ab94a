//! Retrieve: pull commits a remote has that the local store doesn't
//! (spec §4.G.1), batched by cost and tolerant of the remote returning
//! commit ids in an order where a child precedes its parent.

use crate::capability::Exchange;
use dagstore_commit::KeyedChange;
use dagstore_concurrency::{BatchOutcome, Batcher};
use dagstore_core::{Change, Commit, Delta, Result, ValueRef};
use dagstore_history::History;
use dagstore_index::VersionedIndex;
use dagstore_zone::Zone;
use std::collections::HashSet;

/// Default number of commits a single retrieve round trip targets.
pub const DEFAULT_RETRIEVE_BATCH_SIZE: usize = 16;

/// Summary of a completed retrieve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrieveReport {
    /// How many commits were pulled and applied locally.
    pub applied: usize,
}

fn change_to_delta(kc: &KeyedChange, commit_id: &str) -> Delta {
    match &kc.change {
        Change::Insert(v) | Change::Update(v) => Delta::add(kc.key.clone(), ValueRef::new(v.value_id.clone(), commit_id.to_string())),
        Change::Remove { value_id } => Delta::remove(kc.key.clone(), value_id.clone()),
        Change::Preserve(r) => Delta::add(kc.key.clone(), r.clone()),
        Change::PreserveRemoval { value_id } => Delta::remove(kc.key.clone(), value_id.clone()),
    }
}

fn apply_commit(zone: &dyn Zone, history: &History, index: &VersionedIndex, commit: &Commit, changes: &[KeyedChange]) -> Result<()> {
    for kc in changes {
        if let Change::Insert(v) | Change::Update(v) = &kc.change {
            zone.store(&format!("values/{}", v.value_id), &commit.identifier, &v.payload)?;
        }
    }
    let deltas: Vec<Delta> = changes.iter().map(|kc| change_to_delta(kc, &commit.identifier)).collect();
    let base = commit.predecessors.as_ref().map(|p| p.first().to_string());
    index.add_commit(&commit.identifier, base.as_deref(), &deltas)?;
    history.add(commit.clone())?;
    Ok(())
}

/// Try to apply every commit in `ids` whose predecessors are already
/// satisfied (known to `history` or applied earlier in this retrieve).
/// Repeats until no further progress is made within the batch, since one
/// commit becoming ready can unblock another in the same window.
///
/// Returns whether every id in `ids` was applied.
fn try_apply_batch(
    ids: &[String],
    remote: &dyn Exchange,
    zone: &dyn Zone,
    history: &History,
    index: &VersionedIndex,
    applied: &mut HashSet<String>,
) -> Result<bool> {
    let todo: Vec<String> = ids.iter().filter(|id| !history.contains(id) && !applied.contains(*id)).cloned().collect();
    if todo.is_empty() {
        return Ok(true);
    }

    let mut pending = remote.retrieve_commits(&todo)?;
    loop {
        let mut made_progress = false;
        let mut still_pending = Vec::new();
        for commit in pending {
            let ready = commit.parent_ids().iter().all(|p| history.contains(p) || applied.contains(*p));
            if ready {
                let changes = remote.retrieve_changes(&commit.identifier)?;
                apply_commit(zone, history, index, &commit, &changes)?;
                applied.insert(commit.identifier.clone());
                made_progress = true;
            } else {
                still_pending.push(commit);
            }
        }
        pending = still_pending;
        if pending.is_empty() || !made_progress {
            break;
        }
    }
    Ok(pending.is_empty())
}

/// Pull every commit `remote` has that `history` doesn't, applying each
/// to `index` and `zone` as it becomes retrievable.
///
/// # Errors
///
/// Returns an error if the remote cannot be reached, a retrieved commit
/// fails to apply, or the batcher cannot grow far enough to resolve an
/// out-of-order parent (spec: [`dagstore_core::Error::CouldNotGrow`] —
/// this only happens if the remote's missing-id list is itself
/// inconsistent, since growing to the full remaining window always
/// succeeds otherwise).
pub fn retrieve(remote: &dyn Exchange, zone: &dyn Zone, history: &History, index: &VersionedIndex) -> Result<RetrieveReport> {
    remote.prepare_to_retrieve()?;
    let remote_ids = remote.retrieve_all_ids()?;
    let missing: Vec<String> = remote_ids.into_iter().filter(|id| !history.contains(id)).collect();

    if missing.is_empty() {
        return Ok(RetrieveReport { applied: 0 });
    }
    tracing::debug!(missing = missing.len(), "retrieve starting");

    let mut applied = HashSet::new();
    let total = missing.len();
    let batch_target = DEFAULT_RETRIEVE_BATCH_SIZE.min(total).max(1);
    let mut batcher = Batcher::new(total, move |_| 1.0 / batch_target as f64);

    batcher.run::<dagstore_core::Error>(|start, len| {
        let batch_ids = &missing[start..start + len];
        if try_apply_batch(batch_ids, remote, zone, history, index, &mut applied)? {
            Ok(BatchOutcome::Success)
        } else {
            Ok(BatchOutcome::GrowAndReExecute)
        }
    })
    .map_err(Into::into)?;

    Ok(RetrieveReport { applied: applied.len() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use dagstore_commit::CommitEngine;
    use dagstore_core::{Predecessors, Value};
    use dagstore_zone::InMemoryZone;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    /// An in-process "remote" backed by its own local store, for testing
    /// retrieve/send without real transport.
    struct LocalRemote {
        history: Arc<History>,
        index: Arc<VersionedIndex>,
        changes_by_commit: Mutex<HashMap<String, Vec<KeyedChange>>>,
    }

    impl Exchange for LocalRemote {
        fn retrieve_all_ids(&self) -> Result<Vec<String>> {
            Ok(self.history.topological_order())
        }

        fn retrieve_commits(&self, ids: &[String]) -> Result<Vec<Commit>> {
            ids.iter().map(|id| self.history.version(id)).collect()
        }

        fn retrieve_changes(&self, commit_id: &str) -> Result<Vec<KeyedChange>> {
            Ok(self.changes_by_commit.lock().unwrap().get(commit_id).cloned().unwrap_or_default())
        }

        fn send_commits(&self, _batch: &[(Commit, Vec<KeyedChange>)]) -> Result<()> {
            Ok(())
        }
    }

    fn build_remote() -> (Arc<LocalRemote>, CommitEngine) {
        let zone: Arc<dyn Zone> = Arc::new(InMemoryZone::new());
        let history = Arc::new(History::open(zone.clone()).unwrap());
        let index = Arc::new(VersionedIndex::new(zone.clone()));
        let commits = CommitEngine::new(zone, history.clone(), index.clone());
        let remote = Arc::new(LocalRemote { history, index, changes_by_commit: Mutex::new(HashMap::new()) });
        (remote, commits)
    }

    fn commit_and_record(remote: &LocalRemote, commits: &CommitEngine, predecessor: Option<&str>, kcs: Vec<KeyedChange>) -> Commit {
        let predecessors = predecessor.map(Predecessors::single);
        let commit = commits.commit(predecessors, kcs.clone(), None).unwrap();
        remote.changes_by_commit.lock().unwrap().insert(commit.identifier.clone(), kcs);
        commit
    }

    #[test]
    fn retrieve_pulls_every_remote_commit_into_an_empty_local_store() {
        let (remote, commits) = build_remote();
        let c0 = commit_and_record(&remote, &commits, None, vec![KeyedChange::insert("a", Value::new("va", b"1".to_vec()))]);
        let _c1 = commit_and_record(&remote, &commits, Some(&c0.identifier), vec![KeyedChange::insert("b", Value::new("vb", b"2".to_vec()))]);

        let local_zone: Arc<dyn Zone> = Arc::new(InMemoryZone::new());
        let local_history = History::open(local_zone.clone()).unwrap();
        let local_index = VersionedIndex::new(local_zone.clone());

        let report = retrieve(remote.as_ref(), local_zone.as_ref(), &local_history, &local_index).unwrap();
        assert_eq!(report.applied, 2);
        assert!(local_history.contains(&c0.identifier));
        assert_eq!(local_index.lookup("a", &_c1.identifier).unwrap().unwrap().value_id, "va");
    }

    #[test]
    fn retrieve_is_a_no_op_when_already_up_to_date() {
        let (remote, commits) = build_remote();
        commit_and_record(&remote, &commits, None, vec![]);

        let local_zone: Arc<dyn Zone> = Arc::new(InMemoryZone::new());
        let local_history = History::open(local_zone.clone()).unwrap();
        let local_index = VersionedIndex::new(local_zone.clone());
        retrieve(remote.as_ref(), local_zone.as_ref(), &local_history, &local_index).unwrap();

        let report = retrieve(remote.as_ref(), local_zone.as_ref(), &local_history, &local_index).unwrap();
        assert_eq!(report.applied, 0);
    }

    #[test]
    fn retrieve_handles_ids_reported_out_of_topological_order() {
        let (remote, commits) = build_remote();
        let c0 = commit_and_record(&remote, &commits, None, vec![]);
        let c1 = commit_and_record(&remote, &commits, Some(&c0.identifier), vec![]);
        let c2 = commit_and_record(&remote, &commits, Some(&c1.identifier), vec![]);

        struct ReversedRemote(Arc<LocalRemote>);
        impl Exchange for ReversedRemote {
            fn retrieve_all_ids(&self) -> Result<Vec<String>> {
                let mut ids = self.0.retrieve_all_ids()?;
                ids.reverse();
                Ok(ids)
            }
            fn retrieve_commits(&self, ids: &[String]) -> Result<Vec<Commit>> {
                self.0.retrieve_commits(ids)
            }
            fn retrieve_changes(&self, commit_id: &str) -> Result<Vec<KeyedChange>> {
                self.0.retrieve_changes(commit_id)
            }
            fn send_commits(&self, batch: &[(Commit, Vec<KeyedChange>)]) -> Result<()> {
                self.0.send_commits(batch)
            }
        }
        let reversed = ReversedRemote(remote);

        let local_zone: Arc<dyn Zone> = Arc::new(InMemoryZone::new());
        let local_history = History::open(local_zone.clone()).unwrap();
        let local_index = VersionedIndex::new(local_zone.clone());
        let report = retrieve(&reversed, local_zone.as_ref(), &local_history, &local_index).unwrap();
        assert_eq!(report.applied, 3);
        assert!(local_history.is_ancestor(&c0.identifier, &c2.identifier).unwrap());
    }
}
