//! Merge dispatch (spec §4.F): fast-forward detection, three-way merge
//! via the index's diff, and two-way fallback when no common ancestor
//! exists.

use crate::arbiter::{Arbiter, Resolution};
use dagstore_core::{Branch, Error, Fork, Result, ValueRef};
use dagstore_history::History;
use dagstore_index::{classify, VersionedIndex};
use dagstore_commit::KeyedChange;
use std::collections::HashMap;
use std::sync::Arc;

/// The outcome of attempting to merge two heads.
pub enum MergeOutcome {
    /// `descendant` already has `ancestor` in its history; no new commit
    /// is needed, callers should simply adopt `descendant` as the
    /// result.
    FastForward {
        /// The head that already contains the other.
        descendant: String,
    },
    /// A genuine three-way (or two-way, if no common ancestor) merge was
    /// computed. The caller should author a new commit with predecessors
    /// `(first, second)` and these changes.
    Changes(Vec<KeyedChange>),
}

/// Coordinates history, the index, and an arbiter to merge two commits.
pub struct MergeEngine {
    history: Arc<History>,
    index: Arc<VersionedIndex>,
}

impl MergeEngine {
    /// Build a merge engine over shared history/index handles.
    pub fn new(history: Arc<History>, index: Arc<VersionedIndex>) -> Self {
        MergeEngine { history, index }
    }

    /// Merge `first` and `second`, consulting `arbiter` for any
    /// conflicting fork.
    ///
    /// # Errors
    ///
    /// Returns an error if either commit is unknown, the arbiter fails to
    /// resolve a conflict, or a common ancestor exists in the DAG but its
    /// index was already discarded by compaction — surfaced as
    /// [`dagstore_core::Error::NoCommonAncestor`] rather than the
    /// underlying `MissingIndexNode`, since the merge cannot proceed
    /// either way.
    pub fn merge(&self, first: &str, second: &str, arbiter: &dyn Arbiter) -> Result<MergeOutcome> {
        if self.history.is_ancestor(first, second)? {
            return Ok(MergeOutcome::FastForward { descendant: second.to_string() });
        }
        if self.history.is_ancestor(second, first)? {
            return Ok(MergeOutcome::FastForward { descendant: first.to_string() });
        }

        let ancestor = self.history.greatest_common_ancestor(first, second)?;

        let ancestor_map: HashMap<String, ValueRef> = match &ancestor {
            Some(id) => match self.index.enumerate(id) {
                Ok(entries) => entries.into_iter().collect(),
                Err(Error::MissingIndexNode { .. }) => return Err(Error::NoCommonAncestor),
                Err(e) => return Err(e),
            },
            None => HashMap::new(),
        };
        let first_map: HashMap<String, ValueRef> = self.index.enumerate(first)?.into_iter().collect();
        let second_map: HashMap<String, ValueRef> = self.index.enumerate(second)?.into_iter().collect();

        let mut keys: Vec<&String> = ancestor_map.keys().chain(first_map.keys()).chain(second_map.keys()).collect();
        keys.sort();
        keys.dedup();

        let mut changes = Vec::new();
        for key in keys {
            let ancestor_ref = ancestor_map.get(key);
            let first_ref = first_map.get(key);
            let second_ref = second_map.get(key);

            let Some(fork) = classify(ancestor_ref, first_ref, second_ref) else {
                continue;
            };

            if fork.is_conflicting() {
                let resolution = arbiter.resolve(key, fork, first_ref, second_ref)?;
                if let Some(change) = apply_resolution(resolution, second_ref, ancestor_ref) {
                    changes.push(KeyedChange { key: key.clone(), change });
                }
            } else if let Some(change) = apply_non_conflicting(fork, second_ref, ancestor_ref) {
                changes.push(KeyedChange { key: key.clone(), change });
            }
        }

        Ok(MergeOutcome::Changes(changes))
    }
}

fn apply_non_conflicting(
    fork: Fork,
    second_ref: Option<&ValueRef>,
    ancestor_ref: Option<&ValueRef>,
) -> Option<dagstore_core::Change> {
    use dagstore_core::Change;
    match fork {
        Fork::Inserted(Branch::Second) | Fork::Updated(Branch::Second) => {
            Some(Change::Preserve(second_ref.expect("second branch authored this change").clone()))
        }
        Fork::Inserted(Branch::First) | Fork::Updated(Branch::First) => None,
        Fork::Removed(Branch::Second) => Some(Change::PreserveRemoval {
            value_id: ancestor_ref.expect("ancestor has the value being removed").value_id.clone(),
        }),
        Fork::Removed(Branch::First) | Fork::TwiceRemoved => None,
        // Conflicting variants never reach this function.
        Fork::TwiceInserted | Fork::TwiceUpdated | Fork::RemovedAndUpdated { .. } => None,
    }
}

fn apply_resolution(
    resolution: Resolution,
    second_ref: Option<&ValueRef>,
    ancestor_ref: Option<&ValueRef>,
) -> Option<dagstore_core::Change> {
    use dagstore_core::Change;
    match resolution {
        Resolution::First => None,
        Resolution::Second => match second_ref {
            Some(r) => Some(Change::Preserve(r.clone())),
            None => {
                let value_id = ancestor_ref.map(|r| r.value_id.clone()).unwrap_or_default();
                Some(Change::PreserveRemoval { value_id })
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbiter::MostRecentBranchArbiter;
    use dagstore_commit::{CommitEngine, KeyedChange as KC};
    use dagstore_core::{Change, Predecessors, Value};
    use dagstore_zone::{InMemoryZone, Zone};

    fn setup() -> (Arc<History>, Arc<VersionedIndex>, CommitEngine) {
        let zone: Arc<dyn Zone> = Arc::new(InMemoryZone::new());
        let history = Arc::new(History::open(zone.clone()).unwrap());
        let index = Arc::new(VersionedIndex::new(zone.clone()));
        let commit_engine = CommitEngine::new(zone, history.clone(), index.clone());
        (history, index, commit_engine)
    }

    #[test]
    fn fast_forward_when_one_head_contains_the_other() {
        let (history, index, commits) = setup();
        let c0 = commits.commit(None, vec![KC::insert("a", Value::new("va", b"1".to_vec()))], None).unwrap();
        let c1 = commits
            .commit(Some(Predecessors::single(c0.identifier.clone())), vec![KC::insert("b", Value::new("vb", b"2".to_vec()))], None)
            .unwrap();

        let merge = MergeEngine::new(history, index);
        let arbiter = crate::arbiter::MostRecentChangeArbiter::new(Arc::new(History::open(Arc::new(InMemoryZone::new())).unwrap()));
        match merge.merge(&c0.identifier, &c1.identifier, &arbiter).unwrap() {
            MergeOutcome::FastForward { descendant } => assert_eq!(descendant, c1.identifier),
            MergeOutcome::Changes(_) => panic!("expected fast-forward"),
        }
    }

    #[test]
    fn non_conflicting_insert_on_second_branch_is_preserved() {
        let (history, index, commits) = setup();
        let c0 = commits.commit(None, vec![], None).unwrap();
        let a = commits
            .commit(Some(Predecessors::single(c0.identifier.clone())), vec![], None)
            .unwrap();
        let b = commits
            .commit(
                Some(Predecessors::single(c0.identifier.clone())),
                vec![KC::insert("k", Value::new("vb", b"x".to_vec()))],
                None,
            )
            .unwrap();

        let merge = MergeEngine::new(history.clone(), index);
        let arbiter = MostRecentBranchArbiter::new(history, &a.identifier, &b.identifier).unwrap();
        match merge.merge(&a.identifier, &b.identifier, &arbiter).unwrap() {
            MergeOutcome::Changes(changes) => {
                assert_eq!(changes.len(), 1);
                assert!(matches!(changes[0].change, Change::Preserve(_)));
            }
            MergeOutcome::FastForward { .. } => panic!("expected changes"),
        }
    }

    #[test]
    fn conflicting_update_resolved_by_arbiter_favoring_second() {
        let (history, index, commits) = setup();
        let c0 = commits.commit(None, vec![KC::insert("k", Value::new("v0", b"0".to_vec()))], None).unwrap();
        let a = commits
            .commit(
                Some(Predecessors::single(c0.identifier.clone())),
                vec![KC::update("k", Value::new("va", b"a".to_vec()))],
                None,
            )
            .unwrap();
        let b = commits
            .commit(
                Some(Predecessors::single(c0.identifier.clone())),
                vec![KC::update("k", Value::new("vb", b"b".to_vec()))],
                None,
            )
            .unwrap();

        let merge = MergeEngine::new(history.clone(), index);
        let arbiter = MostRecentBranchArbiter::new(history, &a.identifier, &b.identifier).unwrap();
        match merge.merge(&a.identifier, &b.identifier, &arbiter).unwrap() {
            MergeOutcome::Changes(changes) => {
                assert_eq!(changes.len(), 1);
                assert!(matches!(&changes[0].change, Change::Preserve(r) if r.value_id == "vb"));
            }
            MergeOutcome::FastForward { .. } => panic!("expected changes"),
        }
    }

    #[test]
    fn merge_fails_with_no_common_ancestor_when_gcas_index_is_gone() {
        let zone: Arc<dyn Zone> = Arc::new(InMemoryZone::new());
        let history = Arc::new(History::open(zone.clone()).unwrap());
        let index = Arc::new(VersionedIndex::new(zone.clone()));
        let commits = CommitEngine::new(zone.clone(), history.clone(), index.clone());

        let c0 = commits.commit(None, vec![KC::insert("k", Value::new("v0", b"0".to_vec()))], None).unwrap();
        let a = commits
            .commit(Some(Predecessors::single(c0.identifier.clone())), vec![KC::update("k", Value::new("va", b"a".to_vec()))], None)
            .unwrap();
        let b = commits
            .commit(Some(Predecessors::single(c0.identifier.clone())), vec![KC::update("k", Value::new("vb", b"b".to_vec()))], None)
            .unwrap();

        zone.remove("maps/__ROOT__", &c0.identifier).unwrap();

        let merge = MergeEngine::new(history.clone(), index);
        let arbiter = MostRecentBranchArbiter::new(history, &a.identifier, &b.identifier).unwrap();
        let err = merge.merge(&a.identifier, &b.identifier, &arbiter).unwrap_err();
        assert!(matches!(err, Error::NoCommonAncestor));
    }

    #[test]
    fn conflicting_update_reusing_the_same_value_id_on_both_branches_is_still_detected() {
        // Updates commonly reuse the ancestor's value_id (spec §3); only
        // stored_commit_id moves to the new commit. The conflict must
        // still be detected and handed to the arbiter, not silently
        // dropped because both sides carry the same value_id.
        let (history, index, commits) = setup();
        let c0 = commits.commit(None, vec![KC::insert("ABCDEF", Value::new("ABCDEF", b"Bob".to_vec()))], None).unwrap();
        let a = commits
            .commit(Some(Predecessors::single(c0.identifier.clone())), vec![KC::update("ABCDEF", Value::new("ABCDEF", b"Tom".to_vec()))], None)
            .unwrap();
        let b = commits
            .commit(Some(Predecessors::single(c0.identifier.clone())), vec![KC::update("ABCDEF", Value::new("ABCDEF", b"Jerry".to_vec()))], None)
            .unwrap();

        let merge = MergeEngine::new(history.clone(), index);
        let arbiter = MostRecentBranchArbiter::new(history, &a.identifier, &b.identifier).unwrap();
        match merge.merge(&a.identifier, &b.identifier, &arbiter).unwrap() {
            MergeOutcome::Changes(changes) => {
                assert_eq!(changes.len(), 1);
                assert!(matches!(&changes[0].change, Change::Preserve(r) if r.stored_commit_id == b.identifier));
            }
            MergeOutcome::FastForward { .. } => panic!("expected changes"),
        }
    }

    #[test]
    fn two_way_fallback_with_no_common_ancestor() {
        let (history, index, commits) = setup();
        let a = commits.commit(None, vec![KC::insert("k", Value::new("va", b"a".to_vec()))], None).unwrap();
        let b = commits.commit(None, vec![KC::insert("k", Value::new("vb", b"b".to_vec()))], None).unwrap();

        let merge = MergeEngine::new(history.clone(), index);
        let arbiter = MostRecentBranchArbiter::new(history, &a.identifier, &b.identifier).unwrap();
        match merge.merge(&a.identifier, &b.identifier, &arbiter).unwrap() {
            MergeOutcome::Changes(changes) => {
                assert_eq!(changes.len(), 1);
                assert!(matches!(&changes[0].change, Change::Preserve(r) if r.value_id == "vb"));
            }
            MergeOutcome::FastForward { .. } => panic!("expected changes"),
        }
    }
}
