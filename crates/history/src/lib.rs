//! History: the commit DAG's structural layer (spec §4.C).
//!
//! History owns nothing about values or the index — only the graph of
//! commits and their predecessor links. It maintains two invariant sets
//! as commits are added:
//! - `heads`: commits no other commit names as a predecessor
//! - `referenced`: commits named as a predecessor by at least one commit
//!
//! Every commit is in exactly one of those sets, never both.

use dagstore_concurrency::Guarded;
use dagstore_core::{Commit, Error, Result};
use dagstore_zone::Zone;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

const VERSIONS_KEY: &str = "versions";

struct HistoryState {
    commits: HashMap<String, Commit>,
    heads: HashSet<String>,
    referenced: HashSet<String>,
}

impl HistoryState {
    fn empty() -> Self {
        HistoryState {
            commits: HashMap::new(),
            heads: HashSet::new(),
            referenced: HashSet::new(),
        }
    }
}

/// The commit DAG, backed by a zone for durability.
pub struct History {
    zone: Arc<dyn Zone>,
    state: Guarded<HistoryState>,
}

impl History {
    /// Open history against `zone`, reloading every commit already
    /// stored there and rebuilding `heads`/`referenced` from scratch.
    ///
    /// # Errors
    ///
    /// Returns an error if the zone fails to enumerate or a stored
    /// commit fails to decode.
    pub fn open(zone: Arc<dyn Zone>) -> Result<Self> {
        let mut state = HistoryState::empty();
        let ids = zone.list_commit_ids_for_key(VERSIONS_KEY)?;
        for id in &ids {
            let bytes = zone
                .get(VERSIONS_KEY, id)?
                .ok_or_else(|| Error::Internal(format!("commit {id} listed but not readable")))?;
            let commit: Commit = serde_json::from_slice(&bytes)?;
            state.commits.insert(commit.identifier.clone(), commit);
        }
        for commit in state.commits.values() {
            for parent in commit.parent_ids() {
                state.referenced.insert(parent.to_string());
            }
        }
        for id in state.commits.keys() {
            if !state.referenced.contains(id) {
                state.heads.insert(id.clone());
            }
        }
        Ok(History {
            zone,
            state: Guarded::new(state),
        })
    }

    /// Add `commit` to history. The commit's predecessors (if any) must
    /// already be present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateCommit`] if the id is already known, or
    /// [`Error::MissingPredecessor`] if a named predecessor is absent.
    pub fn add(&self, commit: Commit) -> Result<()> {
        self.state.write(|state| -> Result<()> {
            if state.commits.contains_key(&commit.identifier) {
                return Err(Error::DuplicateCommit(commit.identifier.clone()));
            }
            for parent in commit.parent_ids() {
                if !state.commits.contains_key(parent) {
                    return Err(Error::MissingPredecessor(parent.to_string()));
                }
            }

            let bytes = serde_json::to_vec(&commit)?;
            self.zone.store(VERSIONS_KEY, &commit.identifier, &bytes)?;

            for parent in commit.parent_ids() {
                state.heads.remove(parent);
                state.referenced.insert(parent.to_string());
            }
            state.heads.insert(commit.identifier.clone());
            state.commits.insert(commit.identifier.clone(), commit);
            Ok(())
        })
    }

    /// Fetch a commit by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingVersion`] if no such commit is known.
    pub fn version(&self, id: &str) -> Result<Commit> {
        self.state
            .read(|state| state.commits.get(id).cloned())
            .ok_or_else(|| Error::MissingVersion(id.to_string()))
    }

    /// Whether `id` names a known commit.
    pub fn contains(&self, id: &str) -> bool {
        self.state.read(|state| state.commits.contains_key(id))
    }

    /// Every current head id (commits no other commit names as a
    /// predecessor), in no particular order.
    pub fn heads(&self) -> Vec<String> {
        self.state.read(|state| state.heads.iter().cloned().collect())
    }

    /// The head with the greatest `timestamp`, ties broken by the
    /// lexicographically greatest id for determinism. `None` if history
    /// is empty.
    pub fn most_recent_head(&self) -> Result<Option<String>> {
        Ok(self.state.read(|state| {
            state
                .heads
                .iter()
                .filter_map(|id| state.commits.get(id).map(|c| (id, c.timestamp)))
                .max_by(|(id_a, ts_a), (id_b, ts_b)| {
                    ts_a.partial_cmp(ts_b).unwrap_or(std::cmp::Ordering::Equal).then_with(|| id_a.cmp(id_b))
                })
                .map(|(id, _)| id.clone())
        }))
    }

    /// Whether `ancestor` is reachable from `descendant` by following
    /// predecessor links (a commit is considered its own ancestor).
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingVersion`] if `descendant` is unknown.
    pub fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool> {
        self.state.read(|state| -> Result<bool> {
            if !state.commits.contains_key(descendant) {
                return Err(Error::MissingVersion(descendant.to_string()));
            }
            if ancestor == descendant {
                return Ok(true);
            }
            let mut queue = VecDeque::from([descendant.to_string()]);
            let mut visited = HashSet::new();
            while let Some(id) = queue.pop_front() {
                if !visited.insert(id.clone()) {
                    continue;
                }
                if id == ancestor {
                    return Ok(true);
                }
                if let Some(commit) = state.commits.get(&id) {
                    for parent in commit.parent_ids() {
                        queue.push_back(parent.to_string());
                    }
                }
            }
            Ok(false)
        })
    }

    /// Among `candidates` (all must be known commits), the first one
    /// reached while walking the ancestors of `at` in topological
    /// (heads-first) order. Used by merge arbiters implementing a
    /// most-recent-on-this-line-of-history policy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingVersion`] if a candidate or `at` is
    /// unknown, or [`Error::InvalidInput`] if `candidates` is empty or
    /// none of them is an ancestor of `at`.
    pub fn prevailing_from(&self, candidates: &[String], at: &str) -> Result<String> {
        if candidates.is_empty() {
            return Err(Error::InvalidInput("prevailing_from requires at least one candidate".into()));
        }
        if !self.contains(at) {
            return Err(Error::MissingVersion(at.to_string()));
        }
        for id in candidates {
            if !self.contains(id) {
                return Err(Error::MissingVersion(id.clone()));
            }
        }
        let candidate_set: HashSet<&String> = candidates.iter().collect();
        for id in self.topological_order() {
            if self.is_ancestor(&id, at)? && candidate_set.contains(&id) {
                return Ok(id);
            }
        }
        Err(Error::InvalidInput(format!("none of the candidates is an ancestor of {at}")))
    }

    /// The greatest common ancestor of `a` and `b`: a BFS from `b`
    /// records generation distances from `b`; the walk is scanned in
    /// increasing distance-from-`b` order, and the first generation tier
    /// that contains an ancestor of `a` wins. Ties within that tier are
    /// broken by the smallest generation number from `a`'s side, then by
    /// the lexicographically smallest id, for determinism.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingVersion`] if either commit is unknown, or
    /// `Ok(None)` (not an error) if no common ancestor exists.
    pub fn greatest_common_ancestor(&self, a: &str, b: &str) -> Result<Option<String>> {
        self.state.read(|state| -> Result<Option<String>> {
            if !state.commits.contains_key(a) {
                return Err(Error::MissingVersion(a.to_string()));
            }
            if !state.commits.contains_key(b) {
                return Err(Error::MissingVersion(b.to_string()));
            }
            let dist_a = ancestor_distances(state, a);
            let tiers_b = ancestor_tiers(state, b);

            for tier in tiers_b {
                let mut best: Option<(String, usize)> = None;
                for id in tier {
                    if let Some(&da) = dist_a.get(&id) {
                        best = Some(match best {
                            None => (id, da),
                            Some((best_id, best_da)) => {
                                if da < best_da || (da == best_da && id < best_id) {
                                    (id, da)
                                } else {
                                    (best_id, best_da)
                                }
                            }
                        });
                    }
                }
                if let Some((id, _)) = best {
                    return Ok(Some(id));
                }
            }
            Ok(None)
        })
    }

    /// All known commits in topological order, heads first: a commit is
    /// emitted only once every commit that names it as a predecessor has
    /// already been emitted.
    pub fn topological_order(&self) -> Vec<String> {
        self.state.read(|state| {
            let mut remaining_successors: HashMap<&str, usize> = HashMap::new();
            let mut parents: HashMap<&str, Vec<&str>> = HashMap::new();

            for commit in state.commits.values() {
                remaining_successors.entry(&commit.identifier).or_insert(0);
                for parent in commit.parent_ids() {
                    *remaining_successors.entry(parent).or_insert(0) += 1;
                    parents.entry(&commit.identifier).or_default().push(parent);
                }
            }

            let mut ready_sorted: Vec<&str> = remaining_successors
                .iter()
                .filter(|(_, deg)| **deg == 0)
                .map(|(id, _)| *id)
                .collect();
            ready_sorted.sort_unstable();
            let mut queue: VecDeque<&str> = ready_sorted.into();

            let mut order = Vec::with_capacity(state.commits.len());
            while let Some(id) = queue.pop_front() {
                order.push(id.to_string());
                if let Some(ps) = parents.get(id) {
                    let mut newly_ready = Vec::new();
                    for &parent in ps {
                        let deg = remaining_successors.get_mut(parent).expect("parent has remaining_successors entry");
                        *deg -= 1;
                        if *deg == 0 {
                            newly_ready.push(parent);
                        }
                    }
                    newly_ready.sort_unstable();
                    for parent in newly_ready {
                        queue.push_back(parent);
                    }
                }
            }
            order
        })
    }
}

fn ancestor_distances(state: &HistoryState, start: &str) -> HashMap<String, usize> {
    let mut distances = HashMap::new();
    let mut queue = VecDeque::from([(start.to_string(), 0usize)]);
    while let Some((id, dist)) = queue.pop_front() {
        if distances.contains_key(&id) {
            continue;
        }
        distances.insert(id.clone(), dist);
        if let Some(commit) = state.commits.get(&id) {
            for parent in commit.parent_ids() {
                queue.push_back((parent.to_string(), dist + 1));
            }
        }
    }
    distances
}

/// Ancestors of `start`, grouped by BFS distance: `tiers[d]` holds every
/// ancestor first reached at distance `d`. Used by
/// [`History::greatest_common_ancestor`] to scan outward from `b` one
/// generation at a time.
fn ancestor_tiers(state: &HistoryState, start: &str) -> Vec<Vec<String>> {
    let mut tiers: Vec<Vec<String>> = Vec::new();
    let mut visited = HashSet::new();
    let mut queue = VecDeque::from([(start.to_string(), 0usize)]);
    while let Some((id, dist)) = queue.pop_front() {
        if !visited.insert(id.clone()) {
            continue;
        }
        if tiers.len() <= dist {
            tiers.resize_with(dist + 1, Vec::new);
        }
        tiers[dist].push(id.clone());
        if let Some(commit) = state.commits.get(&id) {
            for parent in commit.parent_ids() {
                queue.push_back((parent.to_string(), dist + 1));
            }
        }
    }
    tiers
}

#[cfg(test)]
mod tests {
    use super::*;
    use dagstore_core::Predecessors;
    use dagstore_zone::InMemoryZone;

    fn history() -> History {
        History::open(Arc::new(InMemoryZone::new())).unwrap()
    }

    fn commit(id: &str, parent: Option<&str>, ts: f64) -> Commit {
        match parent {
            None => Commit::root(id, ts),
            Some(p) => Commit::with_predecessors(id, Predecessors::single(p), ts),
        }
    }

    #[test]
    fn add_root_becomes_the_only_head() {
        let h = history();
        h.add(commit("c0", None, 0.0)).unwrap();
        assert_eq!(h.heads(), vec!["c0".to_string()]);
    }

    #[test]
    fn add_child_moves_head_forward() {
        let h = history();
        h.add(commit("c0", None, 0.0)).unwrap();
        h.add(commit("c1", Some("c0"), 1.0)).unwrap();
        assert_eq!(h.heads(), vec!["c1".to_string()]);
    }

    #[test]
    fn duplicate_commit_is_rejected() {
        let h = history();
        h.add(commit("c0", None, 0.0)).unwrap();
        let err = h.add(commit("c0", None, 0.0)).unwrap_err();
        assert!(matches!(err, Error::DuplicateCommit(_)));
    }

    #[test]
    fn missing_predecessor_is_rejected() {
        let h = history();
        let err = h.add(commit("c1", Some("missing"), 1.0)).unwrap_err();
        assert!(matches!(err, Error::MissingPredecessor(_)));
    }

    #[test]
    fn two_branches_are_both_heads() {
        let h = history();
        h.add(commit("c0", None, 0.0)).unwrap();
        h.add(commit("c1", Some("c0"), 1.0)).unwrap();
        h.add(commit("c2", Some("c0"), 2.0)).unwrap();
        let mut heads = h.heads();
        heads.sort();
        assert_eq!(heads, vec!["c1".to_string(), "c2".to_string()]);
    }

    #[test]
    fn is_ancestor_follows_the_chain() {
        let h = history();
        h.add(commit("c0", None, 0.0)).unwrap();
        h.add(commit("c1", Some("c0"), 1.0)).unwrap();
        h.add(commit("c2", Some("c1"), 2.0)).unwrap();
        assert!(h.is_ancestor("c0", "c2").unwrap());
        assert!(!h.is_ancestor("c2", "c0").unwrap());
        assert!(h.is_ancestor("c2", "c2").unwrap());
    }

    #[test]
    fn greatest_common_ancestor_of_a_fork() {
        let h = history();
        h.add(commit("c0", None, 0.0)).unwrap();
        h.add(commit("c1", Some("c0"), 1.0)).unwrap();
        h.add(commit("c2", Some("c0"), 2.0)).unwrap();
        assert_eq!(h.greatest_common_ancestor("c1", "c2").unwrap(), Some("c0".to_string()));
    }

    #[test]
    fn greatest_common_ancestor_prefers_the_ancestor_closest_to_b_over_the_lowest_total_distance() {
        // r0 -> c1 -> m1 -> m2         a = merge(m2, c2)
        // r0 -> c2 -> n1               b = merge(c1, n1)
        //
        // c1 is 3 away from a and 1 away from b (total 4); c2 is 1 away
        // from a and 2 away from b (total 3). A BFS scanning outward from
        // b reaches c1 (distance 1) before c2 (distance 2), so c1 wins
        // even though c2 has the smaller combined distance.
        let h = history();
        h.add(commit("r0", None, 0.0)).unwrap();
        h.add(commit("c1", Some("r0"), 1.0)).unwrap();
        h.add(commit("m1", Some("c1"), 2.0)).unwrap();
        h.add(commit("m2", Some("m1"), 3.0)).unwrap();
        h.add(commit("c2", Some("r0"), 1.0)).unwrap();
        h.add(commit("n1", Some("c2"), 2.0)).unwrap();
        h.add(Commit::with_predecessors("a", Predecessors::merge("m2", "c2").unwrap(), 4.0)).unwrap();
        h.add(Commit::with_predecessors("b", Predecessors::merge("c1", "n1").unwrap(), 4.0)).unwrap();

        assert_eq!(h.greatest_common_ancestor("a", "b").unwrap(), Some("c1".to_string()));
    }

    #[test]
    fn no_common_ancestor_across_disjoint_roots() {
        let h = history();
        h.add(commit("a0", None, 0.0)).unwrap();
        h.add(commit("b0", None, 0.0)).unwrap();
        assert_eq!(h.greatest_common_ancestor("a0", "b0").unwrap(), None);
    }

    #[test]
    fn topological_order_emits_heads_before_roots() {
        let h = history();
        h.add(commit("c0", None, 0.0)).unwrap();
        h.add(commit("c1", Some("c0"), 1.0)).unwrap();
        h.add(commit("c2", Some("c1"), 2.0)).unwrap();
        let order = h.topological_order();
        let pos = |id: &str| order.iter().position(|x| x == id).unwrap();
        assert!(pos("c2") < pos("c1"));
        assert!(pos("c1") < pos("c0"));
    }

    #[test]
    fn topological_order_waits_for_every_successor_at_a_fork() {
        // c0 forks into c1 and c2; c0 must not be emitted until both of
        // its successors have been, regardless of queue order.
        let h = history();
        h.add(commit("c0", None, 0.0)).unwrap();
        h.add(commit("c1", Some("c0"), 1.0)).unwrap();
        h.add(commit("c2", Some("c0"), 2.0)).unwrap();
        let order = h.topological_order();
        let pos = |id: &str| order.iter().position(|x| x == id).unwrap();
        assert!(pos("c1") < pos("c0"));
        assert!(pos("c2") < pos("c0"));
    }

    #[test]
    fn prevailing_from_walks_ancestors_of_the_anchor_in_topological_order() {
        let h = history();
        h.add(commit("c0", None, 0.0)).unwrap();
        // c1 is authored later than c2, but the anchor walk from c2 never
        // reaches c1, so c1 must not win even though its timestamp is
        // higher.
        h.add(commit("c1", Some("c0"), 5.0)).unwrap();
        h.add(commit("c2", Some("c0"), 1.0)).unwrap();
        let winner = h.prevailing_from(&["c1".to_string(), "c0".to_string()], "c2").unwrap();
        assert_eq!(winner, "c0");
    }

    #[test]
    fn prevailing_from_picks_the_first_candidate_reached_from_the_anchor() {
        let h = history();
        h.add(commit("c0", None, 0.0)).unwrap();
        h.add(commit("c1", Some("c0"), 1.0)).unwrap();
        h.add(commit("c2", Some("c1"), 2.0)).unwrap();
        let winner = h.prevailing_from(&["c0".to_string(), "c1".to_string()], "c2").unwrap();
        assert_eq!(winner, "c1");
    }

    #[test]
    fn most_recent_head_picks_highest_timestamp_head() {
        let h = history();
        h.add(commit("c0", None, 0.0)).unwrap();
        h.add(commit("c1", Some("c0"), 5.0)).unwrap();
        h.add(commit("c2", Some("c0"), 3.0)).unwrap();
        assert_eq!(h.most_recent_head().unwrap(), Some("c1".to_string()));
    }

    #[test]
    fn reopening_history_rebuilds_heads_and_referenced() {
        let zone: Arc<dyn Zone> = Arc::new(InMemoryZone::new());
        {
            let h = History::open(zone.clone()).unwrap();
            h.add(commit("c0", None, 0.0)).unwrap();
            h.add(commit("c1", Some("c0"), 1.0)).unwrap();
        }
        let reopened = History::open(zone).unwrap();
        assert_eq!(reopened.heads(), vec!["c1".to_string()]);
        assert!(reopened.is_ancestor("c0", "c1").unwrap());
    }
}
