//! Conflict arbitration: the pluggable capability a merge calls on for
//! every key where both branches independently changed the same value
//! (spec §4.F, the "conflicting" `Fork` kinds).

use dagstore_core::{Fork, Result, ValueRef};
use dagstore_history::History;
use std::sync::Arc;

/// Which side an arbiter picked to win a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Keep the first parent's value (the base being edited in place
    /// already has it; no change is authored).
    First,
    /// Adopt the second parent's value.
    Second,
}

/// Decides the winner of a conflicting fork.
///
/// Implementations only ever choose a side; they never synthesize new
/// content — that keeps arbitration deterministic and replayable.
pub trait Arbiter: Send + Sync {
    /// Resolve the conflict at `key`. `fork` is guaranteed to be one of
    /// [`Fork::TwiceInserted`], [`Fork::TwiceUpdated`], or
    /// [`Fork::RemovedAndUpdated`] (spec §4.D.4's "conflicting kinds").
    /// `first_ref`/`second_ref` are each branch's current ref for `key`,
    /// absent exactly when that branch removed it.
    ///
    /// # Errors
    ///
    /// Returns an error if the arbiter cannot decide (e.g. a lookup it
    /// depends on fails); a caller receiving an error must treat the
    /// merge as unresolved rather than guess.
    fn resolve(
        &self,
        key: &str,
        fork: Fork,
        first_ref: Option<&ValueRef>,
        second_ref: Option<&ValueRef>,
    ) -> Result<Resolution>;
}

/// Always prefers whichever of the two branch heads is more recent
/// (by commit timestamp), applying that verdict to every conflict in the
/// merge uniformly.
pub struct MostRecentBranchArbiter {
    history: Arc<History>,
    winner: Resolution,
}

impl MostRecentBranchArbiter {
    /// Build an arbiter that always favors whichever of `first_head`/
    /// `second_head` has the later commit timestamp.
    ///
    /// `first_head` and `second_head` are two diverging heads, neither an
    /// ancestor of the other, so `History::prevailing_from`'s anchored
    /// ancestor walk doesn't apply here — there's no commit yet whose
    /// ancestry contains both to walk. This compares their timestamps
    /// directly instead, the same tie-break convention
    /// `History::most_recent_head` uses.
    ///
    /// # Errors
    ///
    /// Returns an error if either head is unknown to `history`.
    pub fn new(history: Arc<History>, first_head: &str, second_head: &str) -> Result<Self> {
        let first_commit = history.version(first_head)?;
        let second_commit = history.version(second_head)?;
        let winner = if second_commit.timestamp > first_commit.timestamp
            || (second_commit.timestamp == first_commit.timestamp && second_head > first_head)
        {
            Resolution::Second
        } else {
            Resolution::First
        };
        Ok(MostRecentBranchArbiter { history, winner })
    }
}

impl Arbiter for MostRecentBranchArbiter {
    fn resolve(&self, _key: &str, _fork: Fork, _first_ref: Option<&ValueRef>, _second_ref: Option<&ValueRef>) -> Result<Resolution> {
        let _ = &self.history; // kept for parity with MostRecentChangeArbiter's shape
        Ok(self.winner)
    }
}

/// Per-conflict: prefers whichever side's ref was stored under the more
/// recent commit, rather than applying one branch-wide verdict.
pub struct MostRecentChangeArbiter {
    history: Arc<History>,
}

impl MostRecentChangeArbiter {
    /// Build an arbiter that looks up each ref's storing commit's
    /// timestamp at resolution time.
    pub fn new(history: Arc<History>) -> Self {
        MostRecentChangeArbiter { history }
    }
}

impl Arbiter for MostRecentChangeArbiter {
    fn resolve(&self, _key: &str, _fork: Fork, first_ref: Option<&ValueRef>, second_ref: Option<&ValueRef>) -> Result<Resolution> {
        match (first_ref, second_ref) {
            (Some(first), Some(second)) => {
                // The two storing commits sit on diverging branches, so
                // there's no anchor to run prevailing_from's ancestor walk
                // from; compare their timestamps directly instead.
                let first_ts = self.history.version(&first.stored_commit_id)?.timestamp;
                let second_ts = self.history.version(&second.stored_commit_id)?.timestamp;
                if second_ts > first_ts || (second_ts == first_ts && second.stored_commit_id > first.stored_commit_id) {
                    Ok(Resolution::Second)
                } else {
                    Ok(Resolution::First)
                }
            }
            (Some(_), None) => Ok(Resolution::First),
            (None, Some(_)) => Ok(Resolution::Second),
            (None, None) => Ok(Resolution::First),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dagstore_core::{Branch, Commit, Predecessors};
    use dagstore_zone::InMemoryZone;

    fn history_with(commits: &[(&str, Option<&str>, f64)]) -> Arc<History> {
        let history = Arc::new(History::open(Arc::new(InMemoryZone::new())).unwrap());
        for (id, parent, ts) in commits {
            let commit = match parent {
                None => Commit::root(*id, *ts),
                Some(p) => Commit::with_predecessors(*id, Predecessors::single(*p), *ts),
            };
            history.add(commit).unwrap();
        }
        history
    }

    #[test]
    fn most_recent_branch_always_favors_the_later_head() {
        let h = history_with(&[("c0", None, 0.0), ("a", Some("c0"), 1.0), ("b", Some("c0"), 5.0)]);
        let arbiter = MostRecentBranchArbiter::new(h, "a", "b").unwrap();
        let r = arbiter.resolve("k", Fork::TwiceUpdated, None, None).unwrap();
        assert_eq!(r, Resolution::Second);
    }

    #[test]
    fn most_recent_change_compares_each_refs_storing_commit() {
        let h = history_with(&[("c0", None, 0.0), ("a", Some("c0"), 5.0), ("b", Some("c0"), 1.0)]);
        let arbiter = MostRecentChangeArbiter::new(h);
        let first = ValueRef::new("v1", "a");
        let second = ValueRef::new("v2", "b");
        let r = arbiter.resolve("k", Fork::TwiceUpdated, Some(&first), Some(&second)).unwrap();
        assert_eq!(r, Resolution::First);
    }

    #[test]
    fn most_recent_change_prefers_whichever_side_is_present() {
        let h = history_with(&[("c0", None, 0.0)]);
        let arbiter = MostRecentChangeArbiter::new(h);
        let second = ValueRef::new("v2", "c0");
        let r = arbiter
            .resolve("k", Fork::RemovedAndUpdated { removed_on: Branch::First }, None, Some(&second))
            .unwrap();
        assert_eq!(r, Resolution::Second);
    }
}
