//! Fork classification: how a single value's fate diverges across two
//! branches relative to a common ancestor.
//!
//! Produced by the index's three-way diff (see `dagstore-index`), consumed
//! by the merge engine to decide what an arbiter must resolve, and by the
//! commit engine's reverse-diff trick to recover "changes made at this
//! commit" for merge commits.

use serde::{Deserialize, Serialize};

/// Which of the two diffed branches a non-conflicting change belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Branch {
    /// The first commit passed to the diff (`v1`).
    First,
    /// The second commit passed to the diff (`v2`).
    Second,
}

impl Branch {
    /// The other branch.
    pub fn flip(self) -> Branch {
        match self {
            Branch::First => Branch::Second,
            Branch::Second => Branch::First,
        }
    }
}

/// Classification of a value's presence/change across three commits
/// (an optional common ancestor `v0`, and two descendants `v1`, `v2`).
///
/// See spec §4.D.4 for the full presence/equality truth table this is
/// derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Fork {
    /// Absent in the ancestor, present (and differing) in both branches.
    /// Conflicting: both branches independently inserted the value.
    TwiceInserted,
    /// Absent in the ancestor, present in exactly one branch.
    Inserted(Branch),
    /// Present in all three; one branch changed it, the other left it as
    /// the ancestor had it.
    Updated(Branch),
    /// Present in all three; both branches changed it, to different refs.
    /// Conflicting.
    TwiceUpdated,
    /// Present in the ancestor and one branch, absent in the other; the
    /// surviving branch's ref equals the ancestor's (a clean removal).
    Removed(Branch),
    /// Present in the ancestor and one branch, absent in the other; the
    /// surviving branch's ref differs from the ancestor's (removed on one
    /// side, updated on the other). Conflicting. `removed_on` names the
    /// branch that removed the value.
    RemovedAndUpdated {
        /// Which branch removed the value (the other branch updated it).
        removed_on: Branch,
    },
    /// Present in the ancestor, absent in both branches.
    TwiceRemoved,
}

impl Fork {
    /// Whether both branches independently changed the value in a way
    /// that requires arbitration (spec §4.D.4: "conflicting kinds").
    pub fn is_conflicting(&self) -> bool {
        matches!(
            self,
            Fork::TwiceInserted | Fork::TwiceUpdated | Fork::RemovedAndUpdated { .. }
        )
    }

    /// Flip `.first`/`.second` branch tags in place, used to derive
    /// `diff(b, a)` from `diff(a, b)` without recomputing (diff symmetry,
    /// spec §8 property 3).
    pub fn flip(self) -> Fork {
        match self {
            Fork::TwiceInserted => Fork::TwiceInserted,
            Fork::Inserted(b) => Fork::Inserted(b.flip()),
            Fork::Updated(b) => Fork::Updated(b.flip()),
            Fork::TwiceUpdated => Fork::TwiceUpdated,
            Fork::Removed(b) => Fork::Removed(b.flip()),
            Fork::RemovedAndUpdated { removed_on } => Fork::RemovedAndUpdated {
                removed_on: removed_on.flip(),
            },
            Fork::TwiceRemoved => Fork::TwiceRemoved,
        }
    }
}
