//! `Change`: the tagged union a commit's author contribution is made of.

use crate::value::{Value, ValueRef};
use serde::{Deserialize, Serialize};

/// A single value-level change carried by a commit.
///
/// `Preserve`/`PreserveRemoval` are only ever produced by the merge engine
/// (spec §3): they encode "carry the second parent's decision into the
/// first parent's index" without re-storing a payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Change {
    /// A brand new value under a logical key that previously had none.
    Insert(Value),
    /// A new payload replacing whatever a logical key previously pointed
    /// at.
    Update(Value),
    /// The logical key no longer has a value.
    Remove {
        /// The value id being removed.
        value_id: String,
    },
    /// Merge-only: carry an existing ref (possibly stored under an older
    /// commit) into this commit's index without rewriting the payload.
    Preserve(ValueRef),
    /// Merge-only: carry forward a removal decided by the other parent.
    PreserveRemoval {
        /// The value id whose removal is being preserved.
        value_id: String,
    },
}

impl Change {
    /// The value id this change concerns, regardless of variant.
    pub fn value_id(&self) -> &str {
        match self {
            Change::Insert(v) | Change::Update(v) => &v.value_id,
            Change::Remove { value_id } => value_id,
            Change::Preserve(r) => &r.value_id,
            Change::PreserveRemoval { value_id } => value_id,
        }
    }

    /// Whether this change writes a payload to the zone (`insert`/`update`)
    /// as opposed to only touching the index (spec §4.E.1 step 3).
    pub fn writes_payload(&self) -> bool {
        matches!(self, Change::Insert(_) | Change::Update(_))
    }

    /// The value payload carried by an `insert`/`update`, if any.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Change::Insert(v) | Change::Update(v) => Some(v),
            _ => None,
        }
    }
}
