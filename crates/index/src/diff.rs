//! Fork classification: the presence/equality truth table of spec
//! §4.D.4, applied per logical key across an optional ancestor and two
//! descendant commits.

use dagstore_core::{Branch, Fork, ValueRef};

fn same_value(a: &ValueRef, b: &ValueRef) -> bool {
    a == b
}

/// Classify how a single key's value diverges across `ancestor` (absent
/// for a two-way diff with no common ancestor), `first`, and `second`.
/// Returns `None` when there is nothing to report: the key is absent
/// everywhere, or both sides agree on its current value.
pub fn classify(ancestor: Option<&ValueRef>, first: Option<&ValueRef>, second: Option<&ValueRef>) -> Option<Fork> {
    match (ancestor, first, second) {
        (None, None, None) => None,
        (None, Some(_), None) => Some(Fork::Inserted(Branch::First)),
        (None, None, Some(_)) => Some(Fork::Inserted(Branch::Second)),
        (None, Some(a), Some(b)) => {
            if same_value(a, b) {
                None
            } else {
                Some(Fork::TwiceInserted)
            }
        }
        (Some(_), None, None) => Some(Fork::TwiceRemoved),
        (Some(a0), Some(a), None) => {
            if same_value(a0, a) {
                Some(Fork::Removed(Branch::Second))
            } else {
                Some(Fork::RemovedAndUpdated { removed_on: Branch::Second })
            }
        }
        (Some(a0), None, Some(b)) => {
            if same_value(a0, b) {
                Some(Fork::Removed(Branch::First))
            } else {
                Some(Fork::RemovedAndUpdated { removed_on: Branch::First })
            }
        }
        (Some(a0), Some(a), Some(b)) => {
            let a_changed = !same_value(a0, a);
            let b_changed = !same_value(a0, b);
            match (a_changed, b_changed) {
                (false, false) => None,
                (false, true) => Some(Fork::Updated(Branch::Second)),
                (true, false) => Some(Fork::Updated(Branch::First)),
                (true, true) => {
                    if same_value(a, b) {
                        // Both branches independently converged on the
                        // same new value; nothing for an arbiter to do.
                        None
                    } else {
                        Some(Fork::TwiceUpdated)
                    }
                }
            }
        }
    }
}
