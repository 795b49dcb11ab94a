//! The two node shapes the versioned index stores (spec §4.D).

use dagstore_core::ValueRef;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The root node for a commit: maps a 2-character key prefix to the id of
/// the commit at which that prefix's sub-node was last written. Most
/// entries are inherited unchanged from the parent commit's root — only
/// the prefixes touched by this commit's deltas get a fresh entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootNode {
    /// `prefix -> commit id the prefix's sub-node is stored under`.
    pub entries: HashMap<String, String>,
}

/// A sub-node: the logical keys sharing one 2-character prefix, each
/// mapped to the ref current as of the commit this sub-node is stored
/// under.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubNode {
    /// `logical key -> current ref`.
    pub entries: HashMap<String, ValueRef>,
}
