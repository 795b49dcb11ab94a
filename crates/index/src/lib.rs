//! The versioned two-level index (spec §4.D): a root node mapping key
//! prefixes to sub-node refs, and sub-nodes mapping logical keys to value
//! refs, both content-addressed by `(key, commit_id)` in a zone.

pub mod diff;
pub mod index;
pub mod node;

pub use diff::classify;
pub use index::VersionedIndex;
pub use node::{RootNode, SubNode};
