//! Core types shared across dagstore
//!
//! This crate defines the data model that every other crate in the
//! workspace builds on:
//! - [`Value`] / [`ValueRef`]: immutable payloads and pointers to them
//! - [`Change`]: a single value-level change carried by a commit
//! - [`Delta`]: the per-key change request the index applies
//! - [`Commit`] / [`Predecessors`]: immutable DAG nodes
//! - [`Fork`]: how a value's fate diverges across two branches
//! - [`Error`] / [`Result`]: the error type shared by every crate

pub mod change;
pub mod commit;
pub mod delta;
pub mod error;
pub mod fork;
pub mod value;

pub use change::Change;
pub use commit::{Commit, MetadataValue, Predecessors};
pub use delta::Delta;
pub use error::{Error, Result};
pub use fork::{Branch, Fork};
pub use value::{Value, ValueRef};

/// The reserved key under which a root index node is stored (spec §4.D).
pub const ROOT_KEY: &str = "__ROOT__";

/// Split a logical key into its 2-character shard prefix (spec §3, §4.D).
///
/// Keys shorter than 2 bytes are padded with `'_'` so that `prefix` is
/// always exactly 2 bytes, an edge case otherwise left unspecified.
/// Splitting is done on bytes, not
/// `char`s, so a key whose first codepoint is multi-byte never panics —
/// the shard is simply not guaranteed to be valid UTF-8 on its own.
pub fn key_prefix(key: &str) -> String {
    let bytes = key.as_bytes();
    match bytes.len() {
        0 => "__".to_string(),
        1 => format!("{}_", bytes[0] as char),
        _ => String::from_utf8_lossy(&bytes[0..2]).into_owned(),
    }
}
