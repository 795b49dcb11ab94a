//! Values and value references.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An immutable value stored under a logical key at some commit.
///
/// A `Value`'s bytes are exclusively owned by the zone that persists them
/// (spec §3); once written they are never rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Value {
    /// Stable identity for this value, independent of the logical key that
    /// currently points at it. Typically equal to the logical key for a
    /// plain insert, but preserved across renames/merges via `ValueRef`.
    pub value_id: String,
    /// Opaque payload bytes.
    pub payload: Vec<u8>,
}

impl Value {
    /// Construct a new value.
    pub fn new(value_id: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Value {
            value_id: value_id.into(),
            payload: payload.into(),
        }
    }
}

/// A pointer to where a value's bytes live: the value's id, and the commit
/// under which the zone stored the payload. A commit can "see" a value via
/// a `ValueRef` that is older than the commit itself (a `preserve`), so
/// `stored_commit_id` is not necessarily the commit that references it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValueRef {
    /// The value's stable id.
    pub value_id: String,
    /// The commit under which the zone stores the payload bytes.
    pub stored_commit_id: String,
}

impl ValueRef {
    /// Construct a new value reference.
    pub fn new(value_id: impl Into<String>, stored_commit_id: impl Into<String>) -> Self {
        ValueRef {
            value_id: value_id.into(),
            stored_commit_id: stored_commit_id.into(),
        }
    }
}

impl fmt::Display for ValueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.value_id, self.stored_commit_id)
    }
}
