//! Commits ("versions"): immutable DAG nodes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// A commit's predecessor links.
///
/// Either a single parent (`id_of_second` absent) or a merge of two
/// parents. A root commit has no `Predecessors` at all — `Commit`'s field
/// is `Option<Predecessors>`, not this type, to express that.
///
/// Parent order is semantically significant (spec §3): `first` is the
/// base whose index is edited in place; `second` contributes merged-in
/// changes via `preserve`/`preserve_removal`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Predecessors {
    /// The base parent.
    #[serde(rename = "idOfFirst")]
    pub id_of_first: String,
    /// The merged-in parent, if this is a merge commit.
    #[serde(rename = "idOfSecond", default, skip_serializing_if = "Option::is_none")]
    pub id_of_second: Option<String>,
}

impl Predecessors {
    /// A single-parent link.
    pub fn single(parent: impl Into<String>) -> Self {
        Predecessors {
            id_of_first: parent.into(),
            id_of_second: None,
        }
    }

    /// A two-parent merge link. Returns `None` if `first == second`: a
    /// commit cannot merge with itself (spec §3: `p1 ≠ p2`).
    pub fn merge(first: impl Into<String>, second: impl Into<String>) -> Option<Self> {
        let first = first.into();
        let second = second.into();
        if first == second {
            return None;
        }
        Some(Predecessors {
            id_of_first: first,
            id_of_second: Some(second),
        })
    }

    /// The base/first parent.
    pub fn first(&self) -> &str {
        &self.id_of_first
    }

    /// The merged-in/second parent, for merge commits.
    pub fn second(&self) -> Option<&str> {
        self.id_of_second.as_deref()
    }

    /// Whether this links two parents.
    pub fn is_merge(&self) -> bool {
        self.id_of_second.is_some()
    }

    /// Both (or the one) parent id(s), in order.
    pub fn ids(&self) -> Vec<&str> {
        match &self.id_of_second {
            Some(second) => vec![&self.id_of_first, second.as_str()],
            None => vec![&self.id_of_first],
        }
    }
}

/// An immutable node in the commit DAG.
///
/// Commits are never mutated once written (spec §3). `timestamp` is wall
/// clock time used only for tie-breaks and compaction policy, never for
/// ordering correctness — ordering correctness comes from the DAG
/// topology, not the clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    /// Unique identifier, typically UUID-derived.
    pub identifier: String,
    /// Predecessor links; absent for a root commit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predecessors: Option<Predecessors>,
    /// Wall-clock seconds since the reference epoch (UNIX epoch here).
    pub timestamp: f64,
    /// Optional hint about the total payload size this commit wrote.
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "valueDataSize")]
    pub value_data_size: Option<i64>,
    /// Optional free-form metadata. Missing ⇒ empty (spec §6: backward
    /// compatible).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, MetadataValue>>,
}

/// A single metadata entry, carrying raw bytes. Serialized as
/// `{"data": "<base64>"}` per spec §6.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataValue {
    /// Base64-encoded payload (decoded for the caller by `Commit::metadata_bytes`).
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

mod base64_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        base64::engine::general_purpose::STANDARD
            .encode(bytes)
            .serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(d)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

impl Commit {
    /// Allocate a fresh commit id (spec §4.E.1 step 1).
    pub fn new_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Build a root commit (no predecessors).
    pub fn root(identifier: impl Into<String>, timestamp: f64) -> Self {
        Commit {
            identifier: identifier.into(),
            predecessors: None,
            timestamp,
            value_data_size: None,
            metadata: None,
        }
    }

    /// Build a commit with the given predecessors.
    pub fn with_predecessors(
        identifier: impl Into<String>,
        predecessors: Predecessors,
        timestamp: f64,
    ) -> Self {
        Commit {
            identifier: identifier.into(),
            predecessors: Some(predecessors),
            timestamp,
            value_data_size: None,
            metadata: None,
        }
    }

    /// Whether this commit has no parents.
    pub fn is_root(&self) -> bool {
        self.predecessors.is_none()
    }

    /// Whether this commit has two parents.
    pub fn is_merge(&self) -> bool {
        self.predecessors.as_ref().is_some_and(Predecessors::is_merge)
    }

    /// All parent ids, in order. Empty for a root commit.
    pub fn parent_ids(&self) -> Vec<&str> {
        self.predecessors.as_ref().map(Predecessors::ids).unwrap_or_default()
    }

    /// Attach raw metadata bytes under `key`.
    pub fn set_metadata(&mut self, key: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.metadata
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), MetadataValue { data: bytes.into() });
    }

    /// Read raw metadata bytes, if any were set under `key`.
    pub fn metadata_bytes(&self, key: &str) -> Option<&[u8]> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get(key))
            .map(|v| v.data.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predecessors_merge_rejects_self_merge() {
        assert!(Predecessors::merge("c1", "c1").is_none());
        assert!(Predecessors::merge("c1", "c2").is_some());
    }

    #[test]
    fn root_commit_has_no_predecessors_in_json() {
        let c = Commit::root("c0", 1000.0);
        let json = serde_json::to_value(&c).unwrap();
        assert!(json.get("predecessors").is_none());
    }

    #[test]
    fn merge_commit_json_shape() {
        let p = Predecessors::merge("c1", "c2").unwrap();
        let c = Commit::with_predecessors("c3", p, 1000.0);
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["predecessors"]["idOfFirst"], "c1");
        assert_eq!(json["predecessors"]["idOfSecond"], "c2");
    }

    #[test]
    fn missing_predecessors_deserializes_as_root() {
        let json = r#"{"identifier":"c0","timestamp":0.0}"#;
        let c: Commit = serde_json::from_str(json).unwrap();
        assert!(c.is_root());
    }

    #[test]
    fn missing_metadata_deserializes_as_none() {
        let json = r#"{"identifier":"c0","timestamp":0.0}"#;
        let c: Commit = serde_json::from_str(json).unwrap();
        assert!(c.metadata.is_none());
        assert!(c.metadata_bytes("anything").is_none());
    }

    #[test]
    fn metadata_roundtrip() {
        let mut c = Commit::root("c0", 0.0);
        c.set_metadata("author", b"alice".to_vec());
        let json = serde_json::to_string(&c).unwrap();
        let back: Commit = serde_json::from_str(&json).unwrap();
        assert_eq!(back.metadata_bytes("author"), Some(&b"alice"[..]));
    }

    #[test]
    fn parent_ids_order_preserved() {
        let p = Predecessors::merge("c1", "c2").unwrap();
        let c = Commit::with_predecessors("c3", p, 0.0);
        assert_eq!(c.parent_ids(), vec!["c1", "c2"]);
    }
}
