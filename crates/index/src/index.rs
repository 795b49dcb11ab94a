//! The versioned two-level index (spec §4.D): add-commit, lookup,
//! enumerate, and three-way diff.

use crate::diff::classify;
use crate::node::{RootNode, SubNode};
use dagstore_core::{key_prefix, Delta, Error, Fork, Result, ValueRef, ROOT_KEY};
use dagstore_zone::Zone;
use std::collections::HashMap;
use std::sync::Arc;

const MAPS_ROOT_KEY: &str = "maps/__ROOT__";

fn subnode_key(prefix: &str) -> String {
    format!("maps/{prefix}")
}

/// The index: root nodes and sub-nodes, content-addressed in a zone.
pub struct VersionedIndex {
    zone: Arc<dyn Zone>,
}

impl VersionedIndex {
    /// Build an index view over `zone`. The index itself holds no
    /// mutable state beyond the zone — every commit's root/sub-nodes are
    /// looked up by commit id on demand.
    pub fn new(zone: Arc<dyn Zone>) -> Self {
        VersionedIndex { zone }
    }

    fn load_root(&self, commit_id: &str) -> Result<RootNode> {
        match self.zone.get(MAPS_ROOT_KEY, commit_id)? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Err(Error::MissingIndexNode {
                key: ROOT_KEY.to_string(),
                commit_id: commit_id.to_string(),
            }),
        }
    }

    fn load_subnode(&self, prefix: &str, commit_id: &str) -> Result<SubNode> {
        match self.zone.get(&subnode_key(prefix), commit_id)? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Err(Error::MissingIndexNode {
                key: prefix.to_string(),
                commit_id: commit_id.to_string(),
            }),
        }
    }

    /// Apply `deltas` on top of `base_commit_id`'s index (or an empty
    /// index, for the first commit ever written) and persist the result
    /// under `commit_id`. Cost is proportional to the number of distinct
    /// prefixes touched by `deltas`, not the size of the whole index
    /// (spec §4.D.1).
    ///
    /// # Errors
    ///
    /// Returns an error if `base_commit_id` is given but its index nodes
    /// are missing from the zone (e.g. compacted away).
    pub fn add_commit(&self, commit_id: &str, base_commit_id: Option<&str>, deltas: &[Delta]) -> Result<()> {
        let mut root = match base_commit_id {
            Some(base) => self.load_root(base)?,
            None => RootNode::default(),
        };

        let mut by_prefix: HashMap<String, Vec<&Delta>> = HashMap::new();
        for delta in deltas {
            by_prefix.entry(key_prefix(&delta.key)).or_default().push(delta);
        }

        for (prefix, prefix_deltas) in by_prefix {
            let mut subnode = match root.entries.get(&prefix) {
                Some(ref_commit_id) => self.load_subnode(&prefix, ref_commit_id)?,
                None => SubNode::default(),
            };

            for delta in prefix_deltas {
                for removed_id in &delta.removed_ids {
                    if subnode.entries.get(&delta.key).is_some_and(|r| &r.value_id == removed_id) {
                        subnode.entries.remove(&delta.key);
                    }
                }
                for added_ref in &delta.added_refs {
                    subnode.entries.insert(delta.key.clone(), added_ref.clone());
                }
            }

            let bytes = serde_json::to_vec(&subnode)?;
            self.zone.store(&subnode_key(&prefix), commit_id, &bytes)?;
            root.entries.insert(prefix, commit_id.to_string());
        }

        let root_bytes = serde_json::to_vec(&root)?;
        self.zone.store(MAPS_ROOT_KEY, commit_id, &root_bytes)?;
        Ok(())
    }

    /// Look up the current ref for `key` as of `commit_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if `commit_id`'s root node is missing (e.g.
    /// compacted away); a key simply absent from the index is `Ok(None)`.
    pub fn lookup(&self, key: &str, commit_id: &str) -> Result<Option<ValueRef>> {
        let root = self.load_root(commit_id)?;
        let prefix = key_prefix(key);
        let Some(ref_commit_id) = root.entries.get(&prefix) else {
            return Ok(None);
        };
        let subnode = self.load_subnode(&prefix, ref_commit_id)?;
        Ok(subnode.entries.get(key).cloned())
    }

    /// The distinct commit ids `commit_id`'s root node points at for its
    /// prefixes, including ids inherited unchanged from older ancestors.
    /// Compaction uses this to find subnodes still pinned by a live head
    /// before deleting an ancestor's index nodes.
    ///
    /// # Errors
    ///
    /// Returns an error if `commit_id`'s root node is missing.
    pub fn root_owner_ids(&self, commit_id: &str) -> Result<Vec<String>> {
        let root = self.load_root(commit_id)?;
        let mut ids: Vec<String> = root.entries.into_values().collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    /// Every `(key, ValueRef)` visible as of `commit_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if any referenced node is missing from the zone.
    pub fn enumerate(&self, commit_id: &str) -> Result<Vec<(String, ValueRef)>> {
        let root = self.load_root(commit_id)?;
        let mut out = Vec::new();
        // Distinct ref commit ids can repeat across prefixes only when a
        // subnode legitimately never changed since an ancestor commit —
        // load each (prefix, ref) pair once.
        for (prefix, ref_commit_id) in &root.entries {
            let subnode = self.load_subnode(prefix, ref_commit_id)?;
            out.extend(subnode.entries.into_iter());
        }
        Ok(out)
    }

    /// Classify every key that differs across `first` and `second`
    /// relative to `ancestor`. `ancestor = None` is the two-way-diff
    /// fallback (spec §4.D.4: used when no common ancestor exists), under
    /// which every key is treated as though it had never existed before.
    ///
    /// # Errors
    ///
    /// Returns an error if any commit's index nodes are missing.
    pub fn diff(&self, ancestor: Option<&str>, first: &str, second: &str) -> Result<HashMap<String, Fork>> {
        let ancestor_map: HashMap<String, ValueRef> = match ancestor {
            Some(id) => self.enumerate(id)?.into_iter().collect(),
            None => HashMap::new(),
        };
        let first_map: HashMap<String, ValueRef> = self.enumerate(first)?.into_iter().collect();
        let second_map: HashMap<String, ValueRef> = self.enumerate(second)?.into_iter().collect();

        let mut keys: Vec<&String> = ancestor_map.keys().chain(first_map.keys()).chain(second_map.keys()).collect();
        keys.sort();
        keys.dedup();

        let mut forks = HashMap::new();
        for key in keys {
            let fork = classify(ancestor_map.get(key), first_map.get(key), second_map.get(key));
            if let Some(fork) = fork {
                forks.insert(key.clone(), fork);
            }
        }
        Ok(forks)
    }
}
