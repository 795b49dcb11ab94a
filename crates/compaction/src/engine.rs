//! Baseline compaction (spec §4.H): collapse everything visible at a
//! cutoff commit into a synthetic root commit, then physically delete
//! the commits that baseline made redundant.

use crate::info::CompactionInfo;
use dagstore_commit::{CommitEngine, KeyedChange};
use dagstore_core::{key_prefix, Change, Error, Result, Value};
use dagstore_history::History;
use dagstore_index::VersionedIndex;
use dagstore_zone::Zone;
use std::collections::HashSet;
use std::sync::Arc;

/// Outcome of a successful compaction run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionReport {
    /// The freshly created baseline commit's id.
    pub baseline_commit_id: String,
    /// How many commits were marked compressed (and physically removed).
    pub compressed_count: usize,
}

fn value_key(value_id: &str) -> String {
    format!("values/{value_id}")
}

fn map_key(prefix: &str) -> String {
    format!("maps/{prefix}")
}

/// Coordinates the zone, history, index, and commit engine to compact
/// old history into a baseline and reclaim storage.
pub struct CompactionEngine {
    zone: Arc<dyn Zone>,
    history: Arc<History>,
    index: Arc<VersionedIndex>,
    commits: CommitEngine,
}

impl CompactionEngine {
    /// Build a compaction engine over shared zone/history/index handles.
    pub fn new(zone: Arc<dyn Zone>, history: Arc<History>, index: Arc<VersionedIndex>) -> Self {
        let commits = CommitEngine::new(zone.clone(), history.clone(), index.clone());
        CompactionEngine { zone, history, index, commits }
    }

    /// The currently persisted compaction record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is corrupt.
    pub fn info(&self) -> Result<CompactionInfo> {
        CompactionInfo::load(self.zone.as_ref())
    }

    /// Whether `commit_id` has been compressed away (spec §4.H: lookups
    /// against it must fail with [`Error::AccessToCompressedVersion`]).
    ///
    /// # Errors
    ///
    /// Returns an error if the compaction record is corrupt.
    pub fn check_accessible(&self, commit_id: &str) -> Result<()> {
        if self.info()?.is_compressed(commit_id) {
            return Err(Error::AccessToCompressedVersion(commit_id.to_string()));
        }
        Ok(())
    }

    /// Select the newest commit older than `before_date` for which at
    /// least `min_retained_count` strictly newer commits exist (spec
    /// §4.H step 1). Returns `None` if no commit qualifies.
    fn select_baseline_candidate(&self, before_date: f64, min_retained_count: usize) -> Result<Option<String>> {
        let mut commits = Vec::new();
        for id in self.history.topological_order() {
            commits.push(self.history.version(&id)?);
        }

        let mut candidates: Vec<&dagstore_core::Commit> = commits.iter().filter(|c| c.timestamp < before_date).collect();
        candidates.sort_by(|a, b| a.timestamp.partial_cmp(&b.timestamp).unwrap().then_with(|| a.identifier.cmp(&b.identifier)));

        for candidate in candidates.iter().rev() {
            let more_recent = commits.iter().filter(|c| c.timestamp > candidate.timestamp).count();
            if more_recent >= min_retained_count {
                return Ok(Some(candidate.identifier.clone()));
            }
        }
        Ok(None)
    }

    /// Every ancestor of `baseline` not needed to reach some other head
    /// that diverged before the baseline (spec §4.H step 4). In the
    /// common linear-history case this is simply every ancestor of
    /// `baseline` except `baseline` itself.
    ///
    /// A commit whose index subnode is still the inherited owner for some
    /// prefix on a live head — because no commit between it and that head
    /// ever touched the prefix again — is kept regardless: the baseline
    /// snapshot reconstructs the same *values*, but it lives on its own
    /// disconnected root, so descendants of `baseline` still resolve
    /// untouched prefixes through their real ancestor chain.
    fn compressed_set(&self, baseline: &str) -> Result<HashSet<String>> {
        let mut ancestors = Vec::new();
        for id in self.history.topological_order() {
            if id != baseline && self.history.is_ancestor(&id, baseline)? {
                ancestors.push(id);
            }
        }

        let mut diverged_heads = Vec::new();
        let mut pinned: HashSet<String> = HashSet::new();
        for head in self.history.heads() {
            pinned.extend(self.index.root_owner_ids(&head)?);
            let covered = head == baseline || self.history.is_ancestor(&head, baseline)?;
            if !covered {
                diverged_heads.push(head);
            }
        }

        let mut compressed = HashSet::new();
        for id in ancestors {
            if pinned.contains(&id) {
                continue;
            }
            let still_needed = diverged_heads.iter().any(|h| h == &id || self.history.is_ancestor(&id, h).unwrap_or(false));
            if !still_needed {
                compressed.insert(id);
            }
        }
        Ok(compressed)
    }

    /// Run compaction (spec §4.H steps 1-7).
    ///
    /// # Errors
    ///
    /// Returns an error if history or the index cannot be read, or if
    /// persisting the compaction record or deleting data fails.
    pub fn compact(&self, before_date: f64, min_retained_count: usize) -> Result<Option<CompactionReport>> {
        let Some(baseline_source) = self.select_baseline_candidate(before_date, min_retained_count)? else {
            tracing::debug!(before_date, min_retained_count, "no compaction candidate qualifies");
            return Ok(None);
        };

        let visible = self.index.enumerate(&baseline_source)?;
        let mut changes = Vec::with_capacity(visible.len());
        for (key, value_ref) in &visible {
            let bytes = self
                .zone
                .get(&value_key(&value_ref.value_id), &value_ref.stored_commit_id)?
                .ok_or_else(|| Error::Internal(format!("value {} missing at commit {}", value_ref.value_id, value_ref.stored_commit_id)))?;
            changes.push(KeyedChange::insert(key.clone(), Value::new(value_ref.value_id.clone(), bytes)));
        }

        let compressed = self.compressed_set(&baseline_source)?;

        let baseline = self.commits.commit(None, changes, None)?;

        let mut info = CompactionInfo::load(self.zone.as_ref())?;
        info.baseline_commit_id = Some(baseline.identifier.clone());
        info.compressed_commit_ids.extend(compressed.iter().cloned());
        info.pending_cleanup = true;
        info.persist(self.zone.as_ref())?;
        tracing::info!(baseline_commit_id = %baseline.identifier, compressed_count = compressed.len(), "compaction baseline committed, cleanup pending");

        self.delete_compressed(&info.compressed_commit_ids)?;

        info.pending_cleanup = false;
        info.persist(self.zone.as_ref())?;
        tracing::info!(baseline_commit_id = %baseline.identifier, "compaction cleanup finished");

        Ok(Some(CompactionReport { baseline_commit_id: baseline.identifier, compressed_count: compressed.len() }))
    }

    /// Re-run the deletion steps if a prior run crashed between
    /// persisting intent and finishing cleanup (spec §4.H: "On startup,
    /// if `pending_cleanup` is true, re-run steps 6-7").
    ///
    /// # Errors
    ///
    /// Returns an error if deletion or persistence fails.
    pub fn resume_if_needed(&self) -> Result<bool> {
        let mut info = CompactionInfo::load(self.zone.as_ref())?;
        if !info.pending_cleanup {
            return Ok(false);
        }
        tracing::warn!(compressed_count = info.compressed_commit_ids.len(), "resuming interrupted compaction cleanup");
        self.delete_compressed(&info.compressed_commit_ids)?;
        info.pending_cleanup = false;
        info.persist(self.zone.as_ref())?;
        Ok(true)
    }

    fn delete_compressed(&self, compressed: &HashSet<String>) -> Result<()> {
        let mut plan = Vec::with_capacity(compressed.len());
        for id in compressed {
            if self.zone.get("versions", id)?.is_none() {
                continue;
            }
            let changes = self.commits.changes_made_at(id)?;
            plan.push((id.clone(), changes));
        }

        for (id, changes) in plan {
            let mut prefixes = HashSet::new();
            for kc in &changes {
                prefixes.insert(key_prefix(&kc.key));
                if let Change::Insert(v) | Change::Update(v) = &kc.change {
                    self.zone.remove(&value_key(&v.value_id), &id)?;
                }
            }
            self.zone.remove("maps/__ROOT__", &id)?;
            for prefix in prefixes {
                self.zone.remove(&map_key(&prefix), &id)?;
            }
            self.zone.remove("versions", &id)?;
        }
        Ok(())
    }
}
