//! Persisted compaction state (spec §4.H step 5): `CompactionInfo` is
//! rewritten atomically (via the zone's existing write-fsync-rename
//! store path) so readers never observe a half-updated record.

use dagstore_core::Result;
use dagstore_zone::Zone;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

const COMPACTION_KEY: &str = "compaction";
const COMPACTION_COMMIT_ID: &str = "_state";

/// Durable compaction bookkeeping, one record per store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactionInfo {
    /// The most recent baseline commit produced by compaction, if any.
    #[serde(default)]
    pub baseline_commit_id: Option<String>,
    /// Every commit id whose record/payloads/index nodes have been (or
    /// are being) deleted.
    #[serde(default)]
    pub compressed_commit_ids: HashSet<String>,
    /// `true` between persisting the intent to delete (step 5) and
    /// finishing the deletion (step 7); drives crash recovery.
    #[serde(default)]
    pub pending_cleanup: bool,
}

impl CompactionInfo {
    /// Load the persisted record, or a fresh default if none exists yet.
    ///
    /// # Errors
    ///
    /// Returns an error if a record exists but fails to decode.
    pub fn load(zone: &dyn Zone) -> Result<Self> {
        match zone.get(COMPACTION_KEY, COMPACTION_COMMIT_ID)? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(CompactionInfo::default()),
        }
    }

    /// Persist this record atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the underlying write fails.
    pub fn persist(&self, zone: &dyn Zone) -> Result<()> {
        let bytes = serde_json::to_vec(self)?;
        zone.store(COMPACTION_KEY, COMPACTION_COMMIT_ID, &bytes)
    }

    /// Whether `commit_id` has been compressed away.
    pub fn is_compressed(&self, commit_id: &str) -> bool {
        self.compressed_commit_ids.contains(commit_id)
    }
}
