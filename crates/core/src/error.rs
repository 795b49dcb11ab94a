//! Error types for dagstore
//!
//! This module defines the single error enum shared by every layer of the
//! store. We use `thiserror` for `Display`/`std::error::Error` derivation,
//! the same way every crate in this workspace does.
//!
//! Each variant corresponds to one of the errors named in the external
//! interface contract: contract violations (`DuplicateCommit`,
//! `MissingPredecessor`, ...), arbiter defects (`UnresolvedConflict`),
//! I/O failures (`Io`, `Transport`), exchange batching failures
//! (`CouldNotGrow`), and compaction/snapshot failures
//! (`AccessToCompressedVersion`, `SnapshotManifestDecodingFailed`, ...).

use crate::fork::Fork;
use std::io;
use thiserror::Error;

/// Result alias used throughout dagstore.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for all dagstore operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A commit with this id already exists in history.
    #[error("commit already exists: {0}")]
    DuplicateCommit(String),

    /// A commit names a predecessor that does not (yet) exist in history.
    #[error("missing predecessor: {0}")]
    MissingPredecessor(String),

    /// A commit id was referenced that is not known to history.
    #[error("no such commit: {0}")]
    MissingVersion(String),

    /// An index node was referenced that does not exist in the zone.
    #[error("missing index node: key={key} commit={commit_id}")]
    MissingIndexNode {
        /// The node's logical key (ROOT_KEY or a 2-character prefix).
        key: String,
        /// The commit id the node was expected to be stored under.
        commit_id: String,
    },

    /// An index node's payload did not decode into the shape the caller
    /// expected (root node vs. sub-node).
    #[error("unexpected index node content at {0}")]
    UnexpectedNodeContent(String),

    /// Two commits being merged share no common ancestor reachable in
    /// history (including the case where the ancestor's index has been
    /// discarded by compaction).
    #[error("no common ancestor")]
    NoCommonAncestor,

    /// The arbiter's resolution changes did not cover a conflicting fork.
    #[error("unresolved conflict on value {value_id}: {fork:?}")]
    UnresolvedConflict {
        /// The value id left unresolved.
        value_id: String,
        /// The fork classification that was not covered.
        fork: Fork,
    },

    /// A lookup touched a commit whose payload/index nodes were removed by
    /// compaction.
    #[error("access to compressed commit: {0}")]
    AccessToCompressedVersion(String),

    /// The cost-aware batcher could not grow further to make progress.
    #[error("batch could not grow past the remaining window")]
    CouldNotGrow,

    /// Caller-supplied input was invalid (empty key, equal merge parents
    /// that are not actually equal commits, etc).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Underlying I/O failure (zone backend, snapshot file, ...).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A remote transport (exchange) failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// Serialization/deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A snapshot manifest failed to decode.
    #[error("snapshot manifest decoding failed")]
    SnapshotManifestDecodingFailed,

    /// A snapshot chunk referenced by the manifest is missing.
    #[error("snapshot chunk missing: {0}")]
    SnapshotChunkMissing(usize),

    /// A snapshot manifest's `format_tag` doesn't match the version this
    /// build knows how to restore.
    #[error("unsupported snapshot format: manifest has {found}, expected {expected}")]
    UnsupportedSnapshotFormat {
        /// The format tag read from the manifest.
        found: u32,
        /// The format tag this build produces and restores.
        expected: u32,
    },

    /// An unexpected internal invariant was violated. Indicates a bug.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error reflects a caller/contract violation rather than
    /// an I/O or transport failure. Contract violations should never be
    /// retried as-is; the caller made a mistake.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Error::DuplicateCommit(_)
                | Error::MissingPredecessor(_)
                | Error::MissingVersion(_)
                | Error::InvalidInput(_)
        )
    }

    /// Whether this is a serious, investigate-immediately class of error
    /// (data corruption or an internal bug), as opposed to an ordinary
    /// not-found/conflict outcome.
    pub fn is_serious(&self) -> bool {
        matches!(
            self,
            Error::UnexpectedNodeContent(_) | Error::Internal(_) | Error::AccessToCompressedVersion(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contract_violation_classification() {
        assert!(Error::DuplicateCommit("c1".into()).is_contract_violation());
        assert!(Error::MissingPredecessor("c1".into()).is_contract_violation());
        assert!(!Error::CouldNotGrow.is_contract_violation());
    }

    #[test]
    fn serious_classification() {
        assert!(Error::Internal("bug".into()).is_serious());
        assert!(!Error::CouldNotGrow.is_serious());
    }

    #[test]
    fn display_unresolved_conflict() {
        let e = Error::UnresolvedConflict {
            value_id: "ABCDEF".into(),
            fork: Fork::TwiceUpdated,
        };
        let msg = e.to_string();
        assert!(msg.contains("ABCDEF"));
    }

    #[test]
    fn from_serde_json_error() {
        let err = serde_json::from_str::<u8>("not json").unwrap_err();
        let e: Error = err.into();
        assert!(matches!(e, Error::Serialization(_)));
    }
}
