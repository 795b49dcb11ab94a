//! Commit creation and "changes made at this commit" reconstruction
//! (spec §4.E).
//!
//! Dagstore never persists a separate change log alongside a commit —
//! what was inserted, updated, removed, or preserved is always
//! recoverable by diffing a commit's index state against its first
//! parent's. [`CommitEngine::changes_made_at`] is that reconstruction;
//! [`CommitEngine::commit`] is the inverse, turning an author's intended
//! changes into a persisted commit.

mod engine;

pub use engine::{CommitEngine, KeyedChange};
