//! Compaction (spec §4.H): collapse old history into a baseline commit,
//! mark the commits it made redundant as compressed, and delete their
//! data — crash-safely, resuming cleanup on restart if interrupted.

pub mod engine;
pub mod info;

pub use engine::{CompactionEngine, CompactionReport};
pub use info::CompactionInfo;
