//! Concurrency primitives shared across dagstore: a best-effort
//! generational cache, a single-lock wrapper for serialized history
//! access, and the cost-aware batcher used by the exchange protocol.

pub mod batcher;
pub mod cache;
pub mod guarded;

pub use batcher::{BatchOutcome, Batcher, BatcherError, BatcherState};
pub use cache::Cache;
pub use guarded::Guarded;
