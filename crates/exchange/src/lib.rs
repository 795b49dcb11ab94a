//! The exchange protocol (spec §4.G): pulling commits a peer has that we
//! don't (retrieve), and pushing commits we have that a peer doesn't
//! (send), both batched by [`dagstore_concurrency::Batcher`] so a single
//! round trip never carries an unbounded amount of data.

mod capability;
mod retrieve;
mod send;

pub use capability::Exchange;
pub use retrieve::{retrieve, RetrieveReport};
pub use send::{send, SendReport};
