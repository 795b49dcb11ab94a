//! A single-lock wrapper for state that must be read and written under one
//! serialization point — the "history-access" lock of spec §5, which
//! serializes all operations that touch the commit DAG.
//!
//! History and the versioned index each hold their mutable state behind a
//! [`Guarded`] rather than exposing the lock type directly, so the
//! locking strategy (currently a single [`parking_lot::RwLock`]) can change
//! without touching call sites.

use parking_lot::RwLock;

/// `T` behind a single read/write lock, accessed only through closures so
/// the lock is never held across an `.await` or forgotten unlocked.
pub struct Guarded<T> {
    inner: RwLock<T>,
}

impl<T> Guarded<T> {
    /// Wrap `value` for serialized access.
    pub fn new(value: T) -> Self {
        Guarded {
            inner: RwLock::new(value),
        }
    }

    /// Run `f` with shared read access. Multiple readers may run
    /// concurrently as long as no writer holds the lock.
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let guard = self.inner.read();
        f(&guard)
    }

    /// Run `f` with exclusive write access.
    pub fn write<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.inner.write();
        f(&mut guard)
    }
}
