//! Mutex helpers shared by the cache and the test providers.

use std::sync::{Mutex, MutexGuard};

/// Acquire a `Mutex` without caring whether a previous holder panicked.
///
/// The analysis cache and the mock provider only guard plain collections;
/// a panic while holding the guard cannot leave them half-updated in a way
/// that matters, so the panic itself is the error worth reporting.
pub trait IgnoreLock<T> {
    /// Lock the mutex, clearing any poison and returning the guard.
    fn lock_ignore_poison(&self) -> MutexGuard<'_, T>;
}

impl<T> IgnoreLock<T> for Mutex<T> {
    fn lock_ignore_poison(&self) -> MutexGuard<'_, T> {
        self.lock().unwrap_or_else(|poisoned| {
            self.clear_poison();
            poisoned.into_inner()
        })
    }
}
