//! Per-object re-entrant locking and object identities.

use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::ReentrantMutex;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique id for graph objects.
pub(crate) fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Mutable state behind a re-entrant mutex.
///
/// The owning thread may lock again while holding the lock, e.g. when a
/// callback reads a getter of the same object. Borrows must not overlap a
/// mutable borrow, so closures passed to [`with_mut`](Self::with_mut) must
/// not call back into the same object.
pub struct ObjectMutex<T> {
    inner: ReentrantMutex<RefCell<T>>,
}

impl<T> ObjectMutex<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: ReentrantMutex::new(RefCell::new(value)),
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let guard = self.inner.lock();
        let value = guard.borrow();
        f(&value)
    }

    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let guard = self.inner.lock();
        let mut value = guard.borrow_mut();
        f(&mut value)
    }
}

impl<T: Default> Default for ObjectMutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for ObjectMutex<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let guard = self.inner.lock();
        let result = match guard.try_borrow() {
            Ok(value) => value.fmt(f),
            Err(_) => f.write_str("<borrowed>"),
        };
        result
    }
}
