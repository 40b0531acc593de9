//! Single-occupancy weak cell.

use std::cell::UnsafeCell;
use std::sync::{Arc, Weak};

use crate::VisitorGuard;

/// A lock-free cell holding at most one live `T` by weak reference.
///
/// [`try_emplace`](Self::try_emplace) publishes a value and returns the
/// *sole* strong owner: when that `Arc` (and every clone derived from
/// it) drops, the value is destroyed and the slot becomes empty again,
/// ready for replacement. The slot itself never keeps the value alive.
///
/// Readers take a snapshot with [`lock`](Self::lock), which upgrades
/// the weak reference under the visitor guard. Replacement takes the
/// guard's exclusive lock, which only succeeds while no reader is
/// mid-upgrade, so `try_emplace` can spuriously fail under read
/// contention even when the slot is expired. Callers retry or, as the
/// pool does, probe the next slot.
///
/// # Example
///
/// ```
/// use trellis_coop::Slot;
///
/// let slot: Slot<String> = Slot::new();
/// assert!(slot.is_expired());
///
/// let owner = slot.try_emplace("hello".to_string()).expect("empty slot");
/// assert_eq!(slot.lock().as_deref(), Some(&"hello".to_string()));
///
/// // Occupied: the value comes back in the error.
/// assert!(slot.try_emplace("again".to_string()).is_err());
///
/// drop(owner);
/// assert!(slot.is_expired());
/// assert!(slot.try_emplace("next".to_string()).is_ok());
/// ```
pub struct Slot<T> {
    // The guard stays closed for its whole life: readers use enter(),
    // so try_lock() succeeds exactly when no reader is inside.
    guard: VisitorGuard,
    cell: UnsafeCell<Weak<T>>,
}

// Safety: the weak reference in `cell` is only written while `guard`
// is exclusively locked, which excludes every reader and other writer;
// readers only dereference it between a successful enter() and the
// matching leave(), which the lock in turn excludes.
unsafe impl<T: Send + Sync> Send for Slot<T> {}
unsafe impl<T: Send + Sync> Sync for Slot<T> {}

impl<T> Slot<T> {
    /// Creates an empty slot.
    #[must_use]
    pub fn new() -> Slot<T> {
        Slot {
            guard: VisitorGuard::closed(),
            cell: UnsafeCell::new(Weak::new()),
        }
    }

    /// Takes a strong snapshot of the current occupant, if any.
    #[must_use]
    pub fn lock(&self) -> Option<Arc<T>> {
        if !self.guard.enter() {
            return None;
        }
        // Safety: see the Send/Sync comment above.
        let result = unsafe { (*self.cell.get()).upgrade() };
        self.guard.leave();
        result
    }

    /// Returns the number of strong references to the occupant.
    #[must_use]
    pub fn use_count(&self) -> usize {
        if !self.guard.enter() {
            return 0;
        }
        let count = unsafe { (*self.cell.get()).strong_count() };
        self.guard.leave();
        count
    }

    /// Returns `true` if the slot holds no live value.
    ///
    /// A locked slot reports expired; the answer is a snapshot either
    /// way.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.use_count() == 0
    }

    /// Tries to publish `value`, returning the sole strong owner.
    ///
    /// Fails, handing the value back, when the slot is occupied or
    /// when a concurrent reader prevents taking the exclusive lock.
    pub fn try_emplace(&self, value: T) -> Result<Arc<T>, T> {
        // Cheap pre-check before attempting the lock.
        if !self.is_expired() {
            return Err(value);
        }
        if !self.guard.try_lock() {
            return Err(value);
        }
        // Safety: the exclusive lock excludes all other access.
        let cell = unsafe { &mut *self.cell.get() };
        let result = if cell.strong_count() == 0 {
            let owner = Arc::new(value);
            *cell = Arc::downgrade(&owner);
            Ok(owner)
        } else {
            Err(value)
        };
        self.guard.unlock();
        result
    }
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Slot::new()
    }
}

impl<T> std::fmt::Debug for Slot<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slot")
            .field("occupied", &!self.is_expired())
            .finish()
    }
}
