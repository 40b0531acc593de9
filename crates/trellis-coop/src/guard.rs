//! Atomic visitor guard.

use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicIsize, Ordering};

const WIDTH: u32 = isize::BITS;

/// Bit set while the guard is open to ordinary visitors.
const FLAG_OPEN: isize = 1 << (WIDTH - 2);

/// Both high bits; the guard is locked. Locked implies closed, and the
/// encoded value is negative regardless of how many stale increments
/// race in, which is what lets every entry be a single `fetch_add`.
const FLAG_LOCKED: isize = FLAG_OPEN | (FLAG_OPEN << 1);

/// A reference-counting guard for a resource that may be read
/// concurrently, closed to new readers, or locked for exclusive
/// replacement.
///
/// The whole state lives in one atomic integer: the low bits count
/// readers currently inside, the two high bits encode open/locked.
/// Every entry attempt is a single `fetch_add` followed by a sign/bit
/// test, so a successful entry never touches an OS lock.
///
/// | Operation | Succeeds when |
/// |-----------|---------------|
/// | [`visit`](Self::visit) | open |
/// | [`join`](Self::join) | at least one reader is already inside |
/// | [`enter`](Self::enter) | not locked |
/// | [`try_lock`](Self::try_lock) | closed and no readers |
///
/// Every successful `visit`/`join`/`enter` must be paired with a
/// [`leave`](Self::leave), or `try_lock` starves forever.
///
/// The observation methods (`is_open`, `visitors`, ...) use relaxed
/// loads and are for diagnostics only; they must not be used to
/// synchronise access to the guarded resource.
pub struct VisitorGuard {
    state: CachePadded<AtomicIsize>,
}

impl VisitorGuard {
    /// Creates a guard in the open state.
    #[must_use]
    pub fn open() -> VisitorGuard {
        VisitorGuard {
            state: CachePadded::new(AtomicIsize::new(FLAG_OPEN)),
        }
    }

    /// Creates a guard in the closed state.
    ///
    /// Visitors may still [`enter`](Self::enter) a closed guard; only
    /// [`visit`](Self::visit) is refused.
    #[must_use]
    pub fn closed() -> VisitorGuard {
        VisitorGuard {
            state: CachePadded::new(AtomicIsize::new(0)),
        }
    }

    /// Tries to enter as an ordinary visitor. Succeeds only while the
    /// guard is open. Pair with [`leave`](Self::leave) on success.
    #[must_use]
    pub fn visit(&self) -> bool {
        if self.state.fetch_add(1, Ordering::Acquire) >= FLAG_OPEN {
            true
        } else {
            self.leave();
            false
        }
    }

    /// Tries to enter alongside visitors already inside. Succeeds while
    /// at least one reader is present, even if the guard has closed.
    /// Pair with [`leave`](Self::leave) on success.
    #[must_use]
    pub fn join(&self) -> bool {
        if self.state.fetch_add(1, Ordering::Acquire) >= 1 {
            true
        } else {
            self.leave();
            false
        }
    }

    /// Tries to enter unless the guard is locked. Pair with
    /// [`leave`](Self::leave) on success.
    #[must_use]
    pub fn enter(&self) -> bool {
        if self.state.fetch_add(1, Ordering::Acquire) >= 0 {
            true
        } else {
            self.leave();
            false
        }
    }

    /// Leaves after a successful entry.
    pub fn leave(&self) {
        self.state.fetch_sub(1, Ordering::Release);
    }

    /// Stops admitting ordinary visitors. Readers already inside are
    /// unaffected.
    pub fn close(&self) {
        self.state.fetch_and(!FLAG_OPEN, Ordering::AcqRel);
    }

    /// Re-admits ordinary visitors. Returns `true` if any reader was
    /// inside at the moment of reopening.
    pub fn reopen(&self) -> bool {
        self.state.fetch_or(FLAG_OPEN, Ordering::AcqRel) > 0
    }

    /// Tries to lock the guard for exclusive access. Succeeds only when
    /// the guard is closed and no reader is inside.
    #[must_use]
    pub fn try_lock(&self) -> bool {
        self.state
            .compare_exchange(0, FLAG_LOCKED, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }

    /// Releases an exclusive lock, returning the guard to the closed
    /// state. Call [`reopen`](Self::reopen) afterwards to admit
    /// ordinary visitors again.
    pub fn unlock(&self) {
        self.state.fetch_and(!FLAG_LOCKED, Ordering::Release);
    }

    /// Returns `true` if ordinary visitors are admitted.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state.load(Ordering::Relaxed) >= FLAG_OPEN
    }

    /// Returns `true` if ordinary visitors are refused.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        !self.is_open()
    }

    /// Returns `true` if the guard is exclusively locked.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.state.load(Ordering::Relaxed) < 0
    }

    /// Returns the number of readers currently inside.
    #[must_use]
    pub fn visitors(&self) -> isize {
        self.state.load(Ordering::Relaxed) & !FLAG_OPEN
    }

    /// Returns `true` if no reader is inside and the guard is not
    /// locked.
    #[must_use]
    pub fn is_vacant(&self) -> bool {
        (self.state.load(Ordering::Relaxed) | FLAG_OPEN) == FLAG_OPEN
    }

    /// Returns `true` if a `try_lock` would currently succeed.
    #[must_use]
    pub fn can_lock(&self) -> bool {
        self.state.load(Ordering::Relaxed) == 0
    }
}

impl std::fmt::Debug for VisitorGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisitorGuard")
            .field("open", &self.is_open())
            .field("locked", &self.is_locked())
            .field("visitors", &self.visitors())
            .finish()
    }
}
