//! Growable pool of weakly-held members.

use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::Arc;

use crate::Slot;

/// Capacity of the first block; each appended block doubles it.
const FIRST_BLOCK: usize = 8;

struct Block<T> {
    slots: Box<[Slot<T>]>,
    next: AtomicPtr<Block<T>>,
}

impl<T> Block<T> {
    fn with_capacity(capacity: usize) -> Block<T> {
        Block {
            slots: (0..capacity).map(|_| Slot::new()).collect(),
            next: AtomicPtr::new(ptr::null_mut()),
        }
    }

    fn next(&self) -> Option<&Block<T>> {
        let next = self.next.load(Ordering::Acquire);
        // Safety: a non-null next pointer is only ever installed by
        // `more` from a leaked Box and freed in `drop`, after which no
        // reference to this block can exist.
        (!next.is_null()).then(|| unsafe { &*next })
    }

    /// Returns the next block, appending one when the chain ends.
    fn more(&self) -> &Block<T> {
        if let Some(next) = self.next() {
            return next;
        }
        let created = Box::into_raw(Box::new(Block::with_capacity(self.slots.len() * 2)));
        match self.next.compare_exchange(
            ptr::null_mut(),
            created,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            // Safety: we just leaked this pointer and now own the link.
            Ok(_) => unsafe { &*created },
            Err(existing) => {
                // Someone beat us to it; discard ours.
                // Safety: `created` was never published.
                unsafe { drop(Box::from_raw(created)) };
                unsafe { &*existing }
            }
        }
    }
}

impl<T> Drop for Block<T> {
    fn drop(&mut self) {
        let next = *self.next.get_mut();
        if !next.is_null() {
            // Safety: drop is the sole owner; each link is freed once.
            unsafe { drop(Box::from_raw(next)) };
        }
    }
}

/// A wait-free set of weakly-held members.
///
/// Emplacement probes the existing slots and atomically appends a new,
/// twice-as-large block when every slot is busy or occupied; existing
/// members never move. Iteration skips expired slots and yields a
/// strong [`Arc`] per live member, so a member observed by an iterator
/// stays alive at least until the iterator moves on.
///
/// Like [`Slot`], the pool holds members weakly: the `Arc` returned by
/// [`emplace`](Self::emplace) is the sole strong owner, and dropping it
/// vacates the member's slot for reuse.
///
/// # Example
///
/// ```
/// use trellis_coop::Pool;
///
/// let pool = Pool::new();
/// let a = pool.emplace("a".to_string());
/// let b = pool.emplace("b".to_string());
///
/// let mut seen: Vec<String> = pool.iter().map(|s| (*s).clone()).collect();
/// seen.sort();
/// assert_eq!(seen, ["a", "b"]);
///
/// drop(a);
/// assert_eq!(pool.iter().count(), 1);
/// drop(b);
/// assert_eq!(pool.iter().count(), 0);
/// ```
pub struct Pool<T> {
    first: Block<T>,
}

impl<T> Pool<T> {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Pool<T> {
        Pool {
            first: Block::with_capacity(FIRST_BLOCK),
        }
    }

    /// Places `value` into a vacant slot, growing the pool if needed.
    /// Returns the sole strong owner.
    pub fn emplace(&self, value: T) -> Arc<T> {
        let mut value = value;
        let mut block = &self.first;
        loop {
            for slot in block.slots.iter() {
                match slot.try_emplace(value) {
                    Ok(owner) => return owner,
                    Err(rejected) => value = rejected,
                }
            }
            block = block.more();
        }
    }

    /// Iterates the live members.
    #[must_use]
    pub fn iter(&self) -> PoolIter<'_, T> {
        PoolIter {
            block: Some(&self.first),
            index: 0,
        }
    }

    /// Counts the live members. A snapshot, like any concurrent size.
    #[must_use]
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Returns `true` if no member is currently alive.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

impl<T> Default for Pool<T> {
    fn default() -> Self {
        Pool::new()
    }
}

impl<'a, T> IntoIterator for &'a Pool<T> {
    type Item = Arc<T>;
    type IntoIter = PoolIter<'a, T>;

    fn into_iter(self) -> PoolIter<'a, T> {
        self.iter()
    }
}

/// Iterator over the live members of a [`Pool`].
pub struct PoolIter<'a, T> {
    block: Option<&'a Block<T>>,
    index: usize,
}

impl<T> Iterator for PoolIter<'_, T> {
    type Item = Arc<T>;

    fn next(&mut self) -> Option<Arc<T>> {
        loop {
            let block = self.block?;
            if self.index >= block.slots.len() {
                self.block = block.next();
                self.index = 0;
                continue;
            }
            let slot = &block.slots[self.index];
            self.index += 1;
            if let Some(member) = slot.lock() {
                return Some(member);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emplace_and_iterate() {
        let pool = Pool::new();
        let handles: Vec<Arc<i32>> = (0..4).map(|i| pool.emplace(i)).collect();
        let mut seen: Vec<i32> = pool.iter().map(|v| *v).collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3]);
        drop(handles);
        assert!(pool.is_empty());
    }

    #[test]
    fn growth_past_first_block() {
        let pool = Pool::new();
        let handles: Vec<Arc<usize>> = (0..50).map(|i| pool.emplace(i)).collect();
        assert_eq!(pool.len(), 50);

        // Earlier handles stay valid after growth.
        assert_eq!(*handles[0], 0);
        assert_eq!(*handles[49], 49);
    }

    #[test]
    fn expired_slots_are_reused() {
        let pool = Pool::new();
        for i in 0..100 {
            // Dropped immediately; the pool should not grow.
            drop(pool.emplace(i));
        }
        assert!(pool.is_empty());
        assert_eq!(pool.first.slots.len(), FIRST_BLOCK);
        assert!(pool.first.next().is_none());
    }

    #[test]
    fn iterator_keeps_member_alive() {
        let pool = Pool::new();
        let handle = pool.emplace(String::from("pinned"));
        let mut iter = pool.iter();
        let snapshot = iter.next().expect("one member");
        drop(handle);
        // The iterator's Arc still owns the member.
        assert_eq!(*snapshot, "pinned");
        assert!(iter.next().is_none());
    }

    #[test]
    fn concurrent_emplace() {
        let pool = Pool::new();
        let mut all = Vec::new();
        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|t| {
                    let pool = &pool;
                    scope.spawn(move || {
                        (0..100).map(|i| pool.emplace(t * 1000 + i)).collect::<Vec<_>>()
                    })
                })
                .collect();
            for h in handles {
                all.extend(h.join().expect("no panics"));
            }
        });
        assert_eq!(pool.len(), 800);
        let mut seen: Vec<i32> = pool.iter().map(|v| *v).collect();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 800);
    }

    #[test]
    fn concurrent_emplace_and_drop() {
        let pool = Pool::new();
        std::thread::scope(|scope| {
            for _ in 0..4 {
                let pool = &pool;
                scope.spawn(move || {
                    for i in 0..500 {
                        let h = pool.emplace(i);
                        let _ = pool.iter().count();
                        drop(h);
                    }
                });
            }
        });
        assert!(pool.is_empty());
    }
}
