//! Weak-valued concurrent map.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

/// A map from keys to weakly-held values, guarded by a reader/writer
/// lock.
///
/// Values are stored as [`Weak`] references and expire when the last
/// outside owner drops them; lookups upgrade on the fly and simply miss
/// expired entries. This is the one blocking structure in the
/// cooperative family. The lock is held briefly, in read mode for
/// lookups and visits, in write mode for insertion.
///
/// String-keyed tables support `&str` lookups through [`Borrow`], so no
/// allocation is needed to probe.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use trellis_coop::WeakTable;
///
/// let table: WeakTable<String, i32> = WeakTable::new();
/// let value = table.find_or_create("answer".to_string(), || Arc::new(42));
/// assert_eq!(table.find("answer").as_deref(), Some(&42));
///
/// drop(value);
/// assert!(table.find("answer").is_none());
/// ```
pub struct WeakTable<K, V: ?Sized> {
    map: RwLock<HashMap<K, Weak<V>>>,
}

impl<K: Eq + Hash, V: ?Sized> WeakTable<K, V> {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> WeakTable<K, V> {
        WeakTable {
            map: RwLock::new(HashMap::new()),
        }
    }

    /// Looks up a live value.
    #[must_use]
    pub fn find<Q>(&self, key: &Q) -> Option<Arc<V>>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.map.read().get(key).and_then(Weak::upgrade)
    }

    /// Installs a weak reference under `key`, replacing any previous
    /// entry.
    pub fn set(&self, key: K, value: Weak<V>) {
        self.map.write().insert(key, value);
    }

    /// Removes the entry under `key`, live or expired. Returns `true`
    /// if an entry existed.
    pub fn remove<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.map.write().remove(key).is_some()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.map.write().clear();
    }

    /// Returns the live value under `key`, creating and installing one
    /// with `make` if the entry is missing or expired.
    ///
    /// Double-checked: the fast path takes the read lock only; `make`
    /// runs under the write lock, after the entry is confirmed dead.
    pub fn find_or_create(&self, key: K, make: impl FnOnce() -> Arc<V>) -> Arc<V> {
        if let Some(existing) = self.find(&key) {
            return existing;
        }
        let mut map = self.map.write();
        if let Some(existing) = map.get(&key).and_then(Weak::upgrade) {
            return existing;
        }
        let created = make();
        map.insert(key, Arc::downgrade(&created));
        created
    }

    /// Installs a strong reference under `key` unless a live entry is
    /// already there. Returns `true` on success.
    ///
    /// Only a weak reference is retained; the caller's `Arc` remains
    /// the owner.
    pub fn try_insert(&self, key: K, value: &Arc<V>) -> bool {
        let mut map = self.map.write();
        match map.get(&key) {
            Some(existing) if existing.strong_count() > 0 => false,
            _ => {
                map.insert(key, Arc::downgrade(value));
                true
            }
        }
    }

    /// Visits every live entry under the read lock.
    ///
    /// The callback must not mutate this table; doing so deadlocks.
    pub fn visit(&self, mut callback: impl FnMut(&K, &Arc<V>)) {
        for (key, weak) in self.map.read().iter() {
            if let Some(value) = weak.upgrade() {
                callback(key, &value);
            }
        }
    }

    /// Counts live entries. A snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map
            .read()
            .values()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    /// Returns `true` if no live entry exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Eq + Hash, V: ?Sized> Default for WeakTable<K, V> {
    fn default() -> Self {
        WeakTable::new()
    }
}
