//! A thread-safe map keyed by an auto-assigned, monotonically increasing
//! 64-bit id, with snapshot iteration (§4.1).
//!
//! Used for both the Hub's client registry and each Region's client
//! registry — the two share the same keyspace since client ids are
//! process-unique, minted once by the Hub on connection registration.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// A concurrent container of `V`s keyed by an auto-assigned `u64`.
///
/// All operations take the internal mutex for the duration of the map
/// mutation only; [`KeyedMap::for_each`] clones the key→value map under the
/// lock, releases it, and only then invokes the callback, so callbacks must
/// never themselves try to reacquire this map's lock or they'll deadlock
/// against a concurrent mutator — they just won't see entries added after
/// the snapshot was taken.
pub struct KeyedMap<V> {
    next_id: AtomicU64,
    entries: Mutex<HashMap<u64, V>>,
}

impl<V> Default for KeyedMap<V> {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<V: Clone> KeyedMap<V> {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `value` under `id`, or a freshly minted id if `id` is `None`.
    /// Returns the id the value was stored under.
    pub fn add(&self, value: V, id: Option<u64>) -> u64 {
        let id = id.unwrap_or_else(|| self.reserve_id());
        self.entries.lock().unwrap().insert(id, value);
        id
    }

    /// Mints the next id without storing anything under it yet, for callers
    /// that need to know their id before they can construct the value that
    /// will eventually be stored under it (e.g. a value that embeds its own
    /// id for logging).
    pub fn reserve_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Removes and returns the value previously stored under `id`, if any.
    pub fn remove(&self, id: u64) -> Option<V> {
        self.entries.lock().unwrap().remove(&id)
    }

    /// Returns a clone of the value stored under `id`, if any.
    pub fn get(&self, id: u64) -> Option<V> {
        self.entries.lock().unwrap().get(&id).cloned()
    }

    /// Number of entries currently stored.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Whether the map is currently empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invokes `f` once per `(id, value)` pair, over a point-in-time snapshot
    /// taken under the lock.
    pub fn for_each(&self, mut f: impl FnMut(u64, &V)) {
        let snapshot = self.entries.lock().unwrap().clone();
        for (id, value) in snapshot.iter() {
            f(*id, value);
        }
    }

    /// Like [`KeyedMap::for_each`], but `f` can return `false` to stop the
    /// iteration early.
    pub fn for_each_with_break(&self, mut f: impl FnMut(u64, &V) -> bool) {
        let snapshot = self.entries.lock().unwrap().clone();
        for (id, value) in snapshot.iter() {
            if !f(*id, value) {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_without_id_mints_increasing_ids() {
        let map: KeyedMap<&str> = KeyedMap::new();
        let a = map.add("a", None);
        let b = map.add("b", None);
        let c = map.add("c", None);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn add_with_explicit_id_is_honored() {
        let map: KeyedMap<&str> = KeyedMap::new();
        let id = map.add("x", Some(42));
        assert_eq!(id, 42);
        assert_eq!(map.get(42), Some("x"));
    }

    #[test]
    fn remove_then_get_returns_none() {
        let map: KeyedMap<i32> = KeyedMap::new();
        let id = map.add(5, None);
        assert_eq!(map.remove(id), Some(5));
        assert_eq!(map.get(id), None);
    }

    #[test]
    fn for_each_sees_a_consistent_snapshot() {
        let map: KeyedMap<i32> = KeyedMap::new();
        map.add(1, None);
        map.add(2, None);
        map.add(3, None);
        let mut seen = Vec::new();
        map.for_each(|id, v| seen.push((id, *v)));
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn for_each_with_break_stops_early() {
        let map: KeyedMap<i32> = KeyedMap::new();
        for _ in 0..10 {
            map.add(1, None);
        }
        let mut count = 0;
        map.for_each_with_break(|_, _| {
            count += 1;
            count < 3
        });
        assert_eq!(count, 3);
    }
}
