use crossbeam_epoch::{self as epoch, Atomic, Guard};
use std::sync::atomic::Ordering;
use tracing::debug;

use crate::config::{MAX_CAPACITY, MIN_CAPACITY, MapConfig};
use crate::error::{Error, Result};
use crate::generation::Generation;
use crate::probe::Upsert;
use crate::slot::{ABSENT, SlotState, is_presentable};

/// A lock-free map from positive `i32` keys to positive `i32` values.
///
/// All operations may be called concurrently through a shared reference. When a generation runs
/// out of room, the thread that notices links a successor of twice the capacity and every
/// thread that touches a slot being moved helps finish the move, so no operation ever waits on
/// another.
///
/// Values are restricted to `1..i32::MAX`; [`i32::MAX`] is reserved to mark removed keys and
/// `0` is what reads return for an absent key.
pub struct IntIntMap {
    /// Oldest generation that still matters; later ones are reached through `next`
    root: Atomic<Generation>,
}

impl IntIntMap {
    /// Creates an empty map with capacity 2 and a probe budget of 8
    #[must_use]
    pub fn new() -> Self {
        Self::from_generation(Generation::new(MIN_CAPACITY, MapConfig::default().max_probes()))
    }

    /// Creates an empty map with room for at least `capacity` keys before the first migration
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        // Ensure capacity is a power of 2 within the supported range
        let capacity = capacity.clamp(MIN_CAPACITY, MAX_CAPACITY).next_power_of_two();
        Self::from_generation(Generation::new(capacity, MapConfig::default().max_probes()))
    }

    /// Creates an empty map from an explicit configuration
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the configuration does not validate.
    pub fn with_config(config: MapConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_generation(Generation::new(config.initial_capacity(), config.max_probes())))
    }

    /// Wraps a first generation
    fn from_generation(generation: Generation) -> Self {
        Self { root: Atomic::new(generation) }
    }

    /// Current root generation
    fn root<'g>(&self, guard: &'g Guard) -> &'g Generation {
        // SAFETY: the root is never null, and the generation it points to is only retired after
        // the root has moved on, which defers its destruction past `guard`.
        unsafe { self.root.load(Ordering::SeqCst, guard).deref() }
    }

    /// Returns the value stored for `key`, or `0` if the key is absent
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `key` is not positive.
    pub fn get(&self, key: i32) -> Result<i32> {
        check_key(key)?;
        let guard = epoch::pin();
        Ok(self.root(&guard).lookup(key, &guard))
    }

    /// Returns true if `key` currently has a value
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `key` is not positive.
    pub fn contains_key(&self, key: i32) -> Result<bool> {
        Ok(self.get(key)? != ABSENT)
    }

    /// Stores `value` for `key` and returns the value it replaced, or `0`
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `key` is not positive, or if `value` is not
    /// positive or equals the reserved [`i32::MAX`].
    pub fn put(&self, key: i32, value: i32) -> Result<i32> {
        check_key(key)?;
        if !is_presentable(value) {
            return Err(Error::invalid_argument(format!("invalid value: {value}")));
        }
        Ok(self.upsert(key, SlotState::Present(value)))
    }

    /// Removes `key` and returns the value it had, or `0`
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `key` is not positive.
    pub fn remove(&self, key: i32) -> Result<i32> {
        check_key(key)?;
        Ok(self.upsert(key, SlotState::Tombstone))
    }

    /// Capacity of the root generation
    #[must_use]
    pub fn capacity(&self) -> usize {
        let guard = epoch::pin();
        self.root(&guard).capacity()
    }

    /// Retries an upsert from the root until it lands, migrating full generations on the way
    fn upsert(&self, key: i32, target: SlotState) -> i32 {
        let guard = epoch::pin();
        loop {
            match self.root(&guard).upsert(key, target, &guard) {
                Upsert::Replaced(prior) => return prior,
                Upsert::NeedsMigration(full) => {
                    full.migrate(&guard);
                    self.advance_root(&guard);
                }
            }
        }
    }

    /// Moves the root past every generation that has a successor, draining each first
    fn advance_root(&self, guard: &Guard) {
        let mut current = self.root.load(Ordering::SeqCst, guard);
        loop {
            // SAFETY: the root is never null and `guard` keeps whatever it held alive.
            let table = unsafe { current.deref() };
            let next = table.next.load(Ordering::SeqCst, guard);
            if next.is_null() {
                return;
            }
            table.drain(guard);
            match self.root.compare_exchange(current, next, Ordering::SeqCst, Ordering::SeqCst, guard)
            {
                Ok(_) => {
                    debug!(from = table.capacity(), "advanced root generation");
                    // SAFETY: the old root is unreachable from the map now; threads still
                    // holding it are pinned and its destruction waits for them.
                    unsafe { guard.defer_destroy(current) };
                    current = next;
                }
                Err(lost) => current = lost.current,
            }
        }
    }
}

/// Rejects keys outside `1..=i32::MAX`
fn check_key(key: i32) -> Result<()> {
    if key > 0 { Ok(()) } else { Err(Error::invalid_argument(format!("key must be positive: {key}"))) }
}

impl Default for IntIntMap {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for IntIntMap {
    fn drop(&mut self) {
        // SAFETY: `&mut self` means no other thread can reach these generations any more.
        // Generations older than the root were already handed to the collector.
        unsafe {
            let guard = epoch::unprotected();
            let mut current = self.root.load(Ordering::Relaxed, guard);
            while !current.is_null() {
                let next = current.deref().next.load(Ordering::Relaxed, guard);
                drop(current.into_owned());
                current = next;
            }
        }
    }
}

#[allow(clippy::missing_fields_in_debug)]
impl std::fmt::Debug for IntIntMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntIntMap").field("capacity", &self.capacity()).finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_put_get_remove() {
        let map = IntIntMap::new();
        assert_eq!(map.put(5, 10).unwrap(), 0);
        assert_eq!(map.put(5, 20).unwrap(), 10);
        assert_eq!(map.get(5).unwrap(), 20);
        assert!(map.contains_key(5).unwrap());
        assert_eq!(map.remove(5).unwrap(), 20);
        assert_eq!(map.get(5).unwrap(), 0);
        assert!(!map.contains_key(5).unwrap());
        assert_eq!(map.remove(5).unwrap(), 0);
    }

    #[test]
    fn test_remove_of_absent_key_does_not_grow() {
        let map = IntIntMap::new();
        for key in 1..100 {
            assert_eq!(map.remove(key).unwrap(), 0);
        }
        assert_eq!(map.capacity(), 2);
    }

    #[test]
    fn test_rejects_invalid_arguments() {
        let map = IntIntMap::new();
        assert!(map.put(1, i32::MAX).unwrap_err().is_invalid_argument());
        assert!(map.put(1, 0).unwrap_err().is_invalid_argument());
        assert!(map.put(1, -4).unwrap_err().is_invalid_argument());
        assert!(map.put(0, 1).unwrap_err().is_invalid_argument());
        assert!(map.get(-1).unwrap_err().is_invalid_argument());
        assert!(map.remove(i32::MIN).unwrap_err().is_invalid_argument());

        // Boundary values are fine.
        assert_eq!(map.put(i32::MAX, i32::MAX - 1).unwrap(), 0);
        assert_eq!(map.get(i32::MAX).unwrap(), i32::MAX - 1);
        assert_eq!(map.get(1).unwrap(), 0);
    }

    #[test]
    fn test_with_config() {
        let map = IntIntMap::with_config(MapConfig::new().with_initial_capacity(64)).unwrap();
        assert_eq!(map.capacity(), 64);

        let err = IntIntMap::with_config(MapConfig::new().with_initial_capacity(48)).unwrap_err();
        assert!(err.is_invalid_argument());
        let err = IntIntMap::with_config(MapConfig::new().with_max_probes(0)).unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn test_with_capacity_rounds_up() {
        assert_eq!(IntIntMap::with_capacity(0).capacity(), 2);
        assert_eq!(IntIntMap::with_capacity(100).capacity(), 128);
        assert_eq!(IntIntMap::with_capacity(256).capacity(), 256);
    }

    #[test]
    fn test_growth_keeps_every_key() {
        let map = IntIntMap::new();
        let mut capacities = vec![map.capacity()];
        for key in 1..=2000 {
            assert_eq!(map.put(key, key + 1).unwrap(), 0);
            let capacity = map.capacity();
            if capacity != *capacities.last().unwrap() {
                capacities.push(capacity);
            }
        }
        assert!(capacities.iter().all(|capacity| capacity.is_power_of_two()));
        assert!(capacities.windows(2).all(|pair| pair[0] < pair[1]), "{capacities:?}");
        assert!(map.capacity() >= 2048 / 8);

        for key in 1..=2000 {
            assert_eq!(map.get(key).unwrap(), key + 1, "key {key} lost");
        }
        for key in (1..=2000).step_by(2) {
            assert_eq!(map.remove(key).unwrap(), key + 1);
        }
        for key in 1..=2000 {
            let expected = if key % 2 == 1 { 0 } else { key + 1 };
            assert_eq!(map.get(key).unwrap(), expected);
        }
    }

    #[test]
    fn test_removed_keys_stay_removed_across_migrations() {
        let map = IntIntMap::new();
        map.put(7, 70).unwrap();
        map.remove(7).unwrap();
        for key in 100..600 {
            map.put(key, 1).unwrap();
        }
        assert_eq!(map.get(7).unwrap(), 0);
        assert_eq!(map.put(7, 71).unwrap(), 0);
        assert_eq!(map.get(7).unwrap(), 71);
    }

    #[test]
    fn test_concurrent_disjoint_inserts() {
        let map = Arc::new(IntIntMap::new());
        let mut handles = vec![];

        for t in 0..4 {
            let map_clone = Arc::clone(&map);
            handles.push(thread::spawn(move || {
                for i in 1..=500 {
                    let key = t * 1000 + i;
                    assert_eq!(map_clone.put(key, key).unwrap(), 0);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        for t in 0..4 {
            for i in 1..=500 {
                let key = t * 1000 + i;
                assert_eq!(map.get(key).unwrap(), key, "key {key} lost");
            }
        }
    }

    #[test]
    fn test_concurrent_puts_on_one_key_agree() {
        let map = Arc::new(IntIntMap::new());
        let mut handles = vec![];

        for t in 0..4 {
            let map_clone = Arc::clone(&map);
            handles.push(thread::spawn(move || {
                let mut priors = Vec::new();
                for i in 1..=200 {
                    priors.push(map_clone.put(9, t * 1000 + i).unwrap());
                    // Unrelated keys force migrations underneath the contended key.
                    map_clone.put(10_000 + t * 1000 + i, 1).unwrap();
                }
                priors
            }));
        }
        let mut priors: Vec<i32> =
            handles.into_iter().flat_map(|handle| handle.join().unwrap()).collect();

        let last = map.get(9).unwrap();
        assert_eq!(priors.iter().filter(|&&prior| prior == 0).count(), 1);
        assert!(!priors.contains(&last));
        priors.sort_unstable();
        assert!(priors.windows(2).all(|pair| pair[0] != pair[1]), "a value was replaced twice");
    }

    #[test]
    fn test_reader_never_goes_backward() {
        let map = Arc::new(IntIntMap::new());
        let writer = {
            let map = Arc::clone(&map);
            thread::spawn(move || {
                for value in 1..=3000 {
                    map.put(1, value).unwrap();
                    map.put(value + 1, value).unwrap();
                }
            })
        };
        let reader = {
            let map = Arc::clone(&map);
            thread::spawn(move || {
                let mut last = 0;
                while last < 3000 {
                    let seen = map.get(1).unwrap();
                    assert!(seen >= last, "read {seen} after {last}");
                    last = seen;
                }
            })
        };
        writer.join().unwrap();
        reader.join().unwrap();
    }

    #[test]
    fn test_debug_reports_capacity() {
        let map = IntIntMap::with_capacity(16);
        assert_eq!(format!("{map:?}"), "IntIntMap { capacity: 16, .. }");
    }

    /// One step of the model test
    #[derive(Debug, Clone)]
    enum Op {
        /// Put
        Put(i32, i32),
        /// Remove
        Remove(i32),
        /// Get
        Get(i32),
    }

    /// Operations on a small key space so keys collide and get reused
    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1..64_i32, 1..1000_i32).prop_map(|(key, value)| Op::Put(key, value)),
            (1..64_i32).prop_map(Op::Remove),
            (1..64_i32).prop_map(Op::Get),
        ]
    }

    proptest! {
        #[test]
        fn test_matches_std_hashmap(ops in prop::collection::vec(op(), 1..400)) {
            let map = IntIntMap::new();
            let mut model = HashMap::new();
            for op in ops {
                match op {
                    Op::Put(key, value) => {
                        prop_assert_eq!(map.put(key, value).unwrap(), model.insert(key, value).unwrap_or(0));
                    }
                    Op::Remove(key) => {
                        prop_assert_eq!(map.remove(key).unwrap(), model.remove(&key).unwrap_or(0));
                    }
                    Op::Get(key) => {
                        prop_assert_eq!(map.get(key).unwrap(), model.get(&key).copied().unwrap_or(0));
                    }
                }
            }
        }
    }
}
