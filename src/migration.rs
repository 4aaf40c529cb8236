//! Copying a generation into its successor.
//!
//! Any thread may drain a generation and any thread that meets a frozen slot helps it along,
//! so a migration started by a thread that then stalls is still finished by everybody else.

use crossbeam_epoch::Guard;
use std::sync::atomic::Ordering;

use crate::generation::Generation;
use crate::slot::{Slot, SlotState};

impl Generation {
    /// Links a successor, drains this generation into it and returns the successor
    pub(crate) fn migrate<'g>(&'g self, guard: &'g Guard) -> &'g Self {
        let next = self.install_next(guard);
        self.drain(guard);
        next
    }

    /// Freezes and helps every slot; a no-op once some thread has finished draining
    pub(crate) fn drain(&self, guard: &Guard) {
        if self.drained.load(Ordering::SeqCst) {
            return;
        }
        for slot in self.slots() {
            let mut current = slot.value.load();
            while let Some(frozen) = current.frozen() {
                match slot.value.compare_exchange(current, frozen) {
                    Ok(()) => break,
                    Err(actual) => current = actual,
                }
            }
            self.help(slot, guard);
        }
        self.drained.store(true, Ordering::SeqCst);
    }

    /// Finishes moving a frozen slot into the successor and marks it done.
    ///
    /// Idempotent: every helper copies the same frozen value, and only an empty destination
    /// accepts it.
    pub(crate) fn help(&self, slot: &Slot, guard: &Guard) {
        if let SlotState::Frozen(value) = slot.value.load() {
            if let Some(next) = self.next(guard) {
                next.transfer(slot.key(), value, guard);
            }
            slot.value.store(SlotState::Done);
        }
    }

    /// Publishes a migrated value for `key` in this generation or, if it cannot take it here,
    /// in the first successor that can
    fn transfer(&self, key: i32, value: i32, guard: &Guard) {
        let mut table = self;
        'chain: loop {
            let Some(slot) = table.probe_or_claim(key) else {
                // The key can never appear in this table; grow it and carry on.
                table = table.install_next(guard);
                continue 'chain;
            };
            let mut current = slot.value.load();
            loop {
                match current {
                    SlotState::Empty => {
                        match slot.value.compare_exchange(current, SlotState::Present(value)) {
                            Ok(()) => return,
                            Err(actual) => current = actual,
                        }
                    }
                    // Nothing was published here before the table was migrated.
                    SlotState::Sealed => match table.next(guard) {
                        Some(next) => {
                            table = next;
                            continue 'chain;
                        }
                        None => return,
                    },
                    // Another helper landed this value, or a newer write replaced it.
                    SlotState::Present(_)
                    | SlotState::Tombstone
                    | SlotState::Frozen(_)
                    | SlotState::Done => return,
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;
    use crate::generation::tests::{free_chain, key_with_home};
    use crate::generation::Probe;
    use crate::probe::Upsert;

    /// Value cell of `key` in `generation`
    fn state_of(generation: &Generation, key: i32) -> Option<SlotState> {
        match generation.probe(key) {
            Probe::Hit(slot) => Some(slot.value.load()),
            Probe::Vacant(_) | Probe::Exhausted => None,
        }
    }

    #[test]
    fn test_drain_moves_live_values_and_drops_tombstones() {
        let generation = Generation::new(8, 8);
        let guard = crossbeam_epoch::pin();
        for key in 1..=4 {
            let _prior = generation.upsert(key, SlotState::Present(key * 10), &guard);
        }
        let _prior = generation.upsert(2, SlotState::Tombstone, &guard);

        let next = generation.migrate(&guard);
        assert_eq!(next.capacity(), 16);
        assert!(generation.drained.load(Ordering::SeqCst));

        for key in [1, 3, 4] {
            assert_eq!(state_of(&generation, key), Some(SlotState::Done));
            assert_eq!(state_of(next, key), Some(SlotState::Present(key * 10)));
        }
        assert_eq!(state_of(&generation, 2), Some(SlotState::Done));
        assert_eq!(state_of(next, 2), None, "removed keys are not carried forward");
        assert!(generation.slots().all(|slot| slot.value.load().is_migrated()));

        drop(guard);
        free_chain(generation);
    }

    #[test]
    fn test_drain_seals_unclaimed_slots() {
        let generation = Generation::new(4, 8);
        let guard = crossbeam_epoch::pin();
        let _next = generation.migrate(&guard);
        assert!(generation.slots().all(|slot| slot.value.load() == SlotState::Sealed));

        // A writer that claims a sealed slot afterwards is sent on to the successor.
        assert!(matches!(
            generation.upsert(6, SlotState::Present(60), &guard),
            Upsert::Replaced(0)
        ));
        assert_eq!(generation.lookup(6, &guard), 60);

        drop(guard);
        free_chain(generation);
    }

    #[test]
    fn test_help_is_idempotent() {
        let generation = Generation::new(4, 8);
        let guard = crossbeam_epoch::pin();
        let _prior = generation.upsert(11, SlotState::Present(5), &guard);
        let next = generation.install_next(&guard);
        let Probe::Hit(slot) = generation.probe(11) else { panic!("key 11 not found") };
        assert!(slot.value.compare_exchange(SlotState::Present(5), SlotState::Frozen(5)).is_ok());

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    let guard = crossbeam_epoch::pin();
                    generation.help(slot, &guard);
                });
            }
        });
        generation.help(slot, &guard);

        assert_eq!(slot.value.load(), SlotState::Done);
        assert_eq!(state_of(next, 11), Some(SlotState::Present(5)));
        assert_eq!(next.slots().filter(|slot| slot.key() == 11).count(), 1);

        drop(guard);
        free_chain(generation);
    }

    #[test]
    fn test_stale_transfer_does_not_resurrect_removed_key() {
        let generation = Generation::new(4, 8);
        let guard = crossbeam_epoch::pin();
        let next = generation.install_next(&guard);

        // First helper lands the value, then the key is removed and the successor migrates.
        next.transfer(21, 4, &guard);
        let _prior = next.upsert(21, SlotState::Tombstone, &guard);
        let newest = next.migrate(&guard);
        assert_eq!(state_of(next, 21), Some(SlotState::Done));

        // A helper that read the frozen value long ago finally runs.
        next.transfer(21, 4, &guard);
        assert_eq!(next.lookup(21, &guard), 0);
        assert_eq!(newest.lookup(21, &guard), 0);
        assert_eq!(state_of(newest, 21), None);

        drop(guard);
        free_chain(generation);
    }

    #[test]
    fn test_transfer_passes_sealed_destination() {
        let generation = Generation::new(4, 8);
        let guard = crossbeam_epoch::pin();
        let next = generation.install_next(&guard);
        assert!(next.probe_or_claim(31).is_some());
        let newest = next.migrate(&guard);
        assert_eq!(state_of(next, 31), Some(SlotState::Sealed));

        next.transfer(31, 9, &guard);
        assert_eq!(state_of(newest, 31), Some(SlotState::Present(9)));
        assert_eq!(next.lookup(31, &guard), 9);

        drop(guard);
        free_chain(generation);
    }

    #[test]
    fn test_transfer_grows_a_full_destination() {
        let generation = Generation::new(2, 2);
        let guard = crossbeam_epoch::pin();
        let next = generation.install_next(&guard);

        // Fill every slot the probe for `late` can reach in the destination.
        let home = next.index(1);
        let late = key_with_home(next, home, 2);
        let blockers = [
            key_with_home(next, home, late + 1),
            key_with_home(next, home.checked_sub(1).unwrap_or(next.capacity() - 1), late + 1),
        ];
        for blocker in blockers {
            let _prior = next.upsert(blocker, SlotState::Present(1), &guard);
        }
        assert!(next.probe_or_claim(late).is_none());

        next.transfer(late, 77, &guard);
        let newest = next.next(&guard).expect("destination should have grown");
        assert_eq!(newest.capacity(), 8);
        assert_eq!(next.lookup(late, &guard), 77);
        assert_eq!(newest.lookup(late, &guard), 77);

        drop(guard);
        free_chain(generation);
    }
}
