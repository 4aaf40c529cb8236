//! Lookup and upsert against a chain of generations.
//!
//! Both operations start at one generation and walk `next` links whenever they meet a slot
//! that migration has already reached, helping frozen slots along on the way.

use crossbeam_epoch::Guard;

use crate::generation::{Generation, Probe};
use crate::slot::{ABSENT, SlotState};

/// Outcome of [`Generation::upsert`]
#[derive(Debug)]
pub(crate) enum Upsert<'g> {
    /// The write took effect; carries the public value it replaced
    Replaced(i32),
    /// This generation is out of room and has no successor yet
    NeedsMigration(&'g Generation),
}

impl Generation {
    /// Current public value of `key`, or [`ABSENT`]
    pub(crate) fn lookup<'g>(&'g self, key: i32, guard: &'g Guard) -> i32 {
        let mut table = self;
        loop {
            let migrated = match table.probe(key) {
                Probe::Hit(slot) => match slot.value.load() {
                    state @ (SlotState::Empty | SlotState::Present(_) | SlotState::Tombstone) => {
                        return state.public_value();
                    }
                    SlotState::Frozen(_) => {
                        table.help(slot, guard);
                        true
                    }
                    SlotState::Sealed | SlotState::Done => true,
                },
                // A drained table's vacant slots are sealed; the key may live further on.
                Probe::Vacant(slot) => slot.value.load().is_migrated(),
                Probe::Exhausted => true,
            };
            match table.next(guard) {
                Some(next) if migrated => table = next,
                _ => return ABSENT,
            }
        }
    }

    /// Writes `target` for `key`, which is `Present(v)` for a put and `Tombstone` for a remove.
    ///
    /// The returned prior value is the one the winning compare-and-set replaced.
    pub(crate) fn upsert<'g>(&'g self, key: i32, target: SlotState, guard: &'g Guard) -> Upsert<'g> {
        let removing = target == SlotState::Tombstone;
        let mut table = self;
        'chain: loop {
            let slot = if removing {
                match table.probe(key) {
                    Probe::Hit(slot) => Some(slot),
                    Probe::Vacant(slot) if !slot.value.load().is_migrated() => {
                        return Upsert::Replaced(ABSENT);
                    }
                    Probe::Vacant(_) | Probe::Exhausted => None,
                }
            } else {
                table.probe_or_claim(key)
            };
            let Some(slot) = slot else {
                match table.next(guard) {
                    Some(next) => {
                        table = next;
                        continue 'chain;
                    }
                    None if removing => return Upsert::Replaced(ABSENT),
                    None => return Upsert::NeedsMigration(table),
                }
            };

            let mut current = slot.value.load();
            loop {
                match current {
                    SlotState::Empty | SlotState::Tombstone if removing => {
                        return Upsert::Replaced(ABSENT);
                    }
                    SlotState::Empty | SlotState::Present(_) | SlotState::Tombstone => {
                        match slot.value.compare_exchange(current, target) {
                            Ok(()) => return Upsert::Replaced(current.public_value()),
                            Err(actual) => current = actual,
                        }
                    }
                    SlotState::Frozen(_) | SlotState::Sealed | SlotState::Done => {
                        table.help(slot, guard);
                        match table.next(guard) {
                            Some(next) => {
                                table = next;
                                continue 'chain;
                            }
                            None => return Upsert::NeedsMigration(table),
                        }
                    }
                }
            }
        }
    }
}
