//! One fixed-capacity version of the table.
//!
//! A generation never grows. When it runs out of room a successor of twice the capacity is
//! linked through `next`, and the live contents are copied over by [`crate::migration`].

use crossbeam_epoch::{Atomic, Guard, Owned, Shared};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

use crate::config::MAX_CAPACITY;
use crate::slot::{EMPTY_KEY, Slot};

/// Golden-ratio multiplier for Fibonacci hashing
const MAGIC: u32 = 0x9E37_79B9;

/// Outcome of a non-claiming probe
#[derive(Debug)]
pub(crate) enum Probe<'a> {
    /// The slot already holds the key
    Hit(&'a Slot),
    /// The first unclaimed slot in the key's probe sequence
    Vacant(&'a Slot),
    /// The probe budget ran out on slots owned by other keys
    Exhausted,
}

/// A fixed array of slots plus the forward link to its successor
pub(crate) struct Generation {
    /// Key/value slots, `capacity` of them
    slots: Box<[Slot]>,
    /// Right shift turning a 32-bit hash into a slot index
    shift: u32,
    /// Number of slots inspected before reporting capacity pressure
    max_probes: usize,
    /// Successor generation; written at most once
    pub(crate) next: Atomic<Generation>,
    /// Set once every slot has been frozen and helped
    pub(crate) drained: AtomicBool,
}

impl Generation {
    /// Creates an empty generation; `capacity` must be a power of two of at least 2
    pub(crate) fn new(capacity: usize, max_probes: usize) -> Self {
        debug_assert!(capacity.is_power_of_two() && capacity >= 2, "bad capacity {capacity}");
        let slots: Box<[Slot]> = (0..capacity).map(|_| Slot::new()).collect();
        Self {
            slots,
            shift: 32_u32.saturating_sub(capacity.trailing_zeros()),
            max_probes,
            next: Atomic::null(),
            drained: AtomicBool::new(false),
        }
    }

    /// Number of slots
    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Home slot of `key`
    #[allow(clippy::cast_sign_loss)]
    pub(crate) fn index(&self, key: i32) -> usize {
        ((key as u32).wrapping_mul(MAGIC) >> self.shift) as usize
    }

    /// Slot positions visited for `key`, walking backward from its home and wrapping
    fn probe_sequence(&self, key: i32) -> impl Iterator<Item = &Slot> {
        let last = self.capacity().saturating_sub(1);
        let mut index = self.index(key);
        (0..self.max_probes).filter_map(move |_| {
            let slot = self.slots.get(index);
            index = index.checked_sub(1).unwrap_or(last);
            slot
        })
    }

    /// Finds the slot holding `key` without claiming anything
    pub(crate) fn probe(&self, key: i32) -> Probe<'_> {
        for slot in self.probe_sequence(key) {
            match slot.key() {
                found if found == key => return Probe::Hit(slot),
                EMPTY_KEY => return Probe::Vacant(slot),
                _ => {}
            }
        }
        Probe::Exhausted
    }

    /// Finds the slot holding `key`, claiming the first empty key cell on the way.
    ///
    /// Returns `None` when the probe budget runs out. Two threads claiming the same key
    /// converge on one slot: the loser of the claim sees the winner's key in the same cell.
    pub(crate) fn probe_or_claim(&self, key: i32) -> Option<&Slot> {
        self.probe_sequence(key).find(|slot| {
            let current = slot.key();
            if current == EMPTY_KEY {
                return match slot.claim(key) {
                    Ok(()) => true,
                    Err(winner) => winner == key,
                };
            }
            current == key
        })
    }

    /// Successor generation, if a migration has started
    pub(crate) fn next<'g>(&self, guard: &'g Guard) -> Option<&'g Self> {
        // SAFETY: a generation is only retired after the root has moved past it, and retired
        // generations are freed once every guard pinned before the retirement is gone.
        unsafe { self.next.load(Ordering::SeqCst, guard).as_ref() }
    }

    /// Links a successor of twice the capacity, or returns the one another thread linked first
    pub(crate) fn install_next<'g>(&self, guard: &'g Guard) -> &'g Self {
        if let Some(next) = self.next(guard) {
            return next;
        }
        let capacity = self.capacity().saturating_mul(2).min(MAX_CAPACITY);
        let fresh = Owned::new(Self::new(capacity, self.max_probes));
        let installed = match self.next.compare_exchange(
            Shared::null(),
            fresh,
            Ordering::SeqCst,
            Ordering::SeqCst,
            guard,
        ) {
            Ok(installed) => {
                debug!(from = self.capacity(), to = capacity, "installed next generation");
                installed
            }
            Err(lost) => lost.current,
        };
        // SAFETY: `installed` is non-null (either ours or the winner's) and protected by `guard`.
        unsafe { installed.deref() }
    }

    /// Iterates every slot in array order
    pub(crate) fn slots(&self) -> impl Iterator<Item = &Slot> {
        self.slots.iter()
    }
}

#[allow(clippy::missing_fields_in_debug)]
impl std::fmt::Debug for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Generation")
            .field("capacity", &self.capacity())
            .field("max_probes", &self.max_probes)
            .field("drained", &self.drained.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
