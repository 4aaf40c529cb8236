//! Slot states and the atomic cells that hold them.
//!
//! A value cell is a single `AtomicU64`: the high half carries a state tag, the low half the
//! payload. Every read decodes into [`SlotState`] and every write encodes from it, so the rest
//! of the crate only ever matches on the enum.

use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};

/// Reserved value marking a removed key; never a legal user value
pub const TOMBSTONE: i32 = i32::MAX;

/// Key-cell content of a slot no key has claimed yet
pub(crate) const EMPTY_KEY: i32 = 0;

/// Public result for an absent key
pub(crate) const ABSENT: i32 = 0;

/// Tag of [`SlotState::Empty`]; zero so a zeroed word is an empty cell
const TAG_EMPTY: u32 = 0;
/// Tag of [`SlotState::Present`]
const TAG_PRESENT: u32 = 1;
/// Tag of [`SlotState::Tombstone`]
const TAG_TOMBSTONE: u32 = 2;
/// Tag of [`SlotState::Frozen`]
const TAG_FROZEN: u32 = 3;
/// Tag of [`SlotState::Sealed`]
const TAG_SEALED: u32 = 4;
/// Tag of [`SlotState::Done`]
const TAG_DONE: u32 = 5;

/// Returns true if `value` is something a caller may store
#[must_use]
pub fn is_presentable(value: i32) -> bool {
    value > 0 && value < TOMBSTONE
}

/// Logical state of a value cell.
///
/// Legal transitions only move forward:
/// `Empty -> Present -> Present | Tombstone`, `Tombstone -> Present`,
/// `Present -> Frozen -> Done`, `Tombstone -> Done`, `Empty -> Sealed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SlotState {
    /// Nothing has been written to the value cell
    Empty,
    /// The key maps to this value
    Present(i32),
    /// The key was removed; the slot stays reserved for it
    Tombstone,
    /// The value is being copied into the next generation
    Frozen(i32),
    /// The slot was empty when migration reached it; nothing was ever published here
    Sealed,
    /// The value was copied forward or elided
    Done,
}

impl SlotState {
    /// Value a caller observes for this state
    pub(crate) fn public_value(self) -> i32 {
        match self {
            Self::Present(value) => value,
            Self::Empty | Self::Tombstone | Self::Frozen(_) | Self::Sealed | Self::Done => ABSENT,
        }
    }

    /// State a migration moves this cell to, or `None` if migration already reached it
    pub(crate) fn frozen(self) -> Option<Self> {
        match self {
            Self::Empty => Some(Self::Sealed),
            Self::Present(value) => Some(Self::Frozen(value)),
            Self::Tombstone => Some(Self::Done),
            Self::Frozen(_) | Self::Sealed | Self::Done => None,
        }
    }

    /// True once this generation no longer owns the slot's value
    pub(crate) fn is_migrated(self) -> bool {
        matches!(self, Self::Sealed | Self::Done)
    }

    /// Packs the state into a cell word
    #[allow(clippy::cast_sign_loss)]
    fn encode(self) -> u64 {
        let (tag, payload) = match self {
            Self::Empty => (TAG_EMPTY, 0),
            Self::Present(value) => (TAG_PRESENT, value),
            Self::Tombstone => (TAG_TOMBSTONE, 0),
            Self::Frozen(value) => (TAG_FROZEN, value),
            Self::Sealed => (TAG_SEALED, 0),
            Self::Done => (TAG_DONE, 0),
        };
        (u64::from(tag) << 32) | u64::from(payload as u32)
    }

    /// Unpacks a cell word written by [`SlotState::encode`]
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    fn decode(word: u64) -> Self {
        let payload = word as u32 as i32;
        match (word >> 32) as u32 {
            TAG_EMPTY => Self::Empty,
            TAG_PRESENT => Self::Present(payload),
            TAG_TOMBSTONE => Self::Tombstone,
            TAG_FROZEN => Self::Frozen(payload),
            TAG_SEALED => Self::Sealed,
            tag => {
                debug_assert_eq!(tag, TAG_DONE, "corrupt slot word {word:#x}");
                Self::Done
            }
        }
    }
}

/// Atomic value cell holding an encoded [`SlotState`]
pub(crate) struct ValueCell(AtomicU64);

impl ValueCell {
    /// Creates an empty cell
    fn new() -> Self {
        Self(AtomicU64::new(SlotState::Empty.encode()))
    }

    /// Reads the current state
    pub(crate) fn load(&self) -> SlotState {
        SlotState::decode(self.0.load(Ordering::SeqCst))
    }

    /// Overwrites the state; only used for the final `Frozen -> Done` step
    pub(crate) fn store(&self, state: SlotState) {
        self.0.store(state.encode(), Ordering::SeqCst);
    }

    /// Replaces `current` with `new`, returning the state actually found on failure
    pub(crate) fn compare_exchange(
        &self,
        current: SlotState,
        new: SlotState,
    ) -> Result<(), SlotState> {
        self.0
            .compare_exchange(current.encode(), new.encode(), Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(SlotState::decode)
    }
}

/// A (key-cell, value-cell) pair inside a generation
pub(crate) struct Slot {
    /// Claimed key, or [`EMPTY_KEY`]; never changes once claimed
    key: AtomicI32,
    /// State of the value bound to `key`
    pub(crate) value: ValueCell,
}

impl Slot {
    /// Creates an unclaimed slot
    pub(crate) fn new() -> Self {
        Self { key: AtomicI32::new(EMPTY_KEY), value: ValueCell::new() }
    }

    /// Reads the key cell
    pub(crate) fn key(&self) -> i32 {
        self.key.load(Ordering::SeqCst)
    }

    /// Claims an empty key cell for `key`, returning the key found there on failure
    pub(crate) fn claim(&self, key: i32) -> Result<(), i32> {
        self.key
            .compare_exchange(EMPTY_KEY, key, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
    }
}

impl std::fmt::Debug for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slot").field("key", &self.key()).field("value", &self.value.load()).finish()
    }
}
