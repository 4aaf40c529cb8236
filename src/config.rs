//! Construction parameters for [`IntIntMap`](crate::IntIntMap)

use crate::error::{Error, Result};

/// Smallest capacity a generation may have
pub const MIN_CAPACITY: usize = 2;

/// Largest capacity a generation may have; the index function addresses at most 2^30 slots
pub const MAX_CAPACITY: usize = 1 << 30;

/// Default number of slots inspected before a probe reports capacity pressure
pub const DEFAULT_MAX_PROBES: usize = 8;

/// Tuning knobs for a map, fixed at construction time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapConfig {
    /// Capacity of the first generation, a power of two
    initial_capacity: usize,
    /// Probe budget shared by every generation of the map
    max_probes: usize,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self { initial_capacity: MIN_CAPACITY, max_probes: DEFAULT_MAX_PROBES }
    }
}

impl MapConfig {
    /// Creates the default configuration: capacity 2, 8 probes
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the capacity of the first generation
    #[must_use]
    pub fn with_initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    /// Sets the probe budget
    #[must_use]
    pub fn with_max_probes(mut self, max_probes: usize) -> Self {
        self.max_probes = max_probes;
        self
    }

    /// Capacity of the first generation
    #[must_use]
    pub fn initial_capacity(&self) -> usize {
        self.initial_capacity
    }

    /// Probe budget
    #[must_use]
    pub fn max_probes(&self) -> usize {
        self.max_probes
    }

    /// Checks that the capacity is a power of two in range and the probe budget is non-zero
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] naming the offending knob.
    pub fn validate(&self) -> Result<()> {
        let capacity = self.initial_capacity;
        if !capacity.is_power_of_two() || !(MIN_CAPACITY..=MAX_CAPACITY).contains(&capacity) {
            return Err(Error::invalid_argument(format!(
                "capacity must be a power of two in {MIN_CAPACITY}..={MAX_CAPACITY}: {capacity}"
            )));
        }
        if self.max_probes == 0 {
            return Err(Error::invalid_argument("probe budget must be positive"));
        }
        Ok(())
    }
}
