//! # probemap
//!
//! A non-blocking, resizable hash map from positive `i32` keys to positive `i32` values.
//!
//! Keys live in open-addressed generations that never grow in place. When a probe runs out of
//! budget, the writer links a successor twice the size and threads cooperate to copy the live
//! entries forward. Nobody ever holds a lock: a thread that finds a slot mid-migration finishes
//! that slot's move itself and carries on.
//!
//! The crate also ships [`Bank`], a small lock-per-account ledger used as the blocking
//! baseline in the benchmarks.
//!
//! ## Basic Usage
//!
//! ```rust
//! use probemap::IntIntMap;
//!
//! let map = IntIntMap::new();
//!
//! // `put` returns the value it replaced, or 0
//! assert_eq!(map.put(5, 10).unwrap(), 0);
//! assert_eq!(map.put(5, 20).unwrap(), 10);
//! assert_eq!(map.get(5).unwrap(), 20);
//!
//! // Removed and missing keys read as 0
//! assert_eq!(map.remove(5).unwrap(), 20);
//! assert_eq!(map.get(5).unwrap(), 0);
//!
//! // Keys must be positive; values must be positive and below i32::MAX
//! assert!(map.put(1, i32::MAX).is_err());
//! assert!(map.get(-1).is_err());
//! ```
//!
//! ## Concurrent Usage
//!
//! ```rust
//! use probemap::IntIntMap;
//! use std::sync::Arc;
//! use std::thread;
//!
//! let map = Arc::new(IntIntMap::new());
//!
//! let handles: Vec<_> = (0..4)
//!     .map(|t| {
//!         let map = Arc::clone(&map);
//!         thread::spawn(move || {
//!             for i in 1..=100 {
//!                 map.put(t * 1000 + i, i).unwrap();
//!             }
//!         })
//!     })
//!     .collect();
//! for handle in handles {
//!     handle.join().unwrap();
//! }
//!
//! // Every insert survived the migrations the map went through on the way
//! assert_eq!(map.get(3042).unwrap(), 42);
//! assert!(map.capacity() >= 400);
//! ```

/// Lock-per-account ledger
mod bank;
/// Construction parameters and their limits
mod config;
/// Crate error type
mod error;
/// Fixed-capacity table versions
mod generation;
/// The public map handle
mod map;
/// Copying a generation into its successor
mod migration;
/// Lookup and upsert across a generation chain
mod probe;
/// Slot states and atomic cells
mod slot;

pub use bank::{Bank, MAX_AMOUNT};
pub use config::{DEFAULT_MAX_PROBES, MAX_CAPACITY, MIN_CAPACITY, MapConfig};
pub use error::{Error, Result};
pub use map::IntIntMap;
pub use slot::{TOMBSTONE, is_presentable};
