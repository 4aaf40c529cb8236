//! Error types for probemap
//!
//! Every error is raised at the call boundary, before any shared state is touched. Contention
//! is never an error: lost races are retried and a full table is migrated.

use thiserror::Error;

/// Result type alias for probemap operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for map and ledger operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A key, value, index, amount or configuration knob is out of range
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A deposit or transfer would push an account past the ledger limit
    #[error("overflow on account {index} by {amount}")]
    Overflow {
        /// Account that would overflow
        index: usize,
        /// Amount that was rejected
        amount: i64,
    },

    /// A withdrawal or transfer would leave an account negative
    #[error("underflow on account {index} by {amount}")]
    Underflow {
        /// Account that would underflow
        index: usize,
        /// Amount that was rejected
        amount: i64,
    },
}

impl Error {
    /// Creates an [`Error::InvalidArgument`] from anything printable
    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Returns true for caller-misuse errors
    #[must_use]
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument(_))
    }
}
