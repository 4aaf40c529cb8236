//! A fixed set of accounts guarded by one lock each.
//!
//! This is the blocking counterpart used to compare against the map: every operation takes the
//! locks it needs in ascending account order, so two transfers can never wait on each other in
//! a cycle.

use parking_lot::Mutex;
use tracing::trace;

use crate::error::{Error, Result};

/// Largest balance an account may hold
pub const MAX_AMOUNT: i64 = 1_000_000_000_000_000;

/// Accounts indexed `0..n`, each starting at zero
#[derive(Debug)]
pub struct Bank {
    /// One balance per account
    accounts: Box<[Mutex<i64>]>,
}

impl Bank {
    /// Creates `n` accounts with zero balance
    #[must_use]
    pub fn new(n: usize) -> Self {
        Self { accounts: (0..n).map(|_| Mutex::new(0)).collect() }
    }

    /// Number of accounts
    #[must_use]
    pub fn number_of_accounts(&self) -> usize {
        self.accounts.len()
    }

    /// Account at `index`
    fn account(&self, index: usize) -> Result<&Mutex<i64>> {
        self.accounts.get(index).ok_or_else(|| {
            Error::invalid_argument(format!(
                "no account {index} among {}",
                self.number_of_accounts()
            ))
        })
    }

    /// Current balance of account `index`
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if there is no such account.
    pub fn amount(&self, index: usize) -> Result<i64> {
        Ok(*self.account(index)?.lock())
    }

    /// Sum of all balances, taken while every account is locked
    #[must_use]
    pub fn total_amount(&self) -> i64 {
        let guards: Vec<_> = self.accounts.iter().map(Mutex::lock).collect();
        guards.iter().fold(0_i64, |total, balance| total.saturating_add(**balance))
    }

    /// Adds `amount` to account `index` and returns the new balance
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for an unknown account or a non-positive amount, and
    /// [`Error::Overflow`] if the balance would exceed [`MAX_AMOUNT`].
    pub fn deposit(&self, index: usize, amount: i64) -> Result<i64> {
        check_amount(amount)?;
        let mut balance = self.account(index)?.lock();
        *balance = credit(*balance, index, amount)?;
        Ok(*balance)
    }

    /// Takes `amount` from account `index` and returns the new balance
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for an unknown account or a non-positive amount, and
    /// [`Error::Underflow`] if the balance would go negative.
    pub fn withdraw(&self, index: usize, amount: i64) -> Result<i64> {
        check_amount(amount)?;
        let mut balance = self.account(index)?.lock();
        *balance = debit(*balance, index, amount)?;
        Ok(*balance)
    }

    /// Moves `amount` from account `from` to account `to`
    ///
    /// Either both balances change or neither does.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for unknown or identical accounts or a non-positive
    /// amount, [`Error::Underflow`] if `from` cannot cover it and [`Error::Overflow`] if `to`
    /// cannot hold it.
    pub fn transfer(&self, from: usize, to: usize, amount: i64) -> Result<()> {
        check_amount(amount)?;
        if from == to {
            return Err(Error::invalid_argument(format!("transfer from account {from} to itself")));
        }
        let (source, target) = (self.account(from)?, self.account(to)?);

        // Lower index first
        let (mut source, mut target) = if from < to {
            let source = source.lock();
            (source, target.lock())
        } else {
            let target = target.lock();
            (source.lock(), target)
        };

        let debited = debit(*source, from, amount)?;
        let credited = credit(*target, to, amount)?;
        *source = debited;
        *target = credited;
        Ok(())
    }
}

/// Rejects amounts that are not positive
fn check_amount(amount: i64) -> Result<()> {
    if amount > 0 {
        Ok(())
    } else {
        trace!(amount, "rejected amount");
        Err(Error::invalid_argument(format!("amount must be positive: {amount}")))
    }
}

/// Balance after adding `amount`, if it stays within [`MAX_AMOUNT`]
fn credit(balance: i64, index: usize, amount: i64) -> Result<i64> {
    match balance.checked_add(amount) {
        Some(total) if total <= MAX_AMOUNT => Ok(total),
        _ => {
            trace!(index, balance, amount, "deposit would overflow");
            Err(Error::Overflow { index, amount })
        }
    }
}

/// Balance after taking `amount`, if it stays non-negative
fn debit(balance: i64, index: usize, amount: i64) -> Result<i64> {
    match balance.checked_sub(amount) {
        Some(rest) if rest >= 0 => Ok(rest),
        _ => {
            trace!(index, balance, amount, "withdrawal would underflow");
            Err(Error::Underflow { index, amount })
        }
    }
}
