//! Amount and Balance types
//!
//! Domain primitives for monetary values. Both are integer counts of minor
//! currency units (cents); floating point never enters the ledger.
//! All values are validated at construction time, ensuring invalid values
//! cannot exist in the system.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum allowed balance (10^15 minor units)
pub const MAX_BALANCE: i64 = 1_000_000_000_000_000;

/// Amount represents a validated transfer value.
///
/// # Invariants
/// - Value is always positive (> 0)
/// - Maximum value is `MAX_BALANCE`
///
/// # Example
/// ```
/// use wallet_ledger::domain::Amount;
///
/// let amount = Amount::new(300).unwrap();
/// assert_eq!(amount.value(), 300);
/// assert!(Amount::new(0).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Amount(i64);

/// Errors that can occur when creating an Amount or Balance
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("Amount must be positive (got {0})")]
    NotPositive(i64),

    #[error("Balance cannot be negative (got {0})")]
    Negative(i64),

    #[error("Value exceeds maximum allowed balance ({MAX_BALANCE})")]
    Overflow,

    #[error("Invalid range: minimum {min} is greater than maximum {max}")]
    InvalidRange { min: i64, max: i64 },
}

impl Amount {
    /// Create a new Amount with validation.
    ///
    /// # Errors
    /// - `AmountError::NotPositive` if value <= 0
    /// - `AmountError::Overflow` if value > `MAX_BALANCE`
    pub fn new(value: i64) -> Result<Self, AmountError> {
        if value <= 0 {
            return Err(AmountError::NotPositive(value));
        }
        if value > MAX_BALANCE {
            return Err(AmountError::Overflow);
        }
        Ok(Self(value))
    }

    /// Get the underlying number of minor units.
    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<i64> for Amount {
    type Error = AmountError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Amount::new(value)
    }
}

impl From<Amount> for i64 {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

/// Balance represents an account balance (can be zero or positive).
/// Unlike Amount, Balance can be zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Balance(i64);

impl Balance {
    /// Create a new balance (zero or positive)
    pub fn new(value: i64) -> Result<Self, AmountError> {
        if value < 0 {
            return Err(AmountError::Negative(value));
        }
        if value > MAX_BALANCE {
            return Err(AmountError::Overflow);
        }
        Ok(Self(value))
    }

    /// Create a zero balance
    pub fn zero() -> Self {
        Self(0)
    }

    /// Get the underlying value
    pub fn value(&self) -> i64 {
        self.0
    }

    /// Check if balance is sufficient for withdrawal
    pub fn is_sufficient_for(&self, amount: &Amount) -> bool {
        self.0 >= amount.value()
    }

    /// Subtract amount from balance
    pub fn debit(&self, amount: &Amount) -> Result<Balance, AmountError> {
        self.apply_delta(-amount.value())
    }

    /// Apply a signed delta, rejecting results below zero or above the maximum.
    pub fn apply_delta(&self, delta: i64) -> Result<Balance, AmountError> {
        let value = self.0.checked_add(delta).ok_or(AmountError::Overflow)?;
        Balance::new(value)
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for Balance {
    fn default() -> Self {
        Self::zero()
    }
}

impl TryFrom<i64> for Balance {
    type Error = AmountError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Balance::new(value)
    }
}

impl From<Balance> for i64 {
    fn from(balance: Balance) -> Self {
        balance.0
    }
}
