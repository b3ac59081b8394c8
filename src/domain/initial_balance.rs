//! Initial balance policies
//!
//! Decide the balance an account is opened with at registration.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::sync::Mutex;

use super::{AmountError, Balance, OwnerId};

/// Chooses the opening balance of a newly registered account.
pub trait InitialBalancePolicy: Send + Sync + fmt::Debug {
    fn initial_balance(&self, owner_id: OwnerId) -> Balance;
}

/// Every account opens with the same balance.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedInitialBalance {
    balance: Balance,
}

impl FixedInitialBalance {
    pub fn new(balance: Balance) -> Self {
        Self { balance }
    }
}

impl InitialBalancePolicy for FixedInitialBalance {
    fn initial_balance(&self, _owner_id: OwnerId) -> Balance {
        self.balance
    }
}

/// Uniformly random opening balance in `[min, max]`, drawn from a seeded
/// generator so a given seed always yields the same sequence.
#[derive(Debug)]
pub struct SeededRandomBalance {
    min: Balance,
    max: Balance,
    rng: Mutex<StdRng>,
}

impl SeededRandomBalance {
    pub fn new(min: Balance, max: Balance, seed: u64) -> Result<Self, AmountError> {
        if min > max {
            return Err(AmountError::InvalidRange {
                min: min.value(),
                max: max.value(),
            });
        }
        Ok(Self {
            min,
            max,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        })
    }
}

impl InitialBalancePolicy for SeededRandomBalance {
    fn initial_balance(&self, _owner_id: OwnerId) -> Balance {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let value = rng.gen_range(self.min.value()..=self.max.value());
        // Both bounds are valid balances, so every draw is too.
        Balance::new(value).unwrap_or(self.min)
    }
}
