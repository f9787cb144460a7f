// 9.0 lending.rs: the pools traders borrow from. one pool per asset per market side.
// the engine only sees the LendingPool trait. InMemoryLendingPool is the reference pool:
// scaled debt against a borrow index that grows linearly per elapsed sequence.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::types::{AccountId, AssetId, Sequence};

pub trait LendingPool: fmt::Debug + Send {
    fn asset(&self) -> AssetId;

    fn available_liquidity(&self) -> Decimal;

    fn borrow(&mut self, borrower: AccountId, amount: Decimal, at: Sequence) -> Result<(), LendingError>;

    // pays down at most what is owed and returns the amount actually taken
    fn repay(&mut self, borrower: AccountId, amount: Decimal, at: Sequence) -> Decimal;

    // principal plus interest accrued up to `at`
    fn owed_amount(&self, borrower: AccountId, at: Sequence) -> Decimal;

    // forgives whatever is still owed and returns it
    fn write_off(&mut self, borrower: AccountId, at: Sequence) -> Decimal;
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LendingError {
    #[error("Insufficient liquidity: requested {requested}, available {available}")]
    InsufficientLiquidity { requested: Decimal, available: Decimal },

    #[error("Invalid amount: {0}")]
    InvalidAmount(Decimal),
}

// Lender side bookkeeping, reported for dashboards and tests
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolStats {
    pub total_supplied: Decimal,
    pub total_repaid: Decimal,
    pub total_written_off: Decimal,
}

#[derive(Debug, Clone)]
pub struct InMemoryLendingPool {
    asset: AssetId,
    // idle funds that can be lent out
    cash: Decimal,
    borrow_index: Decimal,
    // simple interest per elapsed sequence, folded into the index on every write
    rate_per_sequence: Decimal,
    last_accrual: Sequence,
    // borrower -> debt / index at the time of the borrow
    scaled_debt: HashMap<AccountId, Decimal>,
    stats: PoolStats,
}

impl InMemoryLendingPool {
    pub fn new(asset: AssetId, liquidity: Decimal) -> Self {
        Self {
            asset,
            cash: liquidity,
            borrow_index: Decimal::ONE,
            rate_per_sequence: Decimal::ZERO,
            last_accrual: Sequence::default(),
            scaled_debt: HashMap::new(),
            stats: PoolStats {
                total_supplied: liquidity,
                ..PoolStats::default()
            },
        }
    }

    pub fn with_interest(mut self, rate_per_sequence: Decimal) -> Self {
        self.rate_per_sequence = rate_per_sequence;
        self
    }

    pub fn supply(&mut self, amount: Decimal) {
        self.cash += amount;
        self.stats.total_supplied += amount;
    }

    pub fn stats(&self) -> &PoolStats {
        &self.stats
    }

    pub fn borrower_count(&self) -> usize {
        self.scaled_debt.len()
    }

    pub fn total_owed(&self, at: Sequence) -> Decimal {
        let index = self.index_at(at);
        self.scaled_debt.values().map(|scaled| *scaled * index).sum()
    }

    fn index_at(&self, at: Sequence) -> Decimal {
        let elapsed = Decimal::from(at.distance_since(self.last_accrual));
        self.borrow_index * (Decimal::ONE + self.rate_per_sequence * elapsed)
    }

    fn accrue(&mut self, at: Sequence) {
        if at > self.last_accrual {
            self.borrow_index = self.index_at(at);
            self.last_accrual = at;
        }
    }
}

impl LendingPool for InMemoryLendingPool {
    fn asset(&self) -> AssetId {
        self.asset
    }

    fn available_liquidity(&self) -> Decimal {
        self.cash
    }

    fn borrow(&mut self, borrower: AccountId, amount: Decimal, at: Sequence) -> Result<(), LendingError> {
        if amount <= Decimal::ZERO {
            return Err(LendingError::InvalidAmount(amount));
        }
        if amount > self.cash {
            return Err(LendingError::InsufficientLiquidity {
                requested: amount,
                available: self.cash,
            });
        }

        self.accrue(at);
        self.cash -= amount;
        *self.scaled_debt.entry(borrower).or_insert(Decimal::ZERO) += amount / self.borrow_index;
        Ok(())
    }

    fn repay(&mut self, borrower: AccountId, amount: Decimal, at: Sequence) -> Decimal {
        if amount <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        self.accrue(at);

        let Some(scaled) = self.scaled_debt.get(&borrower).copied() else {
            return Decimal::ZERO;
        };
        let owed = scaled * self.borrow_index;

        let paid = if amount >= owed {
            self.scaled_debt.remove(&borrower);
            owed
        } else {
            self.scaled_debt.insert(borrower, scaled - amount / self.borrow_index);
            amount
        };

        self.cash += paid;
        self.stats.total_repaid += paid;
        paid
    }

    fn owed_amount(&self, borrower: AccountId, at: Sequence) -> Decimal {
        self.scaled_debt
            .get(&borrower)
            .map(|scaled| *scaled * self.index_at(at))
            .unwrap_or(Decimal::ZERO)
    }

    fn write_off(&mut self, borrower: AccountId, at: Sequence) -> Decimal {
        self.accrue(at);
        let forgiven = self
            .scaled_debt
            .remove(&borrower)
            .map(|scaled| scaled * self.borrow_index)
            .unwrap_or(Decimal::ZERO);
        self.stats.total_written_off += forgiven;
        forgiven
    }
}
