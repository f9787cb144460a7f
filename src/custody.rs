// 9.2 custody.rs: token balances per holder and asset. MOCKED: no real transfers,
// just bookkeeping. engine custody holds deposits in flight, every held amount
// and every insurance reserve. the treasury collects its fee share here too.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::types::{AccountId, AssetId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Holder {
    Account(AccountId),
    Treasury,
    // referral program pot, owed out to referrers by the Referral collaborator
    Referral,
    // everything the engine itself holds on behalf of positions and reserves
    Custody,
}

impl fmt::Display for Holder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Holder::Account(id) => write!(f, "account#{}", id.0),
            Holder::Treasury => write!(f, "treasury"),
            Holder::Referral => write!(f, "referral"),
            Holder::Custody => write!(f, "custody"),
        }
    }
}

// Errors from custody operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CustodyError {
    #[error("Insufficient {asset} balance for {holder}: available {available}, requested {requested}")]
    InsufficientBalance {
        holder: Holder,
        asset: AssetId,
        available: Decimal,
        requested: Decimal,
    },

    #[error("Invalid amount: {0}")]
    InvalidAmount(Decimal),
}

#[derive(Debug, Default, Clone)]
pub struct Balances {
    balances: HashMap<(Holder, AssetId), Decimal>,
    // external inflow/outflow per asset, for reconciliation
    total_deposited: HashMap<AssetId, Decimal>,
    total_withdrawn: HashMap<AssetId, Decimal>,
}

impl Balances {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance(&self, holder: Holder, asset: AssetId) -> Decimal {
        self.balances.get(&(holder, asset)).copied().unwrap_or(Decimal::ZERO)
    }

    // Funds arriving from outside the engine
    pub fn deposit(&mut self, account: AccountId, asset: AssetId, amount: Decimal) -> Result<Decimal, CustodyError> {
        if amount <= Decimal::ZERO {
            return Err(CustodyError::InvalidAmount(amount));
        }
        self.credit(Holder::Account(account), asset, amount);
        *self.total_deposited.entry(asset).or_insert(Decimal::ZERO) += amount;
        Ok(self.balance(Holder::Account(account), asset))
    }

    // Funds leaving the engine
    pub fn withdraw(&mut self, account: AccountId, asset: AssetId, amount: Decimal) -> Result<Decimal, CustodyError> {
        if amount <= Decimal::ZERO {
            return Err(CustodyError::InvalidAmount(amount));
        }
        self.debit(Holder::Account(account), asset, amount)?;
        *self.total_withdrawn.entry(asset).or_insert(Decimal::ZERO) += amount;
        Ok(self.balance(Holder::Account(account), asset))
    }

    pub fn total_deposited(&self, asset: AssetId) -> Decimal {
        self.total_deposited.get(&asset).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn total_withdrawn(&self, asset: AssetId) -> Decimal {
        self.total_withdrawn.get(&asset).copied().unwrap_or(Decimal::ZERO)
    }

    pub(crate) fn credit(&mut self, holder: Holder, asset: AssetId, amount: Decimal) {
        if amount.is_zero() {
            return;
        }
        *self.balances.entry((holder, asset)).or_insert(Decimal::ZERO) += amount;
    }

    pub(crate) fn debit(&mut self, holder: Holder, asset: AssetId, amount: Decimal) -> Result<(), CustodyError> {
        let available = self.balance(holder, asset);
        if amount > available {
            return Err(CustodyError::InsufficientBalance {
                holder,
                asset,
                available,
                requested: amount,
            });
        }
        if !amount.is_zero() {
            self.balances.insert((holder, asset), available - amount);
        }
        Ok(())
    }

    pub(crate) fn transfer(
        &mut self,
        from: Holder,
        to: Holder,
        asset: AssetId,
        amount: Decimal,
    ) -> Result<(), CustodyError> {
        self.debit(from, asset, amount)?;
        self.credit(to, asset, amount);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const TRADER: AccountId = AccountId(2);
    const ASSET: AssetId = AssetId(1);

    #[test]
    fn deposit_and_withdraw() {
        let mut balances = Balances::new();
        assert_eq!(balances.deposit(TRADER, ASSET, dec!(10000)).unwrap(), dec!(10000));
        assert_eq!(balances.withdraw(TRADER, ASSET, dec!(2500)).unwrap(), dec!(7500));

        assert_eq!(balances.total_deposited(ASSET), dec!(10000));
        assert_eq!(balances.total_withdrawn(ASSET), dec!(2500));
    }

    #[test]
    fn overdraw_rejected() {
        let mut balances = Balances::new();
        balances.deposit(TRADER, ASSET, dec!(100)).unwrap();

        let result = balances.withdraw(TRADER, ASSET, dec!(100.5));
        assert!(matches!(result, Err(CustodyError::InsufficientBalance { .. })));
        assert_eq!(balances.balance(Holder::Account(TRADER), ASSET), dec!(100));
    }

    #[test]
    fn zero_or_negative_deposit_rejected() {
        let mut balances = Balances::new();
        assert_eq!(
            balances.deposit(TRADER, ASSET, Decimal::ZERO),
            Err(CustodyError::InvalidAmount(Decimal::ZERO))
        );
    }

    #[test]
    fn internal_transfer_conserves() {
        let mut balances = Balances::new();
        balances.deposit(TRADER, ASSET, dec!(400)).unwrap();
        balances
            .transfer(Holder::Account(TRADER), Holder::Custody, ASSET, dec!(400))
            .unwrap();
        balances.transfer(Holder::Custody, Holder::Treasury, ASSET, dec!(1.377)).unwrap();

        assert_eq!(balances.balance(Holder::Account(TRADER), ASSET), Decimal::ZERO);
        assert_eq!(balances.balance(Holder::Custody, ASSET), dec!(398.623));
        assert_eq!(balances.balance(Holder::Treasury, ASSET), dec!(1.377));
    }
}
