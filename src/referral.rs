// 9.4 referral.rs: referral program. a registered referrer earns a share of the fees
// on trades that name them. unregistered referrers are treated as absent.

use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::types::{AccountId, AssetId};

pub trait Referral: fmt::Debug + Send {
    fn is_registered(&self, account: AccountId) -> bool;

    fn credit(&mut self, account: AccountId, asset: AssetId, amount: Decimal);

    fn balance_of(&self, account: AccountId, asset: AssetId) -> Decimal;
}

#[derive(Debug, Default, Clone)]
pub struct ReferralRegistry {
    registered: HashSet<AccountId>,
    balances: HashMap<(AccountId, AssetId), Decimal>,
}

impl ReferralRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, account: AccountId) -> bool {
        self.registered.insert(account)
    }

    pub fn with_registered(mut self, account: AccountId) -> Self {
        self.register(account);
        self
    }

    pub fn total_credited(&self, asset: AssetId) -> Decimal {
        self.balances
            .iter()
            .filter(|((_, a), _)| *a == asset)
            .map(|(_, amount)| *amount)
            .sum()
    }
}

impl Referral for ReferralRegistry {
    fn is_registered(&self, account: AccountId) -> bool {
        self.registered.contains(&account)
    }

    fn credit(&mut self, account: AccountId, asset: AssetId, amount: Decimal) {
        *self.balances.entry((account, asset)).or_insert(Decimal::ZERO) += amount;
    }

    fn balance_of(&self, account: AccountId, asset: AssetId) -> Decimal {
        self.balances.get(&(account, asset)).copied().unwrap_or(Decimal::ZERO)
    }
}
