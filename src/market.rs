//! Market catalog.
//!
//! A market is one ordered asset pair, bound to the two lending pools traders
//! borrow from, an optional margin floor override and one insurance reserve
//! per asset. Markets are never removed once registered.

use crate::types::{AssetId, AssetPair, Bps, MarketId, PoolId, Side};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-asset insurance reserve. Fed by fee shares and liquidation surplus,
/// drawn on to cover liquidation shortfalls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InsuranceReserve {
    pub balance: Decimal,
    pub total_deposits: Decimal,
    pub total_payouts: Decimal,
}

impl InsuranceReserve {
    pub fn deposit(&mut self, amount: Decimal) {
        self.balance += amount;
        self.total_deposits += amount;
    }

    /// Pays out as much of `amount` as the balance allows and returns what was covered.
    pub fn cover_shortfall(&mut self, amount: Decimal) -> Decimal {
        let covered = amount.min(self.balance).max(Decimal::ZERO);
        self.balance -= covered;
        self.total_payouts += covered;
        covered
    }

    pub fn withdraw(&mut self, amount: Decimal) -> Result<(), MarketError> {
        if amount > self.balance {
            return Err(MarketError::InsufficientInsurance {
                requested: amount,
                available: self.balance,
            });
        }
        self.balance -= amount;
        self.total_payouts += amount;
        Ok(())
    }

    pub fn can_cover(&self, amount: Decimal) -> bool {
        self.balance >= amount
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub id: MarketId,
    pub pair: AssetPair,
    // pool lending asset0, pool lending asset1
    pub pool0: PoolId,
    pub pool1: PoolId,
    pub margin_ratio_override: Option<Bps>,
    pub insurance0: InsuranceReserve,
    pub insurance1: InsuranceReserve,
}

impl Market {
    pub fn new(id: MarketId, pair: AssetPair, pool0: PoolId, pool1: PoolId) -> Self {
        Self {
            id,
            pair,
            pool0,
            pool1,
            margin_ratio_override: None,
            insurance0: InsuranceReserve::default(),
            insurance1: InsuranceReserve::default(),
        }
    }

    /// Floor for open/increase/close. The override wins over the protocol default.
    pub fn margin_floor(&self, default: Bps) -> Bps {
        self.margin_ratio_override.unwrap_or(default)
    }

    pub fn held_asset(&self, side: Side) -> AssetId {
        side.held_asset(&self.pair)
    }

    pub fn borrowed_asset(&self, side: Side) -> AssetId {
        side.borrowed_asset(&self.pair)
    }

    pub fn pool_for(&self, asset: AssetId) -> Option<PoolId> {
        if asset == self.pair.asset0 {
            Some(self.pool0)
        } else if asset == self.pair.asset1 {
            Some(self.pool1)
        } else {
            None
        }
    }

    // the pool a given side borrows from
    pub fn borrow_pool(&self, side: Side) -> PoolId {
        match side {
            Side::Long0 => self.pool1,
            Side::Long1 => self.pool0,
        }
    }

    pub fn insurance(&self, asset: AssetId) -> Option<&InsuranceReserve> {
        if asset == self.pair.asset0 {
            Some(&self.insurance0)
        } else if asset == self.pair.asset1 {
            Some(&self.insurance1)
        } else {
            None
        }
    }

    pub fn insurance_mut(&mut self, asset: AssetId) -> Option<&mut InsuranceReserve> {
        if asset == self.pair.asset0 {
            Some(&mut self.insurance0)
        } else if asset == self.pair.asset1 {
            Some(&mut self.insurance1)
        } else {
            None
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct MarketRegistry {
    markets: HashMap<MarketId, Market>,
    by_pair: HashMap<AssetPair, MarketId>,
    next_id: u32,
}

impl MarketRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        pair: AssetPair,
        pool0: PoolId,
        pool1: PoolId,
    ) -> Result<MarketId, MarketError> {
        if let Some(existing) = self.by_pair.get(&pair) {
            return Err(MarketError::DuplicatePair {
                asset0: pair.asset0,
                asset1: pair.asset1,
                existing: *existing,
            });
        }

        let id = MarketId(self.next_id);
        self.next_id += 1;
        self.markets.insert(id, Market::new(id, pair, pool0, pool1));
        self.by_pair.insert(pair, id);
        Ok(id)
    }

    pub fn get(&self, id: MarketId) -> Option<&Market> {
        self.markets.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: MarketId) -> Option<&mut Market> {
        self.markets.get_mut(&id)
    }

    pub fn find_by_pair(&self, a: AssetId, b: AssetId) -> Option<&Market> {
        let pair = AssetPair::new(a, b)?;
        self.by_pair.get(&pair).and_then(|id| self.markets.get(id))
    }

    pub fn count(&self) -> usize {
        self.markets.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Market> {
        self.markets.values()
    }

    pub(crate) fn set_margin_override(&mut self, id: MarketId, floor: Option<Bps>) -> Result<(), MarketError> {
        let market = self.markets.get_mut(&id).ok_or(MarketError::MarketNotFound(id))?;
        market.margin_ratio_override = floor;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MarketError {
    #[error("Market {0:?} not found")]
    MarketNotFound(MarketId),

    #[error("Pair {asset0}/{asset1} already registered as {existing:?}")]
    DuplicatePair {
        asset0: AssetId,
        asset1: AssetId,
        existing: MarketId,
    },

    #[error("Pair needs two distinct assets, got {0} twice")]
    IdenticalAssets(AssetId),

    #[error("Asset {asset} is not part of market {market:?}")]
    AssetNotInMarket { market: MarketId, asset: AssetId },

    #[error("Insurance reserve holds {available}, requested {requested}")]
    InsufficientInsurance { requested: Decimal, available: Decimal },
}
