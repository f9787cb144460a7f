// 1.0: all the primitives live here. nothing in the engine works without these types.
// IDs, assets, sides, rates, bps, sequence numbers. each is a newtype so the compiler catches mixups.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MarketId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PoolId(pub u32);

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "asset#{}", self.0)
    }
}

// 1.1: ordered pair. asset0 < asset1 always, so one pair has exactly one identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetPair {
    pub asset0: AssetId,
    pub asset1: AssetId,
}

impl AssetPair {
    #[must_use]
    pub fn new(a: AssetId, b: AssetId) -> Option<Self> {
        match a.cmp(&b) {
            std::cmp::Ordering::Less => Some(Self { asset0: a, asset1: b }),
            std::cmp::Ordering::Greater => Some(Self { asset0: b, asset1: a }),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn contains(&self, asset: AssetId) -> bool {
        self.asset0 == asset || self.asset1 == asset
    }
}

// 1.2: Long0 = hold asset0, borrow asset1. Long1 = hold asset1, borrow asset0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Side {
    Long0,
    Long1,
}

impl Side {
    pub fn held_asset(&self, pair: &AssetPair) -> AssetId {
        match self {
            Side::Long0 => pair.asset0,
            Side::Long1 => pair.asset1,
        }
    }

    pub fn borrowed_asset(&self, pair: &AssetPair) -> AssetId {
        match self {
            Side::Long0 => pair.asset1,
            Side::Long1 => pair.asset0,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long0 => write!(f, "long0"),
            Side::Long1 => write!(f, "long1"),
        }
    }
}

// 1.3: basis points. 100 bps = 1%, 10000 bps = 100%.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Bps(i32);

impl Bps {
    pub const MAX_RATIO: Bps = Bps(10_000);

    pub const fn new(bps: i32) -> Self {
        Self(bps)
    }

    pub fn value(&self) -> i32 {
        self.0
    }

    pub fn as_fraction(&self) -> Decimal {
        Decimal::new(self.0 as i64, 4)
    }

    pub fn of(&self, amount: Decimal) -> Decimal {
        amount * self.as_fraction()
    }
}

impl fmt::Display for Bps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}bps", self.0)
    }
}

// 1.4: exchange rate as reported by a price feed. value = units of asset_out per asset_in.
// decimals is the precision the feed quoted it at (8 for a 1e8 fixed-point feed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rate {
    value: Decimal,
    decimals: u32,
}

impl Rate {
    #[must_use]
    pub fn new(value: Decimal, decimals: u32) -> Option<Self> {
        if value > Decimal::ZERO {
            Some(Self { value, decimals })
        } else {
            None
        }
    }

    // fixed-point form: 100_000_000 with 8 decimals = 1.0
    #[must_use]
    pub fn from_mantissa(mantissa: u64, decimals: u32) -> Option<Self> {
        if decimals > 28 {
            return None;
        }
        Self::new(Decimal::from_i128_with_scale(mantissa as i128, decimals), decimals)
    }

    pub fn value(&self) -> Decimal {
        self.value
    }

    pub fn decimals(&self) -> u32 {
        self.decimals
    }

    pub fn convert(&self, amount: Decimal) -> Decimal {
        amount * self.value
    }

    pub fn inverse(&self) -> Self {
        Self {
            value: Decimal::ONE / self.value,
            decimals: self.decimals,
        }
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

// 1.5: logical clock. block height on chain, a counter anywhere else. strictly monotonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Sequence(pub u64);

impl Sequence {
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    pub fn advance(&self, by: u64) -> Self {
        Self(self.0.saturating_add(by))
    }

    pub fn distance_since(&self, earlier: Sequence) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

// 1.6: millisecond wall clock, stamped onto events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp_millis())
    }

    pub fn from_millis(ms: i64) -> Self {
        Self(ms)
    }

    pub fn as_millis(&self) -> i64 {
        self.0
    }
}
