//! Conversion venues.
//!
//! Every open, close and liquidation converts one asset of the pair into the
//! other. The engine hands the venue the fresh feed rate as a reference;
//! whether the venue trades at that rate or against its own reserves is up
//! to the implementation. Margin is always valued at the feed rate.

use crate::types::{AssetId, AssetPair, Bps, Rate};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::fmt;

pub trait SwapVenue: fmt::Debug + Send {
    /// Output amount for `amount_in`, without executing.
    fn quote(&self, asset_in: AssetId, asset_out: AssetId, amount_in: Decimal, reference: Rate)
        -> Result<Decimal, SwapError>;

    fn swap(&mut self, asset_in: AssetId, asset_out: AssetId, amount_in: Decimal, reference: Rate)
        -> Result<Decimal, SwapError>;
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SwapError {
    #[error("No route from {asset_in} to {asset_out}")]
    UnsupportedPair { asset_in: AssetId, asset_out: AssetId },

    #[error("Invalid swap amount: {0}")]
    InvalidAmount(Decimal),

    #[error("Output {output} exhausts reserve {reserve}")]
    InsufficientReserves { output: Decimal, reserve: Decimal },
}

/// Converts exactly at the reference rate. No price impact, no fee.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeedRateVenue;

impl SwapVenue for FeedRateVenue {
    fn quote(&self, _asset_in: AssetId, _asset_out: AssetId, amount_in: Decimal, reference: Rate)
        -> Result<Decimal, SwapError> {
        if amount_in < Decimal::ZERO {
            return Err(SwapError::InvalidAmount(amount_in));
        }
        Ok(reference.convert(amount_in))
    }

    fn swap(&mut self, asset_in: AssetId, asset_out: AssetId, amount_in: Decimal, reference: Rate)
        -> Result<Decimal, SwapError> {
        self.quote(asset_in, asset_out, amount_in, reference)
    }
}

/// x * y = k pools with a fee taken from the input. The reference rate is
/// ignored: price comes from reserves.
#[derive(Debug, Clone)]
pub struct ConstantProductVenue {
    // pair -> (reserve of asset0, reserve of asset1)
    reserves: HashMap<AssetPair, (Decimal, Decimal)>,
    fee: Bps,
}

impl ConstantProductVenue {
    pub fn new(fee: Bps) -> Self {
        Self {
            reserves: HashMap::new(),
            fee,
        }
    }

    pub fn with_pair(mut self, a: AssetId, reserve_a: Decimal, b: AssetId, reserve_b: Decimal) -> Self {
        self.add_pair(a, reserve_a, b, reserve_b);
        self
    }

    pub fn add_pair(&mut self, a: AssetId, reserve_a: Decimal, b: AssetId, reserve_b: Decimal) {
        if let Some(pair) = AssetPair::new(a, b) {
            let reserves = if pair.asset0 == a {
                (reserve_a, reserve_b)
            } else {
                (reserve_b, reserve_a)
            };
            self.reserves.insert(pair, reserves);
        }
    }

    /// (reserve_in, reserve_out) for a direction
    pub fn reserves(&self, asset_in: AssetId, asset_out: AssetId) -> Option<(Decimal, Decimal)> {
        let pair = AssetPair::new(asset_in, asset_out)?;
        let (r0, r1) = self.reserves.get(&pair)?;
        if pair.asset0 == asset_in {
            Some((*r0, *r1))
        } else {
            Some((*r1, *r0))
        }
    }

    fn amount_out(&self, asset_in: AssetId, asset_out: AssetId, amount_in: Decimal) -> Result<Decimal, SwapError> {
        if amount_in < Decimal::ZERO {
            return Err(SwapError::InvalidAmount(amount_in));
        }
        let (reserve_in, reserve_out) = self
            .reserves(asset_in, asset_out)
            .ok_or(SwapError::UnsupportedPair { asset_in, asset_out })?;

        let scale = Decimal::from(Bps::MAX_RATIO.value());
        let in_with_fee = amount_in * Decimal::from(Bps::MAX_RATIO.value() - self.fee.value());
        let numerator = in_with_fee * reserve_out;
        let denominator = reserve_in * scale + in_with_fee;
        if denominator.is_zero() {
            return Ok(Decimal::ZERO);
        }

        let out = numerator / denominator;
        if out >= reserve_out {
            return Err(SwapError::InsufficientReserves {
                output: out,
                reserve: reserve_out,
            });
        }
        Ok(out)
    }
}

impl SwapVenue for ConstantProductVenue {
    fn quote(&self, asset_in: AssetId, asset_out: AssetId, amount_in: Decimal, _reference: Rate)
        -> Result<Decimal, SwapError> {
        self.amount_out(asset_in, asset_out, amount_in)
    }

    fn swap(&mut self, asset_in: AssetId, asset_out: AssetId, amount_in: Decimal, _reference: Rate)
        -> Result<Decimal, SwapError> {
        let out = self.amount_out(asset_in, asset_out, amount_in)?;
        let pair = AssetPair::new(asset_in, asset_out).ok_or(SwapError::UnsupportedPair { asset_in, asset_out })?;
        if let Some((r0, r1)) = self.reserves.get_mut(&pair) {
            if pair.asset0 == asset_in {
                *r0 += amount_in;
                *r1 -= out;
            } else {
                *r1 += amount_in;
                *r0 -= out;
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const A: AssetId = AssetId(1);
    const B: AssetId = AssetId(2);

    fn unit_rate() -> Rate {
        Rate::from_mantissa(100_000_000, 8).unwrap()
    }

    fn amm() -> ConstantProductVenue {
        ConstantProductVenue::new(Bps::new(30)).with_pair(A, dec!(10000), B, dec!(10000))
    }

    #[test]
    fn feed_rate_venue_is_exact() {
        let mut venue = FeedRateVenue;
        let rate = Rate::new(dec!(0.65), 8).unwrap();
        assert_eq!(venue.swap(A, B, dec!(100), rate).unwrap(), dec!(65));
    }

    #[test]
    fn constant_product_output_with_fee() {
        let venue = amm();
        let out = venue.quote(B, A, dec!(897.3), unit_rate()).unwrap();
        assert_eq!(out.round_dp(16), dec!(821.1475729907163893));
    }

    #[test]
    fn swap_moves_reserves() {
        let mut venue = amm();
        let out = venue.swap(B, A, dec!(897.3), unit_rate()).unwrap();

        let (reserve_b, reserve_a) = venue.reserves(B, A).unwrap();
        assert_eq!(reserve_b, dec!(10897.3));
        assert_eq!(reserve_a, dec!(10000) - out);

        // selling back costs the fee twice
        let back = venue.quote(A, B, out, unit_rate()).unwrap();
        assert!(back < dec!(897.3));
    }

    #[test]
    fn unknown_pair_rejected() {
        let venue = amm();
        let result = venue.quote(A, AssetId(9), dec!(1), unit_rate());
        assert!(matches!(result, Err(SwapError::UnsupportedPair { .. })));
    }

    #[test]
    fn quote_does_not_execute() {
        let venue = amm();
        venue.quote(A, B, dec!(50), unit_rate()).unwrap();
        assert_eq!(venue.reserves(A, B), Some((dec!(10000), dec!(10000))));
    }
}
