//! Margin ratio calculation.
//!
//! The margin ratio of a leveraged position is the collateral surplus (held
//! value minus owed) over the owed amount, in basis points. A position with
//! nothing owed is fully self-funded and its ratio is unbounded.
//!
//! Three thresholds act on it: the market floor gates open/increase/close,
//! the liquidation threshold gates marking and liquidation, and the reset
//! threshold gates clearing a liquidation marker.

use crate::types::{Bps, Rate};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

const BPS_SCALE: Decimal = dec!(10000);

/// Margin ratio in bps. `Unbounded` sorts above every bounded value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MarginRatio {
    Bounded(Bps),
    Unbounded,
}

impl MarginRatio {
    pub fn is_below(&self, threshold: Bps) -> bool {
        *self < MarginRatio::Bounded(threshold)
    }

    pub fn meets(&self, threshold: Bps) -> bool {
        !self.is_below(threshold)
    }

    pub fn bps(&self) -> Option<Bps> {
        match self {
            MarginRatio::Bounded(bps) => Some(*bps),
            MarginRatio::Unbounded => None,
        }
    }
}

impl fmt::Display for MarginRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarginRatio::Bounded(bps) => write!(f, "{}", bps),
            MarginRatio::Unbounded => write!(f, "unbounded"),
        }
    }
}

/// floor((held_value - owed) / owed * 10000)
pub fn margin_ratio(held_value: Decimal, owed: Decimal) -> MarginRatio {
    if owed <= Decimal::ZERO {
        return MarginRatio::Unbounded;
    }

    let surplus = held_value - owed;
    let scaled = surplus
        .checked_div(owed)
        .and_then(|ratio| ratio.checked_mul(BPS_SCALE));

    match scaled {
        Some(value) => {
            let floored = value.floor().to_i64().unwrap_or(i64::MAX);
            let clamped = floored.clamp(i32::MIN as i64, i32::MAX as i64) as i32;
            MarginRatio::Bounded(Bps::new(clamped))
        }
        // overflow only happens for a dust-sized owed amount
        None if surplus > Decimal::ZERO => MarginRatio::Unbounded,
        None => MarginRatio::Bounded(Bps::new(i32::MIN)),
    }
}

/// Snapshot of the inputs behind a ratio, so callers can log what it was computed from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarginSnapshot {
    pub held: Decimal,
    pub held_value: Decimal,
    pub owed: Decimal,
    pub rate: Rate,
    pub ratio: MarginRatio,
}

impl MarginSnapshot {
    pub fn evaluate(held: Decimal, owed: Decimal, rate: Rate) -> Self {
        let held_value = rate.convert(held);
        Self {
            held,
            held_value,
            owed,
            rate,
            ratio: margin_ratio(held_value, owed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarginStatus {
    /// At or above the market floor: may open, increase and close.
    Healthy,
    /// Between liquidation threshold and floor.
    Warning,
    Liquidatable,
}

pub fn evaluate_margin_status(ratio: MarginRatio, floor: Bps, liquidation_threshold: Bps) -> MarginStatus {
    if ratio.meets(floor) {
        MarginStatus::Healthy
    } else if ratio.meets(liquidation_threshold) {
        MarginStatus::Warning
    } else {
        MarginStatus::Liquidatable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const HELD: Decimal = dec!(821.1475729907163893);

    fn rate(value: Decimal) -> Rate {
        Rate::new(value, 8).unwrap()
    }

    #[test]
    fn ratio_after_favorable_move() {
        let snap = MarginSnapshot::evaluate(HELD, dec!(500), rate(dec!(1.2)));
        assert_eq!(snap.ratio, MarginRatio::Bounded(Bps::new(9707)));
    }

    #[test]
    fn ratio_after_adverse_move() {
        let snap = MarginSnapshot::evaluate(HELD, dec!(500), rate(dec!(0.65)));
        assert_eq!(snap.ratio, MarginRatio::Bounded(Bps::new(674)));
    }

    #[test]
    fn nothing_owed_is_unbounded() {
        assert_eq!(margin_ratio(dec!(100), Decimal::ZERO), MarginRatio::Unbounded);
        assert!(MarginRatio::Unbounded.meets(Bps::new(i32::MAX)));
    }

    #[test]
    fn underwater_ratio_is_negative_and_floored() {
        // (450 - 500) / 500 = -0.1 exactly
        assert_eq!(margin_ratio(dec!(450), dec!(500)), MarginRatio::Bounded(Bps::new(-1000)));
        // -0.00001 * 10000 = -0.1, floors to -1
        assert_eq!(margin_ratio(dec!(499.995), dec!(500)), MarginRatio::Bounded(Bps::new(-1)));
    }

    #[test]
    fn threshold_comparisons() {
        let ratio = MarginRatio::Bounded(Bps::new(1500));
        assert!(ratio.meets(Bps::new(1500)));
        assert!(!ratio.is_below(Bps::new(1500)));
        assert!(ratio.is_below(Bps::new(1501)));
    }

    #[test]
    fn status_bands() {
        let floor = Bps::new(3000);
        let liq = Bps::new(1500);
        assert_eq!(
            evaluate_margin_status(MarginRatio::Bounded(Bps::new(9707)), floor, liq),
            MarginStatus::Healthy
        );
        assert_eq!(
            evaluate_margin_status(MarginRatio::Bounded(Bps::new(2000)), floor, liq),
            MarginStatus::Warning
        );
        assert_eq!(
            evaluate_margin_status(MarginRatio::Bounded(Bps::new(674)), floor, liq),
            MarginStatus::Liquidatable
        );
    }
}
