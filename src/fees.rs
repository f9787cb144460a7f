//! Trading fee split.
//!
//! Insurance is taken first at a fixed ratio, the referral share second and
//! only when a registered referrer is present, and the treasury absorbs
//! whatever is left. Because the treasury share is a subtraction, the three
//! shares always sum to the total fee.

use crate::types::Bps;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Shares are truncated to this many decimals, matching an 18-decimal token.
pub const FEE_PRECISION: u32 = 18;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSplit {
    pub total: Decimal,
    pub insurance: Decimal,
    pub referral: Decimal,
    pub treasury: Decimal,
}

impl FeeSplit {
    pub fn compute(
        total: Decimal,
        insurance_ratio: Bps,
        referral_ratio: Bps,
        has_referrer: bool,
    ) -> Self {
        let insurance = truncate(insurance_ratio.of(total));
        let referral = if has_referrer {
            truncate(referral_ratio.of(total))
        } else {
            Decimal::ZERO
        };
        let treasury = total - insurance - referral;

        Self {
            total,
            insurance,
            referral,
            treasury,
        }
    }

    pub fn sum(&self) -> Decimal {
        self.insurance + self.referral + self.treasury
    }
}

fn truncate(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(FEE_PRECISION, RoundingStrategy::ToZero)
}

/// feeRate x (deposit + borrow)
pub fn trading_fee(fee_rate: Bps, deposit: Decimal, borrow: Decimal) -> Decimal {
    truncate(fee_rate.of(deposit + borrow))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn fee_on_deposit_plus_borrow() {
        assert_eq!(trading_fee(Bps::new(30), dec!(400), dec!(500)), dec!(2.7));
        assert_eq!(trading_fee(Bps::new(30), dec!(200), Decimal::ZERO), dec!(0.6));
    }

    #[test]
    fn split_with_registered_referrer() {
        let split = FeeSplit::compute(dec!(2.7), Bps::new(3300), Bps::new(1600), true);
        assert_eq!(split.insurance, dec!(0.891));
        assert_eq!(split.referral, dec!(0.432));
        assert_eq!(split.treasury, dec!(1.377));
        assert_eq!(split.sum(), dec!(2.7));
    }

    #[test]
    fn split_without_referrer_routes_share_to_treasury() {
        let split = FeeSplit::compute(dec!(2.7), Bps::new(3300), Bps::new(1600), false);
        assert_eq!(split.referral, Decimal::ZERO);
        assert_eq!(split.treasury, dec!(1.809));
    }

    #[test]
    fn rounding_dust_lands_in_treasury() {
        let total = Decimal::new(1, 18) * dec!(7); // 7 wei
        let split = FeeSplit::compute(total, Bps::new(3333), Bps::new(1111), true);
        assert_eq!(split.insurance, Decimal::new(2, 18));
        assert_eq!(split.referral, Decimal::ZERO);
        assert_eq!(split.treasury, Decimal::new(5, 18));
        assert_eq!(split.sum(), total);
    }
}
