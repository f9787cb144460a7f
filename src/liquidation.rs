//! Liquidation settlement.
//!
//! Once a marked position has waited out the delay window and is still
//! below the liquidation threshold, its full held amount is sold and the
//! proceeds are routed through a fixed waterfall: debt first, then the
//! liquidator's reward, then an insurance slice, and the trader keeps what
//! remains. When proceeds cannot repay the debt the borrowed asset's
//! insurance reserve is drawn and anything left over is bad debt.

use crate::config::LiquidatorReward;
use crate::types::Bps;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LiquidationParams {
    pub reward: LiquidatorReward,
    // share of the post-reward surplus routed into insurance
    pub insurance_slice: Bps,
}

/// Where every unit of proceeds (plus any insurance draw) went.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Settlement {
    pub proceeds: Decimal,
    pub owed: Decimal,
    // paid to the pool, out of proceeds and insurance
    pub repaid: Decimal,
    pub insurance_draw: Decimal,
    pub bad_debt: Decimal,
    pub liquidator_reward: Decimal,
    pub insurance_contribution: Decimal,
    pub trader_payout: Decimal,
}

impl Settlement {
    pub fn is_insolvent(&self) -> bool {
        self.proceeds < self.owed
    }

    pub fn surplus(&self) -> Decimal {
        (self.proceeds - self.owed).max(Decimal::ZERO)
    }

    // repaid + reward + contribution + payout == proceeds + insurance draw
    pub fn distributed(&self) -> Decimal {
        self.repaid + self.liquidator_reward + self.insurance_contribution + self.trader_payout
    }
}

/// Splits liquidation proceeds. `insurance_available` is the borrowed-asset
/// reserve balance that may be drawn to cover a shortfall.
pub fn settle(
    proceeds: Decimal,
    owed: Decimal,
    insurance_available: Decimal,
    params: &LiquidationParams,
) -> Settlement {
    if proceeds < owed {
        let shortfall = owed - proceeds;
        let insurance_draw = shortfall.min(insurance_available.max(Decimal::ZERO));
        return Settlement {
            proceeds,
            owed,
            repaid: proceeds + insurance_draw,
            insurance_draw,
            bad_debt: shortfall - insurance_draw,
            liquidator_reward: Decimal::ZERO,
            insurance_contribution: Decimal::ZERO,
            trader_payout: Decimal::ZERO,
        };
    }

    let surplus = proceeds - owed;
    let reward = params.reward.amount(proceeds).max(Decimal::ZERO).min(surplus);
    let after_reward = surplus - reward;
    let insurance_contribution = params.insurance_slice.of(after_reward);

    Settlement {
        proceeds,
        owed,
        repaid: owed,
        insurance_draw: Decimal::ZERO,
        bad_debt: Decimal::ZERO,
        liquidator_reward: reward,
        insurance_contribution,
        trader_payout: after_reward - insurance_contribution,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn params() -> LiquidationParams {
        LiquidationParams {
            reward: LiquidatorReward::Proportional(Bps::new(100)),
            insurance_slice: Bps::new(1000),
        }
    }

    #[test]
    fn solvent_waterfall() {
        let s = settle(dec!(600), dec!(500), dec!(0), &params());

        assert_eq!(s.repaid, dec!(500));
        // 1% of 600
        assert_eq!(s.liquidator_reward, dec!(6));
        // 10% of (100 - 6)
        assert_eq!(s.insurance_contribution, dec!(9.4));
        assert_eq!(s.trader_payout, dec!(84.6));
        assert_eq!(s.distributed(), dec!(600));
        assert!(!s.is_insolvent());
    }

    #[test]
    fn reward_capped_at_surplus() {
        let params = LiquidationParams {
            reward: LiquidatorReward::Fixed(dec!(50)),
            insurance_slice: Bps::new(1000),
        };
        let s = settle(dec!(520), dec!(500), dec!(0), &params);

        assert_eq!(s.liquidator_reward, dec!(20));
        assert_eq!(s.insurance_contribution, Decimal::ZERO);
        assert_eq!(s.trader_payout, Decimal::ZERO);
    }

    #[test]
    fn shortfall_drawn_from_insurance() {
        let s = settle(dec!(480), dec!(500), dec!(100), &params());

        assert!(s.is_insolvent());
        assert_eq!(s.insurance_draw, dec!(20));
        assert_eq!(s.repaid, dec!(500));
        assert_eq!(s.bad_debt, Decimal::ZERO);
        assert_eq!(s.liquidator_reward, Decimal::ZERO);
        assert_eq!(s.distributed(), s.proceeds + s.insurance_draw);
    }

    #[test]
    fn uncovered_shortfall_is_bad_debt() {
        let s = settle(dec!(400), dec!(500), dec!(30), &params());

        assert_eq!(s.insurance_draw, dec!(30));
        assert_eq!(s.repaid, dec!(430));
        assert_eq!(s.bad_debt, dec!(70));
        assert_eq!(s.trader_payout, Decimal::ZERO);
    }

    #[test]
    fn nothing_owed_all_surplus() {
        let s = settle(dec!(100), Decimal::ZERO, dec!(0), &params());
        assert_eq!(s.repaid, Decimal::ZERO);
        assert_eq!(s.liquidator_reward, dec!(1));
        assert_eq!(s.distributed(), dec!(100));
    }
}
