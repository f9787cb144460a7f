// 7.0 config.rs: all protocol parameters in one place. fees, margin thresholds, liquidation.
// 7.1 read by the engine, set only through the admin surface (Engine::set_protocol_config).

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::types::Bps;

/** 7.2: what the liquidation caller earns. paid out of surplus only, never beyond it */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiquidatorReward {
    // flat amount in the borrowed asset
    Fixed(Decimal),
    // share of the liquidation proceeds
    Proportional(Bps),
}

impl LiquidatorReward {
    pub fn amount(&self, proceeds: Decimal) -> Decimal {
        match self {
            LiquidatorReward::Fixed(amount) => *amount,
            LiquidatorReward::Proportional(bps) => bps.of(proceeds),
        }
    }
}

// Protocol wide parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    // Trading fee on deposit + borrow
    pub fee_rate: Bps,
    // Share of every fee kept as insurance
    pub insurance_ratio: Bps,
    // Share of every fee paid to a registered referrer
    pub referral_ratio: Bps,
    // Floor for open/increase/close unless a market overrides it
    pub default_margin_ratio: Bps,
    // Below this a position may be marked and liquidated
    pub liquidation_ratio: Bps,
    // A marked position at or above this may be reset
    pub reset_ratio: Bps,
    // Sequences that must pass after marking before liquidate is allowed
    pub liquidation_delay: u64,
    // Share of liquidation surplus routed into insurance
    pub liquidation_insurance_ratio: Bps,
    pub liquidator_reward: LiquidatorReward,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            fee_rate: Bps::new(30),         // 0.3%
            insurance_ratio: Bps::new(3300), // 33%
            referral_ratio: Bps::new(1600), // 16%
            default_margin_ratio: Bps::new(3000),
            liquidation_ratio: Bps::new(1500),
            reset_ratio: Bps::new(3000),
            liquidation_delay: 1,
            liquidation_insurance_ratio: Bps::new(1000), // 10%
            liquidator_reward: LiquidatorReward::Proportional(Bps::new(100)), // 1%
        }
    }
}

impl ProtocolConfig {
    // Create a configuration preset for testnet
    pub fn testnet() -> Self {
        let mut config = Self::default();
        config.fee_rate = Bps::new(10);
        config.liquidator_reward = LiquidatorReward::Fixed(dec!(1));
        config
    }

    // Create a configuration preset for mainnet with conservative settings
    pub fn mainnet_conservative() -> Self {
        let mut config = Self::default();
        config.default_margin_ratio = Bps::new(4000);
        config.liquidation_ratio = Bps::new(2000);
        config.reset_ratio = Bps::new(4000);
        config.liquidation_delay = 10;
        config
    }

    // Validate the configuration for internal consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        let in_unit_range = |bps: Bps| bps >= Bps::new(0) && bps <= Bps::MAX_RATIO;

        // fee checks
        if !in_unit_range(self.fee_rate) || self.fee_rate == Bps::MAX_RATIO {
            return Err(ConfigError::InvalidFees {
                reason: "fee rate must be in [0, 100%)".to_string(),
            });
        }
        if !in_unit_range(self.insurance_ratio) || !in_unit_range(self.referral_ratio) {
            return Err(ConfigError::InvalidFees {
                reason: "fee shares must be in [0, 100%]".to_string(),
            });
        }
        if self.insurance_ratio.value() + self.referral_ratio.value() > Bps::MAX_RATIO.value() {
            return Err(ConfigError::InvalidFees {
                reason: "insurance + referral shares exceed 100%".to_string(),
            });
        }

        // margin checks
        if self.liquidation_ratio >= self.default_margin_ratio {
            return Err(ConfigError::InvalidMargin {
                reason: "liquidation threshold must be below the margin floor".to_string(),
            });
        }
        if self.reset_ratio <= self.liquidation_ratio {
            return Err(ConfigError::InvalidMargin {
                reason: "reset threshold must be above the liquidation threshold".to_string(),
            });
        }

        // liquidation checks
        if self.liquidation_delay == 0 {
            return Err(ConfigError::InvalidLiquidation {
                reason: "delay window must be at least one sequence".to_string(),
            });
        }
        if !in_unit_range(self.liquidation_insurance_ratio) {
            return Err(ConfigError::InvalidLiquidation {
                reason: "insurance slice must be in [0, 100%]".to_string(),
            });
        }
        match self.liquidator_reward {
            LiquidatorReward::Fixed(amount) if amount < Decimal::ZERO => {
                return Err(ConfigError::InvalidLiquidation {
                    reason: "fixed reward cannot be negative".to_string(),
                });
            }
            LiquidatorReward::Proportional(bps) if !in_unit_range(bps) => {
                return Err(ConfigError::InvalidLiquidation {
                    reason: "proportional reward must be in [0, 100%]".to_string(),
                });
            }
            _ => {}
        }

        Ok(())
    }

    /// A per-market floor must still sit above the liquidation threshold.
    pub fn validate_margin_floor(&self, floor: Bps) -> Result<(), ConfigError> {
        if floor <= self.liquidation_ratio || floor > Bps::new(i32::MAX / 2) {
            return Err(ConfigError::InvalidMargin {
                reason: format!(
                    "margin floor {} must be above the liquidation threshold {}",
                    floor, self.liquidation_ratio
                ),
            });
        }
        Ok(())
    }
}

// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid margin config: {reason}")]
    InvalidMargin { reason: String },
    #[error("Invalid fee config: {reason}")]
    InvalidFees { reason: String },
    #[error("Invalid liquidation config: {reason}")]
    InvalidLiquidation { reason: String },
}

// Environment presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Development,
    Testnet,
    Mainnet,
}

impl Environment {
    pub fn config(&self) -> ProtocolConfig {
        match self {
            Environment::Development => ProtocolConfig::default(),
            Environment::Testnet => ProtocolConfig::testnet(),
            Environment::Mainnet => ProtocolConfig::mainnet_conservative(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = ProtocolConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_testnet_config_valid() {
        let config = ProtocolConfig::testnet();
        assert!(config.validate().is_ok());
        assert_eq!(config.liquidator_reward, LiquidatorReward::Fixed(dec!(1)));
    }

    #[test]
    fn test_mainnet_config_valid() {
        let config = ProtocolConfig::mainnet_conservative();
        assert!(config.validate().is_ok());
        assert_eq!(config.liquidation_delay, 10);
    }

    #[test]
    fn test_liquidation_threshold_must_sit_below_floor() {
        let mut config = ProtocolConfig::default();
        config.liquidation_ratio = config.default_margin_ratio;

        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::InvalidMargin { .. })));
    }

    #[test]
    fn test_reset_must_sit_above_liquidation() {
        let mut config = ProtocolConfig::default();
        config.reset_ratio = config.liquidation_ratio;

        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::InvalidMargin { .. })));
    }

    #[test]
    fn test_fee_shares_cannot_exceed_total() {
        let mut config = ProtocolConfig::default();
        config.insurance_ratio = Bps::new(9000);
        config.referral_ratio = Bps::new(2000);

        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::InvalidFees { .. })));
    }

    #[test]
    fn test_zero_delay_rejected() {
        let mut config = ProtocolConfig::default();
        config.liquidation_delay = 0;

        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::InvalidLiquidation { .. })));
    }

    #[test]
    fn test_market_floor_validation() {
        let config = ProtocolConfig::default();
        assert!(config.validate_margin_floor(Bps::new(2000)).is_ok());
        assert!(config.validate_margin_floor(Bps::new(1500)).is_err());
    }

    #[test]
    fn test_reward_schedules() {
        assert_eq!(LiquidatorReward::Fixed(dec!(5)).amount(dec!(1000)), dec!(5));
        assert_eq!(
            LiquidatorReward::Proportional(Bps::new(100)).amount(dec!(1000)),
            dec!(10)
        );
    }

    #[test]
    fn test_environment_presets() {
        assert!(Environment::Development.config().validate().is_ok());
        assert!(Environment::Testnet.config().validate().is_ok());
        assert!(Environment::Mainnet.config().validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = ProtocolConfig::mainnet_conservative();
        let json = serde_json::to_string(&config).unwrap();
        let back: ProtocolConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
