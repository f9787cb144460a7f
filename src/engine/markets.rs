//! Administrative surface: pools, markets, margin floors, protocol parameters,
//! the referral program and insurance moves. Access control is the host's job.

use super::core::Engine;
use super::results::EngineError;
use crate::config::ProtocolConfig;
use crate::custody::Holder;
use crate::events::{
    ConfigUpdatedEvent, DefaultMarginRatioUpdatedEvent, EventPayload, InsuranceMovedEvent,
    MarketMarginRatioUpdatedEvent, MarketRegisteredEvent,
};
use crate::lending::LendingPool;
use crate::market::MarketError;
use crate::referral::Referral;
use crate::types::{AccountId, AssetId, AssetPair, Bps, MarketId, PoolId};
use rust_decimal::Decimal;
use tracing::info;

impl Engine {
    pub fn register_pool(&mut self, pool: impl LendingPool + 'static) -> PoolId {
        let pool_id = PoolId(self.next_pool_id);
        self.next_pool_id += 1;
        self.pools.insert(pool_id, Box::new(pool));
        pool_id
    }

    /// Binds two pools into a market. The pair is ordered by asset, so the
    /// pools may be passed in either order.
    pub fn register_market(&mut self, pool_a: PoolId, pool_b: PoolId) -> Result<MarketId, EngineError> {
        let asset_a = self.pool(pool_a)?.asset();
        let asset_b = self.pool(pool_b)?.asset();

        for pool_id in [pool_a, pool_b] {
            if self.registry.iter().any(|m| m.pool0 == pool_id || m.pool1 == pool_id) {
                return Err(EngineError::PoolInUse(pool_id));
            }
        }

        let pair = AssetPair::new(asset_a, asset_b).ok_or(MarketError::IdenticalAssets(asset_a))?;
        let (pool0, pool1) = if pair.asset0 == asset_a {
            (pool_a, pool_b)
        } else {
            (pool_b, pool_a)
        };

        let market_id = self.registry.register(pair, pool0, pool1)?;
        info!(market = market_id.0, asset0 = %pair.asset0, asset1 = %pair.asset1, "market registered");

        self.emit_event(EventPayload::MarketRegistered(MarketRegisteredEvent {
            market_id,
            asset0: pair.asset0,
            asset1: pair.asset1,
            pool0,
            pool1,
        }));

        Ok(market_id)
    }

    pub fn set_default_margin_ratio(&mut self, ratio: Bps) -> Result<(), EngineError> {
        let mut protocol = self.config.protocol.clone();
        let old_ratio = protocol.default_margin_ratio;
        protocol.default_margin_ratio = ratio;
        protocol.validate()?;
        self.config.protocol = protocol;

        info!(%old_ratio, new_ratio = %ratio, "default margin ratio updated");
        self.emit_event(EventPayload::DefaultMarginRatioUpdated(DefaultMarginRatioUpdatedEvent {
            old_ratio,
            new_ratio: ratio,
        }));
        Ok(())
    }

    /// `None` drops the override and the market follows the protocol default again.
    pub fn set_market_margin_ratio(&mut self, market_id: MarketId, ratio: Option<Bps>) -> Result<(), EngineError> {
        let old_ratio = self.market_ref(market_id)?.margin_ratio_override;
        if let Some(floor) = ratio {
            self.config.protocol.validate_margin_floor(floor)?;
        }
        self.registry.set_margin_override(market_id, ratio)?;

        info!(market = market_id.0, ?old_ratio, new_ratio = ?ratio, "market margin ratio updated");
        self.emit_event(EventPayload::MarketMarginRatioUpdated(MarketMarginRatioUpdatedEvent {
            market_id,
            old_ratio,
            new_ratio: ratio,
        }));
        Ok(())
    }

    /// Replaces every protocol parameter at once. Existing market overrides
    /// must still sit above the new liquidation threshold.
    pub fn set_protocol_config(&mut self, protocol: ProtocolConfig) -> Result<(), EngineError> {
        protocol.validate()?;
        for market in self.registry.iter() {
            if let Some(floor) = market.margin_ratio_override {
                protocol.validate_margin_floor(floor)?;
            }
        }
        self.config.protocol = protocol.clone();

        info!(fee_rate = %protocol.fee_rate, delay = protocol.liquidation_delay, "protocol config updated");
        self.emit_event(EventPayload::ConfigUpdated(ConfigUpdatedEvent { config: protocol }));
        Ok(())
    }

    pub fn set_referral(&mut self, program: impl Referral + 'static) {
        self.referral = Some(Box::new(program));
    }

    pub fn clear_referral(&mut self) {
        self.referral = None;
    }

    /// Pays insurance reserve funds out to an account.
    pub fn move_insurance(
        &mut self,
        market_id: MarketId,
        asset: AssetId,
        to: AccountId,
        amount: Decimal,
    ) -> Result<Decimal, EngineError> {
        if amount <= Decimal::ZERO {
            return Err(EngineError::InvalidAmount(amount));
        }

        let reserve = self
            .market_ref(market_id)?
            .insurance(asset)
            .ok_or(MarketError::AssetNotInMarket { market: market_id, asset })?;
        if !reserve.can_cover(amount) {
            return Err(MarketError::InsufficientInsurance {
                requested: amount,
                available: reserve.balance,
            }
            .into());
        }

        self.balances.transfer(Holder::Custody, Holder::Account(to), asset, amount)?;

        let reserve = self
            .registry
            .get_mut(market_id)
            .and_then(|market| market.insurance_mut(asset))
            .ok_or(MarketError::AssetNotInMarket { market: market_id, asset })?;
        reserve.withdraw(amount)?;
        let remaining = reserve.balance;

        info!(market = market_id.0, %asset, to = to.0, %amount, "insurance moved");
        self.emit_event(EventPayload::InsuranceMoved(InsuranceMovedEvent {
            market_id,
            asset,
            to,
            amount,
            remaining,
        }));
        Ok(remaining)
    }
}
