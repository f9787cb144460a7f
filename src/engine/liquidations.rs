//! Two-phase liquidation: mark, wait out the delay window, then liquidate.
//! A marked position that recovers past the reset threshold can be cleared.

use super::core::Engine;
use super::results::{EngineError, LiquidationResult};
use crate::custody::Holder;
use crate::events::{BadDebtEvent, EventPayload, LiquidatedEvent, LiquidationMarkedEvent, MarkerResetEvent};
use crate::fees::trading_fee;
use crate::liquidation::{settle, LiquidationParams};
use crate::market::MarketError;
use crate::position::{LiquidationMarker, PositionKey, PositionStatus};
use crate::types::{AccountId, MarketId, Side};
use rust_decimal::Decimal;
use tracing::{info, warn};

impl Engine {
    pub fn position_status(&self, trader: AccountId, market_id: MarketId, side: Side) -> Result<PositionStatus, EngineError> {
        let key = PositionKey::new(trader, market_id, side);
        Ok(self.position_ref(&key)?.status())
    }

    /// First phase. Records the caller and the current sequence on a position
    /// that is below the liquidation threshold.
    pub fn mark_liquidatable(
        &mut self,
        trader: AccountId,
        market_id: MarketId,
        side: Side,
        caller: AccountId,
    ) -> Result<(), EngineError> {
        let key = PositionKey::new(trader, market_id, side);
        let market = self.market_ref(market_id)?;
        let position = self.position_ref(&key)?;

        if position.marker.is_some() {
            return Err(EngineError::AlreadyMarked);
        }

        let threshold = self.config.protocol.liquidation_ratio;
        let snapshot = self.evaluate_position(market, position)?;
        if snapshot.ratio.meets(threshold) {
            return Err(EngineError::NotLiquidatable {
                ratio: snapshot.ratio,
                threshold,
            });
        }

        let marker = LiquidationMarker {
            marker: caller,
            marked_at: self.sequence,
        };
        self.ledger.set_marker(&key, Some(marker));

        info!(
            trader = trader.0,
            market = market_id.0,
            %side,
            marker = caller.0,
            ratio = %snapshot.ratio,
            sequence = self.sequence.0,
            "position marked for liquidation"
        );
        self.emit_event(EventPayload::LiquidationMarked(LiquidationMarkedEvent {
            trader,
            market_id,
            side,
            marker: caller,
            ratio: snapshot.ratio,
            price: snapshot.rate,
        }));
        Ok(())
    }

    /// Second phase. Takes the trading fee out of the held amount, sells the
    /// rest and settles the proceeds through the waterfall in `liquidation::settle`.
    pub fn liquidate(
        &mut self,
        trader: AccountId,
        market_id: MarketId,
        side: Side,
        caller: AccountId,
    ) -> Result<LiquidationResult, EngineError> {
        let key = PositionKey::new(trader, market_id, side);
        let seq = self.sequence;
        let market = self.market_ref(market_id)?;
        let position = self.position_ref(&key)?;

        let marker = position.marker.ok_or(EngineError::NotMarked)?;
        let delay = self.config.protocol.liquidation_delay;
        if seq.distance_since(marker.marked_at) <= delay {
            return Err(EngineError::LiquidationDelayNotElapsed {
                marked_at: marker.marked_at,
                now: seq,
                delay,
            });
        }

        let threshold = self.config.protocol.liquidation_ratio;
        let snapshot = self.evaluate_position(market, position)?;
        if snapshot.ratio.meets(threshold) {
            return Err(EngineError::NotLiquidatable {
                ratio: snapshot.ratio,
                threshold,
            });
        }

        let held_asset = market.held_asset(side);
        let borrowed_asset = market.borrowed_asset(side);
        let pool_id = market.borrow_pool(side);
        let insurance_available = market
            .insurance(borrowed_asset)
            .map_or(Decimal::ZERO, |reserve| reserve.balance);
        let held = position.held;
        let params = LiquidationParams {
            reward: self.config.protocol.liquidator_reward,
            insurance_slice: self.config.protocol.liquidation_insurance_ratio,
        };

        // the trading fee is taken in the held asset, the rest leaves custody through the venue
        let fee = trading_fee(self.config.protocol.fee_rate, held, Decimal::ZERO);
        let sell = held - fee;
        self.balances.debit(Holder::Custody, held_asset, sell)?;
        let proceeds = match self.venue.swap(held_asset, borrowed_asset, sell, snapshot.rate) {
            Ok(out) => out,
            Err(e) => {
                self.balances.credit(Holder::Custody, held_asset, sell);
                return Err(e.into());
            }
        };
        self.balances.credit(Holder::Custody, borrowed_asset, proceeds);
        let fee_split = self.distribute_fee(fee, held_asset, market_id, trader, None)?;

        let settlement = settle(proceeds, snapshot.owed, insurance_available, &params);

        // 1. debt. an insurance draw is already in custody, it only leaves the reserve books
        {
            let market = self
                .registry
                .get_mut(market_id)
                .ok_or(EngineError::MarketNotFound(market_id))?;
            let reserve = market
                .insurance_mut(borrowed_asset)
                .ok_or(MarketError::AssetNotInMarket { market: market_id, asset: borrowed_asset })?;
            reserve.cover_shortfall(settlement.insurance_draw);
            reserve.deposit(settlement.insurance_contribution);
        }

        let pool = self.pool_mut(pool_id)?;
        let repaid = pool.repay(trader, settlement.repaid, seq);
        let written_off = if settlement.bad_debt > Decimal::ZERO {
            pool.write_off(trader, seq)
        } else {
            Decimal::ZERO
        };
        self.balances.debit(Holder::Custody, borrowed_asset, repaid)?;

        // 2. caller reward, 3. trader payout. the insurance slice stays in custody
        self.balances.transfer(
            Holder::Custody,
            Holder::Account(caller),
            borrowed_asset,
            settlement.liquidator_reward,
        )?;
        self.balances.transfer(
            Holder::Custody,
            Holder::Account(trader),
            borrowed_asset,
            settlement.trader_payout,
        )?;

        self.ledger.remove(&key);

        if settlement.is_insolvent() {
            warn!(
                trader = trader.0,
                market = market_id.0,
                %side,
                shortfall = %(settlement.owed - settlement.proceeds),
                insurance_draw = %settlement.insurance_draw,
                bad_debt = %written_off,
                "liquidation left a shortfall"
            );
            self.emit_event(EventPayload::BadDebt(BadDebtEvent {
                market_id,
                trader,
                asset: borrowed_asset,
                shortfall: settlement.owed - settlement.proceeds,
                covered_by_insurance: settlement.insurance_draw,
                written_off,
            }));
        }

        info!(
            trader = trader.0,
            market = market_id.0,
            %side,
            liquidator = caller.0,
            %held,
            %fee,
            %proceeds,
            reward = %settlement.liquidator_reward,
            payout = %settlement.trader_payout,
            ratio = %snapshot.ratio,
            "position liquidated"
        );
        self.emit_event(EventPayload::Liquidated(LiquidatedEvent {
            trader,
            market_id,
            side,
            liquidator: caller,
            held_sold: held,
            fee,
            settlement,
            ratio: snapshot.ratio,
            price: snapshot.rate,
        }));

        Ok(LiquidationResult {
            key,
            liquidator: caller,
            held_sold: held,
            fee: fee_split,
            ratio: snapshot.ratio,
            settlement,
        })
    }

    /// Clears the marker of a position that climbed back to the reset threshold.
    /// Balances are untouched.
    pub fn reset_liquidation_marker(
        &mut self,
        trader: AccountId,
        market_id: MarketId,
        side: Side,
        caller: AccountId,
    ) -> Result<(), EngineError> {
        let key = PositionKey::new(trader, market_id, side);
        let market = self.market_ref(market_id)?;
        let position = self.position_ref(&key)?;

        if position.marker.is_none() {
            return Err(EngineError::NotMarked);
        }

        let threshold = self.config.protocol.reset_ratio;
        let snapshot = self.evaluate_position(market, position)?;
        if snapshot.ratio.is_below(threshold) {
            return Err(EngineError::NotRecovered {
                ratio: snapshot.ratio,
                threshold,
            });
        }

        self.ledger.set_marker(&key, None);

        info!(
            trader = trader.0,
            market = market_id.0,
            %side,
            caller = caller.0,
            ratio = %snapshot.ratio,
            "liquidation marker reset"
        );
        self.emit_event(EventPayload::MarkerReset(MarkerResetEvent {
            trader,
            market_id,
            side,
            caller,
            ratio: snapshot.ratio,
            price: snapshot.rate,
        }));
        Ok(())
    }
}
