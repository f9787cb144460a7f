//! Open, increase and close.
//!
//! Every check and quote runs before the first mutation. After that the
//! only fallible steps are the pool borrow and the venue swap, and each
//! undoes what came before it when it fails.

use super::core::Engine;
use super::results::{CloseResult, EngineError, MarginView, OpenResult};
use crate::custody::{CustodyError, Holder};
use crate::events::{EventPayload, PositionClosedEvent, TradeOpenedEvent};
use crate::fees::trading_fee;
use crate::lending::LendingError;
use crate::margin::{evaluate_margin_status, margin_ratio};
use crate::position::{increase_position, reduce_position, Position, PositionKey};
use crate::types::{AccountId, MarketId, Side};
use rust_decimal::Decimal;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OpenRequest {
    pub trader: AccountId,
    pub market_id: MarketId,
    pub side: Side,
    // in the borrowed asset, fee included
    pub deposit: Decimal,
    pub borrow: Decimal,
    pub min_held_out: Decimal,
    pub referrer: Option<AccountId>,
}

impl OpenRequest {
    pub fn new(trader: AccountId, market_id: MarketId, side: Side, deposit: Decimal, borrow: Decimal) -> Self {
        Self {
            trader,
            market_id,
            side,
            deposit,
            borrow,
            min_held_out: Decimal::ZERO,
            referrer: None,
        }
    }

    pub fn with_min_held_out(mut self, min_held_out: Decimal) -> Self {
        self.min_held_out = min_held_out;
        self
    }

    pub fn with_referrer(mut self, referrer: AccountId) -> Self {
        self.referrer = Some(referrer);
        self
    }

    pub fn key(&self) -> PositionKey {
        PositionKey::new(self.trader, self.market_id, self.side)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CloseRequest {
    pub trader: AccountId,
    pub market_id: MarketId,
    pub side: Side,
    pub close_held: Decimal,
    pub min_repay_out: Decimal,
}

impl CloseRequest {
    pub fn new(trader: AccountId, market_id: MarketId, side: Side, close_held: Decimal) -> Self {
        Self {
            trader,
            market_id,
            side,
            close_held,
            min_repay_out: Decimal::ZERO,
        }
    }

    pub fn with_min_repay_out(mut self, min_repay_out: Decimal) -> Self {
        self.min_repay_out = min_repay_out;
        self
    }

    pub fn key(&self) -> PositionKey {
        PositionKey::new(self.trader, self.market_id, self.side)
    }
}

impl Engine {
    /// Opens a position, or grows the existing one on the same side.
    /// A zero borrow is a pure collateral top-up.
    pub fn open(&mut self, request: OpenRequest) -> Result<OpenResult, EngineError> {
        let OpenRequest {
            trader,
            market_id,
            side,
            deposit,
            borrow,
            min_held_out,
            referrer,
        } = request;
        let key = request.key();
        let seq = self.sequence;

        if deposit <= Decimal::ZERO {
            return Err(EngineError::InvalidAmount(deposit));
        }
        if borrow < Decimal::ZERO {
            return Err(EngineError::InvalidAmount(borrow));
        }

        // 1. reads and checks
        let market = self.market_ref(market_id)?;
        let held_asset = market.held_asset(side);
        let borrowed_asset = market.borrowed_asset(side);
        let pool_id = market.borrow_pool(side);
        let floor = market.margin_floor(self.config.protocol.default_margin_ratio);

        let pool = self.pool(pool_id)?;
        let owed_before = pool.owed_amount(trader, seq);
        let available = pool.available_liquidity();
        if borrow > available {
            return Err(LendingError::InsufficientLiquidity {
                requested: borrow,
                available,
            }
            .into());
        }

        let trader_balance = self.balances.balance(Holder::Account(trader), borrowed_asset);
        if deposit > trader_balance {
            return Err(CustodyError::InsufficientBalance {
                holder: Holder::Account(trader),
                asset: borrowed_asset,
                available: trader_balance,
                requested: deposit,
            }
            .into());
        }

        let fee = trading_fee(self.config.protocol.fee_rate, deposit, borrow);
        if deposit <= fee {
            return Err(EngineError::DepositBelowFee { deposit, fee });
        }
        let net_deposit = deposit - fee;
        let swap_in = net_deposit + borrow;

        let swap_rate = self.rate(borrowed_asset, held_asset)?;
        let margin_rate = self.rate(held_asset, borrowed_asset)?;
        let quoted = self.venue.quote(borrowed_asset, held_asset, swap_in, swap_rate)?;
        if quoted < min_held_out || quoted <= Decimal::ZERO {
            return Err(EngineError::SlippageExceeded {
                minimum: min_held_out,
                actual: quoted,
            });
        }

        let existing = self.ledger.get(&key).cloned();
        let held_after = existing.as_ref().map_or(Decimal::ZERO, |p| p.held) + quoted;
        let ratio = margin_ratio(margin_rate.convert(held_after), owed_before + borrow);
        if ratio.is_below(floor) {
            return Err(EngineError::InsufficientMargin { ratio, required: floor });
        }

        // 2. mutations
        self.balances
            .transfer(Holder::Account(trader), Holder::Custody, borrowed_asset, deposit)?;

        if borrow > Decimal::ZERO {
            if let Err(e) = self.pool_mut(pool_id)?.borrow(trader, borrow, seq) {
                self.balances
                    .transfer(Holder::Custody, Holder::Account(trader), borrowed_asset, deposit)?;
                return Err(e.into());
            }
            self.balances.credit(Holder::Custody, borrowed_asset, borrow);
        }

        let held_out = match self.venue.swap(borrowed_asset, held_asset, swap_in, swap_rate) {
            Ok(out) => out,
            Err(e) => {
                warn!(trader = trader.0, market = market_id.0, error = %e, "swap failed, unwinding open");
                if borrow > Decimal::ZERO {
                    self.balances.debit(Holder::Custody, borrowed_asset, borrow)?;
                    self.pool_mut(pool_id)?.repay(trader, borrow, seq);
                }
                self.balances
                    .transfer(Holder::Custody, Holder::Account(trader), borrowed_asset, deposit)?;
                return Err(e.into());
            }
        };
        self.balances.debit(Holder::Custody, borrowed_asset, swap_in)?;
        self.balances.credit(Holder::Custody, held_asset, held_out);

        let split = self.distribute_fee(fee, borrowed_asset, market_id, trader, referrer)?;

        let position = match &existing {
            Some(current) => increase_position(current, net_deposit, borrow, held_out, seq),
            None => Position::new(key, net_deposit, borrow, held_out, seq),
        };
        self.ledger.upsert(position.clone());

        let realized_price = swap_in.checked_div(held_out).unwrap_or(Decimal::ZERO);
        let increase = existing.is_some();
        info!(
            trader = trader.0,
            market = market_id.0,
            %side,
            %deposit,
            %borrow,
            %fee,
            %held_out,
            %ratio,
            increase,
            "position opened"
        );

        self.emit_event(EventPayload::TradeOpened(TradeOpenedEvent {
            trader,
            market_id,
            side,
            deposit,
            borrow,
            fee,
            held_out,
            realized_price,
            ratio,
            price: margin_rate,
            increase,
            position: position.clone(),
        }));

        Ok(OpenResult {
            key,
            held_out,
            fee: split,
            ratio,
            increase,
            position,
        })
    }

    /// Takes the trading fee out of `close_held`, sells the rest of it,
    /// repays the matching share of the debt and returns the rest to the trader.
    pub fn close(&mut self, request: CloseRequest) -> Result<CloseResult, EngineError> {
        let CloseRequest {
            trader,
            market_id,
            side,
            close_held,
            min_repay_out,
        } = request;
        let key = request.key();
        let seq = self.sequence;

        if close_held <= Decimal::ZERO {
            return Err(EngineError::InvalidAmount(close_held));
        }

        // 1. reads and checks
        let market = self.market_ref(market_id)?;
        let position = self.position_ref(&key)?;
        if close_held > position.held {
            return Err(EngineError::CloseExceedsHeld {
                requested: close_held,
                held: position.held,
            });
        }

        let held_asset = market.held_asset(side);
        let borrowed_asset = market.borrowed_asset(side);
        let pool_id = market.borrow_pool(side);
        let floor = market.margin_floor(self.config.protocol.default_margin_ratio);

        let snapshot = self.evaluate_position(market, position)?;
        if snapshot.ratio.is_below(floor) {
            return Err(EngineError::MarginTooLowToClose {
                ratio: snapshot.ratio,
                required: floor,
            });
        }

        let full = close_held == position.held;
        let repay_share = if full {
            snapshot.owed
        } else {
            snapshot.owed * close_held / position.held
        };
        let reduction = reduce_position(position, close_held, seq);

        // the trading fee is charged again on the way out, in the held asset
        let fee = trading_fee(self.config.protocol.fee_rate, close_held, Decimal::ZERO);
        let sell = close_held - fee;

        let proceeds = self.venue.quote(held_asset, borrowed_asset, sell, snapshot.rate)?;
        if proceeds < min_repay_out {
            return Err(EngineError::SlippageExceeded {
                minimum: min_repay_out,
                actual: proceeds,
            });
        }
        if proceeds < repay_share {
            return Err(EngineError::ProceedsBelowDebt {
                proceeds,
                owed: repay_share,
            });
        }

        // 2. mutations. the fee stays in custody until it is distributed
        self.balances.debit(Holder::Custody, held_asset, sell)?;
        let proceeds = match self.venue.swap(held_asset, borrowed_asset, sell, snapshot.rate) {
            Ok(out) => out,
            Err(e) => {
                self.balances.credit(Holder::Custody, held_asset, sell);
                return Err(e.into());
            }
        };
        self.balances.credit(Holder::Custody, borrowed_asset, proceeds);
        let split = self.distribute_fee(fee, held_asset, market_id, trader, None)?;

        let repaid = if repay_share > Decimal::ZERO {
            self.pool_mut(pool_id)?.repay(trader, repay_share, seq)
        } else {
            Decimal::ZERO
        };
        self.balances.debit(Holder::Custody, borrowed_asset, repaid)?;

        let returned = proceeds - repaid;
        self.balances
            .transfer(Holder::Custody, Holder::Account(trader), borrowed_asset, returned)?;

        let remaining = match reduction.remaining {
            Some(rest) => {
                self.ledger.upsert(rest.clone());
                Some(rest)
            }
            None => {
                self.ledger.remove(&key);
                None
            }
        };
        let remaining_held = remaining.as_ref().map_or(Decimal::ZERO, |p| p.held);

        info!(
            trader = trader.0,
            market = market_id.0,
            %side,
            %close_held,
            %fee,
            %proceeds,
            %repaid,
            %returned,
            ratio = %snapshot.ratio,
            "position closed"
        );

        self.emit_event(EventPayload::PositionClosed(PositionClosedEvent {
            trader,
            market_id,
            side,
            closed_held: close_held,
            fee,
            proceeds,
            repaid,
            returned,
            remaining_held,
            ratio: snapshot.ratio,
            price: snapshot.rate,
        }));

        Ok(CloseResult {
            key,
            closed_held: close_held,
            fee: split,
            proceeds,
            repaid,
            returned,
            remaining,
        })
    }

    /// Current margin ratio and the market limit it is held against.
    pub fn margin_ratio(&self, trader: AccountId, market_id: MarketId, side: Side) -> Result<MarginView, EngineError> {
        let key = PositionKey::new(trader, market_id, side);
        let market = self.market_ref(market_id)?;
        let position = self.position_ref(&key)?;

        let snapshot = self.evaluate_position(market, position)?;
        let market_limit = market.margin_floor(self.config.protocol.default_margin_ratio);
        let liquidation_threshold = self.config.protocol.liquidation_ratio;

        Ok(MarginView {
            current: snapshot.ratio,
            market_limit,
            liquidation_threshold,
            status: evaluate_margin_status(snapshot.ratio, market_limit, liquidation_threshold),
            unrealized_pnl: position.unrealized_pnl(snapshot.held_value),
            snapshot,
        })
    }
}
