// 10.0: every successful state change produces an event. failed calls produce none.
// used for audit trails and for notifying indexers. EventPayload lists all event types.

use crate::config::ProtocolConfig;
use crate::fees::FeeSplit;
use crate::liquidation::Settlement;
use crate::margin::MarginRatio;
use crate::position::Position;
use crate::types::{AccountId, AssetId, Bps, MarketId, PoolId, Rate, Sequence, Side, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub sequence: Sequence,
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(id: EventId, sequence: Sequence, timestamp: Timestamp, payload: EventPayload) -> Self {
        Self {
            id,
            sequence,
            timestamp,
            payload,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    // Admin events
    MarketRegistered(MarketRegisteredEvent),
    DefaultMarginRatioUpdated(DefaultMarginRatioUpdatedEvent),
    MarketMarginRatioUpdated(MarketMarginRatioUpdatedEvent),
    ConfigUpdated(ConfigUpdatedEvent),
    InsuranceMoved(InsuranceMovedEvent),

    // Trade events
    TradeOpened(TradeOpenedEvent),
    PositionClosed(PositionClosedEvent),
    FeesDistributed(FeesDistributedEvent),

    // Liquidation events
    LiquidationMarked(LiquidationMarkedEvent),
    Liquidated(LiquidatedEvent),
    MarkerReset(MarkerResetEvent),
    BadDebt(BadDebtEvent),

    // Custody events
    Deposit(DepositEvent),
    Withdrawal(WithdrawalEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketRegisteredEvent {
    pub market_id: MarketId,
    pub asset0: AssetId,
    pub asset1: AssetId,
    pub pool0: PoolId,
    pub pool1: PoolId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultMarginRatioUpdatedEvent {
    pub old_ratio: Bps,
    pub new_ratio: Bps,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketMarginRatioUpdatedEvent {
    pub market_id: MarketId,
    // None means the market follows the protocol default
    pub old_ratio: Option<Bps>,
    pub new_ratio: Option<Bps>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigUpdatedEvent {
    pub config: ProtocolConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsuranceMovedEvent {
    pub market_id: MarketId,
    pub asset: AssetId,
    pub to: AccountId,
    pub amount: Decimal,
    pub remaining: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeOpenedEvent {
    pub trader: AccountId,
    pub market_id: MarketId,
    pub side: Side,
    pub deposit: Decimal,
    pub borrow: Decimal,
    pub fee: Decimal,
    pub held_out: Decimal,
    // borrowed asset paid per held unit on this trade
    pub realized_price: Decimal,
    pub ratio: MarginRatio,
    pub price: Rate,
    pub increase: bool,
    pub position: Position,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionClosedEvent {
    pub trader: AccountId,
    pub market_id: MarketId,
    pub side: Side,
    pub closed_held: Decimal,
    // charged in the held asset before the sale
    pub fee: Decimal,
    pub proceeds: Decimal,
    pub repaid: Decimal,
    pub returned: Decimal,
    pub remaining_held: Decimal,
    pub ratio: MarginRatio,
    pub price: Rate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeesDistributedEvent {
    pub market_id: MarketId,
    pub trader: AccountId,
    pub asset: AssetId,
    pub referrer: Option<AccountId>,
    pub split: FeeSplit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidationMarkedEvent {
    pub trader: AccountId,
    pub market_id: MarketId,
    pub side: Side,
    pub marker: AccountId,
    pub ratio: MarginRatio,
    pub price: Rate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidatedEvent {
    pub trader: AccountId,
    pub market_id: MarketId,
    pub side: Side,
    pub liquidator: AccountId,
    pub held_sold: Decimal,
    pub fee: Decimal,
    pub settlement: Settlement,
    pub ratio: MarginRatio,
    pub price: Rate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkerResetEvent {
    pub trader: AccountId,
    pub market_id: MarketId,
    pub side: Side,
    pub caller: AccountId,
    pub ratio: MarginRatio,
    pub price: Rate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BadDebtEvent {
    pub market_id: MarketId,
    pub trader: AccountId,
    pub asset: AssetId,
    pub shortfall: Decimal,
    pub covered_by_insurance: Decimal,
    pub written_off: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositEvent {
    pub account_id: AccountId,
    pub asset: AssetId,
    pub amount: Decimal,
    pub new_balance: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalEvent {
    pub account_id: AccountId,
    pub asset: AssetId,
    pub amount: Decimal,
    pub new_balance: Decimal,
}

impl EventPayload {
    // the trader a payload concerns, if any
    pub fn trader(&self) -> Option<AccountId> {
        match self {
            EventPayload::TradeOpened(e) => Some(e.trader),
            EventPayload::PositionClosed(e) => Some(e.trader),
            EventPayload::FeesDistributed(e) => Some(e.trader),
            EventPayload::LiquidationMarked(e) => Some(e.trader),
            EventPayload::Liquidated(e) => Some(e.trader),
            EventPayload::MarkerReset(e) => Some(e.trader),
            EventPayload::BadDebt(e) => Some(e.trader),
            EventPayload::Deposit(e) => Some(e.account_id),
            EventPayload::Withdrawal(e) => Some(e.account_id),
            _ => None,
        }
    }
}
