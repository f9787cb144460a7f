// 8.0.2: result types and errors for engine operations.

use crate::config::ConfigError;
use crate::custody::CustodyError;
use crate::fees::FeeSplit;
use crate::lending::LendingError;
use crate::liquidation::Settlement;
use crate::margin::{MarginRatio, MarginSnapshot, MarginStatus};
use crate::market::MarketError;
use crate::position::{Position, PositionKey};
use crate::price_feed::PriceFeedError;
use crate::swap::SwapError;
use crate::types::{AccountId, Bps, MarketId, PoolId, Sequence};
use rust_decimal::Decimal;

#[derive(Debug, Clone)]
pub struct OpenResult {
    pub key: PositionKey,
    pub held_out: Decimal,
    pub fee: FeeSplit,
    pub ratio: MarginRatio,
    pub increase: bool,
    pub position: Position,
}

#[derive(Debug, Clone)]
pub struct CloseResult {
    pub key: PositionKey,
    pub closed_held: Decimal,
    // held asset fee, taken out of closed_held before the sale
    pub fee: FeeSplit,
    pub proceeds: Decimal,
    pub repaid: Decimal,
    // what went back to the trader after the repay
    pub returned: Decimal,
    // None once the position is fully closed
    pub remaining: Option<Position>,
}

#[derive(Debug, Clone)]
pub struct LiquidationResult {
    pub key: PositionKey,
    pub liquidator: AccountId,
    pub held_sold: Decimal,
    pub fee: FeeSplit,
    pub ratio: MarginRatio,
    pub settlement: Settlement,
}

/// Current ratio next to the limits that act on it.
#[derive(Debug, Clone, Copy)]
pub struct MarginView {
    pub current: MarginRatio,
    pub market_limit: Bps,
    pub liquidation_threshold: Bps,
    pub status: MarginStatus,
    // held value at the feed rate less the cost basis, debt not netted
    pub unrealized_pnl: Decimal,
    pub snapshot: MarginSnapshot,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error("Market {0:?} not found")]
    MarketNotFound(MarketId),

    #[error("Lending pool {0:?} not found")]
    PoolNotFound(PoolId),

    #[error("Lending pool {0:?} already backs a market")]
    PoolInUse(PoolId),

    #[error("No open position for {0:?}")]
    PositionNotFound(PositionKey),

    #[error("Invalid amount: {0}")]
    InvalidAmount(Decimal),

    #[error("Deposit {deposit} does not cover the trading fee {fee}")]
    DepositBelowFee { deposit: Decimal, fee: Decimal },

    #[error("Close amount {requested} exceeds held {held}")]
    CloseExceedsHeld { requested: Decimal, held: Decimal },

    #[error("Insufficient margin: ratio {ratio} below required {required}")]
    InsufficientMargin { ratio: MarginRatio, required: Bps },

    #[error("Margin ratio {ratio} is lower than limit {required}")]
    MarginTooLowToClose { ratio: MarginRatio, required: Bps },

    #[error("Slippage exceeded: minimum {minimum}, actual {actual}")]
    SlippageExceeded { minimum: Decimal, actual: Decimal },

    #[error("Proceeds {proceeds} cannot repay {owed}")]
    ProceedsBelowDebt { proceeds: Decimal, owed: Decimal },

    #[error("Position not liquidatable: ratio {ratio}, threshold {threshold}")]
    NotLiquidatable { ratio: MarginRatio, threshold: Bps },

    #[error("Position already marked for liquidation")]
    AlreadyMarked,

    #[error("Position is not marked for liquidation")]
    NotMarked,

    #[error("Position has not recovered: ratio {ratio}, reset threshold {threshold}")]
    NotRecovered { ratio: MarginRatio, threshold: Bps },

    #[error("Liquidation delay not elapsed: marked at {marked_at:?}, now {now:?}, delay {delay}")]
    LiquidationDelayNotElapsed {
        marked_at: Sequence,
        now: Sequence,
        delay: u64,
    },

    #[error("Lending error: {0}")]
    Lending(#[from] LendingError),

    #[error("Price feed error: {0}")]
    PriceFeed(#[from] PriceFeedError),

    #[error("Swap error: {0}")]
    Swap(#[from] SwapError),

    #[error("Custody error: {0}")]
    Custody(#[from] CustodyError),

    #[error("Market error: {0}")]
    Market(#[from] MarketError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}
