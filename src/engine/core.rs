// 8.0 engine/core.rs: main engine. owns the market registry, the position ledger,
// custody balances and every collaborator. nothing here is process wide.

use super::config::EngineConfig;
use super::results::EngineError;
use crate::config::ProtocolConfig;
use crate::custody::{Balances, Holder};
use crate::events::{DepositEvent, Event, EventId, EventPayload, WithdrawalEvent};
use crate::lending::LendingPool;
use crate::margin::MarginSnapshot;
use crate::market::{Market, MarketError, MarketRegistry};
use crate::position::{Position, PositionKey, PositionLedger};
use crate::price_feed::PriceFeed;
use crate::referral::Referral;
use crate::swap::SwapVenue;
use crate::types::{AccountId, AssetId, MarketId, PoolId, Rate, Sequence, Side, Timestamp};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{debug, info};

/** 8.1: main engine struct. all state lives here */
#[derive(Debug)]
pub struct Engine {
    pub(super) config: EngineConfig,
    pub(super) registry: MarketRegistry,
    pub(super) ledger: PositionLedger,
    pub(super) balances: Balances,
    pub(super) pools: HashMap<PoolId, Box<dyn LendingPool>>,
    pub(super) next_pool_id: u32,
    pub(super) price_feed: Box<dyn PriceFeed>,
    pub(super) venue: Box<dyn SwapVenue>,
    pub(super) referral: Option<Box<dyn Referral>>,
    pub(super) events: Vec<Event>,
    pub(super) next_event_id: u64,
    pub(super) sequence: Sequence,
    pub(super) current_time: Timestamp,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        price_feed: impl PriceFeed + 'static,
        venue: impl SwapVenue + 'static,
    ) -> Result<Self, EngineError> {
        config.protocol.validate()?;

        Ok(Self {
            config,
            registry: MarketRegistry::new(),
            ledger: PositionLedger::new(),
            balances: Balances::new(),
            pools: HashMap::new(),
            next_pool_id: 0,
            price_feed: Box::new(price_feed),
            venue: Box::new(venue),
            referral: None,
            events: Vec::new(),
            next_event_id: 1,
            sequence: Sequence::default(),
            current_time: Timestamp::from_millis(0),
        })
    }

    // 8.1.1: clocks. the sequence drives the liquidation delay, the timestamp only stamps events

    pub fn sequence(&self) -> Sequence {
        self.sequence
    }

    pub fn advance_sequence(&mut self, by: u64) -> Sequence {
        self.sequence = self.sequence.advance(by);
        self.sequence
    }

    pub fn set_time(&mut self, timestamp: Timestamp) {
        self.current_time = timestamp;
    }

    pub fn time(&self) -> Timestamp {
        self.current_time
    }

    pub fn protocol_config(&self) -> &ProtocolConfig {
        &self.config.protocol
    }

    // 8.1.2: custody. funds in and out of the engine

    pub fn deposit(&mut self, account_id: AccountId, asset: AssetId, amount: Decimal) -> Result<Decimal, EngineError> {
        let new_balance = self.balances.deposit(account_id, asset, amount)?;

        self.emit_event(EventPayload::Deposit(DepositEvent {
            account_id,
            asset,
            amount,
            new_balance,
        }));

        Ok(new_balance)
    }

    pub fn withdraw(&mut self, account_id: AccountId, asset: AssetId, amount: Decimal) -> Result<Decimal, EngineError> {
        let new_balance = self.balances.withdraw(account_id, asset, amount)?;
        info!(account = account_id.0, %asset, %amount, "withdrawal");

        self.emit_event(EventPayload::Withdrawal(WithdrawalEvent {
            account_id,
            asset,
            amount,
            new_balance,
        }));

        Ok(new_balance)
    }

    pub fn balance(&self, holder: Holder, asset: AssetId) -> Decimal {
        self.balances.balance(holder, asset)
    }

    pub fn account_balance(&self, account_id: AccountId, asset: AssetId) -> Decimal {
        self.balances.balance(Holder::Account(account_id), asset)
    }

    // 8.1.3: read only views

    pub fn market(&self, market_id: MarketId) -> Option<&Market> {
        self.registry.get(market_id)
    }

    pub fn market_count(&self) -> usize {
        self.registry.count()
    }

    pub fn find_market(&self, a: AssetId, b: AssetId) -> Option<&Market> {
        self.registry.find_by_pair(a, b)
    }

    pub fn markets(&self) -> impl Iterator<Item = &Market> {
        self.registry.iter()
    }

    pub fn position(&self, trader: AccountId, market_id: MarketId, side: Side) -> Option<&Position> {
        self.ledger.get(&PositionKey::new(trader, market_id, side))
    }

    pub fn positions(&self) -> &PositionLedger {
        &self.ledger
    }

    pub fn pool_available(&self, market_id: MarketId, asset: AssetId) -> Result<Decimal, EngineError> {
        let market = self.market_ref(market_id)?;
        let pool_id = market
            .pool_for(asset)
            .ok_or(MarketError::AssetNotInMarket { market: market_id, asset })?;
        Ok(self.pool(pool_id)?.available_liquidity())
    }

    /// What the trader owes the pool behind this position, interest included.
    pub fn owed_amount(&self, trader: AccountId, market_id: MarketId, side: Side) -> Result<Decimal, EngineError> {
        let market = self.market_ref(market_id)?;
        let pool = self.pool(market.borrow_pool(side))?;
        Ok(pool.owed_amount(trader, self.sequence))
    }

    pub fn insurance_balance(&self, market_id: MarketId, asset: AssetId) -> Result<Decimal, EngineError> {
        let market = self.market_ref(market_id)?;
        let reserve = market
            .insurance(asset)
            .ok_or(MarketError::AssetNotInMarket { market: market_id, asset })?;
        Ok(reserve.balance)
    }

    pub fn referral_balance(&self, account_id: AccountId, asset: AssetId) -> Decimal {
        self.referral
            .as_ref()
            .map(|program| program.balance_of(account_id, asset))
            .unwrap_or(Decimal::ZERO)
    }

    pub fn recent_events(&self, count: usize) -> &[Event] {
        let start = self.events.len().saturating_sub(count);
        &self.events[start..]
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    // 8.1.4: internal lookups shared by trading and liquidation

    pub(super) fn market_ref(&self, market_id: MarketId) -> Result<&Market, EngineError> {
        self.registry.get(market_id).ok_or(EngineError::MarketNotFound(market_id))
    }

    pub(super) fn position_ref(&self, key: &PositionKey) -> Result<&Position, EngineError> {
        self.ledger.get(key).ok_or(EngineError::PositionNotFound(*key))
    }

    pub(super) fn pool(&self, pool_id: PoolId) -> Result<&dyn LendingPool, EngineError> {
        self.pools
            .get(&pool_id)
            .map(|pool| &**pool)
            .ok_or(EngineError::PoolNotFound(pool_id))
    }

    pub(super) fn pool_mut(&mut self, pool_id: PoolId) -> Result<&mut Box<dyn LendingPool>, EngineError> {
        self.pools.get_mut(&pool_id).ok_or(EngineError::PoolNotFound(pool_id))
    }

    // always fresh, never cached
    pub(super) fn rate(&self, asset_in: AssetId, asset_out: AssetId) -> Result<Rate, EngineError> {
        Ok(self.price_feed.get_rate(asset_in, asset_out, self.sequence)?)
    }

    /// Held valued in the borrowed asset at the feed rate against what the pool says is owed.
    pub(super) fn evaluate_position(&self, market: &Market, position: &Position) -> Result<MarginSnapshot, EngineError> {
        let rate = self.rate(market.held_asset(position.side), market.borrowed_asset(position.side))?;
        let owed = self
            .pool(market.borrow_pool(position.side))?
            .owed_amount(position.owner, self.sequence);
        Ok(MarginSnapshot::evaluate(position.held, owed, rate))
    }

    pub(super) fn emit_event(&mut self, payload: EventPayload) {
        let event = Event::new(EventId(self.next_event_id), self.sequence, self.current_time, payload);
        self.next_event_id += 1;

        debug!(id = event.id.0, sequence = event.sequence.0, payload = ?event.payload, "event");

        self.events.push(event);

        if self.events.len() > self.config.max_events {
            let drain_count = self.events.len() - self.config.max_events;
            self.events.drain(0..drain_count);
        }
    }
}
