// 3.0: open position tracking. one position per (trader, market, side).
// 3.1 has increase/reduce logic at the bottom, 3.2 the ledger that owns every position.

use crate::types::{AccountId, MarketId, Sequence, Side};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PositionKey {
    pub trader: AccountId,
    pub market_id: MarketId,
    pub side: Side,
}

impl PositionKey {
    pub fn new(trader: AccountId, market_id: MarketId, side: Side) -> Self {
        Self {
            trader,
            market_id,
            side,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationMarker {
    pub marker: AccountId,
    pub marked_at: Sequence,
}

// Liquidated is terminal: the position is gone from the ledger once it gets there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Healthy,
    Marked,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub owner: AccountId,
    pub market_id: MarketId,
    pub side: Side,
    // collateral net of fees, in the borrowed asset
    pub deposited: Decimal,
    // units of the long asset backing the position
    pub held: Decimal,
    // cost basis per held unit, in the borrowed asset. blended on increase
    pub open_fixed_value: Decimal,
    // principal as last seen by the engine. the lending pool is authoritative
    pub borrowed: Decimal,
    pub marker: Option<LiquidationMarker>,
    pub opened_at: Sequence,
    pub updated_at: Sequence,
}

impl Position {
    pub fn new(
        key: PositionKey,
        deposited: Decimal,
        borrowed: Decimal,
        held: Decimal,
        sequence: Sequence,
    ) -> Self {
        let cost = deposited + borrowed;
        Self {
            owner: key.trader,
            market_id: key.market_id,
            side: key.side,
            deposited,
            held,
            open_fixed_value: per_unit(cost, held),
            borrowed,
            marker: None,
            opened_at: sequence,
            updated_at: sequence,
        }
    }

    pub fn key(&self) -> PositionKey {
        PositionKey::new(self.owner, self.market_id, self.side)
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_zero()
    }

    pub fn status(&self) -> PositionStatus {
        if self.marker.is_some() {
            PositionStatus::Marked
        } else {
            PositionStatus::Healthy
        }
    }

    // 3.0.1: what the held amount cost at open, in the borrowed asset
    pub fn cost_basis(&self) -> Decimal {
        self.held * self.open_fixed_value
    }

    // paper gain/loss against the open baseline, before debt
    pub fn unrealized_pnl(&self, held_value: Decimal) -> Decimal {
        held_value - self.cost_basis()
    }
}

fn per_unit(cost: Decimal, held: Decimal) -> Decimal {
    if held.is_zero() {
        Decimal::ZERO
    } else {
        cost / held
    }
}

// 3.1: adds deposit/borrow to an existing position. the baseline is a weighted blend
// of the old per unit value and the new trade's, weighted by held amounts
pub fn increase_position(
    position: &Position,
    added_deposit: Decimal,
    added_borrow: Decimal,
    added_held: Decimal,
    sequence: Sequence,
) -> Position {
    let new_held = position.held + added_held;
    let blended = if new_held.is_zero() {
        position.open_fixed_value
    } else {
        let weighted_sum = position.held * position.open_fixed_value + added_deposit + added_borrow;
        weighted_sum / new_held
    };

    Position {
        deposited: position.deposited + added_deposit,
        held: new_held,
        open_fixed_value: blended,
        borrowed: position.borrowed + added_borrow,
        updated_at: sequence,
        ..position.clone()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PositionReduction {
    // None when the position was fully closed
    pub remaining: Option<Position>,
    pub fraction: Decimal,
    pub deposited_released: Decimal,
}

// 3.1.1: proportional reduce. held and deposited shrink by the same fraction
pub fn reduce_position(position: &Position, close_held: Decimal, sequence: Sequence) -> PositionReduction {
    debug_assert!(close_held > Decimal::ZERO, "close amount must be positive");

    let close_held = close_held.min(position.held);
    if close_held == position.held {
        return PositionReduction {
            remaining: None,
            fraction: Decimal::ONE,
            deposited_released: position.deposited,
        };
    }

    let fraction = close_held / position.held;
    let deposited_released = position.deposited * fraction;
    let borrowed_released = position.borrowed * fraction;

    PositionReduction {
        remaining: Some(Position {
            deposited: position.deposited - deposited_released,
            held: position.held - close_held,
            borrowed: position.borrowed - borrowed_released,
            updated_at: sequence,
            ..position.clone()
        }),
        fraction,
        deposited_released,
    }
}

/** 3.2: every open position. the engine is the only writer */
#[derive(Debug, Default, Clone)]
pub struct PositionLedger {
    positions: HashMap<PositionKey, Position>,
}

impl PositionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &PositionKey) -> Option<&Position> {
        self.positions.get(key)
    }

    pub fn contains(&self, key: &PositionKey) -> bool {
        self.positions.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PositionKey, &Position)> {
        self.positions.iter()
    }

    pub fn positions_in(&self, market_id: MarketId) -> impl Iterator<Item = &Position> {
        self.positions.values().filter(move |p| p.market_id == market_id)
    }

    // empty positions never stay in the ledger
    pub(crate) fn upsert(&mut self, position: Position) {
        let key = position.key();
        if position.is_empty() {
            self.positions.remove(&key);
        } else {
            self.positions.insert(key, position);
        }
    }

    pub(crate) fn remove(&mut self, key: &PositionKey) -> Option<Position> {
        self.positions.remove(key)
    }

    pub(crate) fn set_marker(&mut self, key: &PositionKey, marker: Option<LiquidationMarker>) -> bool {
        match self.positions.get_mut(key) {
            Some(position) => {
                position.marker = marker;
                true
            }
            None => false,
        }
    }
}
