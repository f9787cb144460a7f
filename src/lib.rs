// margin-core: leveraged margin trading engine.
// a trader deposits one asset of a pair, borrows the other from a lending pool
// and holds the converted total. margin accounting and liquidation take priority.
// all computation is deterministic; collaborators sit behind traits.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: MarketId, AssetPair, Side, Bps, Rate, Sequence
//   2.x  margin.rs: margin ratio in bps, thresholds, status bands
//   3.x  position.rs: position struct, increase/reduce, position ledger
//   4.x  fees.rs: trading fee and the insurance/referral/treasury split
//   5.x  liquidation.rs: liquidation settlement waterfall
//   6.x  market.rs: market registry, per asset insurance reserves
//   7.x  config.rs: fees, margins, liquidation params, env presets
//   8.x  engine/: core engine: markets, trading, fees, liquidations
//   9.x  price_feed.rs: rate source trait + settable mock
//   9.0  lending.rs: lending pool trait + in memory pool
//   9.1  swap.rs: conversion venues (feed rate, constant product)
//   9.2  custody.rs: balances per holder and asset (mocked)
//   9.4  referral.rs: referral program
//   10.x events.rs: state transition events for audit

// core modules
pub mod engine;
pub mod events;
pub mod fees;
pub mod liquidation;
pub mod margin;
pub mod market;
pub mod position;
pub mod types;

// integration modules
pub mod config;
pub mod custody;
pub mod lending;
pub mod price_feed;
pub mod referral;
pub mod swap;

// re exports for convenience
pub use engine::*;
pub use events::*;
pub use fees::*;
pub use liquidation::*;
pub use margin::*;
pub use market::*;
pub use position::*;
pub use types::*;
pub use config::{ConfigError, Environment, LiquidatorReward, ProtocolConfig};
pub use custody::{Balances, CustodyError, Holder};
pub use lending::{InMemoryLendingPool, LendingError, LendingPool};
pub use price_feed::{MockPriceFeed, PriceFeed, PriceFeedError};
pub use referral::{Referral, ReferralRegistry};
pub use swap::{ConstantProductVenue, FeedRateVenue, SwapError, SwapVenue};
