// Price Feed Integration
//
// The engine asks for a fresh rate on every margin evaluation and every
// conversion and never caches one. Whether rates come from Chainlink, Pyth,
// a TWAP or a test fixture is hidden behind the PriceFeed trait.

use crate::types::{AssetId, Rate, Sequence};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

/// Rate source. `now` is the engine's logical clock at the time of the call.
pub trait PriceFeed: fmt::Debug + Send {
    /// Units of `asset_out` per unit of `asset_in`.
    fn get_rate(&self, asset_in: AssetId, asset_out: AssetId, now: Sequence) -> Result<Rate, PriceFeedError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PriceFeedError {
    #[error("Stale price for {asset_in}/{asset_out}: {age} sequences old, max {max_age}")]
    StalePrice {
        asset_in: AssetId,
        asset_out: AssetId,
        age: u64,
        max_age: u64,
    },

    #[error("No price available for {asset_in}/{asset_out}")]
    FeedUnavailable { asset_in: AssetId, asset_out: AssetId },
}

#[derive(Debug, Clone, Copy)]
struct RateEntry {
    rate: Rate,
    updated_at: Sequence,
}

#[derive(Debug, Default)]
struct FeedState {
    rates: HashMap<(AssetId, AssetId), RateEntry>,
    max_age: Option<u64>,
}

/// Settable rate table. Clones share the same table, so a test or a
/// simulation can move prices while the engine owns another handle.
#[derive(Debug, Clone, Default)]
pub struct MockPriceFeed {
    inner: Arc<RwLock<FeedState>>,
}

impl MockPriceFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rates older than `max_age` sequences are rejected as stale.
    pub fn with_max_age(max_age: u64) -> Self {
        let feed = Self::default();
        feed.set_max_age(Some(max_age));
        feed
    }

    pub fn set_max_age(&self, max_age: Option<u64>) {
        let mut state = self.inner.write().unwrap_or_else(|e| e.into_inner());
        state.max_age = max_age;
    }

    pub fn set_rate(&self, asset_in: AssetId, asset_out: AssetId, rate: Rate) {
        self.set_rate_at(asset_in, asset_out, rate, Sequence::default());
    }

    // the reverse direction is served as the inverse unless set explicitly
    pub fn set_rate_at(&self, asset_in: AssetId, asset_out: AssetId, rate: Rate, at: Sequence) {
        let mut state = self.inner.write().unwrap_or_else(|e| e.into_inner());
        state.rates.insert((asset_in, asset_out), RateEntry { rate, updated_at: at });
        state.rates.remove(&(asset_out, asset_in));
    }

    pub fn remove_rate(&self, asset_in: AssetId, asset_out: AssetId) {
        let mut state = self.inner.write().unwrap_or_else(|e| e.into_inner());
        state.rates.remove(&(asset_in, asset_out));
        state.rates.remove(&(asset_out, asset_in));
    }
}

impl PriceFeed for MockPriceFeed {
    fn get_rate(&self, asset_in: AssetId, asset_out: AssetId, now: Sequence) -> Result<Rate, PriceFeedError> {
        let state = self.inner.read().unwrap_or_else(|e| e.into_inner());

        let (rate, updated_at) = match state.rates.get(&(asset_in, asset_out)) {
            Some(entry) => (entry.rate, entry.updated_at),
            None => match state.rates.get(&(asset_out, asset_in)) {
                Some(entry) => (entry.rate.inverse(), entry.updated_at),
                None => return Err(PriceFeedError::FeedUnavailable { asset_in, asset_out }),
            },
        };

        if let Some(max_age) = state.max_age {
            let age = now.distance_since(updated_at);
            if age > max_age {
                return Err(PriceFeedError::StalePrice {
                    asset_in,
                    asset_out,
                    age,
                    max_age,
                });
            }
        }

        Ok(rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const A: AssetId = AssetId(1);
    const B: AssetId = AssetId(2);

    #[test]
    fn forward_and_inverse_rates() {
        let feed = MockPriceFeed::new();
        feed.set_rate(A, B, Rate::new(dec!(2), 8).unwrap());

        assert_eq!(feed.get_rate(A, B, Sequence(0)).unwrap().value(), dec!(2));
        assert_eq!(feed.get_rate(B, A, Sequence(0)).unwrap().value(), dec!(0.5));
    }

    #[test]
    fn setting_one_direction_replaces_the_other() {
        let feed = MockPriceFeed::new();
        feed.set_rate(B, A, Rate::new(dec!(4), 8).unwrap());
        feed.set_rate(A, B, Rate::new(dec!(2), 8).unwrap());

        assert_eq!(feed.get_rate(B, A, Sequence(0)).unwrap().value(), dec!(0.5));
    }

    #[test]
    fn missing_pair_is_unavailable() {
        let feed = MockPriceFeed::new();
        let result = feed.get_rate(A, B, Sequence(0));
        assert_eq!(
            result,
            Err(PriceFeedError::FeedUnavailable {
                asset_in: A,
                asset_out: B
            })
        );
    }

    #[test]
    fn stale_rate_rejected() {
        let feed = MockPriceFeed::with_max_age(5);
        feed.set_rate_at(A, B, Rate::new(dec!(1), 8).unwrap(), Sequence(10));

        assert!(feed.get_rate(A, B, Sequence(15)).is_ok());
        assert!(matches!(
            feed.get_rate(A, B, Sequence(16)),
            Err(PriceFeedError::StalePrice { age: 6, max_age: 5, .. })
        ));
    }

    #[test]
    fn clones_share_the_table() {
        let feed = MockPriceFeed::new();
        let handle = feed.clone();
        handle.set_rate(A, B, Rate::new(dec!(1.2), 8).unwrap());

        assert_eq!(feed.get_rate(A, B, Sequence(0)).unwrap().value(), dec!(1.2));

        handle.remove_rate(A, B);
        assert!(feed.get_rate(A, B, Sequence(0)).is_err());
    }
}
