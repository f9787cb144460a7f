//! Fee routing. The fee is already sitting in engine custody when this runs.

use super::core::Engine;
use super::results::EngineError;
use crate::custody::Holder;
use crate::events::{EventPayload, FeesDistributedEvent};
use crate::fees::FeeSplit;
use crate::market::MarketError;
use crate::types::{AccountId, AssetId, MarketId};
use rust_decimal::Decimal;

impl Engine {
    /// A referrer the referral program does not know is treated as absent.
    pub fn registered_referrer(&self, referrer: Option<AccountId>) -> Option<AccountId> {
        let program = self.referral.as_ref()?;
        referrer.filter(|account| program.is_registered(*account))
    }

    /// Splits `total` of `asset` between that asset's insurance reserve in
    /// the market, the referrer and the treasury. Opens pay in the borrowed
    /// asset, closes and liquidations in the held asset.
    pub(super) fn distribute_fee(
        &mut self,
        total: Decimal,
        asset: AssetId,
        market_id: MarketId,
        trader: AccountId,
        referrer: Option<AccountId>,
    ) -> Result<FeeSplit, EngineError> {
        let referrer = self.registered_referrer(referrer);
        let protocol = &self.config.protocol;
        let split = FeeSplit::compute(total, protocol.insurance_ratio, protocol.referral_ratio, referrer.is_some());

        let market = self
            .registry
            .get_mut(market_id)
            .ok_or(EngineError::MarketNotFound(market_id))?;

        // 1. insurance stays in custody, booked against the reserve
        market
            .insurance_mut(asset)
            .ok_or(MarketError::AssetNotInMarket { market: market_id, asset })?
            .deposit(split.insurance);

        // 2. referral pot
        if let (Some(account), Some(program)) = (referrer, self.referral.as_mut()) {
            self.balances.transfer(Holder::Custody, Holder::Referral, asset, split.referral)?;
            program.credit(account, asset, split.referral);
        }

        // 3. treasury takes the rest, rounding dust included
        self.balances.transfer(Holder::Custody, Holder::Treasury, asset, split.treasury)?;

        self.emit_event(EventPayload::FeesDistributed(FeesDistributedEvent {
            market_id,
            trader,
            asset,
            referrer,
            split,
        }));

        Ok(split)
    }
}
