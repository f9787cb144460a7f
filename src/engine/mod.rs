// 8.0: margin engine. coordinates the market registry, the position ledger,
// lending pools, the price feed and the conversion venue for open/close and
// the two-phase liquidation. calls run serially and either fully apply or fail.

mod config;
mod core;
mod fees;
mod liquidations;
mod markets;
mod results;
mod trading;

pub use config::EngineConfig;
pub use core::Engine;
pub use results::{CloseResult, EngineError, LiquidationResult, MarginView, OpenResult};
pub use trading::{CloseRequest, OpenRequest};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProtocolConfig;
    use crate::custody::Holder;
    use crate::lending::InMemoryLendingPool;
    use crate::position::PositionStatus;
    use crate::price_feed::MockPriceFeed;
    use crate::referral::ReferralRegistry;
    use crate::swap::FeedRateVenue;
    use crate::types::{AccountId, AssetId, Bps, MarketId, Rate, Side};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    const A0: AssetId = AssetId(1);
    const A1: AssetId = AssetId(2);
    const TRADER: AccountId = AccountId(10);
    const KEEPER: AccountId = AccountId(20);
    const REFERRER: AccountId = AccountId(30);

    fn rate(value: Decimal) -> Rate {
        Rate::new(value, 8).unwrap()
    }

    // asset0 priced 1:1 against asset1, exact conversion
    fn setup() -> (Engine, MockPriceFeed, MarketId) {
        let feed = MockPriceFeed::new();
        feed.set_rate(A0, A1, rate(dec!(1)));

        let mut engine = Engine::new(EngineConfig::default(), feed.clone(), FeedRateVenue).unwrap();
        let pool0 = engine.register_pool(InMemoryLendingPool::new(A0, dec!(1000)));
        let pool1 = engine.register_pool(InMemoryLendingPool::new(A1, dec!(1000)));
        let market = engine.register_market(pool0, pool1).unwrap();
        engine.deposit(TRADER, A1, dec!(10000)).unwrap();
        (engine, feed, market)
    }

    fn open_default(engine: &mut Engine, market: MarketId) -> OpenResult {
        engine
            .open(OpenRequest::new(TRADER, market, Side::Long0, dec!(400), dec!(500)))
            .unwrap()
    }

    #[test]
    fn invalid_config_rejected_at_construction() {
        let mut protocol = ProtocolConfig::default();
        protocol.liquidation_delay = 0;
        let result = Engine::new(EngineConfig::with_protocol(protocol), MockPriceFeed::new(), FeedRateVenue);
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[test]
    fn register_market_orders_pools_by_asset() {
        let mut engine = Engine::new(EngineConfig::default(), MockPriceFeed::new(), FeedRateVenue).unwrap();
        let pool_b = engine.register_pool(InMemoryLendingPool::new(A1, dec!(1)));
        let pool_a = engine.register_pool(InMemoryLendingPool::new(A0, dec!(1)));
        let id = engine.register_market(pool_b, pool_a).unwrap();

        let market = engine.market(id).unwrap();
        assert_eq!(market.pair.asset0, A0);
        assert_eq!(market.pool0, pool_a);
        assert_eq!(engine.market_count(), 1);
        assert_eq!(engine.find_market(A1, A0).map(|m| m.id), Some(id));

        // pools back exactly one market
        assert!(matches!(engine.register_market(pool_a, pool_b), Err(EngineError::PoolInUse(_))));
    }

    #[test]
    fn open_at_unit_rate() {
        let (mut engine, _feed, market) = setup();
        let result = open_default(&mut engine, market);

        assert_eq!(result.fee.total, dec!(2.7));
        assert_eq!(result.held_out, dec!(897.3));
        assert!(!result.increase);
        assert_eq!(engine.account_balance(TRADER, A1), dec!(9600));
        assert_eq!(engine.owed_amount(TRADER, market, Side::Long0).unwrap(), dec!(500));
        assert_eq!(engine.pool_available(market, A1).unwrap(), dec!(500));
        assert_eq!(engine.balance(Holder::Custody, A0), dec!(897.3));
    }

    #[test]
    fn open_below_floor_rejected_without_effects() {
        let (mut engine, _feed, market) = setup();
        let events_before = engine.events().len();
        // 100 deposit against 900 borrow sits far below the 30% floor
        let result = engine.open(OpenRequest::new(TRADER, market, Side::Long0, dec!(100), dec!(900)));

        assert!(matches!(result, Err(EngineError::InsufficientMargin { .. })));
        assert_eq!(engine.account_balance(TRADER, A1), dec!(10000));
        assert_eq!(engine.pool_available(market, A1).unwrap(), dec!(1000));
        assert_eq!(engine.events().len(), events_before);
    }

    #[test]
    fn borrow_beyond_pool_liquidity() {
        let (mut engine, _feed, market) = setup();
        let result = engine.open(OpenRequest::new(TRADER, market, Side::Long0, dec!(2000), dec!(1500)));
        assert!(matches!(
            result,
            Err(EngineError::Lending(crate::lending::LendingError::InsufficientLiquidity { .. }))
        ));
    }

    #[test]
    fn slippage_guard_on_open() {
        let (mut engine, _feed, market) = setup();
        let request = OpenRequest::new(TRADER, market, Side::Long0, dec!(400), dec!(500)).with_min_held_out(dec!(900));
        assert!(matches!(engine.open(request), Err(EngineError::SlippageExceeded { .. })));
    }

    #[test]
    fn referral_share_only_for_registered_referrer() {
        let (mut engine, _feed, market) = setup();
        engine.set_referral(ReferralRegistry::new().with_registered(REFERRER));

        let request = OpenRequest::new(TRADER, market, Side::Long0, dec!(400), dec!(500)).with_referrer(REFERRER);
        let result = engine.open(request).unwrap();
        assert_eq!(result.fee.referral, dec!(0.432));
        assert_eq!(engine.referral_balance(REFERRER, A1), dec!(0.432));

        let unknown = OpenRequest::new(TRADER, market, Side::Long0, dec!(400), dec!(0)).with_referrer(AccountId(99));
        let result = engine.open(unknown).unwrap();
        assert_eq!(result.fee.referral, Decimal::ZERO);
    }

    #[test]
    fn margin_view_reports_pnl_against_cost_basis() {
        let (mut engine, feed, market) = setup();
        open_default(&mut engine, market);
        assert_eq!(
            engine.margin_ratio(TRADER, market, Side::Long0).unwrap().unrealized_pnl,
            Decimal::ZERO
        );

        // 897.3 bought at 1.0, now worth 1076.76
        feed.set_rate(A0, A1, rate(dec!(1.2)));
        let view = engine.margin_ratio(TRADER, market, Side::Long0).unwrap();
        assert_eq!(view.unrealized_pnl, dec!(179.46));
        assert_eq!(view.snapshot.owed, dec!(500));
    }

    #[test]
    fn increase_blends_and_keeps_one_position() {
        let (mut engine, _feed, market) = setup();
        open_default(&mut engine, market);
        let result = engine
            .open(OpenRequest::new(TRADER, market, Side::Long0, dec!(100), Decimal::ZERO))
            .unwrap();

        assert!(result.increase);
        assert_eq!(engine.positions().len(), 1);
        assert_eq!(result.position.held, dec!(897.3) + dec!(99.7));
    }

    #[test]
    fn close_full_repays_and_removes() {
        let (mut engine, _feed, market) = setup();
        open_default(&mut engine, market);

        let result = engine
            .close(CloseRequest::new(TRADER, market, Side::Long0, dec!(897.3)))
            .unwrap();
        // 0.3% of the held amount is kept back in asset 0 before the sale
        assert_eq!(result.fee.total, dec!(2.6919));
        assert_eq!(result.fee.insurance, dec!(0.888327));
        assert_eq!(result.fee.treasury, dec!(1.803573));
        assert_eq!(result.proceeds, dec!(894.6081));
        assert_eq!(result.repaid, dec!(500));
        assert_eq!(result.returned, dec!(394.6081));
        assert!(result.remaining.is_none());
        assert_eq!(engine.account_balance(TRADER, A1), dec!(9994.6081));
        assert_eq!(engine.insurance_balance(market, A0).unwrap(), dec!(0.888327));
        assert_eq!(engine.balance(Holder::Treasury, A0), dec!(1.803573));
        assert_eq!(engine.balance(Holder::Custody, A0), dec!(0.888327));
        assert_eq!(engine.owed_amount(TRADER, market, Side::Long0).unwrap(), Decimal::ZERO);
        assert!(engine.position(TRADER, market, Side::Long0).is_none());
    }

    #[test]
    fn partial_close_repays_share() {
        let (mut engine, _feed, market) = setup();
        open_default(&mut engine, market);

        let quarter = dec!(897.3) / dec!(4);
        let result = engine
            .close(CloseRequest::new(TRADER, market, Side::Long0, quarter))
            .unwrap();
        assert_eq!(result.repaid, dec!(125));
        assert_eq!(engine.owed_amount(TRADER, market, Side::Long0).unwrap(), dec!(375));
        assert_eq!(result.remaining.unwrap().held, dec!(897.3) - quarter);
    }

    #[test]
    fn close_more_than_held_rejected() {
        let (mut engine, _feed, market) = setup();
        open_default(&mut engine, market);
        let result = engine.close(CloseRequest::new(TRADER, market, Side::Long0, dec!(1000)));
        assert!(matches!(result, Err(EngineError::CloseExceedsHeld { .. })));
    }

    #[test]
    fn liquidation_state_machine() {
        let (mut engine, feed, market) = setup();
        open_default(&mut engine, market);

        // healthy positions cannot be marked
        assert!(matches!(
            engine.mark_liquidatable(TRADER, market, Side::Long0, KEEPER),
            Err(EngineError::NotLiquidatable { .. })
        ));
        assert!(matches!(
            engine.liquidate(TRADER, market, Side::Long0, KEEPER),
            Err(EngineError::NotMarked)
        ));

        feed.set_rate(A0, A1, rate(dec!(0.6)));
        engine.mark_liquidatable(TRADER, market, Side::Long0, KEEPER).unwrap();
        assert_eq!(
            engine.position_status(TRADER, market, Side::Long0).unwrap(),
            PositionStatus::Marked
        );
        assert!(matches!(
            engine.mark_liquidatable(TRADER, market, Side::Long0, KEEPER),
            Err(EngineError::AlreadyMarked)
        ));

        engine.advance_sequence(1);
        assert!(matches!(
            engine.liquidate(TRADER, market, Side::Long0, KEEPER),
            Err(EngineError::LiquidationDelayNotElapsed { .. })
        ));

        engine.advance_sequence(1);
        let result = engine.liquidate(TRADER, market, Side::Long0, KEEPER).unwrap();
        // (897.3 - 2.6919) * 0.6
        assert_eq!(result.fee.total, dec!(2.6919));
        assert_eq!(result.settlement.proceeds, dec!(536.76486));
        assert_eq!(result.settlement.repaid, dec!(500));
        assert!(engine.position(TRADER, market, Side::Long0).is_none());
        assert_eq!(engine.owed_amount(TRADER, market, Side::Long0).unwrap(), Decimal::ZERO);
        assert_eq!(engine.account_balance(KEEPER, A1), result.settlement.liquidator_reward);
    }

    #[test]
    fn reset_requires_recovery() {
        let (mut engine, feed, market) = setup();
        open_default(&mut engine, market);

        feed.set_rate(A0, A1, rate(dec!(0.6)));
        engine.mark_liquidatable(TRADER, market, Side::Long0, KEEPER).unwrap();
        assert!(matches!(
            engine.reset_liquidation_marker(TRADER, market, Side::Long0, TRADER),
            Err(EngineError::NotRecovered { .. })
        ));

        feed.set_rate(A0, A1, rate(dec!(1)));
        engine.reset_liquidation_marker(TRADER, market, Side::Long0, TRADER).unwrap();
        assert_eq!(
            engine.position_status(TRADER, market, Side::Long0).unwrap(),
            PositionStatus::Healthy
        );
    }

    #[test]
    fn market_override_and_default_ratio() {
        let (mut engine, _feed, market) = setup();
        engine.set_market_margin_ratio(market, Some(Bps::new(9000))).unwrap();
        // 7946bps after the trade, short of the override
        assert!(matches!(
            engine.open(OpenRequest::new(TRADER, market, Side::Long0, dec!(400), dec!(500))),
            Err(EngineError::InsufficientMargin { .. })
        ));

        engine.set_market_margin_ratio(market, Some(Bps::new(5000))).unwrap();
        open_default(&mut engine, market);
        let view = engine.margin_ratio(TRADER, market, Side::Long0).unwrap();
        assert_eq!(view.market_limit, Bps::new(5000));
        assert_eq!(view.current, crate::margin::MarginRatio::Bounded(Bps::new(7946)));

        // at or below the liquidation threshold is refused
        assert!(engine.set_market_margin_ratio(market, Some(Bps::new(1500))).is_err());
        assert!(engine.set_default_margin_ratio(Bps::new(1000)).is_err());
        engine.set_default_margin_ratio(Bps::new(3500)).unwrap();
        assert_eq!(engine.protocol_config().default_margin_ratio, Bps::new(3500));
    }

    #[test]
    fn move_insurance_pays_out_of_reserve() {
        let (mut engine, _feed, market) = setup();
        open_default(&mut engine, market);
        assert_eq!(engine.insurance_balance(market, A1).unwrap(), dec!(0.891));

        let remaining = engine.move_insurance(market, A1, KEEPER, dec!(0.5)).unwrap();
        assert_eq!(remaining, dec!(0.391));
        assert_eq!(engine.account_balance(KEEPER, A1), dec!(0.5));
        assert!(engine.move_insurance(market, A1, KEEPER, dec!(1)).is_err());
    }

    #[test]
    fn event_retention_is_bounded() {
        let feed = MockPriceFeed::new();
        let config = EngineConfig {
            max_events: 3,
            ..EngineConfig::default()
        };
        let mut engine = Engine::new(config, feed, FeedRateVenue).unwrap();
        for _ in 0..5 {
            engine.deposit(TRADER, A1, dec!(1)).unwrap();
        }
        assert_eq!(engine.events().len(), 3);
        assert_eq!(engine.events()[0].id.0, 3);
        assert_eq!(engine.recent_events(1)[0].id.0, 5);
    }
}
