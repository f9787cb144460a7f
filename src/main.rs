//! Margin Core Simulation.
//!
//! Walks a leveraged position through open, price moves, the two-phase
//! liquidation and a marker reset. Run with `RUST_LOG=margin_core=debug` to
//! see every emitted event.

use margin_core::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing_subscriber::EnvFilter;

const ASSET0: AssetId = AssetId(1);
const ASSET1: AssetId = AssetId(2);
const TRADER: AccountId = AccountId(2);
const KEEPER: AccountId = AccountId(3);
const REFERRER: AccountId = AccountId(4);

fn main() -> Result<(), EngineError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("Margin Core Engine Simulation");
    println!("One pair, two lending pools, constant product venue\n");

    scenario_1_open_and_fees()?;
    scenario_2_liquidation()?;
    scenario_3_reset()?;
    scenario_4_shortfall()?;

    println!("\nAll simulations completed successfully.");
    Ok(())
}

fn unit_rate() -> Option<Rate> {
    Rate::from_mantissa(100_000_000, 8)
}

fn scaled_rate(factor: Decimal) -> Option<Rate> {
    Rate::new(factor, 8)
}

fn amm() -> ConstantProductVenue {
    ConstantProductVenue::new(Bps::new(30)).with_pair(ASSET0, dec!(10000), ASSET1, dec!(10000))
}

/// Builds a market with 1000 of each asset to borrow and a funded trader.
fn setup(feed: &MockPriceFeed, venue: impl SwapVenue + 'static) -> Result<(Engine, MarketId), EngineError> {
    let mut engine = Engine::new(EngineConfig::default(), feed.clone(), venue)?;
    engine.set_time(Timestamp::now());
    engine.set_referral(ReferralRegistry::new().with_registered(REFERRER));

    let pool0 = engine.register_pool(InMemoryLendingPool::new(ASSET0, dec!(1000)));
    let pool1 = engine.register_pool(InMemoryLendingPool::new(ASSET1, dec!(1000)));
    let market = engine.register_market(pool0, pool1)?;

    engine.deposit(TRADER, ASSET1, dec!(10000))?;
    Ok((engine, market))
}

fn set_price(feed: &MockPriceFeed, factor: Decimal) {
    if let Some(rate) = scaled_rate(factor) {
        feed.set_rate(ASSET0, ASSET1, rate);
    }
}

fn open_fixture(engine: &mut Engine, market: MarketId) -> Result<OpenResult, EngineError> {
    let request = OpenRequest::new(TRADER, market, Side::Long0, dec!(400), dec!(500)).with_referrer(REFERRER);
    engine.open(request)
}

/// Opening a long with a referrer and the resulting fee split.
fn scenario_1_open_and_fees() -> Result<(), EngineError> {
    println!("Scenario 1: Open and Fee Split\n");

    let feed = MockPriceFeed::new();
    if let Some(rate) = unit_rate() {
        feed.set_rate(ASSET0, ASSET1, rate);
    }
    let (mut engine, market) = setup(&feed, amm())?;

    let result = open_fixture(&mut engine, market)?;
    println!("  Deposit 400, borrow 500, fee {}", result.fee.total);
    println!(
        "  Insurance {}, referral {}, treasury {}",
        result.fee.insurance, result.fee.referral, result.fee.treasury
    );
    println!("  Held {} of asset0, ratio {}\n", result.held_out.round_dp(16), result.ratio);

    for factor in [dec!(1.2), dec!(0.65)] {
        set_price(&feed, factor);
        let view = engine.margin_ratio(TRADER, market, Side::Long0)?;
        println!(
            "  At {}x: ratio {}, limit {}, status {:?}, pnl {}",
            factor,
            view.current,
            view.market_limit,
            view.status,
            view.unrealized_pnl.round_dp(8)
        );
    }

    match engine.close(CloseRequest::new(TRADER, market, Side::Long0, result.held_out)) {
        Err(e) => println!("  Close refused: {}\n", e),
        Ok(_) => println!("  Close unexpectedly allowed\n"),
    }
    Ok(())
}

/// Mark, wait out the delay window, liquidate.
fn scenario_2_liquidation() -> Result<(), EngineError> {
    println!("Scenario 2: Two-Phase Liquidation\n");

    let feed = MockPriceFeed::new();
    set_price(&feed, Decimal::ONE);
    let (mut engine, market) = setup(&feed, amm())?;
    open_fixture(&mut engine, market)?;

    set_price(&feed, dec!(0.65));
    engine.mark_liquidatable(TRADER, market, Side::Long0, KEEPER)?;
    println!("  Marked at sequence {}", engine.sequence().0);

    engine.advance_sequence(1);
    if let Err(e) = engine.liquidate(TRADER, market, Side::Long0, KEEPER) {
        println!("  Too early: {}", e);
    }

    engine.advance_sequence(1);
    let result = engine.liquidate(TRADER, market, Side::Long0, KEEPER)?;
    let s = result.settlement;
    println!(
        "  Sold {} for {}, fee {} of asset0",
        result.held_sold.round_dp(8),
        s.proceeds.round_dp(8),
        result.fee.total
    );
    println!(
        "  Repaid {}, reward {}, insurance {}, trader {}\n",
        s.repaid,
        s.liquidator_reward.round_dp(8),
        s.insurance_contribution.round_dp(8),
        s.trader_payout.round_dp(8)
    );
    Ok(())
}

/// A marked position recovers and the marker is cleared.
fn scenario_3_reset() -> Result<(), EngineError> {
    println!("Scenario 3: Marker Reset\n");

    let feed = MockPriceFeed::new();
    set_price(&feed, Decimal::ONE);
    let (mut engine, market) = setup(&feed, amm())?;
    open_fixture(&mut engine, market)?;

    set_price(&feed, dec!(0.65));
    engine.mark_liquidatable(TRADER, market, Side::Long0, KEEPER)?;

    set_price(&feed, dec!(0.8));
    engine.reset_liquidation_marker(TRADER, market, Side::Long0, TRADER)?;
    let status = engine.position_status(TRADER, market, Side::Long0)?;
    println!("  Recovered at 0.8x, status {:?}\n", status);
    Ok(())
}

/// A crash deep enough that proceeds do not cover the debt. Converts at the
/// feed rate so the sale realizes the crash.
fn scenario_4_shortfall() -> Result<(), EngineError> {
    println!("Scenario 4: Shortfall and Bad Debt\n");

    let feed = MockPriceFeed::new();
    set_price(&feed, Decimal::ONE);
    let (mut engine, market) = setup(&feed, FeedRateVenue)?;
    open_fixture(&mut engine, market)?;

    set_price(&feed, dec!(0.5));
    engine.mark_liquidatable(TRADER, market, Side::Long0, KEEPER)?;
    engine.advance_sequence(2);

    let result = engine.liquidate(TRADER, market, Side::Long0, KEEPER)?;
    let s = result.settlement;
    println!("  Proceeds {} against owed {}", s.proceeds.round_dp(8), s.owed);
    println!("  Insurance draw {}, bad debt {}", s.insurance_draw, s.bad_debt.round_dp(8));
    println!("  Insurance left {}", engine.insurance_balance(market, ASSET1)?);
    Ok(())
}
