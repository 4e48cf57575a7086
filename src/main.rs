//! Perpetual settlement engine simulation.
//!
//! Walks a single market through the full lifecycle: makers and takers,
//! lazy settlement across skipped versions, funding, liquidation with
//! shortfall, and a two-market vault running through its epochs.
//!
//! Set `RUST_LOG=info` (or `debug`) to see the engine's own log lines.

use perps_settlement::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const ETH: MarketId = MarketId(1);
const BTC: MarketId = MarketId(2);

const MAKER: AccountId = AccountId(1);
const ALICE: AccountId = AccountId(2);
const BOB: AccountId = AccountId(3);
const KEEPER: AccountId = AccountId(4);
const TREASURY: AccountId = AccountId(5);
const VAULT: AccountId = AccountId(1000);

fn main() -> Result<(), EngineError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    println!("Perpetual Settlement Engine Simulation");
    println!("Versioned Lazy Settlement, Maker Pool, Multi-Market Vault\n");

    scenario_1_makers_and_takers()?;
    scenario_2_skipped_versions()?;
    scenario_3_funding()?;
    scenario_4_liquidation_and_shortfall()?;
    scenario_5_vault_epochs()?;

    println!("\nAll simulations completed successfully.");
    Ok(())
}

fn new_engine(parameter: MarketParameter) -> Result<Engine, EngineError> {
    let mut engine = Engine::new(EngineConfig::default(), InMemoryCustody::new());
    engine.add_market(ETH, parameter, MockOracle::with_price(dec!(2000)))?;
    for account in [MAKER, ALICE, BOB] {
        engine.custody_mut().fund(account, Quote::new(dec!(100_000)));
    }
    Ok(engine)
}

fn advance(engine: &mut Engine, market: MarketId, price: Decimal, secs: i64) -> Result<Version, EngineError> {
    Ok(engine.oracle_mut(market)?.advance(price, secs)?)
}

/// Requests queue for the next version and fold in when it settles.
fn scenario_1_makers_and_takers() -> Result<(), EngineError> {
    println!("Scenario 1: Makers and Takers\n");

    let parameter = MarketParameter {
        taker_fee: dec!(0.001),
        position_fee: dec!(0.5),
        ..MarketParameter::default()
    };
    let mut engine = new_engine(parameter)?;

    let maker = engine.update(ETH, MAKER, PositionDelta::maker(dec!(50)), Quote::new(dec!(20_000)))?;
    let alice = engine.update(ETH, ALICE, PositionDelta::long(dec!(5)), Quote::new(dec!(5_000)))?;
    println!("  Maker opens 50 @ v{}, Alice opens long 5 (fee {})", maker.version.value(), alice.fee);
    println!("  Settled position before the version commits: {:?}", engine.position(ETH, ALICE)?);

    advance(&mut engine, ETH, dec!(2000), 12)?;
    advance(&mut engine, ETH, dec!(2100), 12)?;
    engine.settle_all(ETH)?;

    println!("  After +100: Alice collateral {}", engine.collateral(ETH, ALICE)?);
    println!("  After +100: Maker collateral {}", engine.collateral(ETH, MAKER)?);
    let fees = engine.fees(ETH)?;
    println!("  Fees: protocol {}, market {}\n", fees.protocol, fees.market);

    let claimed = engine.claim_fee(ETH, FeeRecipient::Protocol, TREASURY)?;
    println!("  Treasury claims {}\n", claimed);
    Ok(())
}

/// Settling once after many versions gives the same result as settling each.
fn scenario_2_skipped_versions() -> Result<(), EngineError> {
    println!("Scenario 2: Skipped Versions\n");

    let mut eager = new_engine(MarketParameter::default())?;
    let mut lazy = new_engine(MarketParameter::default())?;
    for engine in [&mut eager, &mut lazy] {
        engine.update(ETH, MAKER, PositionDelta::maker(dec!(50)), Quote::new(dec!(20_000)))?;
        engine.update(ETH, BOB, PositionDelta::short(dec!(10)), Quote::new(dec!(5_000)))?;
    }

    let prices = [dec!(2000), dec!(1980), dec!(2015), dec!(1990), dec!(1950)];
    for price in prices {
        advance(&mut eager, ETH, price, 60)?;
        eager.settle(ETH, BOB)?;
        advance(&mut lazy, ETH, price, 60)?;
    }
    lazy.settle(ETH, BOB)?;

    println!("  Settled every version:  {}", eager.collateral(ETH, BOB)?);
    println!("  Settled once at the end: {}", lazy.collateral(ETH, BOB)?);
    println!("  Latest version: {}\n", lazy.latest_version(ETH)?);
    Ok(())
}

/// Imbalanced takers pay funding to makers and the minor side.
fn scenario_3_funding() -> Result<(), EngineError> {
    println!("Scenario 3: Funding\n");

    let mut engine = new_engine(MarketParameter::default())?;
    engine.update(ETH, MAKER, PositionDelta::maker(dec!(20)), Quote::new(dec!(20_000)))?;
    engine.update(ETH, ALICE, PositionDelta::long(dec!(18)), Quote::new(dec!(10_000)))?;
    advance(&mut engine, ETH, dec!(2000), 1)?;

    let position = engine.global_next_position(ETH)?;
    println!("  Utilization: {}", position.utilization().round_dp(4));

    // one day at a flat price
    advance(&mut engine, ETH, dec!(2000), 86_400)?;
    let result = engine.settle_market(ETH)?;
    engine.settle_all(ETH)?;
    println!("  Funding over one day: {}", result.funding.value().round_dp(4));
    println!("  Alice collateral: {}", engine.collateral(ETH, ALICE)?.value().round_dp(4));
    println!("  Maker collateral: {}\n", engine.collateral(ETH, MAKER)?.value().round_dp(4));
    Ok(())
}

/// A crash pushes a taker under water: liquidation, shortfall, resolution.
fn scenario_4_liquidation_and_shortfall() -> Result<(), EngineError> {
    println!("Scenario 4: Liquidation and Shortfall\n");

    let mut engine = new_engine(MarketParameter::default())?;
    engine.update(ETH, MAKER, PositionDelta::maker(dec!(50)), Quote::new(dec!(50_000)))?;
    engine.update(ETH, ALICE, PositionDelta::long(dec!(10)), Quote::new(dec!(2_500)))?;
    advance(&mut engine, ETH, dec!(2000), 12)?;
    advance(&mut engine, ETH, dec!(1800), 12)?;

    engine.settle(ETH, ALICE)?;
    let collateral = engine.collateral(ETH, ALICE)?;
    let requirement = engine.maintenance(ETH, ALICE)?;
    println!(
        "  Alice collateral {} vs maintenance {}: {:?}",
        collateral.value().round_dp(2),
        requirement,
        evaluate_margin_status(collateral, requirement)
    );

    let liquidation = engine.liquidate(ETH, ALICE, KEEPER)?;
    println!("  Keeper closes {:?}, earns {}", liquidation.closed, liquidation.fee);

    // price keeps falling before the close takes effect
    advance(&mut engine, ETH, dec!(1500), 12)?;
    engine.settle(ETH, ALICE)?;
    let shortfall = engine.shortfall(ETH)?;
    println!("  Alice collateral {}, market shortfall {}", engine.collateral(ETH, ALICE)?, shortfall.value().round_dp(2));

    // the maker covers the hole out of pocket
    if shortfall.is_positive() {
        let left = engine.resolve_shortfall(ETH, MAKER, shortfall)?;
        println!("  Shortfall resolved, {} left", left);
    }
    for event in engine.recent_events(3) {
        println!("  event #{}: {:?}", event.id.0, event.payload);
    }
    println!();
    Ok(())
}

/// Deposits mint next epoch, redemptions become claimable next epoch.
fn scenario_5_vault_epochs() -> Result<(), EngineError> {
    println!("Scenario 5: Vault Epochs\n");

    let mut engine = new_engine(MarketParameter::default())?;
    engine.add_market(BTC, MarketParameter::default(), MockOracle::with_price(dec!(40_000)))?;

    let parameter = VaultParameter {
        markets: vec![
            VaultMarket { market: ETH, weight: 1 },
            VaultMarket { market: BTC, weight: 3 },
        ],
        target_leverage: dec!(2),
        max_collateral: Some(Quote::new(dec!(1_000_000))),
    };
    let mut vault = Vault::new(VAULT, parameter, &engine)?;

    vault.deposit(&mut engine, ALICE, Quote::new(dec!(40_000)))?;
    vault.deposit(&mut engine, BOB, Quote::new(dec!(20_000)))?;
    println!("  Alice deposits 40,000, Bob 20,000. Shares: {} / {}", vault.balance_of(ALICE), vault.balance_of(BOB));
    for target in vault.targets(&engine)? {
        println!("  Target {:?}: collateral {}, maker {}", target.market, target.collateral, target.maker);
    }

    advance(&mut engine, ETH, dec!(2000), 12)?;
    advance(&mut engine, BTC, dec!(40_000), 12)?;
    vault.settle(&mut engine, ALICE)?;
    vault.settle(&mut engine, BOB)?;
    println!("  Epoch {} open. Shares: {} / {}", vault.epoch(), vault.balance_of(ALICE), vault.balance_of(BOB));

    vault.redeem(&mut engine, BOB, dec!(20_000))?;
    advance(&mut engine, ETH, dec!(2000), 12)?;
    advance(&mut engine, BTC, dec!(40_000), 12)?;
    let paid = vault.claim(&mut engine, BOB)?;
    println!("  Bob redeems everything and claims {}", paid);
    println!(
        "  Vault: supply {}, assets {}, healthy {}",
        vault.total_supply(),
        vault.total_assets(&engine)?,
        vault.is_healthy(&engine)?
    );
    Ok(())
}
