//! Stress tests
//!
//! These tests simulate extreme market conditions to verify the engine remains
//! solvent and behaves correctly under stress.

use perps_settlement::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const ETH: MarketId = MarketId(1);
const MAKER: AccountId = AccountId(1);
const KEEPER: AccountId = AccountId(99);
const DUST: Decimal = dec!(0.000001);

// flat zero curve: price moves only, no funding
fn no_funding() -> MarketParameter {
    MarketParameter {
        utilization_curve: JumpRateUtilizationCurve {
            minimum_rate: Decimal::ZERO,
            maximum_rate: Decimal::ZERO,
            target_rate: Decimal::ZERO,
            target_utilization: dec!(0.8),
        },
        ..MarketParameter::default()
    }
}

fn engine_with(parameter: MarketParameter, maker: Decimal) -> Engine {
    let mut engine: Engine = Engine::new(EngineConfig::default(), InMemoryCustody::new());
    engine.add_market(ETH, parameter, MockOracle::with_price(dec!(100))).unwrap();
    engine.custody_mut().fund(MAKER, Quote::new(dec!(10_000_000)));
    engine
        .update(ETH, MAKER, PositionDelta::maker(maker), Quote::new(dec!(1_000_000)))
        .unwrap();
    engine
}

fn trader(engine: &mut Engine, id: u64, delta: PositionDelta, collateral: Decimal) -> AccountId {
    let account = AccountId(id);
    engine.custody_mut().fund(account, Quote::new(collateral));
    engine.update(ETH, account, delta, Quote::new(collateral)).unwrap();
    account
}

fn advance(engine: &mut Engine, price: Decimal) {
    engine.oracle_mut(ETH).unwrap().advance(price, 60).unwrap();
}

/// Tests rapid price movements and cascading liquidations.
mod cascade_tests {
    use super::*;

    #[test]
    fn liquidation_cascade_no_bad_debt() {
        let mut engine = engine_with(no_funding(), dec!(1000));

        // ten 1 ETH longs, collateral 21 through 30
        let traders: Vec<AccountId> = (1..=10)
            .map(|i| trader(&mut engine, 10 + i, PositionDelta::long(Decimal::ONE), dec!(20) + Decimal::from(i)))
            .collect();
        advance(&mut engine, dec!(100));

        let mut liquidated = Vec::new();
        for price in [dec!(85), dec!(80), dec!(80)] {
            advance(&mut engine, price);
            for &account in &traders {
                engine.settle(ETH, account).unwrap();
                if engine.is_liquidatable(ETH, account).unwrap() && !engine.is_liquidating(ETH, account).unwrap() {
                    engine.liquidate(ETH, account, KEEPER).unwrap();
                    liquidated.push(account);
                }
            }
        }
        engine.settle_all(ETH).unwrap();

        // 85 takes out the three thinnest, 80 takes the next four
        assert_eq!(liquidated, traders[..7].to_vec());
        assert!(engine.shortfall(ETH).unwrap().is_zero());
        for &account in &traders[..7] {
            assert!(engine.position(ETH, account).unwrap().is_empty());
            assert!(!engine.collateral(ETH, account).unwrap().is_negative());
        }

        // 3 * 0.85 + 4 * 0.8
        assert_eq!(engine.custody().balance_of(KEEPER), Quote::new(dec!(5.75)));
    }

    #[test]
    fn rapid_price_movement_both_directions() {
        let mut engine = engine_with(no_funding(), dec!(100));
        let long = trader(&mut engine, 2, PositionDelta::long(dec!(10)), dec!(5_000));
        let short = trader(&mut engine, 3, PositionDelta::short(dec!(4)), dec!(5_000));
        advance(&mut engine, dec!(100));

        let prices = [dec!(150), dec!(60), dec!(140), dec!(75), dec!(130), dec!(90), dec!(100)];
        for price in prices {
            advance(&mut engine, price);
            engine.settle_all(ETH).unwrap();
        }

        // back where it started: every side is flat
        assert_eq!(engine.collateral(ETH, long).unwrap(), Quote::new(dec!(5_000)));
        assert_eq!(engine.collateral(ETH, short).unwrap(), Quote::new(dec!(5_000)));
        assert_eq!(engine.collateral(ETH, MAKER).unwrap(), Quote::new(dec!(1_000_000)));
    }

    #[test]
    fn crash_creates_shortfall_then_resolves() {
        let mut engine = engine_with(no_funding(), dec!(100));
        let long = trader(&mut engine, 2, PositionDelta::long(dec!(10)), dec!(150));
        advance(&mut engine, dec!(100));
        advance(&mut engine, dec!(50));

        engine.settle_all(ETH).unwrap();
        assert!(engine.collateral(ETH, long).unwrap().is_zero());
        assert_eq!(engine.shortfall(ETH).unwrap(), Quote::new(dec!(350)));

        // the maker was paid in full even though the loser could not cover it
        assert_eq!(engine.collateral(ETH, MAKER).unwrap(), Quote::new(dec!(1_000_500)));

        let left = engine.resolve_shortfall(ETH, MAKER, Quote::new(dec!(350))).unwrap();
        assert!(left.is_zero());
        assert!(engine.shortfall(ETH).unwrap().is_zero());
    }
}

mod edge_case_tests {
    use super::*;

    #[test]
    fn exact_maintenance_margin_boundary() {
        let mut engine = engine_with(no_funding(), dec!(100));
        let long = trader(&mut engine, 2, PositionDelta::long(dec!(1)), dec!(28));
        advance(&mut engine, dec!(100));
        advance(&mut engine, dec!(80));
        engine.settle(ETH, long).unwrap();

        // collateral 8, maintenance 1 * 80 * 0.1 = 8
        assert_eq!(engine.collateral(ETH, long).unwrap(), Quote::new(dec!(8)));
        assert_eq!(engine.maintenance(ETH, long).unwrap(), Quote::new(dec!(8)));
        assert!(!engine.is_liquidatable(ETH, long).unwrap());
        assert!(engine.liquidate(ETH, long, KEEPER).is_err());

        advance(&mut engine, dec!(79.99));
        engine.settle(ETH, long).unwrap();
        assert!(engine.is_liquidatable(ETH, long).unwrap());
    }

    #[test]
    fn maximum_leverage_position() {
        let mut engine = engine_with(no_funding(), dec!(100));
        engine.custody_mut().fund(AccountId(2), Quote::new(dec!(1_000)));

        // 10 ETH at 100 needs exactly 100
        assert!(engine
            .update(ETH, AccountId(2), PositionDelta::long(dec!(10)), Quote::new(dec!(99.99)))
            .is_err());
        assert!(engine
            .update(ETH, AccountId(2), PositionDelta::long(dec!(10)), Quote::new(dec!(100)))
            .is_ok());
    }

    #[test]
    fn many_skipped_versions_settle_in_one_call() {
        let mut engine = engine_with(no_funding(), dec!(100));
        let long = trader(&mut engine, 2, PositionDelta::long(dec!(1)), dec!(1_000));
        advance(&mut engine, dec!(100));

        for i in 0..500 {
            let swing = Decimal::from(i % 7) - dec!(3);
            advance(&mut engine, dec!(100) + swing);
        }
        let last = engine.latest_price(ETH).unwrap().value();

        let result = engine.settle(ETH, long).unwrap();
        assert_eq!(result.market.steps, 501);
        assert_eq!(result.account.to, Version(501));
        assert_eq!(engine.collateral(ETH, long).unwrap(), Quote::new(dec!(1_000) + last - dec!(100)));
    }

    #[test]
    fn zero_price_is_settled_not_rejected() {
        let mut engine = engine_with(no_funding(), dec!(100));
        let short = trader(&mut engine, 2, PositionDelta::short(dec!(1)), dec!(50));
        advance(&mut engine, dec!(100));
        advance(&mut engine, Decimal::ZERO);
        engine.settle(ETH, short).unwrap();

        assert_eq!(engine.collateral(ETH, short).unwrap(), Quote::new(dec!(150)));
        assert!(engine.maintenance(ETH, short).unwrap().is_zero());
    }
}

mod funding_tests {
    use super::*;

    #[test]
    fn funding_with_balanced_takers() {
        let mut engine = engine_with(MarketParameter::default(), dec!(100));
        trader(&mut engine, 2, PositionDelta::long(dec!(10)), dec!(1_000));
        trader(&mut engine, 3, PositionDelta::short(dec!(10)), dec!(1_000));
        advance(&mut engine, dec!(100));
        engine.oracle_mut(ETH).unwrap().advance(dec!(100), 86_400).unwrap();

        let result = engine.settle_market(ETH).unwrap();
        assert!(result.funding.is_zero());
        engine.settle_all(ETH).unwrap();
        assert_eq!(engine.collateral(ETH, AccountId(2)).unwrap(), Quote::new(dec!(1_000)));
    }

    #[test]
    fn funding_preserves_zero_sum() {
        let mut engine = engine_with(MarketParameter::default(), dec!(100));
        let long = trader(&mut engine, 2, PositionDelta::long(dec!(50)), dec!(10_000));
        let short = trader(&mut engine, 3, PositionDelta::short(dec!(10)), dec!(10_000));
        advance(&mut engine, dec!(100));
        engine.oracle_mut(ETH).unwrap().advance(dec!(100), 86_400).unwrap();

        let result = engine.settle_market(ETH).unwrap();
        engine.settle_all(ETH).unwrap();
        assert!(result.funding.is_positive());

        let paid = Quote::new(dec!(10_000)).sub(engine.collateral(ETH, long).unwrap());
        let to_short = engine.collateral(ETH, short).unwrap().sub(Quote::new(dec!(10_000)));
        let to_maker = engine.collateral(ETH, MAKER).unwrap().sub(Quote::new(dec!(1_000_000)));
        let fees = engine.fees(ETH).unwrap().total();

        assert!((paid.value() - result.funding.value()).abs() < DUST);
        assert!((paid.value() - to_short.value() - to_maker.value() - fees.value()).abs() < DUST);
        // funding fee is 10%
        assert!((fees.value() - result.funding.value() * dec!(0.1)).abs() < DUST);
    }

    #[test]
    fn funding_multiple_periods() {
        let mut engine = engine_with(MarketParameter::default(), dec!(100));
        let short = trader(&mut engine, 2, PositionDelta::short(dec!(50)), dec!(10_000));
        advance(&mut engine, dec!(100));

        let mut last = engine.collateral(ETH, short).unwrap();
        for _ in 0..5 {
            engine.oracle_mut(ETH).unwrap().advance(dec!(100), 3_600).unwrap();
            engine.settle(ETH, short).unwrap();
            let now = engine.collateral(ETH, short).unwrap();
            // shorts are the major side and pay every period
            assert!(now < last);
            last = now;
        }
    }
}

mod position_management_tests {
    use super::*;

    #[test]
    fn flip_long_to_short() {
        let mut engine = engine_with(no_funding(), dec!(100));
        let account = trader(&mut engine, 2, PositionDelta::long(dec!(10)), dec!(1_000));
        advance(&mut engine, dec!(100));

        // the close has to settle before the short can open
        engine.update(ETH, account, PositionDelta::long(dec!(-10)), Quote::zero()).unwrap();
        assert!(engine.update(ETH, account, PositionDelta::short(dec!(10)), Quote::zero()).is_err());
        advance(&mut engine, dec!(110));

        engine.update(ETH, account, PositionDelta::short(dec!(10)), Quote::zero()).unwrap();
        advance(&mut engine, dec!(110));
        advance(&mut engine, dec!(100));
        engine.settle(ETH, account).unwrap();

        // long through the rise, short through the fall
        assert_eq!(engine.position(ETH, account).unwrap(), Position::new(Decimal::ZERO, Decimal::ZERO, dec!(10)));
        assert_eq!(engine.collateral(ETH, account).unwrap(), Quote::new(dec!(1_200)));
    }

    #[test]
    fn partial_close_preserves_pnl() {
        let mut engine = engine_with(no_funding(), dec!(100));
        let account = trader(&mut engine, 2, PositionDelta::long(dec!(10)), dec!(1_000));
        advance(&mut engine, dec!(100));
        advance(&mut engine, dec!(110));

        engine.update(ETH, account, PositionDelta::long(dec!(-5)), Quote::zero()).unwrap();
        advance(&mut engine, dec!(110));
        advance(&mut engine, dec!(120));
        engine.settle(ETH, account).unwrap();

        // 10 * 10 realized before the close, 5 * 10 after
        assert_eq!(engine.collateral(ETH, account).unwrap(), Quote::new(dec!(1_150)));
        assert_eq!(engine.position(ETH, account).unwrap().long, dec!(5));
    }

    #[test]
    fn requests_in_one_version_merge() {
        let mut engine = engine_with(no_funding(), dec!(100));
        let account = trader(&mut engine, 2, PositionDelta::long(dec!(3)), dec!(1_000));
        engine.update(ETH, account, PositionDelta::long(dec!(4)), Quote::zero()).unwrap();

        let pending = engine.pending_position(ETH, account).unwrap();
        assert_eq!(pending.version, Version(1));
        assert_eq!(pending.delta.long, dec!(7));

        advance(&mut engine, dec!(100));
        engine.settle(ETH, account).unwrap();
        assert_eq!(engine.position(ETH, account).unwrap().long, dec!(7));
    }
}
