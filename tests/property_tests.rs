//! Property-based tests for the settlement math.
//!
//! These tests verify invariants hold under random inputs.

use perps_settlement::*;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const DUST: Decimal = dec!(0.000001);

// Strategies for generating test data
fn price_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..1_000_000i64).prop_map(|x| Decimal::new(x, 2)) // $0.01 to $10,000
}

fn size_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..10_000i64).prop_map(|x| Decimal::new(x, 2)) // 0 to 100
}

fn utilization_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..=20_000i64).prop_map(|x| Decimal::new(x, 4)) // 0 to 2
}

fn version(v: u64, secs: i64, price: Decimal) -> OracleVersion {
    OracleVersion::new(Version(v), Timestamp::from_secs(secs), Price::new(price))
}

proptest! {
    /// Funding rate stays between the curve's minimum and maximum.
    #[test]
    fn curve_rate_bounded(utilization in utilization_strategy()) {
        let curve = JumpRateUtilizationCurve::default();
        let rate = curve.compute(utilization);
        prop_assert!(rate >= curve.minimum_rate);
        prop_assert!(rate <= curve.maximum_rate);
    }

    /// Higher utilization never pays less.
    #[test]
    fn curve_monotonic(a in utilization_strategy(), b in utilization_strategy()) {
        let curve = JumpRateUtilizationCurve::default();
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(curve.compute(lo) <= curve.compute(hi));
    }

    /// Socialization factor is in [0, 1] and the socialized sides never exceed the raw sides.
    #[test]
    fn socialization_bounded(maker in size_strategy(), long in size_strategy(), short in size_strategy()) {
        let position = Position::new(maker, long, short);
        let factor = position.socialization_factor();
        prop_assert!(factor >= Decimal::ZERO && factor <= Decimal::ONE);
        prop_assert!(position.socialized_long() <= long);
        prop_assert!(position.socialized_short() <= short);
    }

    /// Pnl and funding are zero-sum once the extracted fee is counted.
    #[test]
    fn accumulation_conserves_value(
        maker in size_strategy(),
        long in size_strategy(),
        short in size_strategy(),
        from_price in price_strategy(),
        to_price in price_strategy(),
        elapsed in 1i64..86_400i64,
    ) {
        let position = Position::new(maker, long, short);
        let from = version(0, 0, from_price);
        let to = version(1, elapsed, to_price);
        let result = accumulate(&position, &from, &to, &MarketParameter::default(), Quote::zero());

        let paid_out = result.delta.value_of(&position).add(result.fee());
        prop_assert!(paid_out.value().abs() < DUST, "leaked {}", paid_out);
    }

    /// The pending trade fee ends up either with makers or extracted, never lost.
    #[test]
    fn trade_fee_conserved(
        maker in size_strategy(),
        fee in 0i64..100_000i64,
        share in 0i64..=100i64,
    ) {
        let position = Position::new(maker, Decimal::ZERO, Decimal::ZERO);
        let parameter = MarketParameter {
            position_fee: Decimal::new(share, 2),
            ..MarketParameter::default()
        };
        let pending = Quote::new(Decimal::new(fee, 2));
        let from = version(0, 0, dec!(100));
        let to = version(1, 0, dec!(100));
        let result = accumulate(&position, &from, &to, &parameter, pending);

        let distributed = result.delta.value_of(&position).add(result.trade_fee);
        prop_assert!((distributed.value() - pending.value()).abs() < DUST);
    }

    /// Protocol and market shares always add back up to the fee.
    #[test]
    fn fee_split_exact(fee in 0i64..10_000_000i64, protocol_fee in 0i64..=100i64) {
        let protocol = ProtocolParameter {
            protocol_fee: Decimal::new(protocol_fee, 2),
            ..ProtocolParameter::default()
        };
        let fee = Quote::new(Decimal::new(fee, 2));
        let (to_protocol, to_market) = split_fee(fee, &protocol);
        prop_assert_eq!(to_protocol.add(to_market), fee);
        prop_assert!(!to_protocol.is_negative() && !to_market.is_negative());
    }

    /// The liquidation fee never exceeds either bound.
    #[test]
    fn liquidation_fee_bounded(
        balance in 0i64..1_000_000i64,
        maintenance in 0i64..1_000_000i64,
        rate in 0i64..=100i64,
    ) {
        let balance = Quote::new(Decimal::new(balance, 2));
        let maintenance = Quote::new(Decimal::new(maintenance, 2));
        let rate = Decimal::new(rate, 2);
        let fee = liquidation_fee(balance, maintenance, rate);
        prop_assert!(fee <= balance);
        prop_assert!(fee <= maintenance.mul(rate));
        prop_assert!(!fee.is_negative());
    }

    /// More collateral never turns a passing margin check into a failing one.
    #[test]
    fn margin_monotonic(
        size in 1i64..10_000i64,
        price in price_strategy(),
        collateral in 0i64..10_000_000i64,
        extra in 0i64..10_000_000i64,
    ) {
        let next = Position::new(Decimal::ZERO, Decimal::new(size, 2), Decimal::ZERO);
        let low = Quote::new(Decimal::new(collateral, 2));
        let high = low.add(Quote::new(Decimal::new(extra, 2)));
        if margin_ok(next, Price::new(price), low) {
            prop_assert!(margin_ok(next, Price::new(price), high));
        }
    }

    /// Settling once after many versions lands on the same collateral as settling every version.
    #[test]
    fn settlement_path_independent(
        prices in proptest::collection::vec(9_000i64..11_000i64, 1..12),
        long in 1i64..50i64,
    ) {
        let mut eager = open_market(Decimal::from(long));
        let mut lazy = open_market(Decimal::from(long));

        for raw in &prices {
            let price = Decimal::new(*raw, 2);
            eager.oracle_mut(MARKET).unwrap().advance(price, 30).unwrap();
            eager.settle(MARKET, TAKER).unwrap();
            eager.settle(MARKET, MAKER).unwrap();
            lazy.oracle_mut(MARKET).unwrap().advance(price, 30).unwrap();
        }
        lazy.settle(MARKET, TAKER).unwrap();
        lazy.settle(MARKET, MAKER).unwrap();

        for account in [TAKER, MAKER] {
            let a = eager.collateral(MARKET, account).unwrap();
            let b = lazy.collateral(MARKET, account).unwrap();
            prop_assert!((a.value() - b.value()).abs() < DUST, "{} vs {}", a, b);
        }
    }

    /// A second settle right after the first changes nothing.
    #[test]
    fn settlement_idempotent(
        prices in proptest::collection::vec(9_000i64..11_000i64, 1..8),
        long in 1i64..50i64,
    ) {
        let mut engine = open_market(Decimal::from(long));
        for raw in &prices {
            engine.oracle_mut(MARKET).unwrap().advance(Decimal::new(*raw, 2), 30).unwrap();
        }
        engine.settle(MARKET, TAKER).unwrap();
        let once = engine.collateral(MARKET, TAKER).unwrap();
        let second = engine.settle(MARKET, TAKER).unwrap();
        prop_assert!(second.market.is_noop());
        prop_assert_eq!(engine.collateral(MARKET, TAKER).unwrap(), once);
    }
}

fn margin_ok(next: Position, price: Price, collateral: Quote) -> bool {
    let protocol = ProtocolParameter::default();
    let market = MarketParameter::default();
    let ctx = GuardContext {
        protocol: &protocol,
        market: &market,
        price,
        delta: PositionDelta::long(next.long),
        collateral_delta: Quote::zero(),
        liquidating: false,
        current: Position::zero(),
        next,
        global_next: Position::new(next.long, next.long, Decimal::ZERO),
        collateral,
    };
    guard::margin(&ctx).is_ok()
}

const MARKET: MarketId = MarketId(1);
const MAKER: AccountId = AccountId(1);
const TAKER: AccountId = AccountId(2);

fn open_market(long: Decimal) -> Engine {
    let mut engine = Engine::new(EngineConfig::default(), InMemoryCustody::new());
    engine
        .add_market(MARKET, MarketParameter::default(), MockOracle::with_price(dec!(100)))
        .unwrap();
    engine.custody_mut().fund(MAKER, Quote::new(dec!(1_000_000)));
    engine.custody_mut().fund(TAKER, Quote::new(dec!(1_000_000)));
    engine
        .update(MARKET, MAKER, PositionDelta::maker(dec!(100)), Quote::new(dec!(100_000)))
        .unwrap();
    engine
        .update(MARKET, TAKER, PositionDelta::long(long), Quote::new(dec!(100_000)))
        .unwrap();
    engine
}
