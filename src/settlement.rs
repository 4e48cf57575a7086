// 9.0 settlement.rs: lazy catch-up of market and account state against the oracle.
// three markers: a = last settled, b = version the pending delta becomes effective, c = latest.
// a == c is a no-op. otherwise replay a -> b with the old position, fold the pending delta at b,
// replay b -> c with the new position. every committed version in between gets its own
// accumulator snapshot, so settling in one call or many gives the same result.
// 9.1 market settlement. 9.2 account settlement (always after the market, same call).

use log::{debug, info};
use rust_decimal::Decimal;

use crate::account::Account;
use crate::accumulator::{accumulate, Accumulator};
use crate::config::ProtocolParameter;
use crate::market::MarketState;
use crate::oracle::{OracleError, OracleProvider, OracleVersion};
use crate::types::{AccountId, Quote, Version};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalSettlement {
    pub from: Version,
    pub to: Version,
    // versions replayed
    pub steps: u64,
    pub funding: Quote,
    pub protocol_fee: Quote,
    pub market_fee: Quote,
}

impl GlobalSettlement {
    fn noop(at: Version) -> Self {
        Self {
            from: at,
            to: at,
            steps: 0,
            funding: Quote::zero(),
            protocol_fee: Quote::zero(),
            market_fee: Quote::zero(),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.from == self.to
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountSettlement {
    pub account: AccountId,
    pub from: Version,
    pub to: Version,
    pub value: Quote,
    pub reward: Decimal,
    pub shortfall: Quote,
}

impl AccountSettlement {
    fn noop(account: AccountId, at: Version) -> Self {
        Self {
            account,
            from: at,
            to: at,
            value: Quote::zero(),
            reward: Decimal::ZERO,
            shortfall: Quote::zero(),
        }
    }
}

/// Split an extracted fee into (protocol, market) shares.
pub fn split_fee(fee: Quote, protocol: &ProtocolParameter) -> (Quote, Quote) {
    let protocol_share = fee.mul(protocol.protocol_fee);
    (protocol_share, fee.sub(protocol_share))
}

// pending boundary: the pre version if it is committed, otherwise c
fn boundary(pending: bool, pre_version: Version, a: Version, c: Version) -> Version {
    if pending && pre_version <= c {
        pre_version.max(a)
    } else {
        c
    }
}

/// 9.1: bring the market-wide position and accumulators up to the oracle's latest version.
pub fn settle_market<O: OracleProvider + ?Sized>(
    market: &mut MarketState,
    oracle: &O,
    protocol: &ProtocolParameter,
) -> Result<GlobalSettlement, OracleError> {
    let a = market.latest_version;
    let c = oracle.latest().version;
    if c <= a {
        return Ok(GlobalSettlement::noop(a));
    }

    let pending = !market.pre.is_empty();
    let b = boundary(pending, market.pre.version, a, c);
    let mut summary = GlobalSettlement::noop(a);

    replay(market, oracle, protocol, a, b, &mut summary)?;

    if pending && b <= c && market.pre.version <= b {
        fold_market(market, protocol, &mut summary);
    }

    replay(market, oracle, protocol, b, c, &mut summary)?;

    market.latest_version = c;
    summary.to = c;
    debug!(
        "market {:?} settled {} -> {} ({} steps, funding {})",
        market.id, a, c, summary.steps, summary.funding
    );
    Ok(summary)
}

fn replay<O: OracleProvider + ?Sized>(
    market: &mut MarketState,
    oracle: &O,
    protocol: &ProtocolParameter,
    from: Version,
    to: Version,
    summary: &mut GlobalSettlement,
) -> Result<(), OracleError> {
    let mut prev = committed(oracle, from)?;
    let mut v = from;
    while v < to {
        v = v.next();
        let cur = committed(oracle, v)?;

        // the trade fee for deltas effective at v is paid on the step that ends at v
        let pending_fee = if !market.pre.is_empty() && market.pre.version == v {
            std::mem::take(&mut market.pre.fee)
        } else {
            Quote::zero()
        };

        let step = accumulate(&market.position, &prev, &cur, &market.parameter, pending_fee);
        let snapshot = market.accumulators.latest().add(&step.delta);
        market.accumulators.record(v, snapshot);

        let (protocol_fee, market_fee) = split_fee(step.fee(), protocol);
        market.ledger.credit_fees(protocol_fee, market_fee);

        summary.steps += 1;
        summary.funding = summary.funding.add(step.funding);
        summary.protocol_fee = summary.protocol_fee.add(protocol_fee);
        summary.market_fee = summary.market_fee.add(market_fee);
        prev = cur;
    }
    Ok(())
}

fn fold_market(market: &mut MarketState, protocol: &ProtocolParameter, summary: &mut GlobalSettlement) {
    market.position = market.position.with_delta(&market.pre.delta);
    // fee left over if no step consumed it
    if !market.pre.fee.is_zero() {
        let (protocol_fee, market_fee) = split_fee(market.pre.fee, protocol);
        market.ledger.credit_fees(protocol_fee, market_fee);
        summary.protocol_fee = summary.protocol_fee.add(protocol_fee);
        summary.market_fee = summary.market_fee.add(market_fee);
    }
    market.pre.clear();
}

fn committed<O: OracleProvider + ?Sized>(oracle: &O, version: Version) -> Result<OracleVersion, OracleError> {
    let observed = oracle.at(version);
    if !observed.valid {
        return Err(OracleError::NotCommitted(version));
    }
    Ok(observed)
}

/// 9.2: settle one account up to the market's latest version. Run after
/// `settle_market`; reads the snapshots the market recorded.
pub fn settle_account(market: &mut MarketState, id: AccountId) -> AccountSettlement {
    let c = market.latest_version;
    let account = market
        .accounts
        .entry(id)
        .or_insert_with(|| Account::new(id, c));
    let a = account.latest_version;
    if a >= c {
        return AccountSettlement::noop(id, a);
    }

    let accumulators = &market.accumulators;
    let snapshot = |v: Version| -> Accumulator { accumulators.at(v).copied().unwrap_or_default() };

    let pending = !account.pre.is_empty();
    let b = boundary(pending, account.pre.version, a, c);

    let first = snapshot(b).sub(&snapshot(a));
    let mut value = first.value_of(&account.position);
    let mut reward = first.reward_of(&account.position);

    if pending && account.pre.version <= b {
        account.position = account.position.with_delta(&account.pre.delta);
        account.pre.clear();
    }

    let second = snapshot(c).sub(&snapshot(b));
    value = value.add(second.value_of(&account.position));
    reward += second.reward_of(&account.position);

    account.latest_version = c;
    account.reward += reward;

    let shortfall = market.ledger.settle_account(id, value);
    if !shortfall.is_zero() {
        info!("account {:?} in market {:?} created shortfall {}", id, market.id, shortfall);
    }

    AccountSettlement {
        account: id,
        from: a,
        to: c,
        value,
        reward,
        shortfall,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MarketParameter;
    use crate::oracle::MockOracle;
    use crate::position::PositionDelta;
    use crate::types::MarketId;
    use rust_decimal_macros::dec;

    const MAKER: AccountId = AccountId(1);
    const TAKER: AccountId = AccountId(2);

    fn setup() -> (MarketState, MockOracle, ProtocolParameter) {
        let oracle = MockOracle::with_price(dec!(100));
        let market = MarketState::new(MarketId(1), MarketParameter::default(), &oracle.latest());
        (market, oracle, ProtocolParameter::default())
    }

    // queue a delta on both the account and the market, like an update would
    fn queue(market: &mut MarketState, oracle: &MockOracle, id: AccountId, delta: PositionDelta) {
        let version = oracle.current();
        market.account_mut(id).pre.push(version, &delta, Quote::zero());
        market.pre.push(version, &delta, Quote::zero());
    }

    fn settle_all(market: &mut MarketState, oracle: &MockOracle, protocol: &ProtocolParameter) {
        settle_market(market, oracle, protocol).unwrap();
        let ids: Vec<AccountId> = market.accounts.keys().copied().collect();
        for id in ids {
            settle_account(market, id);
        }
    }

    #[test]
    fn noop_when_caught_up() {
        let (mut market, oracle, protocol) = setup();
        let result = settle_market(&mut market, &oracle, &protocol).unwrap();
        assert!(result.is_noop());
        assert_eq!(market.latest_version, Version(0));
    }

    #[test]
    fn pending_delta_not_visible_before_commit() {
        let (mut market, oracle, protocol) = setup();
        queue(&mut market, &oracle, TAKER, PositionDelta::long(dec!(1)));

        settle_all(&mut market, &oracle, &protocol);
        assert!(market.position.is_empty());
        assert!(market.account(TAKER).position.is_empty());
    }

    #[test]
    fn pending_delta_folds_at_its_version() {
        let (mut market, mut oracle, protocol) = setup();
        queue(&mut market, &oracle, MAKER, PositionDelta::maker(dec!(10)));
        oracle.advance(dec!(100), 60).unwrap();

        settle_all(&mut market, &oracle, &protocol);
        assert_eq!(market.position.maker, dec!(10));
        assert_eq!(market.account(MAKER).position.maker, dec!(10));
        assert!(market.pre.is_empty());
        assert_eq!(market.latest_version, Version(1));
    }

    #[test]
    fn settlement_is_idempotent() {
        let (mut market, mut oracle, protocol) = setup();
        queue(&mut market, &oracle, MAKER, PositionDelta::maker(dec!(10)));
        queue(&mut market, &oracle, TAKER, PositionDelta::long(dec!(5)));
        oracle.advance(dec!(100), 60).unwrap();
        oracle.advance(dec!(110), 60).unwrap();
        market.ledger.deposit(MAKER, Quote::new(dec!(1000)));
        market.ledger.deposit(TAKER, Quote::new(dec!(1000)));

        settle_all(&mut market, &oracle, &protocol);
        let first = (market.accumulators.latest(), market.collateral(MAKER), market.collateral(TAKER));

        let again = settle_market(&mut market, &oracle, &protocol).unwrap();
        assert!(again.is_noop());
        let acct = settle_account(&mut market, TAKER);
        assert!(acct.value.is_zero());
        let second = (market.accumulators.latest(), market.collateral(MAKER), market.collateral(TAKER));
        assert_eq!(first, second);
    }

    #[test]
    fn skipped_versions_replayed_one_by_one() {
        let (mut market, mut oracle, protocol) = setup();
        queue(&mut market, &oracle, MAKER, PositionDelta::maker(dec!(10)));
        for price in [dec!(101), dec!(99), dec!(104)] {
            oracle.advance(price, 60).unwrap();
        }
        let result = settle_market(&mut market, &oracle, &protocol).unwrap();
        assert_eq!(result.steps, 3);
        for v in 0..=3 {
            assert!(market.accumulators.at(Version(v)).is_some());
        }
    }

    #[test]
    fn taker_pnl_and_maker_loss_are_symmetric() {
        let (mut market, mut oracle, protocol) = setup();
        market.ledger.deposit(MAKER, Quote::new(dec!(1000)));
        market.ledger.deposit(TAKER, Quote::new(dec!(1000)));
        queue(&mut market, &oracle, MAKER, PositionDelta::maker(dec!(10)));
        queue(&mut market, &oracle, TAKER, PositionDelta::long(dec!(10)));
        oracle.advance(dec!(100), 1).unwrap();
        settle_all(&mut market, &oracle, &protocol);

        // price up 5; funding over 1s is tiny but nonzero
        oracle.advance(dec!(105), 1).unwrap();
        settle_all(&mut market, &oracle, &protocol);

        let maker = market.collateral(MAKER).value();
        let taker = market.collateral(TAKER).value();
        let fees = market.ledger.fees().total().value();
        assert!(taker > dec!(1049) && taker < dec!(1050));
        assert!((maker + taker + fees - dec!(2000)).abs() < dec!(0.000001));
    }

    #[test]
    fn account_catches_up_over_many_versions() {
        let (mut market, mut oracle, protocol) = setup();
        market.ledger.deposit(MAKER, Quote::new(dec!(1000)));
        market.ledger.deposit(TAKER, Quote::new(dec!(1000)));
        queue(&mut market, &oracle, MAKER, PositionDelta::maker(dec!(10)));
        queue(&mut market, &oracle, TAKER, PositionDelta::short(dec!(10)));
        oracle.advance(dec!(100), 1).unwrap();
        settle_all(&mut market, &oracle, &protocol);

        oracle.advance(dec!(90), 1).unwrap();
        // market settles alone; account stays behind
        settle_market(&mut market, &oracle, &protocol).unwrap();
        oracle.advance(dec!(95), 1).unwrap();
        settle_market(&mut market, &oracle, &protocol).unwrap();

        let result = settle_account(&mut market, TAKER);
        assert_eq!(result.from, Version(1));
        assert_eq!(result.to, Version(3));
        // short gains 5/unit net, less funding
        assert!(result.value.value() > dec!(49) && result.value.value() < dec!(50));
    }

    #[test]
    fn loss_beyond_collateral_becomes_shortfall() {
        let (mut market, mut oracle, protocol) = setup();
        market.ledger.deposit(MAKER, Quote::new(dec!(10_000)));
        market.ledger.deposit(TAKER, Quote::new(dec!(50)));
        queue(&mut market, &oracle, MAKER, PositionDelta::maker(dec!(10)));
        queue(&mut market, &oracle, TAKER, PositionDelta::long(dec!(10)));
        oracle.advance(dec!(100), 1).unwrap();
        settle_all(&mut market, &oracle, &protocol);

        oracle.advance(dec!(80), 1).unwrap();
        settle_all(&mut market, &oracle, &protocol);

        assert!(market.collateral(TAKER).is_zero());
        assert!(market.ledger.shortfall().value() > dec!(149));
        let accounted = market.ledger.accounted();
        assert!((accounted.value() - market.ledger.net_inflow().value()).abs() < dec!(0.000001));
    }

    #[test]
    fn trade_fee_without_makers_fully_extracted() {
        let (mut market, mut oracle, protocol) = setup();
        let version = oracle.current();
        market.pre.push(version, &PositionDelta::long(dec!(1)), Quote::new(dec!(4)));
        oracle.advance(dec!(100), 1).unwrap();
        settle_market(&mut market, &oracle, &protocol).unwrap();

        // no makers: the whole fee is extracted, split 50/50
        assert_eq!(market.ledger.fees().protocol, Quote::new(dec!(2)));
        assert_eq!(market.ledger.fees().market, Quote::new(dec!(2)));
        assert!(market.pre.fee.is_zero());
    }

    #[test]
    fn split_fee_by_protocol_share() {
        let protocol = ProtocolParameter {
            protocol_fee: dec!(0.25),
            ..ProtocolParameter::default()
        };
        let (p, m) = split_fee(Quote::new(dec!(8)), &protocol);
        assert_eq!(p, Quote::new(dec!(2)));
        assert_eq!(m, Quote::new(dec!(6)));
    }
}
