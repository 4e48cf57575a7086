//! Market state.
//!
//! A market owns its settled global position, the pending global delta, the
//! per-version accumulator table, every account that has touched it, and its
//! collateral ledger. Settlement (see `settlement.rs`) is the only thing that
//! advances `latest_version`.

use crate::account::Account;
use crate::accumulator::VersionedAccumulator;
use crate::collateral::CollateralLedger;
use crate::config::MarketParameter;
use crate::oracle::OracleVersion;
use crate::position::{Position, PrePosition};
use crate::types::{AccountId, MarketId, Quote, Version};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketState {
    pub id: MarketId,
    pub parameter: MarketParameter,
    /// Version the market was created at.
    pub genesis: Version,
    /// Last version the global position has been settled to.
    pub latest_version: Version,
    pub position: Position,
    pub pre: PrePosition,
    pub accumulators: VersionedAccumulator,
    pub accounts: HashMap<AccountId, Account>,
    pub ledger: CollateralLedger,
}

impl MarketState {
    pub fn new(id: MarketId, parameter: MarketParameter, genesis: &OracleVersion) -> Self {
        Self {
            id,
            parameter,
            genesis: genesis.version,
            latest_version: genesis.version,
            position: Position::zero(),
            pre: PrePosition::empty(genesis.version),
            accumulators: VersionedAccumulator::new(genesis.version),
            accounts: HashMap::new(),
            ledger: CollateralLedger::new(),
        }
    }

    /// Global position once the pending delta folds.
    pub fn next_position(&self) -> Position {
        self.position.with_delta(&self.pre.delta)
    }

    /// Read-only view; accounts that never interacted read as empty.
    pub fn account(&self, id: AccountId) -> Account {
        self.accounts
            .get(&id)
            .cloned()
            .unwrap_or_else(|| Account::new(id, self.latest_version))
    }

    /// Creates the account on first touch, settled as of the market's latest version.
    pub fn account_mut(&mut self, id: AccountId) -> &mut Account {
        let version = self.latest_version;
        self.accounts
            .entry(id)
            .or_insert_with(|| Account::new(id, version))
    }

    pub fn collateral(&self, id: AccountId) -> Quote {
        self.ledger.balance(id)
    }

    /// Trade fees collected but not yet distributed.
    pub fn pending_fee(&self) -> Quote {
        self.pre.fee
    }

    /// Sum of every account's settled position.
    pub fn sum_account_positions(&self) -> Position {
        self.accounts.values().fold(Position::zero(), |acc, a| Position {
            maker: acc.maker + a.position.maker,
            long: acc.long + a.position.long,
            short: acc.short + a.position.short,
        })
    }

    pub fn all_accounts_settled(&self) -> bool {
        self.accounts
            .values()
            .all(|a| a.latest_version == self.latest_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::PositionDelta;
    use crate::types::{Price, Timestamp};
    use rust_decimal_macros::dec;

    fn market() -> MarketState {
        let genesis = OracleVersion::new(Version(0), Timestamp::from_secs(0), Price::new(dec!(100)));
        MarketState::new(MarketId(1), MarketParameter::default(), &genesis)
    }

    #[test]
    fn new_market_is_flat() {
        let m = market();
        assert_eq!(m.latest_version, Version(0));
        assert!(m.position.is_empty());
        assert!(m.accumulators.at(Version(0)).is_some());
    }

    #[test]
    fn accounts_created_on_first_touch() {
        let mut m = market();
        assert!(m.accounts.is_empty());
        assert!(m.account(AccountId(7)).is_empty());
        assert!(m.accounts.is_empty());

        m.account_mut(AccountId(7)).pre.push(Version(1), &PositionDelta::long(dec!(1)), Quote::zero());
        assert_eq!(m.accounts.len(), 1);
        assert_eq!(m.account(AccountId(7)).next().long, dec!(1));
    }

    #[test]
    fn next_position_includes_pre() {
        let mut m = market();
        m.pre.push(Version(1), &PositionDelta::maker(dec!(5)), Quote::zero());
        assert_eq!(m.next_position().maker, dec!(5));
        assert!(m.position.is_empty());
    }
}
