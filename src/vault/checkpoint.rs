// 14.1: per-epoch accounting. deposits and redemptions queued during an epoch
// convert at the epoch's closing share price, once every member market has
// settled the versions the epoch's rebalance was effective at.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{MarketId, Quote, Version};

/// Shares for `assets` at a share price of `assets_total / shares_total`.
/// With no shares outstanding, or nothing backing them, the price is 1.
pub fn shares_for(assets: Quote, shares_total: Decimal, assets_total: Quote) -> Decimal {
    if shares_total.is_zero() || !assets_total.is_positive() {
        return assets.value();
    }
    assets.value() * shares_total / assets_total.value()
}

/// Assets for `shares`. Never negative: a vault under water pays out nothing.
pub fn assets_for(shares: Decimal, shares_total: Decimal, assets_total: Quote) -> Quote {
    if shares_total.is_zero() {
        return Quote::zero();
    }
    let backing = assets_total.max(Quote::zero());
    Quote::new(shares * backing.value() / shares_total)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    // shares outstanding when the epoch closed, pending redemptions included
    pub shares: Decimal,
    // assets backing them; signed, the vault can be under water
    pub assets: Quote,
    pub deposit: Quote,
    pub redemption: Decimal,
    // versions the epoch waits for, per member market
    pub versions: BTreeMap<MarketId, Version>,
    pub completed: bool,
}

impl Checkpoint {
    pub fn open(versions: BTreeMap<MarketId, Version>) -> Self {
        Self {
            shares: Decimal::ZERO,
            assets: Quote::zero(),
            deposit: Quote::zero(),
            redemption: Decimal::ZERO,
            versions,
            completed: false,
        }
    }

    /// No requests queued yet.
    pub fn is_empty(&self) -> bool {
        self.deposit.is_zero() && self.redemption.is_zero()
    }

    /// Ready once every member market has settled past its target.
    pub fn is_ready(&self, latest: &BTreeMap<MarketId, Version>) -> bool {
        self.versions
            .iter()
            .all(|(market, target)| latest.get(market).is_some_and(|v| v >= target))
    }

    /// Close the epoch. `total_shares` excludes the redeemed shares (they were
    /// burned on request) and `total_assets` still includes the deposits.
    pub fn complete(&mut self, total_shares: Decimal, total_assets: Quote) {
        self.shares = total_shares + self.redemption;
        self.assets = total_assets.sub(self.deposit);
        self.completed = true;
    }

    pub fn to_shares(&self, assets: Quote) -> Decimal {
        shares_for(assets, self.shares, self.assets)
    }

    pub fn to_assets(&self, shares: Decimal) -> Quote {
        assets_for(shares, self.shares, self.assets)
    }

    /// Shares minted for the epoch's deposits.
    pub fn minted(&self) -> Decimal {
        self.to_shares(self.deposit)
    }

    /// Assets owed for the epoch's redemptions.
    pub fn claimable(&self) -> Quote {
        self.to_assets(self.redemption)
    }

    /// Under water: shares outstanding with nothing behind them.
    pub fn is_insolvent(&self) -> bool {
        self.completed && self.shares > Decimal::ZERO && !self.assets.is_positive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const ETH: MarketId = MarketId(1);
    const BTC: MarketId = MarketId(2);

    fn targets(eth: u64, btc: u64) -> BTreeMap<MarketId, Version> {
        BTreeMap::from([(ETH, Version(eth)), (BTC, Version(btc))])
    }

    #[test]
    fn first_deposit_mints_one_to_one() {
        let mut cp = Checkpoint::open(targets(1, 1));
        cp.deposit = Quote::new(dec!(1000));
        cp.complete(Decimal::ZERO, Quote::new(dec!(1000)));
        assert_eq!(cp.assets, Quote::zero());
        assert_eq!(cp.minted(), dec!(1000));
    }

    #[test]
    fn deposit_priced_against_existing_shares() {
        let mut cp = Checkpoint::open(targets(1, 1));
        cp.deposit = Quote::new(dec!(100));
        // 1000 shares backed by 2000 before the deposit
        cp.complete(dec!(1000), Quote::new(dec!(2100)));
        assert_eq!(cp.minted(), dec!(50));
    }

    #[test]
    fn redemption_claims_pro_rata() {
        let mut cp = Checkpoint::open(targets(1, 1));
        cp.redemption = dec!(250);
        cp.complete(dec!(750), Quote::new(dec!(500)));
        assert_eq!(cp.shares, dec!(1000));
        assert_eq!(cp.claimable(), Quote::new(dec!(125)));
    }

    #[test]
    fn insolvent_vault_mints_at_par_and_pays_nothing() {
        let mut cp = Checkpoint::open(targets(1, 1));
        cp.deposit = Quote::new(dec!(100));
        cp.redemption = dec!(10);
        cp.complete(dec!(90), Quote::new(dec!(50)));
        // 50 - 100 deposit
        assert_eq!(cp.assets, Quote::new(dec!(-50)));
        assert!(cp.is_insolvent());
        assert_eq!(cp.minted(), dec!(100));
        assert!(cp.claimable().is_zero());
    }

    #[test]
    fn ready_requires_every_market() {
        let cp = Checkpoint::open(targets(3, 5));
        assert!(!cp.is_ready(&targets(3, 4)));
        assert!(cp.is_ready(&targets(3, 5)));
        assert!(cp.is_ready(&targets(4, 9)));
        assert!(!cp.is_ready(&BTreeMap::from([(ETH, Version(9))])));
    }
}
