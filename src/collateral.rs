// 13.0: collateral ledger. one per market. signed math inside, balances never stored negative.
// when settlement would push an account below zero the excess becomes market shortfall.
// 13.1 fee balances (protocol/market split). 13.2 running totals for conservation checks.

use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::{AccountId, Quote};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeRecipient {
    Protocol,
    Market,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeBalances {
    pub protocol: Quote,
    pub market: Quote,
}

impl FeeBalances {
    pub fn get(&self, recipient: FeeRecipient) -> Quote {
        match recipient {
            FeeRecipient::Protocol => self.protocol,
            FeeRecipient::Market => self.market,
        }
    }

    pub fn total(&self) -> Quote {
        self.protocol.add(self.market)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollateralLedger {
    balances: HashMap<AccountId, Quote>,
    shortfall: Quote,
    fees: FeeBalances,
    // 13.2: running totals
    pub total_deposited: Quote,
    pub total_withdrawn: Quote,
    pub total_resolved: Quote,
    pub total_fees_claimed: Quote,
}

impl CollateralLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance(&self, account: AccountId) -> Quote {
        self.balances.get(&account).copied().unwrap_or_default()
    }

    pub fn shortfall(&self) -> Quote {
        self.shortfall
    }

    pub fn fees(&self) -> FeeBalances {
        self.fees
    }

    pub fn total_balances(&self) -> Quote {
        self.balances.values().sum()
    }

    pub fn deposit(&mut self, account: AccountId, amount: Quote) {
        let entry = self.balances.entry(account).or_default();
        *entry = entry.add(amount);
        self.total_deposited = self.total_deposited.add(amount);
    }

    /// Move `amount` out of the ledger. Never creates shortfall.
    pub fn withdraw(&mut self, account: AccountId, amount: Quote) -> Result<(), LedgerError> {
        self.debit(account, amount)?;
        self.total_withdrawn = self.total_withdrawn.add(amount);
        Ok(())
    }

    /// Debit `amount` that stays inside the market (trade fees). Never creates shortfall.
    pub fn charge(&mut self, account: AccountId, amount: Quote) -> Result<(), LedgerError> {
        self.debit(account, amount)
    }

    fn debit(&mut self, account: AccountId, amount: Quote) -> Result<(), LedgerError> {
        let available = self.balance(account);
        if amount > available {
            return Err(LedgerError::InsufficientBalance {
                account,
                requested: amount,
                available,
            });
        }
        self.balances.insert(account, available.sub(amount));
        Ok(())
    }

    /// Apply a settlement delta. Returns the shortfall this created, if any.
    pub fn settle_account(&mut self, account: AccountId, delta: Quote) -> Quote {
        let next = self.balance(account).add(delta);
        if next.is_negative() {
            let created = next.negate();
            self.shortfall = self.shortfall.add(created);
            self.balances.insert(account, Quote::zero());
            warn!("account {:?} settled below zero, shortfall +{}", account, created);
            return created;
        }
        self.balances.insert(account, next);
        Quote::zero()
    }

    /// Inject outside funds against recorded shortfall.
    pub fn resolve_shortfall(&mut self, amount: Quote) -> Result<(), LedgerError> {
        if amount > self.shortfall {
            return Err(LedgerError::ResolveExceedsShortfall {
                requested: amount,
                shortfall: self.shortfall,
            });
        }
        self.shortfall = self.shortfall.sub(amount);
        self.total_resolved = self.total_resolved.add(amount);
        Ok(())
    }

    // 13.1: fee balances
    pub fn credit_fees(&mut self, protocol: Quote, market: Quote) {
        self.fees.protocol = self.fees.protocol.add(protocol);
        self.fees.market = self.fees.market.add(market);
    }

    /// Zero out one fee balance and return what it held.
    pub fn claim_fee(&mut self, recipient: FeeRecipient) -> Quote {
        let slot = match recipient {
            FeeRecipient::Protocol => &mut self.fees.protocol,
            FeeRecipient::Market => &mut self.fees.market,
        };
        let amount = std::mem::take(slot);
        self.total_fees_claimed = self.total_fees_claimed.add(amount);
        amount
    }

    /// Value the ledger accounts for, excluding trade fees still in flight.
    /// Equals `total_deposited - total_withdrawn + total_resolved` minus fees
    /// charged but not yet distributed, up to division dust.
    pub fn accounted(&self) -> Quote {
        self.total_balances()
            .add(self.fees.total())
            .add(self.total_fees_claimed)
            .sub(self.shortfall)
    }

    /// Net external inflow.
    pub fn net_inflow(&self) -> Quote {
        self.total_deposited
            .sub(self.total_withdrawn)
            .add(self.total_resolved)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("Insufficient balance for {account:?}: requested {requested}, available {available}")]
    InsufficientBalance {
        account: AccountId,
        requested: Quote,
        available: Quote,
    },

    #[error("Cannot resolve {requested}: shortfall is {shortfall}")]
    ResolveExceedsShortfall { requested: Quote, shortfall: Quote },
}
