// 9.3 custody.rs: MOCKED token movement. the engine pulls collateral into its pool
// and pushes it back out; nothing here knows about positions.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::{AccountId, Quote};

/// Token custody as seen by the engine. Transfers are atomic and never call back in.
pub trait Custody {
    /// Move `amount` from `from`'s wallet into the engine pool.
    fn pull(&mut self, from: AccountId, amount: Quote) -> Result<(), CustodyError>;

    /// Move `amount` from the engine pool to `to`'s wallet.
    fn push(&mut self, to: AccountId, amount: Quote) -> Result<(), CustodyError>;

    /// Engine pool balance.
    fn balance(&self) -> Quote;

    /// Wallet balance held outside the engine.
    fn balance_of(&self, holder: AccountId) -> Quote;
}

/// Pool plus per-holder wallets, all in memory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemoryCustody {
    pool: Quote,
    wallets: HashMap<AccountId, Quote>,
}

impl InMemoryCustody {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint into a wallet. Test and simulation helper.
    pub fn fund(&mut self, holder: AccountId, amount: Quote) {
        let wallet = self.wallets.entry(holder).or_default();
        *wallet = wallet.add(amount);
    }

    /// Everything in existence: pool plus every wallet.
    pub fn total_supply(&self) -> Quote {
        self.pool.add(self.wallets.values().sum())
    }
}

fn check_amount(amount: Quote) -> Result<(), CustodyError> {
    if amount.is_negative() {
        return Err(CustodyError::NegativeAmount(amount));
    }
    Ok(())
}

impl Custody for InMemoryCustody {
    fn pull(&mut self, from: AccountId, amount: Quote) -> Result<(), CustodyError> {
        check_amount(amount)?;
        let available = self.balance_of(from);
        if amount > available {
            return Err(CustodyError::InsufficientFunds {
                holder: from,
                requested: amount,
                available,
            });
        }
        self.wallets.insert(from, available.sub(amount));
        self.pool = self.pool.add(amount);
        Ok(())
    }

    fn push(&mut self, to: AccountId, amount: Quote) -> Result<(), CustodyError> {
        check_amount(amount)?;
        if amount > self.pool {
            return Err(CustodyError::InsufficientPool {
                requested: amount,
                available: self.pool,
            });
        }
        self.pool = self.pool.sub(amount);
        self.fund(to, amount);
        Ok(())
    }

    fn balance(&self) -> Quote {
        self.pool
    }

    fn balance_of(&self, holder: AccountId) -> Quote {
        self.wallets.get(&holder).copied().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CustodyError {
    #[error("Insufficient funds for {holder:?}: requested {requested}, available {available}")]
    InsufficientFunds {
        holder: AccountId,
        requested: Quote,
        available: Quote,
    },

    #[error("Insufficient pool balance: requested {requested}, available {available}")]
    InsufficientPool { requested: Quote, available: Quote },

    #[error("Negative transfer amount {0}")]
    NegativeAmount(Quote),
}
