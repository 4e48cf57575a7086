// 14.0: multi-market vault. pools depositors' collateral and runs it as a maker
// across a weighted basket of markets at a target leverage. requests queue per
// epoch and convert once the epoch's rebalance has settled everywhere.

mod checkpoint;
mod core;
mod rebalance;

pub use self::core::{Holder, Vault};
pub use checkpoint::{assets_for, shares_for, Checkpoint};
pub use rebalance::Target;

use crate::engine::ErrorKind;
use crate::types::Quote;
use rust_decimal::Decimal;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VaultError {
    #[error("Amount must be positive")]
    InvalidAmount,

    #[error("Insufficient shares: requested {requested}, available {available}")]
    InsufficientShares { requested: Decimal, available: Decimal },

    #[error("Deposit of {requested} exceeds limit {available}")]
    DepositLimitExceeded { requested: Quote, available: Quote },
}

impl VaultError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Invariant
    }
}
