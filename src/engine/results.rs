// 8.0.2: result types and errors for engine operations.

use crate::collateral::LedgerError;
use crate::config::ConfigError;
use crate::custody::CustodyError;
use crate::guard::{GuardError, InvariantViolation, LifecycleError};
use crate::oracle::OracleError;
use crate::position::{PositionDelta, PositionError};
use crate::settlement::{AccountSettlement, GlobalSettlement};
use crate::types::{AccountId, MarketId, Quote, Version};
use crate::vault::VaultError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettleResult {
    pub market: GlobalSettlement,
    pub account: AccountSettlement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateResult {
    pub market_id: MarketId,
    pub account_id: AccountId,
    // version the delta becomes effective at
    pub version: Version,
    pub delta: PositionDelta,
    pub collateral_delta: Quote,
    pub fee: Quote,
    pub collateral: Quote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiquidationResult {
    pub account_id: AccountId,
    pub market_id: MarketId,
    pub liquidator: AccountId,
    pub closed: PositionDelta,
    pub maintenance: Quote,
    pub fee: Quote,
    pub version: Version,
}

/// Coarse error class, for callers that only care whether to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Invariant,
    Lifecycle,
    Upstream,
    Ledger,
    Custody,
    Config,
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("Market {0:?} not found")]
    MarketNotFound(MarketId),

    #[error("Market {0:?} already exists")]
    MarketExists(MarketId),

    #[error("Invariant violation: {0}")]
    Invariant(#[from] InvariantViolation),

    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("Position error: {0}")]
    Position(#[from] PositionError),

    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Custody error: {0}")]
    Custody(#[from] CustodyError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Vault error: {0}")]
    Vault(#[from] VaultError),
}

impl From<GuardError> for EngineError {
    fn from(err: GuardError) -> Self {
        match err {
            GuardError::Invariant(e) => EngineError::Invariant(e),
            GuardError::Lifecycle(e) => EngineError::Lifecycle(e),
        }
    }
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::MarketNotFound(_) => ErrorKind::NotFound,
            EngineError::MarketExists(_) | EngineError::Config(_) => ErrorKind::Config,
            EngineError::Invariant(_) | EngineError::Position(_) => ErrorKind::Invariant,
            EngineError::Lifecycle(_) => ErrorKind::Lifecycle,
            EngineError::Oracle(_) => ErrorKind::Upstream,
            EngineError::Ledger(_) => ErrorKind::Ledger,
            EngineError::Custody(_) => ErrorKind::Custody,
            EngineError::Vault(e) => e.kind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn guard_errors_map_to_kinds() {
        let e: EngineError = GuardError::from(InvariantViolation::DoubleSided).into();
        assert_eq!(e.kind(), ErrorKind::Invariant);

        let e: EngineError = GuardError::from(LifecycleError::Paused).into();
        assert_eq!(e.kind(), ErrorKind::Lifecycle);
    }

    #[test]
    fn upstream_and_ledger_kinds() {
        let e = EngineError::from(OracleError::NotCommitted(Version(3)));
        assert_eq!(e.kind(), ErrorKind::Upstream);

        let e = EngineError::from(LedgerError::ResolveExceedsShortfall {
            requested: Quote::new(dec!(2)),
            shortfall: Quote::new(dec!(1)),
        });
        assert_eq!(e.kind(), ErrorKind::Ledger);
        assert!(e.to_string().contains("shortfall"));
    }

    #[test]
    fn not_found_kind() {
        assert_eq!(EngineError::MarketNotFound(MarketId(9)).kind(), ErrorKind::NotFound);
    }
}
