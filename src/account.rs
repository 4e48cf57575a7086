//! Per-account market state.
//!
//! An account's settled position is only valid as of `latest_version`. Anything
//! requested since then waits in `pre` until its version is committed. Collateral
//! is not stored here; it lives in the market's collateral ledger.

use crate::position::{Position, PrePosition};
use crate::types::{AccountId, Version};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub latest_version: Version,
    pub position: Position,
    pub pre: PrePosition,
    // unclaimed reward units
    pub reward: Decimal,
    // version the account was last liquidated at
    pub liquidation: Option<Version>,
}

impl Account {
    /// Fresh, zeroed account that starts settling from `version`.
    pub fn new(id: AccountId, version: Version) -> Self {
        Self {
            id,
            latest_version: version,
            position: Position::zero(),
            pre: PrePosition::empty(version),
            reward: Decimal::ZERO,
            liquidation: None,
        }
    }

    /// Position once everything pending has been folded.
    pub fn next(&self) -> Position {
        self.position.with_delta(&self.pre.delta)
    }

    /// True until the account settles past the version it was liquidated at.
    pub fn is_liquidating(&self) -> bool {
        matches!(self.liquidation, Some(v) if self.latest_version <= v)
    }

    pub fn is_empty(&self) -> bool {
        self.position.is_empty() && self.pre.is_empty()
    }

    pub fn take_reward(&mut self) -> Decimal {
        std::mem::take(&mut self.reward)
    }
}
