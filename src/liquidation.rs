//! Liquidation math.
//!
//! An account whose collateral falls below maintenance can be force-closed by
//! anyone. The whole next position is closed at the next version and the
//! caller is paid a fee out of the account's collateral, capped at whatever
//! collateral is left.

use crate::margin::maintenance;
use crate::position::{Position, PositionDelta};
use crate::types::{Price, Quote};
use rust_decimal::Decimal;

/// `collateral < maintenance`, and only for accounts that hold something.
pub fn is_liquidatable(collateral: Quote, position: &Position, price: Price, ratio: Decimal) -> bool {
    let requirement = maintenance(position, price, ratio);
    !requirement.is_zero() && collateral < requirement
}

/// Fee paid to the liquidator: `min(balance, maintenance * fee_rate)`.
pub fn liquidation_fee(balance: Quote, maintenance: Quote, fee_rate: Decimal) -> Quote {
    balance.min(maintenance.mul(fee_rate)).max(Quote::zero())
}

/// Delta that closes everything the account will hold once pending requests fold.
pub fn closing_delta(next: &Position) -> PositionDelta {
    next.closing_delta()
}
