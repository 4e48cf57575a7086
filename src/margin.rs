//! Maintenance requirements.
//!
//! Maintenance is the collateral an account must keep to avoid liquidation:
//! the largest side of its position, times the absolute oracle price, times
//! the market's maintenance ratio. An account is checked against both its
//! settled position and the position it will hold once pending requests fold.

use crate::position::Position;
use crate::types::{Price, Quote};
use rust_decimal::Decimal;

pub fn maintenance(position: &Position, price: Price, ratio: Decimal) -> Quote {
    Quote::new(position.magnitude() * price.abs() * ratio)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarginStatus {
    Healthy,
    Liquidatable,
}

pub fn evaluate_margin_status(collateral: Quote, requirement: Quote) -> MarginStatus {
    if collateral >= requirement {
        MarginStatus::Healthy
    } else {
        MarginStatus::Liquidatable
    }
}

/// Collateral per unit of notional. `Decimal::MAX` when flat.
pub fn margin_ratio(collateral: Quote, notional: Quote) -> Decimal {
    if notional.value().is_zero() {
        return Decimal::MAX;
    }
    collateral.value() / notional.value()
}
