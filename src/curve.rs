// 3.0: funding rate curve. utilization in, annualized rate out.
// 3.1 is the piecewise linear "jump rate" shape: gentle slope up to the target,
// steep slope from the target to full utilization, flat after that.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

pub const SECONDS_PER_YEAR: Decimal = dec!(31_536_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JumpRateUtilizationCurve {
    pub minimum_rate: Decimal,
    pub maximum_rate: Decimal,
    pub target_rate: Decimal,
    pub target_utilization: Decimal,
}

impl Default for JumpRateUtilizationCurve {
    fn default() -> Self {
        Self {
            minimum_rate: Decimal::ZERO,
            maximum_rate: dec!(1.0),
            target_rate: dec!(0.2),
            target_utilization: dec!(0.8),
        }
    }
}

impl JumpRateUtilizationCurve {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_utilization <= Decimal::ZERO || self.target_utilization >= Decimal::ONE {
            return Err(ConfigError::InvalidCurve {
                reason: "target utilization must be in (0, 1)".to_string(),
            });
        }
        Ok(())
    }

    /// Annualized rate at `utilization`. Utilization at or above 1 pays the maximum.
    pub fn compute(&self, utilization: Decimal) -> Decimal {
        if utilization < self.target_utilization {
            return linear(
                Decimal::ZERO,
                self.minimum_rate,
                self.target_utilization,
                self.target_rate,
                utilization,
            );
        }
        if utilization < Decimal::ONE {
            return linear(
                self.target_utilization,
                self.target_rate,
                Decimal::ONE,
                self.maximum_rate,
                utilization,
            );
        }
        self.maximum_rate
    }
}

// line through (x0, y0) and (x1, y1), evaluated at x
fn linear(x0: Decimal, y0: Decimal, x1: Decimal, y1: Decimal, x: Decimal) -> Decimal {
    let span = x1 - x0;
    if span.is_zero() {
        return y0;
    }
    y0 + (y1 - y0) * (x - x0) / span
}

// 3.2: annual rate -> rate accrued over `elapsed_seconds`
pub fn period_rate(annual_rate: Decimal, elapsed_seconds: Decimal) -> Decimal {
    annual_rate * elapsed_seconds / SECONDS_PER_YEAR
}
