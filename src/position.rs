// 4.0: position ledger. sizes per side (maker/long/short), all non-negative.
// the same struct is used for a single account and for the market-wide total.
// 4.1 derived quantities (utilization, socialization). 4.2 deltas and pending positions.

use crate::types::{unsafe_div, Price, Quote, Side, SignedSize, Version};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Position {
    pub maker: Decimal,
    pub long: Decimal,
    pub short: Decimal,
}

impl Position {
    pub fn new(maker: Decimal, long: Decimal, short: Decimal) -> Self {
        Self { maker, long, short }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.maker.is_zero() && self.long.is_zero() && self.short.is_zero()
    }

    pub fn get(&self, side: Side) -> Decimal {
        match side {
            Side::Maker => self.maker,
            Side::Long => self.long,
            Side::Short => self.short,
        }
    }

    // 4.1: derived quantities

    pub fn magnitude(&self) -> Decimal {
        self.maker.max(self.long).max(self.short)
    }

    pub fn major(&self) -> Decimal {
        self.long.max(self.short)
    }

    pub fn minor(&self) -> Decimal {
        self.long.min(self.short)
    }

    pub fn net(&self) -> Decimal {
        (self.long - self.short).abs()
    }

    /// Taker imbalance relative to what backs it. Zero when nothing backs the major side.
    pub fn utilization(&self) -> Decimal {
        unsafe_div(self.major(), self.maker + self.minor())
    }

    /// Share of the major side that makers and the minor side can actually back.
    /// Below one means the major side gets a haircut.
    pub fn socialization_factor(&self) -> Decimal {
        let major = self.major();
        if major.is_zero() {
            return Decimal::ONE;
        }
        ((self.maker + self.minor()) / major).min(Decimal::ONE)
    }

    pub fn is_socialized(&self) -> bool {
        self.socialization_factor() < Decimal::ONE
    }

    // long and short exposure after the socialization haircut
    pub fn socialized_long(&self) -> Decimal {
        self.long.min(self.maker + self.short)
    }

    pub fn socialized_short(&self) -> Decimal {
        self.short.min(self.maker + self.long)
    }

    /// Per-side maximum of two positions.
    pub fn envelope(&self, other: &Position) -> Self {
        Self {
            maker: self.maker.max(other.maker),
            long: self.long.max(other.long),
            short: self.short.max(other.short),
        }
    }

    /// At most one side carries size.
    pub fn is_single_sided(&self) -> bool {
        let open = [self.maker, self.long, self.short]
            .iter()
            .filter(|s| !s.is_zero())
            .count();
        open <= 1
    }

    pub fn notional(&self, price: Price) -> Quote {
        Quote::new(self.magnitude() * price.abs())
    }

    /// Apply a delta, rejecting anything that closes more than is open.
    pub fn apply(&self, delta: &PositionDelta) -> Result<Position, PositionError> {
        let next = self.with_delta(delta);
        for side in Side::ALL {
            if next.get(side) < Decimal::ZERO {
                return Err(PositionError::Overclosed {
                    side,
                    open: self.get(side),
                    closing: -delta.get(side),
                });
            }
        }
        Ok(next)
    }

    // unchecked add. only for deltas that were validated when queued
    pub fn with_delta(&self, delta: &PositionDelta) -> Position {
        Position {
            maker: self.maker + delta.maker,
            long: self.long + delta.long,
            short: self.short + delta.short,
        }
    }

    /// Delta that takes this position to zero.
    pub fn closing_delta(&self) -> PositionDelta {
        PositionDelta {
            maker: -self.maker,
            long: -self.long,
            short: -self.short,
        }
    }
}

// 4.2: signed change per side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PositionDelta {
    pub maker: Decimal,
    pub long: Decimal,
    pub short: Decimal,
}

impl PositionDelta {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn maker(size: Decimal) -> Self {
        Self {
            maker: size,
            ..Self::default()
        }
    }

    pub fn long(size: Decimal) -> Self {
        Self {
            long: size,
            ..Self::default()
        }
    }

    pub fn short(size: Decimal) -> Self {
        Self {
            short: size,
            ..Self::default()
        }
    }

    /// Positive opens long, negative opens short.
    pub fn taker(size: SignedSize) -> Self {
        if size.is_short() {
            Self::short(size.abs())
        } else {
            Self::long(size.abs())
        }
    }

    pub fn get(&self, side: Side) -> Decimal {
        match side {
            Side::Maker => self.maker,
            Side::Long => self.long,
            Side::Short => self.short,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.maker.is_zero() && self.long.is_zero() && self.short.is_zero()
    }

    pub fn add(&self, other: &PositionDelta) -> Self {
        Self {
            maker: self.maker + other.maker,
            long: self.long + other.long,
            short: self.short + other.short,
        }
    }

    pub fn increases_any(&self) -> bool {
        self.maker > Decimal::ZERO || self.long > Decimal::ZERO || self.short > Decimal::ZERO
    }

    pub fn increases_taker(&self) -> bool {
        self.long > Decimal::ZERO || self.short > Decimal::ZERO
    }

    pub fn decreases_maker(&self) -> bool {
        self.maker < Decimal::ZERO
    }

    pub fn maker_volume(&self) -> Decimal {
        self.maker.abs()
    }

    pub fn taker_volume(&self) -> Decimal {
        self.long.abs() + self.short.abs()
    }
}

/// Deltas requested while `latest == version - 1`. They fold into the settled
/// position once `version` is committed. `fee` is the trade fee collected from
/// the requests and is only used on the market-wide instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrePosition {
    pub version: Version,
    pub delta: PositionDelta,
    pub fee: Quote,
}

impl PrePosition {
    pub fn empty(version: Version) -> Self {
        Self {
            version,
            delta: PositionDelta::zero(),
            fee: Quote::zero(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.delta.is_zero() && self.fee.is_zero()
    }

    /// Queue a delta effective at `version`. Callers settle first, so any older
    /// pending entry has already been folded.
    pub fn push(&mut self, version: Version, delta: &PositionDelta, fee: Quote) {
        if self.is_empty() {
            self.version = version;
        }
        self.delta = self.delta.add(delta);
        self.fee = self.fee.add(fee);
    }

    pub fn clear(&mut self) {
        self.delta = PositionDelta::zero();
        self.fee = Quote::zero();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PositionError {
    #[error("Over-closed {side:?}: open {open}, closing {closing}")]
    Overclosed {
        side: Side,
        open: Decimal,
        closing: Decimal,
    },
}
