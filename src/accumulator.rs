//! Per-unit value and reward accumulators.
//!
//! Each market keeps, for every committed oracle version, the cumulative value
//! earned by one unit of maker, long and short exposure since the market was
//! created. An account's pnl between two versions is its size times the
//! difference of the two snapshots, so accounts can settle lazily against
//! snapshots the market recorded earlier.
//!
//! # Invariants
//! - snapshot versions are strictly increasing
//! - pnl is zero-sum across sides; funding and trade fees are conserved
//!   between sides and the extracted fee

use log::warn;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::MarketParameter;
use crate::curve::period_rate;
use crate::oracle::OracleVersion;
use crate::position::Position;
use crate::types::{unsafe_div, Quote, Side, Version};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Accumulator {
    pub maker_value: Decimal,
    pub long_value: Decimal,
    pub short_value: Decimal,
    pub maker_reward: Decimal,
    pub long_reward: Decimal,
    pub short_reward: Decimal,
}

impl Accumulator {
    pub fn value(&self, side: Side) -> Decimal {
        match side {
            Side::Maker => self.maker_value,
            Side::Long => self.long_value,
            Side::Short => self.short_value,
        }
    }

    pub fn add(&self, other: &Accumulator) -> Self {
        Self {
            maker_value: self.maker_value + other.maker_value,
            long_value: self.long_value + other.long_value,
            short_value: self.short_value + other.short_value,
            maker_reward: self.maker_reward + other.maker_reward,
            long_reward: self.long_reward + other.long_reward,
            short_reward: self.short_reward + other.short_reward,
        }
    }

    pub fn sub(&self, other: &Accumulator) -> Self {
        Self {
            maker_value: self.maker_value - other.maker_value,
            long_value: self.long_value - other.long_value,
            short_value: self.short_value - other.short_value,
            maker_reward: self.maker_reward - other.maker_reward,
            long_reward: self.long_reward - other.long_reward,
            short_reward: self.short_reward - other.short_reward,
        }
    }

    /// Collateral change for `position` if this is a per-unit delta.
    pub fn value_of(&self, position: &Position) -> Quote {
        Quote::new(
            position.maker * self.maker_value
                + position.long * self.long_value
                + position.short * self.short_value,
        )
    }

    pub fn reward_of(&self, position: &Position) -> Decimal {
        position.maker * self.maker_reward
            + position.long * self.long_reward
            + position.short * self.short_reward
    }
}

/// Output of one accumulation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AccumulationResult {
    /// Per-unit change to add onto the running accumulator.
    pub delta: Accumulator,
    /// Gross funding paid by the major side.
    pub funding: Quote,
    /// Part of the funding kept as fee.
    pub funding_fee: Quote,
    /// Part of the pending trade fee not paid to makers.
    pub trade_fee: Quote,
}

impl AccumulationResult {
    pub fn fee(&self) -> Quote {
        self.funding_fee.add(self.trade_fee)
    }
}

/// Accrue everything `position` earns over `[from, to]`.
///
/// `pending_fee` is the trade fee collected for the deltas that become
/// effective at `to`; its `position_fee` share is paid to the makers that were
/// open during the interval.
pub fn accumulate(
    position: &Position,
    from: &OracleVersion,
    to: &OracleVersion,
    parameter: &MarketParameter,
    pending_fee: Quote,
) -> AccumulationResult {
    let mut result = AccumulationResult::default();

    accumulate_position_fee(&mut result, position, parameter, pending_fee);

    // close-only markets freeze pnl, funding and rewards
    if parameter.closed {
        return result;
    }

    let elapsed = from.timestamp.elapsed_seconds(&to.timestamp);
    accumulate_pnl(&mut result, position, from, to);
    accumulate_funding(&mut result, position, from, parameter, elapsed);
    accumulate_rewards(&mut result, position, parameter, elapsed);
    result
}

fn accumulate_position_fee(
    result: &mut AccumulationResult,
    position: &Position,
    parameter: &MarketParameter,
    pending_fee: Quote,
) {
    if pending_fee.is_zero() {
        return;
    }
    if position.maker.is_zero() {
        result.trade_fee = pending_fee;
        return;
    }
    let maker_share = pending_fee.mul(parameter.position_fee);
    result.delta.maker_value += unsafe_div(maker_share.value(), position.maker);
    result.trade_fee = pending_fee.sub(maker_share);
}

// long and short pnl are capped at the socialized size; makers take the other side of both
fn accumulate_pnl(result: &mut AccumulationResult, position: &Position, from: &OracleVersion, to: &OracleVersion) {
    let price_delta = to.price.value() - from.price.value();
    if price_delta.is_zero() {
        return;
    }

    let long_pnl = price_delta * position.socialized_long();
    let short_pnl = -price_delta * position.socialized_short();
    let maker_pnl = -(long_pnl + short_pnl);

    result.delta.long_value += unsafe_div(long_pnl, position.long);
    result.delta.short_value += unsafe_div(short_pnl, position.short);
    result.delta.maker_value += unsafe_div(maker_pnl, position.maker);
}

fn accumulate_funding(
    result: &mut AccumulationResult,
    position: &Position,
    from: &OracleVersion,
    parameter: &MarketParameter,
    elapsed: Decimal,
) {
    let major = position.major();
    let minor = position.minor();
    let receivers = position.maker + minor;
    if elapsed.is_zero() || position.long == position.short || receivers.is_zero() {
        return;
    }

    let rate = parameter.utilization_curve.compute(position.utilization());
    let amount = period_rate(rate, elapsed) * major * from.price.abs();
    if amount.is_zero() {
        return;
    }
    let fee = amount * parameter.funding_fee;
    let paid_per_unit = unsafe_div(amount, major);
    let received_per_unit = unsafe_div(amount - fee, receivers);

    result.delta.maker_value += received_per_unit;
    if position.long > position.short {
        result.delta.long_value -= paid_per_unit;
        result.delta.short_value += received_per_unit;
    } else {
        result.delta.short_value -= paid_per_unit;
        result.delta.long_value += received_per_unit;
    }

    result.funding = Quote::new(amount);
    result.funding_fee = Quote::new(fee);
}

fn accumulate_rewards(result: &mut AccumulationResult, position: &Position, parameter: &MarketParameter, elapsed: Decimal) {
    let rate = &parameter.reward_rate;
    result.delta.maker_reward += unsafe_div(rate.maker * elapsed, position.maker);
    result.delta.long_reward += unsafe_div(rate.long * elapsed, position.long);
    result.delta.short_reward += unsafe_div(rate.short * elapsed, position.short);
}

/// Snapshot table: an arena of accumulators plus a version -> slot index.
/// Only ever appended to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionedAccumulator {
    arena: Vec<Accumulator>,
    index: BTreeMap<Version, usize>,
}

impl VersionedAccumulator {
    pub fn new(genesis: Version) -> Self {
        let mut index = BTreeMap::new();
        index.insert(genesis, 0);
        Self {
            arena: vec![Accumulator::default()],
            index,
        }
    }

    pub fn latest_version(&self) -> Option<Version> {
        self.index.keys().next_back().copied()
    }

    pub fn latest(&self) -> Accumulator {
        self.index
            .values()
            .next_back()
            .and_then(|slot| self.arena.get(*slot))
            .copied()
            .unwrap_or_default()
    }

    pub fn at(&self, version: Version) -> Option<&Accumulator> {
        self.index.get(&version).and_then(|slot| self.arena.get(*slot))
    }

    /// Append a snapshot. Writes at or below the latest version are dropped.
    pub fn record(&mut self, version: Version, accumulator: Accumulator) -> bool {
        if let Some(latest) = self.latest_version() {
            if version <= latest {
                warn!("dropping out of order accumulator snapshot {} (latest {})", version, latest);
                return false;
            }
        }
        self.arena.push(accumulator);
        self.index.insert(version, self.arena.len() - 1);
        true
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }
}
