// 6.0: invariant guard. an ordered list of checks run against the projected state
// of an update before anything is mutated. first failure aborts the update.
// 6.1 the context. 6.2 the guards. 6.3 error types.

use rust_decimal::Decimal;

use crate::config::{MarketParameter, ProtocolParameter};
use crate::margin::maintenance;
use crate::position::{Position, PositionDelta};
use crate::types::{Price, Quote};

/// 6.1: everything a guard may look at. all positions are post-request.
#[derive(Debug, Clone)]
pub struct GuardContext<'a> {
    pub protocol: &'a ProtocolParameter,
    pub market: &'a MarketParameter,
    pub price: Price,
    pub delta: PositionDelta,
    pub collateral_delta: Quote,
    pub liquidating: bool,
    // settled account position
    pub current: Position,
    // account position once pending requests (including this one) fold
    pub next: Position,
    // market-wide position once pending requests fold
    pub global_next: Position,
    // account collateral after the collateral delta and trade fee
    pub collateral: Quote,
}

pub type Guard = fn(&GuardContext) -> Result<(), GuardError>;

/// 6.2: run in this order.
pub const UPDATE_GUARDS: &[Guard] = &[
    protocol_not_paused,
    market_open_for_increase,
    account_not_liquidating,
    single_sided,
    maker_limit,
    socialization,
    margin,
    min_collateral,
];

pub fn check_all(guards: &[Guard], ctx: &GuardContext) -> Result<(), GuardError> {
    guards.iter().try_for_each(|guard| guard(ctx))
}

pub fn protocol_not_paused(ctx: &GuardContext) -> Result<(), GuardError> {
    if ctx.protocol.paused {
        return Err(LifecycleError::Paused.into());
    }
    Ok(())
}

// close-only: existing exposure may shrink, nothing may grow
pub fn market_open_for_increase(ctx: &GuardContext) -> Result<(), GuardError> {
    if ctx.market.closed && ctx.delta.increases_any() {
        return Err(LifecycleError::MarketClosed.into());
    }
    Ok(())
}

pub fn account_not_liquidating(ctx: &GuardContext) -> Result<(), GuardError> {
    let touches_position = !ctx.delta.is_zero();
    let withdraws = ctx.collateral_delta.is_negative();
    if ctx.liquidating && (touches_position || withdraws) {
        return Err(LifecycleError::Liquidating.into());
    }
    Ok(())
}

// settled and pending exposure together; a flip must close and settle first
pub fn single_sided(ctx: &GuardContext) -> Result<(), GuardError> {
    if !ctx.current.envelope(&ctx.next).is_single_sided() {
        return Err(InvariantViolation::DoubleSided.into());
    }
    Ok(())
}

// over the limit, only decreases go through
pub fn maker_limit(ctx: &GuardContext) -> Result<(), GuardError> {
    let limit = ctx.market.maker_limit;
    if ctx.delta.increases_any() && ctx.global_next.maker > limit {
        return Err(InvariantViolation::MakerLimitExceeded {
            limit,
            requested: ctx.global_next.maker,
        }
        .into());
    }
    Ok(())
}

pub fn socialization(ctx: &GuardContext) -> Result<(), GuardError> {
    if ctx.market.closed {
        return Ok(());
    }
    let adds_risk = ctx.delta.increases_taker() || ctx.delta.decreases_maker();
    let factor = ctx.global_next.socialization_factor();
    if adds_risk && factor < Decimal::ONE {
        return Err(InvariantViolation::InsufficientLiquidity { factor }.into());
    }
    Ok(())
}

// pure deposits can only improve margin
pub fn margin(ctx: &GuardContext) -> Result<(), GuardError> {
    if ctx.delta.is_zero() && !ctx.collateral_delta.is_negative() {
        return Ok(());
    }
    let ratio = ctx.market.maintenance;
    let required = maintenance(&ctx.current, ctx.price, ratio)
        .max(maintenance(&ctx.next, ctx.price, ratio));
    if ctx.collateral < required {
        return Err(InvariantViolation::InsufficientCollateral {
            required,
            available: ctx.collateral,
        }
        .into());
    }
    Ok(())
}

pub fn min_collateral(ctx: &GuardContext) -> Result<(), GuardError> {
    if ctx.collateral_delta.is_zero() {
        return Ok(());
    }
    let minimum = ctx.protocol.min_collateral;
    if !ctx.collateral.is_zero() && ctx.collateral < minimum {
        return Err(InvariantViolation::CollateralBelowMinimum {
            minimum,
            collateral: ctx.collateral,
        }
        .into());
    }
    Ok(())
}

// 6.3: error types

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    #[error("Insufficient collateral: required {required}, available {available}")]
    InsufficientCollateral { required: Quote, available: Quote },

    #[error("Maker limit {limit} exceeded: {requested}")]
    MakerLimitExceeded { limit: Decimal, requested: Decimal },

    #[error("Insufficient liquidity: socialization factor {factor}")]
    InsufficientLiquidity { factor: Decimal },

    #[error("Account would hold more than one side")]
    DoubleSided,

    #[error("Collateral {collateral} below minimum {minimum}")]
    CollateralBelowMinimum { minimum: Quote, collateral: Quote },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error("Protocol is paused")]
    Paused,

    #[error("Market is closed")]
    MarketClosed,

    #[error("Account is being liquidated")]
    Liquidating,

    #[error("Account cannot be liquidated: collateral {collateral}, maintenance {maintenance}")]
    NotLiquidatable { collateral: Quote, maintenance: Quote },

    #[error("Vault is unhealthy")]
    VaultUnhealthy,

    #[error("Operation already in flight")]
    Reentrant,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GuardError {
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}
