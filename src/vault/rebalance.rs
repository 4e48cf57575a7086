// 14.3: rebalancing. split the vault's assets across member markets by weight
// and size the maker position to hit the target leverage. withdrawals run
// before deposits so freed collateral can fund the markets that need more.

use log::warn;
use rust_decimal::Decimal;

use super::checkpoint::assets_for;
use super::core::Vault;
use crate::custody::Custody;
use crate::engine::{Engine, EngineError};
use crate::events::{EventPayload, RebalanceSkippedEvent};
use crate::oracle::OracleProvider;
use crate::position::{Position, PositionDelta};
use crate::types::{MarketId, Price, Quote};

/// Where the vault wants to be in one market.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub market: MarketId,
    pub collateral: Quote,
    pub maker: Decimal,
}

// what the target math needs to know about one member market
#[derive(Debug, Clone, Copy)]
pub(super) struct MarketView {
    pub market: MarketId,
    pub weight: u32,
    pub price: Price,
    // the vault's maker once pending requests fold
    pub maker: Decimal,
    pub global_next: Position,
    pub maker_limit: Decimal,
    pub closed: bool,
}

#[derive(Debug, Clone, Copy)]
pub(super) struct Allocation {
    // assets the vault controls, less what is owed to redeemers
    pub available: Quote,
    // assets backing shares that stay in the vault
    pub position_assets: Quote,
    pub total_weight: u32,
    pub leverage: Decimal,
    pub min_collateral: Quote,
}

pub(super) fn target_for(view: &MarketView, allocation: &Allocation) -> Target {
    let share = Decimal::from(view.weight) / Decimal::from(allocation.total_weight);
    let mut collateral = allocation.available.mul(share).max(Quote::zero());
    let mut maker = if view.price.is_zero() {
        Decimal::ZERO
    } else {
        allocation.position_assets.max(Quote::zero()).value() * share * allocation.leverage / view.price.abs()
    };

    if collateral < allocation.min_collateral {
        collateral = Quote::zero();
        maker = Decimal::ZERO;
    }

    // other makers' size; the vault may not pull liquidity below what takers need
    let others = view.global_next.maker - view.maker;
    let floor = (view.global_next.net() - others).max(Decimal::ZERO);
    let headroom = (view.maker_limit - others).max(Decimal::ZERO);
    maker = maker.max(floor).min(headroom);

    if view.closed {
        maker = maker.min(view.maker);
    }

    Target {
        market: view.market,
        collateral,
        maker,
    }
}

impl Vault {
    /// Current targets for every member market.
    pub fn targets<O, C>(&self, engine: &Engine<O, C>) -> Result<Vec<Target>, EngineError>
    where
        O: OracleProvider + Clone,
        C: Custody + Clone,
    {
        let available = self.total_assets(engine)?.max(Quote::zero());
        let (shares, assets) = self.share_price(engine)?;
        let redeeming = assets_for(self.pending.redemption, shares, assets);
        let allocation = Allocation {
            available,
            position_assets: available.sub(redeeming).max(Quote::zero()),
            total_weight: self.parameter.total_weight(),
            leverage: self.parameter.target_leverage,
            min_collateral: engine.protocol().min_collateral,
        };

        let mut targets = Vec::with_capacity(self.parameter.markets.len());
        for member in &self.parameter.markets {
            let state = engine.market(member.market)?;
            let view = MarketView {
                market: member.market,
                weight: member.weight,
                price: engine.latest_price(member.market)?,
                maker: engine.next_position(member.market, self.id)?.maker,
                global_next: state.next_position(),
                maker_limit: state.parameter.maker_limit,
                closed: state.parameter.closed,
            };
            targets.push(target_for(&view, &allocation));
        }
        Ok(targets)
    }

    pub(super) fn rebalance<O, C>(&mut self, engine: &mut Engine<O, C>) -> Result<(), EngineError>
    where
        O: OracleProvider + Clone,
        C: Custody + Clone,
    {
        let mut legs = Vec::new();
        for target in self.targets(engine)? {
            let maker = target.maker - engine.next_position(target.market, self.id)?.maker;
            let collateral = target.collateral.sub(engine.collateral(target.market, self.id)?);
            legs.push((target.market, maker, collateral));
        }

        for &(market, maker, collateral) in legs.iter().filter(|leg| leg.2.is_negative()) {
            self.apply_leg(engine, market, maker, collateral);
        }
        for &(market, maker, collateral) in legs.iter().filter(|leg| !leg.2.is_negative()) {
            // never spend what is set aside for redeemers
            let idle = engine
                .custody()
                .balance_of(self.id)
                .sub(self.total_unclaimed)
                .max(Quote::zero());
            self.apply_leg(engine, market, maker, collateral.min(idle));
        }
        Ok(())
    }

    // each leg is its own engine update; a failed one is logged and left for next time
    fn apply_leg<O, C>(&self, engine: &mut Engine<O, C>, market: MarketId, maker: Decimal, collateral: Quote)
    where
        O: OracleProvider + Clone,
        C: Custody + Clone,
    {
        if maker.is_zero() && collateral.is_zero() {
            return;
        }
        if let Err(err) = engine.update(market, self.id, PositionDelta::maker(maker), collateral) {
            warn!("vault {:?} rebalance in {:?} skipped: {}", self.id, market, err);
            engine.emit_event(EventPayload::RebalanceLegSkipped(RebalanceSkippedEvent {
                vault: self.id,
                market_id: market,
                reason: err.to_string(),
            }));
        }
    }
}
