//! Liquidation execution.

use super::core::Engine;
use super::results::{EngineError, LiquidationResult};
use crate::custody::Custody;
use crate::events::{EventPayload, LiquidatedEvent};
use crate::guard::LifecycleError;
use crate::liquidation::{closing_delta, is_liquidatable, liquidation_fee};
use crate::margin::maintenance;
use crate::oracle::OracleProvider;
use crate::types::{AccountId, MarketId, Quote};
use log::info;

impl<O, C> Engine<O, C>
where
    O: OracleProvider + Clone,
    C: Custody + Clone,
{
    /// Force-close an account whose collateral is below maintenance.
    ///
    /// Anyone may call this. The account's whole next position is closed at the
    /// current version and `liquidator` is paid `min(balance, maintenance *
    /// liquidation_fee)` out of the account's collateral. The account is
    /// flagged until it settles past the version it was liquidated at.
    pub fn liquidate(
        &mut self,
        market_id: MarketId,
        account: AccountId,
        liquidator: AccountId,
    ) -> Result<LiquidationResult, EngineError> {
        self.atomic(|engine| engine.liquidate_inner(market_id, account, liquidator))
    }

    fn liquidate_inner(
        &mut self,
        market_id: MarketId,
        account: AccountId,
        liquidator: AccountId,
    ) -> Result<LiquidationResult, EngineError> {
        self.settle_inner(market_id, account)?;

        if self.config.protocol.paused {
            return Err(LifecycleError::Paused.into());
        }

        let oracle = self.oracle(market_id)?;
        let version = oracle.current();
        let price = oracle.latest().price;
        let fee_rate = self.config.protocol.liquidation_fee;

        let market = self.market_mut(market_id)?;
        let ratio = market.parameter.maintenance;
        let latest = market.latest_version;
        let balance = market.collateral(account);
        let local = market.account_mut(account);

        if local.is_liquidating() {
            return Err(LifecycleError::Liquidating.into());
        }
        let required = maintenance(&local.position, price, ratio);
        if !is_liquidatable(balance, &local.position, price, ratio) {
            return Err(LifecycleError::NotLiquidatable {
                collateral: balance,
                maintenance: required,
            }
            .into());
        }

        let closed = closing_delta(&local.next());
        if !closed.is_zero() {
            local.pre.push(version, &closed, Quote::zero());
        }
        local.liquidation = Some(latest);
        if !closed.is_zero() {
            market.pre.push(version, &closed, Quote::zero());
        }

        let fee = liquidation_fee(balance, required, fee_rate);
        if !fee.is_zero() {
            market.ledger.withdraw(account, fee)?;
            self.custody.push(liquidator, fee)?;
        }

        info!(
            "liquidated {:?} in market {:?} at {}: maintenance {}, fee {} to {:?}",
            account, market_id, latest, required, fee, liquidator
        );
        self.emit_event(EventPayload::Liquidated(LiquidatedEvent {
            market_id,
            account_id: account,
            liquidator,
            version: latest,
            fee,
        }));

        Ok(LiquidationResult {
            account_id: account,
            market_id,
            liquidator,
            closed,
            maintenance: required,
            fee,
            version: latest,
        })
    }
}
