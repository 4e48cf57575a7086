//! Position and collateral updates.

use super::core::Engine;
use super::results::{EngineError, UpdateResult};
use crate::custody::Custody;
use crate::events::{EventPayload, UpdatedEvent};
use crate::guard::{check_all, GuardContext, UPDATE_GUARDS};
use crate::oracle::OracleProvider;
use crate::position::PositionDelta;
use crate::types::{AccountId, MarketId, Quote};
use log::debug;

impl<O, C> Engine<O, C>
where
    O: OracleProvider + Clone,
    C: Custody + Clone,
{
    /// Change an account's position and/or collateral.
    ///
    /// The account is settled first. The size delta is queued for the oracle's
    /// current version and folds in when that version settles; the collateral
    /// delta and the trade fee hit the ledger immediately. A positive
    /// `collateral_delta` is pulled from the account's wallet, a negative one is
    /// pushed back to it.
    pub fn update(
        &mut self,
        market_id: MarketId,
        account: AccountId,
        delta: PositionDelta,
        collateral_delta: Quote,
    ) -> Result<UpdateResult, EngineError> {
        self.atomic(|engine| engine.update_inner(market_id, account, delta, collateral_delta))
    }

    /// Deposit-only shorthand.
    pub fn deposit(&mut self, market_id: MarketId, account: AccountId, amount: Quote) -> Result<UpdateResult, EngineError> {
        self.update(market_id, account, PositionDelta::zero(), amount)
    }

    /// Withdraw-only shorthand.
    pub fn withdraw(&mut self, market_id: MarketId, account: AccountId, amount: Quote) -> Result<UpdateResult, EngineError> {
        self.update(market_id, account, PositionDelta::zero(), amount.negate())
    }

    pub(crate) fn update_inner(
        &mut self,
        market_id: MarketId,
        account: AccountId,
        delta: PositionDelta,
        collateral_delta: Quote,
    ) -> Result<UpdateResult, EngineError> {
        self.settle_inner(market_id, account)?;

        let oracle = self.oracle(market_id)?;
        let version = oracle.current();
        let price = oracle.latest().price;

        // project the post-request state and run every guard against it
        let market = self.market(market_id)?;
        let local = market.account(account);
        let next = local.next().apply(&delta)?;
        let global_next = market.next_position().with_delta(&delta);
        let fee = market.parameter.trade_fee(&delta, price);
        let collateral = market.collateral(account).add(collateral_delta).sub(fee);

        let ctx = GuardContext {
            protocol: &self.config.protocol,
            market: &market.parameter,
            price,
            delta,
            collateral_delta,
            liquidating: local.is_liquidating(),
            current: local.position,
            next,
            global_next,
            collateral,
        };
        check_all(UPDATE_GUARDS, &ctx)?;

        if collateral_delta.is_positive() {
            self.custody.pull(account, collateral_delta)?;
        }

        let market = self.market_mut(market_id)?;
        if collateral_delta.is_positive() {
            market.ledger.deposit(account, collateral_delta);
        } else if collateral_delta.is_negative() {
            market.ledger.withdraw(account, collateral_delta.negate())?;
        }
        if !fee.is_zero() {
            market.ledger.charge(account, fee)?;
        }
        if !delta.is_zero() {
            market.account_mut(account).pre.push(version, &delta, Quote::zero());
            market.pre.push(version, &delta, fee);
        }
        let collateral = market.collateral(account);

        if collateral_delta.is_negative() {
            self.custody.push(account, collateral_delta.negate())?;
        }

        debug!(
            "update {:?}/{:?} at {}: delta {:?}, collateral {}, fee {}",
            market_id, account, version, delta, collateral_delta, fee
        );
        self.emit_event(EventPayload::Updated(UpdatedEvent {
            market_id,
            account_id: account,
            version,
            delta,
            collateral_delta,
            fee,
        }));

        Ok(UpdateResult {
            market_id,
            account_id: account,
            version,
            delta,
            collateral_delta,
            fee,
            collateral,
        })
    }
}
