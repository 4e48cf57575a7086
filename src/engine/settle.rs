//! Settlement entry points.

use super::core::Engine;
use super::results::{EngineError, SettleResult};
use crate::custody::Custody;
use crate::events::{EventPayload, SettledEvent, ShortfallEvent};
use crate::oracle::OracleProvider;
use crate::settlement::{settle_account, settle_market, AccountSettlement, GlobalSettlement};
use crate::types::{AccountId, MarketId};
use log::info;

impl<O, C> Engine<O, C>
where
    O: OracleProvider + Clone,
    C: Custody + Clone,
{
    /// Settle the market, then `account`, up to the oracle's latest version.
    pub fn settle(&mut self, market_id: MarketId, account: AccountId) -> Result<SettleResult, EngineError> {
        self.atomic(|engine| {
            let result = engine.settle_inner(market_id, account)?;
            let collateral = engine.market(market_id)?.collateral(account);
            engine.emit_event(EventPayload::Settled(SettledEvent {
                market_id,
                account_id: account,
                version: result.account.to,
                value: result.account.value,
                collateral,
            }));
            Ok(result)
        })
    }

    /// Settle only the market-wide position.
    pub fn settle_market(&mut self, market_id: MarketId) -> Result<GlobalSettlement, EngineError> {
        self.atomic(|engine| engine.settle_market_inner(market_id))
    }

    /// Settle the market and every account that has touched it.
    pub fn settle_all(&mut self, market_id: MarketId) -> Result<Vec<AccountSettlement>, EngineError> {
        self.atomic(|engine| {
            engine.settle_market_inner(market_id)?;
            let mut ids: Vec<AccountId> = engine.market(market_id)?.accounts.keys().copied().collect();
            ids.sort();
            let mut results = Vec::with_capacity(ids.len());
            for id in ids {
                results.push(engine.settle_inner(market_id, id)?.account);
            }
            Ok(results)
        })
    }

    pub(crate) fn settle_market_inner(&mut self, market_id: MarketId) -> Result<GlobalSettlement, EngineError> {
        let oracle = self
            .oracles
            .get_mut(&market_id)
            .ok_or(EngineError::MarketNotFound(market_id))?;
        let (latest, _) = oracle.sync();
        let market = self
            .markets
            .get_mut(&market_id)
            .ok_or(EngineError::MarketNotFound(market_id))?;

        let result = settle_market(market, &*oracle, &self.config.protocol)?;

        if latest.timestamp > self.current_time {
            self.current_time = latest.timestamp;
        }
        if !result.is_noop() {
            info!(
                "market {:?} settled to {} (fees: protocol {}, market {})",
                market_id, result.to, result.protocol_fee, result.market_fee
            );
        }
        Ok(result)
    }

    pub(crate) fn settle_inner(&mut self, market_id: MarketId, account: AccountId) -> Result<SettleResult, EngineError> {
        let global = self.settle_market_inner(market_id)?;
        let market = self.market_mut(market_id)?;
        let local = settle_account(market, account);
        let shortfall = market.ledger.shortfall();

        if !local.shortfall.is_zero() {
            self.emit_event(EventPayload::ShortfallCreated(ShortfallEvent {
                market_id,
                amount: local.shortfall,
                shortfall,
            }));
        }
        Ok(SettleResult {
            market: global,
            account: local,
        })
    }
}
