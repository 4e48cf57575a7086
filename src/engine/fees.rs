//! Fee and reward claims, shortfall resolution, parameter updates.

use super::core::Engine;
use super::results::EngineError;
use crate::collateral::FeeRecipient;
use crate::config::{MarketParameter, ProtocolParameter};
use crate::custody::Custody;
use crate::events::{EventPayload, FeeClaimedEvent, RewardClaimedEvent, ShortfallEvent};
use crate::oracle::OracleProvider;
use crate::types::{AccountId, MarketId, Quote};
use log::info;
use rust_decimal::Decimal;

impl<O, C> Engine<O, C>
where
    O: OracleProvider + Clone,
    C: Custody + Clone,
{
    /// Pay out a market's accrued protocol or market fee to `to`.
    pub fn claim_fee(&mut self, market_id: MarketId, recipient: FeeRecipient, to: AccountId) -> Result<Quote, EngineError> {
        self.atomic(|engine| {
            engine.settle_market_inner(market_id)?;
            let amount = engine.market_mut(market_id)?.ledger.claim_fee(recipient);
            if !amount.is_zero() {
                engine.custody.push(to, amount)?;
            }
            engine.emit_event(EventPayload::FeeClaimed(FeeClaimedEvent {
                market_id,
                recipient,
                to,
                amount,
            }));
            Ok(amount)
        })
    }

    /// Settle `account` and hand back its accrued reward. Rewards are tracked
    /// as units; paying them out is up to the caller.
    pub fn claim_reward(&mut self, market_id: MarketId, account: AccountId) -> Result<Decimal, EngineError> {
        self.atomic(|engine| {
            engine.settle_inner(market_id, account)?;
            let amount = engine.market_mut(market_id)?.account_mut(account).take_reward();
            engine.emit_event(EventPayload::RewardClaimed(RewardClaimedEvent {
                market_id,
                account_id: account,
                amount,
            }));
            Ok(amount)
        })
    }

    /// Cover recorded shortfall with funds pulled from `from`.
    pub fn resolve_shortfall(&mut self, market_id: MarketId, from: AccountId, amount: Quote) -> Result<Quote, EngineError> {
        self.atomic(|engine| {
            engine.market_mut(market_id)?.ledger.resolve_shortfall(amount)?;
            engine.custody.pull(from, amount)?;
            let shortfall = engine.market(market_id)?.ledger.shortfall();
            info!("shortfall in {:?} resolved by {}, {} left", market_id, amount, shortfall);
            engine.emit_event(EventPayload::ShortfallResolved(ShortfallEvent {
                market_id,
                amount,
                shortfall,
            }));
            Ok(shortfall)
        })
    }

    /// Replace a market's parameters. Everything up to the latest version
    /// settles under the old ones first.
    pub fn update_market_parameter(&mut self, market_id: MarketId, parameter: MarketParameter) -> Result<(), EngineError> {
        parameter.validate()?;
        self.atomic(|engine| {
            engine.settle_market_inner(market_id)?;
            engine.market_mut(market_id)?.parameter = parameter;
            info!("market {:?} parameters updated", market_id);
            engine.emit_event(EventPayload::MarketParameterUpdated(market_id));
            Ok(())
        })
    }

    /// Replace the protocol parameters after settling every market.
    pub fn update_protocol_parameter(&mut self, parameter: ProtocolParameter) -> Result<(), EngineError> {
        parameter.validate()?;
        self.atomic(|engine| {
            for id in engine.market_ids() {
                engine.settle_market_inner(id)?;
            }
            engine.config.protocol = parameter;
            info!("protocol parameters updated");
            engine.emit_event(EventPayload::ProtocolParameterUpdated);
            Ok(())
        })
    }
}
