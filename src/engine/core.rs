// 8.0 engine/core.rs: main engine. holds every market, its oracle, the custody pool and the event log.

use super::config::EngineConfig;
use super::results::EngineError;
use crate::account::Account;
use crate::accumulator::Accumulator;
use crate::collateral::FeeBalances;
use crate::config::{MarketParameter, ProtocolParameter};
use crate::custody::{Custody, InMemoryCustody};
use crate::events::{Event, EventLog, EventPayload, MarketAddedEvent};
use crate::guard::LifecycleError;
use crate::liquidation::is_liquidatable;
use crate::margin::maintenance;
use crate::market::MarketState;
use crate::oracle::{MockOracle, OracleError, OracleProvider};
use crate::position::{Position, PrePosition};
use crate::types::{AccountId, MarketId, Price, Quote, Timestamp, Version};
use log::info;
use rust_decimal::Decimal;
use std::collections::HashMap;

/** 8.1: main engine struct. all state lives here, so a clone is a full snapshot */
#[derive(Debug, Clone)]
pub struct Engine<O = MockOracle, C = InMemoryCustody> {
    pub(super) config: EngineConfig,
    pub(super) markets: HashMap<MarketId, MarketState>,
    pub(super) oracles: HashMap<MarketId, O>,
    pub(super) custody: C,
    pub(super) events: EventLog,
    pub(super) current_time: Timestamp,
    pub(super) in_flight: bool,
}

impl<O, C> Engine<O, C>
where
    O: OracleProvider + Clone,
    C: Custody + Clone,
{
    pub fn new(config: EngineConfig, custody: C) -> Self {
        let events = EventLog::new(config.max_events);
        Self {
            config,
            markets: HashMap::new(),
            oracles: HashMap::new(),
            custody,
            events,
            current_time: Timestamp::from_millis(0),
            in_flight: false,
        }
    }

    /// Run `op` all-or-nothing. Any error restores the engine to its state before the call.
    ///
    /// The rollback point is a full clone of the engine, accumulator history and
    /// event log included, so every call costs O(history).
    pub fn atomic<T, F>(&mut self, op: F) -> Result<T, EngineError>
    where
        F: FnOnce(&mut Self) -> Result<T, EngineError>,
    {
        if self.in_flight {
            return Err(LifecycleError::Reentrant.into());
        }
        let snapshot = self.clone();
        self.in_flight = true;
        let result = op(self);
        self.in_flight = false;
        if result.is_err() {
            *self = snapshot;
        }
        result
    }

    /// Register a market. Its settlement starts at the oracle's latest version.
    pub fn add_market(&mut self, id: MarketId, parameter: MarketParameter, oracle: O) -> Result<MarketId, EngineError> {
        if self.markets.contains_key(&id) {
            return Err(EngineError::MarketExists(id));
        }
        parameter.validate()?;
        let genesis = oracle.latest();
        if !genesis.valid {
            return Err(OracleError::InvalidVersion(genesis.version).into());
        }

        self.markets.insert(id, MarketState::new(id, parameter, &genesis));
        self.oracles.insert(id, oracle);
        if genesis.timestamp > self.current_time {
            self.current_time = genesis.timestamp;
        }
        info!("market {:?} added at {}", id, genesis.version);
        self.emit_event(EventPayload::MarketAdded(MarketAddedEvent {
            market_id: id,
            genesis: genesis.version,
        }));
        Ok(id)
    }

    pub fn market(&self, id: MarketId) -> Result<&MarketState, EngineError> {
        self.markets.get(&id).ok_or(EngineError::MarketNotFound(id))
    }

    pub(crate) fn market_mut(&mut self, id: MarketId) -> Result<&mut MarketState, EngineError> {
        self.markets.get_mut(&id).ok_or(EngineError::MarketNotFound(id))
    }

    pub fn market_ids(&self) -> Vec<MarketId> {
        let mut ids: Vec<MarketId> = self.markets.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn oracle(&self, id: MarketId) -> Result<&O, EngineError> {
        self.oracles.get(&id).ok_or(EngineError::MarketNotFound(id))
    }

    /// The feed is external; tests and the simulator commit prices through this.
    pub fn oracle_mut(&mut self, id: MarketId) -> Result<&mut O, EngineError> {
        self.oracles.get_mut(&id).ok_or(EngineError::MarketNotFound(id))
    }

    pub fn custody(&self) -> &C {
        &self.custody
    }

    pub fn custody_mut(&mut self) -> &mut C {
        &mut self.custody
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn protocol(&self) -> &ProtocolParameter {
        &self.config.protocol
    }

    pub fn time(&self) -> Timestamp {
        self.current_time
    }

    pub fn events(&self) -> &[Event] {
        self.events.events()
    }

    pub fn recent_events(&self, count: usize) -> &[Event] {
        self.events.recent(count)
    }

    // 8.2: read accessors. these read stored state as of the last settlement.

    pub fn account(&self, market: MarketId, account: AccountId) -> Result<Account, EngineError> {
        Ok(self.market(market)?.account(account))
    }

    pub fn position(&self, market: MarketId, account: AccountId) -> Result<Position, EngineError> {
        Ok(self.market(market)?.account(account).position)
    }

    pub fn pending_position(&self, market: MarketId, account: AccountId) -> Result<PrePosition, EngineError> {
        Ok(self.market(market)?.account(account).pre)
    }

    pub fn next_position(&self, market: MarketId, account: AccountId) -> Result<Position, EngineError> {
        Ok(self.market(market)?.account(account).next())
    }

    pub fn global_position(&self, market: MarketId) -> Result<Position, EngineError> {
        Ok(self.market(market)?.position)
    }

    pub fn global_next_position(&self, market: MarketId) -> Result<Position, EngineError> {
        Ok(self.market(market)?.next_position())
    }

    pub fn collateral(&self, market: MarketId, account: AccountId) -> Result<Quote, EngineError> {
        Ok(self.market(market)?.collateral(account))
    }

    pub fn reward(&self, market: MarketId, account: AccountId) -> Result<Decimal, EngineError> {
        Ok(self.market(market)?.account(account).reward)
    }

    pub fn latest_version(&self, market: MarketId) -> Result<Version, EngineError> {
        Ok(self.market(market)?.latest_version)
    }

    /// Version new requests become effective at.
    pub fn current_version(&self, market: MarketId) -> Result<Version, EngineError> {
        Ok(self.oracle(market)?.current())
    }

    pub fn latest_price(&self, market: MarketId) -> Result<Price, EngineError> {
        Ok(self.oracle(market)?.latest().price)
    }

    pub fn accumulator(&self, market: MarketId, version: Version) -> Result<Option<Accumulator>, EngineError> {
        Ok(self.market(market)?.accumulators.at(version).copied())
    }

    pub fn shortfall(&self, market: MarketId) -> Result<Quote, EngineError> {
        Ok(self.market(market)?.ledger.shortfall())
    }

    pub fn fees(&self, market: MarketId) -> Result<FeeBalances, EngineError> {
        Ok(self.market(market)?.ledger.fees())
    }

    pub fn maintenance(&self, market: MarketId, account: AccountId) -> Result<Quote, EngineError> {
        let state = self.market(market)?;
        let price = self.latest_price(market)?;
        Ok(maintenance(&state.account(account).position, price, state.parameter.maintenance))
    }

    /// Maintenance once pending requests fold, at today's price.
    pub fn maintenance_next(&self, market: MarketId, account: AccountId) -> Result<Quote, EngineError> {
        let state = self.market(market)?;
        let price = self.latest_price(market)?;
        Ok(maintenance(&state.account(account).next(), price, state.parameter.maintenance))
    }

    pub fn is_liquidatable(&self, market: MarketId, account: AccountId) -> Result<bool, EngineError> {
        let state = self.market(market)?;
        let price = self.latest_price(market)?;
        Ok(is_liquidatable(
            state.collateral(account),
            &state.account(account).position,
            price,
            state.parameter.maintenance,
        ))
    }

    pub fn is_liquidating(&self, market: MarketId, account: AccountId) -> Result<bool, EngineError> {
        Ok(self.market(market)?.account(account).is_liquidating())
    }

    pub(crate) fn emit_event(&mut self, payload: EventPayload) {
        self.events.emit(self.current_time, payload);
    }
}
