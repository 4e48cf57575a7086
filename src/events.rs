// 11.0: every mutating entry point records an event. audit trail and off-chain indexing only;
// nothing in settlement reads them back. EventPayload lists all event types.

use crate::collateral::FeeRecipient;
use crate::position::PositionDelta;
use crate::types::{AccountId, MarketId, Quote, Timestamp, Version};
use log::debug;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(id: EventId, timestamp: Timestamp, payload: EventPayload) -> Self {
        Self {
            id,
            timestamp,
            payload,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    // Market events
    MarketAdded(MarketAddedEvent),
    MarketParameterUpdated(MarketId),
    ProtocolParameterUpdated,

    // Settlement events
    Settled(SettledEvent),
    ShortfallCreated(ShortfallEvent),
    ShortfallResolved(ShortfallEvent),

    // Account events
    Updated(UpdatedEvent),
    Liquidated(LiquidatedEvent),
    FeeClaimed(FeeClaimedEvent),
    RewardClaimed(RewardClaimedEvent),

    // Vault events
    VaultDeposit(VaultRequestEvent),
    VaultRedeem(VaultRequestEvent),
    VaultClaim(VaultRequestEvent),
    CheckpointCompleted(CheckpointEvent),
    RebalanceLegSkipped(RebalanceSkippedEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketAddedEvent {
    pub market_id: MarketId,
    pub genesis: Version,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettledEvent {
    pub market_id: MarketId,
    pub account_id: AccountId,
    pub version: Version,
    pub value: Quote,
    pub collateral: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShortfallEvent {
    pub market_id: MarketId,
    pub amount: Quote,
    pub shortfall: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatedEvent {
    pub market_id: MarketId,
    pub account_id: AccountId,
    pub version: Version,
    pub delta: PositionDelta,
    pub collateral_delta: Quote,
    pub fee: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidatedEvent {
    pub market_id: MarketId,
    pub account_id: AccountId,
    pub liquidator: AccountId,
    pub version: Version,
    pub fee: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeClaimedEvent {
    pub market_id: MarketId,
    pub recipient: FeeRecipient,
    pub to: AccountId,
    pub amount: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardClaimedEvent {
    pub market_id: MarketId,
    pub account_id: AccountId,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultRequestEvent {
    pub vault: AccountId,
    pub account_id: AccountId,
    pub epoch: u64,
    pub assets: Quote,
    pub shares: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointEvent {
    pub vault: AccountId,
    pub epoch: u64,
    pub shares: Decimal,
    pub assets: Quote,
    pub minted: Decimal,
    pub claimable: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalanceSkippedEvent {
    pub vault: AccountId,
    pub market_id: MarketId,
    pub reason: String,
}

/// Bounded in-memory log. Oldest events are dropped past `capacity`.
#[derive(Debug, Clone)]
pub struct EventLog {
    events: Vec<Event>,
    next_id: u64,
    capacity: usize,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Vec::new(),
            next_id: 1,
            capacity,
        }
    }

    pub fn emit(&mut self, timestamp: Timestamp, payload: EventPayload) -> EventId {
        let id = EventId(self.next_id);
        self.next_id += 1;
        debug!("[Event {}] {:?}", id.0, payload);
        self.events.push(Event::new(id, timestamp, payload));

        if self.events.len() > self.capacity {
            let drain_count = self.events.len() - self.capacity;
            self.events.drain(0..drain_count);
        }
        id
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn recent(&self, count: usize) -> &[Event] {
        let start = self.events.len().saturating_sub(count);
        &self.events[start..]
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn liquidation() -> EventPayload {
        EventPayload::Liquidated(LiquidatedEvent {
            market_id: MarketId(1),
            account_id: AccountId(2),
            liquidator: AccountId(3),
            version: Version(4),
            fee: Quote::new(dec!(50)),
        })
    }

    #[test]
    fn event_log_assigns_ids() {
        let mut log = EventLog::new(10);
        let a = log.emit(Timestamp::from_millis(1), liquidation());
        let b = log.emit(Timestamp::from_millis(2), liquidation());
        assert_eq!(a, EventId(1));
        assert_eq!(b, EventId(2));
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn event_log_is_bounded() {
        let mut log = EventLog::new(3);
        for i in 0..5 {
            log.emit(Timestamp::from_millis(i), liquidation());
        }
        assert_eq!(log.len(), 3);
        assert_eq!(log.events()[0].id, EventId(3));
        assert_eq!(log.recent(1)[0].id, EventId(5));
    }

    #[test]
    fn event_serializes() {
        let event = Event::new(EventId(1), Timestamp::from_millis(0), liquidation());
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("Liquidated"));
    }
}
