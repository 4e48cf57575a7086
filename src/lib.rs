// perps-settlement: perpetual futures settlement engine.
// positions change lazily: requests queue against the next oracle version and
// settle later by replaying every version in between. accounting is exact and
// path independent; all computation is deterministic with no external I/O.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: MarketId, AccountId, Version, Price, Quote, Timestamp
//   2.x  oracle.rs: versioned price feed trait + in-memory mock
//   3.x  curve.rs: jump-rate utilization curve for funding
//   4.x  position.rs: maker/long/short positions, deltas, pending requests
//   5.x  accumulator.rs: per-unit value/reward accumulators, version snapshots
//   6.x  guard.rs: ordered invariant checks run before every update
//   6.5  margin.rs: maintenance requirement
//   6.6  liquidation.rs: liquidation test + fee bound
//   7.x  config.rs: market, protocol and vault parameters, env presets
//   8.x  engine/: core engine: settle, update, liquidate, fees, parameters
//   9.x  settlement.rs: market and account settlement state machine
//   9.3  custody.rs: token movement in and out of the engine (mocked)
//   10.x account.rs: per-account settled + pending state
//   11.x events.rs: state transition events for audit
//   12.x market.rs: per-market runtime state
//   13.x collateral.rs: collateral ledger, shortfall, fee balances
//   14.x vault/: multi-market maker vault with epoch checkpoints

// core settlement modules
pub mod account;
pub mod accumulator;
pub mod curve;
pub mod engine;
pub mod events;
pub mod market;
pub mod oracle;
pub mod position;
pub mod settlement;
pub mod types;

// risk and safety modules
pub mod guard;
pub mod liquidation;
pub mod margin;

// integration modules
pub mod collateral;
pub mod config;
pub mod custody;
pub mod vault;

// re exports for convenience
pub use account::*;
pub use accumulator::*;
pub use curve::*;
pub use engine::*;
pub use events::*;
pub use market::*;
pub use oracle::*;
pub use position::*;
pub use types::*;
pub use collateral::{CollateralLedger, FeeBalances, FeeRecipient, LedgerError};
pub use config::{ConfigError, Environment, MarketParameter, ProtocolParameter, RewardRate, VaultMarket, VaultParameter};
pub use custody::{Custody, CustodyError, InMemoryCustody};
pub use guard::{GuardContext, GuardError, InvariantViolation, LifecycleError, UPDATE_GUARDS};
pub use liquidation::{is_liquidatable, liquidation_fee};
pub use margin::{evaluate_margin_status, maintenance, margin_ratio, MarginStatus};
pub use settlement::{split_fee, AccountSettlement, GlobalSettlement};
pub use vault::{Checkpoint, Holder, Target, Vault, VaultError};
