// 8.0: settlement engine. owns every market, its oracle, the custody pool and
// the event log. each public operation runs inside `atomic`: settle first,
// check guards, then mutate. deterministic, no I/O beyond the traits it is given.

mod config;
mod core;
mod fees;
mod liquidations;
mod results;
mod settle;
mod updates;

pub use config::EngineConfig;
pub use self::core::Engine;
pub use results::{EngineError, ErrorKind, LiquidationResult, SettleResult, UpdateResult};
