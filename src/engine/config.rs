//! Engine configuration options.

use crate::config::ProtocolParameter;
use serde::{Deserialize, Serialize};

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of events to retain in memory.
    pub max_events: usize,
    /// Protocol-wide parameters shared by every market.
    pub protocol: ProtocolParameter,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_events: 100_000,
            protocol: ProtocolParameter::default(),
        }
    }
}
