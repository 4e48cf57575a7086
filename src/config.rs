// 7.0 config.rs: every tunable lives here. market params, protocol params, vault params.
// nothing is read from globals: the engine passes these structs into settlement explicitly.
// 7.1 MarketParameter is per market. ProtocolParameter is shared by every market in an engine.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::curve::JumpRateUtilizationCurve;
use crate::position::PositionDelta;
use crate::types::{MarketId, Price, Quote};

/// Per-second reward emission for each side of a market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RewardRate {
    pub maker: Decimal,
    pub long: Decimal,
    pub short: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketParameter {
    // collateral must stay above magnitude * |price| * maintenance
    pub maintenance: Decimal,
    // share of funding kept as fee instead of paid out
    pub funding_fee: Decimal,
    // trade fee rates, charged on notional of the size change
    pub maker_fee: Decimal,
    pub taker_fee: Decimal,
    // share of trade fees paid to makers, the rest is extracted
    pub position_fee: Decimal,
    pub maker_limit: Decimal,
    pub utilization_curve: JumpRateUtilizationCurve,
    pub reward_rate: RewardRate,
    // close-only mode. no pnl or funding accrues while set
    pub closed: bool,
}

impl Default for MarketParameter {
    fn default() -> Self {
        Self {
            maintenance: dec!(0.1),
            funding_fee: dec!(0.1),
            maker_fee: Decimal::ZERO,
            taker_fee: Decimal::ZERO,
            position_fee: Decimal::ZERO,
            maker_limit: dec!(1_000_000),
            utilization_curve: JumpRateUtilizationCurve::default(),
            reward_rate: RewardRate::default(),
            closed: false,
        }
    }
}

impl MarketParameter {
    /// Fee for a size change: maker volume at the maker rate, taker volume at the taker rate.
    pub fn trade_fee(&self, delta: &PositionDelta, price: Price) -> Quote {
        let rate_volume = delta.maker_volume() * self.maker_fee + delta.taker_volume() * self.taker_fee;
        Quote::new(rate_volume * price.abs())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.maintenance <= Decimal::ZERO || self.maintenance > Decimal::ONE {
            return Err(ConfigError::InvalidMarket {
                reason: "maintenance must be in (0, 1]".to_string(),
            });
        }

        for (name, ratio) in [
            ("funding_fee", self.funding_fee),
            ("maker_fee", self.maker_fee),
            ("taker_fee", self.taker_fee),
            ("position_fee", self.position_fee),
        ] {
            if ratio < Decimal::ZERO || ratio > Decimal::ONE {
                return Err(ConfigError::InvalidMarket {
                    reason: format!("{} must be in [0, 1]", name),
                });
            }
        }

        if self.maker_limit < Decimal::ZERO {
            return Err(ConfigError::InvalidMarket {
                reason: "maker limit cannot be negative".to_string(),
            });
        }

        let rewards = self.reward_rate;
        if rewards.maker < Decimal::ZERO || rewards.long < Decimal::ZERO || rewards.short < Decimal::ZERO {
            return Err(ConfigError::InvalidMarket {
                reason: "reward rates cannot be negative".to_string(),
            });
        }

        self.utilization_curve.validate()
    }
}

/** 7.2: protocol wide settings. one copy per engine */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolParameter {
    // share of extracted market fees routed to the protocol
    pub protocol_fee: Decimal,
    // liquidator reward as a fraction of maintenance
    pub liquidation_fee: Decimal,
    // a position's collateral must be zero or at least this
    pub min_collateral: Quote,
    pub paused: bool,
}

impl Default for ProtocolParameter {
    fn default() -> Self {
        Self {
            protocol_fee: dec!(0.5),
            liquidation_fee: dec!(0.1),
            min_collateral: Quote::zero(),
            paused: false,
        }
    }
}

impl ProtocolParameter {
    pub fn testnet() -> Self {
        Self {
            min_collateral: Quote::new(dec!(10)),
            ..Self::default()
        }
    }

    pub fn mainnet() -> Self {
        Self {
            protocol_fee: dec!(0.3),
            liquidation_fee: dec!(0.05),
            min_collateral: Quote::new(dec!(100)),
            paused: false,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol_fee < Decimal::ZERO || self.protocol_fee > Decimal::ONE {
            return Err(ConfigError::InvalidProtocol {
                reason: "protocol fee must be in [0, 1]".to_string(),
            });
        }
        if self.liquidation_fee < Decimal::ZERO || self.liquidation_fee > Decimal::ONE {
            return Err(ConfigError::InvalidProtocol {
                reason: "liquidation fee must be in [0, 1]".to_string(),
            });
        }
        if self.min_collateral.is_negative() {
            return Err(ConfigError::InvalidProtocol {
                reason: "min collateral cannot be negative".to_string(),
            });
        }
        Ok(())
    }
}

// 7.3: vault membership. weights are relative, only their ratio matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultMarket {
    pub market: MarketId,
    pub weight: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultParameter {
    pub markets: Vec<VaultMarket>,
    pub target_leverage: Decimal,
    // None = uncapped
    pub max_collateral: Option<Quote>,
}

impl Default for VaultParameter {
    fn default() -> Self {
        Self {
            markets: Vec::new(),
            target_leverage: Decimal::ONE,
            max_collateral: None,
        }
    }
}

impl VaultParameter {
    pub fn total_weight(&self) -> u32 {
        self.markets.iter().map(|m| m.weight).sum()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.markets.is_empty() {
            return Err(ConfigError::InvalidVault {
                reason: "vault needs at least one market".to_string(),
            });
        }
        if self.total_weight() == 0 {
            return Err(ConfigError::InvalidVault {
                reason: "total weight must be positive".to_string(),
            });
        }
        let unique: HashSet<MarketId> = self.markets.iter().map(|m| m.market).collect();
        if unique.len() != self.markets.len() {
            return Err(ConfigError::InvalidVault {
                reason: "duplicate market".to_string(),
            });
        }
        if self.target_leverage < Decimal::ZERO {
            return Err(ConfigError::InvalidVault {
                reason: "target leverage cannot be negative".to_string(),
            });
        }
        if matches!(self.max_collateral, Some(cap) if cap.is_negative()) {
            return Err(ConfigError::InvalidVault {
                reason: "max collateral cannot be negative".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid market parameter: {reason}")]
    InvalidMarket { reason: String },

    #[error("Invalid protocol parameter: {reason}")]
    InvalidProtocol { reason: String },

    #[error("Invalid utilization curve: {reason}")]
    InvalidCurve { reason: String },

    #[error("Invalid vault parameter: {reason}")]
    InvalidVault { reason: String },
}

// Environment presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Development,
    Testnet,
    Mainnet,
}

impl Environment {
    pub fn protocol(&self) -> ProtocolParameter {
        match self {
            Environment::Development => ProtocolParameter::default(),
            Environment::Testnet => ProtocolParameter::testnet(),
            Environment::Mainnet => ProtocolParameter::mainnet(),
        }
    }
}
