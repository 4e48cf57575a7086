// Oracle Provider
//
// The engine never discovers prices. It reads an ordered sequence of committed
// oracle versions through the `OracleProvider` trait. Version ids start at 0
// and are contiguous; once committed a version never changes.
//
// `MockOracle` is the in-memory provider used by tests and the simulator.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{Price, Timestamp, Version};

/// One committed price observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleVersion {
    pub version: Version,
    pub timestamp: Timestamp,
    pub price: Price,
    pub valid: bool,
}

impl OracleVersion {
    pub fn new(version: Version, timestamp: Timestamp, price: Price) -> Self {
        Self {
            version,
            timestamp,
            price,
            valid: true,
        }
    }

    /// Placeholder returned for versions that have not been committed.
    pub fn invalid(version: Version) -> Self {
        Self {
            version,
            timestamp: Timestamp::from_millis(0),
            price: Price::zero(),
            valid: false,
        }
    }
}

/// Read side of a price feed.
pub trait OracleProvider {
    /// Pull in anything the feed has committed since the last call.
    /// Returns the latest committed version and the id new requests target.
    fn sync(&mut self) -> (OracleVersion, Version);

    fn latest(&self) -> OracleVersion;

    /// Version that requests made now become effective at.
    fn current(&self) -> Version {
        self.latest().version.next()
    }

    /// `valid == false` for any version not committed yet.
    fn at(&self, version: Version) -> OracleVersion;
}

/// In-memory feed. Always holds at least the genesis version.
#[derive(Debug, Clone)]
pub struct MockOracle {
    versions: Vec<OracleVersion>,
}

impl MockOracle {
    pub fn new(price: Price, timestamp: Timestamp) -> Self {
        Self {
            versions: vec![OracleVersion::new(Version::GENESIS, timestamp, price)],
        }
    }

    pub fn with_price(price: Decimal) -> Self {
        Self::new(Price::new(price), Timestamp::from_secs(0))
    }

    /// Commit the next version. Timestamps must strictly increase.
    pub fn commit(&mut self, price: Price, timestamp: Timestamp) -> Result<Version, OracleError> {
        let latest = self.latest();
        if timestamp <= latest.timestamp {
            return Err(OracleError::NonMonotonicTimestamp {
                latest: latest.timestamp,
                requested: timestamp,
            });
        }
        let version = latest.version.next();
        debug_assert_eq!(version.value() as usize, self.versions.len());
        self.versions.push(OracleVersion::new(version, timestamp, price));
        Ok(version)
    }

    /// Commit `price` `elapsed_secs` after the latest version.
    pub fn advance(&mut self, price: Decimal, elapsed_secs: i64) -> Result<Version, OracleError> {
        let next_ts = Timestamp::from_millis(self.latest().timestamp.as_millis() + elapsed_secs * 1000);
        self.commit(Price::new(price), next_ts)
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

impl OracleProvider for MockOracle {
    fn sync(&mut self) -> (OracleVersion, Version) {
        (self.latest(), self.current())
    }

    fn latest(&self) -> OracleVersion {
        // never empty: new() commits genesis
        self.versions
            .last()
            .copied()
            .unwrap_or_else(|| OracleVersion::invalid(Version::GENESIS))
    }

    fn at(&self, version: Version) -> OracleVersion {
        usize::try_from(version.value())
            .ok()
            .and_then(|i| self.versions.get(i))
            .copied()
            .unwrap_or_else(|| OracleVersion::invalid(version))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OracleError {
    #[error("Oracle version {0} not committed")]
    NotCommitted(Version),

    #[error("Oracle version {0} is invalid")]
    InvalidVersion(Version),

    #[error("Timestamp {requested} not after latest {latest}")]
    NonMonotonicTimestamp { latest: Timestamp, requested: Timestamp },
}
