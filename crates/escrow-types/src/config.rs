//! Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{EscrowError, Result, constants};

/// Configuration shared by every agreement an engine host creates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscrowConfig {
    /// Asset label the escrowed value is denominated in (logs, snapshots).
    pub asset: String,
    /// Longest `max_duration` an agreement may request.
    pub max_horizon: Duration,
    /// Notifications retained per engine before the oldest are evicted.
    pub journal_capacity: usize,
}

impl Default for EscrowConfig {
    fn default() -> Self {
        Self {
            asset: constants::DEFAULT_ASSET.to_string(),
            max_horizon: constants::DEFAULT_MAX_HORIZON,
            journal_capacity: constants::DEFAULT_JOURNAL_CAPACITY,
        }
    }
}

impl EscrowConfig {
    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(json)
            .map_err(|e| EscrowError::Configuration(format!("invalid config JSON: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject configurations no agreement could run under.
    pub fn validate(&self) -> Result<()> {
        if self.asset.trim().is_empty() {
            return Err(EscrowError::Configuration("asset must not be empty".into()));
        }
        if self.max_horizon.is_zero() {
            return Err(EscrowError::Configuration(
                "max_horizon must be positive".into(),
            ));
        }
        if self.journal_capacity == 0 {
            return Err(EscrowError::Configuration(
                "journal_capacity must be > 0".into(),
            ));
        }
        Ok(())
    }
}
