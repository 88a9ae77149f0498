//! Feed configuration for TOML-based setup.
//!
//! A feed config is loaded externally and consumed read-only by the core;
//! nothing here issues RPC calls.

use alloy::primitives::Address;
use anyhow::Result;
use feedsync_chain::{Scale, SchemaVersion};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::SyncError;

/// Immutable per-feed descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Display name, e.g. "ETH / USD"
    #[serde(default)]
    pub name: Option<String>,
    /// Aggregator contract address
    pub contract_address: String,
    /// EVM network id
    pub network_id: u64,
    /// On-chain schema version (1 = legacy, 2 = aggregator interface,
    /// 3 = flux)
    pub contract_version: u8,
    /// Divisor applied to raw answers (decimal integer string)
    #[serde(default = "default_multiply")]
    pub multiply: String,
    /// Power of ten applied to raw answers before dividing
    #[serde(default)]
    pub decimal_places: u32,
    /// Digits shifted below the decimal point for display
    #[serde(default)]
    pub format_decimal_places: u32,
    /// Expected round cadence in seconds, when the feed has one
    #[serde(default)]
    pub heartbeat_secs: Option<u64>,
    /// History window in days for charting
    #[serde(default)]
    pub history_days: Option<u64>,
    /// Percent deviation tolerated by external health checks
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

fn default_multiply() -> String {
    "1".to_string()
}

fn default_threshold() -> f64 {
    1.0
}

impl FeedConfig {
    /// Parse the contract address. The one validation that happens before
    /// any RPC call.
    pub fn address(&self) -> Result<Address, SyncError> {
        self.contract_address
            .parse()
            .map_err(|_| SyncError::InvalidAddress(self.contract_address.clone()))
    }

    /// Resolve the schema version tag.
    pub fn version(&self) -> Result<SchemaVersion, SyncError> {
        SchemaVersion::from_config(self.contract_version)
            .ok_or(SyncError::UnsupportedVersion(self.contract_version))
    }

    /// Build the display scale for this feed's answers.
    pub fn scale(&self) -> Result<Scale, SyncError> {
        Ok(Scale::new(
            &self.multiply,
            self.decimal_places,
            self.format_decimal_places,
        )?)
    }

    /// Historical window in days; one day unless the feed requests more.
    pub fn window_days(&self) -> u64 {
        self.history_days.unwrap_or(1).max(1)
    }

    /// Heartbeat interval, when configured.
    pub fn heartbeat(&self) -> Option<Duration> {
        self.heartbeat_secs.map(Duration::from_secs)
    }

    /// Whether the feed wants an answer-history chart.
    pub fn wants_history(&self) -> bool {
        self.history_days.is_some()
    }
}

/// Collection of feed configurations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedsConfig {
    #[serde(default)]
    pub feeds: Vec<FeedConfig>,
}

impl FeedsConfig {
    /// Load from TOML content.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| anyhow::anyhow!("Failed to parse feeds config: {}", e))
    }

    /// Load from file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Find a feed by display name.
    pub fn get(&self, name: &str) -> Option<&FeedConfig> {
        self.feeds.iter().find(|f| f.name.as_deref() == Some(name))
    }
}
