// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Broker configuration.
//!
//! Supports both programmatic and file-based (TOML) configuration.

use crate::types::{AesKey, DevAddr, Eui64};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Upper bound for the deduplication window.
pub const MAX_DEDUP_WINDOW_MS: u64 = 10_000;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Broker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Broker name (for identification).
    #[serde(default = "default_name")]
    pub name: String,

    /// Address to bind to (default: 0.0.0.0)
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,

    /// TCP port for router and handler connections.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Uplink deduplication window (milliseconds).
    #[serde(default = "default_dedup_window")]
    pub uplink_dedup_window_ms: u64,

    /// Outbound channel capacity per connection.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Maximum wire message size (bytes).
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Statistics reporting interval (seconds, 0 to disable).
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,

    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Devices served by the built-in network server.
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,

    /// Application to handler mapping.
    #[serde(default)]
    pub applications: Vec<ApplicationConfig>,
}

/// Device entry for the built-in network server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub dev_addr: DevAddr,
    pub app_eui: Eui64,
    pub dev_eui: Eui64,
    pub nwk_s_key: AesKey,

    /// Lowest acceptable frame counter (last accepted + 1).
    #[serde(default)]
    pub f_cnt: u32,

    #[serde(default)]
    pub uses_32bit_f_cnt: bool,

    #[serde(default)]
    pub disable_f_cnt_check: bool,
}

/// Application to handler mapping entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    pub app_eui: Eui64,
    pub handler_id: String,
}

fn default_name() -> String {
    "lora-broker".to_string()
}

fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    1882
}

fn default_dedup_window() -> u64 {
    300
}

fn default_channel_capacity() -> usize {
    100
}

fn default_max_message_size() -> usize {
    1024 * 1024 // 1 MB
}

fn default_stats_interval() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            bind_address: default_bind_address(),
            port: default_port(),
            uplink_dedup_window_ms: default_dedup_window(),
            channel_capacity: default_channel_capacity(),
            max_message_size: default_max_message_size(),
            stats_interval_secs: default_stats_interval(),
            log_level: default_log_level(),
            devices: Vec::new(),
            applications: Vec::new(),
        }
    }
}

impl BrokerConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Uplink deduplication window as Duration.
    pub fn uplink_dedup_window(&self) -> Duration {
        Duration::from_millis(self.uplink_dedup_window_ms)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.uplink_dedup_window_ms == 0 {
            return Err(ConfigError::Invalid(
                "uplink_dedup_window_ms cannot be 0".into(),
            ));
        }
        if self.uplink_dedup_window_ms > MAX_DEDUP_WINDOW_MS {
            return Err(ConfigError::Invalid(format!(
                "uplink_dedup_window_ms {} exceeds {}",
                self.uplink_dedup_window_ms, MAX_DEDUP_WINDOW_MS
            )));
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::Invalid("channel_capacity cannot be 0".into()));
        }

        let mut devices = HashSet::new();
        for (i, device) in self.devices.iter().enumerate() {
            if !devices.insert((device.dev_addr, device.dev_eui)) {
                return Err(ConfigError::Invalid(format!(
                    "Device {} duplicates {} / {}",
                    i, device.dev_addr, device.dev_eui
                )));
            }
        }

        let mut applications = HashSet::new();
        for (i, app) in self.applications.iter().enumerate() {
            if app.handler_id.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "Application {} has empty handler_id",
                    i
                )));
            }
            if !applications.insert(app.app_eui) {
                return Err(ConfigError::Invalid(format!(
                    "Application {} is listed twice",
                    app.app_eui
                )));
            }
        }

        Ok(())
    }
}
