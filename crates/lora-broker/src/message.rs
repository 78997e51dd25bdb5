// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Messages exchanged with routers and handlers.

use crate::types::Eui64;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Separator between router identity and scheduling handle.
pub const ROUTING_ID_SEPARATOR: char = ':';

/// Radio metadata reported by one gateway for one reception.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayMetadata {
    /// Receiving gateway.
    pub gateway_eui: Eui64,

    /// Concentrator timestamp (microseconds, free-running).
    #[serde(default)]
    pub timestamp: u32,

    /// Reception time as reported by the gateway (Unix nanoseconds).
    #[serde(default)]
    pub time: Option<i64>,

    /// Centre frequency in Hz.
    #[serde(default)]
    pub frequency: u64,

    #[serde(default)]
    pub rssi: f32,

    #[serde(default)]
    pub snr: f32,
}

/// LoRaWAN-specific protocol metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LorawanMetadata {
    #[serde(default)]
    pub modulation: String,

    #[serde(default)]
    pub data_rate: String,

    #[serde(default)]
    pub coding_rate: String,

    /// Resolved absolute frame counter. Filled in by the broker.
    #[serde(default)]
    pub f_cnt: u32,
}

/// Protocol metadata container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProtocolMetadata {
    #[serde(default)]
    pub lorawan: Option<LorawanMetadata>,
}

impl ProtocolMetadata {
    pub fn lorawan(metadata: LorawanMetadata) -> Self {
        Self {
            lorawan: Some(metadata),
        }
    }
}

/// A proposal from a router for answering the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownlinkOption {
    /// Composite routing identifier, `"<router>:<schedule>"`.
    pub identifier: String,

    /// Higher is better.
    pub score: u32,

    /// Gateway that would transmit the downlink.
    #[serde(default)]
    pub gateway_eui: Option<Eui64>,
}

impl DownlinkOption {
    pub fn new(identifier: impl Into<String>, score: u32) -> Self {
        Self {
            identifier: identifier.into(),
            score,
            gateway_eui: None,
        }
    }

    /// Parse the routing identifier.
    pub fn routing_id(&self) -> Result<RoutingId, InvalidRoutingId> {
        self.identifier.parse()
    }
}

/// One copy of an uplink, as received from one router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UplinkMessage {
    /// Raw PHY payload.
    pub payload: Vec<u8>,

    #[serde(default)]
    pub protocol_metadata: ProtocolMetadata,

    pub gateway_metadata: GatewayMetadata,

    #[serde(default)]
    pub downlink_options: Vec<DownlinkOption>,
}

/// Downlink travelling from a handler to a router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownlinkMessage {
    #[serde(default)]
    pub payload: Vec<u8>,

    pub downlink_option: DownlinkOption,
}

impl DownlinkMessage {
    /// Response template carrying only the selected option.
    pub fn template(option: DownlinkOption) -> Self {
        Self {
            payload: Vec::new(),
            downlink_option: option,
        }
    }
}

/// The single message forwarded to a handler per transmission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeduplicatedUplink {
    pub payload: Vec<u8>,
    pub dev_eui: Eui64,
    pub app_eui: Eui64,
    pub protocol_metadata: ProtocolMetadata,

    /// One entry per received copy, in arrival order.
    pub gateway_metadata: Vec<GatewayMetadata>,

    /// Unix nanoseconds at which the broker received the first copy.
    pub server_time: i64,

    #[serde(default)]
    pub response_template: Option<DownlinkMessage>,
}

/// Routing identifier without a separator or with an empty router part.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid routing identifier: {0:?}")]
pub struct InvalidRoutingId(pub String);

/// Structured form of `"<router>:<schedule>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoutingId {
    pub router_id: String,
    pub schedule_id: String,
}

impl RoutingId {
    pub fn new(router_id: impl Into<String>, schedule_id: impl Into<String>) -> Self {
        Self {
            router_id: router_id.into(),
            schedule_id: schedule_id.into(),
        }
    }
}

impl FromStr for RoutingId {
    type Err = InvalidRoutingId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(ROUTING_ID_SEPARATOR) {
            Some((router, schedule)) if !router.is_empty() => Ok(Self::new(router, schedule)),
            _ => Err(InvalidRoutingId(s.to_string())),
        }
    }
}

impl fmt::Display for RoutingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            self.router_id, ROUTING_ID_SEPARATOR, self.schedule_id
        )
    }
}
