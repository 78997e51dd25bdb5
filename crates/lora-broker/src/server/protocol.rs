// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Broker wire protocol.
//!
//! Length-prefixed JSON frames:
//! ```text
//! +----------------+-------------------+
//! | Length (4B BE) | JSON payload      |
//! +----------------+-------------------+
//! ```
//!
//! The first frame on a connection declares the peer:
//! `associate` for routers, `subscribe` for handlers. The broker answers
//! with `ack`.

use crate::error::BrokerError;
use crate::message::{DeduplicatedUplink, DownlinkMessage, UplinkMessage};
use serde::{Deserialize, Serialize};

/// First frame was not a handshake, or carried an empty identity.
pub const ERR_HANDSHAKE: u32 = 1;
/// Frame type not valid for this peer role.
pub const ERR_UNEXPECTED: u32 = 2;
/// Downlink routing identifier malformed.
pub const ERR_INVALID_ROUTING_ID: u32 = 10;
/// Downlink router not connected.
pub const ERR_ROUTER_NOT_CONNECTED: u32 = 11;
/// Downlink router channel closed.
pub const ERR_ROUTER_CLOSED: u32 = 12;
/// Anything else.
pub const ERR_INTERNAL: u32 = 99;

/// Broker protocol message types.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WireMessage {
    /// Router handshake.
    #[serde(rename = "associate")]
    Associate { router_id: String },

    /// Handler handshake.
    #[serde(rename = "subscribe")]
    Subscribe { handler_id: String },

    /// Router -> broker.
    #[serde(rename = "uplink")]
    Uplink(UplinkMessage),

    /// Handler -> broker, and broker -> router.
    #[serde(rename = "downlink")]
    Downlink(DownlinkMessage),

    /// Broker -> handler.
    #[serde(rename = "deduplicated_uplink")]
    DeduplicatedUplink(DeduplicatedUplink),

    #[serde(rename = "ack")]
    Ack,

    #[serde(rename = "error")]
    Error { code: u32, message: String },
}

impl WireMessage {
    pub fn error(code: u32, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }

    /// Error frame for a failed downlink dispatch.
    pub fn from_dispatch_error(err: &BrokerError) -> Self {
        let code = match err {
            BrokerError::InvalidRoutingId(_) => ERR_INVALID_ROUTING_ID,
            BrokerError::NotConnected { .. } => ERR_ROUTER_NOT_CONNECTED,
            BrokerError::ChannelClosed { .. } => ERR_ROUTER_CLOSED,
            _ => ERR_INTERNAL,
        };
        Self::error(code, err.to_string())
    }

    /// Frame type name, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Associate { .. } => "associate",
            Self::Subscribe { .. } => "subscribe",
            Self::Uplink(_) => "uplink",
            Self::Downlink(_) => "downlink",
            Self::DeduplicatedUplink(_) => "deduplicated_uplink",
            Self::Ack => "ack",
            Self::Error { .. } => "error",
        }
    }
}
