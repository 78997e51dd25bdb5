// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Broker errors.
//!
//! Every error aborts processing of one transmission (or one downlink) and
//! is returned to the transport layer for logging; none is retried here.

use crate::frame::FrameError;
use crate::message::InvalidRoutingId;
use crate::mic::MicError;
use crate::registry::{DeliveryError, PeerRole};
use crate::types::Eui64;
use thiserror::Error;

/// Errors reported by external collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    #[error("network server: {0}")]
    NetworkServer(String),

    #[error("application registry: {0}")]
    Applications(String),

    #[error("integrity check: {0}")]
    Integrity(#[from] MicError),
}

/// Broker pipeline and dispatch errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    #[error("malformed frame: {0}")]
    Decode(#[from] FrameError),

    #[error("can not handle uplink from non-LoRaWAN device")]
    UnsupportedProtocol,

    #[error("device not found")]
    NotFound,

    #[error("no matching device")]
    NoMatch,

    #[error("invalid frame counter {received} (stored {stored})")]
    InvalidFrameCounter { stored: u32, received: u32 },

    #[error("no handler for application {0}")]
    UnknownHandler(Eui64),

    #[error("{role} {identity} not connected")]
    NotConnected { role: PeerRole, identity: String },

    #[error("{role} {identity} channel closed")]
    ChannelClosed { role: PeerRole, identity: String },

    #[error(transparent)]
    InvalidRoutingId(#[from] InvalidRoutingId),

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
}

impl BrokerError {
    /// Errors that may indicate forged or replayed traffic.
    pub fn is_security_relevant(&self) -> bool {
        matches!(self, Self::NoMatch | Self::InvalidFrameCounter { .. })
    }

    /// Errors caused by missing or dead peers.
    pub fn is_routing(&self) -> bool {
        matches!(
            self,
            Self::UnknownHandler(_)
                | Self::NotConnected { .. }
                | Self::ChannelClosed { .. }
                | Self::InvalidRoutingId(_)
        )
    }
}

impl From<DeliveryError> for BrokerError {
    fn from(e: DeliveryError) -> Self {
        match e {
            DeliveryError::NotConnected { role, identity } => Self::NotConnected { role, identity },
            DeliveryError::Closed { role, identity } => Self::ChannelClosed { role, identity },
        }
    }
}

impl From<MicError> for BrokerError {
    fn from(e: MicError) -> Self {
        Self::Collaborator(e.into())
    }
}

/// Result alias for broker operations.
pub type BrokerResult<T> = Result<T, BrokerError>;
