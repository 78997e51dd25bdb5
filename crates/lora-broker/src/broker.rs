// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Broker instance: connection registries, collaborators and downlink
//! dispatch. The uplink pipeline lives in [`crate::uplink`].

use crate::collaborator::{ApplicationRegistry, NetworkServer};
use crate::config::BrokerConfig;
use crate::dedup::Deduplicator;
use crate::error::BrokerResult;
use crate::message::{DeduplicatedUplink, DownlinkMessage, UplinkMessage};
use crate::mic::IntegrityVerifier;
use crate::registry::{Connections, PeerRole, Registration};
use crate::stats::{BrokerStats, BrokerStatsSnapshot};
use crate::uplink::DedupKey;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// External services used by the broker.
#[derive(Clone)]
pub struct Collaborators {
    pub network_server: Arc<dyn NetworkServer>,
    pub applications: Arc<dyn ApplicationRegistry>,
    pub verifier: Arc<dyn IntegrityVerifier>,
}

/// Routing and deduplication core.
///
/// Owns all shared state; dropping the broker drops every registration's
/// sending half, which ends the corresponding connection loops.
pub struct Broker {
    pub(crate) uplink_dedup: Deduplicator<DedupKey, UplinkMessage>,
    pub(crate) routers: Connections<DownlinkMessage>,
    pub(crate) handlers: Connections<DeduplicatedUplink>,
    pub(crate) collaborators: Collaborators,
    pub(crate) stats: BrokerStats,
}

impl Broker {
    /// Create a broker with an explicit window and channel capacity.
    pub fn new(
        uplink_dedup_window: Duration,
        channel_capacity: usize,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            uplink_dedup: Deduplicator::new(uplink_dedup_window),
            routers: Connections::new(PeerRole::Router, channel_capacity),
            handlers: Connections::new(PeerRole::Handler, channel_capacity),
            collaborators,
            stats: BrokerStats::new(),
        }
    }

    /// Create a broker from configuration.
    pub fn from_config(config: &BrokerConfig, collaborators: Collaborators) -> Self {
        Self::new(
            config.uplink_dedup_window(),
            config.channel_capacity,
            collaborators,
        )
    }

    /// Register a router; downlinks for it arrive on the registration.
    pub fn register_router(&self, router_id: &str) -> Registration<DownlinkMessage> {
        self.routers.register(router_id)
    }

    /// Unregister a router unless it was superseded.
    pub fn unregister_router(&self, registration: &Registration<DownlinkMessage>) -> bool {
        self.routers
            .unregister(registration.identity(), registration.id())
    }

    /// Register a handler; deduplicated uplinks arrive on the registration.
    pub fn register_handler(&self, handler_id: &str) -> Registration<DeduplicatedUplink> {
        self.handlers.register(handler_id)
    }

    /// Unregister a handler unless it was superseded.
    pub fn unregister_handler(&self, registration: &Registration<DeduplicatedUplink>) -> bool {
        self.handlers
            .unregister(registration.identity(), registration.id())
    }

    /// Route a handler's downlink to the router named in its option.
    ///
    /// Fails if the routing identifier is malformed or the router is not
    /// connected; the downlink is never dropped silently.
    pub async fn dispatch_downlink(&self, downlink: DownlinkMessage) -> BrokerResult<()> {
        let result = self.try_dispatch_downlink(downlink).await;
        match &result {
            Ok(()) => BrokerStats::incr(&self.stats.downlinks_dispatched),
            Err(e) => {
                BrokerStats::incr(&self.stats.downlinks_failed);
                warn!("Downlink not delivered: {}", e);
            }
        }
        result
    }

    async fn try_dispatch_downlink(&self, downlink: DownlinkMessage) -> BrokerResult<()> {
        let routing_id = downlink.downlink_option.routing_id()?;
        self.routers.send(&routing_id.router_id, downlink).await?;
        debug!(
            "Downlink dispatched to router {} (schedule {})",
            routing_id.router_id, routing_id.schedule_id
        );
        Ok(())
    }

    /// Router namespace.
    pub fn routers(&self) -> &Connections<DownlinkMessage> {
        &self.routers
    }

    /// Handler namespace.
    pub fn handlers(&self) -> &Connections<DeduplicatedUplink> {
        &self.handlers
    }

    /// Get broker statistics.
    pub fn stats(&self) -> BrokerStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn uplink_dedup_window(&self) -> Duration {
        self.uplink_dedup.window()
    }
}
