// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! LoRaWAN Broker
//!
//! Routing core between gateway-facing routers and application-facing
//! handlers.
//!
//! # Features
//!
//! - **Uplink Deduplication**: Copies of one transmission received by
//!   several gateways are merged into a single uplink
//! - **Device Resolution**: The MIC selects the device among all candidates
//!   sharing a short address
//! - **Anti-Replay**: Frame counters are checked against the stored counter
//! - **Downlink Routing**: Handler downlinks are dispatched to the router
//!   named in their routing identifier
//!
//! # Quick Start
//!
//! ```bash
//! # Generate a configuration file
//! lora-broker gen-config --output broker.toml
//!
//! # Run the broker
//! lora-broker --config broker.toml
//! ```
//!
//! # Configuration File
//!
//! ```toml
//! name = "lora-broker"
//! port = 1882
//! uplink_dedup_window_ms = 300
//!
//! [[devices]]
//! dev_addr = "26011A2B"
//! app_eui = "70B3D57ED0000001"
//! dev_eui = "0004A30B001C0530"
//! nwk_s_key = "2B7E151628AED2A6ABF7158809CF4F3C"
//!
//! [[applications]]
//! app_eui = "70B3D57ED0000001"
//! handler_id = "handler-1"
//! ```

pub mod broker;
pub mod collaborator;
pub mod config;
pub mod dedup;
pub mod downlink;
pub mod error;
pub mod frame;
pub mod memory;
pub mod message;
pub mod mic;
pub mod registry;
pub mod server;
pub mod stats;
pub mod types;
pub mod uplink;

pub use broker::{Broker, Collaborators};
pub use collaborator::{ApplicationRegistry, CandidateDevice, NetworkServer};
pub use config::{ApplicationConfig, BrokerConfig, ConfigError, DeviceConfig};
pub use dedup::Deduplicator;
pub use downlink::select_best_downlink;
pub use error::{BrokerError, BrokerResult, CollaboratorError};
pub use frame::{FrameError, MType, MacFrame};
pub use memory::{StaticApplications, StaticNetworkServer};
pub use message::{
    DeduplicatedUplink, DownlinkMessage, DownlinkOption, GatewayMetadata, LorawanMetadata,
    ProtocolMetadata, RoutingId, UplinkMessage,
};
pub use mic::{IntegrityVerifier, LorawanMic, MicError};
pub use registry::{Connections, DeliveryError, PeerRole, Registration};
pub use server::{BrokerServer, ServerError, WireMessage};
pub use stats::{BrokerStats, BrokerStatsSnapshot};
pub use types::{AesKey, DevAddr, Eui64};
