// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Interfaces of the services the broker depends on.

use crate::error::CollaboratorError;
use crate::message::DeduplicatedUplink;
use crate::types::{AesKey, DevAddr, Eui64};
use async_trait::async_trait;

/// Snapshot of a device that shares the frame's short address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateDevice {
    pub app_eui: Eui64,
    pub dev_eui: Eui64,
    pub nwk_s_key: AesKey,

    /// Lowest acceptable frame counter (last accepted + 1).
    pub stored_f_cnt: u32,

    /// Absolute counter resolved by the network server from the on-air hint.
    pub full_f_cnt: u32,

    pub uses_32bit_f_cnt: bool,
    pub disable_f_cnt_check: bool,
}

impl CandidateDevice {
    /// Counter to use for the MIC and the anti-replay check.
    pub fn resolved_f_cnt(&self, on_air: u16) -> u32 {
        if self.uses_32bit_f_cnt {
            self.full_f_cnt
        } else {
            u32::from(on_air)
        }
    }
}

/// Device registry and MAC layer.
#[async_trait]
pub trait NetworkServer: Send + Sync {
    /// All devices with `dev_addr`. `f_cnt` is the on-air counter, used to
    /// resolve counter rollover.
    async fn get_candidate_devices(
        &self,
        dev_addr: DevAddr,
        f_cnt: u16,
    ) -> Result<Vec<CandidateDevice>, CollaboratorError>;

    /// Pass a deduplicated uplink through the network server, which returns
    /// the message to deliver.
    async fn submit_uplink(
        &self,
        uplink: DeduplicatedUplink,
    ) -> Result<DeduplicatedUplink, CollaboratorError>;
}

/// Maps applications to the handler that serves them.
#[async_trait]
pub trait ApplicationRegistry: Send + Sync {
    /// Handler identity for `app_eui`, or `None` if the application is unknown.
    async fn resolve_handler(&self, app_eui: Eui64) -> Result<Option<String>, CollaboratorError>;
}
