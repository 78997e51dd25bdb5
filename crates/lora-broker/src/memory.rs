// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-process network server and application registry.
//!
//! Backed by the device and application tables of [`BrokerConfig`]. Frame
//! counter state lives in memory only and is lost on restart.
//!
//! [`BrokerConfig`]: crate::config::BrokerConfig

use crate::collaborator::{ApplicationRegistry, CandidateDevice, NetworkServer};
use crate::config::{ApplicationConfig, DeviceConfig};
use crate::error::CollaboratorError;
use crate::message::DeduplicatedUplink;
use crate::types::{DevAddr, Eui64};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

/// Resolve the absolute counter from the stored counter and the 16 on-air
/// bits, assuming at most one rollover since the last accepted frame.
pub fn resolve_full_f_cnt(stored: u32, on_air: u16) -> u32 {
    let candidate = (stored & 0xffff_0000) | u32::from(on_air);
    if candidate < stored {
        candidate.wrapping_add(0x1_0000)
    } else {
        candidate
    }
}

/// Network server backed by a static device table.
pub struct StaticNetworkServer {
    devices: RwLock<Vec<DeviceConfig>>,
}

impl StaticNetworkServer {
    pub fn new(devices: Vec<DeviceConfig>) -> Self {
        Self {
            devices: RwLock::new(devices),
        }
    }

    /// Stored frame counter of a device.
    pub fn stored_f_cnt(&self, app_eui: Eui64, dev_eui: Eui64) -> Option<u32> {
        self.devices
            .read()
            .iter()
            .find(|d| d.app_eui == app_eui && d.dev_eui == dev_eui)
            .map(|d| d.f_cnt)
    }

    pub fn device_count(&self) -> usize {
        self.devices.read().len()
    }
}

#[async_trait]
impl NetworkServer for StaticNetworkServer {
    async fn get_candidate_devices(
        &self,
        dev_addr: DevAddr,
        f_cnt: u16,
    ) -> Result<Vec<CandidateDevice>, CollaboratorError> {
        let devices = self.devices.read();
        Ok(devices
            .iter()
            .filter(|d| d.dev_addr == dev_addr)
            .map(|d| CandidateDevice {
                app_eui: d.app_eui,
                dev_eui: d.dev_eui,
                nwk_s_key: d.nwk_s_key,
                stored_f_cnt: d.f_cnt,
                full_f_cnt: resolve_full_f_cnt(d.f_cnt, f_cnt),
                uses_32bit_f_cnt: d.uses_32bit_f_cnt,
                disable_f_cnt_check: d.disable_f_cnt_check,
            })
            .collect())
    }

    async fn submit_uplink(
        &self,
        uplink: DeduplicatedUplink,
    ) -> Result<DeduplicatedUplink, CollaboratorError> {
        let f_cnt = uplink
            .protocol_metadata
            .lorawan
            .as_ref()
            .map(|m| m.f_cnt)
            .ok_or_else(|| CollaboratorError::NetworkServer("missing LoRaWAN metadata".into()))?;

        let mut devices = self.devices.write();
        let device = devices
            .iter_mut()
            .find(|d| d.app_eui == uplink.app_eui && d.dev_eui == uplink.dev_eui)
            .ok_or_else(|| {
                CollaboratorError::NetworkServer(format!("unknown device {}", uplink.dev_eui))
            })?;

        // Batches for one device may complete out of order; never move back.
        device.f_cnt = device.f_cnt.max(f_cnt.saturating_add(1));
        debug!("Device {} next frame counter {}", device.dev_eui, device.f_cnt);

        Ok(uplink)
    }
}

/// Application registry backed by a static table.
pub struct StaticApplications {
    handlers: HashMap<Eui64, String>,
}

impl StaticApplications {
    pub fn new(applications: &[ApplicationConfig]) -> Self {
        Self {
            handlers: applications
                .iter()
                .map(|a| (a.app_eui, a.handler_id.clone()))
                .collect(),
        }
    }
}

#[async_trait]
impl ApplicationRegistry for StaticApplications {
    async fn resolve_handler(&self, app_eui: Eui64) -> Result<Option<String>, CollaboratorError> {
        Ok(self.handlers.get(&app_eui).cloned())
    }
}
