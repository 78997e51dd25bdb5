// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Uplink resolution pipeline.
//!
//! ```text
//! copy -> dedup -> decode -> candidates -> MIC match -> anti-replay
//!      -> merge metadata -> select downlink -> network server -> handler
//! ```
//!
//! Only the caller that opened the deduplication window runs the pipeline;
//! every other copy returns `Ok(())` as soon as it is folded in.

use crate::broker::Broker;
use crate::collaborator::CandidateDevice;
use crate::downlink::select_best_downlink;
use crate::error::{BrokerError, BrokerResult};
use crate::frame::MacFrame;
use crate::message::{DeduplicatedUplink, DownlinkMessage, UplinkMessage};
use crate::stats::BrokerStats;
use md5::{Digest, Md5};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Largest accepted distance between stored and received frame counter.
pub const MAX_FCNT_GAP: u32 = 16384;

/// Content fingerprint shared by all copies of one transmission.
pub type DedupKey = [u8; 16];

/// MD5 of the raw PHY payload.
pub fn dedup_key(payload: &[u8]) -> DedupKey {
    let digest = Md5::digest(payload);
    let mut key = [0u8; 16];
    key.copy_from_slice(&digest);
    key
}

/// Anti-replay check against the device's stored counter.
pub fn check_frame_counter(device: &CandidateDevice, f_cnt: u32) -> BrokerResult<()> {
    if device.disable_f_cnt_check {
        debug!("Frame counter check disabled for {}", device.dev_eui);
        return Ok(());
    }
    if f_cnt < device.stored_f_cnt || f_cnt - device.stored_f_cnt > MAX_FCNT_GAP {
        return Err(BrokerError::InvalidFrameCounter {
            stored: device.stored_f_cnt,
            received: f_cnt,
        });
    }
    Ok(())
}

fn unix_nanos(t: SystemTime) -> i64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

impl Broker {
    /// Handle one copy of an uplink received from a router.
    ///
    /// Returns once this copy was absorbed into another caller's window, or
    /// once the whole batch was forwarded (or failed) if this caller opened
    /// the window.
    pub async fn handle_uplink(&self, uplink: UplinkMessage) -> BrokerResult<()> {
        let server_time = unix_nanos(SystemTime::now());
        BrokerStats::incr(&self.stats.uplinks_received);

        let key = dedup_key(&uplink.payload);
        let duplicates = match self.uplink_dedup.deduplicate(key, uplink).await {
            Some(duplicates) => duplicates,
            None => {
                BrokerStats::incr(&self.stats.duplicates_absorbed);
                return Ok(());
            }
        };

        let copies = duplicates.len();
        match self.resolve_uplink(duplicates, server_time).await {
            Ok(()) => {
                BrokerStats::incr(&self.stats.uplinks_forwarded);
                Ok(())
            }
            Err(e) => {
                BrokerStats::incr(&self.stats.uplinks_failed);
                if e.is_security_relevant() {
                    warn!("Uplink rejected ({} copies): {}", copies, e);
                } else {
                    debug!("Uplink dropped ({} copies): {}", copies, e);
                }
                Err(e)
            }
        }
    }

    async fn resolve_uplink(
        &self,
        duplicates: Vec<UplinkMessage>,
        server_time: i64,
    ) -> BrokerResult<()> {
        let mut copies = duplicates.into_iter();
        let base = match copies.next() {
            Some(base) => base,
            None => return Ok(()),
        };

        if base.protocol_metadata.lorawan.is_none() {
            return Err(BrokerError::UnsupportedProtocol);
        }

        let frame = MacFrame::decode(&base.payload)?;

        let candidates = self
            .collaborators
            .network_server
            .get_candidate_devices(frame.dev_addr, frame.f_cnt)
            .await?;
        if candidates.is_empty() {
            return Err(BrokerError::NotFound);
        }

        let (device, f_cnt) = self.match_device(&frame, candidates)?;
        check_frame_counter(&device, f_cnt)?;

        let UplinkMessage {
            payload,
            mut protocol_metadata,
            gateway_metadata: base_gateway,
            downlink_options: base_options,
        } = base;

        if let Some(lorawan) = protocol_metadata.lorawan.as_mut() {
            lorawan.f_cnt = f_cnt;
        }

        let mut gateway_metadata = vec![base_gateway];
        let mut downlink_options = base_options;
        for copy in copies {
            gateway_metadata.push(copy.gateway_metadata);
            downlink_options.extend(copy.downlink_options);
        }

        let response_template = select_best_downlink(&downlink_options)
            .cloned()
            .map(DownlinkMessage::template);

        let uplink = DeduplicatedUplink {
            payload,
            dev_eui: device.dev_eui,
            app_eui: device.app_eui,
            protocol_metadata,
            gateway_metadata,
            server_time,
            response_template,
        };

        let uplink = self
            .collaborators
            .network_server
            .submit_uplink(uplink)
            .await?;

        let handler_id = self
            .collaborators
            .applications
            .resolve_handler(device.app_eui)
            .await?
            .ok_or(BrokerError::UnknownHandler(device.app_eui))?;

        let gateways = uplink.gateway_metadata.len();
        self.handlers.send(&handler_id, uplink).await?;

        info!(
            "Uplink from {} (FCnt {}, {} gateways) forwarded to handler {}",
            device.dev_eui, f_cnt, gateways, handler_id
        );
        Ok(())
    }

    /// First candidate whose key verifies the MIC, with its resolved counter.
    fn match_device(
        &self,
        frame: &MacFrame,
        candidates: Vec<CandidateDevice>,
    ) -> BrokerResult<(CandidateDevice, u32)> {
        for candidate in candidates {
            let f_cnt = candidate.resolved_f_cnt(frame.f_cnt);
            if self
                .collaborators
                .verifier
                .verify(&candidate.nwk_s_key, frame, f_cnt)?
            {
                return Ok((candidate, f_cnt));
            }
        }
        Err(BrokerError::NoMatch)
    }
}
