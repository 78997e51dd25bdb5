// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! LoRaWAN uplink data frame decoding.
//!
//! Layout of an uplink data PHYPayload (multi-byte fields little-endian):
//! ```text
//! +------+---------+-------+------+----------+-------+------------+-----+
//! | MHDR | DevAddr | FCtrl | FCnt | FOpts    | FPort | FRMPayload | MIC |
//! |  1B  |   4B    |  1B   |  2B  | 0..15B   | 0..1B |   0..N B   | 4B  |
//! +------+---------+-------+------+----------+-------+------------+-----+
//! ```
//! Only the fields the broker needs are decoded; FRMPayload stays encrypted.

use crate::types::DevAddr;
use thiserror::Error;

const MHDR_LEN: usize = 1;
const FHDR_MIN_LEN: usize = 7;
const MIC_LEN: usize = 4;
const MIN_FRAME_LEN: usize = MHDR_LEN + FHDR_MIN_LEN + MIC_LEN;

/// Frame decoding errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame too short: {0} bytes")]
    TooShort(usize),

    #[error("unsupported LoRaWAN major version {0}")]
    UnsupportedMajor(u8),

    #[error("uplink message does not contain a MAC payload ({0:?})")]
    NoMacPayload(MType),

    #[error("FOpts length {0} exceeds frame")]
    FOptsOverflow(usize),
}

/// Message type (upper three bits of MHDR).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MType {
    JoinRequest,
    JoinAccept,
    UnconfirmedDataUp,
    UnconfirmedDataDown,
    ConfirmedDataUp,
    ConfirmedDataDown,
    RejoinRequest,
    Proprietary,
}

impl MType {
    fn from_mhdr(mhdr: u8) -> Self {
        match mhdr >> 5 {
            0 => Self::JoinRequest,
            1 => Self::JoinAccept,
            2 => Self::UnconfirmedDataUp,
            3 => Self::UnconfirmedDataDown,
            4 => Self::ConfirmedDataUp,
            5 => Self::ConfirmedDataDown,
            6 => Self::RejoinRequest,
            _ => Self::Proprietary,
        }
    }

    pub fn is_uplink_data(self) -> bool {
        matches!(self, Self::UnconfirmedDataUp | Self::ConfirmedDataUp)
    }
}

/// Decoded uplink data frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacFrame {
    pub mtype: MType,
    pub dev_addr: DevAddr,
    pub f_ctrl: u8,

    /// On-air (truncated) frame counter.
    pub f_cnt: u16,

    pub f_opts: Vec<u8>,
    pub f_port: Option<u8>,
    pub frm_payload: Vec<u8>,

    /// Bytes covered by the MIC (everything but the MIC itself).
    pub mic_input: Vec<u8>,

    pub mic: [u8; MIC_LEN],
}

impl MacFrame {
    /// Decode an uplink data PHYPayload.
    pub fn decode(phy: &[u8]) -> Result<Self, FrameError> {
        if phy.len() < MIN_FRAME_LEN {
            return Err(FrameError::TooShort(phy.len()));
        }

        let mhdr = phy[0];
        let major = mhdr & 0x03;
        if major != 0 {
            return Err(FrameError::UnsupportedMajor(major));
        }
        let mtype = MType::from_mhdr(mhdr);
        if !mtype.is_uplink_data() {
            return Err(FrameError::NoMacPayload(mtype));
        }

        let mic_start = phy.len() - MIC_LEN;
        let mac = &phy[MHDR_LEN..mic_start];

        // DevAddr is little-endian on air
        let dev_addr = DevAddr([mac[3], mac[2], mac[1], mac[0]]);
        let f_ctrl = mac[4];
        let f_cnt = u16::from_le_bytes([mac[5], mac[6]]);

        let f_opts_len = (f_ctrl & 0x0f) as usize;
        let fhdr_len = FHDR_MIN_LEN + f_opts_len;
        if fhdr_len > mac.len() {
            return Err(FrameError::FOptsOverflow(f_opts_len));
        }
        let f_opts = mac[FHDR_MIN_LEN..fhdr_len].to_vec();

        let (f_port, frm_payload) = match &mac[fhdr_len..] {
            [] => (None, Vec::new()),
            [port, rest @ ..] => (Some(*port), rest.to_vec()),
        };

        let mut mic = [0u8; MIC_LEN];
        mic.copy_from_slice(&phy[mic_start..]);

        Ok(Self {
            mtype,
            dev_addr,
            f_ctrl,
            f_cnt,
            f_opts,
            f_port,
            frm_payload,
            mic_input: phy[..mic_start].to_vec(),
            mic,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build an uplink data frame with a caller-provided MIC.
    pub(crate) fn build_frame(
        dev_addr: DevAddr,
        f_cnt: u16,
        f_port: Option<u8>,
        payload: &[u8],
        mic: [u8; 4],
    ) -> Vec<u8> {
        let mut out = vec![0x40];
        let a = dev_addr.0;
        out.extend_from_slice(&[a[3], a[2], a[1], a[0]]);
        out.push(0x00);
        out.extend_from_slice(&f_cnt.to_le_bytes());
        if let Some(port) = f_port {
            out.push(port);
            out.extend_from_slice(payload);
        }
        out.extend_from_slice(&mic);
        out
    }

    #[test]
    fn test_decode_unconfirmed_uplink() {
        let addr = DevAddr([0x26, 0x01, 0x1a, 0x2b]);
        let phy = build_frame(addr, 0x1234, Some(10), &[0xaa, 0xbb], [1, 2, 3, 4]);

        let frame = MacFrame::decode(&phy).unwrap();
        assert_eq!(frame.mtype, MType::UnconfirmedDataUp);
        assert_eq!(frame.dev_addr, addr);
        assert_eq!(frame.f_cnt, 0x1234);
        assert_eq!(frame.f_port, Some(10));
        assert_eq!(frame.frm_payload, vec![0xaa, 0xbb]);
        assert_eq!(frame.mic, [1, 2, 3, 4]);
        assert_eq!(frame.mic_input.len(), phy.len() - 4);
    }

    #[test]
    fn test_decode_with_fopts_and_no_port() {
        let mut phy = vec![0x80, 0x04, 0x03, 0x02, 0x01, 0x02, 0x07, 0x00, 0x02, 0x30];
        phy.extend_from_slice(&[9, 9, 9, 9]);

        let frame = MacFrame::decode(&phy).unwrap();
        assert_eq!(frame.mtype, MType::ConfirmedDataUp);
        assert_eq!(frame.dev_addr, DevAddr([0x01, 0x02, 0x03, 0x04]));
        assert_eq!(frame.f_cnt, 7);
        assert_eq!(frame.f_opts, vec![0x02, 0x30]);
        assert_eq!(frame.f_port, None);
        assert!(frame.frm_payload.is_empty());
    }

    #[test]
    fn test_decode_too_short() {
        assert_eq!(MacFrame::decode(&[0x40; 5]), Err(FrameError::TooShort(5)));
    }

    #[test]
    fn test_decode_join_request_has_no_mac_payload() {
        let phy = [0x00; 23];
        assert_eq!(
            MacFrame::decode(&phy),
            Err(FrameError::NoMacPayload(MType::JoinRequest))
        );
    }

    #[test]
    fn test_decode_fopts_overflow() {
        // FCtrl claims 15 bytes of FOpts
        let phy = [0x40, 1, 2, 3, 4, 0x0f, 0, 0, 1, 2, 3, 4];
        assert_eq!(MacFrame::decode(&phy), Err(FrameError::FOptsOverflow(15)));
    }
}
