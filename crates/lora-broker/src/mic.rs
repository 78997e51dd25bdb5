// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Message integrity code verification.
//!
//! The broker only needs a yes/no answer per candidate key, so the
//! primitive sits behind [`IntegrityVerifier`]. [`LorawanMic`] is the
//! LoRaWAN 1.0 uplink MIC:
//!
//! ```text
//! B0  = 0x49 | 0x00 x4 | Dir(0) | DevAddr (LE) | FCnt32 (LE) | 0x00 | len(msg)
//! MIC = aes128_cmac(NwkSKey, B0 | msg)[0..4]
//! ```

use crate::frame::MacFrame;
use crate::types::{AesKey, DevAddr};
use aes::Aes128;
use cmac::{Cmac, Mac};
use thiserror::Error;

/// MIC computation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MicError {
    #[error("MIC input too long: {0} bytes")]
    MessageTooLong(usize),

    #[error("invalid key length")]
    InvalidKeyLength,
}

/// Checks a frame's MIC against a session key.
///
/// `f_cnt` is the resolved 32-bit counter, which takes part in the MIC even
/// though only its low 16 bits are transmitted.
pub trait IntegrityVerifier: Send + Sync {
    fn verify(&self, key: &AesKey, frame: &MacFrame, f_cnt: u32) -> Result<bool, MicError>;
}

/// LoRaWAN 1.0 uplink MIC (AES-128 CMAC).
#[derive(Debug, Clone, Copy, Default)]
pub struct LorawanMic;

impl LorawanMic {
    /// Compute the uplink MIC over `msg` (MHDR through FRMPayload).
    pub fn compute(
        key: &AesKey,
        dev_addr: DevAddr,
        f_cnt: u32,
        msg: &[u8],
    ) -> Result<[u8; 4], MicError> {
        let len = u8::try_from(msg.len()).map_err(|_| MicError::MessageTooLong(msg.len()))?;

        let a = dev_addr.0;
        let mut b0 = [0u8; 16];
        b0[0] = 0x49;
        // b0[1..5] zero, b0[5] = 0 (uplink)
        b0[6..10].copy_from_slice(&[a[3], a[2], a[1], a[0]]);
        b0[10..14].copy_from_slice(&f_cnt.to_le_bytes());
        b0[15] = len;

        let mut mac = <Cmac<Aes128> as Mac>::new_from_slice(key.as_bytes())
            .map_err(|_| MicError::InvalidKeyLength)?;
        mac.update(&b0);
        mac.update(msg);
        let tag = mac.finalize().into_bytes();

        let mut mic = [0u8; 4];
        mic.copy_from_slice(&tag[..4]);
        Ok(mic)
    }
}

impl IntegrityVerifier for LorawanMic {
    fn verify(&self, key: &AesKey, frame: &MacFrame, f_cnt: u32) -> Result<bool, MicError> {
        let expected = Self::compute(key, frame.dev_addr, f_cnt, &frame.mic_input)?;
        Ok(expected == frame.mic)
    }
}
