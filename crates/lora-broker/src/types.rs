// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! LoRaWAN identifiers.
//!
//! All identifiers travel as upper-case hex strings in JSON and TOML, and as
//! fixed-size byte arrays in memory. Byte order is the human-readable (MSB
//! first) order; the little-endian on-air order is handled in [`crate::frame`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Identifier parse errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

fn parse_fixed<const N: usize>(s: &str) -> Result<[u8; N], IdError> {
    let bytes = hex::decode(s.trim()).map_err(|_| IdError::InvalidHex(s.to_string()))?;
    if bytes.len() != N {
        return Err(IdError::InvalidLength {
            expected: N,
            actual: bytes.len(),
        });
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes);
    Ok(out)
}

macro_rules! hex_id {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(pub [u8; $len]);

        impl $name {
            /// Raw bytes, MSB first.
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                parse_fixed::<$len>(s).map(Self)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                s.parse()
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.to_string()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&hex::encode_upper(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }
    };
}

hex_id!(
    /// 32-bit device short address, assigned at activation. Not unique.
    DevAddr,
    4
);

hex_id!(
    /// 64-bit extended unique identifier (AppEUI, DevEUI, gateway EUI).
    Eui64,
    8
);

/// AES-128 session key.
///
/// `Debug` never prints the key material.
#[derive(Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AesKey(pub [u8; 16]);

impl AesKey {
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl FromStr for AesKey {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_fixed::<16>(s).map(Self)
    }
}

impl TryFrom<String> for AesKey {
    type Error = IdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<AesKey> for String {
    fn from(key: AesKey) -> Self {
        hex::encode_upper(key.0)
    }
}

impl fmt::Debug for AesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AesKey(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dev_addr_parse_display() {
        let addr: DevAddr = "26011a2b".parse().unwrap();
        assert_eq!(addr.0, [0x26, 0x01, 0x1a, 0x2b]);
        assert_eq!(addr.to_string(), "26011A2B");
    }

    #[test]
    fn test_eui_wrong_length() {
        let err = "0102".parse::<Eui64>().unwrap_err();
        assert_eq!(
            err,
            IdError::InvalidLength {
                expected: 8,
                actual: 2
            }
        );
    }

    #[test]
    fn test_invalid_hex() {
        assert!(matches!(
            "zz000000".parse::<DevAddr>(),
            Err(IdError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_serde_as_hex_string() {
        let eui = Eui64([0x70, 0xb3, 0xd5, 0x7e, 0xd0, 0x00, 0x00, 0x01]);
        let json = serde_json::to_string(&eui).unwrap();
        assert_eq!(json, "\"70B3D57ED0000001\"");
        let back: Eui64 = serde_json::from_str(&json).unwrap();
        assert_eq!(back, eui);
    }

    #[test]
    fn test_key_debug_is_redacted() {
        let key = AesKey([0xab; 16]);
        assert_eq!(format!("{:?}", key), "AesKey(..)");
    }
}
