//! Canonical identity types for xrelay
//!
//! Fixed-size byte identifiers render as `0x`-prefixed hex in `Display`,
//! `Debug` and serde, so records and notifications stay readable in logs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{CodecError, Result};

/// Numeric identifier of a ledger
pub type ChainId = u64;

macro_rules! fixed_bytes {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            pub const LEN: usize = $len;

            pub const fn zero() -> Self {
                Self([0u8; $len])
            }

            pub fn is_zero(&self) -> bool {
                self.0.iter().all(|b| *b == 0)
            }

            pub fn as_bytes(&self) -> &[u8] {
                &self.0
            }

            pub fn from_slice(bytes: &[u8]) -> Result<Self> {
                let array: [u8; $len] =
                    bytes.try_into().map_err(|_| CodecError::InvalidLength {
                        what: stringify!($name),
                        expected: $len,
                        actual: bytes.len(),
                    })?;
                Ok(Self(array))
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl FromStr for $name {
            type Err = CodecError;

            fn from_str(s: &str) -> Result<Self> {
                let raw = s.strip_prefix("0x").unwrap_or(s);
                let bytes = hex::decode(raw).map_err(|e| CodecError::InvalidHex {
                    message: e.to_string(),
                })?;
                Self::from_slice(&bytes)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

fixed_bytes!(
    /// 20-byte account or contract identity
    Address,
    20
);

fixed_bytes!(
    /// 32-byte identifier of one cross-chain action
    ActionId,
    32
);

fixed_bytes!(
    /// Hash binding a record to the attestation that validated it
    Fingerprint,
    32
);

fixed_bytes!(
    /// 4-byte identifier of a handler function
    Selector,
    4
);

fixed_bytes!(
    /// Hash of a committed endpoint transaction
    TxHash,
    32
);

fixed_bytes!(
    /// 32-byte topic / data word
    Word,
    32
);

// ============================================================================
// Word Conversions
// ============================================================================

impl Word {
    /// Big-endian, left-padded integer word
    pub fn from_u64(value: u64) -> Self {
        let mut word = [0u8; 32];
        word[24..].copy_from_slice(&value.to_be_bytes());
        Self(word)
    }

    /// Read a left-padded integer word; fails if it does not fit in `u64`
    pub fn to_u64(&self) -> Result<u64> {
        if self.0[..24].iter().any(|b| *b != 0) {
            return Err(CodecError::MalformedBytes {
                message: format!("word {} overflows u64", self),
            });
        }
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&self.0[24..]);
        Ok(u64::from_be_bytes(raw))
    }

    /// Boolean word (`1` or `0`)
    pub fn from_bool(value: bool) -> Self {
        Self::from_u64(u64::from(value))
    }

    pub fn to_bool(&self) -> Result<bool> {
        match self.to_u64()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(CodecError::MalformedBytes {
                message: format!("boolean word holds {}", other),
            }),
        }
    }
}

impl From<Address> for Word {
    /// Addresses are left-padded
    fn from(address: Address) -> Self {
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(&address.0);
        Self(word)
    }
}

impl From<Selector> for Word {
    /// Fixed-size byte strings are right-padded
    fn from(selector: Selector) -> Self {
        let mut word = [0u8; 32];
        word[..4].copy_from_slice(&selector.0);
        Self(word)
    }
}

impl From<ActionId> for Word {
    fn from(id: ActionId) -> Self {
        Self(id.0)
    }
}

impl From<Fingerprint> for Word {
    fn from(fingerprint: Fingerprint) -> Self {
        Self(fingerprint.0)
    }
}

impl Word {
    pub fn to_address(&self) -> Result<Address> {
        if self.0[..12].iter().any(|b| *b != 0) {
            return Err(CodecError::MalformedBytes {
                message: format!("word {} is not a left-padded address", self),
            });
        }
        Address::from_slice(&self.0[12..])
    }

    pub fn to_selector(&self) -> Result<Selector> {
        if self.0[4..].iter().any(|b| *b != 0) {
            return Err(CodecError::MalformedBytes {
                message: format!("word {} is not a right-padded selector", self),
            });
        }
        Selector::from_slice(&self.0[..4])
    }

    pub fn to_action_id(&self) -> ActionId {
        ActionId(self.0)
    }

    pub fn to_fingerprint(&self) -> Fingerprint {
        Fingerprint(self.0)
    }
}

// ============================================================================
// Endpoint Identity
// ============================================================================

/// One ledger participating in the protocol: chain id plus contract identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointId {
    pub chain_id: ChainId,
    pub contract: Address,
}

impl EndpointId {
    pub fn new(chain_id: ChainId, contract: Address) -> Self {
        Self { chain_id, contract }
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chain_id, self.contract)
    }
}
