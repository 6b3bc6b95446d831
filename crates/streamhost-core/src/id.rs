//! Durable host identity.
//!
//! A host keeps the same id across restarts and address changes, so it is
//! the key the registry merges on. Displayed and persisted as lowercase hex.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Length of a host id on the wire.
pub const HOST_ID_LEN: usize = 16;

/// Durable identifier of a streaming host.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostId(pub [u8; HOST_ID_LEN]);

impl HostId {
    /// Generate a fresh random id. Used by the responder when none is configured.
    pub fn random() -> Self {
        Self(rand::random())
    }

    pub fn as_bytes(&self) -> &[u8; HOST_ID_LEN] {
        &self.0
    }

    /// First four bytes as hex, for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl From<[u8; HOST_ID_LEN]> for HostId {
    fn from(bytes: [u8; HOST_ID_LEN]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostId({})", hex::encode(self.0))
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HostIdError {
    #[error("host id is not valid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("host id must be {} bytes, got {0}", HOST_ID_LEN)]
    WrongLength(usize),
}

impl FromStr for HostId {
    type Err = HostIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim())?;
        if bytes.len() != HOST_ID_LEN {
            return Err(HostIdError::WrongLength(bytes.len()));
        }
        let mut id = [0u8; HOST_ID_LEN];
        id.copy_from_slice(&bytes);
        Ok(Self(id))
    }
}

impl Serialize for HostId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for HostId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
