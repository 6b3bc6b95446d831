//! Discovery wire format: the datagrams exchanged between a client looking
//! for hosts and the hosts answering it.
//!
//! A client broadcasts a `ProbeRequest`; every host that hears it replies
//! with an `AnnouncementHeader` followed by its UTF-8 display name. The
//! reply echoes the probe nonce so the client can drop stale answers from
//! an earlier round.
//!
//! Fixed-size parts are #[repr(C, packed)] zerocopy structs. Multi-byte
//! integers are stored as big-endian byte arrays so the layout does not
//! depend on the sender's endianness.

use static_assertions::assert_eq_size;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::id::{HostId, HOST_ID_LEN};

// ── Constants ─────────────────────────────────────────────────────────────────

/// Every discovery datagram starts with these bytes.
pub const MAGIC: [u8; 4] = *b"SHDP";

/// Current discovery format version.
pub const WIRE_VERSION: u8 = 0x01;

/// `kind` byte of a probe.
pub const KIND_PROBE: u8 = 0x01;

/// `kind` byte of an announcement.
pub const KIND_ANNOUNCE: u8 = 0x02;

/// UDP port hosts listen on for probes.
pub const DISCOVERY_PORT: u16 = 47999;

/// Default streaming port advertised by a host.
pub const DEFAULT_STREAM_PORT: u16 = 47989;

/// Longest display name an announcement can carry.
pub const MAX_NAME_LEN: usize = u8::MAX as usize;

/// Receive buffer size large enough for any valid announcement.
pub const MAX_DATAGRAM: usize = 512;

// ── Probe ─────────────────────────────────────────────────────────────────────

/// Sent by a client once per discovery round.
///
/// Wire size: 16 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct ProbeRequest {
    /// Always `MAGIC`.
    pub magic: [u8; 4],
    /// Always `WIRE_VERSION`.
    pub version: u8,
    /// Always `KIND_PROBE`.
    pub kind: u8,
    /// Reserved, must be zero.
    pub flags: u8,
    pub reserved: u8,
    /// Random per round. Echoed back by every announcement.
    pub nonce: [u8; 8],
}

assert_eq_size!(ProbeRequest, [u8; 16]);

impl ProbeRequest {
    pub fn new(nonce: [u8; 8]) -> Self {
        Self {
            magic: MAGIC,
            version: WIRE_VERSION,
            kind: KIND_PROBE,
            flags: 0,
            reserved: 0,
            nonce,
        }
    }
}

/// Parse a probe received by a host.
pub fn parse_probe(bytes: &[u8]) -> Result<ProbeRequest, WireError> {
    let probe = ProbeRequest::read_from_prefix(bytes).ok_or(WireError::Truncated {
        expected: std::mem::size_of::<ProbeRequest>(),
        actual: bytes.len(),
    })?;
    check_preamble(probe.magic, probe.version, probe.kind, KIND_PROBE)?;
    Ok(probe)
}

// ── Announcement ──────────────────────────────────────────────────────────────

/// Fixed part of a host's reply to a probe. Followed by `name_len` bytes
/// of UTF-8 display name.
///
/// Wire size: 36 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct AnnouncementHeader {
    pub magic: [u8; 4],
    pub version: u8,
    /// Always `KIND_ANNOUNCE`.
    pub kind: u8,
    /// `HostStatus` wire byte.
    pub status: u8,
    /// Length of the name that follows the header.
    pub name_len: u8,
    /// Nonce of the probe being answered.
    pub nonce: [u8; 8],
    /// Durable host id.
    pub host_id: [u8; HOST_ID_LEN],
    /// Streaming port, big-endian.
    pub stream_port: [u8; 2],
    pub reserved: [u8; 2],
}

assert_eq_size!(AnnouncementHeader, [u8; 36]);

/// Reachability of a host as reported by discovery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostStatus {
    /// Never answered a probe (manually added, or loaded from disk).
    #[default]
    Unknown,
    /// Answering probes and idle.
    Online,
    /// Answering probes but already streaming to another client.
    Busy,
}

impl TryFrom<u8> for HostStatus {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(HostStatus::Online),
            0x02 => Ok(HostStatus::Busy),
            other => Err(WireError::UnknownStatus(other)),
        }
    }
}

impl HostStatus {
    /// Wire byte. `Unknown` is never sent and maps to zero.
    pub fn wire_byte(self) -> u8 {
        match self {
            HostStatus::Unknown => 0x00,
            HostStatus::Online => 0x01,
            HostStatus::Busy => 0x02,
        }
    }
}

/// A fully parsed announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    pub nonce: [u8; 8],
    pub host_id: HostId,
    pub status: HostStatus,
    pub stream_port: u16,
    pub name: String,
}

/// Parse a host's reply. Anything that is not exactly a well-formed
/// announcement is rejected.
pub fn parse_announcement(bytes: &[u8]) -> Result<Announcement, WireError> {
    let header_len = std::mem::size_of::<AnnouncementHeader>();
    let header = AnnouncementHeader::read_from_prefix(bytes).ok_or(WireError::Truncated {
        expected: header_len,
        actual: bytes.len(),
    })?;
    check_preamble(header.magic, header.version, header.kind, KIND_ANNOUNCE)?;

    let status = HostStatus::try_from(header.status)?;

    let name_len = header.name_len as usize;
    let name_bytes = bytes
        .get(header_len..header_len + name_len)
        .ok_or(WireError::Truncated {
            expected: header_len + name_len,
            actual: bytes.len(),
        })?;
    let name = std::str::from_utf8(name_bytes)
        .map_err(|_| WireError::InvalidName)?
        .to_string();

    Ok(Announcement {
        nonce: header.nonce,
        host_id: HostId(header.host_id),
        status,
        stream_port: u16::from_be_bytes(header.stream_port),
        name,
    })
}

/// Encode an announcement into a single datagram.
pub fn encode_announcement(ann: &Announcement) -> Result<Vec<u8>, WireError> {
    let name = ann.name.as_bytes();
    if name.len() > MAX_NAME_LEN {
        return Err(WireError::NameTooLong(name.len()));
    }
    if ann.status == HostStatus::Unknown {
        return Err(WireError::UnknownStatus(0));
    }
    let header = AnnouncementHeader {
        magic: MAGIC,
        version: WIRE_VERSION,
        kind: KIND_ANNOUNCE,
        status: ann.status.wire_byte(),
        name_len: name.len() as u8,
        nonce: ann.nonce,
        host_id: ann.host_id.0,
        stream_port: ann.stream_port.to_be_bytes(),
        reserved: [0; 2],
    };
    let mut out = Vec::with_capacity(std::mem::size_of::<AnnouncementHeader>() + name.len());
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(name);
    Ok(out)
}

fn check_preamble(
    magic: [u8; 4],
    version: u8,
    kind: u8,
    expected_kind: u8,
) -> Result<(), WireError> {
    if magic != MAGIC {
        return Err(WireError::BadMagic(magic));
    }
    if version != WIRE_VERSION {
        return Err(WireError::UnknownVersion(version));
    }
    if kind != expected_kind {
        return Err(WireError::UnexpectedKind(kind));
    }
    Ok(())
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can arise when interpreting discovery datagrams.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("datagram truncated: need {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("bad magic: {0:02x?}")]
    BadMagic([u8; 4]),

    #[error("unknown discovery version: 0x{0:02x}")]
    UnknownVersion(u8),

    #[error("unexpected datagram kind: 0x{0:02x}")]
    UnexpectedKind(u8),

    #[error("unknown host status byte: 0x{0:02x}")]
    UnknownStatus(u8),

    #[error("host name is not valid UTF-8")]
    InvalidName,

    #[error("host name is {0} bytes, maximum is {}", MAX_NAME_LEN)]
    NameTooLong(usize),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
