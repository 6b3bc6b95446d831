//! Host records as the registry stores them.

use std::net::SocketAddr;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use streamhost_core::wire::Announcement;
use streamhost_core::{HostId, HostStatus};

/// Result of the last pairing attempt with a host.
///
/// Written only through an explicit update. Discovery never touches it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PairState {
    #[default]
    Unknown,
    Unpaired,
    Paired,
}

/// A known streaming host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    /// Durable identity. Unique within a registry.
    pub id: HostId,
    /// Where the host streams from. Refreshed on every merge.
    pub address: SocketAddr,
    pub name: String,
    /// Reachability, as last reported by discovery.
    pub status: HostStatus,
    pub pair_state: PairState,
    /// When discovery last heard from this host.
    pub last_seen: Option<SystemTime>,
    /// At most one host in a registry is selected.
    pub selected: bool,
}

/// What discovery learned about a host in one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub status: HostStatus,
    pub seen_at: SystemTime,
}

/// Input to a registry merge.
///
/// Only inputs carrying an [`Observation`] may change a host's status and
/// last-seen time; manual adds leave both alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInput {
    pub id: HostId,
    pub address: SocketAddr,
    pub name: String,
    pub observation: Option<Observation>,
}

impl HostInput {
    /// A host entered by hand (address typed in, or imported).
    pub fn manual(id: HostId, address: SocketAddr, name: impl Into<String>) -> Self {
        Self {
            id,
            address,
            name: name.into(),
            observation: None,
        }
    }

    /// A host resolved from a discovery reply.
    ///
    /// The stream address is the datagram's source IP with the announced
    /// streaming port.
    pub fn discovered(source: SocketAddr, ann: &Announcement, seen_at: SystemTime) -> Self {
        Self {
            id: ann.host_id,
            address: SocketAddr::new(source.ip(), ann.stream_port),
            name: ann.name.clone(),
            observation: Some(Observation {
                status: ann.status,
                seen_at,
            }),
        }
    }

    /// Build the record for a host the registry has never seen.
    pub(crate) fn into_new_host(self) -> Host {
        let (status, last_seen) = match self.observation {
            Some(obs) => (obs.status, Some(obs.seen_at)),
            None => (HostStatus::Unknown, None),
        };
        Host {
            id: self.id,
            address: self.address,
            name: self.name,
            status,
            pair_state: PairState::Unknown,
            last_seen,
            selected: false,
        }
    }

    /// Overwrite the mutable fields of an existing record in place.
    /// Identity, pair state and selection are left untouched.
    pub(crate) fn apply_to(self, host: &mut Host) {
        host.address = self.address;
        host.name = self.name;
        if let Some(obs) = self.observation {
            host.status = obs.status;
            host.last_seen = Some(obs.seen_at);
        }
    }
}
