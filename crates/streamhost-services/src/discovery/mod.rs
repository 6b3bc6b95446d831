//! LAN host discovery.
//!
//! A background worker probes the network once per interval, collects
//! replies for a bounded window, and merges every distinct host into the
//! registry, announcing each merge on the listener bus. The worker is
//! started and stopped through [`DiscoveryEngine`]; the network side is a
//! [`ProbeTransport`] so tests can script replies.

use std::net::SocketAddr;
use std::time::Duration;

use streamhost_core::config::DiscoveryConfig;
use streamhost_core::wire::WireError;

pub mod engine;
pub mod responder;
pub mod transport;

pub use engine::DiscoveryEngine;
pub use responder::{Responder, ResponderIdentity};
pub use transport::{ProbeChannel, ProbeTransport, UdpProbe};

/// Lifecycle of the discovery worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Timing of the discovery loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoverySettings {
    interval: Duration,
    round_timeout: Duration,
}

impl DiscoverySettings {
    /// Both durations are raised to at least 1ms, and the round timeout is
    /// capped at the interval.
    pub fn new(interval: Duration, round_timeout: Duration) -> Self {
        let interval = interval.max(Duration::from_millis(1));
        let round_timeout = round_timeout.clamp(Duration::from_millis(1), interval);
        Self {
            interval,
            round_timeout,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn round_timeout(&self) -> Duration {
        self.round_timeout
    }
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        DiscoverySettings::from(&DiscoveryConfig::default())
    }
}

impl From<&DiscoveryConfig> for DiscoverySettings {
    fn from(config: &DiscoveryConfig) -> Self {
        Self::new(config.interval(), config.round_timeout())
    }
}

/// What one discovery round did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundSummary {
    /// Hosts merged for the first time.
    pub added: usize,
    /// Hosts already known and refreshed.
    pub updated: usize,
    /// Replies from a host already merged this round.
    pub duplicates: usize,
    /// Replies to an earlier round's probe.
    pub stale: usize,
    /// Replies that did not parse.
    pub malformed: usize,
}

impl RoundSummary {
    /// Distinct hosts merged this round.
    pub fn hosts(&self) -> usize {
        self.added + self.updated
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("failed to start discovery worker: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("probe transport failed: {0}")]
    Transport(#[source] std::io::Error),

    #[error("no hosts answered within {0:?}")]
    Timeout(Duration),

    #[error("malformed reply from {addr}: {source}")]
    Malformed {
        addr: SocketAddr,
        #[source]
        source: WireError,
    },

    #[error("discovery worker is running")]
    Busy,

    #[error("discovery round cancelled")]
    Cancelled,
}
