//! streamhost-core: host identity, discovery wire format, and configuration.
//! All other streamhost crates depend on this one.

pub mod config;
pub mod id;
pub mod wire;

pub use config::StreamhostConfig;
pub use id::HostId;
pub use wire::{Announcement, HostStatus};
