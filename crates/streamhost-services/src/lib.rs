//! streamhost-services: the host registry, its listeners, persistence, and
//! LAN discovery.
//!
//! Data flows one way: discovery merges into the [`HostRegistry`], and every
//! merge is announced on the [`ListenerBus`]. Consumers go through the
//! [`HostManager`] facade, which pairs the two.

pub mod discovery;
pub mod host;
pub mod listener;
pub mod manager;
pub mod registry;
pub mod store;

pub use discovery::{
    DiscoveryEngine, DiscoveryError, DiscoverySettings, EngineState, ProbeChannel,
    ProbeTransport, Responder, ResponderIdentity, RoundSummary, UdpProbe,
};
pub use host::{Host, HostInput, Observation, PairState};
pub use listener::{Dispatch, EventFn, HostEvent, HostListener, ListenerBus, ListenerToken};
pub use manager::HostManager;
pub use registry::{HostRegistry, HostSnapshot, LoadReport, Removal, RegistryError, Selection};
pub use store::{HostStore, StoreError};

pub use streamhost_core::{HostId, HostStatus};
