//! Host manager: the consumer-facing facade over the registry and the bus.
//!
//! Every mutation goes registry first, lock released, then listeners.
//! A listener may call straight back into the manager.

use std::sync::Arc;

use streamhost_core::HostId;

use crate::discovery::{DiscoveryEngine, DiscoverySettings, ProbeTransport};
use crate::host::{Host, HostInput, PairState};
use crate::listener::{HostListener, ListenerBus, ListenerToken};
use crate::registry::{HostRegistry, HostSnapshot, LoadReport, RegistryError};

/// Owns the registry and listener bus for one client session.
///
/// Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct HostManager {
    registry: Arc<HostRegistry>,
    bus: Arc<ListenerBus>,
}

impl HostManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &Arc<HostRegistry> {
        &self.registry
    }

    pub fn bus(&self) -> &Arc<ListenerBus> {
        &self.bus
    }

    /// Build a discovery engine feeding this manager's registry.
    pub fn discovery(
        &self,
        transport: Arc<dyn ProbeTransport>,
        settings: DiscoverySettings,
    ) -> DiscoveryEngine {
        DiscoveryEngine::new(self.registry.clone(), self.bus.clone(), transport, settings)
    }

    pub fn register(&self, listener: Arc<dyn HostListener>) -> ListenerToken {
        self.bus.register(listener)
    }

    pub fn unregister(&self, token: ListenerToken) -> bool {
        self.bus.unregister(token)
    }

    pub fn get_all(&self) -> Vec<Host> {
        self.registry.get_all()
    }

    pub fn get(&self, id: &HostId) -> Option<Host> {
        self.registry.get(id)
    }

    pub fn selected(&self) -> Option<Host> {
        self.registry.selected()
    }

    /// Add or refresh a host from outside discovery (typed-in address,
    /// import). Notifies `added` or `updated`.
    pub fn add_host(&self, input: HostInput) -> (Host, bool) {
        let (host, was_new) = self.registry.add_or_update(input);
        if was_new {
            tracing::info!(host = %host.id, name = %host.name, addr = %host.address, "host added");
        }
        self.bus.notify_merge(&host, was_new);
        (host, was_new)
    }

    /// Select a host. The host that lost the selection and the newly
    /// selected host are both reported as `updated`.
    pub fn select(&self, id: &HostId) -> Result<Host, RegistryError> {
        let selection = self.registry.select(id)?;
        tracing::debug!(host = %id, "host selected");
        if let Some(prev) = &selection.deselected {
            self.bus.notify_updated(prev);
        }
        self.bus.notify_updated(&selection.selected);
        Ok(selection.selected)
    }

    /// Drop the current selection, if any.
    pub fn clear_selection(&self) -> Option<Host> {
        let prev = self.registry.clear_selection()?;
        self.bus.notify_updated(&prev);
        Some(prev)
    }

    /// Remove a host. Removing the selected host first reports it as
    /// `updated` (now unselected) so observers drop the active selection.
    pub fn remove(&self, id: &HostId) -> Result<Host, RegistryError> {
        let removal = self.registry.remove(id)?;
        tracing::info!(host = %id, was_selected = removal.was_selected, "host removed");
        if removal.was_selected {
            self.bus.notify_updated(&removal.host);
        }
        self.bus.notify_removed(&removal.host);
        Ok(removal.host)
    }

    /// Store the result of a pairing attempt.
    pub fn set_pair_state(&self, id: &HostId, state: PairState) -> Result<Host, RegistryError> {
        let host = self.registry.set_pair_state(id, state)?;
        self.bus.notify_updated(&host);
        Ok(host)
    }

    /// Replace the host list with a persisted snapshot. Meant for startup;
    /// listeners are not notified.
    pub fn load(&self, snapshot: HostSnapshot) -> LoadReport {
        let report = self.registry.load(snapshot);
        if report.duplicates_dropped > 0 || report.selections_cleared > 0 {
            tracing::warn!(
                duplicates = report.duplicates_dropped,
                selections = report.selections_cleared,
                "compacted persisted host list"
            );
        }
        tracing::info!(count = report.loaded, "hosts loaded");
        report
    }

    pub fn save(&self) -> HostSnapshot {
        self.registry.save()
    }
}
