//! Host registry: the authoritative, ordered list of known hosts.
//!
//! Hosts live in a `Vec` in insertion order with an id → index map beside
//! it. Every operation takes the lock once, does its scan-and-mutate, and
//! hands back owned clones, so callers never hold a view into the table
//! and nothing here ever runs with the lock held except list bookkeeping.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use streamhost_core::HostId;

use crate::host::{Host, HostInput, PairState};

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("no host with id {0}")]
    NotFound(HostId),
}

/// Outcome of a successful `select`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// The host that is now selected.
    pub selected: Host,
    /// The host that lost the selection, if it was a different one.
    pub deselected: Option<Host>,
}

/// Outcome of a successful `remove`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removal {
    /// The removed record, with `selected` cleared.
    pub host: Host,
    /// Whether the removed host held the selection.
    pub was_selected: bool,
}

/// Serializable copy of the whole registry, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostSnapshot {
    pub version: u32,
    pub hosts: Vec<Host>,
}

/// What `load` kept and what it compacted away.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub loaded: usize,
    pub duplicates_dropped: usize,
    pub selections_cleared: usize,
}

#[derive(Default)]
struct Table {
    hosts: Vec<Host>,
    index: HashMap<HostId, usize>,
}

impl Table {
    fn position(&self, id: &HostId) -> Option<usize> {
        self.index.get(id).copied()
    }

    fn selected_position(&self) -> Option<usize> {
        self.hosts.iter().position(|h| h.selected)
    }

    fn push(&mut self, host: Host) {
        self.index.insert(host.id, self.hosts.len());
        self.hosts.push(host);
    }

    fn reindex(&mut self) {
        self.index = self
            .hosts
            .iter()
            .enumerate()
            .map(|(i, h)| (h.id, i))
            .collect();
    }
}

/// The host registry. Shared as `Arc<HostRegistry>` between discovery and
/// consumers.
#[derive(Default)]
pub struct HostRegistry {
    table: Mutex<Table>,
}

impl HostRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // Every critical section leaves the table consistent before it can
    // panic, so a poisoned lock still guards valid data.
    fn lock(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Merge a host into the registry.
    ///
    /// An existing record keeps its position, selection and pair state and
    /// has its mutable fields overwritten; an unknown id is appended
    /// unselected. Returns the stored record and whether it was new.
    pub fn add_or_update(&self, input: HostInput) -> (Host, bool) {
        let mut table = self.lock();
        match table.position(&input.id) {
            Some(pos) => {
                let host = &mut table.hosts[pos];
                input.apply_to(host);
                (host.clone(), false)
            }
            None => {
                let host = input.into_new_host();
                table.push(host.clone());
                (host, true)
            }
        }
    }

    /// Point-in-time copy of every host, in insertion order.
    pub fn get_all(&self) -> Vec<Host> {
        self.lock().hosts.clone()
    }

    pub fn get(&self, id: &HostId) -> Option<Host> {
        let table = self.lock();
        table.position(id).map(|pos| table.hosts[pos].clone())
    }

    /// The currently selected host, if any.
    pub fn selected(&self) -> Option<Host> {
        let table = self.lock();
        table.selected_position().map(|pos| table.hosts[pos].clone())
    }

    pub fn len(&self) -> usize {
        self.lock().hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().hosts.is_empty()
    }

    /// Make `id` the only selected host.
    pub fn select(&self, id: &HostId) -> Result<Selection, RegistryError> {
        let mut table = self.lock();
        let target = table.position(id).ok_or(RegistryError::NotFound(*id))?;

        let deselected = match table.selected_position() {
            Some(prev) if prev != target => {
                table.hosts[prev].selected = false;
                Some(table.hosts[prev].clone())
            }
            _ => None,
        };
        table.hosts[target].selected = true;

        Ok(Selection {
            selected: table.hosts[target].clone(),
            deselected,
        })
    }

    /// Clear the selection. Returns the host that held it.
    pub fn clear_selection(&self) -> Option<Host> {
        let mut table = self.lock();
        let pos = table.selected_position()?;
        table.hosts[pos].selected = false;
        Some(table.hosts[pos].clone())
    }

    /// Remove a host. Removing the selected host leaves nothing selected.
    pub fn remove(&self, id: &HostId) -> Result<Removal, RegistryError> {
        let mut table = self.lock();
        let pos = table.position(id).ok_or(RegistryError::NotFound(*id))?;
        let mut host = table.hosts.remove(pos);
        table.reindex();

        let was_selected = host.selected;
        host.selected = false;
        Ok(Removal { host, was_selected })
    }

    /// Record the outcome of a pairing attempt.
    pub fn set_pair_state(&self, id: &HostId, state: PairState) -> Result<Host, RegistryError> {
        let mut table = self.lock();
        let pos = table.position(id).ok_or(RegistryError::NotFound(*id))?;
        table.hosts[pos].pair_state = state;
        Ok(table.hosts[pos].clone())
    }

    /// Copy the registry out for persistence.
    pub fn save(&self) -> HostSnapshot {
        HostSnapshot {
            version: SNAPSHOT_VERSION,
            hosts: self.get_all(),
        }
    }

    /// Replace the registry contents with a persisted snapshot.
    ///
    /// The snapshot is compacted on the way in: later records with an id
    /// already seen are dropped, and only the first selected host keeps
    /// its selection.
    pub fn load(&self, snapshot: HostSnapshot) -> LoadReport {
        let mut report = LoadReport::default();
        let mut fresh = Table::default();
        let mut have_selection = false;

        for mut host in snapshot.hosts {
            if fresh.index.contains_key(&host.id) {
                report.duplicates_dropped += 1;
                continue;
            }
            if host.selected {
                if have_selection {
                    host.selected = false;
                    report.selections_cleared += 1;
                }
                have_selection = true;
            }
            fresh.push(host);
        }
        report.loaded = fresh.hosts.len();

        *self.lock() = fresh;
        report
    }
}
