//! JSON file store for the host list.
//!
//! Default persistence collaborator: reads and writes a `HostSnapshot` as
//! pretty JSON. Writes go to a sibling temp file first and are renamed into
//! place, so a crash mid-save leaves the previous file intact.

use std::path::{Path, PathBuf};

use crate::registry::{HostSnapshot, SNAPSHOT_VERSION};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to read {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    Parse(PathBuf, serde_json::Error),
    #[error("unsupported snapshot version {1} in {0}")]
    Version(PathBuf, u32),
    #[error("failed to write {0}: {1}")]
    Write(PathBuf, std::io::Error),
    #[error("failed to serialize host list: {0}")]
    Serialize(serde_json::Error),
}

pub struct HostStore {
    path: PathBuf,
}

impl HostStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted host list. A missing file is not an error.
    pub fn load(&self) -> Result<Option<HostSnapshot>, StoreError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::Read(self.path.clone(), e)),
        };
        let snapshot: HostSnapshot =
            serde_json::from_str(&text).map_err(|e| StoreError::Parse(self.path.clone(), e))?;
        if snapshot.version > SNAPSHOT_VERSION {
            return Err(StoreError::Version(self.path.clone(), snapshot.version));
        }
        Ok(Some(snapshot))
    }

    /// Write the host list, replacing any previous file.
    pub fn save(&self, snapshot: &HostSnapshot) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(snapshot).map_err(StoreError::Serialize)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Write(self.path.clone(), e))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| StoreError::Write(tmp.clone(), e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| StoreError::Write(self.path.clone(), e))?;
        tracing::debug!(
            count = snapshot.hosts.len(),
            path = %self.path.display(),
            "host list saved"
        );
        Ok(())
    }
}
