//! Listener that writes every host event to the log.

use anyhow::Result;

use streamhost_services::{Host, HostListener};

pub struct LogListener;

impl HostListener for LogListener {
    fn added(&self, host: &Host) -> Result<()> {
        tracing::info!(
            host = %host.id,
            name = %host.name,
            addr = %host.address,
            status = ?host.status,
            "host added"
        );
        Ok(())
    }

    fn updated(&self, host: &Host) -> Result<()> {
        tracing::debug!(
            host = %host.id.short(),
            addr = %host.address,
            status = ?host.status,
            pair = ?host.pair_state,
            selected = host.selected,
            "host updated"
        );
        Ok(())
    }

    fn removed(&self, host: &Host) -> Result<()> {
        tracing::info!(host = %host.id, name = %host.name, "host removed");
        Ok(())
    }
}
