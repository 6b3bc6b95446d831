//! Streamhost integration test harness.
//!
//! Every test runs real UDP over loopback: one or more `Responder`s play
//! hosts, and a `HostManager` with a `UdpProbe` aimed at them plays the
//! client. No privileges or network setup needed:
//!
//!   cargo test --test integration

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use streamhost_core::{HostId, HostStatus};
use streamhost_services::{
    DiscoveryEngine, DiscoverySettings, EventFn, Host, HostEvent, HostManager, ListenerToken,
    Responder, ResponderIdentity, UdpProbe,
};

mod discovery;
mod lifecycle;
mod persistence;

// ── Harness ───────────────────────────────────────────────────────────────────

/// A responder running on an ephemeral loopback port.
pub struct FakeHost {
    pub addr: SocketAddr,
    pub id: HostId,
    cancel: CancellationToken,
    task: JoinHandle<Result<()>>,
}

impl FakeHost {
    pub async fn spawn(byte: u8, name: &str) -> Result<Self> {
        Self::spawn_with(byte, name, HostStatus::Online).await
    }

    pub async fn spawn_with(byte: u8, name: &str, status: HostStatus) -> Result<Self> {
        let id = HostId([byte; 16]);
        let responder = Responder::bind(
            "127.0.0.1:0".parse()?,
            ResponderIdentity {
                id,
                name: name.to_string(),
                stream_port: 47989,
                status,
            },
        )
        .context("failed to bind fake host")?;
        let addr = responder.local_addr()?;
        let cancel = CancellationToken::new();
        let task = tokio::spawn(responder.run(cancel.clone()));
        Ok(Self {
            addr,
            id,
            cancel,
            task,
        })
    }

    pub async fn shutdown(self) -> Result<()> {
        self.cancel.cancel();
        self.task.await.context("responder task panicked")?
    }
}

/// A client manager whose discovery probes exactly the given hosts.
pub fn client(
    hosts: &[&FakeHost],
    interval_ms: u64,
    timeout_ms: u64,
) -> (HostManager, DiscoveryEngine) {
    let manager = HostManager::new();
    let targets = hosts.iter().map(|h| h.addr).collect();
    let engine = manager.discovery(
        Arc::new(UdpProbe::new(targets)),
        DiscoverySettings::new(
            Duration::from_millis(interval_ms),
            Duration::from_millis(timeout_ms),
        ),
    );
    (manager, engine)
}

pub type EventLog = Arc<Mutex<Vec<(HostEvent, HostId)>>>;

/// Register a listener that records every event.
pub fn record(manager: &HostManager) -> (ListenerToken, EventLog) {
    let log: EventLog = Arc::default();
    let sink = log.clone();
    let token = manager.register(Arc::new(EventFn(
        move |event: HostEvent, host: &Host| -> anyhow::Result<()> {
            sink.lock().unwrap().push((event, host.id));
            Ok(())
        },
    )));
    (token, log)
}

/// Poll until `cond` holds or `within` elapses.
pub async fn wait_until(within: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
