//! Discovery engine: owns the background worker and its lifecycle.
//!
//! `start` and `stop` are serialized by one async lock, so a stop that
//! overlaps a start runs entirely before or after it. Every round, in the
//! worker or run manually, watches a `CancellationToken` derived from the
//! engine's current epoch in every wait (interval tick, probe send, reply
//! receive). `stop` cancels the epoch, so it never waits out a round timeout.

use std::collections::HashSet;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::SystemTime;

use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use zerocopy::AsBytes;

use streamhost_core::wire::{parse_announcement, ProbeRequest, MAX_DATAGRAM};

use super::transport::{ProbeChannel, ProbeTransport};
use super::{DiscoveryError, DiscoverySettings, EngineState, RoundSummary};
use crate::host::HostInput;
use crate::listener::ListenerBus;
use crate::registry::HostRegistry;

/// Everything a discovery round needs, shared with the worker task.
struct RoundContext {
    registry: Arc<HostRegistry>,
    bus: Arc<ListenerBus>,
    settings: DiscoverySettings,
}

struct Worker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct DiscoveryEngine {
    ctx: Arc<RoundContext>,
    transport: Arc<dyn ProbeTransport>,
    state: watch::Sender<EngineState>,
    worker: Mutex<Option<Worker>>,
    /// Parent of every round's token. Cancelled and replaced by `stop`.
    epoch: StdMutex<CancellationToken>,
}

impl DiscoveryEngine {
    pub fn new(
        registry: Arc<HostRegistry>,
        bus: Arc<ListenerBus>,
        transport: Arc<dyn ProbeTransport>,
        settings: DiscoverySettings,
    ) -> Self {
        let (state, _) = watch::channel(EngineState::Stopped);
        Self {
            ctx: Arc::new(RoundContext {
                registry,
                bus,
                settings,
            }),
            transport,
            state,
            worker: Mutex::new(None),
            epoch: StdMutex::new(CancellationToken::new()),
        }
    }

    fn round_token(&self) -> CancellationToken {
        self.epoch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .child_token()
    }

    /// Cancel every round started so far; later rounds get a fresh epoch.
    fn cancel_epoch(&self) {
        let mut epoch = self.epoch.lock().unwrap_or_else(PoisonError::into_inner);
        epoch.cancel();
        *epoch = CancellationToken::new();
    }

    pub fn settings(&self) -> DiscoverySettings {
        self.ctx.settings
    }

    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<EngineState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: EngineState) {
        self.state.send_replace(state);
    }

    /// Start the background worker. Does nothing if it is already running.
    ///
    /// Returns once the worker loop is live. If the probe transport cannot
    /// be opened the engine stays `Stopped` and the error is returned.
    pub async fn start(&self) -> Result<(), DiscoveryError> {
        let mut worker = self.worker.lock().await;

        if let Some(w) = worker.as_ref() {
            if !w.handle.is_finished() {
                return Ok(());
            }
            tracing::warn!("discovery worker exited unexpectedly, restarting");
            if let Some(dead) = worker.take() {
                let _ = dead.handle.await;
            }
        }

        self.set_state(EngineState::Starting);

        let channel = match self.transport.open().await {
            Ok(c) => c,
            Err(e) => {
                self.set_state(EngineState::Stopped);
                tracing::error!(error = %e, "failed to open probe transport");
                return Err(DiscoveryError::Spawn(e));
            }
        };

        let cancel = self.round_token();
        let (live_tx, live_rx) = oneshot::channel();
        let handle = tokio::spawn(run_worker(
            self.ctx.clone(),
            channel,
            cancel.clone(),
            live_tx,
        ));

        if live_rx.await.is_err() {
            let _ = handle.await;
            self.set_state(EngineState::Stopped);
            return Err(DiscoveryError::Spawn(std::io::Error::other(
                "discovery worker exited during startup",
            )));
        }

        *worker = Some(Worker { cancel, handle });
        self.set_state(EngineState::Running);
        tracing::info!(
            interval_ms = self.ctx.settings.interval().as_millis() as u64,
            round_timeout_ms = self.ctx.settings.round_timeout().as_millis() as u64,
            "discovery started"
        );
        Ok(())
    }

    /// Stop the worker and wait for it to exit. Safe to call in any state.
    ///
    /// Manual rounds in flight are cancelled too and return `Cancelled`.
    pub async fn stop(&self) {
        let mut worker = self.worker.lock().await;
        self.cancel_epoch();
        let Some(w) = worker.take() else {
            return;
        };

        self.set_state(EngineState::Stopping);
        w.cancel.cancel();
        if let Err(e) = w.handle.await {
            if e.is_panic() {
                tracing::error!("discovery worker panicked");
            }
        }
        self.set_state(EngineState::Stopped);
        tracing::info!("discovery stopped");
    }

    /// Run a single round in the caller's task, outside the background loop
    /// (a manual refresh). Fails with `Busy` while the worker is running.
    ///
    /// The round is cancelled by a concurrent `stop`.
    pub async fn run_round_now(&self) -> Result<RoundSummary, DiscoveryError> {
        let cancel = {
            let worker = self.worker.lock().await;
            if worker.is_some() {
                return Err(DiscoveryError::Busy);
            }
            self.round_token()
        };

        let mut channel = tokio::select! {
            _ = cancel.cancelled() => return Err(DiscoveryError::Cancelled),
            opened = self.transport.open() => opened.map_err(DiscoveryError::Transport)?,
        };
        self.ctx.run_round(channel.as_mut(), &cancel).await
    }
}

impl Drop for DiscoveryEngine {
    fn drop(&mut self) {
        self.cancel_epoch();
        if let Ok(mut worker) = self.worker.try_lock() {
            if let Some(w) = worker.take() {
                w.cancel.cancel();
            }
        }
    }
}

async fn run_worker(
    ctx: Arc<RoundContext>,
    mut channel: Box<dyn ProbeChannel>,
    cancel: CancellationToken,
    live: oneshot::Sender<()>,
) {
    let mut interval = tokio::time::interval(ctx.settings.interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let _ = live.send(());

    let mut round: u64 = 0;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }
        round += 1;

        match ctx.run_round(channel.as_mut(), &cancel).await {
            Ok(summary) => tracing::debug!(
                round,
                added = summary.added,
                updated = summary.updated,
                duplicates = summary.duplicates,
                stale = summary.stale,
                malformed = summary.malformed,
                "discovery round complete"
            ),
            Err(DiscoveryError::Cancelled) => break,
            Err(e @ DiscoveryError::Timeout(_)) => {
                tracing::debug!(round, error = %e, "discovery round found no hosts")
            }
            Err(e) => tracing::warn!(round, error = %e, "discovery round failed"),
        }
    }

    tracing::debug!(rounds = round, "discovery worker exiting");
}

impl RoundContext {
    /// Probe once and merge every distinct reply that arrives before the
    /// round timeout.
    async fn run_round(
        &self,
        channel: &mut dyn ProbeChannel,
        cancel: &CancellationToken,
    ) -> Result<RoundSummary, DiscoveryError> {
        let nonce: [u8; 8] = rand::random();
        let probe = ProbeRequest::new(nonce);

        tokio::select! {
            _ = cancel.cancelled() => return Err(DiscoveryError::Cancelled),
            sent = channel.send_probe(probe.as_bytes()) => sent.map_err(DiscoveryError::Transport)?,
        }

        let deadline = Instant::now() + self.settings.round_timeout();
        let mut summary = RoundSummary::default();
        let mut seen = HashSet::new();
        let mut buf = [0u8; MAX_DATAGRAM];

        loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => return Err(DiscoveryError::Cancelled),
                r = tokio::time::timeout_at(deadline, channel.recv_reply(&mut buf)) => r,
            };

            let (len, source) = match received {
                Err(_elapsed) => break,
                Ok(Ok(r)) => r,
                Ok(Err(e)) if matches!(
                    e.kind(),
                    std::io::ErrorKind::ConnectionRefused | std::io::ErrorKind::ConnectionReset
                ) =>
                {
                    tracing::trace!(error = %e, "ignoring ICMP error on probe socket");
                    continue;
                }
                Ok(Err(e)) => {
                    if summary.hosts() == 0 {
                        return Err(DiscoveryError::Transport(e));
                    }
                    tracing::warn!(error = %e, "reply receive failed, ending round early");
                    break;
                }
            };

            let ann = match parse_announcement(&buf[..len]) {
                Ok(a) => a,
                Err(source_err) => {
                    summary.malformed += 1;
                    let err = DiscoveryError::Malformed {
                        addr: source,
                        source: source_err,
                    };
                    tracing::debug!(error = %err, "dropping discovery reply");
                    continue;
                }
            };

            if ann.nonce != nonce {
                summary.stale += 1;
                tracing::trace!(addr = %source, "reply to an earlier probe");
                continue;
            }
            if !seen.insert(ann.host_id) {
                summary.duplicates += 1;
                continue;
            }

            let input = HostInput::discovered(source, &ann, SystemTime::now());
            let (host, was_new) = self.registry.add_or_update(input);
            if was_new {
                summary.added += 1;
                tracing::info!(
                    host = %host.id,
                    name = %host.name,
                    addr = %host.address,
                    "discovered new host"
                );
            } else {
                summary.updated += 1;
                tracing::trace!(host = %host.id.short(), status = ?host.status, "host refreshed");
            }
            self.bus.notify_merge(&host, was_new);
        }

        if summary.hosts() == 0 {
            return Err(DiscoveryError::Timeout(self.settings.round_timeout()));
        }
        Ok(summary)
    }
}
