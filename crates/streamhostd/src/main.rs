//! streamhostd: streaming host discovery daemon.
//!
//! `streamhostd [watch]` keeps a live host list: loads the saved hosts,
//! runs background discovery and logs every change until Ctrl-C, then saves.
//! `streamhostd announce` acts as a host and answers discovery probes.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use streamhost_core::config::StreamhostConfig;
use streamhost_core::{HostId, HostStatus};
use streamhost_services::{
    DiscoverySettings, HostManager, HostStore, Responder, ResponderIdentity, UdpProbe,
};

mod log_listener;

use log_listener::LogListener;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = StreamhostConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = StreamhostConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        StreamhostConfig::default()
    });

    let mode = std::env::args().nth(1).unwrap_or_else(|| "watch".to_string());
    match mode.as_str() {
        "watch" => watch(config).await,
        "announce" => announce(config).await,
        other => anyhow::bail!("unknown mode {other:?} (expected \"watch\" or \"announce\")"),
    }
}

async fn watch(config: StreamhostConfig) -> Result<()> {
    tracing::info!("streamhostd starting");

    let manager = HostManager::new();
    let store = HostStore::new(&config.storage.hosts_path);
    match store.load() {
        Ok(Some(snapshot)) => {
            manager.load(snapshot);
        }
        Ok(None) => tracing::info!(path = %store.path().display(), "no saved hosts"),
        Err(e) => tracing::warn!(error = %e, "failed to load saved hosts, starting empty"),
    }
    if let Some(host) = manager.selected() {
        tracing::info!(host = %host.id, name = %host.name, "selected host");
    }

    manager.register(Arc::new(LogListener));

    let transport = UdpProbe::from_config(&config.discovery).context("invalid discovery config")?;
    let engine = manager.discovery(
        Arc::new(transport),
        DiscoverySettings::from(&config.discovery),
    );

    if config.discovery.enabled {
        engine.start().await.context("failed to start discovery")?;
    } else {
        tracing::info!("discovery disabled, running one round");
        match engine.run_round_now().await {
            Ok(summary) => tracing::info!(hosts = summary.hosts(), "manual round complete"),
            Err(e) => tracing::warn!(error = %e, "manual round failed"),
        }
    }

    tokio::signal::ctrl_c().await.ok();
    tracing::info!("shutdown signal received");

    engine.stop().await;

    if config.storage.autosave {
        if let Err(e) = store.save(&manager.save()) {
            tracing::warn!(error = %e, "failed to save hosts");
        } else {
            tracing::info!(count = manager.get_all().len(), "hosts saved");
        }
    }

    Ok(())
}

async fn announce(config: StreamhostConfig) -> Result<()> {
    let id = if config.responder.host_id.is_empty() {
        HostId::random()
    } else {
        config
            .responder
            .host_id
            .parse::<HostId>()
            .context("invalid responder.host_id")?
    };
    let identity = ResponderIdentity {
        id,
        name: config.responder.name.clone(),
        stream_port: config.responder.stream_port,
        status: HostStatus::Online,
    };

    let bind = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.discovery.port));
    let responder = Responder::bind(bind, identity)?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            cancel.cancel();
        });
    }

    responder.run(cancel).await
}
