//! Host-side discovery responder.
//!
//! Listens for probes on the discovery port and answers each one with an
//! announcement echoing the probe's nonce. Used by `streamhostd announce`
//! and by the loopback integration tests.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use streamhost_core::wire::{encode_announcement, parse_probe, Announcement, MAX_DATAGRAM};
use streamhost_core::{HostId, HostStatus};

/// What a responder announces about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponderIdentity {
    pub id: HostId,
    pub name: String,
    pub stream_port: u16,
    pub status: HostStatus,
}

pub struct Responder {
    socket: UdpSocket,
    identity: ResponderIdentity,
}

impl Responder {
    /// Bind the responder socket. Port 0 picks an ephemeral port.
    pub fn bind(addr: SocketAddr, identity: ResponderIdentity) -> Result<Self> {
        // reject identities that cannot be encoded before touching the network
        encode_announcement(&announcement(&identity, [0; 8]))
            .context("responder identity cannot be announced")?;

        let socket = make_responder_socket(addr)
            .with_context(|| format!("failed to bind responder on {addr}"))?;
        let socket = UdpSocket::from_std(socket).context("failed to convert to tokio UdpSocket")?;
        Ok(Self { socket, identity })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn identity(&self) -> &ResponderIdentity {
        &self.identity
    }

    /// Answer probes until cancelled.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let mut buf = [0u8; MAX_DATAGRAM];
        tracing::info!(
            addr = %self.local_addr()?,
            host = %self.identity.id,
            name = %self.identity.name,
            "responder listening"
        );

        loop {
            let (len, from) = tokio::select! {
                _ = cancel.cancelled() => break,
                r = self.socket.recv_from(&mut buf) => match r {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!(error = %e, "recv_from failed");
                        continue;
                    }
                },
            };

            let probe = match parse_probe(&buf[..len]) {
                Ok(p) => p,
                Err(e) => {
                    tracing::trace!(addr = %from, error = %e, "ignoring datagram");
                    continue;
                }
            };

            let nonce = probe.nonce;
            let reply = encode_announcement(&announcement(&self.identity, nonce))?;
            if let Err(e) = self.socket.send_to(&reply, from).await {
                tracing::warn!(addr = %from, error = %e, "announcement send failed");
                continue;
            }
            tracing::debug!(addr = %from, nonce = hex::encode(nonce), "answered probe");
        }

        tracing::info!("responder stopped");
        Ok(())
    }
}

fn announcement(identity: &ResponderIdentity, nonce: [u8; 8]) -> Announcement {
    Announcement {
        nonce,
        host_id: identity.id,
        status: identity.status,
        stream_port: identity.stream_port,
        name: identity.name.clone(),
    }
}

fn make_responder_socket(addr: SocketAddr) -> Result<std::net::UdpSocket> {
    let domain = if addr.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP)).context("socket()")?;

    socket.set_reuse_address(true).context("SO_REUSEADDR")?;
    socket.set_nonblocking(true).context("set_nonblocking")?;
    socket.bind(&addr.into()).context("bind()")?;

    Ok(socket.into())
}
