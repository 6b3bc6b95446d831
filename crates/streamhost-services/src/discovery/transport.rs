//! Probe transports.
//!
//! `ProbeTransport::open` is called once per engine start and hands back a
//! channel the worker owns for the life of the run. The UDP transport sends
//! each probe to every configured target (by default the IPv4 broadcast
//! address) from one ephemeral socket and reads replies off the same socket.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

use streamhost_core::config::{ConfigError, DiscoveryConfig};

/// Opens probe channels. Failure here is fatal to `DiscoveryEngine::start`.
#[async_trait]
pub trait ProbeTransport: Send + Sync {
    async fn open(&self) -> io::Result<Box<dyn ProbeChannel>>;
}

/// One open probe channel.
///
/// `recv_reply` must be cancel-safe: the engine drops it mid-wait on stop
/// and at the end of every round.
#[async_trait]
pub trait ProbeChannel: Send {
    async fn send_probe(&mut self, datagram: &[u8]) -> io::Result<()>;

    async fn recv_reply(&mut self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;
}

/// UDP probe transport.
#[derive(Debug, Clone)]
pub struct UdpProbe {
    targets: Vec<SocketAddr>,
}

impl UdpProbe {
    pub fn new(targets: Vec<SocketAddr>) -> Self {
        Self { targets }
    }

    pub fn from_config(config: &DiscoveryConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(config.probe_targets()?))
    }

    pub fn targets(&self) -> &[SocketAddr] {
        &self.targets
    }
}

#[async_trait]
impl ProbeTransport for UdpProbe {
    async fn open(&self) -> io::Result<Box<dyn ProbeChannel>> {
        if self.targets.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "no probe targets configured",
            ));
        }
        let ipv6 = self.targets.iter().all(SocketAddr::is_ipv6);
        let socket = make_probe_socket(ipv6)?;
        let socket = UdpSocket::from_std(socket)?;
        tracing::debug!(
            local = %socket.local_addr()?,
            targets = self.targets.len(),
            "probe socket open"
        );
        Ok(Box::new(UdpChannel {
            socket,
            targets: self.targets.clone(),
        }))
    }
}

struct UdpChannel {
    socket: UdpSocket,
    targets: Vec<SocketAddr>,
}

#[async_trait]
impl ProbeChannel for UdpChannel {
    async fn send_probe(&mut self, datagram: &[u8]) -> io::Result<()> {
        let mut last_err = None;
        let mut sent = 0usize;
        for target in &self.targets {
            match self.socket.send_to(datagram, *target).await {
                Ok(_) => sent += 1,
                Err(e) => {
                    tracing::warn!(%target, error = %e, "probe send failed");
                    last_err = Some(e);
                }
            }
        }
        match last_err {
            Some(e) if sent == 0 => Err(e),
            _ => {
                tracing::trace!(sent, "probe sent");
                Ok(())
            }
        }
    }

    async fn recv_reply(&mut self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.socket.recv_from(buf).await
    }
}

/// Create a nonblocking UDP socket on an ephemeral port that may send to
/// the broadcast address.
fn make_probe_socket(ipv6: bool) -> io::Result<std::net::UdpSocket> {
    let (domain, bind): (Domain, SocketAddr) = if ipv6 {
        (Domain::IPV6, (Ipv6Addr::UNSPECIFIED, 0).into())
    } else {
        (Domain::IPV4, (Ipv4Addr::UNSPECIFIED, 0).into())
    };
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    if !ipv6 {
        socket.set_broadcast(true)?;
    }
    socket.set_nonblocking(true)?;
    socket.bind(&bind.into())?;
    Ok(socket.into())
}
