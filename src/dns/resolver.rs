//! Upstream resolution.

use crate::error::Error;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;
use tracing::{debug, warn};
use trust_dns_proto::op::Message;

/// Largest datagram accepted from an upstream.
pub const MAX_UDP_DNS_SIZE: usize = 65_535;

/// How a query reached us, and so how it's first forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Udp,
    Tcp,
}

/// `DynUpstream` is a shareable [`Upstream`] trait object, so the pipeline can be built over a
/// real [`Forwarder`] or a test double.
#[allow(clippy::module_name_repetitions)]
pub type DynUpstream = Arc<dyn Upstream + Send + Sync>;

/// Something that can answer a DNS query.
#[async_trait::async_trait]
pub trait Upstream {
    /// Resolves `request`, returning the first DNS-level answer obtained. Negative answers such
    /// as NXDOMAIN are answers, not errors.
    async fn lookup(&self, transport: Transport, request: &Message) -> Result<Message, Error>;
}

/// Forwards queries to a fixed list of upstream resolvers.
///
/// Servers are tried in configured order, each attempt bounded by its own timeout. A timeout or
/// connection failure moves on to the next server; the first server to produce any DNS answer
/// wins. A datagram answer with the truncation bit set is re-asked over TCP from the same server
/// and never returned as-is.
pub struct Forwarder {
    servers: Vec<SocketAddr>,
    timeout: Duration,
}

impl Forwarder {
    /// # Errors
    ///
    /// Returns [`Error::NoUpstreams`] if `servers` is empty.
    pub fn new(servers: Vec<SocketAddr>, timeout: Duration) -> Result<Self, Error> {
        if servers.is_empty() {
            return Err(Error::NoUpstreams);
        }
        Ok(Forwarder { servers, timeout })
    }

    async fn exchange(
        &self,
        transport: Transport,
        server: SocketAddr,
        request: &Message,
    ) -> Result<Message, Error> {
        if transport == Transport::Tcp {
            return self.exchange_tcp(server, request).await;
        }
        let response = self.exchange_udp(server, request).await?;
        if response.truncated() {
            debug!("truncated answer from {server}, retrying over TCP");
            return self.exchange_tcp(server, request).await;
        }
        Ok(response)
    }

    async fn exchange_udp(&self, server: SocketAddr, request: &Message) -> Result<Message, Error> {
        timeout(self.timeout, udp_round_trip(server, request))
            .await
            .map_err(|_| Error::UpstreamTimeout(server))?
    }

    async fn exchange_tcp(&self, server: SocketAddr, request: &Message) -> Result<Message, Error> {
        timeout(self.timeout, tcp_round_trip(server, request))
            .await
            .map_err(|_| Error::UpstreamTimeout(server))?
    }
}

async fn udp_round_trip(server: SocketAddr, request: &Message) -> Result<Message, Error> {
    let local: SocketAddr = match server {
        SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
    };
    let socket = UdpSocket::bind(local).await?;
    socket.connect(server).await?;
    socket.send(&request.to_vec()?).await?;

    let mut buf = vec![0u8; MAX_UDP_DNS_SIZE];
    // Stray or garbled datagrams don't end the attempt; only the timeout does.
    loop {
        let len = socket.recv(&mut buf).await?;
        match Message::from_vec(&buf[..len]) {
            Ok(response) if response.id() == request.id() => return Ok(response),
            Ok(response) => debug!("ignoring answer with id {} from {server}", response.id()),
            Err(err) => debug!("ignoring undecodable answer from {server}: {err}"),
        }
    }
}

async fn tcp_round_trip(server: SocketAddr, request: &Message) -> Result<Message, Error> {
    let wire = request.to_vec()?;
    let len = u16::try_from(wire.len()).map_err(|_| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "query exceeds 65535 bytes")
    })?;
    let mut framed = Vec::with_capacity(wire.len() + 2);
    framed.extend_from_slice(&len.to_be_bytes());
    framed.extend_from_slice(&wire);

    let mut stream = TcpStream::connect(server).await?;
    stream.write_all(&framed).await?;

    let mut len_buf = [0u8; 2];
    stream.read_exact(&mut len_buf).await?;
    let mut buf = vec![0u8; usize::from(u16::from_be_bytes(len_buf))];
    stream.read_exact(&mut buf).await?;

    let response = Message::from_vec(&buf)?;
    if response.id() != request.id() {
        return Err(Error::UpstreamIdMismatch(server));
    }
    Ok(response)
}

#[async_trait::async_trait]
impl Upstream for Forwarder {
    async fn lookup(&self, transport: Transport, request: &Message) -> Result<Message, Error> {
        for &server in &self.servers {
            match self.exchange(transport, server, request).await {
                Ok(response) => return Ok(response),
                Err(err) if err.is_transport() => warn!("upstream {server} failed: {err}"),
                Err(err) => return Err(err),
            }
        }
        Err(Error::UpstreamExhausted(self.servers.len()))
    }
}
