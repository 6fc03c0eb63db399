use crate::cache::{Caches, QuestionSink};
use crate::config::SharedConfig;
use crate::dns::handlers::Handler;
use crate::dns::resolver::Forwarder;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, UdpSocket};
use trust_dns_server::ServerFuture;

/// Binds the configured UDP and TCP addresses and returns a server answering through a
/// [`Handler`] that forwards to the configured upstreams.
pub async fn new(
    config: SharedConfig,
    caches: &Caches,
    questions: QuestionSink,
) -> anyhow::Result<ServerFuture<Handler>> {
    let udp_addr = config.dns_udp_bind_addr;
    let tcp_addr = config.dns_tcp_bind_addr;
    let tcp_timeout = config.dns_tcp_timeout;
    let upstream = Forwarder::new(config.upstreams.clone(), config.upstream_timeout)?;
    let dns_handler = Handler::new(config, Arc::new(upstream), caches, questions);
    Ok(with_sockets(
        dns_handler,
        UdpSocket::bind(udp_addr).await?,
        TcpListener::bind(tcp_addr).await?,
        tcp_timeout,
    ))
}

/// Serves `handler` on already bound sockets.
#[must_use]
pub fn with_sockets(
    handler: Handler,
    udp: UdpSocket,
    tcp: TcpListener,
    tcp_timeout: Duration,
) -> ServerFuture<Handler> {
    let mut dns_server = ServerFuture::new(handler);
    dns_server.register_socket(udp);
    dns_server.register_listener(tcp, tcp_timeout);
    dns_server
}
