//! Error types.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use trust_dns_proto::error::ProtoError;

/// Error enumerates the possible sinkhole error states.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Returned by [`ResponseCache::set`][crate::cache::ResponseCache::set] when asked to store an
    /// entry with a zero TTL. Every cache entry must be able to expire.
    #[error("cache TTL must be greater than zero")]
    ZeroTtl,

    /// Returned when a [`Forwarder`][crate::dns::resolver::Forwarder] is built without any
    /// upstream servers to try.
    #[error("no upstream servers configured")]
    NoUpstreams,

    /// Returned when a single upstream attempt doesn't complete within the configured
    /// [`Config::upstream_timeout`][crate::config::Config::upstream_timeout].
    #[error("upstream {0} timed out")]
    UpstreamTimeout(SocketAddr),

    /// Returned when an upstream answers with a message whose id doesn't match the query.
    #[error("upstream {0} answered with a mismatched id")]
    UpstreamIdMismatch(SocketAddr),

    /// Returned when every configured upstream failed at the transport level without producing
    /// any DNS answer.
    #[error("all {0} upstream servers failed")]
    UpstreamExhausted(usize),

    /// Returned when the [`Config::api_bind_addr`][`crate::config::Config::api_bind_addr`] is
    /// not a loopback address, or an address within a private network space. The admin API
    /// exposes client query history and must not be reachable from the public internet.
    #[error("API bind address ({0}) must be a loopback or private IP")]
    InsecureAPIBind(IpAddr),

    /// Returned when a config value is out of its accepted range.
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),

    /// Returned when a configured blocklist file can't be read.
    #[error("can't read blocklist {}", .0.display())]
    Blocklist(PathBuf, #[source] std::io::Error),

    /// Returned when a generic IO error occurs.
    #[error("an IO error occurred")]
    IO(#[from] std::io::Error),

    /// Returned when the config file holds invalid JSON.
    #[error("invalid JSON")]
    InvalidJSON(#[from] serde_json::Error),

    /// Returned when a DNS message can't be encoded or decoded.
    #[error("DNS error")]
    DNSError(#[from] ProtoError),
}

impl Error {
    /// Whether the error came from the network exchange with an upstream, as opposed to a local
    /// invariant. Only these advance the [`Forwarder`][crate::dns::resolver::Forwarder] to the
    /// next server.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::UpstreamTimeout(_)
                | Error::UpstreamIdMismatch(_)
                | Error::IO(_)
                | Error::DNSError(_)
        )
    }
}
