use crate::error::Error;
use ipnetwork::IpNetwork;
use lazy_static::lazy_static;
use serde::Deserialize;
use serde_with::{serde_as, DurationSeconds};
use std::fs::File;
use std::io::BufReader;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub type SharedConfig = Arc<Config>;

const DEFAULT_MAX_COUNT: usize = 10_000;

#[serde_as]
#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default = "default_dns_bind_addr")]
    pub dns_udp_bind_addr: SocketAddr,
    #[serde(default = "default_dns_bind_addr")]
    pub dns_tcp_bind_addr: SocketAddr,
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_dns_tcp_timeout")]
    pub dns_tcp_timeout: Duration,
    #[serde(default = "default_api_bind_addr")]
    pub api_bind_addr: SocketAddr,
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_api_timeout")]
    pub api_timeout: Duration,
    /// Upstream resolvers, tried in order.
    #[serde(default = "default_upstreams")]
    pub upstreams: Vec<SocketAddr>,
    /// Timeout of a single upstream attempt.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_upstream_timeout")]
    pub upstream_timeout: Duration,
    /// Lifetime of positive cache entries. Negative entries live half as long.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_expire")]
    pub expire: Duration,
    /// Capacity of each response cache. Zero selects the default.
    #[serde(default)]
    pub max_count: usize,
    #[serde(default = "default_question_cache_cap")]
    pub question_cache_cap: usize,
    /// TTL, in seconds, of the answer synthesized for a blocked name.
    #[serde(default = "default_ttl")]
    pub ttl: u32,
    #[serde(default = "default_nullroute")]
    pub nullroute: Ipv4Addr,
    #[serde(default = "default_nullroute_v6")]
    pub nullroute_v6: Ipv6Addr,
    /// Local list files, bare domains or hosts format.
    #[serde(default)]
    pub blocklists: Vec<PathBuf>,
    /// Names always blocked, on top of the list files.
    #[serde(default)]
    pub blocklist: Vec<String>,
    /// Names never blocked, even if a list file contains them.
    #[serde(default)]
    pub whitelist: Vec<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

lazy_static! {
    // NOTE(XXX): Once the "ip" feature has stabilized we can use Ipv6Addr.is_unique_local[0].
    //            Presently this feature is unstable so we home-roll. See also RFC 4193[1].
    // [0]: https://doc.rust-lang.org/std/net/struct.Ipv6Addr.html#method.is_unique_local
    // [1]: https://www.rfc-editor.org/rfc/rfc4193.html
    static ref IPV6_UNIQUE_LOCAL_NETWORK: IpNetwork = IpNetwork::from_str("fc00::/7").unwrap();
}

fn default_dns_bind_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, 5353))
}

fn default_dns_tcp_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_api_bind_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, 8080))
}

fn default_api_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_upstreams() -> Vec<SocketAddr> {
    vec![
        SocketAddr::from((Ipv4Addr::new(8, 8, 8, 8), 53)),
        SocketAddr::from((Ipv4Addr::new(8, 8, 4, 4), 53)),
    ]
}

fn default_upstream_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_expire() -> Duration {
    Duration::from_secs(600)
}

fn default_question_cache_cap() -> usize {
    5000
}

fn default_ttl() -> u32 {
    600
}

fn default_nullroute() -> Ipv4Addr {
    Ipv4Addr::UNSPECIFIED
}

fn default_nullroute_v6() -> Ipv6Addr {
    Ipv6Addr::UNSPECIFIED
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            dns_udp_bind_addr: default_dns_bind_addr(),
            dns_tcp_bind_addr: default_dns_bind_addr(),
            dns_tcp_timeout: default_dns_tcp_timeout(),
            api_bind_addr: default_api_bind_addr(),
            api_timeout: default_api_timeout(),
            upstreams: default_upstreams(),
            upstream_timeout: default_upstream_timeout(),
            expire: default_expire(),
            max_count: 0,
            question_cache_cap: default_question_cache_cap(),
            ttl: default_ttl(),
            nullroute: default_nullroute(),
            nullroute_v6: default_nullroute_v6(),
            blocklists: Vec::new(),
            blocklist: Vec::new(),
            whitelist: Vec::new(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    pub fn try_from_file(p: impl AsRef<Path>) -> Result<Self, Error> {
        let f = File::open(p)?;
        let reader = BufReader::new(f);
        let conf: Config = serde_json::from_reader(reader)?;
        conf.validate()?;
        Ok(conf)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.upstreams.is_empty() {
            return Err(Error::NoUpstreams);
        }
        if self.upstream_timeout.is_zero() {
            return Err(Error::InvalidConfig("upstream_timeout must be greater than 0"));
        }
        if self.expire < Duration::from_secs(2) {
            return Err(Error::InvalidConfig("expire must be at least 2 seconds"));
        }
        if self.ttl == 0 {
            return Err(Error::InvalidConfig("ttl must be greater than 0"));
        }
        if self.question_cache_cap == 0 {
            return Err(Error::InvalidConfig(
                "question_cache_cap must be greater than 0",
            ));
        }
        self.bind_addr_is_secure()
    }

    /// Capacity of each response cache.
    #[must_use]
    pub fn cache_capacity(&self) -> usize {
        match self.max_count {
            0 => DEFAULT_MAX_COUNT,
            n => n,
        }
    }

    /// Lifetime of negative cache markers.
    #[must_use]
    pub fn negative_expire(&self) -> Duration {
        self.expire / 2
    }

    /// Lifetime of a synthesized block answer in the positive cache.
    #[must_use]
    pub fn block_expire(&self) -> Duration {
        Duration::from_secs(u64::from(self.ttl))
    }

    fn bind_addr_is_secure(&self) -> Result<(), Error> {
        match self.api_bind_addr {
            SocketAddr::V4(v4_addr) => {
                let ip = v4_addr.ip();
                if !ip.is_loopback() && !ip.is_private() {
                    return Err(Error::InsecureAPIBind(IpAddr::V4(*ip)));
                }
                Ok(())
            }
            SocketAddr::V6(v6_addr) => {
                let ip = v6_addr.ip();
                if !ip.is_loopback() && !IPV6_UNIQUE_LOCAL_NETWORK.contains(IpAddr::V6(*ip)) {
                    return Err(Error::InsecureAPIBind(IpAddr::V6(*ip)));
                }
                Ok(())
            }
        }
    }
}
