//! Caching, filtering DNS forwarder.
//!
//! Every inbound query runs through the [`Handler`] pipeline in its own task:
//!
//! 1. Address-record queries (`A`/`AAAA` in class `IN`) are looked up in the positive cache. A
//!    hit is answered from a copy of the cached message carrying the client's id. A hit in the
//!    negative cache is answered with `SERVFAIL` without contacting any upstream.
//! 2. Address-record queries for a name in the [blocklist][crate::blocklist] get a single
//!    record pointing at [`Config::nullroute`][crate::config::Config::nullroute] (or
//!    [`Config::nullroute_v6`][crate::config::Config::nullroute_v6] for `AAAA`), with
//!    [`Config::ttl`][crate::config::Config::ttl]. The answer is cached like any other.
//! 3. Everything else is forwarded by the [`Forwarder`][resolver::Forwarder]. A transport
//!    failure on every upstream yields `SERVFAIL` and, for address-record queries, a negative
//!    cache marker. An answer with at least one record to an address-record query is cached.
//!
//! Other query types are never cached or blocked.
//!
//! E.g. with `"blocklist": ["ads.example.com"]` in the config:
//!
//! ```bash
//! ❯ dig @127.0.0.1 -p 5353 ads.example.com +short A
//! 0.0.0.0
//! ❯ dig @127.0.0.1 -p 5353 ads.example.com +short TXT
//! "whatever upstream says"
//! ```

mod handlers;
pub mod resolver;
pub mod server;

pub use handlers::Handler;
pub use server::new;
