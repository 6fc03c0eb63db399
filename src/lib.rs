//! Sinkhole
//!
//! A small caching DNS forwarder that answers queries for blocked names with a null route.
//!
//! Queries are served over UDP and TCP, forwarded to a list of upstream resolvers, and answers to
//! address-record questions are cached for a bounded time. A loopback-only admin API reports
//! cache sizes and recent questions, and reloads the [blocklist] without a restart.
//!
#![warn(clippy::pedantic)]

pub mod api;
pub mod blocklist;
pub mod cache;
pub mod config;
pub mod dns;
pub mod error;
pub mod question;

pub use api::new as new_http;
pub use cache::Caches;
pub use config::{Config, SharedConfig};
pub use dns::new as new_dns;
