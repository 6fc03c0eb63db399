//! Builds the set of blocked names fed to [`BlockCache::reload`][crate::cache::BlockCache::reload].
//!
//! List files are local and line oriented. A line is either a bare domain:
//!
//! ```text
//! ads.example.com
//! ```
//!
//! or a hosts file entry pointing one or more names at a sink address:
//!
//! ```text
//! 0.0.0.0 ads.example.com tracker.example.com
//! 127.0.0.1 bad-site.org  # inline comment
//! ```
//!
//! `#` starts a comment. Hosts entries for other addresses, system names such as `localhost`,
//! and tokens that look like IP addresses are skipped. Names are stored without the trailing dot
//! and lower-cased.

use crate::config::Config;
use crate::error::Error;
use crate::question::normalize;
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

const IGNORED_NAMES: &[&str] = &[
    "localhost",
    "localhost.localdomain",
    "local",
    "broadcasthost",
    "ip6-localhost",
    "ip6-loopback",
    "ip6-localnet",
    "ip6-mcastprefix",
    "ip6-allnodes",
    "ip6-allrouters",
    "ip6-allhosts",
];

const SINK_ADDRS: &[&str] = &["0.0.0.0", "127.0.0.1", "::", "::1"];

/// Loads every configured list file, adds the config's `blocklist` names and removes its
/// `whitelist` names.
///
/// # Errors
///
/// Returns [`Error::Blocklist`] for the first list file that can't be read.
pub async fn load(config: &Config) -> Result<HashSet<String>, Error> {
    let mut domains = HashSet::new();
    for path in &config.blocklists {
        let before = domains.len();
        read_file(path, &mut domains).await?;
        debug!(
            "read {} new names from {}",
            domains.len() - before,
            path.display()
        );
    }
    domains.extend(config.blocklist.iter().filter_map(|n| canonical(n)));
    for name in config.whitelist.iter().filter_map(|n| canonical(n)) {
        domains.remove(&name);
    }
    Ok(domains)
}

async fn read_file(path: &Path, domains: &mut HashSet<String>) -> Result<(), Error> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|err| Error::Blocklist(path.to_path_buf(), err))?;
    parse(&contents, domains);
    Ok(())
}

/// Adds the names listed in `contents` to `domains`.
pub fn parse(contents: &str, domains: &mut HashSet<String>) {
    for line in contents.lines() {
        let line = line.split('#').next().unwrap_or_default().trim();
        let mut tokens = line.split_whitespace();
        let Some(first) = tokens.next() else {
            continue;
        };
        let names: Vec<&str> = tokens.collect();
        if names.is_empty() {
            domains.extend(canonical(first));
        } else if SINK_ADDRS.contains(&first) {
            domains.extend(names.into_iter().filter_map(canonical));
        }
    }
}

fn canonical(name: &str) -> Option<String> {
    let name = normalize(name.trim()).to_ascii_lowercase();
    if name.is_empty() || IGNORED_NAMES.contains(&name.as_str()) || is_ip_like(&name) {
        return None;
    }
    Some(name)
}

fn is_ip_like(s: &str) -> bool {
    s.contains(':') || (s.contains('.') && s.split('.').all(|p| p.parse::<u8>().is_ok()))
}
