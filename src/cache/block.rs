use crate::question::normalize;
use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

/// Set of blocked domain names.
///
/// Matching is exact on the normalized, lower-cased name; subdomains only match if the list
/// builder put them in the set. The backing set is immutable once published: [`BlockCache::reload`]
/// swaps in a whole new set, so a reader sees either the old list or the new one.
#[derive(Default)]
pub struct BlockCache {
    domains: RwLock<Arc<HashSet<String>>>,
}

impl BlockCache {
    #[must_use]
    pub fn new(domains: HashSet<String>) -> Self {
        BlockCache {
            domains: RwLock::new(Arc::new(domains)),
        }
    }

    /// Whether `name` is blocked. A trailing root dot and letter case are ignored.
    #[must_use]
    pub fn exists(&self, name: &str) -> bool {
        let name = normalize(name);
        let domains = self.snapshot();
        if name.bytes().any(|b| b.is_ascii_uppercase()) {
            domains.contains(&name.to_ascii_lowercase())
        } else {
            domains.contains(name)
        }
    }

    /// Replaces the whole set. Names must already be normalized and lower-cased.
    pub fn reload(&self, domains: HashSet<String>) {
        let domains = Arc::new(domains);
        *self
            .domains
            .write()
            .unwrap_or_else(PoisonError::into_inner) = domains;
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Arc<HashSet<String>> {
        Arc::clone(&self.domains.read().unwrap_or_else(PoisonError::into_inner))
    }
}
