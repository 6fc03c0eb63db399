//! Bounded, expiring cache of DNS responses keyed by [`Question::key`][crate::question::Question::key].

use crate::error::Error;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use trust_dns_proto::op::Message;

/// A cached outcome for a question.
#[derive(Debug, Clone)]
pub enum CachedResponse {
    /// A complete response message. Callers get their own copy and rewrite its id.
    Answer(Message),
    /// Marker that resolving this question recently failed.
    Failed,
}

struct Entry {
    response: CachedResponse,
    expires_at: Instant,
    seq: u64,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    // Insertion order for FIFO eviction. Items whose seq no longer matches the live entry are
    // stale and skipped.
    order: VecDeque<(String, u64)>,
    next_seq: u64,
}

impl Inner {
    fn evict_oldest(&mut self) -> bool {
        while let Some((key, seq)) = self.order.pop_front() {
            if self.entries.get(&key).map(|e| e.seq) == Some(seq) {
                self.entries.remove(&key);
                return true;
            }
        }
        false
    }

    fn compact(&mut self) {
        let entries = &self.entries;
        self.order
            .retain(|(key, seq)| entries.get(key).map(|e| e.seq) == Some(*seq));
    }
}

/// A response cache with per-entry expiry and a hard capacity bound.
///
/// One mutex guards the whole map; every critical section is a hash lookup or insert, nothing
/// awaits while holding it. When full, inserting a new key evicts the oldest inserted key
/// (FIFO). Overwriting an existing key refreshes its expiry but keeps its eviction position.
pub struct ResponseCache {
    inner: Mutex<Inner>,
    capacity: usize,
    ttl: Duration,
}

impl ResponseCache {
    /// Creates a cache holding at most `capacity` entries (at least one), whose default entry
    /// lifetime is `ttl`.
    #[must_use]
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        ResponseCache {
            inner: Mutex::new(Inner::default()),
            capacity: capacity.max(1),
            ttl,
        }
    }

    /// The default lifetime of entries in this cache.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of stored entries, including expired ones not yet purged.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a copy of the entry for `key` if it's present and not expired. An expired entry
    /// is removed on the way out.
    pub fn get(&self, key: &str) -> Option<CachedResponse> {
        let now = Instant::now();
        let mut inner = self.lock();
        match inner.entries.get(key) {
            Some(entry) if now < entry.expires_at => Some(entry.response.clone()),
            Some(_) => {
                inner.entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Stores `response` under `key` until `ttl` from now.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ZeroTtl`] if `ttl` is zero. Capacity never causes an error; the oldest
    /// entry is evicted instead.
    pub fn set(&self, key: &str, response: CachedResponse, ttl: Duration) -> Result<(), Error> {
        if ttl.is_zero() {
            return Err(Error::ZeroTtl);
        }
        let expires_at = Instant::now() + ttl;
        let mut inner = self.lock();

        if let Some(entry) = inner.entries.get_mut(key) {
            entry.response = response;
            entry.expires_at = expires_at;
            return Ok(());
        }

        while inner.entries.len() >= self.capacity && inner.evict_oldest() {}
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.entries.insert(
            key.to_string(),
            Entry {
                response,
                expires_at,
                seq,
            },
        );
        inner.order.push_back((key.to_string(), seq));
        if inner.order.len() > self.capacity * 2 {
            inner.compact();
        }
        Ok(())
    }

    /// Drops every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.lock();
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| now < entry.expires_at);
        before - inner.entries.len()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trust_dns_proto::op::{MessageType, OpCode, ResponseCode};

    fn create_response(id: u16) -> Message {
        let mut msg = Message::new();
        msg.set_id(id)
            .set_message_type(MessageType::Response)
            .set_op_code(OpCode::Query)
            .set_response_code(ResponseCode::NoError);
        msg
    }

    fn answer_id(cached: Option<CachedResponse>) -> Option<u16> {
        match cached {
            Some(CachedResponse::Answer(msg)) => Some(msg.id()),
            _ => None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn set_then_get_returns_entry_until_expiry() {
        let cache = ResponseCache::new(10, Duration::from_secs(60));
        cache
            .set("a IN A", CachedResponse::Answer(create_response(7)), cache.ttl())
            .unwrap();

        assert_eq!(answer_id(cache.get("a IN A")), Some(7));

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(answer_id(cache.get("a IN A")), Some(7));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get("a IN A").is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn get_returns_copy_not_shared_entry() {
        let cache = ResponseCache::new(10, Duration::from_secs(60));
        cache
            .set("a IN A", CachedResponse::Answer(create_response(1)), cache.ttl())
            .unwrap();

        if let Some(CachedResponse::Answer(mut msg)) = cache.get("a IN A") {
            msg.set_id(999);
        }

        assert_eq!(answer_id(cache.get("a IN A")), Some(1));
    }

    #[tokio::test]
    async fn zero_ttl_is_rejected() {
        let cache = ResponseCache::new(10, Duration::from_secs(60));
        let res = cache.set("a IN A", CachedResponse::Failed, Duration::ZERO);

        assert!(matches!(res, Err(Error::ZeroTtl)));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn failed_marker_is_stored() {
        let cache = ResponseCache::new(10, Duration::from_secs(30));
        cache
            .set("a IN A", CachedResponse::Failed, cache.ttl())
            .unwrap();

        assert!(matches!(cache.get("a IN A"), Some(CachedResponse::Failed)));
    }

    #[tokio::test]
    async fn capacity_two_evicts_on_third_insert() {
        let cache = ResponseCache::new(2, Duration::from_secs(60));
        for (id, key) in ["A", "B", "C"].iter().enumerate() {
            cache
                .set(key, CachedResponse::Answer(create_response(id as u16)), cache.ttl())
                .unwrap();
        }

        assert_eq!(cache.len(), 2);
        assert!(cache.get("A").is_none() || cache.get("B").is_none());
        assert!(cache.get("C").is_some());
    }

    #[tokio::test]
    async fn eviction_is_fifo() {
        let cache = ResponseCache::new(2, Duration::from_secs(60));
        cache.set("A", CachedResponse::Failed, cache.ttl()).unwrap();
        cache.set("B", CachedResponse::Failed, cache.ttl()).unwrap();
        // Overwriting keeps A's position at the front.
        cache.set("A", CachedResponse::Failed, cache.ttl()).unwrap();
        cache.set("C", CachedResponse::Failed, cache.ttl()).unwrap();

        assert!(cache.get("A").is_none());
        assert!(cache.get("B").is_some());
        assert!(cache.get("C").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn size_never_exceeds_capacity() {
        let cache = ResponseCache::new(16, Duration::from_secs(5));
        for i in 0..500u32 {
            let key = format!("host{} IN A", i % 40);
            cache.set(&key, CachedResponse::Failed, cache.ttl()).unwrap();
            if i % 7 == 0 {
                tokio::time::advance(Duration::from_secs(1)).await;
                let _ = cache.get(&format!("host{} IN A", (i + 3) % 40));
            }
            assert!(cache.len() <= cache.capacity());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn purge_expired_removes_only_stale_entries() {
        let cache = ResponseCache::new(10, Duration::from_secs(60));
        cache
            .set("old", CachedResponse::Failed, Duration::from_secs(1))
            .unwrap();
        cache
            .set("new", CachedResponse::Failed, Duration::from_secs(60))
            .unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("new").is_some());
    }
}
