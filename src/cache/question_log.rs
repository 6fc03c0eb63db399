use crate::question::Question;
use serde::Serialize;
use std::collections::VecDeque;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tracing::trace;

/// One inbound query as seen by the pipeline.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct QuestionLogEntry {
    /// Unix timestamp, seconds.
    pub date: i64,
    #[serde(rename = "client")]
    pub remote: IpAddr,
    pub blocked: bool,
    #[serde(rename = "query")]
    pub question: Question,
}

impl QuestionLogEntry {
    #[must_use]
    pub fn now(remote: IpAddr, question: Question, blocked: bool) -> Self {
        QuestionLogEntry {
            date: OffsetDateTime::now_utc().unix_timestamp(),
            remote,
            blocked,
            question,
        }
    }
}

/// Fixed-size ring of recent queries. Once full, each new entry displaces the oldest.
pub struct QuestionLog {
    entries: Mutex<VecDeque<QuestionLogEntry>>,
    capacity: usize,
}

impl QuestionLog {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        QuestionLog {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn add(&self, entry: QuestionLogEntry) {
        let mut entries = self.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// The most recent `limit` entries (all of them when `None`), oldest first.
    #[must_use]
    pub fn recent(&self, limit: Option<usize>) -> Vec<QuestionLogEntry> {
        let entries = self.lock();
        let skip = limit.map_or(0, |limit| entries.len().saturating_sub(limit));
        entries.iter().skip(skip).cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<QuestionLogEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Fire-and-forget handle for appending to a [`QuestionLog`] from the query path.
///
/// Entries go through a bounded channel drained by a background task. [`QuestionSink::record`]
/// never waits: with the channel full or the consumer gone the entry is dropped. There is no
/// backpressure and no delivery guarantee.
#[derive(Clone)]
pub struct QuestionSink {
    tx: mpsc::Sender<QuestionLogEntry>,
}

impl QuestionSink {
    #[must_use]
    pub fn new(tx: mpsc::Sender<QuestionLogEntry>) -> Self {
        QuestionSink { tx }
    }

    /// Spawns the consumer task that appends to `log` and returns the sink feeding it. Must be
    /// called from within a tokio runtime.
    #[must_use]
    pub fn spawn(log: Arc<QuestionLog>, depth: usize) -> Self {
        let (tx, mut rx) = mpsc::channel(depth.max(1));
        tokio::spawn(async move {
            while let Some(entry) = rx.recv().await {
                log.add(entry);
            }
        });
        QuestionSink::new(tx)
    }

    pub fn record(&self, entry: QuestionLogEntry) {
        if let Err(err) = self.tx.try_send(entry) {
            trace!("question log entry dropped: {err}");
        }
    }
}
