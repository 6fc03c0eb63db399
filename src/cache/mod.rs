//! Process-wide shared state consulted by the [query pipeline][crate::dns].
//!
//! There are four independent structures, each with its own lock:
//!
//! * two [`ResponseCache`] instances: the positive cache of full answers, and the negative
//!   cache of [`CachedResponse::Failed`] markers that lives half as long;
//! * the [`BlockCache`] of blocked names, replaced wholesale by the [blocklist][crate::blocklist]
//!   loader;
//! * the [`QuestionLog`] of recent queries, fed without waiting through a [`QuestionSink`].
//!
//! No operation ever needs to hold two of these locks at once.

pub mod block;
pub mod question_log;
pub mod response;

pub use block::BlockCache;
pub use question_log::{QuestionLog, QuestionLogEntry, QuestionSink};
pub use response::{CachedResponse, ResponseCache};

use crate::config::Config;
use std::sync::Arc;

/// Handles to every shared cache, cloned into the DNS handler and the admin API.
#[derive(Clone)]
pub struct Caches {
    pub positive: Arc<ResponseCache>,
    pub negative: Arc<ResponseCache>,
    pub blocked: Arc<BlockCache>,
    pub questions: Arc<QuestionLog>,
}

impl Caches {
    /// Empty caches sized and timed from `config`. The block cache starts empty until the first
    /// [`BlockCache::reload`].
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Caches {
            positive: Arc::new(ResponseCache::new(config.cache_capacity(), config.expire)),
            negative: Arc::new(ResponseCache::new(
                config.cache_capacity(),
                config.negative_expire(),
            )),
            blocked: Arc::new(BlockCache::default()),
            questions: Arc::new(QuestionLog::new(config.question_cache_cap)),
        }
    }
}
