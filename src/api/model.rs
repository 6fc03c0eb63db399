use crate::cache::ResponseCache;
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub(super) struct QuestionsParams {
    pub limit: Option<usize>,
}

#[derive(Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(super) struct CacheStats {
    pub size: usize,
    pub capacity: usize,
}

impl From<&ResponseCache> for CacheStats {
    fn from(cache: &ResponseCache) -> Self {
        CacheStats {
            size: cache.len(),
            capacity: cache.capacity(),
        }
    }
}

#[derive(Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(super) struct CacheReport {
    pub positive: CacheStats,
    pub negative: CacheStats,
}

#[derive(Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(super) struct BlocklistSize {
    pub size: usize,
}

#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub(super) struct BlockedName {
    pub name: String,
    pub blocked: bool,
}
