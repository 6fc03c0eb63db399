//! Normalized form of a DNS question, used as the cache key and as the question log payload.

use serde::Serialize;
use std::fmt;
use trust_dns_proto::op::Query;
use trust_dns_proto::rr::{DNSClass, RecordType};

/// The name/type/class triplet of a single DNS question.
///
/// The name keeps the client's case but never carries the root label's trailing dot, so
/// `example.com.` and `example.com` collapse to the same [`Question::key`].
#[derive(Serialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct Question {
    pub name: String,
    #[serde(rename = "type")]
    pub qtype: String,
    #[serde(rename = "class")]
    pub qclass: String,
}

/// Address family of an address-record query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    V4,
    V6,
}

impl AddressFamily {
    /// Classifies a question. Only `IN` class `A`/`AAAA` questions are address-record queries;
    /// everything else returns `None` and bypasses caching and blocking.
    #[must_use]
    pub fn of(query_type: RecordType, query_class: DNSClass) -> Option<Self> {
        if query_class != DNSClass::IN {
            return None;
        }
        match query_type {
            RecordType::A => Some(AddressFamily::V4),
            RecordType::AAAA => Some(AddressFamily::V6),
            _ => None,
        }
    }
}

impl Question {
    #[must_use]
    pub fn new(name: &str, query_type: RecordType, query_class: DNSClass) -> Self {
        Question {
            name: normalize(name).to_string(),
            qtype: query_type.to_string(),
            qclass: query_class.to_string(),
        }
    }

    /// Cache key for this question. Fields are space separated; none of them can contain a
    /// space, so distinct questions never share a key.
    #[must_use]
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl From<&Query> for Question {
    /// Keeps the name in its ASCII wire form; IDN labels stay punycode, as in list files.
    fn from(query: &Query) -> Self {
        Question::new(
            &query.name().to_ascii(),
            query.query_type(),
            query.query_class(),
        )
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.name, self.qclass, self.qtype)
    }
}

/// Strips the trailing root dot from a domain name, if present.
///
/// The root name itself (`.`) normalizes to the empty string.
#[must_use]
pub fn normalize(name: &str) -> &str {
    name.strip_suffix('.').unwrap_or(name)
}
