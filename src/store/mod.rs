//! Backing store abstraction / 后端存储抽象
//!
//! The engine only talks to the store through [`KvBackend`]. Two operations
//! are race-sensitive and must be single indivisible round trips on every
//! backend: [`KvBackend::zincr`] (postings increment) and
//! [`KvBackend::touch_visit`] (the three-field visit update). Everything else
//! is plain reads, overwrites, or cursor scans without snapshot isolation.

pub mod decode;
pub mod memory;
pub mod redis;
pub mod script;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use decode::{DecodeError, RawRow, Record};
pub use memory::MemoryBackend;
pub use self::redis::RedisBackend;

/// Store errors / 存储错误
#[derive(Debug, Error)]
pub enum StoreError {
    /// Connection refused, dropped, or timed out / 存储不可用
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// A server script is still missing after one re-registration / 脚本缺失
    #[error("server script {0} missing after re-registration")]
    ScriptMissing(String),
    /// Reply did not have the expected shape / 回复格式错误
    #[error("unexpected store reply: {0}")]
    Protocol(String),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl StoreError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Counters returned by an atomic visit touch / 访问计数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitCounters {
    pub visited: u64,
    pub update_ident: u64,
}

/// Key count and approximate footprint under a pattern / 键数量与占用
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyCount {
    pub count: u64,
    pub bytes: u64,
}

/// Server-side substring scan over hash records / 服务端子串扫描
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRequest {
    /// Key pattern, `prefix*` form
    pub pattern: String,
    /// Hash field tested for the substring
    pub test_field: String,
    /// Literal substring (no pattern semantics)
    pub needle: String,
    /// Matches to skip before collecting
    pub offset: usize,
    /// Maximum matches to return, `None` for all
    pub limit: Option<usize>,
    /// Fields to return; empty means every stored field
    pub fields: Vec<String>,
    /// SCAN COUNT hint
    pub batch: usize,
}

impl ScanRequest {
    pub fn new(pattern: impl Into<String>, test_field: impl Into<String>, needle: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            test_field: test_field.into(),
            needle: needle.into(),
            offset: 0,
            limit: None,
            fields: Vec::new(),
            batch: 100,
        }
    }

    pub fn with_page(mut self, offset: usize, limit: Option<usize>) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }

    pub fn with_fields(mut self, fields: Vec<String>) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_batch(mut self, batch: usize) -> Self {
        self.batch = batch.max(1);
        self
    }
}

/// Backing store primitives / 后端存储原语
///
/// Patterns are always of the form `prefix*`. Cursor `0` starts a scan and a
/// returned cursor of `0` ends it.
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Atomically increment an integer counter, returning the new value
    async fn incr(&self, key: &str) -> Result<u64, StoreError>;

    /// Atomically add `by` to `member`'s score in a ranked set, creating
    /// the set and the member when absent. Returns the new score.
    async fn zincr(&self, key: &str, member: &str, by: f64) -> Result<f64, StoreError>;

    /// Overwrite `member`'s score
    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), StoreError>;

    /// All members in ascending score order (ties by member)
    async fn zrange_with_scores(&self, key: &str) -> Result<Vec<(String, f64)>, StoreError>;

    /// Members `start..=stop` in descending score order
    async fn zrevrange_with_scores(
        &self,
        key: &str,
        start: usize,
        stop: usize,
    ) -> Result<Vec<(String, f64)>, StoreError>;

    async fn zcard(&self, key: &str) -> Result<u64, StoreError>;

    /// Sum of all scores of a ranked set, computed on the server
    async fn zsum(&self, key: &str) -> Result<f64, StoreError>;

    /// Delete a key, returning whether it existed
    async fn del(&self, key: &str) -> Result<bool, StoreError>;

    /// Atomically replace `to` with `from`
    async fn rename(&self, from: &str, to: &str) -> Result<(), StoreError>;

    async fn hset(&self, key: &str, fields: &[(String, String)]) -> Result<(), StoreError>;

    /// Whole hash; absent keys give an empty record
    async fn hgetall(&self, key: &str) -> Result<Record, StoreError>;

    /// Atomically `visited += 1`, `updatedAt = now`, `updateIdent += 1`.
    /// Returns `None` when the hash does not exist (nothing is created).
    async fn touch_visit(&self, key: &str, now: &str) -> Result<Option<VisitCounters>, StoreError>;

    /// One page of a cursor scan
    async fn scan(&self, pattern: &str, cursor: u64, count: usize) -> Result<(u64, Vec<String>), StoreError>;

    /// Filter hashes under a pattern by literal substring, with paging and
    /// projection applied on the server
    async fn scan_match(&self, request: &ScanRequest) -> Result<Vec<Record>, StoreError>;

    /// Number of keys under a pattern and their approximate footprint
    async fn count_keys(&self, pattern: &str, batch: usize) -> Result<KeyCount, StoreError>;

    /// Human-readable server version, e.g. `Redis 7.2.0`
    async fn server_version(&self) -> Result<String, StoreError>;
}
