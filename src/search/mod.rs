//! Search module - Chinese full-text search over a key-value store / 搜索模块
//!
//! Components, leaves first / 组件：
//! - tokenizer: stop-word stripping and unigram tokenizing / 分词
//! - postings: token -> document score sets / 倒排表
//! - documents: document hashes and visit accounting / 文档存储
//! - writer: ingestion pipeline / 索引写入
//! - query: facet and scan retrieval / 查询
//! - analytics, status: maintenance jobs and reporting / 统计与状态
//!
//! Only two mutations race: the postings increment and the visit touch.
//! Both are single atomic store calls; nothing here holds local locks.

pub mod analytics;
pub mod documents;
pub mod engine;
pub mod fanout;
pub mod keys;
pub mod postings;
pub mod query;
pub mod status;
pub mod tokenizer;
pub mod writer;

pub use analytics::{Analytics, WordCount};
pub use documents::{Document, DocumentStore};
pub use engine::SearchEngine;
pub use keys::KeySpace;
pub use postings::{Posting, PostingsStore};
pub use query::{CheckResult, QueryExecutor, SearchHit, SearchMode, SearchRequest};
pub use status::{Status, StatusReporter, VisitedEntry};
pub use tokenizer::Normalizer;
pub use writer::{IndexWriter, IngestReport, IngestRecord, LineParser};
