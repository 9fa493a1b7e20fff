//! Search engine - facade over every component / 搜索引擎
//!
//! Owns one backing-store handle and builds every component around it.
//! Nothing is global: tests build an engine over [`MemoryBackend`], the
//! service over [`RedisBackend`].

use std::path::Path;
use std::sync::Arc;

use tokio::io::AsyncBufRead;

use super::analytics::{Analytics, WordCount};
use super::documents::DocumentStore;
use super::keys::KeySpace;
use super::postings::PostingsStore;
use super::query::{CheckResult, QueryExecutor, SearchHit, SearchMode, SearchRequest};
use super::status::{Status, StatusReporter};
use super::tokenizer::Normalizer;
use super::writer::{IndexWriter, IngestReport};
use crate::config::{RedisConfig, SearchConfig};
use crate::error::{Result, SearchError};
use crate::store::{KvBackend, MemoryBackend, Record, RedisBackend};

/// Search engine / 搜索引擎
#[derive(Clone)]
pub struct SearchEngine {
    store: Arc<dyn KvBackend>,
    keys: KeySpace,
    documents: DocumentStore,
    postings: PostingsStore,
    writer: IndexWriter,
    query: QueryExecutor,
    analytics: Analytics,
    status: StatusReporter,
    max_find_return: usize,
}

impl SearchEngine {
    /// Build over an existing store / 基于已有存储创建
    pub fn new(store: Arc<dyn KvBackend>, config: &SearchConfig) -> Result<Self> {
        let normalizer = Normalizer::new(&config.stop_words)
            .map_err(|e| SearchError::InvalidInput(format!("stop word list: {}", e)))?;
        let normalizer = Arc::new(normalizer);
        let keys = KeySpace::new(&config.namespace);

        let documents = DocumentStore::new(store.clone(), keys.clone());
        let postings = PostingsStore::new(store.clone(), keys.clone());

        Ok(Self {
            writer: IndexWriter::new(documents.clone(), postings.clone(), normalizer.clone(), config),
            query: QueryExecutor::new(
                documents.clone(),
                postings.clone(),
                normalizer,
                config.max_find_return,
                config.max_in_flight,
                config.scan_batch,
            ),
            analytics: Analytics::new(
                store.clone(),
                keys.clone(),
                documents.clone(),
                postings.clone(),
                config.word_count_rebuild,
                config.scan_batch,
                config.max_in_flight,
            ),
            status: StatusReporter::new(
                store.clone(),
                documents.clone(),
                postings.clone(),
                config.max_stats_return,
                config.scan_batch,
                config.max_in_flight,
            ),
            store,
            keys,
            documents,
            postings,
            max_find_return: config.max_find_return,
        })
    }

    /// Connect to Redis and build / 连接 Redis 并创建
    pub async fn connect(redis: &RedisConfig, config: &SearchConfig) -> Result<Self> {
        let backend = RedisBackend::connect(redis).await?;
        Self::new(Arc::new(backend), config)
    }

    /// Engine over a fresh in-process store / 内存引擎
    pub fn in_memory(config: &SearchConfig) -> Result<Self> {
        Self::new(Arc::new(MemoryBackend::new()), config)
    }

    pub fn store(&self) -> &Arc<dyn KvBackend> {
        &self.store
    }

    pub fn keys(&self) -> &KeySpace {
        &self.keys
    }

    pub fn documents(&self) -> &DocumentStore {
        &self.documents
    }

    pub fn postings(&self) -> &PostingsStore {
        &self.postings
    }

    /// Search with the page size capped at `max_find_return` / 搜索
    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>> {
        let limit = request
            .limit
            .unwrap_or(self.max_find_return)
            .min(self.max_find_return);
        let request = SearchRequest {
            limit: Some(limit),
            ..request.clone()
        };
        self.query.search(&request).await
    }

    pub async fn check(&self, query: &str, mode: SearchMode) -> Result<CheckResult> {
        self.query.check(query, mode).await
    }

    pub async fn detail(&self, id: u64) -> Result<Record> {
        self.query.detail(id).await
    }

    pub async fn status(&self) -> Result<Status> {
        self.status.status().await
    }

    pub async fn rebuild_word_counts(&self) -> Result<u64> {
        self.analytics.rebuild_word_counts().await
    }

    pub async fn reset_visit_stats(&self) -> Result<u64> {
        self.analytics.reset_visit_stats().await
    }

    pub async fn top_words(&self, n: usize) -> Result<Vec<WordCount>> {
        self.analytics.top_words(n).await
    }

    pub async fn ingest_file(&self, path: &Path) -> Result<IngestReport> {
        self.writer.ingest_file(path).await
    }

    pub async fn ingest_lines<R: AsyncBufRead + Unpin>(&self, reader: R) -> Result<IngestReport> {
        self.writer.ingest_lines(reader).await
    }

    pub async fn ingest_texts<S: AsRef<str>>(&self, texts: &[S]) -> Result<IngestReport> {
        self.writer.ingest_texts(texts).await
    }
}
