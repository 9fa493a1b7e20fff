//! Analytics aggregator / 统计汇总
//!
//! Maintenance jobs that walk the whole keyspace. Not part of the online
//! query path; run them while no ingestion is in flight.

use std::sync::Arc;

use serde::Serialize;

use super::documents::DocumentStore;
use super::fanout::run_batch;
use super::keys::KeySpace;
use super::postings::PostingsStore;
use crate::config::RebuildMode;
use crate::error::Result;
use crate::store::KvBackend;

/// Corpus frequency of one token / 词频
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WordCount {
    pub word: String,
    pub count: u64,
}

#[derive(Clone)]
pub struct Analytics {
    store: Arc<dyn KvBackend>,
    keys: KeySpace,
    documents: DocumentStore,
    postings: PostingsStore,
    rebuild_mode: RebuildMode,
    scan_batch: usize,
    max_in_flight: usize,
}

impl Analytics {
    pub fn new(
        store: Arc<dyn KvBackend>,
        keys: KeySpace,
        documents: DocumentStore,
        postings: PostingsStore,
        rebuild_mode: RebuildMode,
        scan_batch: usize,
        max_in_flight: usize,
    ) -> Self {
        Self {
            store,
            keys,
            documents,
            postings,
            rebuild_mode,
            scan_batch,
            max_in_flight,
        }
    }

    /// Recompute token -> total score for every token / 重建词频
    ///
    /// `InPlace` clears the live set first, so readers can observe it half
    /// filled. `Staged` fills a side set and swaps it in with one rename.
    pub async fn rebuild_word_counts(&self) -> Result<u64> {
        let live = self.keys.word_counts();
        let target = match self.rebuild_mode {
            RebuildMode::InPlace => live.clone(),
            RebuildMode::Staged => self.keys.word_counts_staging(),
        };
        self.store.del(&target).await?;

        let mut written = 0u64;
        let mut cursor = 0;
        loop {
            let (next, tokens) = self.postings.scan_tokens(cursor, self.scan_batch).await?;

            let target = target.as_str();
            let sums = tokens.iter().map(|token| async move {
                let total = self.postings.sum_score(token).await?;
                self.store.zadd(target, token, total as f64).await?;
                Ok::<_, crate::error::SearchError>(())
            });
            for outcome in run_batch(sums, self.max_in_flight).await {
                outcome?;
                written += 1;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        if self.rebuild_mode == RebuildMode::Staged {
            if written > 0 {
                self.store.rename(&target, &live).await?;
            } else {
                self.store.del(&live).await?;
            }
        }

        tracing::info!("Rebuilt word counts for {} tokens", written);
        Ok(written)
    }

    /// Zero the visit fields of every document and drop the visited set / 重置访问统计
    pub async fn reset_visit_stats(&self) -> Result<u64> {
        let mut reset = 0u64;
        let mut cursor = 0;
        loop {
            let (next, keys) = self.documents.scan_keys(cursor, self.scan_batch).await?;

            let writes = keys.iter().map(|key| self.documents.reset_visit_key(key));
            for outcome in run_batch(writes, self.max_in_flight).await {
                outcome?;
                reset += 1;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        self.documents.clear_visited().await?;
        tracing::info!("Reset visit stats on {} documents", reset);
        Ok(reset)
    }

    /// Most frequent tokens from the last rebuild / 高频词
    pub async fn top_words(&self, n: usize) -> Result<Vec<WordCount>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let members = self
            .store
            .zrevrange_with_scores(&self.keys.word_counts(), 0, n - 1)
            .await?;
        Ok(members
            .into_iter()
            .map(|(word, count)| WordCount {
                word,
                count: count.max(0.0) as u64,
            })
            .collect())
    }
}
