//! Postings store / 倒排表
//!
//! One ranked set per token; members are document keys and scores are the
//! number of times the token occurred in that document at ingestion. Only
//! ever incremented.

use std::sync::Arc;

use serde::Serialize;

use super::keys::KeySpace;
use crate::error::Result;
use crate::store::{KeyCount, KvBackend};

/// One (document, score) entry of a token's postings / 倒排项
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Posting {
    pub doc_id: u64,
    pub doc_key: String,
    pub score: u64,
}

#[derive(Clone)]
pub struct PostingsStore {
    store: Arc<dyn KvBackend>,
    keys: KeySpace,
}

impl PostingsStore {
    pub fn new(store: Arc<dyn KvBackend>, keys: KeySpace) -> Self {
        Self { store, keys }
    }

    /// Atomically add 1 to `doc_id`'s score under `token` / 原子加一
    pub async fn increment(&self, token: &str, doc_id: u64) -> Result<u64> {
        let score = self
            .store
            .zincr(&self.keys.token(token), &self.keys.document(doc_id), 1.0)
            .await?;
        Ok(score.max(0.0) as u64)
    }

    /// Full postings of a token; an unknown token has none / 读取全部倒排项
    pub async fn read_all(&self, token: &str) -> Result<Vec<Posting>> {
        let members = self.store.zrange_with_scores(&self.keys.token(token)).await?;
        Ok(members
            .into_iter()
            .filter_map(|(doc_key, score)| match self.keys.document_id(&doc_key) {
                Some(doc_id) => Some(Posting {
                    doc_id,
                    doc_key,
                    score: score.max(0.0) as u64,
                }),
                None => {
                    tracing::warn!("Ignoring postings member {} under token {}", doc_key, token);
                    None
                }
            })
            .collect())
    }

    /// Sum of all scores of a token / 词元总分
    pub async fn sum_score(&self, token: &str) -> Result<u64> {
        let total = self.store.zsum(&self.keys.token(token)).await?;
        Ok(total.max(0.0).round() as u64)
    }

    /// Postings key count and footprint / 词元键数量与占用
    pub async fn count_keys(&self, batch: usize) -> Result<KeyCount> {
        Ok(self.store.count_keys(&self.keys.tokens_pattern(), batch).await?)
    }

    /// One cursor page of token names; a returned cursor of 0 ends the walk
    pub async fn scan_tokens(&self, cursor: u64, batch: usize) -> Result<(u64, Vec<String>)> {
        let (next, keys) = self.store.scan(&self.keys.tokens_pattern(), cursor, batch).await?;
        let tokens = keys
            .iter()
            .filter_map(|k| self.keys.token_of(k))
            .map(str::to_string)
            .collect();
        Ok((next, tokens))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryBackend;

    fn postings() -> (Arc<MemoryBackend>, PostingsStore) {
        let mem = Arc::new(MemoryBackend::new());
        let store = PostingsStore::new(mem.clone(), KeySpace::new("fts:test"));
        (mem, store)
    }

    #[tokio::test]
    async fn test_increment_and_read() {
        let (_, postings) = postings();
        assert_eq!(postings.increment("夏", 1).await.unwrap(), 1);
        assert_eq!(postings.increment("夏", 1).await.unwrap(), 2);
        postings.increment("夏", 2).await.unwrap();

        let mut read = postings.read_all("夏").await.unwrap();
        read.sort_by_key(|p| p.doc_id);
        assert_eq!(read.len(), 2);
        assert_eq!((read[0].doc_id, read[0].score), (1, 2));
        assert_eq!(read[0].doc_key, "fts:test:documents:1");
        assert_eq!((read[1].doc_id, read[1].score), (2, 1));
        assert_eq!(postings.sum_score("夏").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_unknown_token_is_empty() {
        let (_, postings) = postings();
        assert!(postings.read_all("冬").await.unwrap().is_empty());
        assert_eq!(postings.sum_score("冬").await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increments_are_not_lost() {
        let (_, postings) = postings();
        let handles: Vec<_> = (0..100)
            .map(|_| {
                let postings = postings.clone();
                tokio::spawn(async move { postings.increment("天", 7).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        let read = postings.read_all("天").await.unwrap();
        assert_eq!(read, vec![Posting {
            doc_id: 7,
            doc_key: "fts:test:documents:7".to_string(),
            score: 100,
        }]);
    }

    #[tokio::test]
    async fn test_scan_tokens_and_count() {
        let (_, postings) = postings();
        for token in ["夏", "天", "海"] {
            postings.increment(token, 1).await.unwrap();
        }
        let mut cursor = 0;
        let mut tokens = Vec::new();
        loop {
            let (next, page) = postings.scan_tokens(cursor, 2).await.unwrap();
            tokens.extend(page);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        tokens.sort();
        let mut expected = vec!["夏".to_string(), "天".to_string(), "海".to_string()];
        expected.sort();
        assert_eq!(tokens, expected);
        assert_eq!(postings.count_keys(10).await.unwrap().count, 3);
    }
}
