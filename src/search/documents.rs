//! Document store / 文档存储
//!
//! Each document is one hash under `<ns>:documents:<id>`. After creation only
//! the visit fields change, through the atomic visit touch or a bulk reset.

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::keys::KeySpace;
use crate::error::Result;
use crate::store::decode::{self, DecodeError};
use crate::store::{KeyCount, KvBackend, Record, ScanRequest, VisitCounters};

/// Stored field names / 字段名
pub mod fields {
    pub const ID: &str = "id";
    pub const KEY: &str = "key";
    pub const TEXT: &str = "textChi";
    pub const VISITED: &str = "visited";
    pub const CREATED_AT: &str = "createdAt";
    pub const UPDATED_AT: &str = "updatedAt";
    pub const UPDATE_IDENT: &str = "updateIdent";
}

/// Current time as stored in records, e.g. `2025-07-07T03:53:41.228Z`
pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Document record / 文档记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key: String,
    pub text_chi: String,
    pub visited: u64,
    pub created_at: String,
    pub updated_at: String,
    pub update_ident: u64,
}

impl Document {
    /// Fresh, never-visited document / 新文档
    pub fn new(id: u64, key: impl Into<String>, text: impl Into<String>, created_at: impl Into<String>) -> Self {
        Self {
            id,
            key: key.into(),
            text_chi: text.into(),
            visited: 0,
            created_at: created_at.into(),
            updated_at: String::new(),
            update_ident: 0,
        }
    }

    /// Hash fields in storage form; an empty key is not written
    pub fn to_fields(&self) -> Vec<(String, String)> {
        let mut out = vec![(fields::ID.to_string(), self.id.to_string())];
        if !self.key.is_empty() {
            out.push((fields::KEY.to_string(), self.key.clone()));
        }
        out.extend([
            (fields::TEXT.to_string(), self.text_chi.clone()),
            (fields::VISITED.to_string(), self.visited.to_string()),
            (fields::CREATED_AT.to_string(), self.created_at.clone()),
            (fields::UPDATED_AT.to_string(), self.updated_at.clone()),
            (fields::UPDATE_IDENT.to_string(), self.update_ident.to_string()),
        ]);
        out
    }

    pub fn from_record(record: &Record) -> std::result::Result<Self, DecodeError> {
        let text = |f: &str| record.get(f).cloned().unwrap_or_default();
        Ok(Self {
            id: decode::integer_field(record, fields::ID)?,
            key: text(fields::KEY),
            text_chi: text(fields::TEXT),
            visited: decode::integer_field(record, fields::VISITED)?,
            created_at: text(fields::CREATED_AT),
            updated_at: text(fields::UPDATED_AT),
            update_ident: decode::integer_field(record, fields::UPDATE_IDENT)?,
        })
    }
}

#[derive(Clone)]
pub struct DocumentStore {
    store: Arc<dyn KvBackend>,
    keys: KeySpace,
}

impl DocumentStore {
    pub fn new(store: Arc<dyn KvBackend>, keys: KeySpace) -> Self {
        Self { store, keys }
    }

    /// Next id from the persistent sequence / 下一个文档 id
    pub async fn next_id(&self) -> Result<u64> {
        Ok(self.store.incr(&self.keys.sequence()).await?)
    }

    /// Write the full record / 写入文档
    pub async fn create(&self, doc: &Document) -> Result<()> {
        self.store.hset(&self.keys.document(doc.id), &doc.to_fields()).await?;
        Ok(())
    }

    /// Raw record, `None` when absent / 读取记录
    pub async fn get(&self, id: u64) -> Result<Option<Record>> {
        let record = self.store.hgetall(&self.keys.document(id)).await?;
        Ok(if record.is_empty() { None } else { Some(record) })
    }

    /// Typed record / 读取文档
    pub async fn document(&self, id: u64) -> Result<Option<Document>> {
        match self.get(id).await? {
            Some(record) => Ok(Some(Document::from_record(&record)?)),
            None => Ok(None),
        }
    }

    /// Atomic `visited++, updatedAt = now, updateIdent++` / 原子访问计数
    pub async fn touch_visit(&self, id: u64) -> Result<Option<VisitCounters>> {
        Ok(self
            .store
            .touch_visit(&self.keys.document(id), &timestamp())
            .await?)
    }

    /// Add 1 to the document's weight in the visited set / 访问权重加一
    pub async fn bump_visited(&self, id: u64) -> Result<u64> {
        let weight = self
            .store
            .zincr(&self.keys.visited(), &self.keys.document(id), 1.0)
            .await?;
        Ok(weight.max(0.0) as u64)
    }

    /// Most visited documents first, at most `n` / 访问最多的文档
    pub async fn visited_top(&self, n: usize) -> Result<Vec<(u64, u64)>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let members = self
            .store
            .zrevrange_with_scores(&self.keys.visited(), 0, n - 1)
            .await?;
        Ok(members
            .into_iter()
            .filter_map(|(key, weight)| Some((self.keys.document_id(&key)?, weight.max(0.0) as u64)))
            .collect())
    }

    /// Touch the record and, only if it still exists, bump its visited weight
    pub async fn record_visit(&self, id: u64) -> Result<Option<VisitCounters>> {
        let touched = self.touch_visit(id).await?;
        if touched.is_some() {
            self.bump_visited(id).await?;
        }
        Ok(touched)
    }

    pub async fn visited_count(&self) -> Result<u64> {
        Ok(self.store.zcard(&self.keys.visited()).await?)
    }

    pub async fn clear_visited(&self) -> Result<bool> {
        Ok(self.store.del(&self.keys.visited()).await?)
    }

    /// Force the visit fields back to their initial values / 重置访问字段
    pub async fn reset_visit_key(&self, key: &str) -> Result<()> {
        let reset = [
            (fields::VISITED.to_string(), "0".to_string()),
            (fields::UPDATED_AT.to_string(), String::new()),
            (fields::UPDATE_IDENT.to_string(), "0".to_string()),
        ];
        self.store.hset(key, &reset).await?;
        Ok(())
    }

    /// Literal substring filter over every document / 子串扫描
    pub async fn scan(
        &self,
        test_field: &str,
        needle: &str,
        offset: usize,
        limit: Option<usize>,
        return_fields: &[String],
        batch: usize,
    ) -> Result<Vec<Record>> {
        let request = ScanRequest::new(self.keys.documents_pattern(), test_field, needle)
            .with_page(offset, limit)
            .with_fields(return_fields.to_vec())
            .with_batch(batch);
        Ok(self.store.scan_match(&request).await?)
    }

    /// One cursor page of document keys / 文档键分页
    pub async fn scan_keys(&self, cursor: u64, batch: usize) -> Result<(u64, Vec<String>)> {
        Ok(self
            .store
            .scan(&self.keys.documents_pattern(), cursor, batch)
            .await?)
    }

    pub async fn count_keys(&self, batch: usize) -> Result<KeyCount> {
        Ok(self
            .store
            .count_keys(&self.keys.documents_pattern(), batch)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryBackend;

    fn documents() -> DocumentStore {
        DocumentStore::new(Arc::new(MemoryBackend::new()), KeySpace::new("fts:test"))
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let docs = documents();
        let id = docs.next_id().await.unwrap();
        assert_eq!(id, 1);
        let doc = Document::new(id, "夏天", "夏天<br />夏季", timestamp());
        docs.create(&doc).await.unwrap();

        let record = docs.get(id).await.unwrap().unwrap();
        assert_eq!(record.get(fields::UPDATED_AT).map(String::as_str), Some(""));
        assert_eq!(record.get(fields::VISITED).map(String::as_str), Some("0"));
        assert_eq!(docs.document(id).await.unwrap(), Some(doc));
        assert_eq!(docs.get(99).await.unwrap(), None);
        assert_eq!(docs.next_id().await.unwrap(), 2);
    }

    #[test]
    fn test_timestamp_shape() {
        let ts = timestamp();
        assert!(ts.ends_with('Z'));
        assert_eq!(ts.len(), "2025-07-07T03:53:41.228Z".len());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_touches_are_not_lost() {
        let docs = documents();
        docs.create(&Document::new(5, "", "海灘", timestamp())).await.unwrap();

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let docs = docs.clone();
                tokio::spawn(async move { docs.touch_visit(5).await })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap().unwrap().is_some());
        }

        let doc = docs.document(5).await.unwrap().unwrap();
        assert_eq!(doc.visited, 50);
        assert_eq!(doc.update_ident, 50);
        assert!(!doc.updated_at.is_empty());
    }

    #[tokio::test]
    async fn test_touch_missing_document_creates_nothing() {
        let docs = documents();
        assert_eq!(docs.touch_visit(3).await.unwrap(), None);
        assert_eq!(docs.get(3).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_record_visit_skips_vanished_document() {
        let docs = documents();
        assert_eq!(docs.record_visit(8).await.unwrap(), None);
        assert_eq!(docs.visited_count().await.unwrap(), 0);

        docs.create(&Document::new(8, "", "微風", timestamp())).await.unwrap();
        let counters = docs.record_visit(8).await.unwrap().unwrap();
        assert_eq!((counters.visited, counters.update_ident), (1, 1));
        assert_eq!(docs.visited_top(5).await.unwrap(), vec![(8, 1)]);
    }

    #[tokio::test]
    async fn test_visited_ranking() {
        let docs = documents();
        docs.bump_visited(1).await.unwrap();
        docs.bump_visited(2).await.unwrap();
        docs.bump_visited(2).await.unwrap();
        assert_eq!(docs.visited_top(10).await.unwrap(), vec![(2, 2), (1, 1)]);
        assert_eq!(docs.visited_top(1).await.unwrap(), vec![(2, 2)]);
        assert!(docs.visited_top(0).await.unwrap().is_empty());
        assert_eq!(docs.visited_count().await.unwrap(), 2);
        assert!(docs.clear_visited().await.unwrap());
        assert_eq!(docs.visited_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_scan_projects_fields() {
        let docs = documents();
        docs.create(&Document::new(1, "", "夏天的海灘", timestamp())).await.unwrap();
        docs.create(&Document::new(2, "", "夏天的微風", timestamp())).await.unwrap();

        let hits = docs
            .scan(fields::TEXT, "海灘", 0, None, &[fields::ID.to_string()], 100)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].get(fields::ID).map(String::as_str), Some("1"));
        assert_eq!(hits[0].len(), 1);
    }
}
