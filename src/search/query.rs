//! Query executor / 查询执行
//!
//! Two retrieval modes / 两种检索方式：
//! - Facet: query tokens are looked up in the postings, per-document scores
//!   are summed across every matched token (union), best first. Every
//!   document on the returned page gets a visit touch and a visited-set bump.
//! - Scan: literal substring filter over every document, no scoring and no
//!   side effects.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::documents::{fields, DocumentStore};
use super::fanout::run_batch;
use super::postings::{Posting, PostingsStore};
use super::tokenizer::Normalizer;
use crate::error::Result;
use crate::store::decode;
use crate::store::Record;

/// Retrieval mode / 检索方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    #[default]
    Facet,
    Scan,
}

/// Search request / 搜索请求
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchRequest {
    pub query: String,
    pub mode: SearchMode,
    pub offset: usize,
    /// Page size; `None` uses the executor default
    pub limit: Option<usize>,
    /// Fields to return; empty returns every stored field
    pub fields: Vec<String>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, mode: SearchMode) -> Self {
        Self {
            query: query.into(),
            mode,
            ..Self::default()
        }
    }

    pub fn page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = Some(limit);
        self
    }

    pub fn fields<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.fields = names.into_iter().map(Into::into).collect();
        self
    }
}

/// One result row: projected fields plus the facet score / 搜索结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub fields: Record,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<u64>,
}

/// Existence check answer / 存在性检查结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub success: bool,
    pub count: u64,
}

/// Ranked facet candidate
#[derive(Debug, Clone, PartialEq, Eq)]
struct Candidate {
    doc_id: u64,
    score: u64,
}

/// Sum per-document scores across token postings, best first. Ties keep the
/// order in which documents were first seen.
fn rank(postings: Vec<Vec<Posting>>) -> Vec<Candidate> {
    let mut slots: HashMap<u64, usize> = HashMap::new();
    let mut ranked: Vec<Candidate> = Vec::new();

    for posting in postings.into_iter().flatten() {
        match slots.get(&posting.doc_id) {
            Some(&slot) => ranked[slot].score += posting.score,
            None => {
                slots.insert(posting.doc_id, ranked.len());
                ranked.push(Candidate {
                    doc_id: posting.doc_id,
                    score: posting.score,
                });
            }
        }
    }

    ranked.sort_by(|a, b| b.score.cmp(&a.score));
    ranked
}

/// Distinct tokens in first-seen order
fn distinct(tokens: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tokens.len());
    for token in tokens {
        if !out.contains(&token) {
            out.push(token);
        }
    }
    out
}

#[derive(Clone)]
pub struct QueryExecutor {
    documents: DocumentStore,
    postings: PostingsStore,
    normalizer: Arc<Normalizer>,
    default_limit: usize,
    max_in_flight: usize,
    scan_batch: usize,
}

impl QueryExecutor {
    pub fn new(
        documents: DocumentStore,
        postings: PostingsStore,
        normalizer: Arc<Normalizer>,
        default_limit: usize,
        max_in_flight: usize,
        scan_batch: usize,
    ) -> Self {
        Self {
            documents,
            postings,
            normalizer,
            default_limit,
            max_in_flight,
            scan_batch,
        }
    }

    /// Run a search in the requested mode / 搜索
    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>> {
        let limit = request.limit.unwrap_or(self.default_limit);
        match request.mode {
            SearchMode::Facet => self.facet(&request.query, request.offset, limit, &request.fields).await,
            SearchMode::Scan => self.scan(&request.query, request.offset, limit, &request.fields).await,
        }
    }

    async fn candidates(&self, query: &str) -> Result<Vec<Candidate>> {
        let tokens = distinct(self.normalizer.retained_tokens(query));
        if tokens.is_empty() {
            return Ok(Vec::new());
        }
        let reads = tokens.iter().map(|token| self.postings.read_all(token));
        let postings = run_batch(reads, self.max_in_flight)
            .await
            .into_iter()
            .collect::<Result<Vec<_>>>()?;
        Ok(rank(postings))
    }

    /// Token-ranked search with visit side effects / 分面检索
    pub async fn facet(&self, query: &str, offset: usize, limit: usize, return_fields: &[String]) -> Result<Vec<SearchHit>> {
        let page: Vec<Candidate> = self
            .candidates(query)
            .await?
            .into_iter()
            .skip(offset)
            .take(limit)
            .collect();
        if page.is_empty() {
            return Ok(Vec::new());
        }

        let lookups = page.iter().map(|c| self.documents.get(c.doc_id));
        let records = run_batch(lookups, self.max_in_flight).await;

        let mut hits = Vec::with_capacity(page.len());
        let mut visited = Vec::with_capacity(page.len());
        for (candidate, record) in page.into_iter().zip(records) {
            match record? {
                Some(record) => {
                    visited.push(candidate.doc_id);
                    hits.push(SearchHit {
                        fields: decode::project(&record, return_fields),
                        score: Some(candidate.score),
                    });
                }
                None => tracing::warn!("Postings point at missing document {}", candidate.doc_id),
            }
        }

        let touches = visited.iter().map(|&id| self.documents.record_visit(id));
        for (id, outcome) in visited.iter().zip(run_batch(touches, self.max_in_flight).await) {
            if outcome?.is_none() {
                tracing::warn!("Document {} vanished before its visit was recorded", id);
            }
        }

        tracing::debug!("Facet query {:?} returned {} hits", query, hits.len());
        Ok(hits)
    }

    /// Literal substring search, read only / 子串扫描检索
    pub async fn scan(&self, query: &str, offset: usize, limit: usize, return_fields: &[String]) -> Result<Vec<SearchHit>> {
        let rows = self
            .documents
            .scan(fields::TEXT, query, offset, Some(limit), return_fields, self.scan_batch)
            .await?;
        tracing::debug!("Scan query {:?} returned {} hits", query, rows.len());
        Ok(rows
            .into_iter()
            .map(|fields| SearchHit { fields, score: None })
            .collect())
    }

    /// Count matches without touching anything / 计数匹配，不产生副作用
    pub async fn check(&self, query: &str, mode: SearchMode) -> Result<CheckResult> {
        let count = match mode {
            SearchMode::Facet => {
                let candidates = self.candidates(query).await?;
                let lookups = candidates.iter().map(|c| self.documents.get(c.doc_id));
                let mut found = 0;
                for record in run_batch(lookups, self.max_in_flight).await {
                    if record?.is_some() {
                        found += 1;
                    }
                }
                found
            }
            SearchMode::Scan => self
                .documents
                .scan(fields::TEXT, query, 0, None, &[fields::ID.to_string()], self.scan_batch)
                .await?
                .len() as u64,
        };
        Ok(CheckResult { success: true, count })
    }

    /// Full record by id, empty when absent / 文档详情
    pub async fn detail(&self, id: u64) -> Result<Record> {
        Ok(self.documents.get(id).await?.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn posting(doc_id: u64, score: u64) -> Posting {
        Posting {
            doc_id,
            doc_key: format!("d:{}", doc_id),
            score,
        }
    }

    #[test]
    fn test_rank_sums_across_tokens() {
        let ranked = rank(vec![
            vec![posting(1, 1), posting(2, 1)],
            vec![posting(2, 3), posting(3, 1)],
        ]);
        let ids: Vec<(u64, u64)> = ranked.iter().map(|c| (c.doc_id, c.score)).collect();
        assert_eq!(ids, vec![(2, 4), (1, 1), (3, 1)]);
    }

    #[test]
    fn test_rank_empty() {
        assert!(rank(Vec::new()).is_empty());
        assert!(rank(vec![Vec::new()]).is_empty());
    }

    #[test]
    fn test_distinct_keeps_first_order() {
        let tokens = vec!["夏".to_string(), "天".to_string(), "夏".to_string()];
        assert_eq!(distinct(tokens), vec!["夏".to_string(), "天".to_string()]);
    }

    #[test]
    fn test_hit_serializes_flat() {
        let mut fields = Record::new();
        fields.insert("id".into(), "1".into());
        let hit = SearchHit { fields: fields.clone(), score: Some(2) };
        assert_eq!(serde_json::to_value(&hit).unwrap(), serde_json::json!({"id": "1", "score": 2}));
        let bare = SearchHit { fields, score: None };
        assert_eq!(serde_json::to_value(&bare).unwrap(), serde_json::json!({"id": "1"}));
    }

    #[test]
    fn test_request_defaults() {
        let req: SearchRequest = serde_json::from_str(r#"{"query":"夏天"}"#).unwrap();
        assert_eq!(req.mode, SearchMode::Facet);
        assert_eq!(req.limit, None);
        let req: SearchRequest = serde_json::from_str(r#"{"query":"海灘","mode":"scan","limit":5}"#).unwrap();
        assert_eq!(req.mode, SearchMode::Scan);
        assert_eq!(req.limit, Some(5));
    }
}
