//! Status reporter / 状态报告

use std::sync::Arc;

use serde::Serialize;

use super::documents::{fields, DocumentStore};
use super::fanout::run_batch;
use super::postings::PostingsStore;
use crate::error::Result;
use crate::store::KvBackend;

/// One entry of the visited ranking / 访问排行项
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VisitedEntry {
    pub id: u64,
    #[serde(rename = "textChi")]
    pub text: String,
    pub visits: u64,
}

/// Read-only operational snapshot / 运行状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub version: String,
    pub document_count: u64,
    pub document_footprint: u64,
    pub token_count: u64,
    pub token_footprint: u64,
    pub visited_count: u64,
    pub visited_sample: Vec<VisitedEntry>,
}

#[derive(Clone)]
pub struct StatusReporter {
    store: Arc<dyn KvBackend>,
    documents: DocumentStore,
    postings: PostingsStore,
    max_stats_return: usize,
    scan_batch: usize,
    max_in_flight: usize,
}

impl StatusReporter {
    pub fn new(
        store: Arc<dyn KvBackend>,
        documents: DocumentStore,
        postings: PostingsStore,
        max_stats_return: usize,
        scan_batch: usize,
        max_in_flight: usize,
    ) -> Self {
        Self {
            store,
            documents,
            postings,
            max_stats_return,
            scan_batch,
            max_in_flight,
        }
    }

    pub async fn status(&self) -> Result<Status> {
        let version = self.store.server_version().await?;
        let documents = self.documents.count_keys(self.scan_batch).await?;
        let tokens = self.postings.count_keys(self.scan_batch).await?;
        let visited_count = self.documents.visited_count().await?;

        let top = self.documents.visited_top(self.max_stats_return).await?;
        let lookups = top.iter().map(|(id, _)| self.documents.get(*id));
        let records = run_batch(lookups, self.max_in_flight).await;

        let mut visited_sample = Vec::with_capacity(top.len());
        for ((id, visits), record) in top.into_iter().zip(records) {
            let text = record?
                .and_then(|r| r.get(fields::TEXT).cloned())
                .unwrap_or_default();
            visited_sample.push(VisitedEntry { id, text, visits });
        }

        Ok(Status {
            version,
            document_count: documents.count,
            document_footprint: documents.bytes,
            token_count: tokens.count,
            token_footprint: tokens.bytes,
            visited_count,
            visited_sample,
        })
    }
}
