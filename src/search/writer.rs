//! Index writer / 索引写入
//!
//! Feeds records into the document store and the postings. Records are
//! handled strictly one after another: the document write and all postings
//! increments of a record form one batch that is fully drained before the
//! next record starts.

use std::path::Path;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use super::documents::{timestamp, Document, DocumentStore};
use super::fanout::run_batch;
use super::postings::PostingsStore;
use super::tokenizer::Normalizer;
use crate::config::SearchConfig;
use crate::error::{Result, SearchError};

/// `VERB "KEY" FIELD VALUE` or `VERB KEY FIELD VALUE`
static LINE_SHAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^(\S+)\s+(?:"([^"]*)"|(\S+))\s+(\S+)\s+(.+)$"#).expect("static pattern")
});

/// One parsed ingestion line / 导入记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestRecord {
    pub key: String,
    pub field: String,
    pub value: String,
}

/// Ingestion line parser / 导入行解析
#[derive(Debug, Clone)]
pub struct LineParser {
    verb: String,
}

impl LineParser {
    pub fn new(verb: impl Into<String>) -> Self {
        Self { verb: verb.into() }
    }

    /// `None` for lines that do not have the record shape
    pub fn parse(&self, line: &str) -> Option<IngestRecord> {
        let caps = LINE_SHAPE.captures(line.trim())?;
        if !caps[1].eq_ignore_ascii_case(&self.verb) {
            return None;
        }
        let key = caps.get(2).or_else(|| caps.get(3))?.as_str();
        let raw = caps[5].trim();
        let value = raw.strip_prefix('"').unwrap_or(raw);
        let value = value.strip_suffix('"').unwrap_or(value);

        Some(IngestRecord {
            key: key.to_string(),
            field: caps[4].to_string(),
            value: value.to_string(),
        })
    }
}

/// Outcome of one ingestion run / 导入结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    /// Records written
    pub processed: u64,
    /// Malformed lines skipped
    pub skipped: u64,
    /// Postings increments that failed and were left out
    pub failed_postings: u64,
    pub last_id: Option<u64>,
}

/// Result of indexing a single record / 单条记录结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedRecord {
    pub id: u64,
    pub tokens: usize,
    pub failed_postings: u64,
}

#[derive(Clone)]
pub struct IndexWriter {
    documents: DocumentStore,
    postings: PostingsStore,
    normalizer: Arc<Normalizer>,
    parser: LineParser,
    separator: String,
    key_prefix_strip: String,
    checkpoint_every: u64,
    max_in_flight: usize,
}

impl IndexWriter {
    pub fn new(
        documents: DocumentStore,
        postings: PostingsStore,
        normalizer: Arc<Normalizer>,
        config: &SearchConfig,
    ) -> Self {
        Self {
            documents,
            postings,
            normalizer,
            parser: LineParser::new(config.ingest_verb.clone()),
            separator: config.display_separator.clone(),
            key_prefix_strip: config.key_prefix_strip.clone(),
            checkpoint_every: config.checkpoint_every,
            max_in_flight: config.max_in_flight,
        }
    }

    /// External key with the configured prefix removed / 去除键前缀
    pub fn clean_key<'k>(&self, key: &'k str) -> &'k str {
        if self.key_prefix_strip.is_empty() {
            return key;
        }
        key.strip_prefix(self.key_prefix_strip.as_str()).unwrap_or(key)
    }

    /// Display text for a record / 显示文本
    pub fn display_text(&self, key: &str, value: &str) -> String {
        if key.is_empty() {
            value.to_string()
        } else {
            format!("{}{}{}", key, self.separator, value)
        }
    }

    /// Index one record: assign an id, write the document, bump postings
    pub async fn index_record(&self, key: &str, value: &str) -> Result<IndexedRecord> {
        let id = self.documents.next_id().await?;
        let key = self.clean_key(key);
        let text = self.display_text(key, value);
        let tokens = self.normalizer.retained_tokens(&text);
        let doc = Document::new(id, key, text, timestamp());

        let increments = tokens.iter().map(|token| async move {
            self.postings
                .increment(token, id)
                .await
                .map_err(|e| (token.as_str(), e))
        });
        let (written, bumped) = tokio::join!(
            self.documents.create(&doc),
            run_batch(increments, self.max_in_flight)
        );
        written?;

        let mut failed_postings = 0;
        for (token, err) in bumped.into_iter().filter_map(|r| r.err()) {
            tracing::warn!("Postings increment {} -> {} failed: {}", token, id, err);
            failed_postings += 1;
        }

        Ok(IndexedRecord {
            id,
            tokens: tokens.len(),
            failed_postings,
        })
    }

    /// Ingest a line feed; malformed lines are skipped / 按行导入
    pub async fn ingest_lines<R>(&self, reader: R) -> Result<IngestReport>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut report = IngestReport::default();
        let mut reader = reader;
        let mut buf = Vec::new();

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => return Err(self.halt(&report, e.into())),
            }
            let line = match std::str::from_utf8(&buf) {
                Ok(line) => line.trim_end_matches(['\n', '\r']),
                Err(e) => {
                    tracing::warn!("Skipped line that is not UTF-8: {}", e);
                    report.skipped += 1;
                    continue;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            let Some(record) = self.parser.parse(line) else {
                tracing::warn!("Skipped malformed line: {}", line);
                report.skipped += 1;
                continue;
            };

            let indexed = self
                .index_record(&record.key, &record.value)
                .await
                .map_err(|e| self.halt(&report, e))?;
            self.record(&mut report, &indexed);
        }

        tracing::info!(
            "Ingestion done: {} records, {} skipped, {} failed postings",
            report.processed,
            report.skipped,
            report.failed_postings
        );
        Ok(report)
    }

    /// Ingest a file of record lines / 从文件导入
    pub async fn ingest_file(&self, path: &Path) -> Result<IngestReport> {
        let file = tokio::fs::File::open(path).await?;
        tracing::info!("Ingesting {:?}", path);
        self.ingest_lines(BufReader::new(file)).await
    }

    /// Ingest bare texts with no external key / 导入纯文本
    pub async fn ingest_texts<S: AsRef<str>>(&self, texts: &[S]) -> Result<IngestReport> {
        let mut report = IngestReport::default();
        for text in texts {
            let indexed = self
                .index_record("", text.as_ref())
                .await
                .map_err(|e| self.halt(&report, e))?;
            self.record(&mut report, &indexed);
        }
        Ok(report)
    }

    fn record(&self, report: &mut IngestReport, indexed: &IndexedRecord) {
        report.processed += 1;
        report.failed_postings += indexed.failed_postings;
        report.last_id = Some(indexed.id);
        if self.checkpoint_every > 0 && report.processed % self.checkpoint_every == 0 {
            tracing::info!("Checkpoint: {} records indexed (last id {})", report.processed, indexed.id);
        }
    }

    fn halt(&self, report: &IngestReport, err: SearchError) -> SearchError {
        tracing::error!("Ingestion halted after {} records: {}", report.processed, err);
        SearchError::Ingest {
            processed: report.processed,
            source: Box::new(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::keys::KeySpace;
    use crate::store::{KvBackend, MemoryBackend};
    use std::io::Write;

    fn writer(mem: Arc<MemoryBackend>) -> IndexWriter {
        let config = SearchConfig {
            namespace: "fts:test".to_string(),
            checkpoint_every: 2,
            ..SearchConfig::default()
        };
        let keys = KeySpace::new(&config.namespace);
        let store: Arc<dyn KvBackend> = mem;
        IndexWriter::new(
            DocumentStore::new(store.clone(), keys.clone()),
            PostingsStore::new(store, keys),
            Arc::new(Normalizer::new(&config.stop_words).unwrap()),
            &config,
        )
    }

    #[test]
    fn test_parse_quoted_and_bare_keys() {
        let parser = LineParser::new("HSET");
        let quoted = parser
            .parse(r#"HSET "DONGDICT:夏天" description "夏季的天氣""#)
            .unwrap();
        assert_eq!(quoted.key, "DONGDICT:夏天");
        assert_eq!(quoted.field, "description");
        assert_eq!(quoted.value, "夏季的天氣");

        let bare = parser.parse(r#"HSET DONGDICT:海灘 description "沙 灘""#).unwrap();
        assert_eq!(bare.key, "DONGDICT:海灘");
        assert_eq!(bare.value, "沙 灘");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        let parser = LineParser::new("HSET");
        assert_eq!(parser.parse("SET key value"), None);
        assert_eq!(parser.parse("HSET key"), None);
        assert_eq!(parser.parse("HGET key field \"v\""), None);
    }

    #[tokio::test]
    async fn test_index_record_writes_document_and_postings() {
        let mem = Arc::new(MemoryBackend::new());
        let writer = writer(mem.clone());
        let indexed = writer.index_record("DONGDICT:夏天", "海灘").await.unwrap();
        assert_eq!(indexed.id, 1);
        assert_eq!(indexed.tokens, 4);

        let doc = writer.documents.document(1).await.unwrap().unwrap();
        assert_eq!(doc.key, "夏天");
        assert_eq!(doc.text_chi, "夏天<br />海灘");
        assert_eq!(doc.update_ident, 0);
        assert_eq!(writer.postings.read_all("灘").await.unwrap()[0].doc_id, 1);
    }

    #[tokio::test]
    async fn test_ingest_lines_skips_malformed() {
        let mem = Arc::new(MemoryBackend::new());
        let writer = writer(mem);
        let feed = "HSET \"DONGDICT:夏\" description \"夏天\"\n\ngarbage\nHSET DONGDICT:冬 description \"冬天\"\n";
        let report = writer.ingest_lines(feed.as_bytes()).await.unwrap();
        assert_eq!(report.processed, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.last_id, Some(2));
        assert_eq!(writer.postings.read_all("天").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_ingest_lines_skips_invalid_utf8() {
        let writer = writer(Arc::new(MemoryBackend::new()));
        let mut feed = b"HSET \"DONGDICT:\xe5\xa4\x8f\" description \"\xe5\xa4\x8f\"\r\n".to_vec();
        feed.extend_from_slice(b"HSET \"bad\xff\" description \"x\"\n");
        feed.extend_from_slice(b"HSET DONGDICT:sea description \"beach\"");
        let report = writer.ingest_lines(feed.as_slice()).await.unwrap();
        assert_eq!(report.processed, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.last_id, Some(2));
        let doc = writer.documents.document(2).await.unwrap().unwrap();
        assert_eq!(doc.text_chi, "sea<br />beach");
    }

    #[tokio::test]
    async fn test_ingest_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "HSET \"DONGDICT:海\" description \"海灘\"").unwrap();
        writeln!(file, "HSET \"DONGDICT:風\" description \"微風\"").unwrap();
        let writer = writer(Arc::new(MemoryBackend::new()));
        let report = writer.ingest_file(file.path()).await.unwrap();
        assert_eq!(report.processed, 2);
    }

    #[tokio::test]
    async fn test_failed_increments_are_counted_not_fatal() {
        let mem = Arc::new(MemoryBackend::new());
        let writer = writer(mem.clone());
        mem.set_fault(Some("fts:test:tokens:"));
        let report = writer.ingest_texts(&["夏天"]).await.unwrap();
        assert_eq!(report.processed, 1);
        assert_eq!(report.failed_postings, 2);
        mem.set_fault(None);
        assert!(writer.documents.get(1).await.unwrap().is_some());
        assert!(writer.postings.read_all("夏").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_store_halts_with_count() {
        let mem = Arc::new(MemoryBackend::new());
        let writer = writer(mem.clone());
        writer.ingest_texts(&["夏天"]).await.unwrap();
        mem.set_fault(Some(""));
        let err = writer.ingest_texts(&["海灘", "微風"]).await.unwrap_err();
        assert!(matches!(err, SearchError::Ingest { processed: 0, .. }));
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_ids_continue_across_runs() {
        let mem = Arc::new(MemoryBackend::new());
        writer(mem.clone()).ingest_texts(&["夏"]).await.unwrap();
        let report = writer(mem).ingest_texts(&["天"]).await.unwrap();
        assert_eq!(report.last_id, Some(2));
    }
}
