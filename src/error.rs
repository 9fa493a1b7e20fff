//! Engine errors / 引擎错误

use thiserror::Error;

use crate::store::{DecodeError, StoreError};

#[derive(Debug, Error)]
pub enum SearchError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Ingestion halted; `processed` records were written before the failure
    #[error("ingestion halted after {processed} records: {source}")]
    Ingest {
        processed: u64,
        #[source]
        source: Box<SearchError>,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<DecodeError> for SearchError {
    fn from(err: DecodeError) -> Self {
        SearchError::Store(StoreError::Decode(err))
    }
}

impl SearchError {
    /// Failures caused by the store being unreachable / 存储不可达
    pub fn is_unavailable(&self) -> bool {
        match self {
            SearchError::Store(e) => e.is_unavailable(),
            SearchError::Ingest { source, .. } => source.is_unavailable(),
            _ => false,
        }
    }

    /// Whether the caller sent something unusable / 请求参数错误
    pub fn is_client_error(&self) -> bool {
        matches!(self, SearchError::InvalidInput(_))
    }
}

pub type Result<T> = std::result::Result<T, SearchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingest_error_reports_count() {
        let err = SearchError::Ingest {
            processed: 42,
            source: Box::new(StoreError::Unavailable("connection refused".into()).into()),
        };
        assert!(err.to_string().contains("after 42 records"));
        assert!(err.is_unavailable());
        assert!(!err.is_client_error());
    }
}
