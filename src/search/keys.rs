//! Persisted key layout / 键布局
//!
//! ```text
//! <ns>:documents:<id>   document hash
//! <ns>:documents-seq    id counter (outside the documents:* scan space)
//! <ns>:tokens:<token>   postings ranked set, member = document key
//! <ns>:visited          visited ranked set, member = document key
//! <ns>:wc               word-count ranked set, member = token
//! ```

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    ns: String,
}

impl KeySpace {
    pub fn new(namespace: &str) -> Self {
        Self {
            ns: namespace.trim_end_matches(':').to_string(),
        }
    }

    pub fn document(&self, id: u64) -> String {
        format!("{}:documents:{}", self.ns, id)
    }

    pub fn documents_pattern(&self) -> String {
        format!("{}:documents:*", self.ns)
    }

    /// Id encoded in a document key / 从文档键解析 id
    pub fn document_id(&self, key: &str) -> Option<u64> {
        key.strip_prefix(self.ns.as_str())?
            .strip_prefix(":documents:")?
            .parse()
            .ok()
    }

    pub fn sequence(&self) -> String {
        format!("{}:documents-seq", self.ns)
    }

    pub fn token(&self, token: &str) -> String {
        format!("{}:tokens:{}", self.ns, token)
    }

    pub fn tokens_pattern(&self) -> String {
        format!("{}:tokens:*", self.ns)
    }

    /// Token encoded in a postings key / 从词元键解析词元
    pub fn token_of<'k>(&self, key: &'k str) -> Option<&'k str> {
        key.strip_prefix(self.ns.as_str())?
            .strip_prefix(":tokens:")
            .filter(|t| !t.is_empty())
    }

    pub fn visited(&self) -> String {
        format!("{}:visited", self.ns)
    }

    pub fn word_counts(&self) -> String {
        format!("{}:wc", self.ns)
    }

    pub fn word_counts_staging(&self) -> String {
        format!("{}:wc:staging", self.ns)
    }
}
