//! Chinese tokenizer - single-character unigrams / 中文单字分词器
//!
//! Normalization runs in two steps / 两步处理：
//! - Strip the configured stop substrings wherever they occur / 去除停用词
//! - Split into tokens: every CJK ideograph is a token, every maximal run of
//!   ASCII letters/digits is a token, everything else separates / 切分
//!
//! The retention filter is separate: index and query callers keep only
//! tokens that are neither numeric nor contain Latin letters or symbols,
//! which leaves single CJK characters.

use std::borrow::Cow;

use regex::Regex;

/// Check if a character is a basic CJK ideograph / 是否为基本汉字
pub fn is_cjk(c: char) -> bool {
    matches!(c, '\u{4e00}'..='\u{9fff}')
}

/// Check if a token parses as a number / 是否为数字
pub fn is_numeric(token: &str) -> bool {
    let trimmed = token.trim();
    !trimmed.is_empty() && trimmed.parse::<f64>().is_ok()
}

/// Check if a token holds any ASCII letter or punctuation symbol / 是否含英文或符号
pub fn is_latin_or_symbol(token: &str) -> bool {
    token.chars().any(|c| c.is_ascii_alphabetic() || c.is_ascii_punctuation())
}

/// Retention filter used for indexing and facet queries / 保留过滤
pub fn is_retained(token: &str) -> bool {
    !token.is_empty() && !is_numeric(token) && !is_latin_or_symbol(token)
}

/// Ordered token stream over a string / 分词迭代器
#[derive(Debug, Clone)]
pub struct Tokens<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Tokens<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }
}

impl<'a> Iterator for Tokens<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let rest = &self.text[self.pos..];
        let mut chars = rest.char_indices();

        while let Some((start, c)) = chars.next() {
            if is_cjk(c) {
                let end = start + c.len_utf8();
                self.pos += end;
                return Some(&rest[start..end]);
            }
            if c.is_ascii_alphanumeric() {
                let end = rest[start..]
                    .find(|ch: char| !ch.is_ascii_alphanumeric())
                    .map(|off| start + off)
                    .unwrap_or(rest.len());
                self.pos += end;
                return Some(&rest[start..end]);
            }
        }

        self.pos = self.text.len();
        None
    }
}

/// Split text into tokens without stripping anything / 直接分词
pub fn tokenize(text: &str) -> Tokens<'_> {
    Tokens::new(text)
}

/// Stop-word stripper plus tokenizer / 规范化器
#[derive(Debug, Clone)]
pub struct Normalizer {
    stop: Option<Regex>,
}

impl Normalizer {
    /// Build from a stop list; longer entries win over their prefixes
    pub fn new<S: AsRef<str>>(stop_words: &[S]) -> Result<Self, regex::Error> {
        let mut words: Vec<&str> = stop_words
            .iter()
            .map(|w| w.as_ref())
            .filter(|w| !w.is_empty())
            .collect();
        if words.is_empty() {
            return Ok(Self { stop: None });
        }
        words.sort_by(|a, b| b.len().cmp(&a.len()));
        words.dedup();

        let pattern = words
            .iter()
            .map(|w| regex::escape(w))
            .collect::<Vec<_>>()
            .join("|");
        Ok(Self {
            stop: Some(Regex::new(&pattern)?),
        })
    }

    /// Remove every stop substring / 去除停用词
    pub fn strip<'t>(&self, text: &'t str) -> Cow<'t, str> {
        match &self.stop {
            Some(re) => re.replace_all(text, ""),
            None => Cow::Borrowed(text),
        }
    }

    /// Strip then tokenize, unfiltered / 去停用词后分词
    pub fn tokens(&self, text: &str) -> Vec<String> {
        tokenize(&self.strip(text)).map(str::to_string).collect()
    }

    /// Strip, tokenize and keep only retained tokens / 得到保留的词元
    pub fn retained_tokens(&self, text: &str) -> Vec<String> {
        tokenize(&self.strip(text))
            .filter(|t| is_retained(t))
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_STOP_WORDS;

    fn normalizer() -> Normalizer {
        Normalizer::new(DEFAULT_STOP_WORDS).unwrap()
    }

    #[test]
    fn test_tokenize_mixed_text() {
        let tokens: Vec<&str> = tokenize("夏天abc12 的,x").collect();
        assert_eq!(tokens, vec!["夏", "天", "abc12", "的", "x"]);
    }

    #[test]
    fn test_tokenize_empty_and_separators_only() {
        assert_eq!(tokenize("").count(), 0);
        assert_eq!(tokenize("  ,.!？").count(), 0);
    }

    #[test]
    fn test_tokens_are_single_cjk_or_ascii_runs() {
        let inputs = ["人口老齡化 ageing-society 2024年", "Ａ全角ａ", "𠀀擴展B", "a\u{3000}b"];
        for input in inputs {
            for token in tokenize(input) {
                assert!(!token.is_empty());
                let single_cjk = token.chars().count() == 1 && token.chars().all(is_cjk);
                let ascii_run = token.chars().all(|c| c.is_ascii_alphanumeric());
                assert!(single_cjk || ascii_run, "bad token {:?} in {:?}", token, input);
            }
        }
    }

    #[test]
    fn test_strip_removes_stop_words() {
        let n = normalizer();
        assert_eq!(n.strip("夏天的海灘<br />「好」"), "夏天海灘好");
        assert_eq!(n.strip("了了了"), "");
    }

    #[test]
    fn test_retained_tokens() {
        let n = normalizer();
        assert_eq!(n.retained_tokens("夏天的海灘"), vec!["夏", "天", "海", "灘"]);
        assert_eq!(n.retained_tokens("ABC 123 夏"), vec!["夏"]);
        assert!(n.retained_tokens("").is_empty());
    }

    #[test]
    fn test_retention_filter() {
        assert!(is_retained("夏"));
        assert!(!is_retained("123"));
        assert!(!is_retained("1.5"));
        assert!(!is_retained("abc"));
        assert!(!is_retained("a1"));
        assert!(!is_retained(""));
    }

    #[test]
    fn test_empty_stop_list() {
        let n = Normalizer::new::<&str>(&[]).unwrap();
        assert_eq!(n.tokens("的了"), vec!["的", "了"]);
    }
}
