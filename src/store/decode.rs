//! Store reply decoding / 存储返回值解码
//!
//! Every reply shape the backend hands back (HGETALL key/value runs, HMGET
//! positional values, ZRANGE ... WITHSCORES runs) goes through this module
//! and comes out as a [`Record`] or a scored member list. Nothing here
//! touches the network.

use std::collections::BTreeMap;

use thiserror::Error;

/// One stored hash, field name -> value / 一条哈希记录
pub type Record = BTreeMap<String, String>;

/// Raw row as read from the store, tagged with its layout / 带布局标记的原始行
#[derive(Debug, Clone, PartialEq)]
pub enum RawRow {
    /// Alternating `field, value, field, value, ...` (HGETALL)
    Pairs(Vec<Option<String>>),
    /// Values lined up against a requested field list (HMGET)
    Positional(Vec<Option<String>>),
}

#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    #[error("odd number of items in key/value reply ({0})")]
    OddPairs(usize),
    #[error("missing field name at position {0}")]
    MissingName(usize),
    #[error("expected {expected} positional values, got {actual}")]
    Arity { expected: usize, actual: usize },
    #[error("score is not a number: {0:?}")]
    BadScore(String),
    #[error("field {field} is not a valid {kind}: {value:?}")]
    BadField {
        field: &'static str,
        kind: &'static str,
        value: String,
    },
}

/// Decode a flat `field, value, ...` reply / 解码键值交替的回复
pub fn decode_pairs<I>(flat: I) -> Result<Record, DecodeError>
where
    I: IntoIterator<Item = Option<String>>,
{
    let items: Vec<Option<String>> = flat.into_iter().collect();
    if items.len() % 2 != 0 {
        return Err(DecodeError::OddPairs(items.len()));
    }

    let mut record = Record::new();
    let mut iter = items.into_iter().enumerate();
    while let (Some((pos, name)), Some((_, value))) = (iter.next(), iter.next()) {
        let name = name.ok_or(DecodeError::MissingName(pos))?;
        record.insert(name, value.unwrap_or_default());
    }
    Ok(record)
}

/// Decode a positional reply against the requested names / 按字段名解码位置回复
///
/// Missing values (nil) are left out of the record instead of being stored
/// as empty strings, so callers can tell "absent" from "empty".
pub fn decode_positional(names: &[String], values: Vec<Option<String>>) -> Result<Record, DecodeError> {
    if names.len() != values.len() {
        return Err(DecodeError::Arity {
            expected: names.len(),
            actual: values.len(),
        });
    }

    Ok(names
        .iter()
        .zip(values)
        .filter_map(|(name, value)| value.map(|v| (name.clone(), v)))
        .collect())
}

/// Decode one tagged row / 解码单行
pub fn decode_row(row: RawRow, names: &[String]) -> Result<Record, DecodeError> {
    match row {
        RawRow::Pairs(flat) => decode_pairs(flat),
        RawRow::Positional(values) => decode_positional(names, values),
    }
}

/// Decode a `member, score, member, score, ...` reply / 解码有序集合的成员与分数
pub fn decode_scores(flat: Vec<String>) -> Result<Vec<(String, f64)>, DecodeError> {
    if flat.len() % 2 != 0 {
        return Err(DecodeError::OddPairs(flat.len()));
    }

    let mut out = Vec::with_capacity(flat.len() / 2);
    let mut iter = flat.into_iter();
    while let (Some(member), Some(score)) = (iter.next(), iter.next()) {
        let parsed = score
            .parse::<f64>()
            .map_err(|_| DecodeError::BadScore(score.clone()))?;
        out.push((member, parsed));
    }
    Ok(out)
}

/// Keep only the requested fields; an empty list keeps everything / 字段投影
pub fn project(record: &Record, fields: &[String]) -> Record {
    if fields.is_empty() {
        return record.clone();
    }
    fields
        .iter()
        .filter_map(|f| record.get(f).map(|v| (f.clone(), v.clone())))
        .collect()
}

/// Parse a non-negative integer field, treating absent or empty as 0
pub fn integer_field(record: &Record, field: &'static str) -> Result<u64, DecodeError> {
    match record.get(field).map(|v| v.trim()) {
        None | Some("") => Ok(0),
        Some(v) => v.parse::<u64>().map_err(|_| DecodeError::BadField {
            field,
            kind: "non-negative integer",
            value: v.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> Option<String> {
        Some(v.to_string())
    }

    #[test]
    fn test_decode_pairs() {
        let record = decode_pairs(vec![s("textChi"), s("夏天的海灘"), s("id"), s("31")]).unwrap();
        assert_eq!(record.get("id").map(String::as_str), Some("31"));
        assert_eq!(record.get("textChi").map(String::as_str), Some("夏天的海灘"));
    }

    #[test]
    fn test_decode_pairs_rejects_odd_length() {
        let err = decode_pairs(vec![s("id"), s("1"), s("visited")]).unwrap_err();
        assert_eq!(err, DecodeError::OddPairs(3));
    }

    #[test]
    fn test_decode_pairs_requires_names() {
        let err = decode_pairs(vec![None, s("1")]).unwrap_err();
        assert_eq!(err, DecodeError::MissingName(0));
    }

    #[test]
    fn test_decode_positional_skips_nil() {
        let names = vec!["id".to_string(), "textChi".to_string(), "updatedAt".to_string()];
        let record = decode_positional(&names, vec![s("100"), s("人口老齡化"), None]).unwrap();
        assert_eq!(record.len(), 2);
        assert!(!record.contains_key("updatedAt"));
    }

    #[test]
    fn test_decode_positional_arity() {
        let names = vec!["id".to_string()];
        let err = decode_positional(&names, vec![s("1"), s("2")]).unwrap_err();
        assert_eq!(err, DecodeError::Arity { expected: 1, actual: 2 });
    }

    #[test]
    fn test_decode_row_dispatches_on_tag() {
        let names = vec!["id".to_string()];
        let pairs = decode_row(RawRow::Pairs(vec![s("visited"), s("0")]), &names).unwrap();
        assert!(pairs.contains_key("visited"));
        let positional = decode_row(RawRow::Positional(vec![s("7")]), &names).unwrap();
        assert_eq!(positional.get("id").map(String::as_str), Some("7"));
    }

    #[test]
    fn test_decode_scores() {
        let scores = decode_scores(vec![
            "fts:chinese:documents:1".to_string(),
            "2".to_string(),
            "fts:chinese:documents:2".to_string(),
            "1.5".to_string(),
        ])
        .unwrap();
        assert_eq!(scores[0], ("fts:chinese:documents:1".to_string(), 2.0));
        assert_eq!(scores[1].1, 1.5);

        assert!(matches!(
            decode_scores(vec!["a".to_string(), "x".to_string()]),
            Err(DecodeError::BadScore(_))
        ));
    }

    #[test]
    fn test_project() {
        let mut record = Record::new();
        record.insert("id".into(), "1".into());
        record.insert("textChi".into(), "夏天".into());
        assert_eq!(project(&record, &[]).len(), 2);

        let projected = project(&record, &["textChi".to_string(), "missing".to_string()]);
        assert_eq!(projected.len(), 1);
        assert!(projected.contains_key("textChi"));
    }

    #[test]
    fn test_integer_field() {
        let mut record = Record::new();
        record.insert("visited".into(), "3".into());
        record.insert("updateIdent".into(), "".into());
        assert_eq!(integer_field(&record, "visited").unwrap(), 3);
        assert_eq!(integer_field(&record, "updateIdent").unwrap(), 0);
        assert_eq!(integer_field(&record, "absent").unwrap(), 0);
        record.insert("visited".into(), "-1".into());
        assert!(integer_field(&record, "visited").is_err());
    }
}
