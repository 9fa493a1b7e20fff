//! In-memory backend / 内存后端
//!
//! Mirrors the Redis data model (hashes, ranked sets, counters) behind one
//! mutex, so every trait call is indivisible just like a server round trip.
//! Used by tests and by `--memory` runs of the binary.
//!
//! Cursor scans walk keys in creation order; the cursor is the creation
//! sequence number of the last key returned. Keys written during a scan are
//! seen at most once and never break the cursor.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::decode::{self, Record};
use super::{KeyCount, KvBackend, ScanRequest, StoreError, VisitCounters};

#[derive(Debug, Clone)]
enum Value {
    Hash(BTreeMap<String, String>),
    Ranked(HashMap<String, f64>),
    Counter(u64),
}

impl Value {
    fn footprint(&self) -> u64 {
        let payload: usize = match self {
            Value::Hash(h) => h.iter().map(|(k, v)| k.len() + v.len() + 16).sum(),
            Value::Ranked(z) => z.keys().map(|m| m.len() + 24).sum(),
            Value::Counter(_) => 8,
        };
        payload as u64 + 48
    }
}

#[derive(Debug)]
struct Slot {
    seq: u64,
    value: Value,
}

#[derive(Debug, Default)]
struct Keyspace {
    slots: HashMap<String, Slot>,
    order: BTreeMap<u64, String>,
    next_seq: u64,
}

impl Keyspace {
    fn insert(&mut self, key: &str, value: Value) {
        if let Some(slot) = self.slots.get_mut(key) {
            slot.value = value;
            return;
        }
        self.next_seq += 1;
        self.order.insert(self.next_seq, key.to_string());
        self.slots.insert(key.to_string(), Slot { seq: self.next_seq, value });
    }

    fn remove(&mut self, key: &str) -> Option<Value> {
        let slot = self.slots.remove(key)?;
        self.order.remove(&slot.seq);
        Some(slot.value)
    }

    fn get(&self, key: &str) -> Option<&Value> {
        self.slots.get(key).map(|s| &s.value)
    }

    fn entry(&mut self, key: &str, default: impl FnOnce() -> Value) -> &mut Value {
        let Keyspace { slots, order, next_seq } = self;
        let slot = slots.entry(key.to_string()).or_insert_with(|| {
            *next_seq += 1;
            order.insert(*next_seq, key.to_string());
            Slot {
                seq: *next_seq,
                value: default(),
            }
        });
        &mut slot.value
    }

    fn hash(&self, key: &str) -> Result<Option<&BTreeMap<String, String>>, StoreError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Hash(h)) => Ok(Some(h)),
            Some(_) => Err(wrong_type(key)),
        }
    }

    fn ranked(&self, key: &str) -> Result<Option<&HashMap<String, f64>>, StoreError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Ranked(z)) => Ok(Some(z)),
            Some(_) => Err(wrong_type(key)),
        }
    }

    /// Keys matching `pattern` in creation order, starting after `cursor`
    fn matching_after<'a>(&'a self, pattern: &'a str, cursor: u64) -> impl Iterator<Item = (u64, &'a str)> + 'a {
        self.order
            .range(cursor + 1..)
            .filter(move |(_, key)| glob_match(pattern, key))
            .map(|(seq, key)| (*seq, key.as_str()))
    }
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::Protocol(format!("WRONGTYPE operation against key {} holding the wrong kind of value", key))
}

/// `prefix*` globs, or exact keys when there is no trailing star
fn glob_match(pattern: &str, key: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => key.starts_with(prefix),
        None => key == pattern,
    }
}

fn sorted(set: &HashMap<String, f64>) -> Vec<(String, f64)> {
    let mut items: Vec<(String, f64)> = set.iter().map(|(m, s)| (m.clone(), *s)).collect();
    items.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    items
}

/// In-process store with the same atomicity contract as Redis / 内存存储
#[derive(Debug)]
pub struct MemoryBackend {
    data: Mutex<Keyspace>,
    fault: Mutex<Option<String>>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            data: Mutex::new(Keyspace::default()),
            fault: Mutex::new(None),
        }
    }

    /// Make every call touching a key with this prefix fail as unavailable.
    /// An empty prefix fails every call; `None` clears the fault.
    pub fn set_fault(&self, prefix: Option<&str>) {
        *self.fault.lock() = prefix.map(str::to_string);
    }

    fn check(&self, key: &str) -> Result<(), StoreError> {
        match self.fault.lock().as_deref() {
            Some(prefix) if key.starts_with(prefix) => {
                Err(StoreError::Unavailable(format!("injected fault on {}", key)))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    async fn incr(&self, key: &str) -> Result<u64, StoreError> {
        self.check(key)?;
        let mut data = self.data.lock();
        match data.entry(key, || Value::Counter(0)) {
            Value::Counter(n) => {
                *n += 1;
                Ok(*n)
            }
            _ => Err(wrong_type(key)),
        }
    }

    async fn zincr(&self, key: &str, member: &str, by: f64) -> Result<f64, StoreError> {
        self.check(key)?;
        let mut data = self.data.lock();
        match data.entry(key, || Value::Ranked(HashMap::new())) {
            Value::Ranked(set) => {
                let score = set.entry(member.to_string()).or_insert(0.0);
                *score += by;
                Ok(*score)
            }
            _ => Err(wrong_type(key)),
        }
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), StoreError> {
        self.check(key)?;
        let mut data = self.data.lock();
        match data.entry(key, || Value::Ranked(HashMap::new())) {
            Value::Ranked(set) => {
                set.insert(member.to_string(), score);
                Ok(())
            }
            _ => Err(wrong_type(key)),
        }
    }

    async fn zrange_with_scores(&self, key: &str) -> Result<Vec<(String, f64)>, StoreError> {
        self.check(key)?;
        let data = self.data.lock();
        Ok(data.ranked(key)?.map(sorted).unwrap_or_default())
    }

    async fn zrevrange_with_scores(
        &self,
        key: &str,
        start: usize,
        stop: usize,
    ) -> Result<Vec<(String, f64)>, StoreError> {
        self.check(key)?;
        let data = self.data.lock();
        let mut items = data.ranked(key)?.map(sorted).unwrap_or_default();
        items.reverse();
        if start > stop {
            return Ok(Vec::new());
        }
        Ok(items.into_iter().skip(start).take(stop - start + 1).collect())
    }

    async fn zcard(&self, key: &str) -> Result<u64, StoreError> {
        self.check(key)?;
        let data = self.data.lock();
        Ok(data.ranked(key)?.map(|s| s.len() as u64).unwrap_or(0))
    }

    async fn zsum(&self, key: &str) -> Result<f64, StoreError> {
        self.check(key)?;
        let data = self.data.lock();
        Ok(data.ranked(key)?.map(|s| s.values().sum()).unwrap_or(0.0))
    }

    async fn del(&self, key: &str) -> Result<bool, StoreError> {
        self.check(key)?;
        Ok(self.data.lock().remove(key).is_some())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), StoreError> {
        self.check(from)?;
        self.check(to)?;
        let mut data = self.data.lock();
        let value = data
            .remove(from)
            .ok_or_else(|| StoreError::Protocol(format!("ERR no such key {}", from)))?;
        data.remove(to);
        data.insert(to, value);
        Ok(())
    }

    async fn hset(&self, key: &str, fields: &[(String, String)]) -> Result<(), StoreError> {
        self.check(key)?;
        if fields.is_empty() {
            return Ok(());
        }
        let mut data = self.data.lock();
        match data.entry(key, || Value::Hash(BTreeMap::new())) {
            Value::Hash(hash) => {
                for (field, value) in fields {
                    hash.insert(field.clone(), value.clone());
                }
                Ok(())
            }
            _ => Err(wrong_type(key)),
        }
    }

    async fn hgetall(&self, key: &str) -> Result<Record, StoreError> {
        self.check(key)?;
        let data = self.data.lock();
        Ok(data.hash(key)?.cloned().unwrap_or_default())
    }

    async fn touch_visit(&self, key: &str, now: &str) -> Result<Option<VisitCounters>, StoreError> {
        self.check(key)?;
        let mut data = self.data.lock();
        let hash = match data.slots.get_mut(key).map(|s| &mut s.value) {
            None => return Ok(None),
            Some(Value::Hash(hash)) => hash,
            Some(_) => return Err(wrong_type(key)),
        };

        let mut bump = |field: &str| -> Result<u64, StoreError> {
            let current = match hash.get(field).map(|v| v.trim()) {
                None | Some("") => 0,
                Some(v) => v
                    .parse::<u64>()
                    .map_err(|_| StoreError::Protocol(format!("ERR hash value is not an integer: {}", field)))?,
            };
            hash.insert(field.to_string(), (current + 1).to_string());
            Ok(current + 1)
        };
        let visited = bump("visited")?;
        let update_ident = bump("updateIdent")?;
        hash.insert("updatedAt".to_string(), now.to_string());

        Ok(Some(VisitCounters { visited, update_ident }))
    }

    async fn scan(&self, pattern: &str, cursor: u64, count: usize) -> Result<(u64, Vec<String>), StoreError> {
        self.check(pattern)?;
        let data = self.data.lock();
        let page: Vec<(u64, &str)> = data.matching_after(pattern, cursor).take(count.max(1)).collect();

        let next = match page.last() {
            Some((seq, _)) if data.matching_after(pattern, *seq).next().is_some() => *seq,
            _ => 0,
        };
        Ok((next, page.into_iter().map(|(_, k)| k.to_string()).collect()))
    }

    async fn scan_match(&self, request: &ScanRequest) -> Result<Vec<Record>, StoreError> {
        self.check(&request.pattern)?;
        let data = self.data.lock();
        let limit = request.limit.unwrap_or(usize::MAX);

        let mut rows = Vec::new();
        let mut skipped = 0;
        for (_, key) in data.matching_after(&request.pattern, 0) {
            if rows.len() >= limit {
                break;
            }
            let Some(hash) = data.hash(key)? else { continue };
            let hit = hash
                .get(&request.test_field)
                .map(|text| text.contains(request.needle.as_str()))
                .unwrap_or(false);
            if !hit {
                continue;
            }
            if skipped < request.offset {
                skipped += 1;
                continue;
            }
            rows.push(decode::project(hash, &request.fields));
        }
        Ok(rows)
    }

    async fn count_keys(&self, pattern: &str, _batch: usize) -> Result<KeyCount, StoreError> {
        self.check(pattern)?;
        let data = self.data.lock();
        Ok(data
            .matching_after(pattern, 0)
            .filter_map(|(_, key)| data.get(key).map(|v| v.footprint() + key.len() as u64))
            .fold(KeyCount::default(), |acc, bytes| KeyCount {
                count: acc.count + 1,
                bytes: acc.bytes + bytes,
            }))
    }

    async fn server_version(&self) -> Result<String, StoreError> {
        self.check("")?;
        Ok(format!("Memory {}", env!("CARGO_PKG_VERSION")))
    }
}
