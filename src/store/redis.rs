//! Redis backend / Redis 后端
//!
//! Postings increments use the native `ZINCRBY`; the visit touch, score sums,
//! substring scans and key counting run as Lua scripts so each is a single
//! round trip executed atomically by the server.

use std::future::Future;
use std::time::Duration;

use ::redis::aio::ConnectionManager;
use ::redis::{Client, ErrorKind, RedisError};
use async_trait::async_trait;

use super::decode::{self, RawRow, Record};
use super::script::ScriptHandle;
use super::{KeyCount, KvBackend, ScanRequest, StoreError, VisitCounters};
use crate::config::RedisConfig;

const TOUCH_VISIT: &str = include_str!("lua/touch_visit.lua");
const ZSUM: &str = include_str!("lua/zsum.lua");
const SCAN_MATCH: &str = include_str!("lua/scan_match.lua");
const COUNT_KEYS: &str = include_str!("lua/count_keys.lua");

impl From<RedisError> for StoreError {
    fn from(err: RedisError) -> Self {
        if err.kind() == ErrorKind::NoScriptError {
            StoreError::ScriptMissing(err.to_string())
        } else if err.is_io_error()
            || err.is_timeout()
            || err.is_connection_dropped()
            || err.is_connection_refusal()
        {
            StoreError::Unavailable(err.to_string())
        } else {
            StoreError::Protocol(err.to_string())
        }
    }
}

/// Redis-backed store / 基于 Redis 的存储
pub struct RedisBackend {
    conn: ConnectionManager,
    response_timeout: Option<Duration>,
    touch_visit: ScriptHandle,
    zsum: ScriptHandle,
    scan_match: ScriptHandle,
    count_keys: ScriptHandle,
}

impl RedisBackend {
    /// Connect and register all scripts / 连接并注册脚本
    pub async fn connect(config: &RedisConfig) -> Result<Self, StoreError> {
        let client = Client::open(config.url.as_str())?;

        let connect = client.get_connection_manager();
        let conn = match config.connect_timeout_secs {
            0 => connect.await?,
            secs => tokio::time::timeout(Duration::from_secs(secs), connect)
                .await
                .map_err(|_| StoreError::Unavailable(format!("connect to {} timed out", config.redacted_url())))??,
        };

        let backend = Self {
            conn,
            response_timeout: match config.response_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            touch_visit: ScriptHandle::new("touch_visit", TOUCH_VISIT),
            zsum: ScriptHandle::new("zsum", ZSUM),
            scan_match: ScriptHandle::new("scan_match", SCAN_MATCH),
            count_keys: ScriptHandle::new("count_keys", COUNT_KEYS),
        };
        backend.load_scripts().await?;

        tracing::info!("Connected to {}", config.redacted_url());
        Ok(backend)
    }

    /// Register every script up front / 预先注册所有脚本
    pub async fn load_scripts(&self) -> Result<(), StoreError> {
        for script in [&self.touch_visit, &self.zsum, &self.scan_match, &self.count_keys] {
            self.timed(script.load(&self.conn)).await?;
        }
        Ok(())
    }

    async fn timed<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match self.response_timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| StoreError::Unavailable(format!("no reply within {:?}", limit)))?,
            None => fut.await,
        }
    }

    async fn query<T: ::redis::FromRedisValue + Send>(&self, cmd: ::redis::Cmd) -> Result<T, StoreError> {
        let mut conn = self.conn.clone();
        self.timed(async move { cmd.query_async::<_, T>(&mut conn).await.map_err(StoreError::from) })
            .await
    }
}

#[async_trait]
impl KvBackend for RedisBackend {
    async fn incr(&self, key: &str) -> Result<u64, StoreError> {
        let mut cmd = ::redis::cmd("INCR");
        cmd.arg(key);
        self.query(cmd).await
    }

    async fn zincr(&self, key: &str, member: &str, by: f64) -> Result<f64, StoreError> {
        let mut cmd = ::redis::cmd("ZINCRBY");
        cmd.arg(key).arg(by).arg(member);
        self.query(cmd).await
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), StoreError> {
        let mut cmd = ::redis::cmd("ZADD");
        cmd.arg(key).arg(score).arg(member);
        self.query::<i64>(cmd).await.map(|_| ())
    }

    async fn zrange_with_scores(&self, key: &str) -> Result<Vec<(String, f64)>, StoreError> {
        let mut cmd = ::redis::cmd("ZRANGE");
        cmd.arg(key).arg(0).arg(-1).arg("WITHSCORES");
        let flat: Vec<String> = self.query(cmd).await?;
        Ok(decode::decode_scores(flat)?)
    }

    async fn zrevrange_with_scores(
        &self,
        key: &str,
        start: usize,
        stop: usize,
    ) -> Result<Vec<(String, f64)>, StoreError> {
        let mut cmd = ::redis::cmd("ZREVRANGE");
        cmd.arg(key).arg(start).arg(stop).arg("WITHSCORES");
        let flat: Vec<String> = self.query(cmd).await?;
        Ok(decode::decode_scores(flat)?)
    }

    async fn zcard(&self, key: &str) -> Result<u64, StoreError> {
        let mut cmd = ::redis::cmd("ZCARD");
        cmd.arg(key);
        self.query(cmd).await
    }

    async fn zsum(&self, key: &str) -> Result<f64, StoreError> {
        let raw: String = self.timed(self.zsum.eval(&self.conn, &[key], &[])).await?;
        raw.parse::<f64>()
            .map_err(|_| StoreError::Protocol(format!("zsum returned {:?}", raw)))
    }

    async fn del(&self, key: &str) -> Result<bool, StoreError> {
        let mut cmd = ::redis::cmd("DEL");
        cmd.arg(key);
        self.query::<u64>(cmd).await.map(|n| n > 0)
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), StoreError> {
        let mut cmd = ::redis::cmd("RENAME");
        cmd.arg(from).arg(to);
        self.query::<()>(cmd).await
    }

    async fn hset(&self, key: &str, fields: &[(String, String)]) -> Result<(), StoreError> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut cmd = ::redis::cmd("HSET");
        cmd.arg(key);
        for (field, value) in fields {
            cmd.arg(field.as_str()).arg(value.as_str());
        }
        self.query::<i64>(cmd).await.map(|_| ())
    }

    async fn hgetall(&self, key: &str) -> Result<Record, StoreError> {
        let mut cmd = ::redis::cmd("HGETALL");
        cmd.arg(key);
        let flat: Vec<Option<String>> = self.query(cmd).await?;
        Ok(decode::decode_pairs(flat)?)
    }

    async fn touch_visit(&self, key: &str, now: &str) -> Result<Option<VisitCounters>, StoreError> {
        let reply: Option<(u64, u64)> = self
            .timed(self.touch_visit.eval(&self.conn, &[key], &[now.to_string()]))
            .await?;
        Ok(reply.map(|(visited, update_ident)| VisitCounters { visited, update_ident }))
    }

    async fn scan(&self, pattern: &str, cursor: u64, count: usize) -> Result<(u64, Vec<String>), StoreError> {
        let mut cmd = ::redis::cmd("SCAN");
        cmd.arg(cursor).arg("MATCH").arg(pattern).arg("COUNT").arg(count.max(1));
        self.query(cmd).await
    }

    async fn scan_match(&self, request: &ScanRequest) -> Result<Vec<Record>, StoreError> {
        let limit = request
            .limit
            .map(|l| l.to_string())
            .unwrap_or_else(|| "-1".to_string());
        let mut args = vec![
            request.pattern.clone(),
            request.test_field.clone(),
            request.needle.clone(),
            request.offset.to_string(),
            limit,
            request.batch.max(1).to_string(),
        ];
        args.extend(request.fields.iter().cloned());

        let rows: Vec<Vec<Option<String>>> = self.timed(self.scan_match.eval(&self.conn, &[], &args)).await?;
        rows.into_iter()
            .map(|row| {
                let row = if request.fields.is_empty() {
                    RawRow::Pairs(row)
                } else {
                    RawRow::Positional(row)
                };
                decode::decode_row(row, &request.fields).map_err(StoreError::from)
            })
            .collect()
    }

    async fn count_keys(&self, pattern: &str, batch: usize) -> Result<KeyCount, StoreError> {
        let (count, bytes): (u64, u64) = self
            .timed(
                self.count_keys
                    .eval(&self.conn, &[], &[pattern.to_string(), batch.max(1).to_string()]),
            )
            .await?;
        Ok(KeyCount { count, bytes })
    }

    async fn server_version(&self) -> Result<String, StoreError> {
        let mut cmd = ::redis::cmd("INFO");
        cmd.arg("server");
        let info: String = self.query(cmd).await?;
        parse_server_version(&info)
            .map(|v| format!("Redis {}", v))
            .ok_or_else(|| StoreError::Protocol("INFO server has no redis_version".to_string()))
    }
}

/// Pull `redis_version` out of an `INFO server` reply
fn parse_server_version(info: &str) -> Option<&str> {
    info.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| *name == "redis_version")
        .map(|(_, value)| value.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_server_version() {
        let info = "# Server\r\nredis_version:7.2.4\r\nredis_git_sha1:00000000\r\nredis_mode:standalone\r\n";
        assert_eq!(parse_server_version(info), Some("7.2.4"));
        assert_eq!(parse_server_version("# Server\r\nredis_mode:standalone\r\n"), None);
    }

    #[test]
    fn test_error_classification() {
        let noscript = RedisError::from((ErrorKind::NoScriptError, "NOSCRIPT", "No matching script".to_string()));
        assert!(matches!(StoreError::from(noscript), StoreError::ScriptMissing(_)));

        let io = RedisError::from(std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"));
        assert!(StoreError::from(io).is_unavailable());

        let wrong = RedisError::from((ErrorKind::TypeError, "WRONGTYPE"));
        assert!(matches!(StoreError::from(wrong), StoreError::Protocol(_)));
    }

    #[test]
    fn test_scripts_embedded() {
        assert!(TOUCH_VISIT.contains("HINCRBY"));
        assert!(SCAN_MATCH.contains("string.find(text, needle, 1, true)"));
        assert!(COUNT_KEYS.contains("MEMORY"));
        assert!(ZSUM.contains("WITHSCORES"));
    }
}
