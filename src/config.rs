//! Application configuration module / 应用配置模块
//!
//! Manages configuration loaded from config.json
//! Creates default config file on first run / 首次运行时创建默认配置文件

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration errors / 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid value for {name}: {value:?}")]
    Env { name: &'static str, value: String },
}

/// Application configuration / 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration / 服务器配置
    pub server: ServerConfig,
    /// Backing store configuration / 存储配置
    pub redis: RedisConfig,
    /// Search engine configuration / 搜索配置
    pub search: SearchConfig,
}

/// Server configuration / 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host address / 服务器监听地址
    pub host: String,
    /// Server port / 服务器端口
    pub port: u16,
}

/// Redis connection configuration / Redis 连接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Connection URL, `redis://[:password@]host:port[/db]`
    pub url: String,
    /// Seconds to wait for the initial connection, 0 = no limit / 连接超时
    pub connect_timeout_secs: u64,
    /// Seconds to wait for each reply, 0 = no limit / 响应超时
    pub response_timeout_secs: u64,
}

/// How the global word-count set is rebuilt / 词频重建方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebuildMode {
    /// Clear the live set, then fill it; readers may see a partial set
    InPlace,
    /// Fill a staging set, then swap it over the live one
    Staged,
}

/// Search engine configuration / 搜索配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Key namespace, without trailing colon / 键命名空间
    pub namespace: String,
    /// Substrings removed before tokenizing / 停用词
    pub stop_words: Vec<String>,
    /// Joins the external key and the value into display text / 显示文本分隔符
    pub display_separator: String,
    /// Prefix removed from external keys on ingestion / 去除的键前缀
    pub key_prefix_strip: String,
    /// Record-creation verb expected on every ingestion line / 导入行命令
    pub ingest_verb: String,
    /// Log progress every N records, 0 = never / 进度日志间隔
    pub checkpoint_every: u64,
    /// Concurrent store calls per fan-out batch, 0 = whole batch at once / 并发上限
    pub max_in_flight: usize,
    /// Upper bound on search page size / 搜索返回上限
    pub max_find_return: usize,
    /// Upper bound on visited entries in status / 统计返回上限
    pub max_stats_return: usize,
    /// SCAN COUNT hint / 扫描批量
    pub scan_batch: usize,
    /// Word-count rebuild strategy / 词频重建方式
    pub word_count_rebuild: RebuildMode,
}

/// Stop list applied before tokenizing / 默认停用词
pub const DEFAULT_STOP_WORDS: &[&str] = &[
    "的", "了", "\u{3000}", "”", "“", "’", "‘", "。", "，", "、", "？", "！", "；", "：", "「", "」",
    "『", "』", "（", "）", "—", "《", "》", "·", "…", "<br />",
];

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            connect_timeout_secs: 10,
            response_timeout_secs: 30,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            namespace: "fts:chinese".to_string(),
            stop_words: DEFAULT_STOP_WORDS.iter().map(|s| s.to_string()).collect(),
            display_separator: "<br />".to_string(),
            key_prefix_strip: "DONGDICT:".to_string(),
            ingest_verb: "HSET".to_string(),
            checkpoint_every: 1000,
            max_in_flight: 64,
            max_find_return: 100,
            max_stats_return: 100,
            scan_batch: 100,
            word_count_rebuild: RebuildMode::Staged,
        }
    }
}

impl AppConfig {
    /// Get the server bind address / 获取服务器绑定地址
    pub fn get_bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Apply environment overrides / 应用环境变量覆盖
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: std::str::FromStr>(name: &'static str, value: String) -> Result<T, ConfigError> {
            value.trim().parse().map_err(|_| ConfigError::Env { name, value })
        }

        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = parse("PORT", port)?;
        }

        if let Some(url) = lookup("REDIS_URL") {
            self.redis.url = url;
        } else if lookup("REDIS_HOST").is_some() || lookup("REDIS_PORT").is_some() {
            let host = lookup("REDIS_HOST").unwrap_or_else(|| "127.0.0.1".to_string());
            let port: u16 = match lookup("REDIS_PORT") {
                Some(port) => parse("REDIS_PORT", port)?,
                None => 6379,
            };
            self.redis.url = match lookup("REDIS_PASSWORD").filter(|p| !p.is_empty()) {
                Some(password) => format!("redis://:{}@{}:{}", password, host, port),
                None => format!("redis://{}:{}", host, port),
            };
        }

        if let Some(n) = lookup("MAX_FIND_RETURN") {
            self.search.max_find_return = parse("MAX_FIND_RETURN", n)?;
        }
        if let Some(n) = lookup("MAX_STATS_RETURN") {
            self.search.max_stats_return = parse("MAX_STATS_RETURN", n)?;
        }
        if let Some(ns) = lookup("FTS_NAMESPACE") {
            self.search.namespace = ns.trim_end_matches(':').to_string();
        }
        Ok(())
    }
}

impl RedisConfig {
    /// URL with any password masked, for logs / 隐藏密码的 URL
    pub fn redacted_url(&self) -> String {
        let Some((scheme, rest)) = self.url.split_once("://") else {
            return self.url.clone();
        };
        match rest.rsplit_once('@') {
            Some((credentials, host)) => {
                let user = credentials.split_once(':').map(|(u, _)| u).unwrap_or("");
                format!("{}://{}:***@{}", scheme, user, host)
            }
            None => self.url.clone(),
        }
    }
}

/// Default config file path / 默认配置文件路径
pub fn default_config_path() -> PathBuf {
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("config.json")
}

/// Load configuration from file, or create default if not exists / 加载配置文件，不存在则创建默认配置
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    if path.exists() {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: AppConfig = serde_json::from_str(&content)?;
        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    } else {
        let config = AppConfig::default();
        save_config(path, &config)?;
        tracing::info!("Created default configuration at {:?}", path);
        Ok(config)
    }
}

/// Save configuration to file / 保存配置到文件
pub fn save_config(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = load_config(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.search.namespace, "fts:chinese");
        assert_eq!(config.search.stop_words.len(), 26);
        assert_eq!(config.search.word_count_rebuild, RebuildMode::Staged);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"search":{"namespace":"fts:test","word_count_rebuild":"in_place"}}"#).unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.search.namespace, "fts:test");
        assert_eq!(config.search.word_count_rebuild, RebuildMode::InPlace);
        assert_eq!(config.search.checkpoint_every, 1000);
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn test_bad_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default();
        config
            .apply_overrides(env(&[
                ("PORT", "8080"),
                ("REDIS_HOST", "cache"),
                ("REDIS_PASSWORD", "secret"),
                ("MAX_FIND_RETURN", "20"),
                ("FTS_NAMESPACE", "fts:other:"),
            ]))
            .unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.redis.url, "redis://:secret@cache:6379");
        assert_eq!(config.search.max_find_return, 20);
        assert_eq!(config.search.namespace, "fts:other");
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let mut config = AppConfig::default();
        let err = config.apply_overrides(env(&[("PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::Env { name: "PORT", .. }));
    }

    #[test]
    fn test_redacted_url() {
        let mut redis = RedisConfig::default();
        assert_eq!(redis.redacted_url(), "redis://127.0.0.1:6379");
        redis.url = "redis://:hunter2@cache:6379/0".to_string();
        assert_eq!(redis.redacted_url(), "redis://:***@cache:6379/0");
    }
}
