//! Server script handles / 服务端脚本句柄
//!
//! A handle owns the script source and the SHA the server assigned to it.
//! Calls go through `EVALSHA`; when the server answers `NOSCRIPT` (restart,
//! `SCRIPT FLUSH`, failover) the source is registered again and the call is
//! retried once. A second `NOSCRIPT` is reported as
//! [`StoreError::ScriptMissing`].

use std::future::Future;

use ::redis::aio::ConnectionManager;
use ::redis::{ErrorKind, FromRedisValue};
use parking_lot::RwLock;

use super::StoreError;

pub struct ScriptHandle {
    name: &'static str,
    source: &'static str,
    sha: RwLock<Option<String>>,
}

impl ScriptHandle {
    pub fn new(name: &'static str, source: &'static str) -> Self {
        Self {
            name,
            source,
            sha: RwLock::new(None),
        }
    }

    /// Register the script and remember its SHA / 注册脚本
    pub async fn load(&self, conn: &ConnectionManager) -> Result<String, StoreError> {
        let mut conn = conn.clone();
        let sha: String = ::redis::cmd("SCRIPT")
            .arg("LOAD")
            .arg(self.source)
            .query_async(&mut conn)
            .await
            .map_err(StoreError::from)?;
        tracing::debug!("Registered script {} as {}", self.name, sha);
        *self.sha.write() = Some(sha.clone());
        Ok(sha)
    }

    /// Run the script with `keys` and `args` / 执行脚本
    pub async fn eval<T>(&self, conn: &ConnectionManager, keys: &[&str], args: &[String]) -> Result<T, StoreError>
    where
        T: FromRedisValue + Send,
    {
        let cached = self.sha.read().clone();
        with_reload(
            self.name,
            cached,
            || self.load(conn),
            |sha| {
                let mut conn = conn.clone();
                let mut cmd = ::redis::cmd("EVALSHA");
                cmd.arg(sha).arg(keys.len());
                for key in keys {
                    cmd.arg(*key);
                }
                for arg in args {
                    cmd.arg(arg.as_str());
                }
                async move {
                    cmd.query_async::<_, T>(&mut conn).await.map_err(|e| {
                        if e.kind() == ErrorKind::NoScriptError {
                            StoreError::ScriptMissing(e.to_string())
                        } else {
                            StoreError::from(e)
                        }
                    })
                }
            },
        )
        .await
    }
}

/// Evaluate by SHA, re-registering and retrying exactly once on a missing
/// script / 脚本缺失时重新注册并重试一次
pub(crate) async fn with_reload<T, L, LF, E, EF>(
    name: &str,
    cached: Option<String>,
    mut load: L,
    mut eval: E,
) -> Result<T, StoreError>
where
    L: FnMut() -> LF,
    LF: Future<Output = Result<String, StoreError>>,
    E: FnMut(String) -> EF,
    EF: Future<Output = Result<T, StoreError>>,
{
    let sha = match cached {
        Some(sha) => sha,
        None => load().await?,
    };

    match eval(sha).await {
        Err(StoreError::ScriptMissing(_)) => {
            tracing::warn!("Script {} missing on server, registering again", name);
            let sha = load().await?;
            eval(sha).await.map_err(|e| match e {
                StoreError::ScriptMissing(_) => StoreError::ScriptMissing(name.to_string()),
                other => other,
            })
        }
        other => other,
    }
}
