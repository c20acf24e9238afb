//! Redis connections

use super::db::split_host_port;
use frame_core::{FrameError, RedisItem, Result};
use redis::aio::ConnectionManager;
use redis::{Arg, Cmd, ConnectionAddr, ConnectionInfo, FromRedisValue, RedisConnectionInfo, ToRedisArgs, Value};
use std::time::Instant;
use tracing::{error, info};

const DEFAULT_REDIS_PORT: u16 = 6379;

/// A named Redis handle.
///
/// The connection manager multiplexes one connection and reconnects on its
/// own, so `pool_size` from the configuration is advisory.
#[derive(Clone)]
pub struct Cache {
    name: String,
    manager: ConnectionManager,
    log_commands: bool,
}

impl Cache {
    /// Connects eagerly so a bad entry fails at startup
    pub async fn open(item: &RedisItem, disable_req_log: bool) -> Result<Self> {
        info!(cache = %item.name, host = %item.host, db = item.db, "Opening Redis connection");

        let client = redis::Client::open(connection_info(item)?)
            .map_err(|e| FrameError::Cache(format!("invalid redis '{}': {}", item.name, e)))?;
        let manager = ConnectionManager::new(client).await.map_err(|e| {
            FrameError::Cache(format!(
                "failed to connect to redis '{}' at {}: {}",
                item.name, item.host, e
            ))
        })?;

        Ok(Self {
            name: item.name.clone(),
            manager,
            log_commands: !disable_req_log,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// A cloned handle onto the shared connection
    pub fn connection(&self) -> ConnectionManager {
        self.manager.clone()
    }

    pub fn traced<'a>(&'a self, trace_id: &'a str) -> TracedCache<'a> {
        TracedCache {
            cache: self,
            trace_id,
        }
    }
}

/// Commands issued on behalf of one request, each logged with its trace id
pub struct TracedCache<'a> {
    cache: &'a Cache,
    trace_id: &'a str,
}

impl<'a> TracedCache<'a> {
    pub fn name(&self) -> &str {
        &self.cache.name
    }

    pub fn connection(&self) -> ConnectionManager {
        self.cache.connection()
    }

    /// Runs an arbitrary command
    pub async fn query<T: FromRedisValue>(&self, cmd: &Cmd) -> redis::RedisResult<T> {
        let mut conn = self.cache.manager.clone();
        let start = Instant::now();
        let result = cmd.query_async::<_, T>(&mut conn).await;
        self.log(&format!("command: {}", render_command(cmd)), start, result.as_ref().err());
        result
    }

    /// Sends the commands as one pipeline, logged as a single line
    pub async fn pipeline(&self, cmds: &[Cmd]) -> redis::RedisResult<Vec<Value>> {
        let mut pipe = redis::pipe();
        for cmd in cmds {
            pipe.add_command(cmd.clone());
        }

        let mut conn = self.cache.manager.clone();
        let start = Instant::now();
        let result = pipe.query_async::<_, Vec<Value>>(&mut conn).await;
        let rendered: Vec<String> = cmds.iter().map(render_command).collect();
        self.log(
            &format!("pipeline commands: [{}]", rendered.join("; ")),
            start,
            result.as_ref().err(),
        );
        result
    }

    pub async fn get<T: FromRedisValue>(&self, key: &str) -> redis::RedisResult<T> {
        self.query(redis::cmd("GET").arg(key)).await
    }

    pub async fn set<V: ToRedisArgs>(&self, key: &str, value: V) -> redis::RedisResult<()> {
        self.query(redis::cmd("SET").arg(key).arg(value)).await
    }

    pub async fn set_ex<V: ToRedisArgs>(&self, key: &str, value: V, seconds: u64) -> redis::RedisResult<()> {
        self.query(redis::cmd("SET").arg(key).arg(value).arg("EX").arg(seconds))
            .await
    }

    pub async fn del(&self, key: &str) -> redis::RedisResult<i64> {
        self.query(redis::cmd("DEL").arg(key)).await
    }

    pub async fn exists(&self, key: &str) -> redis::RedisResult<bool> {
        self.query(redis::cmd("EXISTS").arg(key)).await
    }

    fn log(&self, what: &str, start: Instant, err: Option<&redis::RedisError>) {
        if !self.cache.log_commands {
            return;
        }
        let duration = start.elapsed().as_millis() as u64;
        match err {
            // a nil reply is a miss, not a failure
            Some(e) if e.kind() != redis::ErrorKind::TypeError => {
                error!(trace_id = %self.trace_id, cache = %self.cache.name, duration, error = %e, "Redis {}", what)
            }
            _ => {
                info!(trace_id = %self.trace_id, cache = %self.cache.name, duration, "Redis {}", what)
            }
        }
    }
}

/// Address, credentials and logical database for an entry
pub fn connection_info(item: &RedisItem) -> Result<ConnectionInfo> {
    let (host, port) = split_host_port(&item.host, DEFAULT_REDIS_PORT)?;
    Ok(ConnectionInfo {
        addr: ConnectionAddr::Tcp(host, port),
        redis: RedisConnectionInfo {
            db: item.db,
            username: None,
            password: (!item.password.is_empty()).then(|| item.password.clone()),
        },
    })
}

/// Space-separated command text for logs
pub fn render_command(cmd: &Cmd) -> String {
    cmd.args_iter()
        .map(|arg| match arg {
            Arg::Simple(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            Arg::Cursor => "0".to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}
