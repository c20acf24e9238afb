//! MySQL connections (sqlx)

use frame_core::{FrameError, MysqlItem, Result};
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlPoolOptions};
use sqlx::{ConnectOptions, Connection, Executor, MySqlPool};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

const DEFAULT_MYSQL_PORT: u16 = 3306;

/// A named MySQL pool plus its logging settings
pub struct Database {
    name: String,
    pool: MySqlPool,
    slow_threshold: Duration,
    log_queries: bool,
}

impl Database {
    /// Connects eagerly so a bad entry fails at startup.
    ///
    /// A missing database is created and the connect retried once, but only
    /// when the entry enables auto-migrate.
    pub async fn open(item: &MysqlItem, disable_req_log: bool) -> Result<Self> {
        info!(db = %item.name, host = %item.host, database = %item.database, "Opening MySQL pool");

        let options = connect_options(item, true, disable_req_log)?;
        let pool = match connect(item, options.clone()).await {
            Ok(pool) => pool,
            Err(e) if item.enable_auto_migrate && is_unknown_database(&e) => {
                warn!(database = %item.database, "Database does not exist, creating it");
                create_database(item).await?;
                connect(item, options).await.map_err(|e| {
                    FrameError::Database(format!(
                        "failed to connect to {} after creating it: {}",
                        item.database, e
                    ))
                })?
            }
            Err(e) => {
                return Err(FrameError::Database(format!(
                    "failed to connect to mysql '{}' at {}: {}",
                    item.name, item.host, e
                )))
            }
        };

        Ok(Self {
            name: item.name.clone(),
            pool,
            slow_threshold: Duration::from_secs(item.slow_threshold_sec),
            log_queries: !disable_req_log,
        })
    }

    /// Wraps an existing pool, for callers that manage their own connect
    pub fn from_pool(name: impl Into<String>, pool: MySqlPool, slow_threshold: Duration) -> Self {
        Self {
            name: name.into(),
            pool,
            slow_threshold,
            log_queries: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    pub fn slow_threshold(&self) -> Duration {
        self.slow_threshold
    }

    /// Binds this pool to one request's correlation id
    pub fn traced<'a>(&'a self, trace_id: &'a str) -> TracedDb<'a> {
        TracedDb { db: self, trace_id }
    }
}

/// A pool lookup made on behalf of one request
pub struct TracedDb<'a> {
    db: &'a Database,
    trace_id: &'a str,
}

impl<'a> TracedDb<'a> {
    pub fn pool(&self) -> &'a MySqlPool {
        &self.db.pool
    }

    pub fn name(&self) -> &str {
        &self.db.name
    }

    pub fn trace_id(&self) -> &str {
        self.trace_id
    }

    /// Runs a query against the pool and logs it with the request's trace id.
    ///
    /// Failures log at `error` (a missing row is not a failure), queries slower
    /// than the configured threshold at `warn`.
    pub async fn run<T, F, Fut>(&self, label: &str, query: F) -> std::result::Result<T, sqlx::Error>
    where
        F: FnOnce(&'a MySqlPool) -> Fut,
        Fut: Future<Output = std::result::Result<T, sqlx::Error>>,
    {
        let start = Instant::now();
        let result = query(&self.db.pool).await;
        let elapsed = start.elapsed();

        if self.db.log_queries {
            let duration = elapsed.as_millis() as u64;
            match &result {
                Err(sqlx::Error::RowNotFound) | Ok(_) if elapsed > self.db.slow_threshold => {
                    warn!(trace_id = %self.trace_id, db = %self.db.name, duration, "slow query: {}", label)
                }
                Err(sqlx::Error::RowNotFound) | Ok(_) => {
                    info!(trace_id = %self.trace_id, db = %self.db.name, duration, "{}", label)
                }
                Err(e) => {
                    error!(trace_id = %self.trace_id, db = %self.db.name, duration, error = %e, "{}", label)
                }
            }
        }

        result
    }
}

async fn connect(item: &MysqlItem, options: MySqlConnectOptions) -> std::result::Result<MySqlPool, sqlx::Error> {
    MySqlPoolOptions::new()
        .max_connections(item.max_connections.max(1))
        .connect_with(options)
        .await
}

/// Connect options for an entry, optionally without selecting the database
pub fn connect_options(
    item: &MysqlItem,
    with_database: bool,
    disable_req_log: bool,
) -> Result<MySqlConnectOptions> {
    let (host, port) = split_host_port(&item.host, DEFAULT_MYSQL_PORT)?;
    let mut options = MySqlConnectOptions::new()
        .host(&host)
        .port(port)
        .username(&item.user)
        .password(&item.password)
        .charset("utf8mb4");
    if with_database {
        options = options.database(&item.database);
    }
    if disable_req_log {
        options = options.disable_statement_logging();
    }
    Ok(options)
}

/// Splits `host:port`; a bare host gets `default_port`
pub fn split_host_port(host: &str, default_port: u16) -> Result<(String, u16)> {
    match host.rsplit_once(':') {
        Some((name, port)) => {
            let port = port
                .parse::<u16>()
                .map_err(|_| FrameError::Config(format!("invalid port in host '{}'", host)))?;
            Ok((name.to_string(), port))
        }
        None => Ok((host.to_string(), default_port)),
    }
}

fn is_unknown_database(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|e| e.message().contains("Unknown database"))
        .unwrap_or(false)
}

pub fn create_database_sql(database: &str) -> String {
    format!(
        "CREATE DATABASE `{}` CHARACTER SET utf8mb4 COLLATE utf8mb4_unicode_ci",
        database.replace('`', "``")
    )
}

async fn create_database(item: &MysqlItem) -> Result<()> {
    let options = connect_options(item, false, false)?;
    let mut conn = MySqlConnection::connect_with(&options)
        .await
        .map_err(|e| FrameError::Database(format!("failed to connect to {}: {}", item.host, e)))?;

    conn.execute(create_database_sql(&item.database).as_str())
        .await
        .map_err(|e| {
            FrameError::Database(format!("failed to create database {}: {}", item.database, e))
        })?;

    info!(database = %item.database, "Database created");
    let _ = conn.close().await;
    Ok(())
}
