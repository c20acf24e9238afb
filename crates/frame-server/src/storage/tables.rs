//! Table registration and startup auto-migrate

use super::Backends;
use frame_core::Config;
use futures::future::BoxFuture;
use sqlx::MySqlPool;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

/// A table the application owns
pub trait Table: Send + Sync {
    fn table_name(&self) -> &str;

    /// Idempotent DDL, normally `CREATE TABLE IF NOT EXISTS ...`
    fn create_sql(&self) -> String;
}

/// Seed step run after a table's DDL
pub type TableInitFn =
    Arc<dyn for<'p> Fn(&'p MySqlPool) -> BoxFuture<'p, Result<(), sqlx::Error>> + Send + Sync>;

/// Boxes an async closure into a [`TableInitFn`]
pub fn init_fn<F>(f: F) -> TableInitFn
where
    F: for<'p> Fn(&'p MySqlPool) -> BoxFuture<'p, Result<(), sqlx::Error>> + Send + Sync + 'static,
{
    Arc::new(f)
}

#[derive(Clone)]
struct Registered {
    table: Arc<dyn Table>,
    init_fns: Vec<TableInitFn>,
}

/// Tables per database name, in name order
#[derive(Default)]
pub struct TableRegistry {
    tables: Mutex<BTreeMap<String, Vec<Registered>>>,
}

impl TableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table under `database`. Returns false when a table with the
    /// same name is already registered there; the first one is kept.
    pub fn register(
        &self,
        database: &str,
        table: impl Table + 'static,
        init_fns: Vec<TableInitFn>,
    ) -> bool {
        let mut tables = match self.tables.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let entries = tables.entry(database.to_string()).or_default();
        if entries
            .iter()
            .any(|r| r.table.table_name() == table.table_name())
        {
            warn!(database, table = table.table_name(), "Table already registered, ignoring");
            return false;
        }
        entries.push(Registered {
            table: Arc::new(table),
            init_fns,
        });
        true
    }

    /// Registered table names for `database`
    pub fn tables(&self, database: &str) -> Vec<String> {
        self.snapshot()
            .get(database)
            .map(|entries| {
                entries
                    .iter()
                    .map(|r| r.table.table_name().to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Creates the registered tables in every database with auto-migrate on.
    ///
    /// Failures are logged and skipped; init functions run even when the DDL
    /// failed. Returns how many tables were checked.
    pub async fn auto_migrate(&self, config: &Config, backends: &Backends) -> usize {
        let mut checked = 0;

        for (database, entries) in self.snapshot() {
            if !config.mysql.auto_migrate_enabled(&database) {
                continue;
            }
            let db = match backends.mysql.get(Some(&database)) {
                Ok(db) => db,
                Err(e) => {
                    error!(database = %database, error = %e, "Auto-migrate skipped");
                    continue;
                }
            };

            for entry in entries {
                checked += 1;
                let name = entry.table.table_name();
                if let Err(e) = sqlx::query(&entry.table.create_sql())
                    .execute(db.pool())
                    .await
                {
                    error!(database = %database, table = name, error = %e, "Failed to create table");
                }
                for init in &entry.init_fns {
                    if let Err(e) = init(db.pool()).await {
                        error!(database = %database, table = name, error = %e, "Table init failed");
                    }
                }
            }
        }

        info!(count = checked, "Auto-migrate checked tables");
        checked
    }

    fn snapshot(&self) -> BTreeMap<String, Vec<Registered>> {
        match self.tables.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}
