//! Connection registry: logical name → live backend handle
//!
//! Built exactly once from the enabled configuration entries. After that it
//! is only read, through an `Arc`, so lookups take no lock.

use super::{Cache, Database};
use frame_core::{BackendKind, Config, FrameError, Result};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use tokio::sync::OnceCell;
use tracing::info;

/// Handles of one kind, keyed by configured name
pub struct NamedRegistry<T> {
    kind: BackendKind,
    entries: HashMap<String, T>,
}

impl<T> NamedRegistry<T> {
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            entries: HashMap::new(),
        }
    }

    /// Fails on a duplicate name
    pub fn insert(&mut self, name: impl Into<String>, value: T) -> Result<()> {
        let name = name.into();
        if self.entries.contains_key(&name) {
            return Err(FrameError::Config(format!(
                "{} client '{}' is declared twice",
                self.kind, name
            )));
        }
        self.entries.insert(name, value);
        Ok(())
    }

    /// Looks a handle up by name.
    ///
    /// Without a name the single registered handle is returned; zero or
    /// several handles make the lookup fail.
    pub fn get(&self, name: Option<&str>) -> Result<&T> {
        match name {
            Some(name) => self
                .entries
                .get(name)
                .ok_or_else(|| FrameError::UnknownBackend {
                    kind: self.kind,
                    name: name.to_string(),
                }),
            None => {
                let mut values = self.entries.values();
                match (values.next(), values.next()) {
                    (Some(only), None) => Ok(only),
                    (None, _) => Err(FrameError::NoBackend { kind: self.kind }),
                    _ => Err(FrameError::AmbiguousBackend {
                        kind: self.kind,
                        count: self.entries.len(),
                    }),
                }
            }
        }
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Every backend the process talks to
pub struct Backends {
    pub mysql: NamedRegistry<Database>,
    pub redis: NamedRegistry<Cache>,
}

impl Backends {
    pub fn empty() -> Self {
        Self {
            mysql: NamedRegistry::new(BackendKind::Mysql),
            redis: NamedRegistry::new(BackendKind::Redis),
        }
    }

    /// Opens every enabled entry. Any failure aborts the whole set.
    pub async fn open(config: &Config) -> Result<Self> {
        let mut backends = Self::empty();

        if config.mysql.enable {
            for item in config.mysql.configs.iter().filter(|c| c.enable) {
                let db = Database::open(item, config.mysql.disable_req_log).await?;
                info!(db = %item.name, host = %item.host, "mysql client registered");
                backends.mysql.insert(item.name.clone(), db)?;
            }
        }

        if config.redis.enable {
            for item in config.redis.configs.iter().filter(|c| c.enable) {
                let cache = Cache::open(item, config.redis.disable_req_log).await?;
                info!(cache = %item.name, host = %item.host, "redis client registered");
                backends.redis.insert(item.name.clone(), cache)?;
            }
        }

        Ok(backends)
    }
}

/// One-time initialization guard around [`Backends`]
pub struct Registry {
    cell: OnceCell<Arc<Backends>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    /// Opens the configured backends, once
    pub async fn init(&self, config: &Config) -> Result<Arc<Backends>> {
        self.init_with(|| Backends::open(config)).await
    }

    /// Runs `open` at most once, however many callers race here.
    ///
    /// Every caller gets the same set. A failed attempt leaves the registry
    /// empty so a later call may try again.
    pub async fn init_with<F, Fut>(&self, open: F) -> Result<Arc<Backends>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Backends>>,
    {
        let backends = self
            .cell
            .get_or_try_init(|| async { open().await.map(Arc::new) })
            .await?;
        Ok(backends.clone())
    }

    pub fn get(&self) -> Option<Arc<Backends>> {
        self.cell.get().cloned()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide registry used by [`crate::App`]
pub fn global() -> &'static Registry {
    static GLOBAL: OnceLock<Registry> = OnceLock::new();
    GLOBAL.get_or_init(Registry::new)
}
