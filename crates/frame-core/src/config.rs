//! Configuration loading for frame
//!
//! The application file is JSON or YAML (picked by extension). Its path is
//! given explicitly, or read from `CONFPATH`, or defaults to
//! `./conf/default.json`. `FRAME__SECTION__KEY` environment variables
//! override single values.

use crate::consts::{CONFIG_PATH_ENV, DEFAULT_CONFIG_PATH, ENV_OVERRIDE_PREFIX};
use crate::error::{FrameError, Result};
use crate::types::{Config, ValidationWarning};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Path of the file the application configuration came from, recorded once
static CONFIG_FILE_PATH: OnceLock<PathBuf> = OnceLock::new();

/// Serialization format of a configuration file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
}

impl ConfigFormat {
    /// `.yml` and `.yaml` are YAML, everything else is JSON
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yml") | Some("yaml") => ConfigFormat::Yaml,
            _ => ConfigFormat::Json,
        }
    }

    fn file_format(self) -> config::FileFormat {
        match self {
            ConfigFormat::Json => config::FileFormat::Json,
            ConfigFormat::Yaml => config::FileFormat::Yaml,
        }
    }
}

/// Explicit path wins, then the environment value, then the default
pub fn resolve_config_path(explicit: Option<&str>, env_value: Option<String>) -> PathBuf {
    if let Some(path) = explicit.filter(|p| !p.is_empty()) {
        return PathBuf::from(path);
    }
    match env_value.filter(|p| !p.is_empty()) {
        Some(path) => PathBuf::from(path),
        None => PathBuf::from(DEFAULT_CONFIG_PATH),
    }
}

/// A validated configuration plus what is needed to report on it
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub path: PathBuf,
    pub format: ConfigFormat,
    pub warnings: Vec<ValidationWarning>,
}

impl LoadedConfig {
    /// Redacted dump in the file's own format, for `print_conf`
    pub fn render(&self) -> Result<String> {
        let redacted = self.config.redacted();
        let text = match self.format {
            ConfigFormat::Json => serde_json::to_string_pretty(&redacted)?,
            ConfigFormat::Yaml => serde_yaml::to_string(&redacted)?,
        };
        Ok(text)
    }
}

/// Loads, default-fills and validates the application configuration.
///
/// Validation problems are all collected into one
/// [`FrameError::InvalidConfig`].
pub fn load_config(explicit: Option<&str>) -> Result<LoadedConfig> {
    let path = resolve_config_path(explicit, std::env::var(CONFIG_PATH_ENV).ok());
    let loaded = load_config_file(&path)?;
    let _ = CONFIG_FILE_PATH.set(path);
    Ok(loaded)
}

/// Same as [`load_config`] for a fixed path, without recording it
pub fn load_config_file(path: &Path) -> Result<LoadedConfig> {
    if !path.exists() {
        return Err(FrameError::ConfigNotFound(path.display().to_string()));
    }
    let format = ConfigFormat::from_path(path);
    let manager = ConfigManager::with_env_overrides(path, format)?;
    let mut config: Config = manager.read_object()?;

    config.apply_defaults();
    let result = config.validate();
    if !result.valid {
        return Err(FrameError::InvalidConfig(result.error_messages()));
    }

    Ok(LoadedConfig {
        config,
        path: path.to_path_buf(),
        format,
        warnings: result.warnings,
    })
}

/// Generic reader over a configuration file, for application-defined sections
pub struct ConfigManager {
    inner: config::Config,
    path: PathBuf,
}

impl ConfigManager {
    /// Reads `path` as-is, without environment overrides
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let inner = config::Config::builder()
            .add_source(file_source(path, ConfigFormat::from_path(path)))
            .build()?;
        Ok(Self {
            inner,
            path: path.to_path_buf(),
        })
    }

    fn with_env_overrides(path: &Path, format: ConfigFormat) -> Result<Self> {
        let inner = config::Config::builder()
            .add_source(file_source(path, format))
            .add_source(
                config::Environment::with_prefix(ENV_OVERRIDE_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(Self {
            inner,
            path: path.to_path_buf(),
        })
    }

    /// Re-opens the file the application configuration was loaded from
    pub fn for_app() -> Result<Self> {
        let path = CONFIG_FILE_PATH
            .get()
            .ok_or_else(|| FrameError::Config("application config has not been loaded".into()))?;
        Self::new(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Deserializes the whole file into `T`
    pub fn read_object<T: DeserializeOwned>(&self) -> Result<T> {
        self.inner
            .clone()
            .try_deserialize()
            .map_err(|e| FrameError::Config(format!("failed to unmarshal config: {}", e)))
    }

    /// Reads one value by dotted key, e.g. `feature.limit`
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        Ok(self.inner.get(key)?)
    }
}

fn file_source(path: &Path, format: ConfigFormat) -> config::File<config::FileSourceFile, config::FileFormat> {
    config::File::from(path).format(format.file_format()).required(true)
}
