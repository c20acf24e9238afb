//! Configuration model, default filling and validation

use crate::consts::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Project configuration, loaded once at startup
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub project: String,
    pub log_level: String,
    pub log_mode: String,
    pub print_conf: bool,
    pub enable_metric: bool,
    pub env: String,
    pub http_server: HttpServer,
    pub http_client: HttpClientConfig,
    pub mysql: MysqlConfig,
    pub redis: RedisConfig,
}

/// Outbound HTTP client settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HttpClientConfig {
    pub disable_req_log: bool,
    pub enable_metric: bool,
}

/// Inbound HTTP server settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HttpServer {
    pub enable: bool,
    pub enable_cors: bool,
    pub disable_req_log: bool,
    pub configs: Vec<HttpServerItem>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HttpServerItem {
    pub name: String,
    pub port: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MysqlConfig {
    pub enable: bool,
    pub disable_req_log: bool,
    pub configs: Vec<MysqlItem>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MysqlItem {
    pub name: String,
    pub enable: bool,
    /// Create the database when missing and run registered table migrations
    pub enable_auto_migrate: bool,
    /// `host:port`
    pub host: String,
    pub database: String,
    pub user: String,
    pub password: String,
    pub slow_threshold_sec: u64,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RedisConfig {
    pub enable: bool,
    pub disable_req_log: bool,
    pub configs: Vec<RedisItem>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RedisItem {
    pub name: String,
    pub enable: bool,
    /// `host:port`
    pub host: String,
    pub pool_size: u32,
    pub password: String,
    pub db: i64,
}

/// Kind of named backend held by the connection registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Mysql,
    Redis,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Mysql => write!(f, "mysql"),
            BackendKind::Redis => write!(f, "redis"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn with_error(mut self, field: impl Into<String>, message: impl Into<String>) -> Self {
        self.valid = false;
        self.errors.push(ValidationError {
            field: field.into(),
            message: message.into(),
        });
        self
    }

    pub fn with_warning(mut self, field: impl Into<String>, message: impl Into<String>) -> Self {
        self.warnings.push(ValidationWarning {
            field: field.into(),
            message: message.into(),
        });
        self
    }

    /// Error lines in declaration order
    pub fn error_messages(&self) -> Vec<String> {
        self.errors.iter().map(|e| e.to_string()).collect()
    }
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// True for the names reserved for the metrics listener
pub fn is_metric_name(name: &str) -> bool {
    name == DEFAULT_METRIC_NAME || name == DEFAULT_METRICS_NAME
}

/// True for the default metrics port, with or without the leading colon
pub fn is_metric_port(port: &str) -> bool {
    port.trim_start_matches(':') == DEFAULT_METRIC_PORT.trim_start_matches(':')
}

/// Parses `:8080` into `8080`. Ports without the colon or out of range yield `None`.
pub fn parse_port(port: &str) -> Option<u16> {
    let digits = port.strip_prefix(':')?;
    match digits.parse::<u16>() {
        Ok(0) | Err(_) => None,
        Ok(p) => Some(p),
    }
}

impl HttpServerItem {
    pub fn new(name: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            port: port.into(),
        }
    }

    pub fn is_metric(&self) -> bool {
        is_metric_name(&self.name)
    }

    fn validate(&self, index: usize, mut result: ValidationResult) -> ValidationResult {
        let field = format!("http_server.configs[{}]", index);
        if self.name.is_empty() {
            result = result.with_error(
                format!("{}.name", field),
                "http server name can't be empty, eg: server",
            );
        }
        if !self.port.starts_with(':') {
            result = result.with_error(
                format!("{}.port", field),
                "http server port must start with ':', eg: :8080",
            );
        } else if parse_port(&self.port).is_none() {
            result = result.with_error(
                format!("{}.port", field),
                "http server port must be in range 1 ~ 65535, eg: :8080",
            );
        }
        if is_metric_port(&self.port) && !self.is_metric() {
            result = result.with_error(
                format!("{}.port", field),
                format!(
                    "{} http port can't be set to {}, it is the default metric port",
                    self.name, DEFAULT_METRIC_PORT
                ),
            );
        }
        result
    }
}

impl HttpServer {
    /// The listener named `metric` or `metrics`
    pub fn metric_server(&self) -> Option<&HttpServerItem> {
        self.configs.iter().find(|c| c.is_metric())
    }

    /// The first non-metric listener
    pub fn business_server(&self) -> Option<&HttpServerItem> {
        self.configs.iter().find(|c| !c.is_metric())
    }

    /// Metric and business listeners share one port
    pub fn is_metric_port_merged(&self) -> bool {
        if !self.enable {
            return false;
        }
        match (self.metric_server(), self.business_server()) {
            (Some(m), Some(b)) => {
                let mp = m.port.trim_start_matches(':');
                !mp.is_empty() && mp == b.port.trim_start_matches(':')
            }
            _ => false,
        }
    }

    fn validate(&self, mut result: ValidationResult) -> ValidationResult {
        if !self.enable {
            return result;
        }
        if self.configs.is_empty() {
            result = result.with_error(
                "http_server.configs",
                "http server is enabled but no server name/port is declared",
            );
        }
        for (i, item) in self.configs.iter().enumerate() {
            result = item.validate(i, result);
        }
        result
    }
}

impl MysqlItem {
    fn validate(&self, index: usize, mut result: ValidationResult) -> ValidationResult {
        if !self.enable {
            return result;
        }
        let field = format!("mysql.configs[{}]", index);
        let required = [
            ("name", &self.name, "demo"),
            ("host", &self.host, "127.0.0.1:3306"),
            ("database", &self.database, "demo"),
            ("user", &self.user, "demo"),
            ("password", &self.password, "demo"),
        ];
        for (key, value, example) in required {
            if value.is_empty() {
                result = result.with_error(
                    format!("{}.{}", field, key),
                    format!("mysql {} can't be empty, eg: {}", key, example),
                );
            }
        }
        result
    }
}

impl MysqlConfig {
    fn validate(&self, mut result: ValidationResult) -> ValidationResult {
        if !self.enable {
            return result;
        }
        if self.configs.is_empty() {
            result = result.with_error(
                "mysql.configs",
                "mysql is enabled but no mysql config is declared",
            );
        }
        for (i, item) in self.configs.iter().enumerate() {
            result = item.validate(i, result);
        }
        result
    }

    /// Entry for `name` when it exists, is enabled and opts into auto-migrate
    pub fn auto_migrate_enabled(&self, name: &str) -> bool {
        self.enable
            && self
                .configs
                .iter()
                .any(|c| c.name == name && c.enable && c.enable_auto_migrate)
    }
}

impl RedisItem {
    fn validate(&self, index: usize, mut result: ValidationResult) -> ValidationResult {
        if !self.enable {
            return result;
        }
        let field = format!("redis.configs[{}]", index);
        if self.name.is_empty() {
            result = result.with_error(
                format!("{}.name", field),
                "redis name can't be empty, eg: demo",
            );
        }
        if self.host.is_empty() {
            result = result.with_error(
                format!("{}.host", field),
                "redis host can't be empty, eg: 127.0.0.1:6379",
            );
        }
        result
    }
}

impl RedisConfig {
    fn validate(&self, mut result: ValidationResult) -> ValidationResult {
        if !self.enable {
            return result;
        }
        if self.configs.is_empty() {
            result = result.with_error(
                "redis.configs",
                "redis is enabled but no redis config is declared",
            );
        }
        for (i, item) in self.configs.iter().enumerate() {
            result = item.validate(i, result);
        }
        result
    }
}

impl Config {
    /// Fills missing fields. Runs once, before validation.
    pub fn apply_defaults(&mut self) {
        self.log_level = self.log_level.trim().to_lowercase();
        self.log_mode = self.log_mode.trim().to_lowercase();
        if self.log_level.is_empty() {
            self.log_level = LOG_LEVEL_INFO.to_string();
        }
        if self.log_mode.is_empty() {
            self.log_mode = MODE_JSON.to_string();
        }

        if self.http_server.enable {
            if self.http_server.business_server().is_none() {
                self.http_server
                    .configs
                    .push(HttpServerItem::new(DEFAULT_BUS_NAME, DEFAULT_BUS_PORT));
            }
            if self.enable_metric && self.http_server.metric_server().is_none() {
                self.http_server
                    .configs
                    .push(HttpServerItem::new(DEFAULT_METRIC_NAME, DEFAULT_METRIC_PORT));
            }
        }

        for item in &mut self.mysql.configs {
            if item.slow_threshold_sec == 0 {
                item.slow_threshold_sec = DEFAULT_SLOW_THRESHOLD_SEC;
            }
            if item.max_connections == 0 {
                item.max_connections = DEFAULT_MAX_CONNECTIONS;
            }
            if item.name.is_empty() && !item.database.is_empty() {
                item.name = item.database.clone();
            }
        }
    }

    /// Collects every problem instead of stopping at the first one
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::ok();

        if self.project.is_empty() {
            result = result.with_error("project", "project name can't be empty, eg: demo");
        }
        if !LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            result = result.with_error(
                "log_level",
                format!("log_level must be one of: {}", LOG_LEVELS.join("/")),
            );
        }
        let mode = self.log_mode.to_lowercase();
        if mode != MODE_JSON && mode != MODE_TEXT {
            result = result.with_error("log_mode", "log_mode must be one of: json/text");
        }
        if self.env.is_empty() {
            result = result.with_error("env", "env can't be empty, eg: dev");
        }

        result = self.http_server.validate(result);
        result = self.mysql.validate(result);
        result = self.redis.validate(result);

        if self.enable_metric && !self.http_server.enable {
            result = result.with_warning(
                "enable_metric",
                "metrics are recorded but http_server is disabled, /metrics will not be served",
            );
        }
        for (i, item) in self.redis.configs.iter().enumerate() {
            if item.enable && item.pool_size > 1 {
                result = result.with_warning(
                    format!("redis.configs[{}].pool_size", i),
                    "redis clients share one multiplexed connection, pool_size is advisory",
                );
            }
        }

        result
    }

    /// Copy safe to print: credentials are masked
    pub fn redacted(&self) -> Config {
        let mut copy = self.clone();
        for item in &mut copy.mysql.configs {
            if !item.password.is_empty() {
                item.password = REDACTED.to_string();
            }
        }
        for item in &mut copy.redis.configs {
            if !item.password.is_empty() {
                item.password = REDACTED.to_string();
            }
        }
        copy
    }

    pub fn metric_port(&self) -> Option<&str> {
        self.http_server.metric_server().map(|s| s.port.as_str())
    }

    pub fn server_port(&self) -> Option<&str> {
        self.http_server.business_server().map(|s| s.port.as_str())
    }

    /// Metrics are served on the business listener
    pub fn is_metric_port_merged(&self) -> bool {
        self.enable_metric && self.http_server.is_metric_port_merged()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            project: "demo".to_string(),
            env: "dev".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults_fill_log_and_servers() {
        let mut config = base_config();
        config.enable_metric = true;
        config.http_server.enable = true;
        config.apply_defaults();

        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_mode, "json");
        assert_eq!(config.server_port(), Some(":8080"));
        assert_eq!(config.metric_port(), Some(":9090"));
        assert!(!config.is_metric_port_merged());
        assert!(config.validate().valid);
    }

    #[test]
    fn test_defaults_fill_mysql_items() {
        let mut config = base_config();
        config.mysql.configs.push(MysqlItem {
            database: "orders".to_string(),
            ..Default::default()
        });
        config.apply_defaults();

        let item = &config.mysql.configs[0];
        assert_eq!(item.name, "orders");
        assert_eq!(item.slow_threshold_sec, 5);
        assert_eq!(item.max_connections, 10);
    }

    #[test]
    fn test_log_level_is_case_insensitive() {
        let mut config = base_config();
        config.log_level = "WARN".to_string();
        config.log_mode = "Text".to_string();
        config.apply_defaults();

        assert_eq!(config.log_level, "warn");
        assert_eq!(config.log_mode, "text");
        assert!(config.validate().valid);
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let mut config = Config {
            log_level: "verbose".to_string(),
            log_mode: "xml".to_string(),
            ..Default::default()
        };
        config.mysql.enable = true;
        config.redis.enable = true;
        config.redis.configs.push(RedisItem {
            enable: true,
            ..Default::default()
        });

        let result = config.validate();
        assert!(!result.valid);
        let fields: Vec<_> = result.errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "project",
                "log_level",
                "log_mode",
                "env",
                "mysql.configs",
                "redis.configs[0].name",
                "redis.configs[0].host",
            ]
        );
    }

    #[test]
    fn test_disabled_entries_are_not_validated() {
        let mut config = base_config();
        config.apply_defaults();
        config.mysql.enable = true;
        config.mysql.configs.push(MysqlItem {
            name: "off".to_string(),
            enable: false,
            ..Default::default()
        });

        assert!(config.validate().valid);
    }

    #[test]
    fn test_business_server_cannot_take_metric_port() {
        let mut config = base_config();
        config.http_server.enable = true;
        config
            .http_server
            .configs
            .push(HttpServerItem::new("api", ":9090"));
        config.apply_defaults();

        let result = config.validate();
        assert!(!result.valid);
        assert!(result.errors[0].message.contains("default metric port"));
    }

    #[test]
    fn test_port_format() {
        assert_eq!(parse_port(":8080"), Some(8080));
        assert_eq!(parse_port("8080"), None);
        assert_eq!(parse_port(":0"), None);
        assert_eq!(parse_port(":70000"), None);

        let mut config = base_config();
        config.http_server.enable = true;
        config
            .http_server
            .configs
            .push(HttpServerItem::new("api", "8080"));
        config.apply_defaults();
        let result = config.validate();
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].field, "http_server.configs[0].port");
    }

    #[test]
    fn test_merged_metric_port() {
        let mut config = base_config();
        config.enable_metric = true;
        config.http_server.enable = true;
        config.http_server.configs = vec![
            HttpServerItem::new("api", ":8000"),
            HttpServerItem::new("metrics", ":8000"),
        ];
        config.apply_defaults();

        assert_eq!(config.http_server.configs.len(), 2);
        assert!(config.is_metric_port_merged());
    }

    #[test]
    fn test_redacted_masks_passwords() {
        let mut config = base_config();
        config.mysql.configs.push(MysqlItem {
            password: "secret".to_string(),
            ..Default::default()
        });
        config.redis.configs.push(RedisItem::default());

        let copy = config.redacted();
        assert_eq!(copy.mysql.configs[0].password, REDACTED);
        assert_eq!(copy.redis.configs[0].password, "");
        assert_eq!(config.mysql.configs[0].password, "secret");
    }

    #[test]
    fn test_auto_migrate_lookup() {
        let mut config = base_config();
        config.mysql.enable = true;
        config.mysql.configs.push(MysqlItem {
            name: "user".to_string(),
            enable: true,
            enable_auto_migrate: true,
            ..Default::default()
        });

        assert!(config.mysql.auto_migrate_enabled("user"));
        assert!(!config.mysql.auto_migrate_enabled("order"));
    }
}
