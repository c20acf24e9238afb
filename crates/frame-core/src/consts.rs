//! Names, ports and codes shared by the whole framework

/// Header carrying the correlation identifier, also the log field name
pub const TRACE_ID_KEY: &str = "trace_id";

pub const MODE_JSON: &str = "json";
pub const MODE_TEXT: &str = "text";

pub const LOG_LEVEL_INFO: &str = "info";

/// Accepted `log_level` values, most verbose first
pub const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "fatal", "panic"];

pub const DEFAULT_METRIC_NAME: &str = "metric";
pub const DEFAULT_METRICS_NAME: &str = "metrics";
pub const DEFAULT_METRIC_PATH: &str = "/metrics";
pub const DEFAULT_METRIC_PORT: &str = ":9090";
pub const DEFAULT_BUS_NAME: &str = "server";
pub const DEFAULT_BUS_PORT: &str = ":8080";

pub const DEFAULT_SLOW_THRESHOLD_SEC: u64 = 5;
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Environment variable holding the configuration file path
pub const CONFIG_PATH_ENV: &str = "CONFPATH";
pub const DEFAULT_CONFIG_PATH: &str = "./conf/default.json";

/// Prefix for `FRAME__SECTION__KEY` environment overrides
pub const ENV_OVERRIDE_PREFIX: &str = "FRAME";

pub const SUCCESS_CODE: &str = "0";
pub const SUCCESS_MSG: &str = "ok";

pub const REDACTED: &str = "******";
