//! Application bootstrap
//!
//! Loads the configuration, sets up logging and metrics, opens the
//! configured backends once and serves the application's routes.

use crate::handlers;
use crate::logging;
use crate::metrics;
use crate::middleware::{cors, request_log, trace_id};
use crate::services::HttpClient;
use crate::storage::{registry, Backends, Table, TableInitFn, TableRegistry};
use axum::{middleware::from_fn_with_state, routing::get, Router};
use frame_core::{load_config, parse_port, Config, FrameError, LoadedConfig, Result};
use metrics_exporter_prometheus::PrometheusHandle;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Router state handed to every handler
#[derive(Clone)]
pub struct FrameState {
    pub config: Arc<Config>,
    pub backends: Arc<Backends>,
    pub http: HttpClient,
}

impl FrameState {
    pub fn new(config: Config, backends: Arc<Backends>) -> Result<Self> {
        let http = HttpClient::new(&config.http_client)?;
        Ok(Self {
            config: Arc::new(config),
            backends,
            http,
        })
    }
}

pub struct App {
    loaded: LoadedConfig,
    tables: TableRegistry,
    metrics: Option<PrometheusHandle>,
}

impl App {
    /// Loads and validates the configuration, then sets up logging and,
    /// when enabled, the metrics recorder
    pub fn load(path: Option<&str>) -> Result<Self> {
        Self::from_loaded(load_config(path)?)
    }

    pub fn from_loaded(loaded: LoadedConfig) -> Result<Self> {
        let config = &loaded.config;
        logging::init(config);

        info!(
            project = %config.project,
            env = %config.env,
            path = %loaded.path.display(),
            "Configuration loaded"
        );
        for warning in &loaded.warnings {
            warn!("{}", warning);
        }
        if config.print_conf {
            info!("Configuration:\n{}", loaded.render()?);
        }

        let metrics = if config.enable_metric {
            Some(metrics::install()?)
        } else {
            None
        };

        Ok(Self {
            loaded,
            tables: TableRegistry::new(),
            metrics,
        })
    }

    pub fn config(&self) -> &Config {
        &self.loaded.config
    }

    /// Registers a table for auto-migrate. Returns false for a duplicate.
    pub fn register_table(
        &self,
        database: &str,
        table: impl Table + 'static,
        init_fns: Vec<TableInitFn>,
    ) -> bool {
        self.tables.register(database, table, init_fns)
    }

    pub fn tables(&self) -> &TableRegistry {
        &self.tables
    }

    /// Empty router for the application's routes
    pub fn router() -> Router<FrameState> {
        Router::new()
    }

    /// Opens the backends (once per process) and runs auto-migrate
    pub async fn connect(&self) -> Result<FrameState> {
        let config = self.config();
        let backends = registry::global().init(config).await?;
        info!(
            mysql = ?backends.mysql.names(),
            redis = ?backends.redis.names(),
            "Backends ready"
        );

        if config.mysql.enable {
            self.tables.auto_migrate(config, &backends).await;
        }
        FrameState::new(config.clone(), backends)
    }

    /// State over whatever the registry holds, or no backends at all
    pub fn into_state(self) -> Result<FrameState> {
        let backends = registry::global()
            .get()
            .unwrap_or_else(|| Arc::new(Backends::empty()));
        FrameState::new(self.loaded.config, backends)
    }

    /// Wraps the application's routes with the framework's layers.
    ///
    /// Requests pass trace id, then request log, then the handler. `/health`
    /// is not logged, and `/metrics` is mounted here only when it shares the
    /// business port.
    pub fn build_router(&self, state: FrameState, routes: Router<FrameState>) -> Router {
        let config = self.config();

        let mut router = routes
            .layer(from_fn_with_state(state.clone(), request_log::record))
            .route("/health", get(handlers::health));

        if config.is_metric_port_merged() {
            if let Some(handle) = self.metrics.clone() {
                router = router.merge(metrics::router(handle));
            }
        }

        let mut router = router.layer(from_fn_with_state(state.clone(), trace_id::propagate));
        if config.http_server.enable_cors {
            router = router.layer(cors::layer());
        }

        router.layer(TraceLayer::new_for_http()).with_state(state)
    }

    /// Connects, then serves until Ctrl-C
    pub async fn run(self, routes: Router<FrameState>) -> Result<()> {
        let config = self.config().clone();
        if !config.http_server.enable {
            warn!("HTTP server is disabled, nothing to serve");
            return Ok(());
        }

        let state = self.connect().await?;
        let app = self.build_router(state, routes);

        let business = config
            .http_server
            .business_server()
            .ok_or_else(|| FrameError::Config("no business http server configured".into()))?;
        let listener = bind(&business.port).await?;
        info!(name = %business.name, port = %business.port, "HTTP server listening");
        let serve_business = async {
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await
                .map_err(FrameError::Io)
        };

        let metric_server = config.http_server.metric_server().filter(|_| !config.is_metric_port_merged());
        match (self.metrics.clone(), metric_server) {
            (Some(handle), Some(server)) => {
                let listener = bind(&server.port).await?;
                info!(port = %server.port, "Metrics server listening");
                let serve_metrics = async {
                    axum::serve(listener, metrics::router::<()>(handle))
                        .with_graceful_shutdown(shutdown_signal())
                        .await
                        .map_err(FrameError::Io)
                };
                tokio::try_join!(serve_business, serve_metrics)?;
            }
            _ => serve_business.await?,
        }

        info!("HTTP server stopped");
        Ok(())
    }
}

async fn bind(port: &str) -> Result<tokio::net::TcpListener> {
    let port = parse_port(port)
        .ok_or_else(|| FrameError::Config(format!("invalid listen port '{}'", port)))?;
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    Ok(tokio::net::TcpListener::bind(addr).await?)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
