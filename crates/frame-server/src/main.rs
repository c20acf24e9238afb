//! frame demo server
//!
//! A small service built on the frame bootstrap: one table, a SQL-backed
//! lookup, a cache-backed counter and an outbound call.

use anyhow::{Context, Result};
use axum::{
    extract::Path,
    http::StatusCode,
    response::Response,
    routing::get,
    Router,
};
use clap::Parser;
use frame_server::frame_core::{consts::CONFIG_PATH_ENV, FrameError};
use frame_server::{init_fn, App, AppResult, BusinessError, FrameState, RequestContext, Table};
use serde::Serialize;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "frame-demo", version, about = "Demo service on the frame bootstrap")]
struct Cli {
    /// Configuration file (JSON or YAML)
    #[arg(short, long, env = CONFIG_PATH_ENV)]
    config: Option<String>,
}

struct Users;

impl Table for Users {
    fn table_name(&self) -> &str {
        "users"
    }

    fn create_sql(&self) -> String {
        "CREATE TABLE IF NOT EXISTS users (
            id BIGINT UNSIGNED NOT NULL AUTO_INCREMENT PRIMARY KEY,
            name VARCHAR(64) NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4"
            .to_string()
    }
}

#[derive(Serialize, sqlx::FromRow)]
struct User {
    id: u64,
    name: String,
}

#[tokio::main]
async fn main() {
    // Set up panic hook to log crashes
    std::panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()));
        let payload = if let Some(s) = info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        eprintln!("[PANIC] at {:?}: {}", location, payload);
        tracing::error!("PANIC at {:?}: {}", location, payload);
    }));

    let cli = Cli::parse();

    let app = match App::load(cli.config.as_deref()) {
        Ok(app) => app,
        Err(FrameError::InvalidConfig(errors)) => {
            eprintln!("========== invalid configuration ==========");
            for e in &errors {
                eprintln!("  {}", e);
            }
            eprintln!("===========================================");
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("[FATAL] {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting frame-demo v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(app).await {
        error!("Server failed: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(app: App) -> Result<()> {
    app.register_table(
        "user",
        Users,
        vec![init_fn(|pool| {
            Box::pin(async move {
                sqlx::query("INSERT IGNORE INTO users (id, name) VALUES (1, 'admin')")
                    .execute(pool)
                    .await
                    .map(|_| ())
            })
        })],
    );

    app.run(routes()).await.context("Server error")?;
    Ok(())
}

fn routes() -> Router<FrameState> {
    App::router()
        .route("/hello", get(hello))
        .route("/users/:id", get(get_user))
        .route("/visits/:key", get(visit))
        .route("/upstream", get(upstream))
}

async fn hello(ctx: RequestContext) -> Response {
    ctx.success(format!("hello from {}", ctx.config().project))
}

async fn get_user(ctx: RequestContext, Path(id): Path<u64>) -> AppResult<Response> {
    let db = ctx.db(Some("user"))?;
    let user = db
        .run("select user by id", |pool| {
            sqlx::query_as::<_, User>("SELECT id, name FROM users WHERE id = ?")
                .bind(id)
                .fetch_optional(pool)
        })
        .await?;

    Ok(match user {
        Some(user) => ctx.success(user),
        None => ctx.http_error(
            StatusCode::NOT_FOUND,
            &BusinessError::new("USER_NOT_FOUND", "user not found")
                .with_real(format!("no row in users for id {}", id)),
        ),
    })
}

async fn visit(ctx: RequestContext, Path(key): Path<String>) -> AppResult<Response> {
    let cache = ctx.cache(None)?;
    let key = format!("visits:{}", key);
    let count: i64 = cache.query(redis::cmd("INCR").arg(&key)).await?;
    Ok(ctx.success(count))
}

async fn upstream(ctx: RequestContext) -> AppResult<Response> {
    let response = ctx
        .http_client()
        .get("https://httpbin.org/get")
        .await?;
    let status = response.status().as_u16();
    Ok(ctx.success(status))
}
