//! Handler error type
//!
//! Anything a handler can fail with, rendered as a JSON envelope.

use crate::middleware::trace_id;
use crate::response::{self, BusinessError, INTERNAL_CODE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use frame_core::FrameError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{1}")]
    Business(StatusCode, BusinessError),
}

impl AppError {
    pub fn business(status: StatusCode, code: impl Into<String>, reply: impl Into<String>) -> Self {
        AppError::Business(status, BusinessError::new(code, reply))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Business(status, _) => *status,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let trace_id = trace_id::current().unwrap_or_default();
        match self {
            AppError::Business(status, err) => response::failure(&trace_id, status, &err),
            other => {
                let err = BusinessError::new(INTERNAL_CODE, "internal server error")
                    .with_real(other.to_string());
                response::failure(&trace_id, StatusCode::INTERNAL_SERVER_ERROR, &err)
            }
        }
    }
}

pub type AppResult<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use frame_core::BackendKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_unknown_backend_renders_internal_error() {
        let err: AppError = FrameError::UnknownBackend {
            kind: BackendKind::Redis,
            name: "session".into(),
        }
        .into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["code"], INTERNAL_CODE);
        assert_eq!(body["message"], "internal server error");
    }

    #[tokio::test]
    async fn test_business_error_keeps_status_and_code() {
        let response =
            AppError::business(StatusCode::BAD_REQUEST, "BAD_ID", "id must be numeric")
                .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["code"], "BAD_ID");
    }

    struct ErrorEvents(Arc<AtomicUsize>);

    impl<S: tracing::Subscriber> Layer<S> for ErrorEvents {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() == tracing::Level::ERROR {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn test_internal_error_logged_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(ErrorEvents(count.clone()));

        let response = tracing::subscriber::with_default(subscriber, || {
            AppError::from(FrameError::NoBackend {
                kind: BackendKind::Mysql,
            })
            .into_response()
        });

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_request_id_comes_from_current_trace() {
        let response = trace_id::CURRENT_TRACE_ID
            .scope(trace_id::TraceId("abc".into()), async {
                AppError::from(sqlx::Error::RowNotFound).into_response()
            })
            .await;
        let body = body_json(response).await;
        assert_eq!(body["request_id"], "abc");
    }
}
