//! Request context extractor
//!
//! Every handler takes a [`RequestContext`]: it carries the request's trace
//! id and hands out backends and the outbound client already bound to it.

use crate::app::FrameState;
use crate::middleware::trace_id::{self, generate_trace_id, TraceId};
use crate::response::{self, BusinessError, ErrorMsg, PageResults};
use crate::services::TracedHttpClient;
use crate::storage::{TracedCache, TracedDb};
use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, Method, StatusCode},
    response::Response,
};
use frame_core::{Config, Result};
use serde::Serialize;
use std::convert::Infallible;
use tracing::{error, info_span, Span};

#[derive(Clone)]
pub struct RequestContext {
    trace_id: String,
    method: Method,
    path: String,
    state: FrameState,
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    FrameState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> std::result::Result<Self, Self::Rejection> {
        let state = FrameState::from_ref(state);
        let trace_id = parts
            .extensions
            .get::<TraceId>()
            .map(|id| id.0.clone())
            .or_else(|| trace_id::from_headers(&parts.headers).map(|v| trace_id::lossy(&v)))
            .unwrap_or_else(|| generate_trace_id(&state.config.project));

        Ok(Self {
            trace_id,
            method: parts.method.clone(),
            path: parts.uri.path().to_string(),
            state,
        })
    }
}

impl RequestContext {
    /// A context outside any HTTP request, with a fresh trace id
    pub fn detached(state: FrameState) -> Self {
        Self {
            trace_id: generate_trace_id(&state.config.project),
            method: Method::GET,
            path: String::new(),
            state,
        }
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn config(&self) -> &Config {
        &self.state.config
    }

    pub fn state(&self) -> &FrameState {
        &self.state
    }

    /// MySQL pool by name; `None` picks the only one
    pub fn db(&self, name: Option<&str>) -> Result<TracedDb<'_>> {
        match self.state.backends.mysql.get(name) {
            Ok(db) => Ok(db.traced(&self.trace_id)),
            Err(e) => {
                error!(trace_id = %self.trace_id, error = %e, "mysql lookup failed");
                Err(e)
            }
        }
    }

    /// Redis connection by name; `None` picks the only one
    pub fn cache(&self, name: Option<&str>) -> Result<TracedCache<'_>> {
        match self.state.backends.redis.get(name) {
            Ok(cache) => Ok(cache.traced(&self.trace_id)),
            Err(e) => {
                error!(trace_id = %self.trace_id, error = %e, "redis lookup failed");
                Err(e)
            }
        }
    }

    pub fn http_client(&self) -> TracedHttpClient<'_> {
        self.state.http.traced(self.trace_id.clone())
    }

    pub fn span(&self) -> Span {
        info_span!("request", trace_id = %self.trace_id)
    }

    pub fn success<T: Serialize>(&self, data: T) -> Response {
        response::success(&self.trace_id, data)
    }

    /// Business failure with HTTP 200
    pub fn error(&self, err: &dyn ErrorMsg) -> Response {
        response::failure(&self.trace_id, StatusCode::OK, err)
    }

    pub fn http_error(&self, status: StatusCode, err: &dyn ErrorMsg) -> Response {
        response::failure(&self.trace_id, status, err)
    }

    pub fn http_error2(&self, status: StatusCode, code: &str, reply: &str, real: &str) -> Response {
        let err = BusinessError::new(code, reply).with_real(real);
        response::failure(&self.trace_id, status, &err)
    }

    pub fn list_success<T: Serialize>(&self, page: Option<PageResults<T>>) -> Response {
        response::list_success(&self.trace_id, page.unwrap_or_default())
    }

    pub fn list_error(&self, err: &dyn ErrorMsg) -> Response {
        response::list_failure(&self.trace_id, StatusCode::OK, err)
    }

    pub fn http_list_error(&self, status: StatusCode, err: &dyn ErrorMsg) -> Response {
        response::list_failure(&self.trace_id, status, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Backends;
    use axum::{body::Body, extract::Request, routing::get, Router};
    use frame_core::{BackendKind, FrameError};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn state() -> FrameState {
        let config = Config {
            project: "demo".into(),
            ..Default::default()
        };
        FrameState::new(config, Arc::new(Backends::empty())).unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_extracts_request_metadata() {
        let app = Router::new()
            .route(
                "/users/:id",
                get(|ctx: RequestContext| async move {
                    ctx.success(serde_json::json!({
                        "method": ctx.method().as_str(),
                        "path": ctx.path(),
                    }))
                }),
            )
            .with_state(state());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/users/7")
                    .header("trace_id", "t-77")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let body = body_json(response).await;
        assert_eq!(body["request_id"], "t-77");
        assert_eq!(body["data"]["method"], "GET");
        assert_eq!(body["data"]["path"], "/users/7");
    }

    #[test]
    fn test_unknown_backends_fail_loudly() {
        let ctx = RequestContext::detached(state());
        assert!(ctx.trace_id().starts_with("ZGVtbw--"));

        assert!(matches!(
            ctx.db(None),
            Err(FrameError::NoBackend {
                kind: BackendKind::Mysql
            })
        ));
        match ctx.cache(Some("session")) {
            Err(FrameError::UnknownBackend { kind, name }) => {
                assert_eq!(kind, BackendKind::Redis);
                assert_eq!(name, "session");
            }
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("lookup should fail"),
        }
    }

    #[tokio::test]
    async fn test_response_helpers() {
        let ctx = RequestContext::detached(state());

        let response = ctx.http_error2(StatusCode::FORBIDDEN, "DENIED", "not allowed", "role=guest");
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = body_json(response).await;
        assert_eq!(body["code"], "DENIED");
        assert_eq!(body["request_id"], ctx.trace_id());

        let body = body_json(ctx.list_success::<u32>(None)).await;
        assert_eq!(body["data"]["results"], serde_json::json!([]));

        let err = BusinessError::new("BUSY", "try later");
        let response = ctx.http_list_error(StatusCode::SERVICE_UNAVAILABLE, &err);
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_json(response).await["data"]["total"], 0);

        let body = body_json(ctx.error(&err)).await;
        assert_eq!(body["code"], "BUSY");
    }
}
