//! Permissive CORS

use axum::http::Method;
use tower_http::cors::{AllowMethods, Any, CorsLayer};

/// Any origin, any header; preflight answered here
pub fn layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(AllowMethods::list(allowed_methods()))
        .allow_headers(Any)
        .expose_headers(Any)
}

fn allowed_methods() -> Vec<Method> {
    let mut methods = vec![
        Method::POST,
        Method::GET,
        Method::OPTIONS,
        Method::PUT,
        Method::DELETE,
    ];
    // not a standard verb, but clients send it
    if let Ok(update) = Method::from_bytes(b"UPDATE") {
        methods.push(update);
    }
    methods
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, extract::Request, http::StatusCode, routing::post, Router};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_preflight() {
        let app = Router::new()
            .route("/items", post(|| async { "created" }))
            .layer(layer());

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/items")
                    .header("origin", "https://example.com")
                    .header("access-control-request-method", "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
        let allowed = response.headers()["access-control-allow-methods"]
            .to_str()
            .unwrap();
        assert!(allowed.contains("UPDATE"));
        assert!(allowed.contains("DELETE"));
    }
}
