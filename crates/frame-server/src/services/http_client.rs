//! Outbound HTTP with the caller's trace id attached

use crate::metrics;
use frame_core::consts::TRACE_ID_KEY;
use frame_core::{FrameError, HttpClientConfig, Result};
use reqwest::header::HeaderValue;
use reqwest::{Method, Request, RequestBuilder, Response};
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{error, info};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared client, built once per process
#[derive(Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
    config: HttpClientConfig,
}

impl HttpClient {
    pub fn new(config: &HttpClientConfig) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| FrameError::Http(e.to_string()))?;
        Ok(Self {
            inner,
            config: config.clone(),
        })
    }

    pub fn inner(&self) -> &reqwest::Client {
        &self.inner
    }

    pub fn traced(&self, trace_id: impl Into<String>) -> TracedHttpClient<'_> {
        TracedHttpClient {
            client: self,
            trace_id: trace_id.into(),
        }
    }
}

/// Client view for one request
pub struct TracedHttpClient<'a> {
    client: &'a HttpClient,
    trace_id: String,
}

impl<'a> TracedHttpClient<'a> {
    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// A builder with the trace id header already set
    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .inner
            .request(method, url)
            .header(TRACE_ID_KEY, self.trace_id.as_str())
    }

    pub async fn get(&self, url: &str) -> reqwest::Result<Response> {
        self.send(self.request(Method::GET, url)).await
    }

    pub async fn post_json<T: Serialize + ?Sized>(&self, url: &str, body: &T) -> reqwest::Result<Response> {
        self.send(self.request(Method::POST, url).json(body)).await
    }

    pub async fn send(&self, builder: RequestBuilder) -> reqwest::Result<Response> {
        self.execute(builder.build()?).await
    }

    /// Sends a prepared request, adding the trace id header if it is missing
    pub async fn execute(&self, mut request: Request) -> reqwest::Result<Response> {
        if !request.headers().contains_key(TRACE_ID_KEY) {
            if let Ok(value) = HeaderValue::from_str(&self.trace_id) {
                request.headers_mut().insert(TRACE_ID_KEY, value);
            }
        }

        let method = request.method().clone();
        let url = request.url().clone();
        let host = url.host_str().unwrap_or_default().to_string();

        let start = Instant::now();
        let result = self.client.inner.execute(request).await;
        let elapsed = start.elapsed();

        let code = match &result {
            Ok(response) => response.status().as_u16().to_string(),
            Err(_) => "error".to_string(),
        };

        if !self.client.config.disable_req_log {
            let duration = elapsed.as_millis() as u64;
            match &result {
                Ok(_) => info!(
                    trace_id = %self.trace_id,
                    method = %method,
                    host = %host,
                    path = %url.path(),
                    code = %code,
                    duration,
                    "send http request"
                ),
                Err(e) => error!(
                    trace_id = %self.trace_id,
                    method = %method,
                    host = %host,
                    path = %url.path(),
                    duration,
                    error = %e,
                    "send http request failed"
                ),
            }
        }

        if self.client.config.enable_metric {
            metrics::record_send(method.as_str(), &host, url.path(), &code, elapsed);
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::HeaderMap, routing::{get, post}, Json, Router};

    async fn spawn_echo() -> String {
        let app = Router::new()
            .route(
                "/echo",
                get(|headers: HeaderMap| async move {
                    headers
                        .get(TRACE_ID_KEY)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string()
                }),
            )
            .route(
                "/json",
                post(|Json(body): Json<serde_json::Value>| async move { Json(body) }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_trace_id_is_forwarded() {
        let base = spawn_echo().await;
        let client = HttpClient::new(&HttpClientConfig::default()).unwrap();
        let traced = client.traced("abc-123");

        let response = traced.get(&format!("{}/echo", base)).await.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.text().await.unwrap(), "abc-123");

        let response = traced
            .post_json(&format!("{}/json", base), &serde_json::json!({"n": 1}))
            .await
            .unwrap();
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["n"], 1);
    }

    #[tokio::test]
    async fn test_explicit_header_is_kept() {
        let base = spawn_echo().await;
        let client = HttpClient::new(&HttpClientConfig::default()).unwrap();
        let traced = client.traced("from-context");

        let request = client
            .inner()
            .get(format!("{}/echo", base))
            .header(TRACE_ID_KEY, "explicit")
            .build()
            .unwrap();
        let response = traced.execute(request).await.unwrap();
        assert_eq!(response.text().await.unwrap(), "explicit");
    }

    #[tokio::test]
    async fn test_connection_error_is_returned() {
        let client = HttpClient::new(&HttpClientConfig::default()).unwrap();
        let result = client.traced("x").get("http://127.0.0.1:1/unreachable").await;
        assert!(result.is_err());
    }
}
