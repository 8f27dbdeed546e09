//! Single-attempt HTTP transport.
//!
//! A transport performs exactly one request within its time budget. It
//! classifies only transport failures (`Timeout`, `NetworkUnavailable`);
//! non-2xx responses come back as ordinary [`ApiResponse`]s and are judged
//! by the caller.

use async_trait::async_trait;
use common::Error;
use std::error::Error as StdError;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        }
    }
}

/// A request relative to the backend base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Path plus query string, e.g. `/api/risk?city=jakarta`.
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            headers: Vec::new(),
            body: Some(body),
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            method: Method::Delete,
            path: path.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Raw response of one attempt. Any status, including errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform a single attempt. Never retries.
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, Error>;
}

/// Reqwest-backed transport with connection pooling.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .user_agent("siaga-sync/0.1")
            .pool_max_idle_per_host(4)
            .tcp_keepalive(Duration::from_secs(30))
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: normalize_base_url(base_url),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, Error> {
        let url = self.url(&request.path);
        debug!("{} {}", request.method.as_str(), url);

        let mut req = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Delete => self.client.delete(&url),
        };
        for (name, value) in &request.headers {
            req = req.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            req = req.json(body);
        }

        let resp = req.send().await.map_err(classify_reqwest_error)?;
        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(classify_reqwest_error)?;

        Ok(ApiResponse { status, body })
    }
}

pub fn normalize_base_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

fn classify_reqwest_error(err: reqwest::Error) -> Error {
    let message = format_reqwest_error(&err);
    if err.is_timeout() {
        Error::Timeout(message)
    } else {
        Error::NetworkUnavailable(message)
    }
}

fn format_reqwest_error(err: &reqwest::Error) -> String {
    // Keep chained causes so DNS/TLS/socket failures are visible.
    let mut message = err.to_string();
    let mut source = err.source();

    while let Some(cause) = source {
        let cause_msg = cause.to_string();
        if !cause_msg.is_empty() && !message.contains(&cause_msg) {
            message.push_str(": ");
            message.push_str(&cause_msg);
        }
        source = cause.source();
    }

    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_normalized() {
        assert_eq!(normalize_base_url(" http://localhost:5000/ "), "http://localhost:5000");
        let transport =
            HttpTransport::new("http://localhost:5000/", DEFAULT_TIMEOUT).expect("client builds");
        assert_eq!(
            transport.url("/api/risk?city=jakarta"),
            "http://localhost:5000/api/risk?city=jakarta"
        );
    }

    #[test]
    fn test_request_builders() {
        let req = ApiRequest::post("/api/chat", serde_json::json!({"message": "hi"}))
            .with_header("X-Admin-Secret", "s3cret");
        assert_eq!(req.method, Method::Post);
        assert_eq!(req.headers, vec![("X-Admin-Secret".to_string(), "s3cret".to_string())]);
        assert!(ApiRequest::get("/api/stats").body.is_none());
    }

    #[test]
    fn test_success_range() {
        assert!(ApiResponse::new(204, "").is_success());
        assert!(!ApiResponse::new(304, "").is_success());
        assert!(!ApiResponse::new(503, "").is_success());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_unavailable() {
        // Port 9 (discard) on loopback is expected to refuse connections.
        let transport = HttpTransport::new("http://127.0.0.1:9", Duration::from_secs(2))
            .expect("client builds");
        let err = transport
            .send(&ApiRequest::get("/api/stats"))
            .await
            .expect_err("nothing listens there");
        assert!(matches!(err, Error::NetworkUnavailable(_) | Error::Timeout(_)));
    }
}
