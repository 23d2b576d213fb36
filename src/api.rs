//! Upstream function-host client.
//!
//! Every business record lives behind a serverless function host. This module
//! wraps the HTTP plumbing; route handlers decide how each failure is shown
//! to the page.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

/// Default timeout for upstream requests (30 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// URL normalisation
// ---------------------------------------------------------------------------

/// Normalise an upstream base URL:
/// - ensure a scheme is present (https, or http for localhost)
/// - strip trailing slashes
pub fn normalize_base_url(url: &str) -> String {
    let mut url = url.trim().to_string();

    if !url.starts_with("http://") && !url.starts_with("https://") {
        if url.starts_with("localhost") || url.starts_with("127.0.0.1") {
            url = format!("http://{url}");
        } else {
            url = format!("https://{url}");
        }
    }

    while url.ends_with('/') {
        url.pop();
    }

    url
}

// ---------------------------------------------------------------------------
// Replies and errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("Upstream timeout")]
    Timeout,

    #[error("{0}")]
    Network(String),

    #[error("{0}")]
    Decode(String),

    #[error("Upstream error: {0}")]
    Status(StatusCode),
}

/// Body of an upstream reply: JSON when it parses, raw text otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamBody {
    Json(Value),
    Text(String),
}

impl UpstreamBody {
    fn from_text(text: String) -> Self {
        match serde_json::from_str::<Value>(&text) {
            Ok(v) => Self::Json(v),
            Err(_) => Self::Text(text),
        }
    }

    /// The body as a JSON value; text is carried as a JSON string.
    pub fn into_value(self) -> Value {
        match self {
            Self::Json(v) => v,
            Self::Text(t) => Value::String(t),
        }
    }

    /// The body as it appeared on the wire.
    pub fn into_text(self) -> String {
        match self {
            Self::Json(v) => v.to_string(),
            Self::Text(t) => t,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UpstreamReply {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: UpstreamBody,
}

impl UpstreamReply {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// A 2xx reply's JSON body; any other status is an error.
    pub fn success_json(self) -> Result<Value, UpstreamError> {
        if !self.is_success() {
            return Err(UpstreamError::Status(self.status));
        }
        self.json()
    }

    /// The body read the way its `Content-Type` declares it: parsed when it
    /// says `application/json`, otherwise kept as a string.
    pub fn declared_body(self) -> Result<Value, UpstreamError> {
        let declares_json = self
            .content_type
            .as_deref()
            .is_some_and(|ct| ct.contains("application/json"));
        if declares_json {
            self.json()
        } else {
            Ok(Value::String(self.body.into_text()))
        }
    }

    /// Require a JSON body, as a successful reply is expected to carry one.
    pub fn json(self) -> Result<Value, UpstreamError> {
        match self.body {
            UpstreamBody::Json(v) => Ok(v),
            UpstreamBody::Text(t) => {
                let preview: String = t.chars().take(80).collect();
                Err(UpstreamError::Decode(format!(
                    "Invalid JSON from upstream: {preview}"
                )))
            }
        }
    }
}

fn classify(url: &str, err: reqwest::Error) -> UpstreamError {
    if err.is_timeout() {
        warn!(url, "upstream request timed out");
        return UpstreamError::Timeout;
    }
    if err.is_connect() {
        return UpstreamError::Network(format!("Cannot reach upstream at {url}"));
    }
    if err.is_builder() {
        return UpstreamError::Network(format!("Invalid upstream URL: {url}"));
    }
    if err.is_decode() || err.is_body() {
        return UpstreamError::Decode(format!("Failed to read upstream body: {err}"));
    }
    UpstreamError::Network(format!("Network error communicating with {url}: {err}"))
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Shared HTTP client for the function host. Cheap to clone.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: Client,
}

impl UpstreamClient {
    pub fn new(timeout: Duration) -> Result<Self, UpstreamError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| UpstreamError::Network(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { http })
    }

    /// GET `url` with query parameters appended.
    pub async fn get(
        &self,
        url: &str,
        query: &[(&str, &str)],
        timeout: Option<Duration>,
    ) -> Result<UpstreamReply, UpstreamError> {
        let mut req = self
            .http
            .get(url)
            .header("Accept", "application/json")
            .query(query);
        if let Some(t) = timeout {
            req = req.timeout(t);
        }
        self.send(url, req).await
    }

    /// POST `body` as JSON to `url`.
    pub async fn post_json(&self, url: &str, body: &Value) -> Result<UpstreamReply, UpstreamError> {
        let req = self.http.post(url).json(body);
        self.send(url, req).await
    }

    async fn send(&self, url: &str, req: RequestBuilder) -> Result<UpstreamReply, UpstreamError> {
        let resp = req.send().await.map_err(|e| classify(url, e))?;
        let status = resp.status();
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let text = resp.text().await.map_err(|e| classify(url, e))?;
        debug!(url, status = status.as_u16(), bytes = text.len(), "upstream reply");
        Ok(UpstreamReply {
            status,
            content_type,
            body: UpstreamBody::from_text(text),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn normalize_adds_scheme_and_strips_slashes() {
        assert_eq!(normalize_base_url("fn.example.com/api/"), "https://fn.example.com/api");
        assert_eq!(normalize_base_url("localhost:8080//"), "http://localhost:8080");
        assert_eq!(normalize_base_url(" http://x.test "), "http://x.test");
    }

    #[test]
    fn text_body_is_kept_when_not_json() {
        assert_eq!(
            UpstreamBody::from_text("oops".into()),
            UpstreamBody::Text("oops".into())
        );
        assert_eq!(
            UpstreamBody::from_text("{\"a\":1}".into()),
            UpstreamBody::Json(json!({ "a": 1 }))
        );
    }

    #[tokio::test]
    async fn get_sends_query_and_decodes_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pumps/get-pumps-by-location"))
            .and(query_param("location", "san isidro"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": 1 }])))
            .expect(1)
            .mount(&server)
            .await;

        let client = UpstreamClient::new(DEFAULT_TIMEOUT).expect("client");
        let url = format!("{}/pumps/get-pumps-by-location", server.uri());
        let reply = client
            .get(&url, &[("location", "san isidro")], None)
            .await
            .expect("reply");

        assert!(reply.is_success());
        assert_eq!(reply.json().expect("json"), json!([{ "id": 1 }]));
    }

    #[tokio::test]
    async fn post_json_forwards_body_and_keeps_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_json(json!({ "po_number": "11996189" })))
            .respond_with(ResponseTemplate::new(404).set_body_string("no such po"))
            .mount(&server)
            .await;

        let client = UpstreamClient::new(DEFAULT_TIMEOUT).expect("client");
        let reply = client
            .post_json(&server.uri(), &json!({ "po_number": "11996189" }))
            .await
            .expect("reply");

        assert_eq!(reply.status, StatusCode::NOT_FOUND);
        assert_eq!(reply.body, UpstreamBody::Text("no such po".into()));
    }

    #[tokio::test]
    async fn slow_upstream_is_reported_as_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let client = UpstreamClient::new(DEFAULT_TIMEOUT).expect("client");
        let err = client
            .get(&server.uri(), &[], Some(Duration::from_millis(50)))
            .await
            .expect_err("must time out");
        assert!(matches!(err, UpstreamError::Timeout));
    }

    #[test]
    fn error_status_is_not_success_json() {
        let reply = UpstreamReply {
            status: StatusCode::SERVICE_UNAVAILABLE,
            content_type: None,
            body: UpstreamBody::Json(json!({ "ok": false })),
        };
        let err = reply.success_json().expect_err("503 is an error");
        assert!(matches!(err, UpstreamError::Status(StatusCode::SERVICE_UNAVAILABLE)));
        assert_eq!(err.to_string(), "Upstream error: 503 Service Unavailable");
    }

    #[test]
    fn text_reply_cannot_be_read_as_json() {
        let reply = UpstreamReply {
            status: StatusCode::OK,
            content_type: Some("text/html".into()),
            body: UpstreamBody::Text("<html>".into()),
        };
        assert!(matches!(reply.json(), Err(UpstreamError::Decode(_))));
    }

    #[test]
    fn declared_body_follows_the_content_type() {
        let reply = |content_type: &str, text: &str| UpstreamReply {
            status: StatusCode::OK,
            content_type: Some(content_type.into()),
            body: UpstreamBody::from_text(text.into()),
        };

        assert_eq!(
            reply("application/json; charset=utf-8", "{\"a\":1}")
                .declared_body()
                .expect("json"),
            json!({ "a": 1 })
        );
        assert_eq!(
            reply("text/plain", "{\"a\":1}").declared_body().expect("text"),
            json!("{\"a\":1}")
        );
        assert!(matches!(
            reply("application/json", "{not json").declared_body(),
            Err(UpstreamError::Decode(_))
        ));
    }
}
