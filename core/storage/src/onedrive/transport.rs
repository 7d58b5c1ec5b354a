//! Outbound HTTP with explicit timeouts and classified failures.

use bytes::Bytes;
use reqwest::{header, redirect, Client, Method, Response};
use std::time::Duration;
use tracing::{debug, warn};

use oneindex_common::{Error, Result};

use super::config::GraphConfig;

/// Request payload.
#[derive(Debug, Clone, Default)]
pub enum Body {
    #[default]
    Empty,
    /// Serialized as `application/json`.
    Json(serde_json::Value),
    /// Serialized as `application/x-www-form-urlencoded`.
    Form(Vec<(String, String)>),
    /// Sent verbatim.
    Bytes(Bytes),
}

impl Body {
    /// Whether the request carries a payload.
    pub fn is_present(&self) -> bool {
        !matches!(self, Body::Empty)
    }
}

/// A single outbound call.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// Explicit method. When absent, POST is used if a body is present,
    /// GET otherwise.
    pub method: Option<Method>,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub body: Body,
    pub bearer: Option<String>,
    pub timeout: Duration,
}

impl HttpRequest {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method: None,
            url: url.into(),
            query: Vec::new(),
            body: Body::Empty,
            bearer: None,
            timeout,
        }
    }

    /// Method that will actually be sent.
    pub fn effective_method(&self) -> Method {
        match &self.method {
            Some(method) => method.clone(),
            None if self.body.is_present() => Method::POST,
            None => Method::GET,
        }
    }
}

/// Shared HTTP transport.
///
/// Cloning is cheap and shares the underlying connection pool. Redirects are
/// not followed so callers can read `Location` themselves.
#[derive(Clone)]
pub struct Transport {
    http: Client,
}

impl Transport {
    /// Create a transport from configuration.
    pub fn new(config: &GraphConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent(config.user_agent.as_str())
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { http })
    }

    /// Issue a request once.
    ///
    /// Any 4xx/5xx status becomes `Error::RemoteApi` carrying the request
    /// URL and the body text; 1xx-3xx responses are handed back as is.
    pub async fn fetch(&self, request: HttpRequest) -> Result<Response> {
        let method = request.effective_method();
        debug!(%method, url = %request.url, "Sending request");

        let mut builder = self
            .http
            .request(method, &request.url)
            .timeout(request.timeout);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }

        builder = match request.body {
            Body::Empty => builder,
            Body::Json(value) => builder.json(&value),
            Body::Form(fields) => builder.form(&fields),
            Body::Bytes(data) => builder
                .header(header::CONTENT_TYPE, "application/octet-stream")
                .body(data),
        };

        let response = builder
            .send()
            .await
            .map_err(|e| classify(&request.url, e))?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            let url = response.url().to_string();
            let body = response.text().await.map_err(|e| classify(&url, e))?;
            warn!(%url, status = status.as_u16(), "Remote API returned an error");
            return Err(Error::RemoteApi {
                url,
                status_code: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }
}

/// Map a reqwest failure onto the error taxonomy.
pub(crate) fn classify(url: &str, e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(format!("{}: {}", url, e))
    } else {
        Error::Network(format!("Request to {} failed: {}", url, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header as header_eq, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport() -> Transport {
        Transport::new(&GraphConfig::default()).unwrap()
    }

    #[test]
    fn test_method_inference() {
        let mut request = HttpRequest::new("https://example.com", Duration::from_secs(1));
        assert_eq!(request.effective_method(), Method::GET);

        request.body = Body::Json(serde_json::json!({"name": "x"}));
        assert_eq!(request.effective_method(), Method::POST);

        request.method = Some(Method::PATCH);
        assert_eq!(request.effective_method(), Method::PATCH);
    }

    #[tokio::test]
    async fn test_form_body_and_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(header_eq("authorization", "Bearer abc"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;

        let mut request =
            HttpRequest::new(format!("{}/token", server.uri()), Duration::from_secs(5));
        request.bearer = Some("abc".to_string());
        request.body = Body::Form(vec![(
            "grant_type".to_string(),
            "refresh_token".to_string(),
        )]);

        let response = transport().fetch(request).await.unwrap();
        assert_eq!(response.status().as_u16(), 200);
    }

    #[tokio::test]
    async fn test_server_error_is_classified() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("try later"))
            .mount(&server)
            .await;

        let url = format!("{}/me", server.uri());
        let err = transport()
            .fetch(HttpRequest::new(url.clone(), Duration::from_secs(5)))
            .await
            .unwrap_err();

        match err {
            Error::RemoteApi {
                url: got,
                status_code,
                body,
            } => {
                assert_eq!(got, url);
                assert_eq!(status_code, 503);
                assert_eq!(body, "try later");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_redirect_is_not_followed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(302).insert_header("location", "https://cdn.example/file"),
            )
            .mount(&server)
            .await;

        let response = transport()
            .fetch(HttpRequest::new(
                format!("{}/content", server.uri()),
                Duration::from_secs(5),
            ))
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 302);
    }

    #[tokio::test]
    async fn test_timeout_is_classified() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let err = transport()
            .fetch(HttpRequest::new(
                format!("{}/slow", server.uri()),
                Duration::from_millis(200),
            ))
            .await
            .unwrap_err();

        assert!(err.is_timeout());
    }
}
