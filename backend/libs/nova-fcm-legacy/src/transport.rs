use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use std::time::Duration;

use crate::errors::FCMError;

/// One outbound HTTP request
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

impl TransportRequest {
    /// JSON request authorized with a legacy server key (`Authorization: key=...`).
    pub fn new(method: Method, url: impl Into<String>, api_key: &str) -> Result<Self, FCMError> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("key={}", api_key))
            .map_err(|_| FCMError::Config("API key is not a valid header value".to_string()))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        Ok(Self {
            method,
            url: url.into(),
            headers,
            body: None,
        })
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }
}

/// Raw reply: status, headers and body bytes
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl TransportResponse {
    /// Header value as a string, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    }

    /// Reason phrase for the status code, e.g. `"200 OK"`.
    pub fn status_line(&self) -> String {
        match reqwest::StatusCode::from_u16(self.status) {
            Ok(status) => status.to_string(),
            Err(_) => self.status.to_string(),
        }
    }
}

/// HTTP exchange used by the client
///
/// Implementations must be safe to share between concurrent sends. Any
/// failure to obtain a reply is reported as [`FCMError::Transport`].
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn do_request(&self, request: &TransportRequest) -> Result<TransportResponse, FCMError>;
}

/// [`HttpTransport`] over a pooled `reqwest::Client`
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http_client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, FCMError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FCMError::Transport(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { http_client })
    }

    pub fn from_client(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn do_request(&self, request: &TransportRequest) -> Result<TransportResponse, FCMError> {
        let mut builder = self
            .http_client
            .request(request.method.clone(), &request.url)
            .headers(request.headers.clone());
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| FCMError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| FCMError::Transport(format!("Failed to read response body: {}", e)))?;

        Ok(TransportResponse {
            status,
            headers,
            body: body.to_vec(),
        })
    }
}
