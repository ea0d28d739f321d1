use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::signing::Verb;

pub const ACCEPT_NOMETADATA: &str = "application/json;odata=nometadata";
pub const DEFAULT_TIMEOUT_SECS: u64 = 20;

/// A fully signed request. Built fresh for every call; never cached.
#[derive(Clone, Debug)]
pub struct SignedRequest {
    pub verb: Verb,
    pub url: Url,
    pub canonical_resource: String,
    pub date: String,
    pub api_version: String,
    pub authorization: String,
    pub body: Option<String>,
}

impl SignedRequest {
    /// Header set sent on the wire, in a stable order. `Content-Type` follows the
    /// verb, as the signed content type does.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            ("accept", ACCEPT_NOMETADATA.to_string()),
            ("x-ms-date", self.date.clone()),
            ("x-ms-version", self.api_version.clone()),
            ("authorization", self.authorization.clone()),
        ];
        let content_type = self.verb.signed_content_type();
        if !content_type.is_empty() {
            headers.push(("content-type", content_type.to_string()));
        }
        headers
    }
}

#[derive(Clone, Debug, Default)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// The request could not be dispatched or its response could not be read.
#[derive(thiserror::Error, Debug)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Non-blocking request dispatch. Implementations do not interpret payloads.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: SignedRequest) -> Result<TransportResponse, TransportError>;
}

#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: SignedRequest) -> Result<TransportResponse, TransportError> {
        let headers = request.headers();
        let method = reqwest::Method::from_bytes(request.verb.as_str().as_bytes())
            .map_err(|e| TransportError(e.to_string()))?;
        let mut req = self.client.request(method, request.url);
        for (name, value) in headers {
            req = req.header(name, value);
        }
        if let Some(body) = request.body {
            req = req.body(body);
        }
        let resp = req.send().await.map_err(|e| TransportError(e.to_string()))?;
        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        let body = resp.text().await.map_err(|e| TransportError(e.to_string()))?;
        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}
