//! HTTP transport over reqwest.

use super::{HttpTransport, Method, TransportError};
use async_trait::async_trait;
use palaver_types::ProtocolError;
use serde_json::Value;

/// [`HttpTransport`] implementation over a shared reqwest client.
///
/// Injects the bearer token on every request. The underlying client must
/// not have a request timeout shorter than the sync long-poll timeout;
/// [`ReqwestTransport::new`] builds one without a timeout for that reason.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: reqwest::Client,
    base_url: String,
    access_token: Option<String>,
}

impl ReqwestTransport {
    /// Create a transport against a homeserver base URL, e.g.
    /// `https://example.org`.
    pub fn new(base_url: impl Into<String>, access_token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: trim_trailing_slash(base_url.into()),
            access_token,
        }
    }

    /// Create a transport reusing an existing reqwest client.
    pub fn with_client(
        http: reqwest::Client,
        base_url: impl Into<String>,
        access_token: Option<String>,
    ) -> Self {
        Self {
            http,
            base_url: trim_trailing_slash(base_url.into()),
            access_token,
        }
    }
}

fn trim_trailing_slash(mut url: String) -> String {
    while url.ends_with('/') {
        url.pop();
    }
    url
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<Value>,
    ) -> Result<Value, TransportError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = match method {
            Method::Get => self.http.get(&url),
            Method::Post => self.http.post(&url),
            Method::Put => self.http.put(&url),
            Method::Delete => self.http.delete(&url),
        };
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        let status = response.status().as_u16();
        let value: Value = response
            .json()
            .await
            .map_err(|e| TransportError::InvalidBody(e.to_string()))?;

        if (200..300).contains(&status) {
            Ok(value)
        } else {
            let error: ProtocolError =
                serde_json::from_value(value).unwrap_or_else(|_| ProtocolError::unknown());
            Err(TransportError::Api { status, error })
        }
    }
}
