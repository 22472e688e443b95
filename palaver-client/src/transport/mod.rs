//! HTTP transport abstraction.
//!
//! The engine never talks to the network directly; it issues requests
//! through the [`HttpTransport`] trait. Implementations own connection
//! pooling, header injection and any transport-level retry policy.
//!
//! # Design
//!
//! Requests and responses are JSON values: the engine decodes the shapes
//! it cares about and passes everything else through untouched. A non-2xx
//! response surfaces as [`TransportError::Api`] carrying the server's
//! typed error body.

mod http;
mod mock;

pub use http::ReqwestTransport;
pub use mock::{MockTransport, RecordedRequest};

use async_trait::async_trait;
use palaver_types::ProtocolError;
use serde_json::Value;
use thiserror::Error;

/// HTTP method for a transport request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// HTTP GET.
    Get,
    /// HTTP POST.
    Post,
    /// HTTP PUT.
    Put,
    /// HTTP DELETE.
    Delete,
}

impl Method {
    /// The method as its wire string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

/// Transport errors.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The server rejected the request with a typed error body.
    #[error("api error ({status}): {error}")]
    Api {
        /// The HTTP status code.
        status: u16,
        /// The decoded error body.
        error: ProtocolError,
    },

    /// The request never produced an HTTP response.
    #[error("network error: {0}")]
    Network(String),

    /// The response body was not valid JSON.
    #[error("invalid response body: {0}")]
    InvalidBody(String),
}

impl TransportError {
    /// Whether retrying the same request cannot succeed (dead credentials).
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Api { status, error } => *status == 401 || error.is_fatal(),
            _ => false,
        }
    }

    /// The server-suggested retry delay, when rate limited.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::Api { error, .. } => error.retry_after_ms,
            _ => None,
        }
    }
}

/// Transport trait for issuing protocol HTTP requests.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Issue a request and decode the JSON response body.
    ///
    /// `path` is the endpoint path (already percent-encoded where needed);
    /// `query` is appended as query parameters; `body` is sent as JSON when
    /// present.
    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<Value>,
    ) -> Result<Value, TransportError>;
}
