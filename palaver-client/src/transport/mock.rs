//! Mock transport for testing.
//!
//! Allows queueing responses and capturing issued requests for verification.

use super::{HttpTransport, Method, TransportError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// A request captured by the mock transport.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// The request method.
    pub method: Method,
    /// The request path.
    pub path: String,
    /// The query parameters.
    pub query: Vec<(String, String)>,
    /// The JSON body, when one was sent.
    pub body: Option<Value>,
}

/// Mock transport for testing.
///
/// Responses are served in FIFO order regardless of path; tests queue them
/// in the order the code under test issues requests.
#[derive(Debug, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[derive(Debug, Default)]
struct MockTransportInner {
    requests: Vec<RecordedRequest>,
    response_queue: VecDeque<Result<Value, TransportError>>,
}

impl MockTransport {
    /// Create a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful JSON response.
    pub fn queue_response(&self, body: Value) {
        let mut inner = self.inner.lock().unwrap();
        inner.response_queue.push_back(Ok(body));
    }

    /// Queue an error to be returned instead of a response.
    pub fn queue_error(&self, error: TransportError) {
        let mut inner = self.inner.lock().unwrap();
        inner.response_queue.push_back(Err(error));
    }

    /// All requests issued so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        let inner = self.inner.lock().unwrap();
        inner.requests.clone()
    }

    /// The most recent request, if any.
    pub fn last_request(&self) -> Option<RecordedRequest> {
        let inner = self.inner.lock().unwrap();
        inner.requests.last().cloned()
    }

    /// Requests issued against the given path.
    pub fn requests_for(&self, path: &str) -> Vec<RecordedRequest> {
        let inner = self.inner.lock().unwrap();
        inner
            .requests
            .iter()
            .filter(|r| r.path == path)
            .cloned()
            .collect()
    }

    /// Clear all recorded requests and queued responses.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        *inner = MockTransportInner::default();
    }
}

impl Clone for MockTransport {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<Value>,
    ) -> Result<Value, TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.requests.push(RecordedRequest {
            method,
            path: path.to_string(),
            query: query.to_vec(),
            body,
        });
        inner
            .response_queue
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Network("mock queue empty".into())))
    }
}
