//! Typed server rejection payloads.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The standard error body returned by the server on a rejected request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[error("{errcode}: {error}")]
pub struct ProtocolError {
    /// The machine-readable error code, e.g. `M_FORBIDDEN`.
    pub errcode: String,

    /// The human-readable error message.
    #[serde(default)]
    pub error: String,

    /// Server-suggested retry delay for rate limits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

impl ProtocolError {
    /// An opaque fallback for responses without a parseable error body.
    pub fn unknown() -> Self {
        Self {
            errcode: "M_UNKNOWN".to_string(),
            error: String::new(),
            retry_after_ms: None,
        }
    }

    /// Whether this error means the credentials are no longer usable and
    /// retrying the same request cannot succeed.
    pub fn is_fatal(&self) -> bool {
        matches!(self.errcode.as_str(), "M_UNKNOWN_TOKEN" | "M_MISSING_TOKEN")
    }

    /// Whether the server asked for a delayed retry.
    pub fn is_rate_limited(&self) -> bool {
        self.errcode == "M_LIMIT_EXCEEDED"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_standard_body() {
        let err: ProtocolError = serde_json::from_value(json!({
            "errcode": "M_LIMIT_EXCEEDED",
            "error": "Too Many Requests",
            "retry_after_ms": 2000
        }))
        .unwrap();
        assert_eq!(err.errcode, "M_LIMIT_EXCEEDED");
        assert_eq!(err.retry_after_ms, Some(2000));
        assert!(err.is_rate_limited());
        assert!(!err.is_fatal());
    }

    #[test]
    fn missing_message_defaults_empty() {
        let err: ProtocolError =
            serde_json::from_value(json!({"errcode": "M_FORBIDDEN"})).unwrap();
        assert_eq!(err.error, "");
    }

    #[test]
    fn invalid_token_is_fatal() {
        let err: ProtocolError =
            serde_json::from_value(json!({"errcode": "M_UNKNOWN_TOKEN"})).unwrap();
        assert!(err.is_fatal());
    }

    #[test]
    fn display_includes_errcode() {
        let err = ProtocolError {
            errcode: "M_FORBIDDEN".into(),
            error: "no".into(),
            retry_after_ms: None,
        };
        assert_eq!(err.to_string(), "M_FORBIDDEN: no");
    }
}
