//! # Error taxonomy
//!
//! Every failure that can reach a tool caller is folded into one of the
//! [`ErrorKind`] variants below and carried as a [`ToolError`]. The
//! normalization helpers in this module translate provider, HTTP and timeout
//! failures into that shape and scrub endpoint URLs from the message text.

use ethers::providers::{ProviderError, RpcError};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Closed set of failure classes surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// Malformed or missing argument. Local, never retried.
    ValidationError,
    /// Unknown network name.
    NetworkUnsupported,
    /// Tool needs a feature (ENS) the resolved network lacks.
    CapabilityUnsupported,
    /// The pool could not establish or reuse a connection.
    ConnectionFailure,
    /// Upstream call exceeded its deadline.
    #[serde(rename = "RPCTimeout")]
    RpcTimeout,
    /// Bounded wait for a rate-limit permit was exhausted.
    RateLimitExceeded,
    /// Upstream answered with a structured error.
    UpstreamError,
    /// Entity (transaction, block, ENS name, contract) does not exist.
    NotFound,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ValidationError => "ValidationError",
            ErrorKind::NetworkUnsupported => "NetworkUnsupported",
            ErrorKind::CapabilityUnsupported => "CapabilityUnsupported",
            ErrorKind::ConnectionFailure => "ConnectionFailure",
            ErrorKind::RpcTimeout => "RPCTimeout",
            ErrorKind::RateLimitExceeded => "RateLimitExceeded",
            ErrorKind::UpstreamError => "UpstreamError",
            ErrorKind::NotFound => "NotFound",
        }
    }

    /// Connection-level failures that justify recycling the pooled handle.
    pub fn is_transport(&self) -> bool {
        matches!(self, ErrorKind::ConnectionFailure | ErrorKind::RpcTimeout)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure with a caller-safe message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct ToolError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ToolError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: redact_endpoints(&message.into()),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValidationError, message)
    }

    pub fn network_unsupported(network: &str) -> Self {
        Self::new(
            ErrorKind::NetworkUnsupported,
            format!("Unsupported network: '{}'", network),
        )
    }

    pub fn capability_unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CapabilityUnsupported, message)
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConnectionFailure, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RpcTimeout, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RateLimitExceeded, message)
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UpstreamError, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }
}

impl From<ProviderError> for ToolError {
    fn from(err: ProviderError) -> Self {
        normalize_provider_error(&err)
    }
}

impl From<reqwest::Error> for ToolError {
    fn from(err: reqwest::Error) -> Self {
        normalize_http_error(&err)
    }
}

impl From<tokio::time::error::Elapsed> for ToolError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        ToolError::timeout("Upstream call timed out")
    }
}

impl From<ethers::abi::Error> for ToolError {
    fn from(err: ethers::abi::Error) -> Self {
        ToolError::validation(format!("ABI error: {}", err))
    }
}

/// Classify an error raised by the ethers provider.
pub fn normalize_provider_error(err: &ProviderError) -> ToolError {
    if let Some(rpc_err) = err.as_error_response() {
        // Structured JSON-RPC error: reverts, invalid params, node-side limits.
        return ToolError::upstream(format!(
            "RPC error {}: {}",
            rpc_err.code, rpc_err.message
        ));
    }
    match err {
        ProviderError::EnsError(name) => {
            ToolError::not_found(format!("ENS name '{}' not found or not resolved", name))
        }
        ProviderError::EnsNotOwned(name) => {
            ToolError::not_found(format!("ENS name '{}' has no owner", name))
        }
        ProviderError::HTTPError(http) => {
            if http.is_timeout() {
                ToolError::timeout(format!("RPC request timed out: {}", http))
            } else if http.is_connect() {
                ToolError::connection(format!("RPC connection failed: {}", http))
            } else {
                ToolError::upstream(format!("RPC HTTP error: {}", http))
            }
        }
        other => classify_message(&other.to_string()),
    }
}

/// Classify an error raised by a `reqwest` HTTP data source.
pub fn normalize_http_error(err: &reqwest::Error) -> ToolError {
    if err.is_timeout() {
        return ToolError::timeout(format!("HTTP request timed out: {}", err));
    }
    if err.is_connect() {
        return ToolError::connection(format!("HTTP connection failed: {}", err));
    }
    match err.status().map(|s| s.as_u16()) {
        Some(404) => ToolError::not_found(format!("Resource not found: {}", err)),
        Some(429) => ToolError::rate_limited(format!("Data source rate limit: {}", err)),
        _ => ToolError::upstream(format!("HTTP error: {}", err)),
    }
}

/// Best-effort classification of transport errors that only survive as text
/// (the HTTP transport boxes its errors behind a trait object).
fn classify_message(message: &str) -> ToolError {
    let lower = message.to_lowercase();
    if lower.contains("timed out") || lower.contains("timeout") {
        ToolError::timeout(message)
    } else if lower.contains("connection refused")
        || lower.contains("error sending request")
        || lower.contains("dns error")
        || lower.contains("connection reset")
        || lower.contains("tcp connect")
    {
        ToolError::connection(message)
    } else {
        ToolError::upstream(message)
    }
}

/// Replace every URL-looking token with `<endpoint>` so RPC endpoints (which
/// frequently embed API keys) never reach callers.
pub fn redact_endpoints(message: &str) -> String {
    const SCHEMES: [&str; 4] = ["http://", "https://", "ws://", "wss://"];
    let mut out = String::with_capacity(message.len());
    let mut rest = message;
    loop {
        let next = SCHEMES
            .iter()
            .filter_map(|scheme| rest.find(scheme))
            .min();
        match next {
            Some(start) => {
                out.push_str(&rest[..start]);
                out.push_str("<endpoint>");
                let tail = &rest[start..];
                let end = tail
                    .find(|c: char| c.is_whitespace() || matches!(c, ')' | '"' | '\'' | ','))
                    .unwrap_or(tail.len());
                rest = &tail[end..];
            }
            None => {
                out.push_str(rest);
                break;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_urls_with_credentials() {
        let msg = "error sending request for url (https://mainnet.infura.io/v3/SECRET): refused";
        let redacted = redact_endpoints(msg);
        assert!(!redacted.contains("SECRET"));
        assert_eq!(
            redacted,
            "error sending request for url (<endpoint>): refused"
        );
    }

    #[test]
    fn message_classification() {
        assert_eq!(
            classify_message("operation timed out").kind,
            ErrorKind::RpcTimeout
        );
        assert_eq!(
            classify_message("error sending request: connection refused").kind,
            ErrorKind::ConnectionFailure
        );
        assert_eq!(
            classify_message("execution reverted").kind,
            ErrorKind::UpstreamError
        );
    }

    #[test]
    fn timeout_serializes_with_protocol_name() {
        let json = serde_json::to_value(ErrorKind::RpcTimeout).unwrap();
        assert_eq!(json, serde_json::json!("RPCTimeout"));
    }
}
