use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Broad failure category every component-boundary error is classified into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    Validation,
    Network,
    System,
    Business,
    Timeout,
    Cancelled,
}

impl ErrorCategory {
    /// Whether errors in this category are generally worth retrying.
    pub fn is_transient(self) -> bool {
        matches!(self, ErrorCategory::Network | ErrorCategory::Timeout)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCategory::Validation => "VALIDATION",
            ErrorCategory::Network => "NETWORK",
            ErrorCategory::System => "SYSTEM",
            ErrorCategory::Business => "BUSINESS",
            ErrorCategory::Timeout => "TIMEOUT",
            ErrorCategory::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

/// The discriminated error type that crosses every component boundary in this crate.
///
/// No `panic!`/unwind is allowed to cross a component edge; call sites that talk to
/// providers or parse untrusted input convert failures into this shape immediately.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct Error {
    pub code: String,
    pub message: String,
    pub category: ErrorCategory,
    #[serde(default)]
    pub context: HashMap<String, String>,
    #[serde(default)]
    pub cause: Option<Box<Error>>,
}

impl Error {
    pub fn new(code: impl Into<String>, message: impl Into<String>, category: ErrorCategory) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            category,
            context: HashMap::new(),
            cause: None,
        }
    }

    pub fn validation(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(code, message, ErrorCategory::Validation)
    }

    pub fn network(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(code, message, ErrorCategory::Network)
    }

    pub fn system(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(code, message, ErrorCategory::System)
    }

    pub fn business(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(code, message, ErrorCategory::Business)
    }

    pub fn timeout(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(code, message, ErrorCategory::Timeout)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new("CANCELLED", message, ErrorCategory::Cancelled)
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn with_cause(mut self, cause: Error) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Human-facing remediation hints, derived from the error code. Used to populate
    /// `AgentError.suggestions` without coupling the renderer to error internals.
    pub fn suggestions(&self) -> Vec<String> {
        match self.code.as_str() {
            "ECONNREFUSED" | "PROVIDER_UNAVAILABLE" => vec![
                "verify the model server is running".to_string(),
                "check the configured base URL".to_string(),
            ],
            "TIMEOUT" => vec!["the request exceeded its deadline; retry or raise the timeout".to_string()],
            "SCHEMA_VIOLATION" => vec!["the model's response did not match the expected schema".to_string()],
            _ => Vec::new(),
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::system("SYSTEM_ERROR", err.to_string()).with_context("origin", format!("{err:#}"))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::system("IO_ERROR", err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::validation("INVALID_JSON", err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::timeout("TIMEOUT", err.to_string())
        } else if err.is_connect() {
            Error::network("ECONNREFUSED", err.to_string())
        } else {
            Error::network("TRANSPORT_ERROR", err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_categories() {
        assert!(ErrorCategory::Network.is_transient());
        assert!(ErrorCategory::Timeout.is_transient());
        assert!(!ErrorCategory::Validation.is_transient());
        assert!(!ErrorCategory::Cancelled.is_transient());
    }

    #[test]
    fn suggestions_for_known_codes() {
        let e = Error::network("ECONNREFUSED", "connection refused");
        assert!(!e.suggestions().is_empty());
        let e = Error::validation("SOMETHING_ELSE", "x");
        assert!(e.suggestions().is_empty());
    }

    #[test]
    fn cause_chain_roundtrips_through_json() {
        let inner = Error::network("ECONNREFUSED", "refused");
        let outer = Error::business("ALL_METHODS_FAILED", "no method succeeded").with_cause(inner);
        let json = serde_json::to_string(&outer).unwrap();
        let back: Error = serde_json::from_str(&json).unwrap();
        assert_eq!(back.cause.unwrap().code, "ECONNREFUSED");
    }
}
