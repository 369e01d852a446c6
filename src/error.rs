//! Error types for selector_heal.

use std::fmt;

/// Convenience result type used throughout the engine.
pub type EngineResult<T> = Result<T, EngineError>;

/// Coarse error classification for retry/healing policy decisions.
///
/// Callers branch on this instead of inspecting error message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Recoverable by an ordinary retry (network hiccup, slow render).
    Transient,
    /// The implicated selector is stale or missing; a heal pass may fix it.
    NeedsHeal,
    /// Healing was attempted (or is unavailable) and the operation still
    /// failed. Terminates the surrounding workflow step.
    Fatal,
}

/// Errors produced by the selector resolution engine.
#[derive(Debug)]
pub enum EngineError {
    /// HTTP-layer failure (request could not be sent, connection error, timeout).
    Http(reqwest::Error),
    /// JSON serialization/deserialization failure.
    Json(serde_json::Error),
    /// A required field was missing in a parsed JSON payload.
    MissingField(&'static str),
    /// A field was present but had an unexpected type or shape.
    InvalidField(&'static str),
    /// The remote provider returned a non-success status or server-side error.
    Remote(String),
    /// The provider rate-limited the credential for the requested model.
    RateLimited,
    /// The provider rejected the credential outright (401/403).
    Forbidden,
    /// A bounded operation exceeded its timeout.
    Timeout,
    /// Page capability failure (navigation, capture, DOM query).
    Page(String),
    /// Every eligible credential is exhausted for the named model.
    NoCredentials {
        /// Model the caller requested a credential for.
        model: String,
    },
    /// A cached selector no longer matches anything on the live page.
    StaleSelector {
        /// Page context the selector belongs to.
        context: String,
        /// Logical element key within the context.
        element: String,
    },
    /// Tier-2 recovery failed; the wrapped error is the final failure.
    Fatal(Box<EngineError>),
}

impl EngineError {
    /// Classify this error for retry/healing policy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Fatal(_) => ErrorKind::Fatal,
            EngineError::StaleSelector { .. } => ErrorKind::NeedsHeal,
            _ => ErrorKind::Transient,
        }
    }

    /// Wrap this error as a fatal, post-healing failure.
    pub fn into_fatal(self) -> EngineError {
        match self {
            EngineError::Fatal(_) => self,
            other => EngineError::Fatal(Box::new(other)),
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Http(e) => write!(f, "http error: {e}"),
            EngineError::Json(e) => write!(f, "json error: {e}"),
            EngineError::MissingField(s) => write!(f, "missing field: {s}"),
            EngineError::InvalidField(s) => write!(f, "invalid field: {s}"),
            EngineError::Remote(s) => write!(f, "remote error: {s}"),
            EngineError::RateLimited => write!(f, "rate limit exceeded"),
            EngineError::Forbidden => write!(f, "credential rejected"),
            EngineError::Timeout => write!(f, "operation timed out"),
            EngineError::Page(s) => write!(f, "page error: {s}"),
            EngineError::NoCredentials { model } => {
                write!(f, "no eligible credentials for model: {model}")
            }
            EngineError::StaleSelector { context, element } => {
                write!(f, "stale selector: '{element}' in '{context}'")
            }
            EngineError::Fatal(e) => write!(f, "fatal after healing: {e}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Http(e) => Some(e),
            EngineError::Json(e) => Some(e),
            EngineError::Fatal(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            EngineError::Timeout
        } else {
            EngineError::Http(e)
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Json(e)
    }
}
