//! Error taxonomy
//!
//! Every class of failure enumerated in spec.md §7 (registry, routing,
//! envelope, content-type, upload validation, auth, hook/handler,
//! validation, crash) is represented by one [`ErrorCategory`] variant so
//! the transport edge can map a failure to the right status code without
//! re-deriving it from the message text.

use serde_json::Value;
use std::fmt;

/// Coarse classification used by transports to pick an HTTP status and
/// by the upload validators to populate `data.error_category`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Duplicate service/action name at registry construction time.
    Registry,
    /// Unknown service/action, or wildcards passed to `execute`.
    Routing,
    /// Malformed or missing envelope fields.
    Envelope,
    /// Upload content-type does not match the action's declared type.
    ContentType,
    /// One of the seven upload validators failed.
    Validation,
    /// Missing auth context, bad token, signature failure, missing claims.
    Auth,
    /// A critical hook or the handler itself failed or crashed.
    Hook,
    /// `safe_parse` rejected the payload.
    SchemaValidation,
}

impl ErrorCategory {
    /// The conventional HTTP status class for this error, used by the
    /// reference REST transport. The dispatcher itself stays transport-neutral
    /// (spec.md §4.5) — this mapping lives at the edge, not in the core.
    pub fn http_status(self) -> u16 {
        match self {
            ErrorCategory::Registry => 500,
            ErrorCategory::ContentType => 415,
            _ => 400,
        }
    }
}

/// A rich engine-level error. Converted to the plain `Outcome::Err(String)`
/// carrier at pipeline-stage boundaries via [`EngineError::into_message`];
/// kept intact (with `data`) up to the point a transport shapes the final
/// [`crate::dispatch::ExternalResponse`].
#[derive(Debug, Clone)]
pub struct EngineError {
    pub category: ErrorCategory,
    pub message: String,
    pub data: Value,
}

impl EngineError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self { category, message: message.into(), data: Value::Object(Default::default()) }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn registry(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Registry, message)
    }

    pub fn routing(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Routing, message)
    }

    pub fn envelope(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Envelope, message)
    }

    pub fn content_type(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::ContentType, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Validation, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Auth, message)
    }

    pub fn hook(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Hook, message)
    }

    pub fn schema_validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::SchemaValidation, message)
    }

    #[inline]
    pub fn into_message(self) -> String {
        self.message
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for EngineError {}
