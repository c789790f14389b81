//! The `Ok | Err` carrier threaded through every pipeline stage
//!
//! Every boundary that calls into user code — handlers, hooks, global
//! hooks, schema parsing — goes through [`invoke::capture`] so a panic or
//! an error produced anywhere in that code turns into an [`Outcome::Err`]
//! rather than unwinding through the engine.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The result carrier threaded through every pipeline stage: `Ok(value) | Err(message)`.
///
/// Unlike [`std::result::Result`] the error side is always a plain
/// string — structured detail (upload validation categories, auth
/// failure kinds) is attached one layer up, in [`crate::error::EngineError`],
/// and flattened to a string by the time it reaches this carrier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Ok(Value),
    Err(String),
}

impl Outcome {
    #[inline]
    pub fn ok(value: impl Into<Value>) -> Self {
        Outcome::Ok(value.into())
    }

    #[inline]
    pub fn err(message: impl Into<String>) -> Self {
        Outcome::Err(message.into())
    }

    #[inline]
    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Ok(_))
    }

    #[inline]
    pub fn is_err(&self) -> bool {
        matches!(self, Outcome::Err(_))
    }

    /// Returns the inner value, consuming `self`, or `None` if this is an `Err`.
    #[inline]
    pub fn into_value(self) -> Option<Value> {
        match self {
            Outcome::Ok(v) => Some(v),
            Outcome::Err(_) => None,
        }
    }

    /// Returns the error message, consuming `self`, or `None` if this is an `Ok`.
    #[inline]
    pub fn into_error(self) -> Option<String> {
        match self {
            Outcome::Err(e) => Some(e),
            Outcome::Ok(_) => None,
        }
    }

    /// Converts to a plain [`std::result::Result`], the shape most call
    /// sites actually want once they're done threading the carrier
    /// through a stage boundary.
    #[inline]
    pub fn into_value_or_error(self) -> std::result::Result<Value, String> {
        match self {
            Outcome::Ok(v) => Ok(v),
            Outcome::Err(e) => Err(e),
        }
    }
}

impl From<std::result::Result<Value, String>> for Outcome {
    #[inline]
    fn from(result: std::result::Result<Value, String>) -> Self {
        match result {
            Ok(v) => Outcome::Ok(v),
            Err(e) => Outcome::Err(e),
        }
    }
}
