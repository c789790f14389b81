//! Validation schemas as plug-ins
//!
//! spec.md §9 models validation as "any object exposing `safeParse`".
//! [`Schema`] is that interface, plus a `to_json_schema` method used by
//! the schema exporter (spec.md §4.5, "Schema rendering"). The framework
//! depends only on this trait; concrete schemas are provided by callers,
//! or via the [`TypedSchema`] adapter built on `serde`/`schemars` the way
//! `r2e-openapi` derives OpenAPI schemas from `schemars` output.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;

/// A pluggable validator for an action's payload.
///
/// `safe_parse` must never panic; a parse failure is a normal `Err`, not
/// a crash (though the pipeline wraps schema calls in the crash-safe
/// invoker regardless, per spec.md §4.1).
pub trait Schema: Send + Sync {
    /// Attempts to parse/coerce `value` into the schema's shape.
    /// On success, returns the (possibly coerced) data that replaces the
    /// in-flight payload (spec.md §4.4 Step 3).
    fn safe_parse(&self, value: &Value) -> Result<Value, String>;

    /// Renders a JSON-Schema-equivalent representation, or `None` if this
    /// schema can't produce one (spec.md §4.5: "Conversion failure yields
    /// `null` for that action; schemas are advisory").
    fn to_json_schema(&self) -> Option<Value>;
}

/// Adapts any `serde`-deserializable, `schemars`-describable Rust type
/// into a [`Schema`]. This is the typical way an action declares
/// validation: `TypedSchema::<CreateUser>::new()`.
pub struct TypedSchema<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> Default for TypedSchema<T> {
    fn default() -> Self {
        Self { _marker: PhantomData }
    }
}

impl<T> TypedSchema<T> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<T> Schema for TypedSchema<T>
where
    T: DeserializeOwned + serde::Serialize + Send + Sync,
{
    fn safe_parse(&self, value: &Value) -> Result<Value, String> {
        let typed: T = serde_json::from_value(value.clone())
            .map_err(|e| pretty_serde_error(&e))?;
        serde_json::to_value(typed).map_err(|e| e.to_string())
    }

    fn to_json_schema(&self) -> Option<Value> {
        None
    }
}

/// Same as [`TypedSchema`] but additionally requires `schemars::JsonSchema`
/// so `to_json_schema` can render a real schema instead of `None`. Kept
/// separate from [`TypedSchema`] so validation does not hard-require the
/// `schema` feature.
#[cfg(feature = "schema")]
pub struct JsonSchema<T> {
    _marker: PhantomData<fn() -> T>,
}

#[cfg(feature = "schema")]
impl<T> Default for JsonSchema<T> {
    fn default() -> Self {
        Self { _marker: PhantomData }
    }
}

#[cfg(feature = "schema")]
impl<T> JsonSchema<T> {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(feature = "schema")]
impl<T> Schema for JsonSchema<T>
where
    T: DeserializeOwned + serde::Serialize + schemars::JsonSchema + Send + Sync,
{
    fn safe_parse(&self, value: &Value) -> Result<Value, String> {
        let typed: T = serde_json::from_value(value.clone())
            .map_err(|e| pretty_serde_error(&e))?;
        serde_json::to_value(typed).map_err(|e| e.to_string())
    }

    fn to_json_schema(&self) -> Option<Value> {
        let schema = schemars::schema_for!(T);
        serde_json::to_value(schema).ok()
    }
}

fn pretty_serde_error(err: &serde_json::Error) -> String {
    format!("{} at line {} column {}", err, err.line(), err.column())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct CreateUser {
        name: String,
        email: String,
    }

    #[test]
    fn it_parses_valid_payload() {
        let schema = TypedSchema::<CreateUser>::new();
        let value = serde_json::json!({"name": "Alice", "email": "alice@test.com"});
        assert!(schema.safe_parse(&value).is_ok());
    }

    #[test]
    fn it_rejects_missing_field() {
        let schema = TypedSchema::<CreateUser>::new();
        let value = serde_json::json!({"name": "Alice"});
        assert!(schema.safe_parse(&value).is_err());
    }

    #[cfg(feature = "schema")]
    #[test]
    fn it_renders_json_schema() {
        #[derive(Serialize, Deserialize, schemars::JsonSchema)]
        struct Ping {
            message: String,
        }
        let schema = JsonSchema::<Ping>::new();
        assert!(schema.to_json_schema().is_some());
    }
}
