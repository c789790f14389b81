//! # Switchyard
//!
//! > An action-oriented application backend framework: a deterministic
//! > auth/hook/validation pipeline dispatched by `(service, action)` name,
//! > not by HTTP route.
//!
//! ## Features
//! * A single `executeAction` pipeline every transport funnels through
//! * Named services and actions, looked up in O(1) via a pre-built registry
//! * Before/after hooks — per-action and global — with critical/non-critical failure semantics
//! * Pluggable JSON Schema validation, HS256 JWT auth, and multipart uploads
//! * A reference REST transport built on [Tokio](https://tokio.rs/) and [hyper](https://hyper.rs/)
//! * Runs on stable Rust 1.80+
//!
//! ## Example
//! ```no_run
//! use std::sync::Arc;
//! use switchyard::config::EngineConfig;
//! use switchyard::engine::Engine;
//! use switchyard::registry::{Action, FnHandler, Service};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let create_user = Action::new(
//!         "createUser",
//!         "creates a user",
//!         Arc::new(FnHandler::new(|payload, _ctx| async move {
//!             Ok(json!({ "id": "u1", "name": payload["name"] }))
//!         })),
//!     );
//!
//!     let services = vec![Service::new("users", "user management").with_action(create_user)];
//!     let engine = Engine::new(EngineConfig::new("switchyard-example").with_services(services))?;
//!     engine.boot().await;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod invoke;
pub mod outcome;
pub mod pipeline;
pub mod registry;
pub mod schema;
pub mod transport;

pub mod upload;

#[cfg(feature = "rest")]
pub mod rest;

pub use crate::auth::{AuthConfig, AuthContext, AuthMethod, TokenVerifier};
pub use crate::config::EngineConfig;
pub use crate::context::{ExecutionContext, Interface, Resources};
pub use crate::dispatch::{Dispatcher, ExternalRequest, ExternalResponse, Intent};
pub use crate::engine::Engine;
pub use crate::error::{EngineError, ErrorCategory};
pub use crate::outcome::Outcome;
pub use crate::registry::{Action, ActionHandler, FnHandler, Hooks, Service};
pub use crate::schema::{Schema, TypedSchema};
pub use crate::transport::Transport;

#[cfg(feature = "jwt")]
pub use crate::auth::jwt::JwtVerifier;

#[cfg(feature = "schema")]
pub use crate::schema::JsonSchema;

pub use crate::upload::{StructuredPayload, UploadedFile, UploadsConfig};

#[cfg(feature = "rest")]
pub use crate::rest::RestConfig;
