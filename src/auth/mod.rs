//! Authentication configuration and the token-verifier contract
//!
//! spec.md §4.7 treats the JWT crypto primitive as an external,
//! black-box verifier; [`TokenVerifier`] is that contract. The `jwt`
//! feature ships a concrete HS256 implementation (module [`jwt`]) built
//! the way `volga::auth::bearer` splits a `BearerTokenService` out of its
//! `BearerAuthConfig` — one type configures, the other performs the work.

#[cfg(feature = "jwt")]
pub mod jwt;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::context::AuthResult;
use crate::error::EngineError;

/// Which side of the wire carries the token (spec.md §3, "AuthConfig").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    Header,
    Cookie,
}

const DEFAULT_HEADER_NAME: &str = "authorization";
const DEFAULT_COOKIE_NAME: &str = "auth_token";

/// Engine-level auth configuration (spec.md §3, §4.7). `secret` is the
/// HS256 signing key; `method` selects header vs. cookie extraction.
#[derive(Clone)]
pub struct AuthConfig {
    secret: String,
    method: AuthMethod,
    header_name: String,
    cookie_name: String,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret", &"[redacted]")
            .field("method", &self.method)
            .field("header_name", &self.header_name)
            .field("cookie_name", &self.cookie_name)
            .finish()
    }
}

impl AuthConfig {
    pub fn new(secret: impl Into<String>, method: AuthMethod) -> Self {
        Self {
            secret: secret.into(),
            method,
            header_name: DEFAULT_HEADER_NAME.to_string(),
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
        }
    }

    pub fn with_header_name(mut self, name: impl Into<String>) -> Self {
        self.header_name = name.into();
        self
    }

    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn method(&self) -> AuthMethod {
        self.method
    }

    pub fn header_name(&self) -> &str {
        &self.header_name
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }
}

/// Headers and cookies as handed to the verifier by the transport
/// adapter. Kept as plain string maps so the core never depends on a
/// concrete HTTP crate (spec.md §4.7, "Inputs").
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    pub headers: HashMap<String, String>,
    pub cookies: HashMap<String, String>,
}

impl AuthContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// Extracts the raw token per `config.method`, applying the
    /// `Bearer ` scheme check for header extraction (spec.md §4.7).
    pub fn extract_token(&self, config: &AuthConfig) -> Result<&str, EngineError> {
        match config.method() {
            AuthMethod::Header => {
                let raw = self
                    .header(config.header_name())
                    .ok_or_else(|| EngineError::auth("No JWT token found in header"))?;
                raw.strip_prefix("Bearer ")
                    .ok_or_else(|| EngineError::auth("Expected Bearer scheme in authorization header"))
            }
            AuthMethod::Cookie => self
                .cookie(config.cookie_name())
                .ok_or_else(|| EngineError::auth("No JWT token found in cookie")),
        }
    }
}

/// The black-box JWT verifier contract (spec.md §4.7). Any implementation
/// that can turn an [`AuthContext`] + [`AuthConfig`] into a populated
/// [`AuthResult`] (or a descriptive failure) satisfies this.
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, auth_ctx: &AuthContext, config: &AuthConfig) -> Result<AuthResult, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_extracts_bearer_token_from_header() {
        let config = AuthConfig::new("s3cret", AuthMethod::Header);
        let ctx = AuthContext::new().with_header("authorization", "Bearer abc.def.ghi");
        assert_eq!(ctx.extract_token(&config).unwrap(), "abc.def.ghi");
    }

    #[test]
    fn it_rejects_non_bearer_scheme() {
        let config = AuthConfig::new("s3cret", AuthMethod::Header);
        let ctx = AuthContext::new().with_header("authorization", "Basic abc");
        let err = ctx.extract_token(&config).unwrap_err();
        assert!(err.to_string().contains("Bearer scheme"));
    }

    #[test]
    fn it_extracts_token_from_cookie() {
        let config = AuthConfig::new("s3cret", AuthMethod::Cookie);
        let ctx = AuthContext::new().with_cookie("auth_token", "abc.def.ghi");
        assert_eq!(ctx.extract_token(&config).unwrap(), "abc.def.ghi");
    }

    #[test]
    fn it_reports_missing_token() {
        let config = AuthConfig::new("s3cret", AuthMethod::Header);
        let err = AuthContext::new().extract_token(&config).unwrap_err();
        assert_eq!(err.to_string(), "No JWT token found in header");
    }
}
