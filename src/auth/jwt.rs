//! HS256 JWT verification
//!
//! Concrete realization of [`TokenVerifier`] built on `jsonwebtoken`, the
//! same crate `volga::auth::bearer::BearerTokenService` wraps for
//! encode/decode. spec.md §4.7 requires the decoded claims to contain a
//! `userId`/`id`/`sub` string and an `organizationId`/`organization_id`/
//! `orgId` string; this verifier checks the claims as a raw JSON object
//! so it does not force callers into one fixed claims struct.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde_json::Value;

use super::{AuthConfig, AuthContext, TokenVerifier};
use crate::context::AuthResult;
use crate::error::EngineError;

/// HS256-only verifier. Exposure of other algorithms is intentionally
/// out of scope — spec.md §4.7 names HS256 specifically.
pub struct JwtVerifier {
    validation: Validation,
}

impl Default for JwtVerifier {
    fn default() -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        Self { validation }
    }
}

impl JwtVerifier {
    pub fn new() -> Self {
        Self::default()
    }
}

fn first_string_claim<'a>(claims: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| claims.get(*k).and_then(Value::as_str))
}

impl TokenVerifier for JwtVerifier {
    fn verify(&self, auth_ctx: &AuthContext, config: &AuthConfig) -> Result<AuthResult, EngineError> {
        let token = auth_ctx.extract_token(config)?;
        let key = DecodingKey::from_secret(config.secret().as_bytes());

        let data = decode::<Value>(token, &key, &self.validation)
            .map_err(|e| EngineError::auth(format!("JWT authentication failed: {e}")))?;
        let claims = data.claims;

        let user_id = first_string_claim(&claims, &["userId", "id", "sub"]);
        let organization_id = first_string_claim(&claims, &["organizationId", "organization_id", "orgId"]);

        match (user_id, organization_id) {
            (Some(user_id), Some(organization_id)) => Ok(AuthResult {
                user_id: user_id.to_string(),
                organization_id: organization_id.to_string(),
                claims,
            }),
            _ => Err(EngineError::auth("Missing userId or organizationId in JWT token")),
        }
    }
}
