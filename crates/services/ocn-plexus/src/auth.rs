use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use ocn_identity::Did;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// JWT configuration shared through request extensions.
#[derive(Clone, Debug)]
pub struct JwtConfig {
    /// The secret key used to verify JWT signatures
    pub secret_key: String,
    /// The issuer expected in JWT claims
    pub issuer: Option<String>,
    /// JWT validation settings
    pub validation: Validation,
}

impl Default for JwtConfig {
    fn default() -> Self {
        let mut validation = Validation::default();
        validation.set_required_spec_claims(&["sub", "exp"]);

        Self {
            secret_key: "change_this_to_a_secure_secret_key_in_production".to_string(),
            issuer: None,
            validation,
        }
    }
}

/// The claims structure inside the JWT.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (caller DID)
    pub sub: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// Expiration time (as numeric date)
    pub exp: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<usize>,
    /// Granted scopes: `a:b`, `a:*`, or `*:*`.
    #[serde(default)]
    pub scope: Vec<String>,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing authorization header")]
    MissingAuthHeader,

    #[error("invalid token format")]
    InvalidTokenFormat,

    #[error("token validation failed: {0}")]
    ValidationFailed(String),

    #[error("missing required scope: {0}")]
    MissingScope(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AuthError::MissingAuthHeader => (StatusCode::UNAUTHORIZED, self.to_string()),
            AuthError::InvalidTokenFormat => (StatusCode::BAD_REQUEST, self.to_string()),
            AuthError::ValidationFailed(_) => (StatusCode::UNAUTHORIZED, self.to_string()),
            AuthError::MissingScope(_) => (StatusCode::FORBIDDEN, self.to_string()),
            AuthError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };

        match status {
            StatusCode::UNAUTHORIZED => {
                (status, [(header::WWW_AUTHENTICATE, "Bearer")], message).into_response()
            }
            _ => (status, message).into_response(),
        }
    }
}

/// Validate and decode a JWT.
pub fn validate_token(token: &str, config: &JwtConfig) -> Result<Claims, AuthError> {
    let decoding_key = DecodingKey::from_secret(config.secret_key.as_bytes());

    let mut validation = config.validation.clone();
    if let Some(issuer) = &config.issuer {
        validation.set_issuer(&[issuer]);
    }

    match decode::<Claims>(token, &decoding_key, &validation) {
        Ok(token_data) => Ok(token_data.claims),
        Err(err) => {
            tracing::warn!("JWT validation failed: {}", err);
            Err(AuthError::ValidationFailed(err.to_string()))
        }
    }
}

/// Extractor for authenticated requests.
#[derive(Debug, Clone)]
pub struct AuthenticatedCaller {
    /// The caller's DID, from the `sub` claim.
    pub did: Did,
    /// Granted scopes.
    pub scopes: Vec<String>,
}

impl AuthenticatedCaller {
    /// Check a `resource:action` scope against the granted list,
    /// honoring `resource:*` and `*:*` grants.
    pub fn require(&self, scope: &str) -> Result<(), AuthError> {
        let resource = scope.split(':').next().unwrap_or(scope);
        let granted = self.scopes.iter().any(|g| {
            g == scope || g == "*:*" || g.strip_suffix(":*").is_some_and(|r| r == resource)
        });
        if granted {
            Ok(())
        } else {
            Err(AuthError::MissingScope(scope.to_string()))
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedCaller
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let jwt_config = parts
            .extensions
            .get::<Arc<JwtConfig>>()
            .ok_or_else(|| AuthError::Internal("JWT config not found".to_string()))?
            .clone();

        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .ok_or(AuthError::MissingAuthHeader)?;

        let auth_header_str = auth_header
            .to_str()
            .map_err(|_| AuthError::InvalidTokenFormat)?;

        if !auth_header_str.starts_with("Bearer ") {
            return Err(AuthError::InvalidTokenFormat);
        }

        let token = &auth_header_str["Bearer ".len()..];
        let claims = validate_token(token, &jwt_config)?;

        let did = Did::from_str(&claims.sub)
            .map_err(|e| AuthError::ValidationFailed(format!("subject is not a DID: {}", e)))?;

        Ok(AuthenticatedCaller {
            did,
            scopes: claims.scope,
        })
    }
}

/// Issue a JWT for a caller DID with the given scopes.
pub fn issue_token(
    subject: &str,
    scopes: Vec<String>,
    expires_in_secs: i64,
    config: &JwtConfig,
) -> Result<String, AuthError> {
    let now = Utc::now();
    let claims = Claims {
        sub: subject.to_string(),
        iss: config.issuer.clone(),
        exp: (now + Duration::seconds(expires_in_secs)).timestamp() as usize,
        iat: Some(now.timestamp() as usize),
        scope: scopes,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.secret_key.as_bytes()),
    )
    .map_err(|e| AuthError::Internal(format!("Failed to encode JWT: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocn_identity::KeyPair;

    #[test]
    fn scope_grammar_honors_wildcards() {
        let caller = AuthenticatedCaller {
            did: KeyPair::generate().did,
            scopes: vec!["contact-methods:read".into(), "credentials:*".into()],
        };

        assert!(caller.require("contact-methods:read").is_ok());
        assert!(caller.require("credentials:write").is_ok());
        assert!(caller.require("credentials:read").is_ok());
        assert!(caller.require("contact-methods:write").is_err());
        assert!(caller.require("invites:write").is_err());

        let root = AuthenticatedCaller {
            did: KeyPair::generate().did,
            scopes: vec!["*:*".into()],
        };
        assert!(root.require("anything:at-all").is_ok());
    }

    #[test]
    fn issued_tokens_validate_and_round_trip_claims() {
        let config = JwtConfig {
            secret_key: "test_secret".into(),
            issuer: Some("ocn-test".into()),
            validation: Validation::default(),
        };

        let kp = KeyPair::generate();
        let token =
            issue_token(kp.did.as_str(), vec!["profiles:write".into()], 3600, &config).unwrap();
        let claims = validate_token(&token, &config).unwrap();

        assert_eq!(claims.sub, kp.did.as_str());
        assert_eq!(claims.scope, vec!["profiles:write"]);
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let config = JwtConfig {
            secret_key: "test_secret".into(),
            issuer: None,
            validation: Validation::default(),
        };
        let kp = KeyPair::generate();
        let token = issue_token(kp.did.as_str(), vec![], -3600, &config).unwrap();
        assert!(validate_token(&token, &config).is_err());
    }
}
