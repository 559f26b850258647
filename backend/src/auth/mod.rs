use std::sync::Arc;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use entitlements::domain::value_objects::{
    enums::user_roles::UserRole,
    iam::{AdminAllowlist, SessionContext},
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::{axum_http::error_responses::AppError, config::config_model::AuthSettings};

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    pub exp: usize,
}

/// Authenticated caller extracted from `Authorization: Bearer <jwt>`.
#[derive(Debug, Clone)]
pub struct AuthUser(pub SessionContext);

impl AuthUser {
    pub fn session(&self) -> &SessionContext {
        &self.0
    }
}

#[derive(Debug)]
pub struct AuthError(anyhow::Error);

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        AuthError(err)
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub fn validate_jwt(token: &str, secret: &str) -> Result<SessionClaims, AuthError> {
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    let validation = Validation::new(jsonwebtoken::Algorithm::HS256);

    let token_data = decode::<SessionClaims>(token, &decoding_key, &validation)
        .map_err(|e| anyhow::anyhow!("JWT validation failed: {}", e))?;

    Ok(token_data.claims)
}

pub fn session_from_claims(
    claims: SessionClaims,
    admins: &AdminAllowlist,
) -> Result<SessionContext, AuthError> {
    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| anyhow::anyhow!("Invalid user ID in token"))?;
    let role = claims
        .role
        .as_deref()
        .map(UserRole::from_str)
        .unwrap_or_default();

    Ok(SessionContext::new(user_id, claims.email, role, admins))
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let settings = parts
            .extensions
            .get::<Arc<AuthSettings>>()
            .cloned()
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("auth settings are not installed")))?;

        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::Unauthorized("Missing or invalid Authorization header".to_string()))?;

        let session = validate_jwt(bearer.token(), &settings.jwt_secret)
            .and_then(|claims| session_from_claims(claims, &settings.admins))
            .map_err(|err| {
                warn!(error = %err, "auth: rejected bearer token");
                AppError::Unauthorized(err.to_string())
            })?;

        Ok(AuthUser(session))
    }
}
