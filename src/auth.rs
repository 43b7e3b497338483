use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use jsonwebtoken::{DecodingKey, Validation, decode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::{AppConfig, Env},
    error::ApiError,
    repository::RepositoryState,
};

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_STAFF: &str = "staff";

/// Claims
///
/// Payload of the HS256 session token issued by the identity service.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the caller's `profiles.id`.
    pub sub: Uuid,
    pub exp: usize,
    pub iat: usize,
}

/// AuthUser
///
/// The resolved identity of an authenticated request. Taking it as a handler
/// argument is the authentication check; the role checks are the methods below
/// and are only reachable once authentication has succeeded.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: String,
}

impl AuthUser {
    /// Staff members and administrators.
    pub fn is_staff(&self) -> bool {
        self.role == ROLE_STAFF || self.role == ROLE_ADMIN
    }

    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }

    /// Returns `Forbidden(message)` unless the caller is staff or admin.
    pub fn require_staff(&self, message: &str) -> Result<(), ApiError> {
        if self.is_staff() {
            Ok(())
        } else {
            Err(ApiError::Forbidden(message.to_string()))
        }
    }

    /// Returns `Forbidden(message)` unless the caller is an administrator.
    pub fn require_admin(&self, message: &str) -> Result<(), ApiError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ApiError::Forbidden(message.to_string()))
        }
    }
}

/// AuthUser Extractor Implementation
///
/// 1. In `Env::Local`, an `x-user-id` header naming an existing profile is accepted.
/// 2. Otherwise a `Bearer` JWT is required and validated (signature and `exp`).
/// 3. The profile is looked up so the current role is used, not the one at issue time.
///
/// Rejects with a 401 envelope; a failed profile lookup is a 500.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        // Local development bypass. Falls through to token auth when absent or unknown.
        if config.env == Env::Local {
            let header_id = parts
                .headers
                .get("x-user-id")
                .and_then(|value| value.to_str().ok())
                .and_then(|raw| Uuid::parse_str(raw).ok());

            if let Some(user_id) = header_id {
                if let Some(user) = lookup_user(&repo, user_id).await? {
                    return Ok(user);
                }
            }
        }

        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(ApiError::unauthenticated)?;

        let decoding_key = DecodingKey::from_secret(config.jwt_secret.as_bytes());
        let mut validation = Validation::default();
        validation.validate_exp = true;

        let token_data = decode::<Claims>(token, &decoding_key, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => tracing::debug!("rejected expired token"),
                other => tracing::debug!(reason = ?other, "rejected invalid token"),
            }
            ApiError::unauthenticated()
        })?;

        // A valid token for a deleted profile is not a session.
        lookup_user(&repo, token_data.claims.sub)
            .await?
            .ok_or_else(ApiError::unauthenticated)
    }
}

async fn lookup_user(repo: &RepositoryState, id: Uuid) -> Result<Option<AuthUser>, ApiError> {
    let user = repo.get_user(id).await.map_err(|e| {
        tracing::error!(error = %e, "profile lookup failed");
        ApiError::Internal("Unable to verify credentials".to_string())
    })?;

    Ok(user.map(|user| AuthUser {
        id: user.id,
        role: user.role,
    }))
}
