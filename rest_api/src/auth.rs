// rest_api/src/auth.rs

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use models::{CareError, Principal, User};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AppState, RestApiError};

/// What gets signed into a login token. `sub` is the staff account id; the
/// role is informational for clients, authorization always reads the stored
/// account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub exp: usize,
}

/// Signing and verification keys plus the token lifetime.
pub struct AuthKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_hours: i64,
}

impl AuthKeys {
    pub fn new(secret: &[u8], ttl_hours: i64) -> Self {
        AuthKeys {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl_hours,
        }
    }

    /// Signs a token for a freshly authenticated account.
    pub fn issue(&self, user: &User) -> Result<String, RestApiError> {
        let claims = Claims {
            sub: user.id.to_string(),
            role: user.role.as_str().to_string(),
            exp: (Utc::now() + Duration::hours(self.ttl_hours)).timestamp() as usize,
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| RestApiError::GeneralError(format!("Failed to sign token: {}", e)))
    }

    /// Decodes a token and returns the account id it was issued to.
    pub fn subject(&self, token: &str) -> Result<Uuid, RestApiError> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::default())
            .map_err(|e| RestApiError::Unauthorized(format!("Invalid token: {}", e)))?;
        Uuid::parse_str(&data.claims.sub)
            .map_err(|_| RestApiError::Unauthorized("Malformed token subject".to_string()))
    }
}

/// The calling staff member, resolved from the `Authorization` header.
///
/// The stored account is re-read on every request, so deactivating or
/// suspending an account cuts its tokens off before they expire, and a role
/// change applies immediately.
pub struct AuthPrincipal(pub Principal);

#[async_trait]
impl FromRequestParts<AppState> for AuthPrincipal {
    type Rejection = RestApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| RestApiError::Unauthorized("Missing Authorization header".to_string()))?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| RestApiError::Unauthorized("Expected a bearer token".to_string()))?;

        let user_id = state.auth.subject(token)?;
        let principal = state.store.read(|tables| {
            let user = tables
                .require_user(user_id)
                .map_err(|_| CareError::auth("Token does not match a known account"))?;
            if !user.is_active_staff() {
                return Err(CareError::forbidden("Account is no longer active"));
            }
            Ok(user.principal())
        })?;
        Ok(AuthPrincipal(principal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use models::{NewUser, Role};

    fn sample_user() -> User {
        User::from_new_user(NewUser {
            first_name: "Awa".into(),
            last_name: "Diallo".into(),
            email: "awa@clinic.test".into(),
            password: "longenough".into(),
            role: Role::Doctor,
            phone: None,
        })
        .unwrap()
    }

    #[test]
    fn should_round_trip_subject_through_a_token() {
        let keys = AuthKeys::new(b"unit-secret", 8);
        let user = sample_user();
        let token = keys.issue(&user).unwrap();
        assert_eq!(keys.subject(&token).unwrap(), user.id);
    }

    #[test]
    fn should_reject_a_token_signed_with_another_secret() {
        let user = sample_user();
        let token = AuthKeys::new(b"one-secret", 8).issue(&user).unwrap();
        let err = AuthKeys::new(b"other-secret", 8).subject(&token).unwrap_err();
        assert!(err.to_string().contains("Invalid token"));
    }

    #[test]
    fn should_reject_an_expired_token() {
        let keys = AuthKeys::new(b"unit-secret", -1);
        let user = sample_user();
        let token = keys.issue(&user).unwrap();
        let err = keys.subject(&token).unwrap_err();
        assert!(err.to_string().contains("Invalid token"));
    }
}
