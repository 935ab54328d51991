//! Authentication and authorization utilities
//!
//! Provides:
//! - Password hashing (argon2)
//! - JWT token generation and validation
//! - Session context extraction from a bearer token or the session cookie

use crate::config::AuthConfig;
use crate::db::models::{User, ROLE_ADMIN};
use crate::errors::{AppError, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts, HeaderMap},
};
use axum_extra::extract::CookieJar;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Authenticated session available to handlers
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: i32,
    pub email: String,
    pub role: String,
}

impl AuthContext {
    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }

    /// Require the admin role, returning error if absent
    pub fn require_admin(&self) -> Result<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden {
                message: "Admin access required".to_string(),
            })
        }
    }
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject (user ID)
    pub sub: i32,

    pub email: String,

    pub role: String,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    /// Issued at (Unix timestamp)
    pub iat: i64,
}

/// JWT token manager
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiration_secs: i64,
    cookie_name: String,
}

impl JwtManager {
    /// Create a new JWT manager with the given secret
    pub fn new(secret: &str, expiration_secs: u64, cookie_name: impl Into<String>) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expiration_secs: expiration_secs as i64,
            cookie_name: cookie_name.into(),
        }
    }

    /// Build from configuration; a signing secret is mandatory
    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        let secret = config
            .jwt_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::Configuration {
                message: "auth.jwt_secret must be set".to_string(),
            })?;

        Ok(Self::new(secret, config.jwt_expiration_secs, config.cookie_name.clone()))
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    pub fn expiration_secs(&self) -> i64 {
        self.expiration_secs
    }

    /// Generate a new JWT token for a user
    pub fn generate_token(&self, user: &User) -> Result<String> {
        let now = Utc::now();
        let exp = now + Duration::seconds(self.expiration_secs);

        let claims = JwtClaims {
            sub: user.id,
            email: user.email.clone(),
            role: user.role.clone(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal {
                message: format!("Failed to generate token: {}", e)
            })
    }

    /// Validate and decode a JWT token
    pub fn validate_token(&self, token: &str) -> Result<JwtClaims> {
        decode::<JwtClaims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| {
                match e.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                        AppError::ExpiredToken
                    }
                    _ => AppError::InvalidToken,
                }
            })
    }

    /// Pull a token from the `Authorization` header or the session cookie
    pub fn token_from_headers(&self, headers: &HeaderMap) -> Option<String> {
        let bearer = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(extract_bearer)
            .map(String::from);

        bearer.or_else(|| {
            CookieJar::from_headers(headers)
                .get(&self.cookie_name)
                .map(|c| c.value().to_string())
        })
    }
}

/// Hash a password for storage
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal {
            message: format!("Failed to hash password: {}", e),
        })
}

/// Check a password against a stored hash
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Extract the token from an `Authorization: Bearer` value
pub fn extract_bearer(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Axum extractor for AuthContext
impl<S> FromRequestParts<S> for AuthContext
where
    Arc<JwtManager>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        let jwt = Arc::<JwtManager>::from_ref(state);

        let token = jwt
            .token_from_headers(&parts.headers)
            .ok_or_else(|| AppError::Unauthorized {
                message: "Not authenticated".to_string(),
            })?;

        let claims = jwt.validate_token(&token)?;

        Ok(AuthContext {
            user_id: claims.sub,
            email: claims.email,
            role: claims.role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn test_user() -> User {
        let now = Utc::now().fixed_offset();
        User {
            id: 7,
            email: "admin@example.edu".to_string(),
            password_hash: String::new(),
            name: Some("Admin".to_string()),
            role: ROLE_ADMIN.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_password_hash_roundtrip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
    }

    #[test]
    fn test_verify_rejects_garbage_hash() {
        assert!(!verify_password("anything", "not-a-phc-string"));
    }

    #[test]
    fn test_extract_bearer() {
        assert_eq!(extract_bearer("Bearer abc.def"), Some("abc.def"));
        assert_eq!(extract_bearer("abc.def"), None);
        assert_eq!(extract_bearer("Bearer "), None);
    }

    #[test]
    fn test_jwt_roundtrip() {
        let manager = JwtManager::new("test_secret", 3600, "auth_token");
        let token = manager.generate_token(&test_user()).unwrap();
        let claims = manager.validate_token(&token).unwrap();

        assert_eq!(claims.sub, 7);
        assert_eq!(claims.email, "admin@example.edu");
        assert_eq!(claims.role, ROLE_ADMIN);
    }

    #[test]
    fn test_jwt_wrong_secret_is_invalid() {
        let issuer = JwtManager::new("secret-a", 3600, "auth_token");
        let checker = JwtManager::new("secret-b", 3600, "auth_token");
        let token = issuer.generate_token(&test_user()).unwrap();

        assert!(matches!(checker.validate_token(&token), Err(AppError::InvalidToken)));
    }

    #[test]
    fn test_token_from_cookie_or_header() {
        let manager = JwtManager::new("s", 60, "auth_token");

        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark; auth_token=from-cookie"));
        assert_eq!(manager.token_from_headers(&headers).as_deref(), Some("from-cookie"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));
        assert_eq!(manager.token_from_headers(&headers).as_deref(), Some("from-header"));
    }

    #[test]
    fn test_require_admin() {
        let ctx = AuthContext { user_id: 1, email: "a@b.c".into(), role: "viewer".into() };
        assert!(ctx.require_admin().is_err());

        let admin = AuthContext { role: ROLE_ADMIN.into(), ..ctx };
        tokio_test::assert_ok!(admin.require_admin());
    }
}
