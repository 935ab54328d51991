//! Account registration and session handlers
//!
//! The first account can be registered freely; every later registration
//! must present the configured admin access key. Sessions are JWTs carried
//! in an HTTP-only cookie or a bearer header.

use axum::{extract::State, http::StatusCode, Json};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, FixedOffset};
use papervault_common::{
    auth::{hash_password, verify_password, AuthContext},
    db::models::User,
    errors::{AppError, Result},
    metrics,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use super::validation_error;
use crate::middleware::rate_limit;
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,

    pub name: Option<String>,

    /// Required once any account exists
    pub access_key: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: i32,
    pub email: String,
    pub name: Option<String>,
    pub role: String,
    pub created_at: DateTime<FixedOffset>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            role: user.role,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: UserResponse,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn session_cookie(state: &AppState, token: String) -> Cookie<'static> {
    Cookie::build((state.jwt.cookie_name().to_string(), token))
        .http_only(true)
        .secure(state.config.auth.cookie_secure)
        .same_site(SameSite::Lax)
        .path("/")
        .build()
}

/// Check the access key presented for a non-first registration
fn check_access_key(expected: Option<&str>, given: Option<&str>) -> Result<()> {
    match (expected.filter(|k| !k.is_empty()), given) {
        (Some(expected), Some(given)) if given == expected => Ok(()),
        (None, _) => Err(AppError::Forbidden {
            message: "Registration is closed".to_string(),
        }),
        _ => Err(AppError::Forbidden {
            message: "Invalid admin access key".to_string(),
        }),
    }
}

async fn hash_off_thread(password: String) -> Result<String> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AppError::Internal {
            message: format!("password hashing task failed: {}", e),
        })?
}

async fn verify_off_thread(password: String, hash: String) -> bool {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .unwrap_or(false)
}

/// Register an admin account and start a session
pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, CookieJar, Json<AuthResponse>)> {
    request.validate().map_err(validation_error)?;

    let email = normalize_email(&request.email);

    if state.repo.count_users().await? > 0 {
        check_access_key(
            state.config.auth.admin_access_key.as_deref(),
            request.access_key.as_deref(),
        )?;
    }

    if state.repo.find_user_by_email(&email).await?.is_some() {
        return Err(AppError::Duplicate {
            message: "User with this email already exists".to_string(),
        });
    }

    let password_hash = hash_off_thread(request.password).await?;
    let name = request.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
    let user = state.repo.create_user(&email, password_hash, name).await?;

    let token = state.jwt.generate_token(&user)?;
    info!(user_id = user.id, email = %user.email, "Account registered");

    let jar = jar.add(session_cookie(&state, token.clone()));
    Ok((
        StatusCode::CREATED,
        jar,
        Json(AuthResponse {
            user: user.into(),
            token,
        }),
    ))
}

/// Exchange credentials for a session
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(request): Json<LoginRequest>,
) -> Result<(CookieJar, Json<AuthResponse>)> {
    request.validate().map_err(validation_error)?;

    let email = normalize_email(&request.email);

    if let Some(limiter) = &state.login_limiter {
        rate_limit::check_login(limiter, &email)?;
    }

    let user = state.repo.find_user_by_email(&email).await?;
    let verified = match &user {
        Some(user) => verify_off_thread(request.password, user.password_hash.clone()).await,
        None => false,
    };
    metrics::record_login(verified);

    let user = match user {
        Some(user) if verified => user,
        _ => {
            return Err(AppError::Unauthorized {
                message: "Invalid email or password".to_string(),
            })
        }
    };

    let token = state.jwt.generate_token(&user)?;
    info!(user_id = user.id, "Login succeeded");

    let jar = jar.add(session_cookie(&state, token.clone()));
    Ok((
        jar,
        Json(AuthResponse {
            user: user.into(),
            token,
        }),
    ))
}

/// End the session by clearing the cookie
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> (CookieJar, Json<MessageResponse>) {
    let removal = Cookie::build((state.jwt.cookie_name().to_string(), "")).path("/");
    (
        jar.remove(removal),
        Json(MessageResponse {
            message: "Logged out",
        }),
    )
}

/// Current account
pub async fn me(State(state): State<AppState>, auth: AuthContext) -> Result<Json<UserResponse>> {
    let user = state
        .repo
        .find_user_by_id(auth.user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized {
            message: "Account no longer exists".to_string(),
        })?;

    Ok(Json(user.into()))
}
