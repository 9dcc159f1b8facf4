//! Authentication handlers
//!
//! The login/callback pair implements the OAuth2 authorization-code
//! flow against Google. The callback walks a fixed sequence of steps,
//! each of which can terminate the attempt: state consumption and
//! validation, code exchange, identity retrieval, account upsert,
//! session establishment.

use axum::extract::{Extension, Query};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::models::{CallbackParams, User};
use crate::common::{safe_email_log, ApiError, AppState};
use crate::services::google::{self, GoogleError, GoogleUserInfo, TokenResponse};
use crate::services::sessions::{clear_session_cookie, session_cookie, session_id_from_headers};

/// Plain 302 Found redirect
fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

/// GET /auth/login - Start the Google OAuth flow
///
/// Generates the anti-forgery state, stores it in the caller's session
/// (creating the session if the browser has none), then redirects to
/// Google's authorization endpoint. The session write completes before
/// the redirect is issued.
pub async fn google_login(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let state = state_lock.read().await.clone();

    let oauth_state = google::generate_state();
    let auth_url = state.google_service.authorization_url(&oauth_state);

    let (sid, set_cookie) = match session_id_from_headers(&headers) {
        Some(sid) if state.sessions.exists(&sid).await => (sid, None),
        _ => {
            let sid = state.sessions.create().await;
            let cookie = session_cookie(&sid);
            (sid, Some(cookie))
        }
    };

    // Cannot proceed without session durability; a lost state value
    // would make every callback fail validation.
    state
        .sessions
        .put_pending_state(&sid, &oauth_state)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to store pending OAuth state in session");
            ApiError::InternalServer("Could not start login. Please try again.".to_string())
        })?;

    info!("Stored pending OAuth state, redirecting to Google");

    let response = match set_cookie {
        Some(cookie) => ([(header::SET_COOKIE, cookie)], found(&auth_url)).into_response(),
        None => found(&auth_url),
    };
    Ok(response)
}

/// GET /auth/callback - Handle the redirect back from Google
///
/// Steps, in order, each a potential termination point:
/// 1. state consumption and validation (403 on mismatch, nothing else
///    runs; the stored state is single use either way)
/// 2. token exchange (400 on expired/replayed code)
/// 3. identity retrieval (500 on upstream failure)
/// 4. account resolution and credential persistence
/// 5. session establishment, then 302 to /
pub async fn google_callback(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    Query(params): Query<CallbackParams>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let state = state_lock.read().await.clone();

    let Some(sid) = session_id_from_headers(&headers) else {
        warn!("OAuth callback without a session cookie");
        return Err(ApiError::Forbidden(
            "State mismatch. Request denied.".to_string(),
        ));
    };

    // Take the stored state before comparing so that concurrent
    // callbacks cannot both validate against the same value. The state
    // is single use: a replayed callback finds nothing to take and
    // fails validation even if the exchange below fails.
    let stored_state = state.sessions.take_pending_state(&sid).await;
    if !validate_state(stored_state.as_deref(), params.state.as_deref()) {
        warn!(
            has_stored_state = stored_state.is_some(),
            has_received_state = params.state.is_some(),
            "OAuth state mismatch on callback"
        );
        return Err(ApiError::Forbidden(
            "State mismatch. Request denied.".to_string(),
        ));
    }

    if let Some(provider_error) = &params.error {
        warn!(oauth_error = %provider_error, "Google returned an error on callback");
        return Err(ApiError::BadRequest(format!(
            "Google sign-in failed: {}",
            provider_error
        )));
    }

    let Some(code) = params.code.as_deref() else {
        warn!("OAuth callback carried neither code nor error");
        return Err(ApiError::BadRequest(
            "No authorization code provided".to_string(),
        ));
    };

    let tokens = match state.google_service.exchange_code(code).await {
        Ok(t) => t,
        Err(GoogleError::ExpiredCode) => {
            // Expected under double submission (browser back button);
            // not a server fault.
            warn!("Authorization code expired or already used");
            return Err(ApiError::BadRequest(
                "Your sign-in session expired. Please try logging in again.".to_string(),
            ));
        }
        Err(e) => return Err(login_failure(&state, "Token exchange failed", e)),
    };

    let userinfo = match state.google_service.fetch_userinfo(&tokens.access_token).await {
        Ok(u) => u,
        Err(e) => return Err(login_failure(&state, "Failed to fetch user info", e)),
    };

    let user = upsert_google_user(&state.db, &userinfo, &tokens)
        .await
        .map_err(|e| {
            error!(
                error = %e,
                email = %safe_email_log(&userinfo.email),
                "Database error persisting user credentials"
            );
            ApiError::DatabaseError(e)
        })?;

    state.sessions.login(&sid, &user.id).await.map_err(|e| {
        error!(error = %e, user_id = %user.id, "Failed to establish authenticated session");
        ApiError::InternalServer("Login failed. Please try again.".to_string())
    })?;

    info!(
        user_id = %user.id,
        email = %safe_email_log(&user.email),
        "User authentication successful via Google OAuth"
    );

    Ok(found("/"))
}

/// GET /auth/logout - Destroy the session and return home
pub async fn logout(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let state = state_lock.read().await.clone();

    if let Some(sid) = session_id_from_headers(&headers) {
        state.sessions.destroy(&sid).await;
    }

    info!("User logout successful");
    Ok(([(header::SET_COOKIE, clear_session_cookie())], found("/")).into_response())
}

/// The stored pending state must exist, be non-empty, and exactly
/// match the received value.
pub(crate) fn validate_state(stored: Option<&str>, received: Option<&str>) -> bool {
    match (stored, received) {
        (Some(s), Some(r)) => !s.is_empty() && s == r,
        _ => false,
    }
}

/// Unexpected failure during the callback: log the detail server-side,
/// surface a generic message unless running with DEBUG=true.
fn login_failure(state: &AppState, context: &'static str, err: GoogleError) -> ApiError {
    error!(error = %err, context = context, "Login attempt failed");
    if state.debug {
        ApiError::InternalServer(format!("{}: {}", context, err))
    } else {
        ApiError::InternalServer("Login failed. Please try again.".to_string())
    }
}

/// Resolve the local account by email and overwrite its credentials.
///
/// First login by an email creates the row (username derived from the
/// email, name fields defaulting to empty string); subsequent logins
/// update the existing row. Returns the persisted user.
pub(crate) async fn upsert_google_user(
    pool: &SqlitePool,
    info: &GoogleUserInfo,
    tokens: &TokenResponse,
) -> Result<User, sqlx::Error> {
    let existing: Option<User> = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
        .bind(&info.email)
        .fetch_optional(pool)
        .await?;

    let user_id = match existing {
        Some(u) => u.id,
        None => {
            let id = Uuid::new_v4().to_string();
            info!(
                user_id = %id,
                email = %safe_email_log(&info.email),
                "Creating new user account via Google OAuth"
            );
            sqlx::query(
                "INSERT INTO users (id, username, email, first_name, last_name) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&id)
            .bind(&info.email)
            .bind(&info.email)
            .bind(info.given_name.as_deref().unwrap_or(""))
            .bind(info.family_name.as_deref().unwrap_or(""))
            .execute(pool)
            .await?;
            id
        }
    };

    let token_expiry = tokens.expiry_timestamp();
    sqlx::query(
        "UPDATE users SET google_id = ?, access_token = ?, refresh_token = ?, \
         token_expiry = ?, profile_picture = ? WHERE id = ?",
    )
    .bind(&info.sub)
    .bind(&tokens.access_token)
    .bind(tokens.refresh_token.as_deref())
    .bind(&token_expiry)
    .bind(info.picture.as_deref().unwrap_or(""))
    .bind(&user_id)
    .execute(pool)
    .await?;

    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(&user_id)
        .fetch_one(pool)
        .await
}
