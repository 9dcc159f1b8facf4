//! Dashboard handlers
//!
//! A single aggregation view over the three Workspace queries. Each
//! query fails independently; a failure appends to the response's
//! error message while the sibling queries still run. Only a
//! credential-refresh failure short-circuits, since no query can
//! succeed without a usable token.

use axum::extract::Extension;
use axum::Json;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, warn};

use super::models::DashboardResponse;
use crate::auth::{AuthedUser, User};
use crate::common::{safe_email_log, safe_token_log, ApiError, AppState};
use crate::services::google::GoogleError;

/// How close to expiry a stored access token is still trusted.
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;

/// GET / - Aggregated dashboard data
///
/// Anonymous callers get empty result sets and no network calls.
pub async fn home(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    user: Option<AuthedUser>,
) -> Result<Json<DashboardResponse>, ApiError> {
    let state = state_lock.read().await.clone();
    let mut response = DashboardResponse::default();

    let Some(authed) = user else {
        return Ok(Json(response));
    };

    debug!(
        user_id = %authed.id,
        email = %safe_email_log(&authed.email),
        "Rendering dashboard for authenticated user"
    );

    let user: User = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(&authed.id)
        .fetch_one(&state.db)
        .await
        .map_err(|e| {
            error!(error = %e, user_id = %authed.id, "Database error loading user for dashboard");
            ApiError::DatabaseError(e)
        })?;

    let access_token = match ensure_fresh_token(&state, &user).await {
        Ok(t) => t,
        Err(GoogleError::RefreshFailed) => {
            warn!(user_id = %user.id, "Stored Google credentials rejected on refresh");
            response.error_message = Some(
                "Your Google session expired. Please log out and log in again.".to_string(),
            );
            return Ok(Json(response));
        }
        Err(e) => {
            error!(error = %e, user_id = %user.id, "Could not obtain a usable access token");
            response.error_message = Some(if state.debug {
                format!("Unexpected error: {}", e)
            } else {
                "Unexpected error while loading your dashboard.".to_string()
            });
            return Ok(Json(response));
        }
    };

    // Sheets via Drive (list spreadsheets)
    match state.google_service.list_spreadsheets(&access_token).await {
        Ok(files) => response.sheets = files,
        Err(e) => {
            warn!(error = %e, user_id = %user.id, "Drive query failed");
            append_error(&mut response.error_message, &format!("Sheets error: {}", e));
        }
    }

    // Calendar: next 7 days
    match state.google_service.upcoming_events(&access_token).await {
        Ok(events) => response.calendar_events = events,
        Err(e) => {
            warn!(error = %e, user_id = %user.id, "Calendar query failed");
            append_error(
                &mut response.error_message,
                &format!("Calendar error: {}", e),
            );
        }
    }

    // Tasks: first few lists, incomplete tasks
    match state.google_service.incomplete_tasks(&access_token).await {
        Ok(tasks) => response.tasks = tasks,
        Err(e) => {
            warn!(error = %e, user_id = %user.id, "Tasks query failed");
            append_error(&mut response.error_message, &format!("Tasks error: {}", e));
        }
    }

    Ok(Json(response))
}

/// Reconstruct a usable bearer token from the stored credentials.
///
/// The stored access token is reused while its recorded expiry is
/// comfortably in the future; otherwise the refresh token obtains a
/// new one, which is persisted back onto the user row. No refresh
/// token (or a rejected one) maps to [`GoogleError::RefreshFailed`].
async fn ensure_fresh_token(state: &AppState, user: &User) -> Result<String, GoogleError> {
    if let (Some(token), Some(expiry)) = (&user.access_token, &user.token_expiry) {
        if let Ok(expires_at) = DateTime::parse_from_rfc3339(expiry) {
            if expires_at.with_timezone(&Utc)
                > Utc::now() + Duration::seconds(TOKEN_EXPIRY_MARGIN_SECS)
            {
                debug!(
                    user_id = %user.id,
                    token = %safe_token_log(token),
                    "Using stored access token"
                );
                return Ok(token.clone());
            }
        }
    }

    let refresh_token = user
        .refresh_token
        .as_deref()
        .ok_or(GoogleError::RefreshFailed)?;

    warn!(user_id = %user.id, "Access token expired or missing, refreshing");
    let tokens = state
        .google_service
        .refresh_access_token(refresh_token)
        .await?;

    let token_expiry = tokens.expiry_timestamp();
    if let Err(e) = sqlx::query("UPDATE users SET access_token = ?, token_expiry = ? WHERE id = ?")
        .bind(&tokens.access_token)
        .bind(&token_expiry)
        .bind(&user.id)
        .execute(&state.db)
        .await
    {
        // The fresh token is still usable for this request
        warn!(error = %e, user_id = %user.id, "Failed to persist refreshed access token");
    }

    Ok(tokens.access_token)
}

/// Accumulate a per-service failure without discarding earlier ones.
pub(crate) fn append_error(message: &mut Option<String>, entry: &str) {
    match message {
        Some(existing) => {
            existing.push('\n');
            existing.push_str(entry);
        }
        None => *message = Some(entry.to_string()),
    }
}
