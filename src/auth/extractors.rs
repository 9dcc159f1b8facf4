//! Authentication extractors for Axum

use async_trait::async_trait;
use axum::{
    extract::{Extension, FromRequestParts},
    http::request::Parts,
};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, warn};

use super::models::User;
use crate::common::{safe_email_log, ApiError, AppState};
use crate::services::sessions::session_id_from_headers;

/// Authenticated user extractor
///
/// Resolves the `sid` session cookie to an authenticated session and
/// loads the matching user row. Handlers that tolerate anonymous
/// callers take `Option<AuthedUser>`.
#[derive(Debug)]
pub struct AuthedUser {
    pub id: String,
    pub email: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Extension(state_lock): Extension<Arc<RwLock<AppState>>> =
            Extension::from_request_parts(parts, state)
                .await
                .map_err(|_| ApiError::InternalServer("missing app state".to_string()))?;

        let app_state = state_lock.read().await.clone();

        let sid = match session_id_from_headers(&parts.headers) {
            Some(sid) => sid,
            None => {
                debug!("Authentication failed: no session cookie");
                return Err(ApiError::Unauthorized("missing session".into()));
            }
        };

        let user_id = match app_state.sessions.user_id(&sid).await {
            Some(id) => id,
            None => {
                debug!("Authentication failed: session not logged in");
                return Err(ApiError::Unauthorized("not logged in".into()));
            }
        };

        let user: Option<User> = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(&user_id)
            .fetch_optional(&app_state.db)
            .await
            .map_err(|e| {
                error!(
                    error = %e,
                    user_id = %user_id,
                    "Database error during user lookup in authentication"
                );
                ApiError::DatabaseError(e)
            })?;

        match user {
            Some(u) => {
                debug!(
                    user_id = %u.id,
                    email = %safe_email_log(&u.email),
                    "User authentication successful via session"
                );
                Ok(AuthedUser {
                    id: u.id,
                    email: u.email,
                })
            }
            None => {
                warn!(user_id = %user_id, "Authentication failed: user not found in database");
                Err(ApiError::Unauthorized("user not found".into()))
            }
        }
    }
}
