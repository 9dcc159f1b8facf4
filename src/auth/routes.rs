//! Authentication routes

use axum::{routing::get, Router};

use super::handlers;

/// Creates and returns the authentication router
///
/// # Routes
/// - `GET /auth/login` - Redirect to Google's authorization endpoint
/// - `GET /auth/callback` - OAuth callback (code exchange, login)
/// - `GET /auth/logout` - Destroy the session
pub fn auth_routes() -> Router {
    Router::new()
        .route("/auth/login", get(handlers::google_login))
        .route("/auth/callback", get(handlers::google_callback))
        .route("/auth/logout", get(handlers::logout))
}
