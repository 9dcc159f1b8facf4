//! Dashboard routes

use axum::{routing::get, Router};

use super::handlers;

/// Creates and returns the dashboard router
///
/// # Routes
/// - `GET /` - Aggregated Workspace data for the logged-in user
pub fn dashboard_routes() -> Router {
    Router::new().route("/", get(handlers::home))
}
