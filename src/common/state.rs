// Application state shared across all modules

use sqlx::SqlitePool;
use std::sync::Arc;

use crate::services::{GoogleService, SessionService};

/// Application state containing database pool, services, and configuration
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    /// Detailed error disclosure in responses; never enable in production
    pub debug: bool,
    pub google_service: Arc<GoogleService>,
    pub sessions: Arc<SessionService>,
}
