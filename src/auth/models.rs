//! Authentication data models

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// User database model
///
/// `email` is the local lookup key; `google_id` is NULL until the first
/// successful login. Token columns are overwritten wholesale on every
/// successful callback and never serialized into responses.
#[derive(FromRow, Serialize, Debug, Clone)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub google_id: Option<String>,
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    pub token_expiry: Option<String>,
    pub profile_picture: Option<String>,
    pub created_at: Option<String>,
}

/// Query parameters Google sends to the callback route
#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub state: Option<String>,
    pub code: Option<String>,
    pub error: Option<String>,
}
