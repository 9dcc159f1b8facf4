// src/services/google.rs
//! Google OAuth2 client and Workspace API queries.
//!
//! Owns the provider endpoints: the authorization URL, the token
//! endpoint (code exchange and refresh), the userinfo endpoint, and the
//! three read-only Workspace queries the dashboard renders (Drive
//! spreadsheets, Calendar events, Tasks).

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, SecondsFormat, Utc};
use rand::RngCore;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::env;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::dashboard::models::{CalendarEvent, DriveFile, TaskItem};

const AUTH_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const USERINFO_ENDPOINT: &str = "https://www.googleapis.com/oauth2/v3/userinfo";
const DRIVE_FILES_ENDPOINT: &str = "https://www.googleapis.com/drive/v3/files";
const CALENDAR_EVENTS_ENDPOINT: &str =
    "https://www.googleapis.com/calendar/v3/calendars/primary/events";
const TASK_LISTS_ENDPOINT: &str = "https://tasks.googleapis.com/tasks/v1/users/@me/lists";
const TASKS_API_BASE: &str = "https://tasks.googleapis.com/tasks/v1/lists";

/// Task lists consulted for the dashboard, and tasks fetched per list.
const MAX_TASK_LISTS: usize = 3;
const MAX_TASKS_PER_LIST: u32 = 10;

#[derive(Debug, Error)]
pub enum GoogleError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The authorization code was rejected as expired or already used.
    /// Expected under double submission (browser back button).
    #[error("authorization code expired or already used")]
    ExpiredCode,

    /// The stored refresh token was rejected; the user must re-login.
    #[error("refresh token rejected by Google")]
    RefreshFailed,

    #[error("userinfo request failed: {0}")]
    IdentityFailed(String),

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("{service} API error: {detail}")]
    ApiFailed {
        service: &'static str,
        detail: String,
    },

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Immutable OAuth client configuration, constructed once at startup
/// and passed into [`GoogleService::new`].
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    /// Permit a plain-http redirect URI (local development only).
    pub allow_insecure_redirect: bool,
}

impl GoogleConfig {
    pub fn new(
        client_id: String,
        client_secret: String,
        redirect_uri: String,
        scopes: Vec<String>,
        allow_insecure_redirect: bool,
    ) -> Result<Self, GoogleError> {
        if client_id.is_empty() {
            return Err(GoogleError::InvalidConfig(
                "GOOGLE_CLIENT_ID is empty".to_string(),
            ));
        }
        if client_secret.is_empty() {
            return Err(GoogleError::InvalidConfig(
                "GOOGLE_CLIENT_SECRET is empty".to_string(),
            ));
        }
        if !allow_insecure_redirect && !redirect_uri.starts_with("https://") {
            return Err(GoogleError::InvalidConfig(format!(
                "redirect URI must be https (got {redirect_uri}); \
                 set DEBUG=true to allow http during local development"
            )));
        }
        Ok(Self {
            client_id,
            client_secret,
            redirect_uri,
            scopes,
            allow_insecure_redirect,
        })
    }

    /// Assemble configuration from environment variables.
    pub fn from_env(allow_insecure_redirect: bool) -> Result<Self, GoogleError> {
        let client_id = env::var("GOOGLE_CLIENT_ID")
            .map_err(|_| GoogleError::InvalidConfig("GOOGLE_CLIENT_ID not set".to_string()))?;
        let client_secret = env::var("GOOGLE_CLIENT_SECRET")
            .map_err(|_| GoogleError::InvalidConfig("GOOGLE_CLIENT_SECRET not set".to_string()))?;
        let redirect_uri = env::var("GOOGLE_REDIRECT_URI")
            .unwrap_or_else(|_| "http://localhost:8080/auth/callback".to_string());

        let scopes = match env::var("GOOGLE_SCOPES") {
            Ok(raw) => raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            Err(_) => Self::default_scopes(),
        };

        Self::new(
            client_id,
            client_secret,
            redirect_uri,
            scopes,
            allow_insecure_redirect,
        )
    }

    fn default_scopes() -> Vec<String> {
        [
            "openid",
            "https://www.googleapis.com/auth/userinfo.email",
            "https://www.googleapis.com/auth/userinfo.profile",
            "https://www.googleapis.com/auth/drive.metadata.readonly",
            "https://www.googleapis.com/auth/calendar.readonly",
            "https://www.googleapis.com/auth/tasks.readonly",
        ]
        .into_iter()
        .map(String::from)
        .collect()
    }
}

/// Response from the token endpoint for both code exchange and refresh.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Seconds until the access token expires (delta, not absolute)
    pub expires_in: i64,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenResponse {
    /// Absolute RFC 3339 expiry computed from the `expires_in` delta.
    pub fn expiry_timestamp(&self) -> String {
        (Utc::now() + Duration::seconds(self.expires_in))
            .to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

/// Identity claims returned by the userinfo endpoint.
#[derive(Debug, Deserialize)]
pub struct GoogleUserInfo {
    pub sub: String,
    pub email: String,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

/// Generate a cryptographically unpredictable anti-forgery state value.
///
/// 32 random bytes as URL-safe base64 (no padding), so the value can be
/// embedded directly in the authorization URL.
pub fn generate_state() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Distinguish the provider's "this code/token is no longer valid"
/// rejection from everything else. Google signals it with HTTP 400 and
/// an `invalid_grant` error code in the JSON body.
fn is_invalid_grant(status: StatusCode, body: &str) -> bool {
    if status != StatusCode::BAD_REQUEST {
        return false;
    }
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
        .map(|e| e == "invalid_grant")
        .unwrap_or(false)
}

#[derive(Debug, Clone)]
pub struct GoogleService {
    config: GoogleConfig,
    client: Client,
}

impl GoogleService {
    pub fn new(config: GoogleConfig, client: Client) -> Self {
        Self { config, client }
    }

    /// Build the authorization URL carrying the anti-forgery state.
    ///
    /// `access_type=offline` and `prompt=consent` together make Google
    /// return a refresh token on every consented login.
    pub fn authorization_url(&self, state: &str) -> String {
        let scope_param = self.config.scopes.join(" ");
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}&access_type=offline&prompt=consent&include_granted_scopes=true",
            AUTH_ENDPOINT,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.config.redirect_uri),
            urlencoding::encode(&scope_param),
            urlencoding::encode(state),
        )
    }

    /// Exchange an authorization code for tokens.
    ///
    /// An expired or already-used code surfaces as
    /// [`GoogleError::ExpiredCode`] so the caller can answer with a
    /// retry message instead of a server fault.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse, GoogleError> {
        let params = [
            ("code", code),
            ("client_id", &self.config.client_id),
            ("client_secret", &self.config.client_secret),
            ("redirect_uri", &self.config.redirect_uri),
            ("grant_type", "authorization_code"),
        ];

        debug!("Exchanging authorization code for tokens");

        let response = self
            .client
            .post(TOKEN_ENDPOINT)
            .form(&params)
            .send()
            .await
            .map_err(|e| GoogleError::RequestFailed(e.to_string()))?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            if is_invalid_grant(status, &error_text) {
                warn!(status = %status, "Authorization code rejected as invalid_grant");
                return Err(GoogleError::ExpiredCode);
            }
            error!(status = %status, error = %error_text, "Token exchange failed");
            return Err(GoogleError::RequestFailed(format!(
                "HTTP {}: {}",
                status, error_text
            )));
        }

        let token_response = response
            .json::<TokenResponse>()
            .await
            .map_err(|e| GoogleError::SerializationError(e.to_string()))?;

        info!(
            has_refresh_token = token_response.refresh_token.is_some(),
            "Successfully exchanged authorization code for tokens"
        );
        Ok(token_response)
    }

    /// Fetch identity claims with the freshly obtained access token.
    pub async fn fetch_userinfo(&self, access_token: &str) -> Result<GoogleUserInfo, GoogleError> {
        let response = self
            .client
            .get(USERINFO_ENDPOINT)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| GoogleError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!(status = %status, error = %error_text, "Userinfo request failed");
            return Err(GoogleError::IdentityFailed(format!("HTTP {}", status)));
        }

        response
            .json::<GoogleUserInfo>()
            .await
            .map_err(|e| GoogleError::SerializationError(e.to_string()))
    }

    /// Obtain a new access token from a stored refresh token.
    ///
    /// An `invalid_grant` rejection means the user's provider session
    /// is gone for good and maps to [`GoogleError::RefreshFailed`].
    pub async fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> Result<TokenResponse, GoogleError> {
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        debug!("Refreshing access token with Google OAuth");

        let response = self
            .client
            .post(TOKEN_ENDPOINT)
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to send token refresh request");
                GoogleError::RequestFailed(e.to_string())
            })?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            if is_invalid_grant(status, &error_text) {
                warn!(status = %status, "Refresh token rejected as invalid_grant");
                return Err(GoogleError::RefreshFailed);
            }
            error!(status = %status, error = %error_text, "Token refresh failed");
            return Err(GoogleError::RequestFailed(format!(
                "HTTP {}: {}",
                status, error_text
            )));
        }

        let token_response = response
            .json::<TokenResponse>()
            .await
            .map_err(|e| GoogleError::SerializationError(e.to_string()))?;

        info!("Successfully refreshed access token");
        Ok(token_response)
    }

    /// Drive: spreadsheet documents only, first 15, id and name fields.
    pub async fn list_spreadsheets(
        &self,
        access_token: &str,
    ) -> Result<Vec<DriveFile>, GoogleError> {
        #[derive(Deserialize)]
        struct FileList {
            #[serde(default)]
            files: Vec<DriveFile>,
        }

        let response = self
            .client
            .get(DRIVE_FILES_ENDPOINT)
            .query(&[
                ("q", "mimeType='application/vnd.google-apps.spreadsheet'"),
                ("pageSize", "15"),
                ("fields", "files(id, name)"),
            ])
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| GoogleError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(GoogleError::ApiFailed {
                service: "Drive",
                detail: format!("HTTP {}: {}", status, error_text),
            });
        }

        let list = response
            .json::<FileList>()
            .await
            .map_err(|e| GoogleError::SerializationError(e.to_string()))?;

        debug!(count = list.files.len(), "Fetched spreadsheet list from Drive");
        Ok(list.files)
    }

    /// Calendar: events on the primary calendar over the next 7 days,
    /// expanded to single events, ordered by start time, capped at 10.
    pub async fn upcoming_events(
        &self,
        access_token: &str,
    ) -> Result<Vec<CalendarEvent>, GoogleError> {
        #[derive(Deserialize)]
        struct EventList {
            #[serde(default)]
            items: Vec<CalendarEvent>,
        }

        let now = Utc::now();
        let time_min = now.to_rfc3339_opts(SecondsFormat::Secs, true);
        let time_max = (now + Duration::days(7)).to_rfc3339_opts(SecondsFormat::Secs, true);

        let response = self
            .client
            .get(CALENDAR_EVENTS_ENDPOINT)
            .query(&[
                ("timeMin", time_min.as_str()),
                ("timeMax", time_max.as_str()),
                ("maxResults", "10"),
                ("singleEvents", "true"),
                ("orderBy", "startTime"),
            ])
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| GoogleError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(GoogleError::ApiFailed {
                service: "Calendar",
                detail: format!("HTTP {}: {}", status, error_text),
            });
        }

        let list = response
            .json::<EventList>()
            .await
            .map_err(|e| GoogleError::SerializationError(e.to_string()))?;

        debug!(count = list.items.len(), "Fetched upcoming calendar events");
        Ok(list.items)
    }

    /// Tasks: incomplete tasks from up to the first 3 task lists,
    /// capped at 10 per list, each tagged with its list's title.
    pub async fn incomplete_tasks(&self, access_token: &str) -> Result<Vec<TaskItem>, GoogleError> {
        #[derive(Deserialize)]
        struct TaskListEntry {
            id: String,
            #[serde(default)]
            title: Option<String>,
        }

        #[derive(Deserialize)]
        struct TaskListIndex {
            #[serde(default)]
            items: Vec<TaskListEntry>,
        }

        #[derive(Deserialize)]
        struct TasksPage {
            #[serde(default)]
            items: Vec<TaskItem>,
        }

        let response = self
            .client
            .get(TASK_LISTS_ENDPOINT)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| GoogleError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(GoogleError::ApiFailed {
                service: "Tasks",
                detail: format!("HTTP {}: {}", status, error_text),
            });
        }

        let index = response
            .json::<TaskListIndex>()
            .await
            .map_err(|e| GoogleError::SerializationError(e.to_string()))?;

        let max_results = MAX_TASKS_PER_LIST.to_string();
        let mut all_tasks = Vec::new();

        for task_list in index.items.into_iter().take(MAX_TASK_LISTS) {
            let list_name = task_list.title.unwrap_or_else(|| "Tasks".to_string());

            let response = self
                .client
                .get(format!("{}/{}/tasks", TASKS_API_BASE, task_list.id))
                .query(&[
                    ("maxResults", max_results.as_str()),
                    ("showCompleted", "false"),
                ])
                .bearer_auth(access_token)
                .send()
                .await
                .map_err(|e| GoogleError::RequestFailed(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                return Err(GoogleError::ApiFailed {
                    service: "Tasks",
                    detail: format!("HTTP {}: {}", status, error_text),
                });
            }

            let page = response
                .json::<TasksPage>()
                .await
                .map_err(|e| GoogleError::SerializationError(e.to_string()))?;

            for mut task in page.items {
                task.list_name = list_name.clone();
                all_tasks.push(task);
            }
        }

        debug!(count = all_tasks.len(), "Fetched incomplete tasks");
        Ok(all_tasks)
    }
}
