// src/services/sessions.rs
//! Server-side session store.
//!
//! Sessions are kept in memory behind an RwLock and keyed by a random
//! `sid` cookie. A session carries at most two things: the pending
//! OAuth anti-forgery state (strictly single use) and the id of the
//! authenticated user.

use axum::http::{header, HeaderMap};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

pub const SESSION_COOKIE: &str = "sid";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("unknown session id")]
    UnknownSession,
}

#[derive(Debug, Default)]
struct Session {
    user_id: Option<String>,
    pending_state: Option<String>,
}

#[derive(Debug, Default)]
pub struct SessionService {
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fresh anonymous session and return its id.
    pub async fn create(&self) -> String {
        let sid = random_session_id();
        self.sessions
            .write()
            .await
            .insert(sid.clone(), Session::default());
        debug!("Created new session");
        sid
    }

    pub async fn exists(&self, sid: &str) -> bool {
        self.sessions.read().await.contains_key(sid)
    }

    /// Store the pending OAuth state. The write completes before this
    /// returns, so the caller can safely issue the redirect afterwards.
    pub async fn put_pending_state(&self, sid: &str, state: &str) -> Result<(), SessionError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(sid).ok_or(SessionError::UnknownSession)?;
        session.pending_state = Some(state.to_string());
        Ok(())
    }

    /// Remove and return the pending state. After this, the same state
    /// value can never validate again on this session. There is no way
    /// to read the state without consuming it.
    pub async fn take_pending_state(&self, sid: &str) -> Option<String> {
        self.sessions
            .write()
            .await
            .get_mut(sid)
            .and_then(|s| s.pending_state.take())
    }

    /// Mark the session as authenticated for the given user.
    pub async fn login(&self, sid: &str, user_id: &str) -> Result<(), SessionError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(sid).ok_or(SessionError::UnknownSession)?;
        session.user_id = Some(user_id.to_string());
        Ok(())
    }

    pub async fn user_id(&self, sid: &str) -> Option<String> {
        self.sessions
            .read()
            .await
            .get(sid)
            .and_then(|s| s.user_id.clone())
    }

    /// Destroy the session entirely (logout).
    pub async fn destroy(&self, sid: &str) {
        self.sessions.write().await.remove(sid);
        debug!("Session destroyed");
    }
}

fn random_session_id() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Cookie value for a newly created session.
pub fn session_cookie(sid: &str) -> String {
    format!("{}={}; Path=/; HttpOnly; SameSite=Lax", SESSION_COOKIE, sid)
}

/// Expired cookie that clears the session id in the browser.
pub fn clear_session_cookie() -> String {
    format!(
        "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0",
        SESSION_COOKIE
    )
}

/// Pull the session id out of the Cookie request header, if any.
pub fn session_id_from_headers(headers: &HeaderMap) -> Option<String> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    for pair in cookie_header.split(';') {
        if let Some(value) = pair.trim().strip_prefix(&format!("{}=", SESSION_COOKIE)) {
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}
