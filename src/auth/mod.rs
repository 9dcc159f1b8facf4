//! # Auth Module
//!
//! This module handles all authentication-related functionality including:
//! - The Google OAuth2 authorization-code flow (login, callback, logout)
//! - Per-user credential persistence on the users table
//! - AuthedUser extractor for protected routes

pub mod extractors;
pub mod handlers;
pub mod models;
pub mod routes;

#[cfg(test)]
mod tests;

pub use extractors::AuthedUser;
pub use models::User;
pub use routes::auth_routes;
