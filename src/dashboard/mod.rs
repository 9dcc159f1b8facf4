//! # Dashboard Module
//!
//! Aggregates read-only data from Google Drive, Calendar and Tasks for
//! the logged-in user's dashboard view.

pub mod handlers;
pub mod models;
pub mod routes;

#[cfg(test)]
mod tests;

pub use routes::dashboard_routes;
