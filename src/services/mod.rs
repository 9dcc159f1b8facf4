// src/services/mod.rs
//
// Shared services module containing business logic services
// that can be used across different domain modules

pub mod google;
pub mod sessions;

// Re-export commonly used types for convenience
pub use google::GoogleService;
pub use sessions::SessionService;
