//! REST API module for auth-rs
//!
//! Provides the login, registration and 2FA HTTP endpoints

pub mod handlers;
pub mod server;
pub mod two_factor;

pub use handlers::AppState;
pub use server::ApiServer;
