//! auth-rs: password login with TOTP two-factor authentication
//!
//! A small REST service that signs users in with email and password and,
//! when they have enrolled, asks for a TOTP code before issuing a session.
//!
//! # Flow
//!
//! - `POST /rest/user/login` answers with a session token, or with a
//!   short-lived temporary token when 2FA is enabled
//! - `POST /rest/2fa/verify` trades the temporary token and a TOTP code
//!   for a session token
//! - `GET /rest/2fa/status`, `POST /rest/2fa/setup` and
//!   `POST /rest/2fa/disable` manage enrolment for a signed-in user
//!
//! # Example
//!
//! ```no_run
//! use auth_rs::api::ApiServer;
//! use auth_rs::config::Config;
//! use auth_rs::store;
//! use auth_rs::two_factor::TwoFactorService;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.ensure_signing_key();
//!
//!     let db = store::connect(&config.database.url).await?;
//!     let service = TwoFactorService::new(db, &config.auth)?;
//!
//!     ApiServer::new(service, config.server.listen_addr.clone()).run().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration management
//! - [`error`]: Error types and HTTP mapping
//! - [`token`]: Signed, typed bearer tokens
//! - [`totp`]: RFC 6238 code generation and checking
//! - [`store`]: SQLite persistence
//! - [`two_factor`]: Login and 2FA protocol
//! - [`api`]: HTTP routes

pub mod api;
pub mod config;
pub mod error;
pub mod store;
pub mod token;
pub mod totp;
pub mod two_factor;

// Re-export commonly used types
pub use config::Config;
pub use error::{AuthError, Result};
pub use two_factor::TwoFactorService;
