//! Mock backend services. None of them contact a real server; each resolves
//! after an artificial delay taken from `[mock]` in the configuration.

pub mod auth;
pub mod database;
pub mod oauth;

pub use auth::AuthService;
pub use database::{ConnectionReport, DatabaseConfig, DatabaseDriver, DatabaseSettings};
pub use oauth::{OAuthProfile, OAuthService};
