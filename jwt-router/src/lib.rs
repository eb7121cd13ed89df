//! JWT request-authorization middleware for axum
//!
//! Requests are checked against white-listed and ignored routes, and every
//! other route requires a locally issued token or an OAuth provider access
//! token. See [`routing::JwtRouter`].

pub mod app;
pub mod config;
pub mod context;
pub mod entity;
pub mod errors;
pub mod oauth;
pub mod routing;
pub mod state;
pub mod token;
#[cfg(test)]
mod test_utils;

pub use context::RequestContext;
pub use errors::{AuthError, Rejection};
pub use routing::{Decision, JwtRouter};
