//! HTTP request handlers.
//!
//! # Components
//!
//! - `health` - operational endpoints (root banner, liveness, readiness,
//!   metrics, docs pointer)
//! - `auth` - token verification, registration, session endpoints
//! - `users` - user directory pass-through endpoints

pub mod auth;
pub mod health;
pub mod users;

pub use auth::{logout, me, refresh, register, verify_token};
pub use health::{api_docs, health_check, metrics_handler, readiness_check, root};
pub use users::{get_user, list_users, update_user};
