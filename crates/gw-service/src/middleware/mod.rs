//! Middleware for the admission pipeline.
//!
//! Stages execute in this order on protected routes:
//!
//! 1. `rate_limit` - fixed-window quota check, response header decoration
//! 2. `auth` - bearer token verification, identity into request extensions
//! 3. `authorize` - route-level minimum-role gate
//!
//! CORS preflights and public paths never reach these stages; see
//! [`crate::routes`]. `http_metrics` sits outside everything and records
//! every response.

pub mod auth;
pub mod authorize;
pub mod http_metrics;
pub mod rate_limit;

pub use auth::{bearer_token, require_identity, IdentityExt};
pub use authorize::enforce_min_role;
pub use http_metrics::http_metrics_middleware;
pub use rate_limit::enforce_rate_limit;
