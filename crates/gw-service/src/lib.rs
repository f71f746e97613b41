//! Fieldstone gateway service library.
//!
//! A web backend gateway fronting business routers with a request admission
//! pipeline: bearer-token authentication with identity caching, fixed-window
//! distributed rate limiting, and role-hierarchy authorization.
//!
//! # Modules
//!
//! - `config` - service configuration
//! - `errors` - error taxonomy and HTTP rendering
//! - `models` - identity types, directory documents, API bodies
//! - `cache` - fail-soft shared-cache client (Redis / in-memory backends)
//! - `provider` - identity provider client
//! - `directory` - user directory client
//! - `auth` - identity verifier and RBAC evaluator
//! - `ratelimit` - fixed-window rate limiter and route quota table
//! - `middleware` - admission pipeline stages
//! - `handlers` - HTTP request handlers
//! - `routes` - router assembly and application state
//! - `observability` - metrics

pub mod auth;
pub mod cache;
pub mod config;
pub mod directory;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod provider;
pub mod ratelimit;
pub mod routes;
