//! Secret types for protecting sensitive values from accidental logging.
//!
//! This module re-exports types from the [`secrecy`] crate with gateway-specific
//! guidance. Use these types for all sensitive values like connection URLs
//! carrying credentials, bearer tokens, and API keys.
//!
//! The key property is that `SecretString` implements `Debug` with redaction,
//! so any struct that derives `Debug` while holding a secret gets safe logging
//! behavior, and secrets are zeroized on drop.
//!
//! # Example
//!
//! ```rust
//! use common::secret::SecretString;
//! use secrecy::ExposeSecret;
//!
//! #[derive(Debug)]
//! struct CacheConfig {
//!     pool_size: u32,
//!     redis_url: SecretString,  // Safe: Debug shows "[REDACTED]"
//! }
//!
//! let cfg = CacheConfig {
//!     pool_size: 8,
//!     redis_url: SecretString::from("redis://:hunter2@cache:6379"),
//! };
//!
//! // This is safe - the URL (and its embedded password) is redacted
//! println!("{:?}", cfg);
//!
//! // To access the actual value, you must explicitly call expose_secret()
//! let url: &str = cfg.redis_url.expose_secret();
//! ```
//!
//! # Gateway usage guidelines
//!
//! Use `SecretString` for:
//! - Redis connection URLs (may embed a password)
//! - Identity provider API keys
//! - Raw bearer tokens held outside the request path
//!
//! Use `SecretBox<T>` for custom secret types (e.g. binary key material).

// Re-export the main types from secrecy
pub use secrecy::{ExposeSecret, SecretBox, SecretString};
