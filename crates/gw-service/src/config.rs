//! Gateway configuration.
//!
//! Configuration is loaded from environment variables once at startup;
//! changing any of it requires a restart. Sensitive fields are redacted in
//! Debug output.

use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::auth::RouteRoleTable;
use crate::models::Role;
use crate::ratelimit::{RouteLimitTable, RouteQuota};

/// Default HTTP bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8000";

/// Default identity-cache TTL in seconds.
pub const DEFAULT_IDENTITY_CACHE_TTL_SECONDS: u64 = 3600;

/// Default request quota applied when no route entry matches.
pub const DEFAULT_RATE_LIMIT_REQUESTS: u32 = 100;

/// Default rate-limit window in seconds.
pub const DEFAULT_RATE_LIMIT_WINDOW_SECONDS: u64 = 60;

/// Default per-operation cache timeout in milliseconds. The cache sits on
/// the hot path and must fail fast for the fail-soft contract to hold.
pub const DEFAULT_CACHE_TIMEOUT_MS: u64 = 300;

/// Default timeout for identity provider and user directory calls.
pub const DEFAULT_UPSTREAM_TIMEOUT_SECONDS: u64 = 3;

/// Gateway configuration.
///
/// Loaded from environment variables with sensible defaults. Sensitive
/// fields are redacted in Debug output.
#[derive(Clone)]
pub struct Config {
    /// HTTP bind address (default: "0.0.0.0:8000").
    pub bind_address: String,

    /// Redis connection URL for the shared cache.
    /// Protected by `SecretString` to prevent accidental logging.
    pub redis_url: SecretString,

    /// Base URL of the external identity provider.
    pub identity_provider_url: String,

    /// Base URL of the user directory.
    pub user_directory_url: String,

    /// TTL for cached identities in seconds (default: 3600).
    pub identity_cache_ttl_seconds: u64,

    /// Default quota: requests per window when no route entry matches.
    pub rate_limit_requests: u32,

    /// Default rate-limit window in seconds.
    pub rate_limit_window_seconds: u64,

    /// Per-route quota overrides, `(path prefix, quota)`.
    pub route_limits: Vec<(String, RouteQuota)>,

    /// Per-route minimum-role entries, `(path, role)`.
    pub route_roles: Vec<(String, Role)>,

    /// Per-operation cache timeout in milliseconds (default: 300).
    pub cache_timeout_ms: u64,

    /// Identity provider / user directory request timeout in seconds
    /// (default: 3).
    pub upstream_timeout_seconds: u64,

    /// Origins allowed by the CORS layer. `*` allows any origin (without
    /// credentials).
    pub allowed_origins: Vec<String>,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("redis_url", &"[REDACTED]")
            .field("identity_provider_url", &self.identity_provider_url)
            .field("user_directory_url", &self.user_directory_url)
            .field("identity_cache_ttl_seconds", &self.identity_cache_ttl_seconds)
            .field("rate_limit_requests", &self.rate_limit_requests)
            .field("rate_limit_window_seconds", &self.rate_limit_window_seconds)
            .field("route_limits", &self.route_limits)
            .field("route_roles", &self.route_roles)
            .field("cache_timeout_ms", &self.cache_timeout_ms)
            .field("upstream_timeout_seconds", &self.upstream_timeout_seconds)
            .field("allowed_origins", &self.allowed_origins)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Built-in per-route quotas for the protected surface. Entries from
/// `GW_ROUTE_LIMITS` replace same-prefix defaults.
fn default_route_limits() -> Vec<(String, RouteQuota)> {
    vec![
        (
            "/api/v1/auth/refresh".to_string(),
            RouteQuota {
                requests: 10,
                window_seconds: 300,
            },
        ),
        (
            "/api/v1/users".to_string(),
            RouteQuota {
                requests: 60,
                window_seconds: 60,
            },
        ),
    ]
}

/// Built-in minimum-role entries. The users collection route is gated at
/// MANAGER; item routes under it allow self-access enforced in the handler.
fn default_route_roles() -> Vec<(String, Role)> {
    vec![("/api/v1/users".to_string(), Role::Manager)]
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let redis_url = SecretString::from(
            vars.get("REDIS_URL")
                .ok_or_else(|| ConfigError::MissingEnvVar("REDIS_URL".to_string()))?
                .clone(),
        );

        let identity_provider_url = vars
            .get("IDENTITY_PROVIDER_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("IDENTITY_PROVIDER_URL".to_string()))?
            .clone();

        let user_directory_url = vars
            .get("USER_DIRECTORY_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("USER_DIRECTORY_URL".to_string()))?
            .clone();

        let bind_address = vars
            .get("GW_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let identity_cache_ttl_seconds = vars
            .get("GW_IDENTITY_CACHE_TTL_SECONDS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_IDENTITY_CACHE_TTL_SECONDS);

        let rate_limit_requests = vars
            .get("GW_RATE_LIMIT_REQUESTS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_RATE_LIMIT_REQUESTS);

        let rate_limit_window_seconds = vars
            .get("GW_RATE_LIMIT_WINDOW_SECONDS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_RATE_LIMIT_WINDOW_SECONDS);

        let cache_timeout_ms = vars
            .get("GW_CACHE_TIMEOUT_MS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_CACHE_TIMEOUT_MS);

        let upstream_timeout_seconds = vars
            .get("GW_UPSTREAM_TIMEOUT_SECONDS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_UPSTREAM_TIMEOUT_SECONDS);

        let mut route_limits = default_route_limits();
        if let Some(raw) = vars.get("GW_ROUTE_LIMITS") {
            for (prefix, quota) in parse_route_limits(raw)? {
                route_limits.retain(|(existing, _)| existing != &prefix);
                route_limits.push((prefix, quota));
            }
        }

        let mut route_roles = default_route_roles();
        if let Some(raw) = vars.get("GW_ROUTE_ROLES") {
            for (path, role) in parse_route_roles(raw)? {
                route_roles.retain(|(existing, _)| existing != &path);
                route_roles.push((path, role));
            }
        }

        let allowed_origins = vars
            .get("GW_ALLOWED_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_else(|| {
                vec![
                    "http://localhost:3000".to_string(),
                    "http://localhost:5173".to_string(),
                ]
            });

        Ok(Config {
            bind_address,
            redis_url,
            identity_provider_url,
            user_directory_url,
            identity_cache_ttl_seconds,
            rate_limit_requests,
            rate_limit_window_seconds,
            route_limits,
            route_roles,
            cache_timeout_ms,
            upstream_timeout_seconds,
            allowed_origins,
        })
    }

    /// Materialize the rate-limit table.
    pub fn route_limit_table(&self) -> RouteLimitTable {
        RouteLimitTable::new(
            RouteQuota {
                requests: self.rate_limit_requests,
                window_seconds: self.rate_limit_window_seconds,
            },
            self.route_limits.clone(),
        )
    }

    /// Materialize the route role table.
    pub fn route_role_table(&self) -> RouteRoleTable {
        RouteRoleTable::new(self.route_roles.clone())
    }
}

/// Parse `GW_ROUTE_LIMITS`: `prefix=requests:window[,prefix=requests:window]`.
fn parse_route_limits(raw: &str) -> Result<Vec<(String, RouteQuota)>, ConfigError> {
    let mut entries = Vec::new();
    for item in raw.split(',').map(str::trim).filter(|item| !item.is_empty()) {
        let (prefix, quota) = item.split_once('=').ok_or_else(|| {
            ConfigError::InvalidValue(format!("route limit entry without '=': {item}"))
        })?;
        let (requests, window) = quota.split_once(':').ok_or_else(|| {
            ConfigError::InvalidValue(format!("route limit quota without ':': {item}"))
        })?;

        let requests: u32 = requests.trim().parse().map_err(|_| {
            ConfigError::InvalidValue(format!("route limit request count is not a number: {item}"))
        })?;
        let window_seconds: u64 = window.trim().parse().map_err(|_| {
            ConfigError::InvalidValue(format!("route limit window is not a number: {item}"))
        })?;
        if requests == 0 || window_seconds == 0 {
            return Err(ConfigError::InvalidValue(format!(
                "route limit entry must be positive: {item}"
            )));
        }

        entries.push((
            prefix.trim().to_string(),
            RouteQuota {
                requests,
                window_seconds,
            },
        ));
    }
    Ok(entries)
}

/// Parse `GW_ROUTE_ROLES`: `path=role[,path=role]`.
fn parse_route_roles(raw: &str) -> Result<Vec<(String, Role)>, ConfigError> {
    let mut entries = Vec::new();
    for item in raw.split(',').map(str::trim).filter(|item| !item.is_empty()) {
        let (path, role) = item.split_once('=').ok_or_else(|| {
            ConfigError::InvalidValue(format!("route role entry without '=': {item}"))
        })?;
        let role = Role::from_str(role)
            .map_err(|e| ConfigError::InvalidValue(format!("route role entry {item}: {e}")))?;
        entries.push((path.trim().to_string(), role));
    }
    Ok(entries)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use common::secret::ExposeSecret;

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([
            (
                "REDIS_URL".to_string(),
                "redis://localhost:6379".to_string(),
            ),
            (
                "IDENTITY_PROVIDER_URL".to_string(),
                "http://localhost:9001".to_string(),
            ),
            (
                "USER_DIRECTORY_URL".to_string(),
                "http://localhost:9002".to_string(),
            ),
        ])
    }

    #[test]
    fn test_from_vars_success_with_defaults() {
        let config = Config::from_vars(&base_vars()).expect("Config should load successfully");

        assert_eq!(config.redis_url.expose_secret(), "redis://localhost:6379");
        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(
            config.identity_cache_ttl_seconds,
            DEFAULT_IDENTITY_CACHE_TTL_SECONDS
        );
        assert_eq!(config.rate_limit_requests, DEFAULT_RATE_LIMIT_REQUESTS);
        assert_eq!(
            config.rate_limit_window_seconds,
            DEFAULT_RATE_LIMIT_WINDOW_SECONDS
        );
        assert_eq!(config.cache_timeout_ms, DEFAULT_CACHE_TIMEOUT_MS);
        assert_eq!(
            config.upstream_timeout_seconds,
            DEFAULT_UPSTREAM_TIMEOUT_SECONDS
        );
        assert_eq!(config.allowed_origins.len(), 2);

        // Built-in tables are present
        assert!(config
            .route_limits
            .iter()
            .any(|(prefix, _)| prefix == "/api/v1/auth/refresh"));
        assert!(config
            .route_roles
            .iter()
            .any(|(path, role)| path == "/api/v1/users" && *role == Role::Manager));
    }

    #[test]
    fn test_from_vars_missing_required_vars() {
        for missing in ["REDIS_URL", "IDENTITY_PROVIDER_URL", "USER_DIRECTORY_URL"] {
            let mut vars = base_vars();
            vars.remove(missing);

            let result = Config::from_vars(&vars);
            assert!(
                matches!(result, Err(ConfigError::MissingEnvVar(ref v)) if v == missing),
                "expected MissingEnvVar({missing})"
            );
        }
    }

    #[test]
    fn test_from_vars_custom_values() {
        let mut vars = base_vars();
        vars.insert("GW_BIND_ADDRESS".to_string(), "127.0.0.1:9000".to_string());
        vars.insert("GW_IDENTITY_CACHE_TTL_SECONDS".to_string(), "600".to_string());
        vars.insert("GW_RATE_LIMIT_REQUESTS".to_string(), "20".to_string());
        vars.insert("GW_RATE_LIMIT_WINDOW_SECONDS".to_string(), "30".to_string());
        vars.insert("GW_CACHE_TIMEOUT_MS".to_string(), "150".to_string());
        vars.insert("GW_ALLOWED_ORIGINS".to_string(), "https://app.example.com".to_string());

        let config = Config::from_vars(&vars).expect("Config should load successfully");
        assert_eq!(config.bind_address, "127.0.0.1:9000");
        assert_eq!(config.identity_cache_ttl_seconds, 600);
        assert_eq!(config.rate_limit_requests, 20);
        assert_eq!(config.rate_limit_window_seconds, 30);
        assert_eq!(config.cache_timeout_ms, 150);
        assert_eq!(
            config.allowed_origins,
            vec!["https://app.example.com".to_string()]
        );
    }

    #[test]
    fn test_route_limits_parsing_and_override() {
        let mut vars = base_vars();
        vars.insert(
            "GW_ROUTE_LIMITS".to_string(),
            "/api/v1/users=5:60, /api/v1/exports=2:300".to_string(),
        );

        let config = Config::from_vars(&vars).expect("Config should load successfully");
        let table = config.route_limit_table();

        // Env entry replaced the built-in /api/v1/users quota
        let (_, quota) = table.resolve("/api/v1/users");
        assert_eq!(
            quota,
            RouteQuota {
                requests: 5,
                window_seconds: 60
            }
        );
        let (_, quota) = table.resolve("/api/v1/exports/run");
        assert_eq!(
            quota,
            RouteQuota {
                requests: 2,
                window_seconds: 300
            }
        );
    }

    #[test]
    fn test_route_limits_rejects_malformed_entries() {
        for bad in ["/a=5", "/a=x:60", "/a=5:x", "/a=0:60", "no-equals"] {
            let mut vars = base_vars();
            vars.insert("GW_ROUTE_LIMITS".to_string(), bad.to_string());
            assert!(
                matches!(Config::from_vars(&vars), Err(ConfigError::InvalidValue(_))),
                "entry {bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_route_roles_parsing() {
        let mut vars = base_vars();
        vars.insert(
            "GW_ROUTE_ROLES".to_string(),
            "/api/v1/territories/=admin,/api/v1/analytics=ae".to_string(),
        );

        let config = Config::from_vars(&vars).expect("Config should load successfully");
        let table = config.route_role_table();

        assert_eq!(table.resolve("/api/v1/territories/t1"), Some(Role::Admin));
        assert_eq!(table.resolve("/api/v1/analytics"), Some(Role::Ae));
        // Built-in entry survives alongside env additions
        assert_eq!(table.resolve("/api/v1/users"), Some(Role::Manager));
    }

    #[test]
    fn test_route_roles_rejects_unknown_role() {
        let mut vars = base_vars();
        vars.insert("GW_ROUTE_ROLES".to_string(), "/x=superuser".to_string());
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_debug_redacts_redis_url() {
        let config = Config::from_vars(&base_vars()).expect("Config should load successfully");
        let debug_output = format!("{config:?}");

        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("redis://"));
    }
}
