use common::secret::ExposeSecret;
use gw_service::auth::IdentityVerifier;
use gw_service::cache::{CacheBackend, CacheClient, MemoryCache, RedisCache};
use gw_service::config::Config;
use gw_service::directory::{HttpUserDirectory, UserDirectory};
use gw_service::observability::metrics::init_metrics_recorder;
use gw_service::provider::{HttpIdentityProvider, IdentityProvider};
use gw_service::ratelimit::FixedWindowLimiter;
use gw_service::routes::{self, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gw_service=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting gateway");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!("Configuration loaded successfully");

    // Install the metrics recorder before anything records a metric
    let metrics_handle = init_metrics_recorder()?;

    // Connect to the shared cache. The cache is a soft dependency: if it is
    // unreachable at startup the gateway runs degraded on a process-local
    // backend (identities are re-verified per instance, quotas enforced
    // per instance) rather than refusing to start.
    let backend: Arc<dyn CacheBackend> =
        match RedisCache::connect(config.redis_url.expose_secret()).await {
            Ok(redis) => {
                info!("Shared cache connection established");
                Arc::new(redis)
            }
            Err(e) => {
                warn!(
                    error = %e,
                    "Shared cache unreachable at startup; continuing with process-local cache"
                );
                Arc::new(MemoryCache::system_clock())
            }
        };
    let cache = CacheClient::new(backend, Duration::from_millis(config.cache_timeout_ms));

    // Collaborator clients
    let upstream_timeout = Duration::from_secs(config.upstream_timeout_seconds);
    let provider: Arc<dyn IdentityProvider> = Arc::new(HttpIdentityProvider::new(
        config.identity_provider_url.clone(),
        upstream_timeout,
    )?);
    let directory: Arc<dyn UserDirectory> = Arc::new(HttpUserDirectory::new(
        config.user_directory_url.clone(),
        upstream_timeout,
    )?);

    // Core pipeline components
    let verifier = Arc::new(IdentityVerifier::new(
        Arc::clone(&provider),
        Arc::clone(&directory),
        cache.clone(),
        config.identity_cache_ttl_seconds,
    ));
    let limiter = Arc::new(FixedWindowLimiter::new(
        cache.clone(),
        config.route_limit_table(),
    ));

    let bind_address = config.bind_address.clone();
    let route_roles = config.route_role_table();

    let state = Arc::new(AppState {
        config,
        cache,
        verifier,
        limiter,
        route_roles,
        provider,
        directory,
    });

    let app = routes::build_routes(state, Some(metrics_handle));

    let addr: SocketAddr = bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    info!("Gateway listening on {}", addr);

    // ConnectInfo is required for peer-address rate-limit keying
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
