use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use idp_auth::{BearerHeader, JwksKeyResolver, TokenGuard, TokenVerifier};
use protected_service::{build_router, load_service_config};
use tokio::net::TcpListener;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = load_service_config()?;
    let resolver = Arc::new(
        JwksKeyResolver::from_config(&config.guard).context("Failed to build JWKS client")?,
    );
    info!(jwks_url = %resolver.fetcher().url(), audience = %config.guard.audience, "Configuring token guard");

    // Warm the cache; an unreachable provider is not fatal, lookups retry on demand.
    match resolver.refresh().await {
        Ok(count) => info!(count, "Loaded JWKS keys"),
        Err(err) => warn!(error = %err, "Initial JWKS fetch failed"),
    }

    if let Some(period) = config.jwks_refresh {
        spawn_jwks_refresh(resolver.clone(), period);
    }

    let verifier = TokenVerifier::from_config(&config.guard, resolver);
    let guard = TokenGuard::new(Arc::new(verifier), BearerHeader)
        .with_failure_mode(config.guard.failure_mode);
    let app = build_router(Arc::new(guard));

    let listener = TcpListener::bind(config.bind_addr).await?;
    info!(addr = %config.bind_addr, "protected-service listening");
    axum::serve(listener, app).await?;
    Ok(())
}

fn spawn_jwks_refresh(resolver: Arc<JwksKeyResolver>, period: Duration) {
    let url = resolver.fetcher().url().to_owned();

    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately and the cache was just warmed.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match resolver.refresh().await {
                Ok(count) => {
                    debug!(count, jwks_url = %url, "Refreshed JWKS keys");
                }
                Err(err) => {
                    warn!(error = %err, jwks_url = %url, "Failed to refresh JWKS keys");
                }
            }
        }
    });
}
