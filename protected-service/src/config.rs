use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use idp_auth::{FailureMode, GuardConfig};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const MIN_REFRESH_SECONDS: u64 = 60;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind_addr: SocketAddr,
    pub guard: GuardConfig,
    /// Background key-set refresh period; `None` relies on on-demand fetches.
    pub jwks_refresh: Option<Duration>,
}

pub fn load_service_config() -> Result<ServiceConfig> {
    load_from(|key| env::var(key).ok())
}

pub fn load_from<F>(lookup: F) -> Result<ServiceConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let audience = lookup("KINDE_AUDIENCE").context("KINDE_AUDIENCE must be set")?;
    let domain_url = lookup("KINDE_DOMAIN_URL").context("KINDE_DOMAIN_URL must be set")?;

    let mut guard = GuardConfig::new(audience, domain_url)
        .context("Invalid KINDE_AUDIENCE / KINDE_DOMAIN_URL")?;

    if let Some(issuer) = lookup("KINDE_ISSUER").and_then(|value| normalize_optional(&value)) {
        guard = guard.with_issuer(issuer);
    }
    if let Some(leeway) = parse_number::<u32>(&lookup, "KINDE_LEEWAY_SECONDS")? {
        guard = guard.with_leeway(leeway);
    }
    if let Some(ttl) = parse_number::<u64>(&lookup, "JWKS_CACHE_SECONDS")? {
        guard = guard.with_jwks_cache_ttl(Duration::from_secs(ttl));
    }
    if let Some(timeout) = parse_number::<u64>(&lookup, "JWKS_TIMEOUT_SECONDS")? {
        guard = guard.with_jwks_timeout(Duration::from_secs(timeout));
    }
    if let Some(mode) = lookup("AUTH_FAILURE_MODE").and_then(|value| normalize_optional(&value)) {
        let mode = mode
            .parse::<FailureMode>()
            .context("Failed to parse AUTH_FAILURE_MODE")?;
        guard = guard.with_failure_mode(mode);
    }

    let jwks_refresh = parse_number::<u64>(&lookup, "JWKS_REFRESH_SECONDS")?
        .map(|secs| Duration::from_secs(secs.max(MIN_REFRESH_SECONDS)));

    let bind_addr = lookup("BIND_ADDR")
        .and_then(|value| normalize_optional(&value))
        .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
    let bind_addr = bind_addr
        .parse::<SocketAddr>()
        .map_err(|err| anyhow!("Invalid BIND_ADDR '{bind_addr}': {err}"))?;

    Ok(ServiceConfig {
        bind_addr,
        guard,
        jwks_refresh,
    })
}

fn parse_number<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .and_then(|value| normalize_optional(&value))
        .map(|value| {
            value
                .parse::<T>()
                .map_err(|err| anyhow!("Failed to parse {key} '{value}': {err}"))
        })
        .transpose()
}

fn normalize_optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn missing_audience_fails_at_startup() {
        let err = load_from(lookup(&[("KINDE_DOMAIN_URL", "https://tenant.kinde.com")]))
            .expect_err("audience required");
        assert!(err.to_string().contains("KINDE_AUDIENCE"));

        let err = load_from(lookup(&[
            ("KINDE_AUDIENCE", "   "),
            ("KINDE_DOMAIN_URL", "https://tenant.kinde.com"),
        ]))
        .expect_err("blank audience");
        assert!(err.to_string().contains("KINDE_AUDIENCE"));
    }

    #[test]
    fn missing_domain_fails_at_startup() {
        let err = load_from(lookup(&[("KINDE_AUDIENCE", "my-api")])).expect_err("domain required");
        assert!(err.to_string().contains("KINDE_DOMAIN_URL"));
    }

    #[test]
    fn applies_optional_settings() {
        let config = load_from(lookup(&[
            ("KINDE_AUDIENCE", "my-api"),
            ("KINDE_DOMAIN_URL", "https://tenant.kinde.com"),
            ("KINDE_ISSUER", "https://tenant.kinde.com"),
            ("KINDE_LEEWAY_SECONDS", "15"),
            ("AUTH_FAILURE_MODE", "reject"),
            ("JWKS_REFRESH_SECONDS", "5"),
            ("BIND_ADDR", "127.0.0.1:9000"),
        ]))
        .expect("config");

        assert_eq!(config.guard.audience, "my-api");
        assert_eq!(
            config.guard.jwks_url(),
            "https://tenant.kinde.com/.well-known/jwks"
        );
        assert_eq!(config.guard.issuer.as_deref(), Some("https://tenant.kinde.com"));
        assert_eq!(config.guard.leeway_seconds, 15);
        assert_eq!(config.guard.failure_mode, FailureMode::Reject);
        assert_eq!(config.jwks_refresh, Some(Duration::from_secs(60)));
        assert_eq!(config.bind_addr.port(), 9000);
    }

    #[test]
    fn rejects_unparsable_numbers() {
        let err = load_from(lookup(&[
            ("KINDE_AUDIENCE", "my-api"),
            ("KINDE_DOMAIN_URL", "https://tenant.kinde.com"),
            ("KINDE_LEEWAY_SECONDS", "soon"),
        ]))
        .expect_err("bad leeway");
        assert!(err.to_string().contains("KINDE_LEEWAY_SECONDS"));
    }
}
