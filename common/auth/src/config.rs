use std::time::Duration;

use jsonwebtoken::Algorithm;
use reqwest::Url;

use crate::error::{AuthError, AuthResult};

const JWKS_PATH: &str = "/.well-known/jwks";

/// How a guard communicates a failed verification to the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailureMode {
    /// Return `false` from `authorize`.
    #[default]
    Deny,
    /// Propagate the underlying `AuthError`.
    Reject,
}

impl std::str::FromStr for FailureMode {
    type Err = AuthError;

    fn from_str(value: &str) -> AuthResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "deny" => Ok(FailureMode::Deny),
            "reject" => Ok(FailureMode::Reject),
            other => Err(AuthError::InvalidConfiguration {
                key: "failure_mode",
                reason: format!("expected 'deny' or 'reject', got '{other}'"),
            }),
        }
    }
}

/// Validated guard configuration. Construct once at startup.
#[derive(Debug, Clone)]
pub struct GuardConfig {
    /// Expected audience claim (aud).
    pub audience: String,
    /// Identity provider base URL; the key set lives under it.
    pub domain_url: String,
    /// Expected issuer claim (iss), if enforced.
    pub issuer: Option<String>,
    /// Allowable clock skew in seconds when validating exp/nbf.
    pub leeway_seconds: u32,
    pub algorithms: Vec<Algorithm>,
    pub failure_mode: FailureMode,
    pub jwks_cache_ttl: Duration,
    /// Minimum spacing between key-set fetches triggered by unknown kids.
    pub jwks_refetch_cooldown: Duration,
    pub jwks_timeout: Duration,
}

impl GuardConfig {
    /// Both values are required; empty or blank input is a startup failure.
    pub fn new(audience: impl Into<String>, domain_url: impl Into<String>) -> AuthResult<Self> {
        let audience = required("audience", audience.into())?;
        let domain_url = required("domain_url", domain_url.into())?;

        let parsed = Url::parse(domain_url.trim()).map_err(|err| AuthError::InvalidConfiguration {
            key: "domain_url",
            reason: err.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AuthError::InvalidConfiguration {
                key: "domain_url",
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }

        Ok(Self {
            audience,
            domain_url: domain_url.trim().trim_end_matches('/').to_string(),
            issuer: None,
            leeway_seconds: 0,
            algorithms: vec![Algorithm::RS256],
            failure_mode: FailureMode::Deny,
            jwks_cache_ttl: Duration::from_secs(600),
            jwks_refetch_cooldown: Duration::from_secs(10),
            jwks_timeout: Duration::from_secs(5),
        })
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Adjust the allowed leeway.
    pub fn with_leeway(mut self, seconds: u32) -> Self {
        self.leeway_seconds = seconds;
        self
    }

    pub fn with_algorithms(mut self, algorithms: impl IntoIterator<Item = Algorithm>) -> Self {
        self.algorithms = algorithms.into_iter().collect();
        self
    }

    pub fn with_failure_mode(mut self, mode: FailureMode) -> Self {
        self.failure_mode = mode;
        self
    }

    pub fn with_jwks_cache_ttl(mut self, ttl: Duration) -> Self {
        self.jwks_cache_ttl = ttl;
        self
    }

    pub fn with_jwks_refetch_cooldown(mut self, cooldown: Duration) -> Self {
        self.jwks_refetch_cooldown = cooldown;
        self
    }

    pub fn with_jwks_timeout(mut self, timeout: Duration) -> Self {
        self.jwks_timeout = timeout;
        self
    }

    pub fn jwks_url(&self) -> String {
        format!("{}{JWKS_PATH}", self.domain_url)
    }
}

/// Blank values are missing; anything else is kept exactly as configured.
fn required(key: &'static str, value: String) -> AuthResult<String> {
    if value.trim().is_empty() {
        return Err(AuthError::MissingConfiguration(key));
    }
    Ok(value)
}
