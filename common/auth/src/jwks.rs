use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::GuardConfig;
use crate::error::{AuthError, AuthResult};
use crate::keys::{InMemoryKeyStore, KeyResolver, SigningKey};

#[derive(Clone)]
pub struct JwksFetcher {
    client: Client,
    url: String,
}

impl JwksFetcher {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }

    pub fn with_client(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    /// Fetcher for `config.jwks_url()` whose client enforces `config.jwks_timeout`.
    pub fn from_config(config: &GuardConfig) -> AuthResult<Self> {
        let client = Client::builder()
            .timeout(config.jwks_timeout)
            .build()
            .map_err(|err| AuthError::InvalidConfiguration {
                key: "jwks_timeout",
                reason: err.to_string(),
            })?;
        Ok(Self::with_client(client, config.jwks_url()))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Downloads the key set. Entries that cannot be used for signature
    /// verification are skipped; transport and document errors fail the fetch.
    pub async fn fetch(&self) -> AuthResult<Vec<SigningKey>> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|err| AuthError::KeyFetch(err.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::KeyFetch(format!(
                "HTTP {} from {}",
                response.status(),
                self.url
            )));
        }

        let body: JwksResponse = response
            .json()
            .await
            .map_err(|err| AuthError::KeyFetch(format!("malformed key set: {err}")))?;

        let keys: Vec<SigningKey> = body
            .keys
            .into_iter()
            .filter_map(|entry| match entry.into_signing_key() {
                Ok(key) => Some(key),
                Err(reason) => {
                    debug!(%reason, jwks_url = %self.url, "skipping JWKS entry");
                    None
                }
            })
            .collect();

        debug!(count = keys.len(), jwks_url = %self.url, "fetched JWKS");
        Ok(keys)
    }
}

#[derive(Debug, Deserialize)]
struct JwksResponse {
    keys: Vec<JwkEntry>,
}

#[derive(Debug, Deserialize)]
struct JwkEntry {
    kid: Option<String>,
    kty: Option<String>,
    alg: Option<String>,
    #[serde(rename = "use")]
    usage: Option<String>,
    n: Option<String>,
    e: Option<String>,
    crv: Option<String>,
    x: Option<String>,
    y: Option<String>,
}

impl JwkEntry {
    fn into_signing_key(self) -> Result<SigningKey, String> {
        let kid = self.kid.ok_or("entry has no kid")?;
        if let Some(usage) = self.usage.as_deref() {
            if usage != "sig" {
                return Err(format!("kid '{kid}' is published for '{usage}'"));
            }
        }

        let declared = match self.alg.as_deref() {
            Some(alg) => Some(
                alg.parse::<Algorithm>()
                    .map_err(|_| format!("kid '{kid}' uses unsupported alg '{alg}'"))?,
            ),
            None => None,
        };

        match self.kty.as_deref() {
            Some("RSA") => {
                let (Some(n), Some(e)) = (self.n.as_deref(), self.e.as_deref()) else {
                    return Err(format!("kid '{kid}' missing RSA components"));
                };
                let key = DecodingKey::from_rsa_components(n, e)
                    .map_err(|err| format!("kid '{kid}': {err}"))?;
                Ok(SigningKey::new(kid, declared, key))
            }
            Some("EC") => {
                let curve_alg = match self.crv.as_deref() {
                    Some("P-256") => Algorithm::ES256,
                    Some("P-384") => Algorithm::ES384,
                    other => {
                        return Err(format!("kid '{kid}' uses unsupported curve {other:?}"));
                    }
                };
                let (Some(x), Some(y)) = (self.x.as_deref(), self.y.as_deref()) else {
                    return Err(format!("kid '{kid}' missing EC coordinates"));
                };
                let key = DecodingKey::from_ec_components(x, y)
                    .map_err(|err| format!("kid '{kid}': {err}"))?;
                Ok(SigningKey::new(kid, Some(declared.unwrap_or(curve_alg)), key))
            }
            other => Err(format!("kid '{kid}' uses unsupported key type {other:?}")),
        }
    }
}

#[derive(Default)]
struct RefreshState {
    fetched_at: Option<Instant>,
    attempted_at: Option<Instant>,
}

/// Key resolver backed by a remote key set with a local cache.
///
/// Cached keys are served while fresh. A miss on a fresh cache refetches at
/// most once per cooldown window. A failed fetch leaves the cache untouched.
pub struct JwksKeyResolver {
    fetcher: JwksFetcher,
    store: InMemoryKeyStore,
    state: Mutex<RefreshState>,
    cache_ttl: Duration,
    refetch_cooldown: Duration,
}

impl JwksKeyResolver {
    pub fn new(fetcher: JwksFetcher) -> Self {
        Self {
            fetcher,
            store: InMemoryKeyStore::new(),
            state: Mutex::new(RefreshState::default()),
            cache_ttl: Duration::from_secs(600),
            refetch_cooldown: Duration::from_secs(10),
        }
    }

    pub fn from_config(config: &GuardConfig) -> AuthResult<Self> {
        Ok(Self::new(JwksFetcher::from_config(config)?)
            .with_cache_ttl(config.jwks_cache_ttl)
            .with_refetch_cooldown(config.jwks_refetch_cooldown))
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_refetch_cooldown(mut self, cooldown: Duration) -> Self {
        self.refetch_cooldown = cooldown;
        self
    }

    pub fn fetcher(&self) -> &JwksFetcher {
        &self.fetcher
    }

    pub fn store(&self) -> &InMemoryKeyStore {
        &self.store
    }

    /// Fetches the key set and replaces the cache with it.
    ///
    /// The cooldown clock starts when a fetch finishes, so misses that overlap
    /// an in-flight fetch still fetch for themselves and converge on the same set.
    pub async fn refresh(&self) -> AuthResult<usize> {
        let fetched = self.fetcher.fetch().await;
        let now = Instant::now();

        let keys = match fetched {
            Ok(keys) => keys,
            Err(err) => {
                self.state().attempted_at = Some(now);
                warn!(error = %err, jwks_url = %self.fetcher.url(), "JWKS fetch failed");
                return Err(err);
            }
        };

        let count = keys.len();
        self.store.replace_all(keys);
        let mut state = self.state();
        state.attempted_at = Some(now);
        state.fetched_at = Some(now);
        Ok(count)
    }

    fn state(&self) -> std::sync::MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_fresh(&self) -> bool {
        self.state()
            .fetched_at
            .is_some_and(|at| at.elapsed() < self.cache_ttl)
    }

    fn in_cooldown(&self) -> bool {
        self.state()
            .attempted_at
            .is_some_and(|at| at.elapsed() < self.refetch_cooldown)
    }
}

#[async_trait]
impl KeyResolver for JwksKeyResolver {
    async fn resolve(&self, kid: &str) -> AuthResult<SigningKey> {
        if self.is_fresh() {
            if let Some(key) = self.store.get(kid) {
                return Ok(key);
            }
            if self.in_cooldown() {
                debug!(kid, "unknown kid within refetch cooldown");
                return Err(AuthError::KeyNotFound(kid.to_owned()));
            }
        }

        self.refresh().await?;
        self.store
            .get(kid)
            .ok_or_else(|| AuthError::KeyNotFound(kid.to_owned()))
    }
}
