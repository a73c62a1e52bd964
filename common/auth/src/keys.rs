use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey};

use crate::error::{AuthError, AuthResult};

/// Public key material for one key identifier.
#[derive(Clone)]
pub struct SigningKey {
    pub kid: String,
    /// Algorithm the publisher pinned this key to, if any.
    pub algorithm: Option<Algorithm>,
    pub key: DecodingKey,
}

impl SigningKey {
    pub fn new(kid: impl Into<String>, algorithm: Option<Algorithm>, key: DecodingKey) -> Self {
        Self {
            kid: kid.into(),
            algorithm,
            key,
        }
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Looks up the public key a token names in its `kid` header.
///
/// The identifier is attacker-controlled: implementations use it as a lookup
/// key and nothing else.
#[async_trait]
pub trait KeyResolver: Send + Sync {
    async fn resolve(&self, kid: &str) -> AuthResult<SigningKey>;
}

#[async_trait]
impl<R> KeyResolver for Arc<R>
where
    R: KeyResolver + ?Sized,
{
    async fn resolve(&self, kid: &str) -> AuthResult<SigningKey> {
        (**self).resolve(kid).await
    }
}

/// Thread-safe store for decoding keys loaded from JWKS/PEM sources.
#[derive(Clone, Default)]
pub struct InMemoryKeyStore {
    inner: Arc<RwLock<HashMap<String, SigningKey>>>,
}

impl InMemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: SigningKey) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.insert(key.kid.clone(), key);
    }

    pub fn insert_rsa_pem(&self, kid: impl Into<String>, pem: &[u8]) -> AuthResult<()> {
        let kid = kid.into();
        let key = DecodingKey::from_rsa_pem(pem).map_err(|err| AuthError::InvalidConfiguration {
            key: "rsa_pem",
            reason: format!("kid '{kid}': {err}"),
        })?;
        self.insert(SigningKey::new(kid, Some(Algorithm::RS256), key));
        Ok(())
    }

    pub fn get(&self, kid: &str) -> Option<SigningKey> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        guard.get(kid).cloned()
    }

    pub fn contains(&self, kid: &str) -> bool {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        guard.contains_key(kid)
    }

    pub fn len(&self) -> usize {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        guard.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Swaps in a complete key set in one write.
    pub fn replace_all<I>(&self, entries: I)
    where
        I: IntoIterator<Item = SigningKey>,
    {
        let fresh: HashMap<String, SigningKey> = entries
            .into_iter()
            .map(|key| (key.kid.clone(), key))
            .collect();
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        *guard = fresh;
    }
}

#[async_trait]
impl KeyResolver for InMemoryKeyStore {
    async fn resolve(&self, kid: &str) -> AuthResult<SigningKey> {
        self.get(kid)
            .ok_or_else(|| AuthError::KeyNotFound(kid.to_owned()))
    }
}
