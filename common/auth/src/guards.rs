use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{Request, State};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::warn;

use crate::config::{FailureMode, GuardConfig};
use crate::error::{unauthorized_response, AuthResult};
use crate::extractors::{AuthContext, BearerHeader, TokenExtractor};
use crate::jwks::JwksKeyResolver;
use crate::verifier::TokenVerifier;

/// Request-time authorization decision.
///
/// On `Ok(true)` the verified [`AuthContext`] is in `parts.extensions`.
#[async_trait]
pub trait Guard: Send + Sync {
    async fn authorize(&self, parts: &mut Parts) -> AuthResult<bool>;
}

/// A guard that verifies whatever token `E` pulls from the request.
#[derive(Clone)]
pub struct TokenGuard<E> {
    verifier: Arc<TokenVerifier>,
    extractor: E,
    failure_mode: FailureMode,
}

impl TokenGuard<BearerHeader> {
    /// Bearer-header guard backed by the remote key set named in `config`.
    pub fn bearer(config: &GuardConfig) -> AuthResult<Self> {
        let resolver = JwksKeyResolver::from_config(config)?;
        let verifier = TokenVerifier::from_config(config, resolver);
        Ok(Self::new(Arc::new(verifier), BearerHeader).with_failure_mode(config.failure_mode))
    }
}

impl<E> TokenGuard<E>
where
    E: TokenExtractor,
{
    pub fn new(verifier: Arc<TokenVerifier>, extractor: E) -> Self {
        Self {
            verifier,
            extractor,
            failure_mode: FailureMode::Deny,
        }
    }

    pub fn with_failure_mode(mut self, mode: FailureMode) -> Self {
        self.failure_mode = mode;
        self
    }
}

#[async_trait]
impl<E> Guard for TokenGuard<E>
where
    E: TokenExtractor,
{
    async fn authorize(&self, parts: &mut Parts) -> AuthResult<bool> {
        let token = self.extractor.extract(parts);
        match self.verifier.verify(token.as_deref()).await {
            Ok(claims) => {
                parts.extensions.insert(AuthContext {
                    claims,
                    token: token.unwrap_or_default(),
                });
                Ok(true)
            }
            Err(err) => {
                warn!(kind = err.kind(), error = %err, path = %parts.uri.path(), "request denied");
                match self.failure_mode {
                    FailureMode::Deny => Ok(false),
                    FailureMode::Reject => Err(err),
                }
            }
        }
    }
}

/// Middleware for `axum::middleware::from_fn_with_state`.
///
/// A deny becomes a bare 401; a propagated error renders through `AuthError`.
pub async fn require_auth<G>(State(guard): State<Arc<G>>, request: Request, next: Next) -> Response
where
    G: Guard + 'static,
{
    let (mut parts, body) = request.into_parts();
    match guard.authorize(&mut parts).await {
        Ok(true) => next.run(Request::from_parts(parts, body)).await,
        Ok(false) => unauthorized_response(),
        Err(err) => err.into_response(),
    }
}
