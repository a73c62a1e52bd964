//! Bearer-token guard for services that trust an external identity provider.
//!
//! A [`Guard`] pulls a token from the request, the [`TokenVerifier`] checks its
//! signature against a key found by `kid` through a [`KeyResolver`], then
//! checks audience and validity window. The remote key set is cached by
//! [`JwksKeyResolver`].

pub mod claims;
pub mod config;
pub mod error;
pub mod extractors;
pub mod guards;
pub mod jwks;
pub mod keys;
pub mod verifier;

#[cfg(test)]
mod test_support;

pub use claims::Claims;
pub use config::{FailureMode, GuardConfig};
pub use error::{unauthorized_response, AuthError, AuthResult};
pub use extractors::{AuthContext, BearerHeader, CookieToken, TokenExtractor};
pub use guards::{require_auth, Guard, TokenGuard};
pub use jwks::{JwksFetcher, JwksKeyResolver};
pub use keys::{InMemoryKeyStore, KeyResolver, SigningKey};
pub use verifier::{verify_token, ClaimRules, TokenVerifier};
