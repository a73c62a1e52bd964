use std::sync::Arc;

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, decode_header, Algorithm, Validation};
use serde_json::{Map, Value};
use tracing::debug;

use crate::claims::{audiences, numeric_date, Claims};
use crate::config::GuardConfig;
use crate::error::{AuthError, AuthResult};
use crate::keys::{KeyResolver, SigningKey};

/// Claim expectations applied after the signature checks out.
#[derive(Debug, Clone)]
pub struct ClaimRules {
    pub audience: String,
    pub issuer: Option<String>,
    pub leeway_seconds: u32,
}

impl ClaimRules {
    pub fn new(audience: impl Into<String>) -> Self {
        Self {
            audience: audience.into(),
            issuer: None,
            leeway_seconds: 0,
        }
    }

    fn check(&self, raw: &Map<String, Value>, now: i64) -> AuthResult<()> {
        let audiences = audiences(raw)?;
        if !audiences.iter().any(|aud| aud == &self.audience) {
            return Err(AuthError::claim(
                "aud",
                format!("expected '{}', token has {audiences:?}", self.audience),
            ));
        }

        if let Some(expected) = &self.issuer {
            match raw.get("iss").and_then(Value::as_str) {
                Some(iss) if iss == expected => {}
                other => {
                    return Err(AuthError::claim(
                        "iss",
                        format!("expected '{expected}', token has {other:?}"),
                    ));
                }
            }
        }

        let leeway = i64::from(self.leeway_seconds);
        let exp = numeric_date(raw, "exp")?.ok_or_else(|| AuthError::claim("exp", "missing"))?;
        if now >= exp.saturating_add(leeway) {
            return Err(AuthError::claim("exp", format!("token expired at {exp}")));
        }

        if let Some(nbf) = numeric_date(raw, "nbf")? {
            if nbf > now.saturating_add(leeway) {
                return Err(AuthError::claim("nbf", format!("token not valid before {nbf}")));
            }
        }

        Ok(())
    }
}

/// Verifies `token` against `audience`, pulling the signing key from `resolver`.
///
/// Accepts RS256 only and applies no clock leeway; use [`TokenVerifier`] for
/// anything configurable.
pub async fn verify_token(
    token: Option<&str>,
    audience: &str,
    resolver: &dyn KeyResolver,
) -> AuthResult<Claims> {
    verify_with(
        token,
        &ClaimRules::new(audience),
        &[Algorithm::RS256],
        resolver,
        None,
    )
    .await
}

#[derive(Clone)]
pub struct TokenVerifier {
    rules: ClaimRules,
    algorithms: Vec<Algorithm>,
    resolver: Arc<dyn KeyResolver>,
}

impl TokenVerifier {
    pub fn new(rules: ClaimRules, resolver: impl KeyResolver + 'static) -> Self {
        Self {
            rules,
            algorithms: vec![Algorithm::RS256],
            resolver: Arc::new(resolver),
        }
    }

    pub fn from_config(config: &GuardConfig, resolver: impl KeyResolver + 'static) -> Self {
        let rules = ClaimRules {
            audience: config.audience.clone(),
            issuer: config.issuer.clone(),
            leeway_seconds: config.leeway_seconds,
        };
        Self::new(rules, resolver).with_algorithms(config.algorithms.iter().copied())
    }

    pub fn with_algorithms(mut self, algorithms: impl IntoIterator<Item = Algorithm>) -> Self {
        self.algorithms = algorithms.into_iter().collect();
        self
    }

    pub async fn verify(&self, token: Option<&str>) -> AuthResult<Claims> {
        verify_with(token, &self.rules, &self.algorithms, &*self.resolver, None).await
    }

    /// Same as [`verify`](Self::verify) with claim times checked against `now`.
    pub async fn verify_at(&self, token: Option<&str>, now: DateTime<Utc>) -> AuthResult<Claims> {
        verify_with(
            token,
            &self.rules,
            &self.algorithms,
            &*self.resolver,
            Some(now.timestamp()),
        )
        .await
    }
}

async fn verify_with(
    token: Option<&str>,
    rules: &ClaimRules,
    algorithms: &[Algorithm],
    resolver: &dyn KeyResolver,
    now: Option<i64>,
) -> AuthResult<Claims> {
    let token = match token.map(str::trim) {
        Some(token) if !token.is_empty() => token,
        _ => return Err(AuthError::MissingToken),
    };

    let header = decode_header(token).map_err(|err| AuthError::MalformedToken(err.to_string()))?;
    let kid = header
        .kid
        .ok_or_else(|| AuthError::MalformedToken("missing kid".into()))?;

    let key = resolver.resolve(&kid).await?;
    let raw = check_signature(token, header.alg, &key, algorithms)?;

    // One timestamp for every time-based claim.
    let now = now.unwrap_or_else(|| Utc::now().timestamp());
    rules.check(&raw, now)?;

    let claims = Claims::try_from(raw)?;
    debug!(kid, subject = ?claims.subject, "verified token");
    Ok(claims)
}

fn check_signature(
    token: &str,
    alg: Algorithm,
    key: &SigningKey,
    algorithms: &[Algorithm],
) -> AuthResult<Map<String, Value>> {
    if !algorithms.contains(&alg) {
        return Err(AuthError::InvalidSignature(format!(
            "algorithm {alg:?} is not accepted"
        )));
    }
    if let Some(pinned) = key.algorithm {
        if pinned != alg {
            return Err(AuthError::InvalidSignature(format!(
                "key '{}' is pinned to {pinned:?}, token uses {alg:?}",
                key.kid
            )));
        }
    }

    // Claims are checked separately so failures name the claim.
    let mut validation = Validation::new(alg);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = decode::<Map<String, Value>>(token, &key.key, &validation)?;
    Ok(data.claims)
}
