use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{AuthError, AuthResult};

/// Verified token payload. Only ever built after signature and claim checks pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Claims {
    pub subject: Option<String>,
    pub audience: Vec<String>,
    pub issuer: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub not_before: Option<DateTime<Utc>>,
    pub issued_at: Option<DateTime<Utc>>,
    pub permissions: Vec<String>,
    pub org_code: Option<String>,
    pub scopes: Vec<String>,
    pub raw: Map<String, Value>,
}

impl Claims {
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|value| value == permission)
    }

    /// Any claim by name, including provider-specific ones.
    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.raw.get(name)
    }
}

#[derive(Debug, Deserialize)]
struct ClaimsRepr {
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    aud: Option<OneOrMany>,
    #[serde(default)]
    iss: Option<String>,
    #[serde(default)]
    permissions: Option<Vec<String>>,
    #[serde(default)]
    org_code: Option<String>,
    #[serde(default)]
    scp: Option<OneOrMany>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Single(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::Single(item) => item.split_whitespace().map(str::to_owned).collect(),
            OneOrMany::Many(items) => items,
        }
    }
}

/// Audience values as published in the token; a single string is not split.
pub(crate) fn audiences(raw: &Map<String, Value>) -> AuthResult<Vec<String>> {
    match raw.get("aud") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(item)) => Ok(vec![item.clone()]),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_owned)
                    .ok_or_else(|| AuthError::claim("aud", "audience entries must be strings"))
            })
            .collect(),
        Some(_) => Err(AuthError::claim("aud", "audience must be a string or array")),
    }
}

/// NumericDate claim in whole seconds; fractional values are truncated.
pub(crate) fn numeric_date(raw: &Map<String, Value>, claim: &'static str) -> AuthResult<Option<i64>> {
    match raw.get(claim) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(number)) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|value| value.trunc() as i64))
            .map(Some)
            .ok_or_else(|| AuthError::claim(claim, "not a valid timestamp")),
        Some(_) => Err(AuthError::claim(claim, "must be numeric")),
    }
}

fn timestamp(claim: &'static str, seconds: i64) -> AuthResult<DateTime<Utc>> {
    Utc.timestamp_opt(seconds, 0)
        .single()
        .ok_or_else(|| AuthError::claim(claim, seconds.to_string()))
}

impl TryFrom<Map<String, Value>> for Claims {
    type Error = AuthError;

    fn try_from(raw: Map<String, Value>) -> AuthResult<Self> {
        let exp = numeric_date(&raw, "exp")?.ok_or_else(|| AuthError::claim("exp", "missing"))?;
        let expires_at = timestamp("exp", exp)?;
        let not_before = numeric_date(&raw, "nbf")?
            .map(|nbf| timestamp("nbf", nbf))
            .transpose()?;
        let issued_at = numeric_date(&raw, "iat")?
            .map(|iat| timestamp("iat", iat))
            .transpose()?;

        let repr: ClaimsRepr = serde_json::from_value(Value::Object(raw.clone()))
            .map_err(|err| AuthError::claim("payload", err.to_string()))?;

        Ok(Self {
            subject: repr.sub,
            audience: repr
                .aud
                .map(|aud| match aud {
                    OneOrMany::Single(item) => vec![item],
                    OneOrMany::Many(items) => items,
                })
                .unwrap_or_default(),
            issuer: repr.iss,
            expires_at,
            not_before,
            issued_at,
            permissions: repr.permissions.unwrap_or_default(),
            org_code: repr.org_code,
            scopes: repr.scp.map(OneOrMany::into_vec).unwrap_or_default(),
            raw,
        })
    }
}
