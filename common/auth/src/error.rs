use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use jsonwebtoken::errors::ErrorKind;
use serde::Serialize;
use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing required configuration value '{0}'")]
    MissingConfiguration(&'static str),
    #[error("invalid configuration value '{key}': {reason}")]
    InvalidConfiguration { key: &'static str, reason: String },
    #[error("no bearer token provided")]
    MissingToken,
    #[error("malformed token: {0}")]
    MalformedToken(String),
    #[error("no signing key published for kid '{0}'")]
    KeyNotFound(String),
    #[error("failed to fetch signing keys: {0}")]
    KeyFetch(String),
    #[error("token signature rejected: {0}")]
    InvalidSignature(String),
    #[error("claim '{claim}' rejected: {reason}")]
    ClaimValidation { claim: &'static str, reason: String },
}

impl AuthError {
    pub(crate) fn claim(claim: &'static str, reason: impl Into<String>) -> Self {
        Self::ClaimValidation {
            claim,
            reason: reason.into(),
        }
    }

    /// Stable code for logs and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::MissingConfiguration(_) => "missing_configuration",
            AuthError::InvalidConfiguration { .. } => "invalid_configuration",
            AuthError::MissingToken => "missing_token",
            AuthError::MalformedToken(_) => "malformed_token",
            AuthError::KeyNotFound(_) => "key_not_found",
            AuthError::KeyFetch(_) => "key_fetch_error",
            AuthError::InvalidSignature(_) => "invalid_signature",
            AuthError::ClaimValidation { .. } => "claim_validation_error",
        }
    }

    /// Startup-time errors; everything else is scoped to a single request.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            AuthError::MissingConfiguration(_) | AuthError::InvalidConfiguration { .. }
        )
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(value: jsonwebtoken::errors::Error) -> Self {
        match value.kind() {
            ErrorKind::InvalidToken
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_) => Self::MalformedToken(value.to_string()),
            _ => Self::InvalidSignature(value.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: &'static str,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        // Clients only ever learn "unauthorized"; the precise kind stays in the logs.
        let (status, body) = if self.is_configuration() {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody {
                    code: "internal_error",
                    message: "internal error",
                },
            )
        } else {
            (StatusCode::UNAUTHORIZED, UNAUTHORIZED_BODY)
        };
        (status, Json(body)).into_response()
    }
}

const UNAUTHORIZED_BODY: ErrorBody = ErrorBody {
    code: "unauthorized",
    message: "unauthorized",
};

/// Generic 401 used when a guard denies without surfacing an error.
pub fn unauthorized_response() -> Response {
    (StatusCode::UNAUTHORIZED, Json(UNAUTHORIZED_BODY)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_errors_map_to_generic_unauthorized() {
        let errors = [
            AuthError::MissingToken,
            AuthError::KeyNotFound("abc".into()),
            AuthError::KeyFetch("HTTP 500".into()),
            AuthError::InvalidSignature("bad".into()),
            AuthError::claim("aud", "mismatch"),
        ];
        for err in errors {
            assert!(!err.is_configuration());
            assert_eq!(err.into_response().status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[test]
    fn configuration_errors_are_internal() {
        let err = AuthError::MissingConfiguration("audience");
        assert_eq!(err.kind(), "missing_configuration");
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn jwt_signature_errors_are_classified() {
        let err: AuthError = jsonwebtoken::errors::Error::from(ErrorKind::InvalidSignature).into();
        assert!(matches!(err, AuthError::InvalidSignature(_)));

        let err: AuthError = jsonwebtoken::errors::Error::from(ErrorKind::InvalidToken).into();
        assert!(matches!(err, AuthError::MalformedToken(_)));
    }
}
