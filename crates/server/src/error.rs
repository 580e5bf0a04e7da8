//! OAuth 2.0 error taxonomy (RFC 6749 §5.2, RFC 8628 §3.5, RFC 6750 §3.1).
//!
//! Every failure inside the authorization server is expressed as an
//! [`OAuthError`]; the wire code is the contract with clients. Storage
//! failures are logged here and surfaced only as `server_error`.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use sea_orm::DbErr;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("invalid_request: {0}")]
    InvalidRequest(String),
    #[error("invalid_client: {0}")]
    InvalidClient(String),
    #[error("invalid_grant: {0}")]
    InvalidGrant(String),
    #[error("unauthorized_client: {0}")]
    UnauthorizedClient(String),
    #[error("invalid_scope: {0}")]
    InvalidScope(String),
    #[error("unsupported_grant_type: {0}")]
    UnsupportedGrantType(String),
    #[error("unsupported_response_type: {0}")]
    UnsupportedResponseType(String),
    #[error("access_denied")]
    AccessDenied,
    #[error("authorization_pending")]
    AuthorizationPending,
    #[error("slow_down")]
    SlowDown,
    #[error("expired_token")]
    ExpiredToken,
    #[error("invalid_token: {0}")]
    InvalidToken(String),
    #[error("insufficient_scope: {0}")]
    InsufficientScope(String),
    #[error("login_required")]
    LoginRequired,
    #[error("server_error: {0}")]
    ServerError(String),
    #[error("storage error: {0}")]
    Storage(#[from] DbErr),
}

impl OAuthError {
    /// The RFC error code sent on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            OAuthError::InvalidRequest(_) => "invalid_request",
            OAuthError::InvalidClient(_) => "invalid_client",
            OAuthError::InvalidGrant(_) => "invalid_grant",
            OAuthError::UnauthorizedClient(_) => "unauthorized_client",
            OAuthError::InvalidScope(_) => "invalid_scope",
            OAuthError::UnsupportedGrantType(_) => "unsupported_grant_type",
            OAuthError::UnsupportedResponseType(_) => "unsupported_response_type",
            OAuthError::AccessDenied => "access_denied",
            OAuthError::AuthorizationPending => "authorization_pending",
            OAuthError::SlowDown => "slow_down",
            OAuthError::ExpiredToken => "expired_token",
            OAuthError::InvalidToken(_) => "invalid_token",
            OAuthError::InsufficientScope(_) => "insufficient_scope",
            OAuthError::LoginRequired => "login_required",
            OAuthError::ServerError(_) | OAuthError::Storage(_) => "server_error",
        }
    }

    /// Human-readable description; never contains storage internals.
    pub fn description(&self) -> Option<String> {
        match self {
            OAuthError::InvalidRequest(d)
            | OAuthError::InvalidClient(d)
            | OAuthError::InvalidGrant(d)
            | OAuthError::UnauthorizedClient(d)
            | OAuthError::InvalidScope(d)
            | OAuthError::UnsupportedGrantType(d)
            | OAuthError::UnsupportedResponseType(d)
            | OAuthError::InvalidToken(d)
            | OAuthError::InsufficientScope(d) => Some(d.clone()),
            OAuthError::AccessDenied => Some("The resource owner denied the request".into()),
            OAuthError::AuthorizationPending => {
                Some("The user has not yet completed authorization".into())
            }
            OAuthError::SlowDown => Some("Polling too frequently; increase the interval".into()),
            OAuthError::ExpiredToken => Some("The device code has expired".into()),
            OAuthError::LoginRequired => Some("User authentication is required".into()),
            OAuthError::ServerError(_) | OAuthError::Storage(_) => None,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            OAuthError::InvalidClient(_) | OAuthError::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            OAuthError::LoginRequired => StatusCode::UNAUTHORIZED,
            OAuthError::InsufficientScope(_) => StatusCode::FORBIDDEN,
            OAuthError::ServerError(_) | OAuthError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::BAD_REQUEST,
        }
    }

    pub fn is_server_error(&self) -> bool {
        matches!(self, OAuthError::ServerError(_) | OAuthError::Storage(_))
    }

    /// Log internal failures once, at the boundary where they become a response.
    pub(crate) fn log_if_internal(&self) {
        match self {
            OAuthError::Storage(e) => tracing::error!(error = %e, "Database error"),
            OAuthError::ServerError(msg) => tracing::error!(reason = %msg, "Internal server error"),
            _ => {}
        }
    }

    pub fn to_body(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.code().to_string(),
            error_description: self.description(),
        }
    }
}

/// JSON error body (RFC 6749 §5.2).
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        self.log_if_internal();
        let status = self.status();
        let mut response = (status, Json(self.to_body())).into_response();

        let headers = response.headers_mut();
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        match &self {
            OAuthError::InvalidToken(_) => {
                headers.insert(
                    header::WWW_AUTHENTICATE,
                    HeaderValue::from_static("Bearer error=\"invalid_token\""),
                );
            }
            OAuthError::InsufficientScope(_) => {
                headers.insert(
                    header::WWW_AUTHENTICATE,
                    HeaderValue::from_static("Bearer error=\"insufficient_scope\""),
                );
            }
            OAuthError::InvalidClient(_) => {
                headers.insert(
                    header::WWW_AUTHENTICATE,
                    HeaderValue::from_static("Basic realm=\"oauth\""),
                );
            }
            _ => {}
        }
        response
    }
}

impl From<crate::oauth2::secret::SecretError> for OAuthError {
    fn from(e: crate::oauth2::secret::SecretError) -> Self {
        OAuthError::ServerError(e.to_string())
    }
}

pub type OAuthResult<T> = Result<T, OAuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_errors_hide_details() {
        let err = OAuthError::from(DbErr::Custom("connection refused on 10.0.0.3".into()));
        assert_eq!(err.code(), "server_error");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.description().is_none());
        let body = serde_json::to_value(err.to_body()).unwrap();
        assert!(body.get("error_description").is_none());
    }

    #[test]
    fn client_errors_are_unauthorized() {
        let err = OAuthError::InvalidClient("bad secret".into());
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        let resp = err.into_response();
        assert!(resp.headers().contains_key(header::WWW_AUTHENTICATE));
    }

    #[test]
    fn device_polling_codes() {
        assert_eq!(OAuthError::AuthorizationPending.code(), "authorization_pending");
        assert_eq!(OAuthError::SlowDown.code(), "slow_down");
        assert_eq!(OAuthError::ExpiredToken.code(), "expired_token");
        assert_eq!(OAuthError::AccessDenied.code(), "access_denied");
        assert_eq!(OAuthError::SlowDown.status(), StatusCode::BAD_REQUEST);
    }
}
