//! Bearer token extractor for resource servers.
//!
//! Handlers that serve task manager data take [`BearerAuth`] and call
//! [`AuthenticatedClient::require_scope`] for the scope they need.

use crate::error::{OAuthError, OAuthResult};
use crate::oauth2::{OAUTH2_TAG, OAuth2State, Scope, ScopeSet};
use axum::{
    Json,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

/// The caller behind a valid access token.
#[derive(Debug, Clone)]
pub struct AuthenticatedClient {
    pub user_id: String,
    pub client_id: String,
    pub scopes: ScopeSet,
}

impl AuthenticatedClient {
    pub fn has_scope(&self, scope: Scope) -> bool {
        self.scopes.contains(scope)
    }

    pub fn require_scope(&self, scope: Scope) -> OAuthResult<()> {
        if self.has_scope(scope) {
            Ok(())
        } else {
            Err(OAuthError::InsufficientScope(format!(
                "Token requires '{scope}' scope"
            )))
        }
    }
}

/// Axum extractor validating `Authorization: Bearer <token>`.
///
/// Works with any router state that can hand out an [`OAuth2State`].
///
/// ```ignore
/// async fn list_todos(BearerAuth(caller): BearerAuth) -> Result<Json<Vec<Todo>>, OAuthError> {
///     caller.require_scope(Scope::TodosRead)?;
///     ...
/// }
/// ```
pub struct BearerAuth(pub AuthenticatedClient);

impl<S> FromRequestParts<S> for BearerAuth
where
    OAuth2State: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = OAuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let oauth = OAuth2State::from_ref(state);

        let access_token = match parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
        {
            Some(value) => value
                .strip_prefix("Bearer ")
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .ok_or_else(|| {
                    OAuthError::InvalidToken("Authorization header must use Bearer scheme".into())
                })?,
            None => {
                return Err(OAuthError::InvalidToken(
                    "Missing Authorization header".into(),
                ));
            }
        };

        let info = oauth.tokens.lookup_access_token(access_token).await?;
        Ok(BearerAuth(AuthenticatedClient {
            user_id: info.user_id,
            client_id: info.client_id,
            scopes: info.scopes,
        }))
    }
}

pub fn router(state: OAuth2State) -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(whoami))
        .with_state(state)
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WhoAmIResponse {
    pub user_id: String,
    pub client_id: String,
    /// Space-separated scopes granted to the token
    pub scope: String,
}

/// Identify the caller behind an access token.
#[tracing::instrument(skip_all)]
#[utoipa::path(
    get,
    path = "/api/me",
    tag = OAUTH2_TAG,
    operation_id = "Who Am I",
    summary = "Resolve the current access token",
    description = "Returns the user and client an access token was issued to. Requires the `profile` scope.",
    security(("OAuth2" = ["profile"])),
    responses(
        (status = 200, description = "Token is valid", body = WhoAmIResponse),
        (status = 401, description = "Missing, unknown, expired or revoked token", body = crate::error::ErrorResponse),
        (status = 403, description = "Token lacks the profile scope", body = crate::error::ErrorResponse),
    )
)]
pub async fn whoami(BearerAuth(caller): BearerAuth) -> Result<Json<WhoAmIResponse>, OAuthError> {
    caller.require_scope(Scope::Profile)?;
    Ok(Json(WhoAmIResponse {
        scope: caller.scopes.to_string(),
        user_id: caller.user_id,
        client_id: caller.client_id,
    }))
}
