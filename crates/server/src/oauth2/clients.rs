//! Client management endpoints for signed-in users.
//!
//! Users register, list and deactivate the OAuth2 clients they own. The
//! plaintext client secret is only ever returned by the create call.

use crate::entity::oauth2_client;
use crate::error::{ErrorResponse, OAuthError};
use crate::oauth2::endpoints::parse_scope;
use crate::oauth2::registrar::NewClient;
use crate::oauth2::scope::GrantType;
use crate::oauth2::{OAUTH2_TAG, state::OAuth2State};
use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

pub fn router(state: OAuth2State) -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(list_clients, create_client))
        .routes(routes!(delete_client))
        .with_state(state)
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateClientRequest {
    pub name: String,
    pub redirect_uris: Vec<String>,
    /// Defaults to `["authorization_code", "refresh_token"]`
    #[serde(default)]
    pub grant_types: Vec<String>,
    /// Space-separated scopes the client may request
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub is_public: bool,
    /// Optional caller-chosen secret for confidential clients
    #[serde(default)]
    pub client_secret: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ClientView {
    pub client_id: String,
    pub name: String,
    pub is_public: bool,
    pub redirect_uris: Vec<String>,
    pub grant_types: Vec<String>,
    pub scope: String,
    /// Unix timestamp
    pub created_at: i64,
}

impl From<oauth2_client::Model> for ClientView {
    fn from(client: oauth2_client::Model) -> Self {
        Self {
            redirect_uris: client.redirect_uris_list(),
            grant_types: client
                .grant_types_list()
                .iter()
                .map(|g| g.as_str().to_string())
                .collect(),
            scope: client.scope_set().to_string(),
            created_at: client.created_at.unix_timestamp(),
            client_id: client.id,
            name: client.name,
            is_public: client.is_public,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateClientResponse {
    #[serde(flatten)]
    pub client: ClientView,
    /// Shown once; store it now
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
}

async fn require_user(state: &OAuth2State, headers: &HeaderMap) -> Result<String, OAuthError> {
    state
        .sessions
        .current_user(headers)
        .await
        .ok_or(OAuthError::LoginRequired)
}

/// List the signed-in user's clients.
#[tracing::instrument(skip(state, headers))]
#[utoipa::path(
    get,
    path = "/oauth/clients",
    tag = OAUTH2_TAG,
    operation_id = "List OAuth2 Clients",
    summary = "List your OAuth2 clients",
    responses(
        (status = 200, description = "Active clients owned by the user", body = [ClientView]),
        (status = 401, description = "No signed-in user", body = ErrorResponse),
    )
)]
pub async fn list_clients(
    State(state): State<OAuth2State>,
    headers: HeaderMap,
) -> Result<Json<Vec<ClientView>>, OAuthError> {
    let owner = require_user(&state, &headers).await?;
    let clients = state.registry.list_for_owner(&owner).await?;
    Ok(Json(clients.into_iter().map(ClientView::from).collect()))
}

/// Register a new client owned by the signed-in user.
#[tracing::instrument(skip(state, headers, body))]
#[utoipa::path(
    post,
    path = "/oauth/clients",
    tag = OAUTH2_TAG,
    operation_id = "Create OAuth2 Client",
    summary = "Register an OAuth2 client",
    description = "Registers a client owned by the signed-in user.\n\n\
                   - Public clients (SPAs, native apps) have no secret and must use PKCE\n\
                   - Confidential clients get a generated secret unless one is supplied; a supplied \
                   secret needs at least 32 characters mixing two character classes\n\
                   - Redirect URIs must be absolute and fragment-free; they are matched exactly\n\n\
                   The `client_secret` in the response is never shown again.",
    request_body = CreateClientRequest,
    responses(
        (status = 201, description = "Client registered", body = CreateClientResponse),
        (status = 400, description = "Invalid registration data", body = ErrorResponse),
        (status = 401, description = "No signed-in user", body = ErrorResponse),
    )
)]
pub async fn create_client(
    State(state): State<OAuth2State>,
    headers: HeaderMap,
    Json(body): Json<CreateClientRequest>,
) -> Result<Response, OAuthError> {
    let owner = require_user(&state, &headers).await?;

    if body.name.trim().is_empty() {
        return Err(OAuthError::InvalidRequest("name is required".into()));
    }
    let grant_types = if body.grant_types.is_empty() {
        vec![GrantType::AuthorizationCode, GrantType::RefreshToken]
    } else {
        body.grant_types
            .iter()
            .map(|g| {
                g.parse::<GrantType>().map_err(|_| {
                    OAuthError::InvalidRequest(format!("Unsupported grant type '{g}'"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?
    };
    let scopes = parse_scope(body.scope.as_deref())?.unwrap_or_default();

    let registered = state
        .registry
        .register(NewClient {
            name: body.name.trim().to_string(),
            redirect_uris: body.redirect_uris,
            grant_types,
            scopes,
            owner_user_id: Some(owner),
            is_public: body.is_public,
            secret: body.client_secret,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateClientResponse {
            client: ClientView::from(registered.client),
            client_secret: registered.secret,
        }),
    )
        .into_response())
}

/// Deactivate one of the signed-in user's clients.
#[tracing::instrument(skip(state, headers))]
#[utoipa::path(
    delete,
    path = "/oauth/clients/{client_id}",
    tag = OAUTH2_TAG,
    operation_id = "Delete OAuth2 Client",
    summary = "Deactivate an OAuth2 client",
    description = "Deactivates the client and revokes every token issued to it. Outstanding codes \
                   can no longer be redeemed because client authentication fails for inactive clients.",
    params(
        ("client_id" = String, Path, description = "Client to deactivate"),
    ),
    responses(
        (status = 204, description = "Client deactivated"),
        (status = 401, description = "No signed-in user", body = ErrorResponse),
        (status = 404, description = "No such client owned by the user", body = ErrorResponse),
    )
)]
pub async fn delete_client(
    State(state): State<OAuth2State>,
    headers: HeaderMap,
    Path(client_id): Path<String>,
) -> Result<Response, OAuthError> {
    let owner = require_user(&state, &headers).await?;
    if state.registry.deactivate(&client_id, &owner).await? {
        Ok(StatusCode::NO_CONTENT.into_response())
    } else {
        Ok((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "not_found".to_string(),
                error_description: Some("Client not found".to_string()),
            }),
        )
            .into_response())
    }
}
