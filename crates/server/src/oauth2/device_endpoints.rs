//! Device Authorization Grant endpoints (RFC 8628).
//!
//! - `POST /oauth/device_authorization` - device requests a user code
//! - `GET /oauth/device` - verification page for the signed-in user
//! - `POST /oauth/device` - the user's decision
//!
//! Polling happens at the token endpoint.

use crate::error::{ErrorResponse, OAuthError};
use crate::oauth2::consent::{self, DeviceGrantView, DeviceTemplate};
use crate::oauth2::endpoints::{
    ClientPeer, authenticate_client, login_redirect, no_store, parse_scope,
};
use crate::oauth2::scope::{GrantType, ScopeSet};
use crate::oauth2::{OAUTH2_TAG, state::OAuth2State};
use axum::{
    Form, Json,
    extract::{Query, RawQuery, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use utoipa_axum::{router::OpenApiRouter, routes};

pub fn router(state: OAuth2State) -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(device_authorization))
        .routes(routes!(device_page, device_decision))
        .with_state(state)
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct DeviceAuthorizationRequest {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Space-separated scopes; defaults to the client's registered scopes
    pub scope: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeviceAuthorizationResponse {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    pub verification_uri_complete: String,
    pub expires_in: i64,
    pub interval: i64,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DevicePageQuery {
    /// Code shown on the device, if the user followed `verification_uri_complete`
    pub user_code: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct DeviceDecisionForm {
    pub user_code: Option<String>,
    /// "allow" or "deny"
    pub action: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeviceDecisionResponse {
    /// "authorized" or "denied"
    pub status: String,
}

/// Device authorization endpoint.
#[tracing::instrument(skip(state, headers, params))]
#[utoipa::path(
    post,
    path = "/oauth/device_authorization",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Device Authorization",
    summary = "Start a device authorization",
    description = "Issues a `device_code` for the device to poll with and a short `user_code` the user \
                   enters at `verification_uri`. The device must wait `interval` seconds between polls; \
                   polling faster returns `slow_down` and widens the interval.",
    request_body(
        content = DeviceAuthorizationRequest,
        content_type = "application/x-www-form-urlencoded",
        description = "Client identification and requested scope"
    ),
    responses(
        (status = 200, description = "Device authorization started", body = DeviceAuthorizationResponse),
        (status = 400, description = "Invalid scope or client not allowed to use the device grant", body = ErrorResponse),
        (status = 401, description = "Client authentication failed", body = ErrorResponse),
    )
)]
pub async fn device_authorization(
    State(state): State<OAuth2State>,
    peer: ClientPeer,
    headers: HeaderMap,
    Form(params): Form<DeviceAuthorizationRequest>,
) -> Result<Response, OAuthError> {
    let client = authenticate_client(
        &state,
        peer,
        &headers,
        params.client_id.as_deref(),
        params.client_secret.as_deref(),
    )
    .await?;
    if !client.is_grant_type_allowed(GrantType::DeviceCode) {
        return Err(OAuthError::UnauthorizedClient(
            "Client is not allowed to use the device_code grant".into(),
        ));
    }

    let allowed = client.scope_set();
    let scopes = match parse_scope(params.scope.as_deref())? {
        Some(requested) if !requested.is_subset(&allowed) => {
            return Err(OAuthError::InvalidScope(
                "Requested scope exceeds the client's registered scopes".into(),
            ));
        }
        Some(requested) => requested,
        None => allowed,
    };

    let grant = state.device.initiate(&client.id, &scopes).await?;
    Ok(no_store(Json(DeviceAuthorizationResponse {
        device_code: grant.device_code,
        user_code: grant.user_code,
        verification_uri: grant.verification_uri,
        verification_uri_complete: grant.verification_uri_complete,
        expires_in: grant.expires_in,
        interval: grant.interval,
    })))
}

/// Device verification page.
#[tracing::instrument(skip(state, headers, raw_query))]
#[utoipa::path(
    get,
    path = "/oauth/device",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Device Verification Page",
    summary = "Enter or confirm a device user code",
    description = "Without `user_code`, shows a form to enter the code displayed on the device. With a \
                   valid pending code, shows the requesting client and scopes with allow/deny buttons. \
                   Anonymous users are redirected to the login page.",
    params(DevicePageQuery),
    responses(
        (status = 200, description = "Verification page", content_type = "text/html"),
        (status = 302, description = "Redirect to the login page"),
    )
)]
pub async fn device_page(
    State(state): State<OAuth2State>,
    headers: HeaderMap,
    RawQuery(raw_query): RawQuery,
    Query(query): Query<DevicePageQuery>,
) -> Response {
    let Some(user_id) = state.sessions.current_user(&headers).await else {
        return login_redirect(&state, "/oauth/device", raw_query.as_deref());
    };

    let mut page = DeviceTemplate {
        user_id,
        action_url: "/oauth/device".to_string(),
        grant: None,
        message: None,
    };

    let Some(user_code) = query.user_code.filter(|c| !c.trim().is_empty()) else {
        return consent::render(&page);
    };

    let pending = match state.device.verify_by_user_code(&user_code).await {
        Ok(pending) => pending,
        Err(err) => return error_page(err),
    };
    let Some(pending) = pending else {
        page.message = Some("That code is invalid or has expired. Check your device and try again.".into());
        return consent::render(&page);
    };

    let client_name = match state.registry.lookup(&pending.client_id).await {
        Ok(Some(client)) => client.name,
        Ok(None) => {
            page.message = Some("The application that requested this code is no longer available.".into());
            return consent::render(&page);
        }
        Err(e) => return error_page(e.into()),
    };

    page.grant = Some(DeviceGrantView {
        client_name,
        scopes: consent::scope_views(&ScopeSet::from_stored(&pending.scope)),
        user_code: pending.user_code,
    });
    consent::render(&page)
}

fn error_page(err: OAuthError) -> Response {
    err.log_if_internal();
    consent::render_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "Something went wrong while looking up your code. Please try again.",
    )
}

/// Device verification decision.
#[tracing::instrument(skip(state, headers, form))]
#[utoipa::path(
    post,
    path = "/oauth/device",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Device Decision",
    summary = "Approve or deny a device",
    description = "Applies the signed-in user's decision to a pending device authorization. The device \
                   learns the outcome on its next poll.",
    request_body(
        content = DeviceDecisionForm,
        content_type = "application/x-www-form-urlencoded",
        description = "User code and decision"
    ),
    responses(
        (status = 200, description = "Decision recorded", body = DeviceDecisionResponse),
        (status = 400, description = "Missing user_code or unknown action", body = ErrorResponse),
        (status = 401, description = "No signed-in user", body = ErrorResponse),
        (status = 404, description = "No pending authorization for this code", body = ErrorResponse),
    )
)]
pub async fn device_decision(
    State(state): State<OAuth2State>,
    headers: HeaderMap,
    Form(form): Form<DeviceDecisionForm>,
) -> Result<Response, OAuthError> {
    let user_id = state
        .sessions
        .current_user(&headers)
        .await
        .ok_or(OAuthError::LoginRequired)?;
    let user_code = form
        .user_code
        .as_deref()
        .ok_or_else(|| OAuthError::InvalidRequest("user_code is required".into()))?;

    let (applied, status) = match form.action.as_deref() {
        Some("allow") => (
            state.device.authorize(user_code, &user_id).await?,
            "authorized",
        ),
        Some("deny") => (state.device.deny(user_code).await?, "denied"),
        _ => {
            return Err(OAuthError::InvalidRequest(
                "action must be 'allow' or 'deny'".into(),
            ));
        }
    };

    if !applied {
        return Ok((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "invalid_request".to_string(),
                error_description: Some(
                    "No pending device authorization matches this code".to_string(),
                ),
            }),
        )
            .into_response());
    }

    tracing::info!(user_id = %user_id, status, "Device authorization decided by user");
    Ok(Json(DeviceDecisionResponse {
        status: status.to_string(),
    })
    .into_response())
}
