//! OAuth2 HTTP endpoints.
//!
//! Implements the OAuth2 authorization server endpoints:
//! - Authorization endpoint (consent page and decision)
//! - Token endpoint
//! - Token revocation
//! - Authorization server metadata

use crate::entity::oauth2_client;
use crate::error::{ErrorResponse, OAuthError, OAuthResult};
use crate::oauth2::authorization::CodeRequest;
use crate::oauth2::consent::{self, ConsentTemplate};
use crate::oauth2::pkce::{self, ChallengeMethod};
use crate::oauth2::scope::{GrantType, Scope, ScopeSet};
use crate::oauth2::tokens::{CodeExchange, IssuedTokens, TokenTypeHint};
use crate::oauth2::{OAUTH2_TAG, state::OAuth2State};
use axum::{
    Form, Json,
    extract::{ConnectInfo, FromRequestParts, Query, RawQuery, State},
    http::{HeaderMap, HeaderValue, StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

/// Creates the OAuth2 router.
pub fn router(state: OAuth2State) -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(authorize, authorize_decision))
        .routes(routes!(token))
        .routes(routes!(revoke))
        .routes(routes!(authorization_server_metadata))
        .with_state(state)
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// OAuth2 authorization request parameters.
///
/// Sent as a query string to `GET /oauth/authorize` and echoed back as a form
/// (plus `action`) by the consent page.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct AuthorizeRequest {
    /// Must be "code" for Authorization Code flow
    pub response_type: Option<String>,
    /// Client identifier issued during registration
    pub client_id: Option<String>,
    /// Redirect URI (must match registered URI)
    pub redirect_uri: Option<String>,
    /// Space-separated list of requested scopes
    pub scope: Option<String>,
    /// Opaque value for CSRF protection
    pub state: Option<String>,
    /// PKCE code challenge (base64url-encoded)
    pub code_challenge: Option<String>,
    /// PKCE method: "S256" or "plain"
    pub code_challenge_method: Option<String>,
    /// Consent decision, "allow" or "deny" (form submission only)
    pub action: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct TokenRequest {
    pub grant_type: Option<String>,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
    pub code_verifier: Option<String>,
    pub device_code: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub scope: String,
}

impl From<IssuedTokens> for TokenResponse {
    fn from(tokens: IssuedTokens) -> Self {
        Self {
            access_token: tokens.access_token,
            token_type: "Bearer".to_string(),
            expires_in: tokens.expires_in,
            refresh_token: tokens.refresh_token,
            scope: tokens.scope.to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct RevokeRequest {
    pub token: Option<String>,
    pub token_type_hint: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

/// RFC 8414 authorization server metadata.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthorizationServerMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub revocation_endpoint: String,
    pub device_authorization_endpoint: String,
    pub response_types_supported: Vec<String>,
    pub grant_types_supported: Vec<String>,
    pub scopes_supported: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<String>,
    pub revocation_endpoint_auth_methods_supported: Vec<String>,
    pub code_challenge_methods_supported: Vec<String>,
}

// =============================================================================
// Authorization endpoint
// =============================================================================

/// A request whose client and redirect URI have been verified.
#[derive(Debug)]
struct TrustedRedirect {
    client: oauth2_client::Model,
    redirect_uri: String,
    state: Option<String>,
}

/// A fully validated authorization request.
#[derive(Debug)]
struct ValidatedAuthorize {
    target: TrustedRedirect,
    scopes: ScopeSet,
    code_challenge: Option<String>,
    code_challenge_method: Option<ChallengeMethod>,
}

/// Until the redirect URI is trusted, errors are shown to the user agent
/// directly. After that they go back to the client.
#[derive(Debug)]
enum AuthorizeRejection {
    Direct(OAuthError),
    Redirect(TrustedRedirect, OAuthError),
}

impl IntoResponse for AuthorizeRejection {
    fn into_response(self) -> Response {
        match self {
            AuthorizeRejection::Direct(err) => {
                err.log_if_internal();
                let status = if err.is_server_error() {
                    err.status()
                } else {
                    StatusCode::BAD_REQUEST
                };
                (status, Json(err.to_body())).into_response()
            }
            AuthorizeRejection::Redirect(target, err) => {
                err.log_if_internal();
                let mut params = vec![("error", err.code().to_string())];
                if let Some(description) = err.description() {
                    params.push(("error_description", description));
                }
                redirect_with(&target, params)
            }
        }
    }
}

/// 302 to `redirect_uri` with extra query parameters and `state` appended.
fn redirect_with(target: &TrustedRedirect, params: Vec<(&str, String)>) -> Response {
    // Registered URIs were parsed at registration time.
    let Ok(mut url) = url::Url::parse(&target.redirect_uri) else {
        return OAuthError::ServerError(format!(
            "stored redirect_uri '{}' does not parse",
            target.redirect_uri
        ))
        .into_response();
    };
    {
        let mut query = url.query_pairs_mut();
        for (key, value) in &params {
            query.append_pair(key, value);
        }
        if let Some(state) = &target.state {
            query.append_pair("state", state);
        }
    }
    found(url.as_str())
}

/// Send an anonymous user to the login page, to come back to `path`.
pub(crate) fn login_redirect(state: &OAuth2State, path: &str, query: Option<&str>) -> Response {
    let next = match query {
        Some(q) if !q.is_empty() => format!("{}?{q}", state.endpoint(path)),
        _ => state.endpoint(path),
    };
    let login = &state.config.login_url;
    let separator = if login.contains('?') { '&' } else { '?' };
    found(&format!(
        "{login}{separator}next={}",
        urlencoding::encode(&next)
    ))
}

fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

/// Validate the client and redirect URI first, then everything else.
async fn validate_authorize(
    state: &OAuth2State,
    params: &AuthorizeRequest,
) -> Result<ValidatedAuthorize, AuthorizeRejection> {
    let client_id = params.client_id.as_deref().ok_or_else(|| {
        AuthorizeRejection::Direct(OAuthError::InvalidRequest("client_id is required".into()))
    })?;
    let client = state
        .registry
        .lookup(client_id)
        .await
        .map_err(|e| AuthorizeRejection::Direct(e.into()))?
        .ok_or_else(|| AuthorizeRejection::Direct(OAuthError::InvalidClient("Unknown client".into())))?;

    let redirect_uri = match params.redirect_uri.as_deref() {
        Some(uri) if client.is_redirect_uri_allowed(uri) => uri.to_string(),
        Some(_) => {
            return Err(AuthorizeRejection::Direct(OAuthError::InvalidRequest(
                "redirect_uri is not registered for this client".into(),
            )));
        }
        None => {
            let mut registered = client.redirect_uris_list();
            if registered.len() != 1 {
                return Err(AuthorizeRejection::Direct(OAuthError::InvalidRequest(
                    "redirect_uri is required".into(),
                )));
            }
            registered.remove(0)
        }
    };

    let target = TrustedRedirect {
        client,
        redirect_uri,
        state: params.state.clone(),
    };
    match check_authorize_params(&target.client, params) {
        Ok((scopes, code_challenge, code_challenge_method)) => Ok(ValidatedAuthorize {
            target,
            scopes,
            code_challenge,
            code_challenge_method,
        }),
        Err(err) => Err(AuthorizeRejection::Redirect(target, err)),
    }
}

/// Granted scopes plus the PKCE challenge to record with the code.
type GrantParams = (ScopeSet, Option<String>, Option<ChallengeMethod>);

fn check_authorize_params(
    client: &oauth2_client::Model,
    params: &AuthorizeRequest,
) -> OAuthResult<GrantParams> {
    match params.response_type.as_deref() {
        Some("code") => {}
        Some(other) => {
            return Err(OAuthError::UnsupportedResponseType(format!(
                "response_type '{other}' is not supported; use 'code'"
            )));
        }
        None => return Err(OAuthError::InvalidRequest("response_type is required".into())),
    }

    if !client.is_grant_type_allowed(GrantType::AuthorizationCode) {
        return Err(OAuthError::UnauthorizedClient(
            "Client is not allowed to use the authorization_code grant".into(),
        ));
    }

    let allowed = client.scope_set();
    let scopes = match parse_scope(params.scope.as_deref())? {
        Some(requested) => {
            if !requested.is_subset(&allowed) {
                return Err(OAuthError::InvalidScope(
                    "Requested scope exceeds the client's registered scopes".into(),
                ));
            }
            requested
        }
        None => allowed,
    };

    let (challenge, method) = match params.code_challenge.as_deref() {
        Some(challenge) => {
            if !pkce::is_valid_pkce_string(challenge) {
                return Err(OAuthError::InvalidRequest(
                    "code_challenge must be 43-128 characters of [A-Za-z0-9-._~]".into(),
                ));
            }
            let method = ChallengeMethod::parse_optional(params.code_challenge_method.as_deref())?;
            (Some(challenge.to_string()), Some(method))
        }
        None if params.code_challenge_method.is_some() => {
            return Err(OAuthError::InvalidRequest(
                "code_challenge_method requires code_challenge".into(),
            ));
        }
        None if client.is_public => {
            return Err(OAuthError::InvalidRequest(
                "Public clients must use PKCE (code_challenge)".into(),
            ));
        }
        None => (None, None),
    };

    Ok((scopes, challenge, method))
}

/// Parse an optional `scope` parameter. Absent or blank means "not given".
pub(crate) fn parse_scope(scope: Option<&str>) -> OAuthResult<Option<ScopeSet>> {
    match scope.map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => raw
            .parse::<ScopeSet>()
            .map(Some)
            .map_err(|e| OAuthError::InvalidScope(e.to_string())),
    }
}

/// OAuth2 Authorization endpoint.
#[tracing::instrument(skip(state, headers, params, raw_query))]
#[utoipa::path(
    get,
    path = "/oauth/authorize",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Authorize",
    summary = "Start the authorization code flow",
    description = "Validates the authorization request and shows the signed-in user a consent page.\n\n\
                   Errors concerning the client or redirect URI are returned directly as JSON; every \
                   later error is sent to the redirect URI as `error` and `state` query parameters.\n\n\
                   Users without a session are redirected to the login page with `next` set to this URL.\n\n\
                   **PKCE:** required for public clients. `S256` is recommended; `plain` is accepted.",
    params(
        ("response_type" = String, Query, description = "Must be `code`."),
        ("client_id" = String, Query, description = "The client identifier issued during client registration."),
        ("redirect_uri" = Option<String>, Query, description = "Must exactly match a registered redirect URI. Optional when the client has exactly one."),
        ("scope" = Option<String>, Query, description = "Space-separated scopes. Defaults to every scope registered for the client."),
        ("state" = Option<String>, Query, description = "Opaque value returned unchanged in the redirect."),
        ("code_challenge" = Option<String>, Query, description = "PKCE code challenge."),
        ("code_challenge_method" = Option<String>, Query, description = "`S256` or `plain` (default)."),
    ),
    responses(
        (status = 200, description = "Consent page", content_type = "text/html"),
        (status = 302, description = "Redirect to the login page, or back to the client with an error"),
        (status = 400, description = "Unknown client or unregistered redirect_uri", body = ErrorResponse),
    )
)]
pub async fn authorize(
    State(state): State<OAuth2State>,
    headers: HeaderMap,
    RawQuery(raw_query): RawQuery,
    Query(params): Query<AuthorizeRequest>,
) -> Response {
    let validated = match validate_authorize(&state, &params).await {
        Ok(v) => v,
        Err(rejection) => return rejection.into_response(),
    };

    let Some(user_id) = state.sessions.current_user(&headers).await else {
        return login_redirect(&state, "/oauth/authorize", raw_query.as_deref());
    };

    let mut hidden_fields = vec![
        ("response_type".to_string(), "code".to_string()),
        ("client_id".to_string(), validated.target.client.id.clone()),
        ("redirect_uri".to_string(), validated.target.redirect_uri.clone()),
        ("scope".to_string(), validated.scopes.to_string()),
    ];
    if let Some(s) = &validated.target.state {
        hidden_fields.push(("state".to_string(), s.clone()));
    }
    if let Some(challenge) = &validated.code_challenge {
        hidden_fields.push(("code_challenge".to_string(), challenge.clone()));
    }
    if let Some(method) = validated.code_challenge_method {
        hidden_fields.push(("code_challenge_method".to_string(), method.to_string()));
    }

    let redirect_host = url::Url::parse(&validated.target.redirect_uri)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| validated.target.redirect_uri.clone());

    consent::render(&ConsentTemplate {
        client_name: validated.target.client.name.clone(),
        user_id,
        scopes: consent::scope_views(&validated.scopes),
        action_url: "/oauth/authorize".to_string(),
        hidden_fields,
        redirect_host,
    })
}

/// OAuth2 consent decision.
#[tracing::instrument(skip(state, headers, params))]
#[utoipa::path(
    post,
    path = "/oauth/authorize",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Authorize Decision",
    summary = "Submit the user's consent decision",
    description = "Re-validates the authorization request and applies the decision. `allow` issues a \
                   single-use authorization code and redirects with `code` and `state`; `deny` \
                   redirects with `error=access_denied`.",
    request_body(
        content = AuthorizeRequest,
        content_type = "application/x-www-form-urlencoded",
        description = "Authorization request parameters plus `action`"
    ),
    responses(
        (status = 302, description = "Redirect back to the client with a code or an error"),
        (status = 400, description = "Unknown client or unregistered redirect_uri", body = ErrorResponse),
        (status = 401, description = "No signed-in user", body = ErrorResponse),
    )
)]
pub async fn authorize_decision(
    State(state): State<OAuth2State>,
    headers: HeaderMap,
    Form(params): Form<AuthorizeRequest>,
) -> Response {
    let validated = match validate_authorize(&state, &params).await {
        Ok(v) => v,
        Err(rejection) => return rejection.into_response(),
    };

    let Some(user_id) = state.sessions.current_user(&headers).await else {
        return OAuthError::LoginRequired.into_response();
    };

    match params.action.as_deref() {
        Some("deny") => {
            tracing::info!(
                user_id = %user_id,
                client_id = %validated.target.client.id,
                "User denied consent"
            );
            AuthorizeRejection::Redirect(validated.target, OAuthError::AccessDenied).into_response()
        }
        Some("allow") => {
            let issued = state
                .codes
                .issue(CodeRequest {
                    client_id: &validated.target.client.id,
                    user_id: &user_id,
                    redirect_uri: &validated.target.redirect_uri,
                    scopes: &validated.scopes,
                    code_challenge: validated.code_challenge.as_deref(),
                    code_challenge_method: validated.code_challenge_method,
                })
                .await;
            match issued {
                Ok(code) => {
                    tracing::info!(
                        user_id = %user_id,
                        client_id = %validated.target.client.id,
                        "User granted consent"
                    );
                    redirect_with(&validated.target, vec![("code", code)])
                }
                Err(err) => AuthorizeRejection::Redirect(validated.target, err).into_response(),
            }
        }
        _ => AuthorizeRejection::Redirect(
            validated.target,
            OAuthError::InvalidRequest("action must be 'allow' or 'deny'".into()),
        )
        .into_response(),
    }
}

// =============================================================================
// Token endpoint
// =============================================================================

/// OAuth2 Token endpoint.
#[tracing::instrument(skip(state, headers, params), fields(grant_type = ?params.grant_type))]
#[utoipa::path(
    post,
    path = "/oauth/token",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Token",
    summary = "Exchange a grant for tokens",
    description = "**Supported grant types:**\n\
                   - `authorization_code`: redeem a single-use code (with `redirect_uri` and, when the code \
                   was issued with a challenge, `code_verifier`)\n\
                   - `refresh_token`: rotate a refresh token; the old pair is revoked\n\
                   - `client_credentials`: confidential clients acting for their owner; no refresh token\n\
                   - `urn:ietf:params:oauth:grant-type:device_code`: poll a device authorization\n\n\
                   **Client authentication:** HTTP Basic or `client_id`/`client_secret` form fields. \
                   Public clients send only `client_id`.\n\n\
                   Device polling errors follow RFC 8628: `authorization_pending`, `slow_down`, \
                   `access_denied`, `expired_token`.",
    request_body(
        content = TokenRequest,
        content_type = "application/x-www-form-urlencoded",
        description = "Token request parameters"
    ),
    responses(
        (status = 200, description = "Tokens issued", body = TokenResponse),
        (status = 400, description = "Invalid request, grant or scope", body = ErrorResponse),
        (status = 401, description = "Client authentication failed", body = ErrorResponse),
    )
)]
pub async fn token(
    State(state): State<OAuth2State>,
    peer: ClientPeer,
    headers: HeaderMap,
    Form(params): Form<TokenRequest>,
) -> Result<Response, OAuthError> {
    let grant_type = params
        .grant_type
        .as_deref()
        .ok_or_else(|| OAuthError::InvalidRequest("grant_type is required".into()))?;
    let grant = grant_type.parse::<GrantType>().map_err(|_| {
        OAuthError::UnsupportedGrantType(format!("grant_type '{grant_type}' is not supported"))
    })?;

    let client = authenticate_client(
        &state,
        peer,
        &headers,
        params.client_id.as_deref(),
        params.client_secret.as_deref(),
    )
    .await?;
    if !client.is_grant_type_allowed(grant) {
        return Err(OAuthError::UnauthorizedClient(format!(
            "Client is not allowed to use the {grant} grant"
        )));
    }

    let issued = match grant {
        GrantType::AuthorizationCode => {
            let code = params
                .code
                .as_deref()
                .ok_or_else(|| OAuthError::InvalidRequest("code is required".into()))?;
            state
                .tokens
                .exchange_code(
                    &client,
                    CodeExchange {
                        code,
                        redirect_uri: params.redirect_uri.as_deref(),
                        code_verifier: params.code_verifier.as_deref(),
                    },
                )
                .await?
        }
        GrantType::RefreshToken => {
            let refresh_token = params
                .refresh_token
                .as_deref()
                .ok_or_else(|| OAuthError::InvalidRequest("refresh_token is required".into()))?;
            let requested = parse_scope(params.scope.as_deref())?;
            state
                .tokens
                .refresh(&client, refresh_token, requested)
                .await?
        }
        GrantType::ClientCredentials => {
            let requested = parse_scope(params.scope.as_deref())?;
            state.tokens.client_credentials(&client, requested).await?
        }
        GrantType::DeviceCode => {
            let device_code = params
                .device_code
                .as_deref()
                .ok_or_else(|| OAuthError::InvalidRequest("device_code is required".into()))?;
            state
                .tokens
                .exchange_device_code(&state.device, &client, device_code)
                .await?
        }
    };

    Ok(no_store(Json(TokenResponse::from(issued))))
}

/// Attach `Cache-Control: no-store` (RFC 6749 §5.1).
pub(crate) fn no_store(body: impl IntoResponse) -> Response {
    let mut response = body.into_response();
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    response
}

/// Client credentials from HTTP Basic (preferred) or the form body.
fn extract_client_credentials(
    headers: &HeaderMap,
    form_client_id: Option<&str>,
    form_client_secret: Option<&str>,
) -> OAuthResult<(Option<String>, Option<String>)> {
    if let Some(auth) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
    {
        let malformed = || OAuthError::InvalidClient("Malformed Basic credentials".into());
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(auth.trim())
            .map_err(|_| malformed())?;
        let creds = String::from_utf8(decoded).map_err(|_| malformed())?;
        let (id, secret) = creds.split_once(':').ok_or_else(malformed)?;
        // RFC 6749 §2.3.1: both halves are form-urlencoded
        let id = urlencoding::decode(id).map_err(|_| malformed())?;
        let secret = urlencoding::decode(secret).map_err(|_| malformed())?;
        return Ok((Some(id.into_owned()), Some(secret.into_owned())));
    }

    Ok((
        form_client_id.map(str::to_string),
        form_client_secret.map(str::to_string),
    ))
}

/// Socket address of the caller, when the server was started with connect
/// info. Forwarding headers are not trusted here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientPeer(pub Option<IpAddr>);

impl<S> FromRequestParts<S> for ClientPeer
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip()),
        ))
    }
}

pub(crate) async fn authenticate_client(
    state: &OAuth2State,
    peer: ClientPeer,
    headers: &HeaderMap,
    form_client_id: Option<&str>,
    form_client_secret: Option<&str>,
) -> OAuthResult<oauth2_client::Model> {
    let (client_id, client_secret) =
        extract_client_credentials(headers, form_client_id, form_client_secret)?;
    let client_id = client_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| OAuthError::InvalidClient("Client authentication required".into()))?;
    state
        .registry
        .authenticate(&client_id, client_secret.as_deref(), peer.0)
        .await
}

// =============================================================================
// Revocation and metadata
// =============================================================================

/// Token revocation endpoint (RFC 7009).
#[tracing::instrument(skip(state, headers, params))]
#[utoipa::path(
    post,
    path = "/oauth/revoke",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Revoke Token",
    summary = "Revoke an access or refresh token",
    description = "Revokes the token pair containing the given access or refresh token.\n\n\
                   **Behavior:**\n\
                   - Returns 200 OK even if the token was already revoked or doesn't exist (per RFC 7009)\n\
                   - `token_type_hint` decides which column is checked first; unknown hints are ignored\n\
                   - Tokens issued to a different client are left untouched",
    request_body(
        content = RevokeRequest,
        content_type = "application/x-www-form-urlencoded",
        description = "Token revocation request"
    ),
    responses(
        (status = 200, description = "Token revoked (or was already invalid)"),
        (status = 400, description = "Missing token parameter", body = ErrorResponse),
        (status = 401, description = "Client authentication failed", body = ErrorResponse),
    )
)]
pub async fn revoke(
    State(state): State<OAuth2State>,
    peer: ClientPeer,
    headers: HeaderMap,
    Form(params): Form<RevokeRequest>,
) -> Result<StatusCode, OAuthError> {
    let client = authenticate_client(
        &state,
        peer,
        &headers,
        params.client_id.as_deref(),
        params.client_secret.as_deref(),
    )
    .await?;
    let token = params
        .token
        .as_deref()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| OAuthError::InvalidRequest("token is required".into()))?;

    let hint = TokenTypeHint::parse(params.token_type_hint.as_deref());
    if state.tokens.revoke(token, hint, &client.id).await? {
        tracing::info!(client_id = %client.id, "Token revoked");
    }
    Ok(StatusCode::OK)
}

/// Authorization server metadata (RFC 8414).
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/.well-known/oauth-authorization-server",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Server Metadata",
    summary = "Authorization server metadata",
    description = "Endpoint URLs, supported grant types, scopes and PKCE methods, for client discovery.",
    responses(
        (status = 200, description = "Authorization server metadata", body = AuthorizationServerMetadata),
    )
)]
pub async fn authorization_server_metadata(
    State(state): State<OAuth2State>,
) -> Json<AuthorizationServerMetadata> {
    let auth_methods = vec![
        "client_secret_basic".to_string(),
        "client_secret_post".to_string(),
        "none".to_string(),
    ];
    Json(AuthorizationServerMetadata {
        issuer: state.issuer().to_string(),
        authorization_endpoint: state.endpoint("/oauth/authorize"),
        token_endpoint: state.endpoint("/oauth/token"),
        revocation_endpoint: state.endpoint("/oauth/revoke"),
        device_authorization_endpoint: state.endpoint("/oauth/device_authorization"),
        response_types_supported: vec!["code".to_string()],
        grant_types_supported: GrantType::ALL
            .iter()
            .map(|g| g.wire_name().to_string())
            .collect(),
        scopes_supported: Scope::ALL.iter().map(|s| s.as_str().to_string()).collect(),
        token_endpoint_auth_methods_supported: auth_methods.clone(),
        revocation_endpoint_auth_methods_supported: auth_methods,
        code_challenge_methods_supported: vec![
            ChallengeMethod::S256.to_string(),
            ChallengeMethod::Plain.to_string(),
        ],
    })
}
