//! OAuth2 Authorization Server module.
//!
//! The authorization server for the task manager's API clients.
//!
//! ## Supported Flows
//!
//! - Authorization Code with PKCE (required for public clients)
//! - Refresh Token, rotated on every use
//! - Client Credentials
//! - Device Authorization Grant (RFC 8628)
//!
//! ## Endpoints
//!
//! - `GET|POST /oauth/authorize` - Consent page and decision
//! - `POST /oauth/token` - Token endpoint
//! - `POST /oauth/device_authorization` - Device flow initiation
//! - `GET|POST /oauth/device` - Device verification
//! - `POST /oauth/revoke` - Token revocation
//! - `GET|POST /oauth/clients`, `DELETE /oauth/clients/{id}` - Client management
//! - `GET /.well-known/oauth-authorization-server` - Server metadata

pub mod authorization;
pub mod cleanup;
pub mod clients;
pub mod consent;
pub mod device;
pub mod device_endpoints;
pub mod endpoints;
pub mod pkce;
pub mod registrar;
pub mod scope;
pub mod secret;
pub mod session;
mod state;
pub mod throttle;
pub mod tokens;

pub use cleanup::spawn_cleanup_task;
pub use registrar::{ClientRegistry, NewClient, RegisteredClient};
pub use scope::{GrantType, Scope, ScopeSet};
pub use state::{OAuth2State, StateError};
pub use tokens::{AccessTokenInfo, TokenService};

use utoipa_axum::router::OpenApiRouter;

/// OpenAPI tag for OAuth2 endpoints
pub const OAUTH2_TAG: &str = "OAuth2";

/// Every authorization server route.
pub fn router(state: OAuth2State) -> OpenApiRouter {
    OpenApiRouter::new()
        .merge(endpoints::router(state.clone()))
        .merge(device_endpoints::router(state.clone()))
        .merge(clients::router(state))
}
