//! OpenAPI/Utoipa configuration.

use crate::api::health::MISC_TAG;
use crate::oauth2::{OAUTH2_TAG, Scope};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{
        AuthorizationCode, ClientCredentials, Flow, HttpAuthScheme, HttpBuilder, OAuth2, Scopes,
        SecurityScheme,
    },
};

/// Security schemes for the OpenAPI document.
pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            let bearer = HttpBuilder::new()
                .scheme(HttpAuthScheme::Bearer)
                .description(Some("Opaque access token issued by `/oauth/token`."))
                .build();
            components.add_security_scheme("Authorization", SecurityScheme::Http(bearer));

            let scopes = || Scopes::from_iter(Scope::ALL.map(|s| (s.as_str(), s.description())));
            let oauth2 = OAuth2::new([
                Flow::AuthorizationCode(AuthorizationCode::new(
                    "/oauth/authorize",
                    "/oauth/token",
                    scopes(),
                )),
                Flow::ClientCredentials(ClientCredentials::new("/oauth/token", scopes())),
            ]);
            components.add_security_scheme("OAuth2", SecurityScheme::OAuth2(oauth2));
        }
    }
}

/// OpenAPI documentation configuration.
#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    info(
        title = "Task Manager Authorization Server",
        version = "1.0.0",
        description = "OAuth 2.0 authorization server for task manager API clients: authorization code with \
                       PKCE, refresh token rotation, client credentials and the device authorization grant."
    ),
    tags(
        (name = MISC_TAG, description = "Miscellaneous endpoints"),
        (name = OAUTH2_TAG, description = "OAuth2 authorization server endpoints")
    )
)]
pub struct ApiDoc;
