//! Shared fixtures: a migrated in-memory database, a fast hasher and a few
//! registered clients.

#![allow(dead_code)]

use argon2::Params;
use axum::http::{HeaderName, HeaderValue};
use axum_test::TestServer;
use migration::{Migrator, MigratorTrait};
use sea_orm::{ColumnTrait, Database, EntityTrait, QueryFilter, sea_query::Expr};
use std::sync::Arc;
use taskmgr_auth::config::OAuth2Config;
use taskmgr_auth::entity::{oauth2_authorization, oauth2_device_authorization, oauth2_token};
use taskmgr_auth::oauth2::secret::Argon2SecretHasher;
use taskmgr_auth::oauth2::session::TrustedHeaderSessions;
use taskmgr_auth::oauth2::{GrantType, NewClient, OAuth2State, RegisteredClient, ScopeSet};
use time::{Duration, OffsetDateTime};

pub const ISSUER: &str = "https://auth.example";
pub const LOGIN_URL: &str = "https://app.example/login";
pub const SESSION_HEADER: &str = "x-authenticated-user";
pub const REDIRECT_URI: &str = "https://app.example/cb";

pub fn test_config() -> OAuth2Config {
    OAuth2Config::new(ISSUER, LOGIN_URL)
}

pub async fn test_state() -> OAuth2State {
    test_state_with(test_config()).await
}

pub async fn test_state_with(config: OAuth2Config) -> OAuth2State {
    let db = Database::connect("sqlite::memory:").await.expect("connect");
    Migrator::up(&db, None).await.expect("migrate");

    let params = Params::new(8, 1, 1, None).expect("argon2 params");
    OAuth2State::with_components(
        Arc::new(db),
        config,
        Arc::new(Argon2SecretHasher::with_params(params)),
        Arc::new(TrustedHeaderSessions::new(HeaderName::from_static(
            SESSION_HEADER,
        ))),
    )
    .expect("build state")
}

pub fn test_server(state: OAuth2State) -> TestServer {
    TestServer::new(taskmgr_auth::api::app(state)).expect("create test server")
}

pub fn session(user_id: &str) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static(SESSION_HEADER),
        HeaderValue::from_str(user_id).expect("header value"),
    )
}

pub fn scopes(s: &str) -> ScopeSet {
    s.parse().expect("valid scopes")
}

/// Public SPA client registered for `REDIRECT_URI`.
pub async fn public_client(state: &OAuth2State) -> RegisteredClient {
    state
        .registry
        .register(NewClient {
            name: "Task SPA".into(),
            redirect_uris: vec![REDIRECT_URI.into()],
            grant_types: vec![GrantType::AuthorizationCode, GrantType::RefreshToken],
            scopes: scopes("profile todos:read todos:write"),
            owner_user_id: Some("owner-1".into()),
            is_public: true,
            secret: None,
        })
        .await
        .expect("register public client")
}

/// Confidential client with every grant type and a generated secret.
pub async fn confidential_client(state: &OAuth2State) -> RegisteredClient {
    state
        .registry
        .register(NewClient {
            name: "Task Sync Service".into(),
            redirect_uris: vec![REDIRECT_URI.into()],
            grant_types: GrantType::ALL.to_vec(),
            scopes: scopes("profile todos:read todos:write calendar:read"),
            owner_user_id: Some("owner-1".into()),
            is_public: false,
            secret: None,
        })
        .await
        .expect("register confidential client")
}

/// Move a code's expiry into the past.
pub async fn expire_code(state: &OAuth2State, code: &str) {
    oauth2_authorization::Entity::update_many()
        .col_expr(
            oauth2_authorization::Column::ExpiresAt,
            Expr::value(OffsetDateTime::now_utc() - Duration::seconds(1)),
        )
        .filter(oauth2_authorization::Column::Code.eq(code))
        .exec(state.db.as_ref())
        .await
        .expect("expire code");
}

pub async fn expire_access_token(state: &OAuth2State, access_token: &str) {
    oauth2_token::Entity::update_many()
        .col_expr(
            oauth2_token::Column::ExpiresAt,
            Expr::value(OffsetDateTime::now_utc() - Duration::seconds(1)),
        )
        .filter(oauth2_token::Column::AccessToken.eq(access_token))
        .exec(state.db.as_ref())
        .await
        .expect("expire access token");
}

pub async fn expire_refresh_token(state: &OAuth2State, refresh_token: &str) {
    oauth2_token::Entity::update_many()
        .col_expr(
            oauth2_token::Column::RefreshExpiresAt,
            Expr::value(OffsetDateTime::now_utc() - Duration::seconds(1)),
        )
        .filter(oauth2_token::Column::RefreshToken.eq(refresh_token))
        .exec(state.db.as_ref())
        .await
        .expect("expire refresh token");
}

/// Pretend the device last polled long enough ago.
pub async fn rewind_last_poll(state: &OAuth2State, device_code: &str) {
    oauth2_device_authorization::Entity::update_many()
        .col_expr(
            oauth2_device_authorization::Column::LastPollAt,
            Expr::value(OffsetDateTime::now_utc() - Duration::hours(1)),
        )
        .filter(oauth2_device_authorization::Column::DeviceCode.eq(device_code))
        .exec(state.db.as_ref())
        .await
        .expect("rewind last poll");
}

pub async fn device_row(state: &OAuth2State, device_code: &str) -> oauth2_device_authorization::Model {
    oauth2_device_authorization::Entity::find_by_id(device_code)
        .one(state.db.as_ref())
        .await
        .expect("query")
        .expect("device row")
}
