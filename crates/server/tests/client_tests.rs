//! Client registration rules and the client management endpoints.

mod common;

use axum::http::StatusCode;
use common::*;
use taskmgr_auth::error::OAuthError;
use taskmgr_auth::oauth2::clients::{ClientView, CreateClientResponse};
use taskmgr_auth::oauth2::endpoints::AuthorizationServerMetadata;
use taskmgr_auth::oauth2::{GrantType, NewClient};

fn new_client(is_public: bool, secret: Option<&str>) -> NewClient {
    NewClient {
        name: "Planner".into(),
        redirect_uris: vec![REDIRECT_URI.into()],
        grant_types: vec![GrantType::AuthorizationCode],
        scopes: scopes("profile"),
        owner_user_id: Some("owner-1".into()),
        is_public,
        secret: secret.map(str::to_string),
    }
}

#[tokio::test]
async fn test_public_client_has_no_secret() {
    let state = test_state().await;
    let registered = state
        .registry
        .register(new_client(true, None))
        .await
        .expect("register");
    assert!(registered.secret.is_none());
    assert!(registered.client.secret_hash.is_none());

    let result = state
        .registry
        .register(new_client(true, Some("Secret-That-Is-Long-Enough-1234567890")))
        .await;
    assert!(matches!(result, Err(OAuthError::InvalidRequest(_))));

    let mut with_cc = new_client(true, None);
    with_cc.grant_types.push(GrantType::ClientCredentials);
    assert!(matches!(
        state.registry.register(with_cc).await,
        Err(OAuthError::InvalidRequest(_))
    ));
}

#[tokio::test]
async fn test_confidential_secret_is_generated_and_hashed() {
    let state = test_state().await;
    let registered = state
        .registry
        .register(new_client(false, None))
        .await
        .expect("register");
    let secret = registered.secret.expect("generated secret");
    assert!(secret.len() >= 43);
    let hash = registered.client.secret_hash.expect("stored hash");
    assert_ne!(hash, secret);
    assert!(hash.starts_with("$argon2id$"));

    let client = state
        .registry
        .authenticate(&registered.client.id, Some(&secret), None)
        .await
        .expect("authenticate");
    assert_eq!(client.id, registered.client.id);
    assert!(matches!(
        state.registry.authenticate(&registered.client.id, None, None).await,
        Err(OAuthError::InvalidClient(_))
    ));
}

#[tokio::test]
async fn test_supplied_secret_must_be_strong() {
    let state = test_state().await;
    for weak in ["short", "alllowercaseletterssolongbutonlyoneclass"] {
        let result = state.registry.register(new_client(false, Some(weak))).await;
        assert!(matches!(result, Err(OAuthError::InvalidRequest(_))), "{weak}");
    }
    let strong = "correct-horse-battery-staple-42-and-more";
    let registered = state
        .registry
        .register(new_client(false, Some(strong)))
        .await
        .expect("register");
    assert_eq!(registered.secret.as_deref(), Some(strong));
}

#[tokio::test]
async fn test_unknown_client_fails_authentication() {
    let state = test_state().await;
    let result = state.registry.authenticate("ghost", Some("anything"), None).await;
    assert!(matches!(result, Err(OAuthError::InvalidClient(_))));
}

#[tokio::test]
async fn test_client_management_endpoints() {
    let state = test_state().await;
    let server = test_server(state.clone());
    let (name, value) = session("owner-9");

    let response = server
        .post("/oauth/clients")
        .add_header(name.clone(), value.clone())
        .json(&serde_json::json!({
            "name": "CLI",
            "redirect_uris": ["http://127.0.0.1:8765/callback"],
            "scope": "todos:read todos:write",
        }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let created: CreateClientResponse = response.json();
    assert!(created.client_secret.is_some());
    assert_eq!(
        created.client.grant_types,
        vec!["authorization_code".to_string(), "refresh_token".to_string()]
    );
    assert_eq!(created.client.scope, "todos:read todos:write");

    // The secret is shown once and never listed
    let response = server
        .get("/oauth/clients")
        .add_header(name.clone(), value.clone())
        .await;
    response.assert_status_ok();
    assert!(!response.text().contains("secret"));
    let listed: Vec<ClientView> = response.json();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].client_id, created.client.client_id);

    // Someone else cannot delete it
    let (other_name, other_value) = session("intruder");
    let response = server
        .delete(&format!("/oauth/clients/{}", created.client.client_id))
        .add_header(other_name, other_value)
        .await;
    response.assert_status(StatusCode::NOT_FOUND);

    let response = server
        .delete(&format!("/oauth/clients/{}", created.client.client_id))
        .add_header(name.clone(), value.clone())
        .await;
    response.assert_status(StatusCode::NO_CONTENT);
    assert!(
        state
            .registry
            .lookup(&created.client.client_id)
            .await
            .unwrap()
            .is_none()
    );

    let listed: Vec<ClientView> = server.get("/oauth/clients").add_header(name, value).await.json();
    assert!(listed.is_empty());
}

#[tokio::test]
async fn test_client_management_rejects_bad_input() {
    let state = test_state().await;
    let server = test_server(state);
    let (name, value) = session("owner-9");

    let response = server
        .post("/oauth/clients")
        .json(&serde_json::json!({ "name": "x", "redirect_uris": [REDIRECT_URI] }))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);

    let response = server
        .post("/oauth/clients")
        .add_header(name.clone(), value.clone())
        .json(&serde_json::json!({
            "name": "x",
            "redirect_uris": [REDIRECT_URI],
            "grant_types": ["implicit"],
        }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = server
        .post("/oauth/clients")
        .add_header(name, value)
        .json(&serde_json::json!({
            "name": "x",
            "redirect_uris": ["https://app.example/cb#fragment"],
        }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "invalid_request");
}

#[tokio::test]
async fn test_deactivation_revokes_issued_tokens() {
    let state = test_state().await;
    let client = confidential_client(&state).await.client;
    let issued = state
        .tokens
        .client_credentials(&client, None)
        .await
        .expect("issue");

    assert!(state.registry.deactivate(&client.id, "owner-1").await.unwrap());
    assert!(state.tokens.lookup_access_token(&issued.access_token).await.is_err());
    assert!(!state.registry.deactivate(&client.id, "owner-1").await.unwrap());
}

#[tokio::test]
async fn test_metadata_document() {
    let state = test_state().await;
    let server = test_server(state);

    let response = server.get("/.well-known/oauth-authorization-server").await;
    response.assert_status_ok();
    let metadata: AuthorizationServerMetadata = response.json();
    assert_eq!(metadata.issuer, ISSUER);
    assert_eq!(metadata.token_endpoint, "https://auth.example/oauth/token");
    assert!(
        metadata
            .grant_types_supported
            .contains(&"urn:ietf:params:oauth:grant-type:device_code".to_string())
    );
    assert!(!metadata.grant_types_supported.contains(&"password".to_string()));
    assert_eq!(metadata.code_challenge_methods_supported, vec!["S256", "plain"]);
    assert!(metadata.scopes_supported.contains(&"todos:read".to_string()));
}

#[tokio::test]
async fn test_health_and_api_docs() {
    let state = test_state().await;
    let server = test_server(state);

    let response = server.get("/healthz").await;
    response.assert_status_ok();
    response.assert_text("ok");

    server.get("/api-docs").await.assert_status_ok();
}
