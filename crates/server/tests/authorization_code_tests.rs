//! Authorization code flow: the authorize endpoint, PKCE and single-use
//! redemption.

mod common;

use axum::http::{StatusCode, header};
use common::*;
use taskmgr_auth::error::OAuthError;
use taskmgr_auth::oauth2::authorization::CodeRequest;
use taskmgr_auth::oauth2::endpoints::TokenResponse;
use taskmgr_auth::oauth2::pkce::{self, ChallengeMethod};
use taskmgr_auth::oauth2::tokens::CodeExchange;

const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
const CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

fn location(response: &axum_test::TestResponse) -> url::Url {
    let value = response.header(header::LOCATION);
    url::Url::parse(value.to_str().expect("ascii location")).expect("absolute location")
}

fn query_param(url: &url::Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

// =============================================================================
// Authorization endpoint
// =============================================================================

#[tokio::test]
async fn test_anonymous_user_is_sent_to_login() {
    let state = test_state().await;
    let client = public_client(&state).await.client;
    let server = test_server(state);

    let response = server
        .get("/oauth/authorize")
        .add_query_param("response_type", "code")
        .add_query_param("client_id", &client.id)
        .add_query_param("code_challenge", CHALLENGE)
        .add_query_param("code_challenge_method", "S256")
        .add_query_param("state", "xyz")
        .await;

    response.assert_status(StatusCode::FOUND);
    let login = location(&response);
    assert!(login.as_str().starts_with(LOGIN_URL));
    let next = query_param(&login, "next").expect("next parameter");
    assert!(next.starts_with("https://auth.example/oauth/authorize?"));
    assert!(next.contains("state=xyz"));
}

#[tokio::test]
async fn test_signed_in_user_sees_consent_page() {
    let state = test_state().await;
    let client = public_client(&state).await.client;
    let server = test_server(state);
    let (name, value) = session("user-1");

    let response = server
        .get("/oauth/authorize")
        .add_header(name, value)
        .add_query_param("response_type", "code")
        .add_query_param("client_id", &client.id)
        .add_query_param("redirect_uri", REDIRECT_URI)
        .add_query_param("scope", "todos:read")
        .add_query_param("code_challenge", CHALLENGE)
        .add_query_param("code_challenge_method", "S256")
        .await;

    response.assert_status_ok();
    let html = response.text();
    assert!(html.contains("Task SPA"));
    assert!(html.contains("View your todos"));
    assert!(!html.contains("Create, edit and complete your todos"));
}

#[tokio::test]
async fn test_unknown_client_is_not_redirected() {
    let state = test_state().await;
    let server = test_server(state);

    let response = server
        .get("/oauth/authorize")
        .add_query_param("response_type", "code")
        .add_query_param("client_id", "nope")
        .add_query_param("redirect_uri", REDIRECT_URI)
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "invalid_client");
}

#[tokio::test]
async fn test_unregistered_redirect_uri_is_not_redirected() {
    let state = test_state().await;
    let client = public_client(&state).await.client;
    let server = test_server(state);

    for uri in [
        "https://app.example/cb/",
        "https://app.example/cb?x=1",
        "https://evil.example/cb",
    ] {
        let response = server
            .get("/oauth/authorize")
            .add_query_param("response_type", "code")
            .add_query_param("client_id", &client.id)
            .add_query_param("redirect_uri", uri)
            .add_query_param("code_challenge", CHALLENGE)
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: serde_json::Value = response.json();
        assert_eq!(body["error"], "invalid_request", "uri {uri}");
    }
}

#[tokio::test]
async fn test_errors_after_trusted_redirect_go_to_client() {
    let state = test_state().await;
    let client = public_client(&state).await.client;
    let server = test_server(state);
    let (name, value) = session("user-1");

    // Public client without PKCE
    let response = server
        .get("/oauth/authorize")
        .add_header(name.clone(), value.clone())
        .add_query_param("response_type", "code")
        .add_query_param("client_id", &client.id)
        .add_query_param("state", "s1")
        .await;
    response.assert_status(StatusCode::FOUND);
    let target = location(&response);
    assert!(target.as_str().starts_with(REDIRECT_URI));
    assert_eq!(query_param(&target, "error").as_deref(), Some("invalid_request"));
    assert_eq!(query_param(&target, "state").as_deref(), Some("s1"));

    // Implicit flow is not offered
    let response = server
        .get("/oauth/authorize")
        .add_header(name.clone(), value.clone())
        .add_query_param("response_type", "token")
        .add_query_param("client_id", &client.id)
        .add_query_param("code_challenge", CHALLENGE)
        .await;
    let target = location(&response);
    assert_eq!(
        query_param(&target, "error").as_deref(),
        Some("unsupported_response_type")
    );

    // Scope outside the client's registration
    let response = server
        .get("/oauth/authorize")
        .add_header(name.clone(), value.clone())
        .add_query_param("response_type", "code")
        .add_query_param("client_id", &client.id)
        .add_query_param("scope", "wiki:write")
        .add_query_param("code_challenge", CHALLENGE)
        .await;
    let target = location(&response);
    assert_eq!(query_param(&target, "error").as_deref(), Some("invalid_scope"));

    // Unsupported PKCE method
    let response = server
        .get("/oauth/authorize")
        .add_header(name, value)
        .add_query_param("response_type", "code")
        .add_query_param("client_id", &client.id)
        .add_query_param("code_challenge", CHALLENGE)
        .add_query_param("code_challenge_method", "S512")
        .await;
    let target = location(&response);
    assert_eq!(query_param(&target, "error").as_deref(), Some("invalid_request"));
}

#[tokio::test]
async fn test_consent_denied_redirects_with_access_denied() {
    let state = test_state().await;
    let client = public_client(&state).await.client;
    let server = test_server(state);
    let (name, value) = session("user-1");

    let response = server
        .post("/oauth/authorize")
        .add_header(name, value)
        .form(&[
            ("response_type", "code"),
            ("client_id", client.id.as_str()),
            ("redirect_uri", REDIRECT_URI),
            ("code_challenge", CHALLENGE),
            ("code_challenge_method", "S256"),
            ("state", "abc"),
            ("action", "deny"),
        ])
        .await;

    response.assert_status(StatusCode::FOUND);
    let target = location(&response);
    assert_eq!(query_param(&target, "error").as_deref(), Some("access_denied"));
    assert_eq!(query_param(&target, "state").as_deref(), Some("abc"));
    assert!(query_param(&target, "code").is_none());
}

#[tokio::test]
async fn test_consent_post_requires_session() {
    let state = test_state().await;
    let client = public_client(&state).await.client;
    let server = test_server(state);

    let response = server
        .post("/oauth/authorize")
        .form(&[
            ("response_type", "code"),
            ("client_id", client.id.as_str()),
            ("code_challenge", CHALLENGE),
            ("action", "allow"),
        ])
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "login_required");
}

/// The end-to-end example: public client, S256, consent, then redemption.
#[tokio::test]
async fn test_public_client_s256_flow_issues_bearer_token() {
    let state = test_state().await;
    let client = public_client(&state).await.client;
    let server = test_server(state);
    let (name, value) = session("user-1");

    let response = server
        .post("/oauth/authorize")
        .add_header(name, value)
        .form(&[
            ("response_type", "code"),
            ("client_id", client.id.as_str()),
            ("redirect_uri", REDIRECT_URI),
            ("scope", "todos:read"),
            ("code_challenge", CHALLENGE),
            ("code_challenge_method", "S256"),
            ("state", "st"),
            ("action", "allow"),
        ])
        .await;
    response.assert_status(StatusCode::FOUND);
    let target = location(&response);
    assert_eq!(query_param(&target, "state").as_deref(), Some("st"));
    let code = query_param(&target, "code").expect("code in redirect");
    assert!(code.len() >= 43);

    let response = server
        .post("/oauth/token")
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("redirect_uri", REDIRECT_URI),
            ("client_id", client.id.as_str()),
            ("code_verifier", VERIFIER),
        ])
        .await;

    response.assert_status_ok();
    assert_eq!(
        response.header(header::CACHE_CONTROL).to_str().unwrap(),
        "no-store"
    );
    let tokens: TokenResponse = response.json();
    assert_eq!(tokens.token_type, "Bearer");
    assert!(tokens.access_token.len() >= 64);
    assert_eq!(tokens.expires_in, 3600);
    assert_eq!(tokens.scope, "todos:read");
    assert!(tokens.refresh_token.is_some());

    // The same code is now spent
    let replay = server
        .post("/oauth/token")
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("redirect_uri", REDIRECT_URI),
            ("client_id", client.id.as_str()),
            ("code_verifier", VERIFIER),
        ])
        .await;
    replay.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = replay.json();
    assert_eq!(body["error"], "invalid_grant");
}

// =============================================================================
// Redemption
// =============================================================================

async fn issue_code(
    state: &taskmgr_auth::oauth2::OAuth2State,
    client_id: &str,
    challenge: Option<(&str, ChallengeMethod)>,
) -> String {
    let scope = scopes("todos:read");
    state
        .codes
        .issue(CodeRequest {
            client_id,
            user_id: "user-1",
            redirect_uri: REDIRECT_URI,
            scopes: &scope,
            code_challenge: challenge.map(|(c, _)| c),
            code_challenge_method: challenge.map(|(_, m)| m),
        })
        .await
        .expect("issue code")
}

#[tokio::test]
async fn test_concurrent_redemptions_yield_one_token_set() {
    let state = test_state().await;
    let client = confidential_client(&state).await.client;
    let code = issue_code(&state, &client.id, None).await;

    let exchange = CodeExchange {
        code: &code,
        redirect_uri: Some(REDIRECT_URI),
        code_verifier: None,
    };
    let (first, second) = tokio::join!(
        state.tokens.exchange_code(&client, exchange),
        state.tokens.exchange_code(&client, exchange),
    );

    let successes = [first.is_ok(), second.is_ok()]
        .iter()
        .filter(|ok| **ok)
        .count();
    assert_eq!(successes, 1);
    let failure = first.err().or(second.err()).expect("one failure");
    assert!(matches!(failure, OAuthError::InvalidGrant(_)));
}

#[tokio::test]
async fn test_expired_code_is_rejected() {
    let state = test_state().await;
    let client = confidential_client(&state).await.client;
    let code = issue_code(&state, &client.id, None).await;
    expire_code(&state, &code).await;

    let result = state
        .tokens
        .exchange_code(
            &client,
            CodeExchange {
                code: &code,
                redirect_uri: Some(REDIRECT_URI),
                code_verifier: None,
            },
        )
        .await;
    assert!(matches!(result, Err(OAuthError::InvalidGrant(_))));
}

#[tokio::test]
async fn test_code_is_bound_to_its_client() {
    let state = test_state().await;
    let owner = confidential_client(&state).await.client;
    let other = public_client(&state).await.client;
    let code = issue_code(&state, &owner.id, None).await;

    let result = state
        .tokens
        .exchange_code(
            &other,
            CodeExchange {
                code: &code,
                redirect_uri: Some(REDIRECT_URI),
                code_verifier: None,
            },
        )
        .await;
    assert!(matches!(result, Err(OAuthError::InvalidGrant(_))));
}

#[tokio::test]
async fn test_standalone_consume_is_single_use() {
    let state = test_state().await;
    let owner = confidential_client(&state).await.client;
    let other = public_client(&state).await.client;
    let code = issue_code(&state, &owner.id, None).await;

    assert!(matches!(
        state.codes.consume(&code, &other.id).await,
        Err(OAuthError::InvalidGrant(_))
    ));
    let grant = state
        .codes
        .consume(&code, &owner.id)
        .await
        .expect("first consume");
    assert!(grant.used);
    assert_eq!(grant.user_id, "user-1");
    assert_eq!(grant.scope, "todos:read");
    assert!(matches!(
        state.codes.consume(&code, &owner.id).await,
        Err(OAuthError::InvalidGrant(_))
    ));
}

#[tokio::test]
async fn test_redirect_uri_must_match_exactly() {
    let state = test_state().await;
    let client = confidential_client(&state).await.client;
    let code = issue_code(&state, &client.id, None).await;

    for uri in ["https://app.example/cb/", "https://app.example/cb?a=b"] {
        let result = state
            .tokens
            .exchange_code(
                &client,
                CodeExchange {
                    code: &code,
                    redirect_uri: Some(uri),
                    code_verifier: None,
                },
            )
            .await;
        assert!(matches!(result, Err(OAuthError::InvalidGrant(_))), "uri {uri}");
    }

    let missing = state
        .tokens
        .exchange_code(
            &client,
            CodeExchange {
                code: &code,
                redirect_uri: None,
                code_verifier: None,
            },
        )
        .await;
    assert!(matches!(missing, Err(OAuthError::InvalidRequest(_))));

    // Failed attempts rolled back; the code is still redeemable
    let ok = state
        .tokens
        .exchange_code(
            &client,
            CodeExchange {
                code: &code,
                redirect_uri: Some(REDIRECT_URI),
                code_verifier: None,
            },
        )
        .await;
    assert!(ok.is_ok());
}

#[tokio::test]
async fn test_pkce_verification_rules() {
    let state = test_state().await;
    let client = public_client(&state).await.client;
    let code = issue_code(&state, &client.id, Some((CHALLENGE, ChallengeMethod::S256))).await;

    let attempt = |verifier: Option<&'static str>| {
        let client = client.clone();
        let code = code.clone();
        let tokens = state.tokens.clone();
        async move {
            tokens
                .exchange_code(
                    &client,
                    CodeExchange {
                        code: &code,
                        redirect_uri: Some(REDIRECT_URI),
                        code_verifier: verifier,
                    },
                )
                .await
        }
    };

    assert!(matches!(attempt(None).await, Err(OAuthError::InvalidRequest(_))));
    assert!(matches!(
        attempt(Some("too-short")).await,
        Err(OAuthError::InvalidGrant(_))
    ));
    assert!(matches!(
        attempt(Some("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa")).await,
        Err(OAuthError::InvalidGrant(_))
    ));
    let tokens = attempt(Some(VERIFIER)).await.expect("correct verifier");
    assert_eq!(tokens.user_id, "user-1");
}

#[tokio::test]
async fn test_plain_challenge_compares_directly() {
    let state = test_state().await;
    let client = public_client(&state).await.client;
    let verifier = "plain-verifier-with-enough-characters-to-be-valid";
    let code = issue_code(&state, &client.id, Some((verifier, ChallengeMethod::Plain))).await;

    let result = state
        .tokens
        .exchange_code(
            &client,
            CodeExchange {
                code: &code,
                redirect_uri: Some(REDIRECT_URI),
                code_verifier: Some(verifier),
            },
        )
        .await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_verifier_without_challenge_is_rejected() {
    let state = test_state().await;
    let client = confidential_client(&state).await.client;
    let code = issue_code(&state, &client.id, None).await;

    let result = state
        .tokens
        .exchange_code(
            &client,
            CodeExchange {
                code: &code,
                redirect_uri: Some(REDIRECT_URI),
                code_verifier: Some(VERIFIER),
            },
        )
        .await;
    assert!(matches!(result, Err(OAuthError::InvalidGrant(_))));
}

#[test]
fn test_s256_reference_vector() {
    assert_eq!(pkce::s256_challenge(VERIFIER), CHALLENGE);
}
