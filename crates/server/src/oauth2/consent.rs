//! HTML views for the authorization and device verification pages.

use crate::oauth2::scope::ScopeSet;
use askama::Template;
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};

/// Scope information for display.
#[derive(Debug, Clone)]
pub struct ScopeView {
    pub name: &'static str,
    pub description: &'static str,
}

pub fn scope_views(scopes: &ScopeSet) -> Vec<ScopeView> {
    scopes
        .iter()
        .map(|scope| ScopeView {
            name: scope.as_str(),
            description: scope.description(),
        })
        .collect()
}

/// Consent page template.
#[derive(Template)]
#[template(path = "consent.html")]
pub struct ConsentTemplate {
    pub client_name: String,
    pub user_id: String,
    pub scopes: Vec<ScopeView>,
    pub action_url: String,
    /// Authorization request parameters echoed back on submit
    pub hidden_fields: Vec<(String, String)>,
    pub redirect_host: String,
}

/// A pending device grant as shown to the user.
#[derive(Debug, Clone)]
pub struct DeviceGrantView {
    pub client_name: String,
    pub user_code: String,
    pub scopes: Vec<ScopeView>,
}

#[derive(Template)]
#[template(path = "device.html")]
pub struct DeviceTemplate {
    pub user_id: String,
    pub action_url: String,
    pub grant: Option<DeviceGrantView>,
    pub message: Option<String>,
}

#[derive(Template)]
#[template(path = "error.html")]
struct ErrorTemplate<'a> {
    message: &'a str,
}

/// Render a template, falling back to a plain 500 if rendering fails.
pub fn render<T: Template>(template: &T) -> Response {
    match template.render() {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            tracing::error!("Failed to render template: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
        }
    }
}

/// Render a simple error page.
pub fn render_error(status: StatusCode, message: &str) -> Response {
    let mut response = render(&ErrorTemplate { message });
    if response.status().is_success() {
        *response.status_mut() = status;
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consent_page_lists_scopes_and_escapes_values() {
        let scopes: ScopeSet = "todos:read calendar:write".parse().unwrap();
        let page = ConsentTemplate {
            client_name: "<Planner>".into(),
            user_id: "user-1".into(),
            scopes: scope_views(&scopes),
            action_url: "/oauth/authorize".into(),
            hidden_fields: vec![("state".into(), "\"xyz\"".into())],
            redirect_host: "app.example".into(),
        }
        .render()
        .unwrap();

        assert!(page.contains("View your todos"));
        assert!(page.contains("Reschedule items on your calendar"));
        assert!(page.contains("&lt;Planner&gt;"));
        assert!(!page.contains("\"xyz\""));
        assert!(page.contains("value=\"allow\""));
    }

    #[test]
    fn device_page_without_grant_shows_entry_form() {
        let page = DeviceTemplate {
            user_id: "user-1".into(),
            action_url: "/oauth/device".into(),
            grant: None,
            message: Some("That code is invalid or has expired.".into()),
        }
        .render()
        .unwrap();
        assert!(page.contains("name=\"user_code\""));
        assert!(page.contains("invalid or has expired"));
    }
}
