//! Who is the human at the other end of a browser request.
//!
//! Sign-in and session cookies belong to the web application in front of
//! this service. It tells us the authenticated user through a
//! [`SessionResolver`].

use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderName};

#[async_trait]
pub trait SessionResolver: Send + Sync {
    /// The signed-in user's id, or `None` for an anonymous request.
    async fn current_user(&self, headers: &HeaderMap) -> Option<String>;
}

/// Trusts a header set by the authenticating layer in front of this
/// service, which must strip any client-supplied copy.
#[derive(Clone, Debug)]
pub struct TrustedHeaderSessions {
    header: HeaderName,
}

impl TrustedHeaderSessions {
    pub fn new(header: HeaderName) -> Self {
        Self { header }
    }
}

#[async_trait]
impl SessionResolver for TrustedHeaderSessions {
    async fn current_user(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get(&self.header)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|user| !user.is_empty())
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[tokio::test]
    async fn reads_configured_header() {
        let sessions = TrustedHeaderSessions::new(HeaderName::from_static("x-authenticated-user"));
        let mut headers = HeaderMap::new();
        assert_eq!(sessions.current_user(&headers).await, None);

        headers.insert("x-authenticated-user", HeaderValue::from_static("  "));
        assert_eq!(sessions.current_user(&headers).await, None);

        headers.insert("x-authenticated-user", HeaderValue::from_static("user-42"));
        assert_eq!(sessions.current_user(&headers).await.as_deref(), Some("user-42"));
    }
}
