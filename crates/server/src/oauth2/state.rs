//! OAuth2 state management.
//!
//! Bundles the authorization server's components for use as axum state.

use crate::config::OAuth2Config;
use crate::oauth2::authorization::AuthorizationCodes;
use crate::oauth2::device::DeviceFlow;
use crate::oauth2::registrar::ClientRegistry;
use crate::oauth2::secret::{Argon2SecretHasher, SecretError, SecretHasher};
use crate::oauth2::session::{SessionResolver, TrustedHeaderSessions};
use crate::oauth2::throttle::ClientAuthThrottle;
use crate::oauth2::tokens::TokenService;
use axum::http::{HeaderName, header::InvalidHeaderName};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    #[error(transparent)]
    Secret(#[from] SecretError),
    #[error("invalid session header name: {0}")]
    SessionHeader(#[from] InvalidHeaderName),
}

/// OAuth2 state containing all components needed for the authorization server.
#[derive(Clone)]
pub struct OAuth2State {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<OAuth2Config>,
    pub registry: ClientRegistry,
    pub codes: AuthorizationCodes,
    pub tokens: TokenService,
    pub device: DeviceFlow,
    pub throttle: ClientAuthThrottle,
    pub sessions: Arc<dyn SessionResolver>,
}

impl OAuth2State {
    /// Argon2id secrets and header-based sessions.
    pub fn new(db: Arc<DatabaseConnection>, config: OAuth2Config) -> Result<Self, StateError> {
        let sessions = TrustedHeaderSessions::new(HeaderName::from_bytes(
            config.session_header.as_bytes(),
        )?);
        Self::with_components(
            db,
            config,
            Arc::new(Argon2SecretHasher::new()),
            Arc::new(sessions),
        )
    }

    pub fn with_components(
        db: Arc<DatabaseConnection>,
        config: OAuth2Config,
        hasher: Arc<dyn SecretHasher>,
        sessions: Arc<dyn SessionResolver>,
    ) -> Result<Self, StateError> {
        let throttle = ClientAuthThrottle::new(
            config.client_auth_max_failures,
            Duration::from_secs(config.client_auth_window),
        );
        let registry = ClientRegistry::new(db.clone(), hasher, throttle.clone())?;
        let codes = AuthorizationCodes::new(db.clone(), config.authorization_code_lifetime);
        let tokens = TokenService::new(
            db.clone(),
            config.access_token_lifetime,
            config.refresh_token_lifetime,
        );
        let device = DeviceFlow::new(
            db.clone(),
            config.device_code_lifetime,
            config.device_poll_interval,
            config.device_slow_down_step,
            config.verification_uri(),
        );

        Ok(Self {
            db,
            config: Arc::new(config),
            registry,
            codes,
            tokens,
            device,
            throttle,
            sessions,
        })
    }

    /// Issuer URL without a trailing slash.
    pub fn issuer(&self) -> &str {
        self.config.issuer_url.trim_end_matches('/')
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.issuer(), path)
    }
}
