use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration build error: {0}")]
    Build(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Authorization server settings. Lifetimes are in seconds.
#[derive(Clone, Debug, Deserialize)]
pub struct OAuth2Config {
    /// Public base URL of this server, used in metadata and device verification links
    pub issuer_url: String,
    /// Where unauthenticated users are sent from `/oauth/authorize` (`?next=` is appended)
    pub login_url: String,
    /// Request header carrying the authenticated user id, set by the session layer in front of us
    #[serde(default = "default_session_header")]
    pub session_header: String,
    #[serde(default = "default_access_token_lifetime")]
    pub access_token_lifetime: i64,
    #[serde(default = "default_refresh_token_lifetime")]
    pub refresh_token_lifetime: i64,
    #[serde(default = "default_authorization_code_lifetime")]
    pub authorization_code_lifetime: i64,
    #[serde(default = "default_device_code_lifetime")]
    pub device_code_lifetime: i64,
    /// Initial minimum polling interval handed to devices
    #[serde(default = "default_device_poll_interval")]
    pub device_poll_interval: i64,
    /// Added to a device's interval every time it polls too fast
    #[serde(default = "default_device_slow_down_step")]
    pub device_slow_down_step: i64,
    /// Failed client authentications tolerated per window before lockout (0 disables)
    #[serde(default = "default_client_auth_max_failures")]
    pub client_auth_max_failures: u32,
    #[serde(default = "default_client_auth_window")]
    pub client_auth_window: u64,
    /// How often expired codes, tokens and device grants are purged
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval: u64,
}

impl OAuth2Config {
    /// Settings with every default applied; handy for tests and embedding.
    pub fn new(issuer_url: impl Into<String>, login_url: impl Into<String>) -> Self {
        Self {
            issuer_url: issuer_url.into(),
            login_url: login_url.into(),
            session_header: default_session_header(),
            access_token_lifetime: default_access_token_lifetime(),
            refresh_token_lifetime: default_refresh_token_lifetime(),
            authorization_code_lifetime: default_authorization_code_lifetime(),
            device_code_lifetime: default_device_code_lifetime(),
            device_poll_interval: default_device_poll_interval(),
            device_slow_down_step: default_device_slow_down_step(),
            client_auth_max_failures: default_client_auth_max_failures(),
            client_auth_window: default_client_auth_window(),
            cleanup_interval: default_cleanup_interval(),
        }
    }

    /// URL the user visits to enter a device user code.
    pub fn verification_uri(&self) -> String {
        format!("{}/oauth/device", self.issuer_url.trim_end_matches('/'))
    }
}

fn default_session_header() -> String {
    "x-authenticated-user".to_string()
}

fn default_access_token_lifetime() -> i64 {
    3600 // 1 hour
}

fn default_refresh_token_lifetime() -> i64 {
    86400 * 7 // 7 days
}

fn default_authorization_code_lifetime() -> i64 {
    600 // 10 minutes
}

fn default_device_code_lifetime() -> i64 {
    1800 // 30 minutes
}

fn default_device_poll_interval() -> i64 {
    5
}

fn default_device_slow_down_step() -> i64 {
    5
}

fn default_client_auth_max_failures() -> u32 {
    10
}

fn default_client_auth_window() -> u64 {
    300
}

fn default_cleanup_interval() -> u64 {
    900
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    pub oauth2: OAuth2Config,
}

impl AppConfig {
    /// Reject settings that would make the server insecure or unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let o = &self.oauth2;
        if url::Url::parse(&o.issuer_url).is_err() {
            return Err(ConfigError::Validation(
                "oauth2.issuer_url must be an absolute URL".into(),
            ));
        }
        if o.login_url.is_empty() {
            return Err(ConfigError::Validation(
                "oauth2.login_url must not be empty".into(),
            ));
        }
        if o.session_header.is_empty()
            || axum::http::HeaderName::from_bytes(o.session_header.as_bytes()).is_err()
        {
            return Err(ConfigError::Validation(
                "oauth2.session_header must be a valid header name".into(),
            ));
        }
        for (name, value) in [
            ("access_token_lifetime", o.access_token_lifetime),
            ("refresh_token_lifetime", o.refresh_token_lifetime),
            ("authorization_code_lifetime", o.authorization_code_lifetime),
            ("device_code_lifetime", o.device_code_lifetime),
            ("device_poll_interval", o.device_poll_interval),
            ("device_slow_down_step", o.device_slow_down_step),
        ] {
            if value <= 0 {
                return Err(ConfigError::Validation(format!(
                    "oauth2.{name} must be > 0"
                )));
            }
        }
        Ok(())
    }
}

/// Load application configuration from `config.yaml` + environment overrides.
///
/// Any environment variable matching the key path separated by double
/// underscores (e.g. `OAUTH2__ACCESS_TOKEN_LIFETIME`) overrides the file value.
/// A `.env` file is read first when present.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    use config::{Config, Environment, File};

    let _ = dotenvy::dotenv();
    let cfg = Config::builder()
        .add_source(File::with_name("config.yaml").required(false))
        .add_source(Environment::default().separator("__"))
        .build()?;

    let app: AppConfig = cfg.try_deserialize()?;
    app.validate()?;
    Ok(app)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> AppConfig {
        AppConfig {
            database_url: "sqlite::memory:".into(),
            listen_addr: default_listen_addr(),
            oauth2: OAuth2Config::new("https://auth.example", "https://app.example/login"),
        }
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = base();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.oauth2.access_token_lifetime, 3600);
        assert_eq!(cfg.oauth2.authorization_code_lifetime, 600);
        assert_eq!(cfg.oauth2.device_code_lifetime, 1800);
    }

    #[test]
    fn rejects_relative_issuer() {
        let mut cfg = base();
        cfg.oauth2.issuer_url = "/auth".into();
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn rejects_non_positive_lifetimes() {
        let mut cfg = base();
        cfg.oauth2.device_poll_interval = 0;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("device_poll_interval"));
    }

    #[test]
    fn verification_uri_strips_trailing_slash() {
        let cfg = OAuth2Config::new("https://auth.example/", "/login");
        assert_eq!(cfg.verification_uri(), "https://auth.example/oauth/device");
    }
}
