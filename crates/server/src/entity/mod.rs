//! SeaORM entities for the authorization server tables.

pub mod oauth2_authorization;
pub mod oauth2_client;
pub mod oauth2_device_authorization;
pub mod oauth2_token;
