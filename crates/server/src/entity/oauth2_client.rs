//! OAuth2 Client entity.

use crate::oauth2::scope::{GrantType, ScopeSet};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "oauth2_client")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    /// Human-readable client name
    pub name: String,
    /// Argon2 PHC hash of the client secret (None for public clients)
    #[serde(skip_serializing)]
    pub secret_hash: Option<String>,
    /// Whether this is a public client (no secret required)
    pub is_public: bool,
    /// JSON array of allowed redirect URIs
    pub redirect_uris: String,
    /// Space-separated list of allowed grant types
    pub grant_types: String,
    /// Space-separated list of allowed scopes
    pub scopes: String,
    /// User who registered the client; the identity used for client_credentials
    pub owner_user_id: Option<String>,
    pub is_active: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Parse redirect URIs from JSON string
    pub fn redirect_uris_list(&self) -> Vec<String> {
        serde_json::from_str(&self.redirect_uris).unwrap_or_default()
    }

    pub fn grant_types_list(&self) -> Vec<GrantType> {
        self.grant_types
            .split_whitespace()
            .filter_map(|g| g.parse().ok())
            .collect()
    }

    pub fn scope_set(&self) -> ScopeSet {
        ScopeSet::from_stored(&self.scopes)
    }

    /// Exact string match against the registered URIs (no normalisation).
    pub fn is_redirect_uri_allowed(&self, uri: &str) -> bool {
        self.redirect_uris_list()
            .iter()
            .any(|allowed| allowed == uri)
    }

    pub fn is_grant_type_allowed(&self, grant_type: GrantType) -> bool {
        self.grant_types_list().contains(&grant_type)
    }
}
