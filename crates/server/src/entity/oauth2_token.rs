//! OAuth2 Token entity - an access token and (optionally) its refresh token.

use crate::oauth2::scope::ScopeSet;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "oauth2_token")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(unique)]
    pub access_token: String,
    /// Absent for client_credentials grants
    #[sea_orm(unique)]
    pub refresh_token: Option<String>,
    pub client_id: String,
    pub user_id: String,
    pub scope: String,
    /// Access token expiry
    pub expires_at: OffsetDateTime,
    pub refresh_expires_at: Option<OffsetDateTime>,
    pub revoked: bool,
    pub created_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Check if the access token has expired
    pub fn is_access_token_expired(&self) -> bool {
        OffsetDateTime::now_utc() >= self.expires_at
    }

    /// A missing refresh token counts as expired.
    pub fn is_refresh_token_expired(&self) -> bool {
        match self.refresh_expires_at {
            Some(expires_at) => OffsetDateTime::now_utc() >= expires_at,
            None => true,
        }
    }

    pub fn scope_set(&self) -> ScopeSet {
        ScopeSet::from_stored(&self.scope)
    }
}
