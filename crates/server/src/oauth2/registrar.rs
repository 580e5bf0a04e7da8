//! Database-backed OAuth2 client registry.
//!
//! Owns client registration, lookup and authentication. Secrets are only
//! ever stored hashed; the plaintext leaves this module once, on creation.

use crate::entity::{oauth2_client, oauth2_token};
use crate::error::{OAuthError, OAuthResult};
use crate::oauth2::scope::{GrantType, ScopeSet, grant_types_to_string};
use crate::oauth2::secret::{self, SecretError, SecretHasher};
use crate::oauth2::throttle::ClientAuthThrottle;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder, TransactionTrait, sea_query::Expr,
};
use std::net::IpAddr;
use std::sync::Arc;
use time::OffsetDateTime;

/// Registration input. `secret` is optional for confidential clients; one is
/// generated when absent.
#[derive(Debug, Clone)]
pub struct NewClient {
    pub name: String,
    pub redirect_uris: Vec<String>,
    pub grant_types: Vec<GrantType>,
    pub scopes: ScopeSet,
    pub owner_user_id: Option<String>,
    pub is_public: bool,
    pub secret: Option<String>,
}

/// A freshly created client together with its plaintext secret.
#[derive(Debug, Clone)]
pub struct RegisteredClient {
    pub client: oauth2_client::Model,
    pub secret: Option<String>,
}

#[derive(Clone)]
pub struct ClientRegistry {
    db: Arc<DatabaseConnection>,
    hasher: Arc<dyn SecretHasher>,
    throttle: ClientAuthThrottle,
    /// Verified against when the client is unknown so both paths cost one hash
    dummy_hash: Arc<str>,
}

impl ClientRegistry {
    pub fn new(
        db: Arc<DatabaseConnection>,
        hasher: Arc<dyn SecretHasher>,
        throttle: ClientAuthThrottle,
    ) -> Result<Self, SecretError> {
        let dummy = secret::random_token(secret::CODE_BYTES)?;
        let dummy_hash = hasher.hash(&dummy)?;
        Ok(Self {
            db,
            hasher,
            throttle,
            dummy_hash: dummy_hash.into(),
        })
    }

    #[tracing::instrument(skip(self, new), fields(name = %new.name, is_public = new.is_public))]
    pub async fn register(&self, new: NewClient) -> OAuthResult<RegisteredClient> {
        validate_redirect_uris(&new.redirect_uris)?;

        let grant_types = if new.grant_types.is_empty() {
            vec![GrantType::AuthorizationCode]
        } else {
            new.grant_types
        };

        let (secret_hash, plaintext) = if new.is_public {
            if new.secret.is_some() {
                return Err(OAuthError::InvalidRequest(
                    "Public clients must not have a secret".into(),
                ));
            }
            if grant_types.contains(&GrantType::ClientCredentials) {
                return Err(OAuthError::InvalidRequest(
                    "Public clients cannot use the client_credentials grant".into(),
                ));
            }
            (None, None)
        } else {
            let plaintext = match new.secret {
                Some(supplied) => {
                    if !secret::is_strong_secret(&supplied) {
                        return Err(OAuthError::InvalidRequest(format!(
                            "Client secret must be at least {} characters and mix at least two of lowercase, uppercase, digits and symbols",
                            secret::MIN_SECRET_LEN
                        )));
                    }
                    supplied
                }
                None => secret::random_token(secret::CODE_BYTES)?,
            };
            (Some(self.hasher.hash(&plaintext)?), Some(plaintext))
        };

        let redirect_uris = serde_json::to_string(&new.redirect_uris)
            .map_err(|e| OAuthError::ServerError(e.to_string()))?;
        let now = OffsetDateTime::now_utc();
        let client = oauth2_client::ActiveModel {
            id: Set(uuid::Uuid::new_v4().to_string()),
            name: Set(new.name),
            secret_hash: Set(secret_hash),
            is_public: Set(new.is_public),
            redirect_uris: Set(redirect_uris),
            grant_types: Set(grant_types_to_string(&grant_types)),
            scopes: Set(new.scopes.to_string()),
            owner_user_id: Set(new.owner_user_id),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db.as_ref())
        .await?;

        tracing::info!(client_id = %client.id, "Registered OAuth2 client");

        Ok(RegisteredClient {
            client,
            secret: plaintext,
        })
    }

    /// Find an active client. Deactivated clients are reported as absent.
    pub async fn lookup(&self, client_id: &str) -> Result<Option<oauth2_client::Model>, DbErr> {
        Ok(oauth2_client::Entity::find_by_id(client_id)
            .one(self.db.as_ref())
            .await?
            .filter(|client| client.is_active))
    }

    /// Authenticate a client at the token endpoint.
    ///
    /// Public clients succeed on identity alone. Confidential clients must
    /// present a secret matching the stored hash. Unknown clients still pay
    /// for one hash verification. Failures are counted per client and
    /// `peer`, and only for clients that exist.
    #[tracing::instrument(skip(self, secret))]
    pub async fn authenticate(
        &self,
        client_id: &str,
        secret: Option<&str>,
        peer: Option<IpAddr>,
    ) -> OAuthResult<oauth2_client::Model> {
        if self.throttle.is_locked(client_id, peer) {
            tracing::warn!(client_id, ?peer, "Client authentication locked out");
            return Err(OAuthError::InvalidClient(
                "Too many failed authentication attempts".into(),
            ));
        }

        let client = self.lookup(client_id).await?;
        let verified = match (&client, secret) {
            (Some(c), _) if c.is_public => true,
            (Some(c), Some(provided)) => match &c.secret_hash {
                Some(hash) => self.hasher.verify(provided, hash),
                None => false,
            },
            (Some(_), None) => false,
            (None, provided) => {
                self.hasher
                    .verify(provided.unwrap_or_default(), &self.dummy_hash);
                false
            }
        };

        match client {
            Some(client) if verified => {
                self.throttle.record_success(client_id, peer);
                Ok(client)
            }
            known => {
                if known.is_some() {
                    self.throttle.record_failure(client_id, peer);
                }
                tracing::info!(client_id, ?peer, "Client authentication failed");
                Err(OAuthError::InvalidClient(
                    "Client authentication failed".into(),
                ))
            }
        }
    }

    pub async fn list_for_owner(
        &self,
        owner_user_id: &str,
    ) -> Result<Vec<oauth2_client::Model>, DbErr> {
        oauth2_client::Entity::find()
            .filter(oauth2_client::Column::OwnerUserId.eq(owner_user_id))
            .filter(oauth2_client::Column::IsActive.eq(true))
            .order_by_asc(oauth2_client::Column::CreatedAt)
            .all(self.db.as_ref())
            .await
    }

    /// Deactivate a client owned by `owner_user_id` and revoke its tokens.
    /// Returns `false` when no such active client exists.
    #[tracing::instrument(skip(self))]
    pub async fn deactivate(&self, client_id: &str, owner_user_id: &str) -> Result<bool, DbErr> {
        let txn = self.db.begin().await?;
        let result = oauth2_client::Entity::update_many()
            .col_expr(oauth2_client::Column::IsActive, Expr::value(false))
            .col_expr(
                oauth2_client::Column::UpdatedAt,
                Expr::value(OffsetDateTime::now_utc()),
            )
            .filter(oauth2_client::Column::Id.eq(client_id))
            .filter(oauth2_client::Column::OwnerUserId.eq(owner_user_id))
            .filter(oauth2_client::Column::IsActive.eq(true))
            .exec(&txn)
            .await?;
        if result.rows_affected != 1 {
            return Ok(false);
        }

        let revoked = oauth2_token::Entity::update_many()
            .col_expr(oauth2_token::Column::Revoked, Expr::value(true))
            .filter(oauth2_token::Column::ClientId.eq(client_id))
            .filter(oauth2_token::Column::Revoked.eq(false))
            .exec(&txn)
            .await?;
        txn.commit().await?;

        tracing::info!(
            client_id,
            revoked_tokens = revoked.rows_affected,
            "Deactivated OAuth2 client"
        );
        Ok(true)
    }
}

/// Redirect URIs must be absolute and carry no fragment (RFC 6749 §3.1.2).
fn validate_redirect_uris(uris: &[String]) -> OAuthResult<()> {
    if uris.is_empty() {
        return Err(OAuthError::InvalidRequest(
            "At least one redirect_uri is required".into(),
        ));
    }
    for uri in uris {
        let parsed = url::Url::parse(uri).map_err(|_| {
            OAuthError::InvalidRequest(format!("redirect_uri '{uri}' is not an absolute URI"))
        })?;
        if parsed.fragment().is_some() {
            return Err(OAuthError::InvalidRequest(format!(
                "redirect_uri '{uri}' must not contain a fragment"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_uri_validation() {
        assert!(validate_redirect_uris(&[]).is_err());
        assert!(validate_redirect_uris(&["/relative/cb".into()]).is_err());
        assert!(validate_redirect_uris(&["https://app.example/cb#frag".into()]).is_err());
        assert!(validate_redirect_uris(&["https://app.example/cb".into()]).is_ok());
        assert!(validate_redirect_uris(&["com.example.app:/oauth".into()]).is_ok());
    }
}
