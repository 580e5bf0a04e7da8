//! Opaque access/refresh token issuance, rotation and validation.

use crate::entity::{oauth2_client, oauth2_device_authorization, oauth2_token};
use crate::error::{OAuthError, OAuthResult};
use crate::oauth2::authorization::AuthorizationCodes;
use crate::oauth2::device::{DeviceFlow, PollStep};
use crate::oauth2::pkce;
use crate::oauth2::scope::{GrantType, ScopeSet};
use crate::oauth2::secret;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QuerySelect, TransactionTrait, sea_query::Expr,
};
use std::sync::Arc;
use time::{Duration, OffsetDateTime};

/// A freshly minted token set, as returned by the token endpoint.
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Access token lifetime in seconds
    pub expires_in: i64,
    pub scope: ScopeSet,
    pub user_id: String,
    pub client_id: String,
}

/// What a resource server learns from a valid bearer token.
#[derive(Debug, Clone)]
pub struct AccessTokenInfo {
    pub user_id: String,
    pub client_id: String,
    pub scopes: ScopeSet,
    pub expires_at: OffsetDateTime,
}

/// Token type hint for revocation (RFC 7009 §2.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenTypeHint {
    AccessToken,
    RefreshToken,
}

impl TokenTypeHint {
    /// Unrecognised hints are ignored.
    pub fn parse(hint: Option<&str>) -> Option<Self> {
        match hint {
            Some("access_token") => Some(TokenTypeHint::AccessToken),
            Some("refresh_token") => Some(TokenTypeHint::RefreshToken),
            _ => None,
        }
    }
}

/// Inputs of an authorization_code redemption.
#[derive(Debug, Clone, Copy)]
pub struct CodeExchange<'a> {
    pub code: &'a str,
    pub redirect_uri: Option<&'a str>,
    pub code_verifier: Option<&'a str>,
}

#[derive(Clone)]
pub struct TokenService {
    db: Arc<DatabaseConnection>,
    access_token_lifetime: i64,
    refresh_token_lifetime: i64,
}

impl TokenService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        access_token_lifetime: i64,
        refresh_token_lifetime: i64,
    ) -> Self {
        Self {
            db,
            access_token_lifetime,
            refresh_token_lifetime,
        }
    }

    /// Insert a new pair on `conn`. The refresh half is only minted for
    /// clients registered for the refresh_token grant.
    async fn mint<C: ConnectionTrait>(
        &self,
        conn: &C,
        client: &oauth2_client::Model,
        user_id: &str,
        scope: &ScopeSet,
        with_refresh: bool,
    ) -> OAuthResult<IssuedTokens> {
        let now = OffsetDateTime::now_utc();
        let access_token = secret::random_token(secret::TOKEN_BYTES)?;
        let refresh_token = if with_refresh && client.is_grant_type_allowed(GrantType::RefreshToken)
        {
            Some(secret::random_token(secret::TOKEN_BYTES)?)
        } else {
            None
        };

        oauth2_token::ActiveModel {
            id: Set(uuid::Uuid::new_v4().to_string()),
            access_token: Set(access_token.clone()),
            refresh_token: Set(refresh_token.clone()),
            client_id: Set(client.id.clone()),
            user_id: Set(user_id.to_string()),
            scope: Set(scope.to_string()),
            expires_at: Set(now + Duration::seconds(self.access_token_lifetime)),
            refresh_expires_at: Set(refresh_token
                .as_ref()
                .map(|_| now + Duration::seconds(self.refresh_token_lifetime))),
            revoked: Set(false),
            created_at: Set(now),
        }
        .insert(conn)
        .await?;

        Ok(IssuedTokens {
            access_token,
            refresh_token,
            expires_in: self.access_token_lifetime,
            scope: scope.clone(),
            user_id: user_id.to_string(),
            client_id: client.id.clone(),
        })
    }

    /// Redeem an authorization code. Code consumption, redirect and PKCE
    /// checks and minting share one transaction.
    #[tracing::instrument(skip(self, client, exchange), fields(client_id = %client.id))]
    pub async fn exchange_code(
        &self,
        client: &oauth2_client::Model,
        exchange: CodeExchange<'_>,
    ) -> OAuthResult<IssuedTokens> {
        let txn = self.db.begin().await?;
        let grant = AuthorizationCodes::consume_in(&txn, exchange.code, &client.id).await?;

        match exchange.redirect_uri {
            Some(uri) if uri == grant.redirect_uri => {}
            Some(_) => {
                return Err(OAuthError::InvalidGrant(
                    "redirect_uri does not match the authorization request".into(),
                ));
            }
            None => {
                return Err(OAuthError::InvalidRequest("redirect_uri is required".into()));
            }
        }

        pkce::check_redemption(
            grant.code_challenge.as_deref(),
            grant.code_challenge_method.as_deref(),
            exchange.code_verifier,
        )?;

        let scope = ScopeSet::from_stored(&grant.scope);
        let tokens = self.mint(&txn, client, &grant.user_id, &scope, true).await?;
        txn.commit().await?;

        tracing::info!(user_id = %grant.user_id, "Exchanged authorization code for tokens");
        Ok(tokens)
    }

    /// Rotate a refresh token: the presented pair is revoked and exactly one
    /// new pair is created, atomically.
    #[tracing::instrument(skip(self, client, refresh_token, requested), fields(client_id = %client.id))]
    pub async fn refresh(
        &self,
        client: &oauth2_client::Model,
        refresh_token: &str,
        requested: Option<ScopeSet>,
    ) -> OAuthResult<IssuedTokens> {
        let txn = self.db.begin().await?;
        let existing = oauth2_token::Entity::find()
            .filter(oauth2_token::Column::RefreshToken.eq(refresh_token))
            .filter(oauth2_token::Column::ClientId.eq(&client.id))
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| OAuthError::InvalidGrant("Refresh token not found".into()))?;

        if existing.revoked {
            tracing::warn!(
                user_id = %existing.user_id,
                token_id = %existing.id,
                "Revoked refresh token presented again; possible replay"
            );
            return Err(OAuthError::InvalidGrant(
                "Refresh token is invalid or expired".into(),
            ));
        }
        if existing.is_refresh_token_expired() {
            return Err(OAuthError::InvalidGrant(
                "Refresh token is invalid or expired".into(),
            ));
        }

        let original = existing.scope_set();
        let scope = match requested {
            Some(requested) if !requested.is_empty() => {
                if !requested.is_subset(&original) {
                    return Err(OAuthError::InvalidScope(
                        "Requested scope exceeds the original grant".into(),
                    ));
                }
                requested
            }
            _ => original,
        };

        let result = oauth2_token::Entity::update_many()
            .col_expr(oauth2_token::Column::Revoked, Expr::value(true))
            .filter(oauth2_token::Column::Id.eq(&existing.id))
            .filter(oauth2_token::Column::Revoked.eq(false))
            .exec(&txn)
            .await?;
        if result.rows_affected != 1 {
            tracing::warn!(token_id = %existing.id, "Refresh token rotated concurrently");
            return Err(OAuthError::InvalidGrant(
                "Refresh token is invalid or expired".into(),
            ));
        }

        let tokens = self
            .mint(&txn, client, &existing.user_id, &scope, true)
            .await?;
        txn.commit().await?;

        tracing::info!(user_id = %existing.user_id, "Rotated refresh token");
        Ok(tokens)
    }

    /// Client credentials grant: an access token for the client's owner, no
    /// refresh token.
    #[tracing::instrument(skip(self, client, requested), fields(client_id = %client.id))]
    pub async fn client_credentials(
        &self,
        client: &oauth2_client::Model,
        requested: Option<ScopeSet>,
    ) -> OAuthResult<IssuedTokens> {
        if !client.is_grant_type_allowed(GrantType::ClientCredentials) {
            return Err(OAuthError::UnauthorizedClient(
                "Client is not allowed to use the client_credentials grant".into(),
            ));
        }
        let Some(owner) = client.owner_user_id.as_deref() else {
            return Err(OAuthError::ServerError(format!(
                "client {} has client_credentials but no owner_user_id",
                client.id
            )));
        };

        let allowed = client.scope_set();
        let scope = match requested {
            Some(requested) if !requested.is_empty() => {
                if !requested.is_subset(&allowed) {
                    return Err(OAuthError::InvalidScope(
                        "Requested scope exceeds the client's registered scopes".into(),
                    ));
                }
                requested
            }
            _ => allowed,
        };

        self.mint(self.db.as_ref(), client, owner, &scope, false)
            .await
    }

    /// Device grant at the token endpoint. Polling, consumption and minting
    /// share one transaction so a device code yields at most one token set.
    /// Rate-limit and pending outcomes are committed before being reported.
    #[tracing::instrument(skip(self, device, client, device_code), fields(client_id = %client.id))]
    pub async fn exchange_device_code(
        &self,
        device: &DeviceFlow,
        client: &oauth2_client::Model,
        device_code: &str,
    ) -> OAuthResult<IssuedTokens> {
        let txn = self.db.begin().await?;
        let step = device
            .poll_step(&txn, device_code, &client.id, OffsetDateTime::now_utc())
            .await?;

        let row: oauth2_device_authorization::Model = match step {
            PollStep::Ready(row) => row,
            PollStep::SlowDown => {
                txn.commit().await?;
                return Err(OAuthError::SlowDown);
            }
            PollStep::Pending => {
                txn.commit().await?;
                return Err(OAuthError::AuthorizationPending);
            }
            PollStep::Denied => {
                txn.commit().await?;
                return Err(OAuthError::AccessDenied);
            }
        };

        DeviceFlow::consume_in(&txn, device_code, &client.id).await?;
        let user_id = row.user_id.as_deref().ok_or_else(|| {
            OAuthError::ServerError(format!(
                "authorized device grant for client {} has no user",
                client.id
            ))
        })?;
        let scope = ScopeSet::from_stored(&row.scope);
        let tokens = self.mint(&txn, client, user_id, &scope, true).await?;
        txn.commit().await?;

        tracing::info!(user_id, "Exchanged device code for tokens");
        Ok(tokens)
    }

    /// Resolve a bearer token. Expired and revoked tokens are rejected.
    pub async fn lookup_access_token(&self, access_token: &str) -> OAuthResult<AccessTokenInfo> {
        let token = oauth2_token::Entity::find()
            .filter(oauth2_token::Column::AccessToken.eq(access_token))
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| OAuthError::InvalidToken("Token not found".into()))?;

        if token.revoked {
            return Err(OAuthError::InvalidToken("Token has been revoked".into()));
        }
        if token.is_access_token_expired() {
            return Err(OAuthError::InvalidToken("Token has expired".into()));
        }

        Ok(AccessTokenInfo {
            scopes: token.scope_set(),
            user_id: token.user_id,
            client_id: token.client_id,
            expires_at: token.expires_at,
        })
    }

    /// Revoke the pair containing `token` (RFC 7009). Unknown tokens and
    /// tokens issued to another client are ignored. Returns whether a pair
    /// was revoked.
    #[tracing::instrument(skip(self, token))]
    pub async fn revoke(
        &self,
        token: &str,
        hint: Option<TokenTypeHint>,
        client_id: &str,
    ) -> OAuthResult<bool> {
        let by_access = oauth2_token::Column::AccessToken.eq(token);
        let by_refresh = oauth2_token::Column::RefreshToken.eq(token);
        let (first, second) = match hint {
            Some(TokenTypeHint::RefreshToken) => (by_refresh, by_access),
            _ => (by_access, by_refresh),
        };

        let mut found = oauth2_token::Entity::find()
            .filter(first)
            .one(self.db.as_ref())
            .await?;
        if found.is_none() {
            found = oauth2_token::Entity::find()
                .filter(second)
                .one(self.db.as_ref())
                .await?;
        }

        let Some(pair) = found else {
            return Ok(false);
        };
        if pair.client_id != client_id {
            tracing::warn!(
                owner_client_id = %pair.client_id,
                "Revocation requested for a token issued to another client"
            );
            return Ok(false);
        }

        let result = oauth2_token::Entity::update_many()
            .col_expr(oauth2_token::Column::Revoked, Expr::value(true))
            .filter(oauth2_token::Column::Id.eq(&pair.id))
            .filter(oauth2_token::Column::Revoked.eq(false))
            .exec(self.db.as_ref())
            .await?;
        Ok(result.rows_affected == 1)
    }

    /// Delete pairs whose refresh token (or access token, if there is none)
    /// has expired. Revoked pairs are kept until then so a replayed refresh
    /// token is still recognised as one.
    pub async fn purge_expired(&self) -> OAuthResult<u64> {
        let now = OffsetDateTime::now_utc();
        let result = oauth2_token::Entity::delete_many()
            .filter(
                oauth2_token::Column::RefreshExpiresAt.lt(now).or(
                    oauth2_token::Column::RefreshExpiresAt
                        .is_null()
                        .and(oauth2_token::Column::ExpiresAt.lt(now)),
                ),
            )
            .exec(self.db.as_ref())
            .await?;
        Ok(result.rows_affected)
    }
}
