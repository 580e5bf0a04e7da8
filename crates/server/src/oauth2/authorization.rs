//! Authorization code issuance and single-use redemption.

use crate::entity::oauth2_authorization;
use crate::error::{OAuthError, OAuthResult};
use crate::oauth2::pkce::ChallengeMethod;
use crate::oauth2::scope::ScopeSet;
use crate::oauth2::secret;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QuerySelect, TransactionTrait, sea_query::Expr,
};
use std::sync::Arc;
use time::{Duration, OffsetDateTime};

/// Everything the consent step has established about a grant.
#[derive(Debug, Clone)]
pub struct CodeRequest<'a> {
    pub client_id: &'a str,
    pub user_id: &'a str,
    pub redirect_uri: &'a str,
    pub scopes: &'a ScopeSet,
    pub code_challenge: Option<&'a str>,
    pub code_challenge_method: Option<ChallengeMethod>,
}

#[derive(Clone)]
pub struct AuthorizationCodes {
    db: Arc<DatabaseConnection>,
    lifetime: Duration,
}

impl AuthorizationCodes {
    pub fn new(db: Arc<DatabaseConnection>, lifetime_secs: i64) -> Self {
        Self {
            db,
            lifetime: Duration::seconds(lifetime_secs),
        }
    }

    #[tracing::instrument(skip(self, request), fields(client_id = %request.client_id, user_id = %request.user_id))]
    pub async fn issue(&self, request: CodeRequest<'_>) -> OAuthResult<String> {
        let code = secret::random_token(secret::CODE_BYTES)?;
        let now = OffsetDateTime::now_utc();
        // A challenge without an explicit method is stored as plain so the
        // redemption side never has to guess.
        let method = request
            .code_challenge
            .map(|_| request.code_challenge_method.unwrap_or(ChallengeMethod::Plain));

        oauth2_authorization::ActiveModel {
            code: Set(code.clone()),
            client_id: Set(request.client_id.to_string()),
            user_id: Set(request.user_id.to_string()),
            redirect_uri: Set(request.redirect_uri.to_string()),
            scope: Set(request.scopes.to_string()),
            code_challenge: Set(request.code_challenge.map(str::to_string)),
            code_challenge_method: Set(method.map(|m| m.as_str().to_string())),
            used: Set(false),
            expires_at: Set(now + self.lifetime),
            created_at: Set(now),
        }
        .insert(self.db.as_ref())
        .await?;

        tracing::debug!("Issued authorization code");
        Ok(code)
    }

    /// Redeem a code on its own, committing immediately.
    pub async fn consume(
        &self,
        code: &str,
        client_id: &str,
    ) -> OAuthResult<oauth2_authorization::Model> {
        let txn = self.db.begin().await?;
        let grant = Self::consume_in(&txn, code, client_id).await?;
        txn.commit().await?;
        Ok(grant)
    }

    /// Mark a code used inside the caller's transaction.
    ///
    /// The row is locked, checked for expiry, then flipped with a conditional
    /// update that must touch exactly one row. Of two concurrent redemptions
    /// only one can see `used = false`. Nothing is committed here, so a later
    /// failure in the same transaction leaves the code redeemable.
    pub async fn consume_in<C: ConnectionTrait>(
        conn: &C,
        code: &str,
        client_id: &str,
    ) -> OAuthResult<oauth2_authorization::Model> {
        let grant = oauth2_authorization::Entity::find()
            .filter(oauth2_authorization::Column::Code.eq(code))
            .filter(oauth2_authorization::Column::ClientId.eq(client_id))
            .filter(oauth2_authorization::Column::Used.eq(false))
            .lock_exclusive()
            .one(conn)
            .await?
            .ok_or_else(|| {
                OAuthError::InvalidGrant("Authorization code is invalid or already used".into())
            })?;

        if grant.is_expired() {
            return Err(OAuthError::InvalidGrant(
                "Authorization code expired".into(),
            ));
        }

        let result = oauth2_authorization::Entity::update_many()
            .col_expr(oauth2_authorization::Column::Used, Expr::value(true))
            .filter(oauth2_authorization::Column::Code.eq(code))
            .filter(oauth2_authorization::Column::Used.eq(false))
            .exec(conn)
            .await?;
        if result.rows_affected != 1 {
            tracing::warn!(client_id, "Authorization code redeemed concurrently");
            return Err(OAuthError::InvalidGrant(
                "Authorization code is invalid or already used".into(),
            ));
        }

        Ok(oauth2_authorization::Model { used: true, ..grant })
    }

    /// Delete codes that are used or past expiry.
    pub async fn purge_expired(&self) -> OAuthResult<u64> {
        let result = oauth2_authorization::Entity::delete_many()
            .filter(
                oauth2_authorization::Column::Used
                    .eq(true)
                    .or(oauth2_authorization::Column::ExpiresAt.lt(OffsetDateTime::now_utc())),
            )
            .exec(self.db.as_ref())
            .await?;
        Ok(result.rows_affected)
    }
}
