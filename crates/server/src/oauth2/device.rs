//! Device Authorization Grant (RFC 8628).
//!
//! A device obtains a `device_code`/`user_code` pair, shows the user code to
//! the user and polls the token endpoint while the user approves or denies
//! the request on another device.
//!
//! ```text
//! pending ──authorize──▶ authorized ──token──▶ consumed
//!    │
//!    └──────deny──────▶ denied
//! ```
//!
//! Expiry is never stored as a status; it is derived from `expires_at`.

use crate::entity::oauth2_device_authorization::{self, DeviceStatus};
use crate::error::{OAuthError, OAuthResult};
use crate::oauth2::scope::ScopeSet;
use crate::oauth2::secret;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    DatabaseTransaction, EntityTrait, QueryFilter, QuerySelect, TransactionTrait,
    sea_query::Expr,
};
use std::sync::Arc;
use time::{Duration, OffsetDateTime};

/// Consonants only: no vowels (no accidental words) and none of 0/O, 1/I/L.
pub const USER_CODE_ALPHABET: &[u8; 20] = b"BCDFGHJKMNPQRSTVWXYZ";
const USER_CODE_LEN: usize = 8;
const MAX_USER_CODE_ATTEMPTS: usize = 10;
/// Largest multiple of 20 that fits in a byte
const ACCEPT_BELOW: u8 = 240;

/// Returned to the device on initiation.
#[derive(Debug, Clone)]
pub struct DeviceGrant {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    pub verification_uri_complete: String,
    pub expires_in: i64,
    pub interval: i64,
}

/// Polling result visible to the device.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Pending,
    Denied,
    Ready(oauth2_device_authorization::Model),
}

/// One locked polling step, before the caller decides what to commit.
#[derive(Debug, Clone, PartialEq)]
pub enum PollStep {
    SlowDown,
    Pending,
    Denied,
    Ready(oauth2_device_authorization::Model),
}

#[derive(Clone)]
pub struct DeviceFlow {
    db: Arc<DatabaseConnection>,
    lifetime: i64,
    interval: i64,
    slow_down_step: i64,
    verification_uri: String,
}

impl DeviceFlow {
    pub fn new(
        db: Arc<DatabaseConnection>,
        lifetime: i64,
        interval: i64,
        slow_down_step: i64,
        verification_uri: String,
    ) -> Self {
        Self {
            db,
            lifetime,
            interval,
            slow_down_step,
            verification_uri,
        }
    }

    /// Start a device grant. User codes are retried on collision with an
    /// active pending grant and the request fails closed after ten attempts.
    #[tracing::instrument(skip(self, scopes))]
    pub async fn initiate(&self, client_id: &str, scopes: &ScopeSet) -> OAuthResult<DeviceGrant> {
        let device_code = secret::random_token(secret::CODE_BYTES)?;
        let now = OffsetDateTime::now_utc();

        let txn = self.db.begin().await?;
        let mut user_code = None;
        for _ in 0..MAX_USER_CODE_ATTEMPTS {
            let candidate = generate_user_code()?;
            if find_active_pending(&txn, &candidate, now).await?.is_none() {
                user_code = Some(candidate);
                break;
            }
            tracing::debug!("User code collision, regenerating");
        }
        let Some(user_code) = user_code else {
            return Err(OAuthError::ServerError(
                "could not allocate a unique device user code".into(),
            ));
        };

        oauth2_device_authorization::ActiveModel {
            device_code: Set(device_code.clone()),
            user_code: Set(user_code.clone()),
            client_id: Set(client_id.to_string()),
            scope: Set(scopes.to_string()),
            status: Set(DeviceStatus::Pending),
            user_id: Set(None),
            interval: Set(self.interval),
            last_poll_at: Set(None),
            expires_at: Set(now + Duration::seconds(self.lifetime)),
            created_at: Set(now),
        }
        .insert(&txn)
        .await?;
        txn.commit().await?;

        tracing::info!(client_id, "Started device authorization");
        Ok(DeviceGrant {
            verification_uri_complete: format!(
                "{}?user_code={}",
                self.verification_uri,
                urlencoding::encode(&user_code)
            ),
            verification_uri: self.verification_uri.clone(),
            device_code,
            user_code,
            expires_in: self.lifetime,
            interval: self.interval,
        })
    }

    /// Look up a pending, unexpired grant by the code the user typed.
    pub async fn verify_by_user_code(
        &self,
        user_code: &str,
    ) -> OAuthResult<Option<oauth2_device_authorization::Model>> {
        let Some(normalized) = normalize_user_code(user_code) else {
            return Ok(None);
        };
        Ok(find_active_pending(self.db.as_ref(), &normalized, OffsetDateTime::now_utc()).await?)
    }

    /// Approve a pending grant. Returns `false` when no pending, unexpired
    /// grant matches.
    #[tracing::instrument(skip(self))]
    pub async fn authorize(&self, user_code: &str, user_id: &str) -> OAuthResult<bool> {
        self.decide(user_code, DeviceStatus::Authorized, Some(user_id))
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn deny(&self, user_code: &str) -> OAuthResult<bool> {
        self.decide(user_code, DeviceStatus::Denied, None).await
    }

    async fn decide(
        &self,
        user_code: &str,
        status: DeviceStatus,
        user_id: Option<&str>,
    ) -> OAuthResult<bool> {
        let Some(normalized) = normalize_user_code(user_code) else {
            return Ok(false);
        };
        let now = OffsetDateTime::now_utc();
        let txn = self.db.begin().await?;
        let Some(row) = find_active_pending(&txn, &normalized, now).await? else {
            return Ok(false);
        };

        let mut update = oauth2_device_authorization::Entity::update_many()
            .col_expr(
                oauth2_device_authorization::Column::Status,
                Expr::value(status),
            )
            .filter(oauth2_device_authorization::Column::DeviceCode.eq(&row.device_code))
            .filter(oauth2_device_authorization::Column::Status.eq(DeviceStatus::Pending));
        if let Some(user_id) = user_id {
            update = update.col_expr(
                oauth2_device_authorization::Column::UserId,
                Expr::value(user_id),
            );
        }
        let result = update.exec(&txn).await?;
        if result.rows_affected != 1 {
            return Ok(false);
        }
        txn.commit().await?;

        tracing::info!(client_id = %row.client_id, ?status, "Device authorization decided");
        Ok(true)
    }

    /// Poll on behalf of a device, committing the outcome.
    pub async fn poll(&self, device_code: &str, client_id: &str) -> OAuthResult<PollOutcome> {
        let txn = self.db.begin().await?;
        let step = self
            .poll_step(&txn, device_code, client_id, OffsetDateTime::now_utc())
            .await?;
        txn.commit().await?;
        match step {
            PollStep::SlowDown => Err(OAuthError::SlowDown),
            PollStep::Pending => Ok(PollOutcome::Pending),
            PollStep::Denied => Ok(PollOutcome::Denied),
            PollStep::Ready(row) => Ok(PollOutcome::Ready(row)),
        }
    }

    /// One polling step under a row lock, inside the caller's transaction.
    ///
    /// Errors leave nothing to commit. `SlowDown` has already widened the
    /// interval and the other steps have stamped `last_poll_at`; the caller
    /// commits those.
    pub async fn poll_step(
        &self,
        txn: &DatabaseTransaction,
        device_code: &str,
        client_id: &str,
        now: OffsetDateTime,
    ) -> OAuthResult<PollStep> {
        let row = oauth2_device_authorization::Entity::find()
            .filter(oauth2_device_authorization::Column::DeviceCode.eq(device_code))
            .filter(oauth2_device_authorization::Column::ClientId.eq(client_id))
            .lock_exclusive()
            .one(txn)
            .await?
            .ok_or_else(|| OAuthError::InvalidGrant("Unknown device_code".into()))?;

        if row.is_expired_at(now) {
            return Err(OAuthError::ExpiredToken);
        }
        if row.status == DeviceStatus::Consumed {
            return Err(already_used());
        }

        if row.polled_too_soon(now) {
            let interval = row.interval + self.slow_down_step;
            oauth2_device_authorization::Entity::update_many()
                .col_expr(
                    oauth2_device_authorization::Column::Interval,
                    Expr::value(interval),
                )
                .filter(oauth2_device_authorization::Column::DeviceCode.eq(device_code))
                .exec(txn)
                .await?;
            tracing::debug!(client_id, interval, "Device polling too fast");
            return Ok(PollStep::SlowDown);
        }

        oauth2_device_authorization::Entity::update_many()
            .col_expr(
                oauth2_device_authorization::Column::LastPollAt,
                Expr::value(now),
            )
            .filter(oauth2_device_authorization::Column::DeviceCode.eq(device_code))
            .exec(txn)
            .await?;

        match row.status {
            DeviceStatus::Pending => Ok(PollStep::Pending),
            DeviceStatus::Denied => Ok(PollStep::Denied),
            DeviceStatus::Authorized => Ok(PollStep::Ready(oauth2_device_authorization::Model {
                last_poll_at: Some(now),
                ..row
            })),
            DeviceStatus::Consumed => Err(already_used()),
        }
    }

    /// Flip `authorized → consumed`; exactly one row must change.
    pub async fn consume_in<C: ConnectionTrait>(
        conn: &C,
        device_code: &str,
        client_id: &str,
    ) -> OAuthResult<()> {
        let result = oauth2_device_authorization::Entity::update_many()
            .col_expr(
                oauth2_device_authorization::Column::Status,
                Expr::value(DeviceStatus::Consumed),
            )
            .filter(oauth2_device_authorization::Column::DeviceCode.eq(device_code))
            .filter(oauth2_device_authorization::Column::ClientId.eq(client_id))
            .filter(oauth2_device_authorization::Column::Status.eq(DeviceStatus::Authorized))
            .exec(conn)
            .await?;
        if result.rows_affected != 1 {
            return Err(already_used());
        }
        Ok(())
    }

    /// Delete finished (consumed or denied) and expired grants.
    pub async fn purge_expired(&self) -> OAuthResult<u64> {
        let result = oauth2_device_authorization::Entity::delete_many()
            .filter(
                oauth2_device_authorization::Column::Status
                    .is_in([DeviceStatus::Consumed, DeviceStatus::Denied])
                    .or(oauth2_device_authorization::Column::ExpiresAt
                        .lt(OffsetDateTime::now_utc())),
            )
            .exec(self.db.as_ref())
            .await?;
        Ok(result.rows_affected)
    }
}

fn already_used() -> OAuthError {
    OAuthError::InvalidGrant("device_code has already been used".into())
}

async fn find_active_pending<C: ConnectionTrait>(
    conn: &C,
    user_code: &str,
    now: OffsetDateTime,
) -> Result<Option<oauth2_device_authorization::Model>, sea_orm::DbErr> {
    let rows = oauth2_device_authorization::Entity::find()
        .filter(oauth2_device_authorization::Column::UserCode.eq(user_code))
        .filter(oauth2_device_authorization::Column::Status.eq(DeviceStatus::Pending))
        .all(conn)
        .await?;
    Ok(rows.into_iter().find(|row| !row.is_expired_at(now)))
}

/// Eight characters from [`USER_CODE_ALPHABET`] as `XXXX-XXXX`.
///
/// Bytes ≥ 240 are rejected so every letter is equally likely.
pub fn generate_user_code() -> OAuthResult<String> {
    let alphabet_len = USER_CODE_ALPHABET.len() as u8;
    let mut chars = Vec::with_capacity(USER_CODE_LEN);
    while chars.len() < USER_CODE_LEN {
        let buf: [u8; 16] = secret::random_bytes()?;
        for b in buf {
            if b < ACCEPT_BELOW && chars.len() < USER_CODE_LEN {
                chars.push(USER_CODE_ALPHABET[(b % alphabet_len) as usize] as char);
            }
        }
    }
    let (head, tail) = chars.split_at(USER_CODE_LEN / 2);
    Ok(format!(
        "{}-{}",
        head.iter().collect::<String>(),
        tail.iter().collect::<String>()
    ))
}

/// Canonical `XXXX-XXXX` form of what a user typed: case-insensitive, with
/// spaces and hyphens ignored. `None` if it cannot be a user code.
pub fn normalize_user_code(input: &str) -> Option<String> {
    let compact: String = input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .map(|c| c.to_ascii_uppercase())
        .collect();
    if compact.len() != USER_CODE_LEN
        || !compact.bytes().all(|b| USER_CODE_ALPHABET.contains(&b))
    {
        return None;
    }
    let (head, tail) = compact.split_at(USER_CODE_LEN / 2);
    Some(format!("{head}-{tail}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_codes_use_only_the_alphabet() {
        for _ in 0..500 {
            let code = generate_user_code().unwrap();
            assert_eq!(code.len(), 9);
            assert_eq!(code.as_bytes()[4], b'-');
            for c in code.chars().filter(|c| *c != '-') {
                assert!(USER_CODE_ALPHABET.contains(&(c as u8)), "unexpected {c}");
                assert!(!"AEIOU01L".contains(c));
            }
        }
    }

    #[test]
    fn alphabet_has_no_ambiguous_glyphs() {
        assert_eq!(USER_CODE_ALPHABET.len(), 20);
        for excluded in b"0O1IL" {
            assert!(!USER_CODE_ALPHABET.contains(excluded));
        }
    }

    #[test]
    fn normalization() {
        assert_eq!(normalize_user_code("bcdf-ghjk").as_deref(), Some("BCDF-GHJK"));
        assert_eq!(normalize_user_code(" BCDF GHJK ").as_deref(), Some("BCDF-GHJK"));
        assert_eq!(normalize_user_code("bcdfghjk").as_deref(), Some("BCDF-GHJK"));
        assert_eq!(normalize_user_code("BCDF-GHJ"), None);
        assert_eq!(normalize_user_code("BCDF-GHJA"), None);
        assert_eq!(normalize_user_code(""), None);
    }
}
