//! Periodic purge of rows that can no longer be used.
//!
//! Expiry is always enforced when a row is read; this only keeps the tables
//! small.

use crate::error::OAuthResult;
use crate::oauth2::state::OAuth2State;
use std::time::Duration;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PurgeReport {
    pub authorization_codes: u64,
    pub tokens: u64,
    pub device_authorizations: u64,
}

/// Run one purge pass.
#[tracing::instrument(skip(state))]
pub async fn purge_expired(state: &OAuth2State) -> OAuthResult<PurgeReport> {
    let report = PurgeReport {
        authorization_codes: state.codes.purge_expired().await?,
        tokens: state.tokens.purge_expired().await?,
        device_authorizations: state.device.purge_expired().await?,
    };
    state.throttle.prune();
    Ok(report)
}

/// Purge every `cleanup_interval` seconds in the background.
pub fn spawn_cleanup_task(state: OAuth2State) {
    let every = state.config.cleanup_interval;
    if every == 0 {
        return;
    }
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(every));
        loop {
            interval.tick().await;
            match purge_expired(&state).await {
                Ok(report) => tracing::debug!(
                    codes = report.authorization_codes,
                    tokens = report.tokens,
                    device = report.device_authorizations,
                    "Purged expired OAuth2 rows"
                ),
                Err(e) => {
                    e.log_if_internal();
                    tracing::warn!("OAuth2 cleanup pass failed: {}", e);
                }
            }
        }
    });
}
