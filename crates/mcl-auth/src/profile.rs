use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::client::BrokerClient;
use crate::errors::{AuthError, Result};
use crate::store::AccountBundle;
use crate::token::Token;

/// Cached game profile: stable id, display name and when it was fetched.
///
/// Freshness is governed by the configured TTL against `fetched_at`,
/// independent of any token's expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRecord {
    #[serde(rename = "stableId")]
    pub stable_id: String,

    #[serde(rename = "displayName")]
    pub display_name: String,

    #[serde(rename = "fetchedAt")]
    pub fetched_at: DateTime<Utc>,
}

impl ProfileRecord {
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        // a TTL too large to represent never goes stale
        let Ok(ttl) = chrono::Duration::from_std(ttl) else {
            return true;
        };
        match self.fetched_at.checked_add_signed(ttl) {
            Some(deadline) => now < deadline,
            None => true,
        }
    }
}

/// Resolves the profile for a session token, honoring the cache TTL and
/// degrading to stale data when the fetch fails transiently.
#[derive(Debug)]
pub struct ProfileCache<'a> {
    client: &'a BrokerClient,
    ttl: Duration,
}

impl<'a> ProfileCache<'a> {
    pub fn new(client: &'a BrokerClient, ttl: Duration) -> Self {
        Self { client, ttl }
    }

    /// Returns the profile and whether the bundle changed.
    pub async fn resolve(
        &self,
        bundle: &mut AccountBundle,
        session: &Token,
    ) -> Result<(ProfileRecord, bool)> {
        let now = Utc::now();
        if let Some(profile) = &bundle.profile {
            if profile.is_fresh(now, self.ttl) {
                debug!("reusing cached profile for {}", profile.display_name);
                return Ok((profile.clone(), false));
            }
        }

        match self.client.fetch_profile(&session.value).await {
            Ok(record) => {
                bundle.profile = Some(record.clone());
                Ok((record, true))
            }
            // a missing profile means the identity cannot play; stale data would lie
            Err(err @ AuthError::ProfileNotFound) => Err(err),
            Err(err) => match &bundle.profile {
                Some(stale) => {
                    warn!("profile fetch failed, serving stale record: {err}");
                    Ok((stale.clone(), false))
                }
                None => Err(AuthError::ProfileFetch(Box::new(err))),
            },
        }
    }
}
