use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::TOKEN_EXPIRY_BUFFER;

/// The fixed stages of the credential chain, in dependency order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    RootIdentity,
    BrokerIdentity,
    BrokerAuthorization,
    Session,
}

impl Stage {
    /// The stage this one is derived from, `None` for the root
    pub fn upstream(self) -> Option<Stage> {
        match self {
            Stage::RootIdentity => None,
            Stage::BrokerIdentity => Some(Stage::RootIdentity),
            Stage::BrokerAuthorization => Some(Stage::BrokerIdentity),
            Stage::Session => Some(Stage::BrokerAuthorization),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Stage::RootIdentity => "root identity",
            Stage::BrokerIdentity => "broker identity",
            Stage::BrokerAuthorization => "broker authorization",
            Stage::Session => "session",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Immutable credential value: opaque token string, expiry instant and the
/// credential-specific extra claims
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    #[serde(rename = "token")]
    pub value: String,

    /// Refresh secret, present only on the root identity
    #[serde(
        rename = "refreshSecret",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub refresh_secret: Option<String>,

    /// User hash claim, present on the broker-issued credentials
    #[serde(rename = "userHash", default, skip_serializing_if = "Option::is_none")]
    pub user_hash: Option<String>,

    #[serde(rename = "expiresAt")]
    pub expires_at: DateTime<Utc>,
}

fn expiry_buffer() -> chrono::Duration {
    chrono::Duration::from_std(TOKEN_EXPIRY_BUFFER).unwrap_or_else(|_| chrono::Duration::seconds(10))
}

impl Token {
    /// Token from a provider-declared `expires_in` lifetime, minus the safety buffer
    pub fn with_lifetime(value: impl Into<String>, expires_in_secs: u64) -> Self {
        Self {
            value: value.into(),
            refresh_secret: None,
            user_hash: None,
            expires_at: Utc::now() + chrono::Duration::seconds(expires_in_secs as i64)
                - expiry_buffer(),
        }
    }

    /// Root identity token carrying an optional refresh secret
    pub fn root(
        value: impl Into<String>,
        refresh_secret: Option<String>,
        expires_in_secs: u64,
    ) -> Self {
        Self {
            refresh_secret,
            ..Self::with_lifetime(value, expires_in_secs)
        }
    }

    /// Broker-issued token with a user hash and an absolute `NotAfter` expiry
    pub fn broker(value: impl Into<String>, user_hash: String, not_after: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            refresh_secret: None,
            user_hash: Some(user_hash),
            expires_at: not_after - expiry_buffer(),
        }
    }

    /// Pure expiry check; monotonic in `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
