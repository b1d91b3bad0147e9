use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{AuthError, Result};
use crate::profile::ProfileRecord;
use crate::token::{Stage, Token};

/// Per-account bundle of the four chained credentials plus the cached profile.
///
/// Created empty on the first resolution attempt for a new account id and
/// populated progressively; tokens are replaced wholesale, never mutated.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AccountBundle {
    #[serde(rename = "rootIdentity", skip_serializing_if = "Option::is_none")]
    pub root_identity: Option<Token>,

    #[serde(rename = "brokerIdentity", skip_serializing_if = "Option::is_none")]
    pub broker_identity: Option<Token>,

    #[serde(rename = "brokerAuthorization", skip_serializing_if = "Option::is_none")]
    pub broker_authorization: Option<Token>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<Token>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<ProfileRecord>,
}

impl AccountBundle {
    pub fn token(&self, stage: Stage) -> Option<&Token> {
        match stage {
            Stage::RootIdentity => self.root_identity.as_ref(),
            Stage::BrokerIdentity => self.broker_identity.as_ref(),
            Stage::BrokerAuthorization => self.broker_authorization.as_ref(),
            Stage::Session => self.session.as_ref(),
        }
    }

    pub fn set_token(&mut self, stage: Stage, token: Token) {
        let slot = match stage {
            Stage::RootIdentity => &mut self.root_identity,
            Stage::BrokerIdentity => &mut self.broker_identity,
            Stage::BrokerAuthorization => &mut self.broker_authorization,
            Stage::Session => &mut self.session,
        };
        *slot = Some(token);
    }

    /// Lenient decode: every absent or malformed field becomes the stage's
    /// absent state instead of failing the whole load.
    fn from_value(value: &Value) -> Self {
        fn field<T: serde::de::DeserializeOwned>(value: &Value, name: &str) -> Option<T> {
            value
                .get(name)
                .and_then(|raw| serde_json::from_value(raw.clone()).ok())
        }

        Self {
            root_identity: field(value, "rootIdentity"),
            broker_identity: field(value, "brokerIdentity"),
            broker_authorization: field(value, "brokerAuthorization"),
            session: field(value, "session"),
            profile: field(value, "profile"),
        }
    }
}

/// In-memory credential store backed by a single JSON file.
///
/// The file always holds a complete snapshot of every account bundle;
/// [`crate::PersistenceScheduler`] owns the writes.
#[derive(Debug)]
pub struct CredentialStore {
    path: PathBuf,
    accounts: HashMap<String, AccountBundle>,
}

impl CredentialStore {
    /// Load the store synchronously. A missing backing file is an empty
    /// store; malformed contents are logged and treated as empty.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let accounts = match std::fs::read_to_string(&path) {
            Ok(text) => match Self::parse(&text) {
                Ok(accounts) => {
                    debug!("loaded {} account bundle(s) from {}", accounts.len(), path.display());
                    accounts
                }
                Err(err) => {
                    warn!(
                        "malformed credential store at {}, starting empty: {err}",
                        path.display()
                    );
                    HashMap::new()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => {
                warn!(
                    "failed to read credential store at {}, starting empty: {err}",
                    path.display()
                );
                HashMap::new()
            }
        };

        Self { path, accounts }
    }

    fn parse(text: &str) -> Result<HashMap<String, AccountBundle>> {
        let root: Value = serde_json::from_str(text)?;
        let object = root
            .as_object()
            .ok_or_else(|| AuthError::InvalidResponse("store root is not an object".to_string()))?;

        Ok(object
            .iter()
            .map(|(account, value)| (account.clone(), AccountBundle::from_value(value)))
            .collect())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bundle(&self, account: &str) -> Option<&AccountBundle> {
        self.accounts.get(account)
    }

    /// Bundle for an account, created empty on first access
    pub fn bundle_mut(&mut self, account: &str) -> &mut AccountBundle {
        self.accounts.entry(account.to_string()).or_default()
    }

    pub fn accounts(&self) -> impl Iterator<Item = &str> {
        self.accounts.keys().map(String::as_str)
    }

    /// Full-store snapshot in the persisted shape
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.accounts)?)
    }

    /// Default backing file location for the current platform
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "mclogin")
            .map(|dirs| dirs.config_dir().join("accounts.json"))
    }
}
