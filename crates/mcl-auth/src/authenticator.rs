use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::client::BrokerClient;
use crate::config::AuthConfig;
use crate::errors::Result;
use crate::grant::GrantFlow;
use crate::persist::PersistenceScheduler;
use crate::profile::ProfileCache;
use crate::resolver::ChainResolver;
use crate::store::CredentialStore;

/// The caller-facing result of a login: the session bearer token plus the
/// resolved profile identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginData {
    pub session_token: String,
    pub profile_id: String,
    pub display_name: String,
}

/// Top-level entry point tying the chain resolver, profile cache and
/// persistence together for one credential store.
///
/// Resolution runs on the caller's task and may block on network I/O and on
/// user interaction for a first-ever login; only persistence is asynchronous
/// (fire-and-forget, see [`PersistenceScheduler`]).
pub struct Authenticator {
    config: AuthConfig,
    client: BrokerClient,
    grant: Arc<dyn GrantFlow>,
    store: CredentialStore,
    scheduler: PersistenceScheduler,
}

impl Authenticator {
    /// Load the store at `store_path` (synchronously, once) and set up the
    /// background persistence worker.
    pub fn new(
        config: AuthConfig,
        grant: Arc<dyn GrantFlow>,
        store_path: PathBuf,
    ) -> Result<Self> {
        let client = BrokerClient::new(&config)?;
        let store = CredentialStore::load(store_path.clone());
        let scheduler = PersistenceScheduler::spawn(store_path);

        Ok(Self {
            config,
            client,
            grant,
            store,
            scheduler,
        })
    }

    /// Authenticate `account`, reusing cached credentials where possible.
    ///
    /// Walks the credential chain, resolves the profile and enqueues a store
    /// flush if anything changed. Fatal errors abort the whole resolution;
    /// no partial session token is ever returned.
    pub async fn login(&mut self, account: &str) -> Result<LoginData> {
        info!("resolving session for account '{account}'");

        let force = self.config.force_all_expired;
        let bundle = self.store.bundle_mut(account);

        let (session, tokens_updated) =
            ChainResolver::new(&self.client, self.grant.as_ref(), bundle, force)
                .resolve_session()
                .await?;

        let (profile, profile_updated) = ProfileCache::new(&self.client, self.config.profile_ttl)
            .resolve(bundle, &session)
            .await?;

        if tokens_updated || profile_updated {
            self.scheduler.mark_dirty(&self.store);
        }

        Ok(LoginData {
            session_token: session.value,
            profile_id: profile.stable_id,
            display_name: profile.display_name,
        })
    }

    /// Best-effort wait for pending store writes; call before process exit.
    pub async fn flush(&self) {
        self.scheduler.settle().await;
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }
}
