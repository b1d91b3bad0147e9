use std::future::Future;
use std::pin::Pin;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::client::BrokerClient;
use crate::errors::Result;
use crate::grant::GrantFlow;
use crate::store::AccountBundle;
use crate::token::{Stage, Token};

/// Walks the fixed four-stage credential chain, deciding per stage whether to
/// reuse, refresh or freshly acquire, lazily and in dependency order.
///
/// Only the session stage is requested directly; upstream stages are touched
/// solely when a downstream fetch needs them. Refresh failures are swallowed
/// (warn + fresh acquisition); terminal fetch failures abort the resolution
/// tagged with the failing stage. Partial progress stays committed in the
/// bundle so an in-process retry does not repeat successful exchanges.
pub struct ChainResolver<'a> {
    client: &'a BrokerClient,
    grant: &'a dyn GrantFlow,
    bundle: &'a mut AccountBundle,
    force_all_expired: bool,
    updated: bool,
}

impl<'a> ChainResolver<'a> {
    pub fn new(
        client: &'a BrokerClient,
        grant: &'a dyn GrantFlow,
        bundle: &'a mut AccountBundle,
        force_all_expired: bool,
    ) -> Self {
        Self {
            client,
            grant,
            bundle,
            force_all_expired,
            updated: false,
        }
    }

    /// Resolve the session token, returning it together with whether any
    /// stage of the bundle changed.
    pub async fn resolve_session(mut self) -> Result<(Token, bool)> {
        let token = self.resolve(Stage::Session).await?;
        Ok((token, self.updated))
    }

    /// The per-stage get-or-produce step. Boxed because production of a
    /// non-root stage recurses into its upstream stage.
    fn resolve<'b>(
        &'b mut self,
        stage: Stage,
    ) -> Pin<Box<dyn Future<Output = Result<Token>> + Send + 'b>> {
        Box::pin(async move {
            if let Some(existing) = self.bundle.token(stage) {
                if !existing.is_expired(Utc::now()) && !self.force_all_expired {
                    debug!("reusing cached {stage} credential");
                    return Ok(existing.clone());
                }

                // refresh beats re-acquisition whenever the stage has the
                // mechanics for it, no matter how stale the credential is
                if stage == Stage::RootIdentity && existing.refresh_secret.is_some() {
                    let existing = existing.clone();
                    match self.grant.refresh(&existing).await {
                        Ok(refreshed) => return Ok(self.commit(stage, refreshed)),
                        Err(err) => {
                            warn!("failed to refresh {stage} credential, fetching a new one: {err}")
                        }
                    }
                }
            }

            let token = self
                .produce(stage)
                .await
                .map_err(|err| err.tag_stage(stage))?;
            Ok(self.commit(stage, token))
        })
    }

    /// Stage-specific fetch; non-root stages resolve their upstream first.
    async fn produce(&mut self, stage: Stage) -> Result<Token> {
        match stage {
            Stage::RootIdentity => self.grant.acquire().await,
            Stage::BrokerIdentity => {
                let root = self.resolve(Stage::RootIdentity).await?;
                self.client.broker_identity(&root.value).await
            }
            Stage::BrokerAuthorization => {
                let identity = self.resolve(Stage::BrokerIdentity).await?;
                self.client.broker_authorization(&identity).await
            }
            Stage::Session => {
                let authorization = self.resolve(Stage::BrokerAuthorization).await?;
                self.client.session_login(&authorization).await
            }
        }
    }

    fn commit(&mut self, stage: Stage, token: Token) -> Token {
        info!(
            "updated {stage} credential (expires at {})",
            token.expires_at
        );
        self.updated = true;
        self.bundle.set_token(stage, token.clone());
        token
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthConfig, Endpoints};
    use crate::errors::AuthError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Counting grant flow: optional failure injection for refresh
    #[derive(Default)]
    struct StubGrant {
        acquire_calls: AtomicUsize,
        refresh_calls: AtomicUsize,
        fail_refresh: bool,
    }

    impl StubGrant {
        fn failing_refresh() -> Self {
            Self {
                fail_refresh: true,
                ..Default::default()
            }
        }

        fn acquired(&self) -> usize {
            self.acquire_calls.load(Ordering::SeqCst)
        }

        fn refreshed(&self) -> usize {
            self.refresh_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl GrantFlow for StubGrant {
        async fn acquire(&self) -> Result<Token> {
            self.acquire_calls.fetch_add(1, Ordering::SeqCst);
            Ok(Token::root("acquired-root", Some("secret".into()), 3600))
        }

        async fn refresh(&self, _existing: &Token) -> Result<Token> {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_refresh {
                return Err(AuthError::InvalidResponse("refresh rejected".into()));
            }
            Ok(Token::root("refreshed-root", Some("secret".into()), 3600))
        }
    }

    fn client_for(server: &MockServer) -> BrokerClient {
        let mut config = AuthConfig::default();
        config.endpoints = Endpoints {
            broker_identity: format!("{}/user/authenticate", server.uri()),
            broker_authorization: format!("{}/xsts/authorize", server.uri()),
            session_login: format!("{}/login_with_xbox", server.uri()),
            ..Endpoints::default()
        };
        BrokerClient::new(&config).unwrap()
    }

    fn broker_body(token: &str) -> serde_json::Value {
        serde_json::json!({
            "Token": token,
            "DisplayClaims": { "xui": [ { "uhs": "hash" } ] },
            "NotAfter": "2099-01-01T00:00:00Z"
        })
    }

    fn session_body() -> serde_json::Value {
        serde_json::json!({
            "username": "ignored",
            "access_token": "session-token",
            "token_type": "Bearer",
            "expires_in": 86400
        })
    }

    async fn mount_full_chain(server: &MockServer, times: u64) {
        Mock::given(method("POST"))
            .and(path("/user/authenticate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(broker_body("xbl-token")))
            .expect(times)
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/xsts/authorize"))
            .respond_with(ResponseTemplate::new(200).set_body_json(broker_body("xsts-token")))
            .expect(times)
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/login_with_xbox"))
            .respond_with(ResponseTemplate::new(200).set_body_json(session_body()))
            .expect(times)
            .mount(server)
            .await;
    }

    fn valid_broker_token(value: &str) -> Token {
        Token::broker(
            value,
            "hash".to_string(),
            Utc::now() + chrono::Duration::hours(8),
        )
    }

    fn expired_broker_token(value: &str) -> Token {
        Token::broker(value, "hash".to_string(), Utc::now())
    }

    #[tokio::test]
    async fn valid_session_touches_nothing() {
        let server = MockServer::start().await;
        mount_full_chain(&server, 0).await;
        let client = client_for(&server);
        let grant = StubGrant::default();

        let mut bundle = AccountBundle {
            session: Some(Token::with_lifetime("cached-session", 3600)),
            ..Default::default()
        };

        let (token, updated) = ChainResolver::new(&client, &grant, &mut bundle, false)
            .resolve_session()
            .await
            .unwrap();

        assert_eq!(token.value, "cached-session");
        assert!(!updated);
        assert_eq!(grant.acquired(), 0);
        assert_eq!(grant.refreshed(), 0);
    }

    #[tokio::test]
    async fn empty_bundle_acquires_all_four_stages() {
        let server = MockServer::start().await;
        mount_full_chain(&server, 1).await;
        let client = client_for(&server);
        let grant = StubGrant::default();

        let mut bundle = AccountBundle::default();
        let (token, updated) = ChainResolver::new(&client, &grant, &mut bundle, false)
            .resolve_session()
            .await
            .unwrap();

        assert_eq!(token.value, "session-token");
        assert!(updated);
        assert_eq!(grant.acquired(), 1);
        assert_eq!(grant.refreshed(), 0);
        assert_eq!(bundle.root_identity.as_ref().unwrap().value, "acquired-root");
        assert_eq!(bundle.broker_identity.as_ref().unwrap().value, "xbl-token");
        assert_eq!(
            bundle.broker_authorization.as_ref().unwrap().value,
            "xsts-token"
        );
        assert_eq!(bundle.session.as_ref().unwrap().value, "session-token");
    }

    #[tokio::test]
    async fn expired_session_reuses_valid_upstream() {
        let server = MockServer::start().await;
        // only the session endpoint may be hit
        Mock::given(method("POST"))
            .and(path("/user/authenticate"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/xsts/authorize"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/login_with_xbox"))
            .respond_with(ResponseTemplate::new(200).set_body_json(session_body()))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let grant = StubGrant::default();

        let mut bundle = AccountBundle {
            root_identity: Some(Token::root("root", Some("secret".into()), 3600)),
            broker_identity: Some(valid_broker_token("xbl")),
            broker_authorization: Some(valid_broker_token("xsts")),
            session: Some(Token::with_lifetime("stale-session", 0)),
            ..Default::default()
        };

        let (token, updated) = ChainResolver::new(&client, &grant, &mut bundle, false)
            .resolve_session()
            .await
            .unwrap();

        assert_eq!(token.value, "session-token");
        assert!(updated);
        assert_eq!(grant.acquired(), 0);
        assert_eq!(grant.refreshed(), 0);
        // upstream tokens untouched
        assert_eq!(bundle.root_identity.as_ref().unwrap().value, "root");
        assert_eq!(bundle.broker_identity.as_ref().unwrap().value, "xbl");
    }

    #[tokio::test]
    async fn expired_root_with_secret_refreshes_once() {
        let server = MockServer::start().await;
        mount_full_chain(&server, 1).await;
        let client = client_for(&server);
        let grant = StubGrant::default();

        let mut bundle = AccountBundle {
            root_identity: Some(Token::root("old-root", Some("secret".into()), 0)),
            ..Default::default()
        };

        let (token, _) = ChainResolver::new(&client, &grant, &mut bundle, false)
            .resolve_session()
            .await
            .unwrap();

        assert_eq!(token.value, "session-token");
        assert_eq!(grant.refreshed(), 1);
        assert_eq!(grant.acquired(), 0);
        assert_eq!(
            bundle.root_identity.as_ref().unwrap().value,
            "refreshed-root"
        );
    }

    #[tokio::test]
    async fn refresh_failure_falls_back_to_acquisition() {
        let server = MockServer::start().await;
        mount_full_chain(&server, 1).await;
        let client = client_for(&server);
        let grant = StubGrant::failing_refresh();

        let mut bundle = AccountBundle {
            root_identity: Some(Token::root("old-root", Some("secret".into()), 0)),
            ..Default::default()
        };

        let (token, _) = ChainResolver::new(&client, &grant, &mut bundle, false)
            .resolve_session()
            .await
            .unwrap();

        assert_eq!(token.value, "session-token");
        assert_eq!(grant.refreshed(), 1);
        assert_eq!(grant.acquired(), 1);
        assert_eq!(
            bundle.root_identity.as_ref().unwrap().value,
            "acquired-root"
        );
    }

    #[tokio::test]
    async fn expired_root_without_secret_goes_straight_to_acquisition() {
        let server = MockServer::start().await;
        mount_full_chain(&server, 1).await;
        let client = client_for(&server);
        let grant = StubGrant::default();

        let mut bundle = AccountBundle {
            root_identity: Some(Token::root("old-root", None, 0)),
            ..Default::default()
        };

        let (token, _) = ChainResolver::new(&client, &grant, &mut bundle, false)
            .resolve_session()
            .await
            .unwrap();

        assert_eq!(token.value, "session-token");
        assert_eq!(grant.refreshed(), 0);
        assert_eq!(grant.acquired(), 1);
    }

    #[tokio::test]
    async fn force_all_expired_revalidates_every_stage() {
        let server = MockServer::start().await;
        mount_full_chain(&server, 1).await;
        let client = client_for(&server);
        let grant = StubGrant::default();

        // every token is far from its real expiry
        let mut bundle = AccountBundle {
            root_identity: Some(Token::root("root", Some("secret".into()), 7200)),
            broker_identity: Some(valid_broker_token("xbl")),
            broker_authorization: Some(valid_broker_token("xsts")),
            session: Some(Token::with_lifetime("session", 7200)),
            ..Default::default()
        };

        let (_, updated) = ChainResolver::new(&client, &grant, &mut bundle, true)
            .resolve_session()
            .await
            .unwrap();

        assert!(updated);
        // forced resolution still prefers refresh over re-acquisition
        assert_eq!(grant.refreshed(), 1);
        assert_eq!(grant.acquired(), 0);
    }

    #[tokio::test]
    async fn stage_failure_is_tagged_and_keeps_partial_progress() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/user/authenticate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(broker_body("xbl-token")))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/xsts/authorize"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let grant = StubGrant::default();

        let mut bundle = AccountBundle {
            broker_identity: Some(expired_broker_token("old-xbl")),
            ..Default::default()
        };

        let err = ChainResolver::new(&client, &grant, &mut bundle, false)
            .resolve_session()
            .await
            .unwrap_err();

        match err {
            AuthError::StageFetch { stage, .. } => {
                assert_eq!(stage, Stage::BrokerAuthorization)
            }
            other => panic!("expected StageFetch, got {other:?}"),
        }

        // upstream progress stays committed for an in-process retry
        assert_eq!(
            bundle.root_identity.as_ref().unwrap().value,
            "acquired-root"
        );
        assert_eq!(bundle.broker_identity.as_ref().unwrap().value, "xbl-token");
        assert!(bundle.session.is_none());
    }

    #[tokio::test]
    async fn grant_timeout_surfaces_distinctly() {
        struct TimingOutGrant;

        #[async_trait]
        impl GrantFlow for TimingOutGrant {
            async fn acquire(&self) -> Result<Token> {
                Err(AuthError::GrantFlowTimeout)
            }

            async fn refresh(&self, _existing: &Token) -> Result<Token> {
                Err(AuthError::MissingRefreshSecret)
            }
        }

        let server = MockServer::start().await;
        let client = client_for(&server);

        let mut bundle = AccountBundle::default();
        let err = ChainResolver::new(&client, &TimingOutGrant, &mut bundle, false)
            .resolve_session()
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::GrantFlowTimeout));
    }
}
