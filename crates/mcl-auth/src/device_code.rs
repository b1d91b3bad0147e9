use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio::time::{Instant, sleep};
use tracing::{debug, info};

use crate::config::AuthConfig;
use crate::errors::{AuthError, Result};
use crate::grant::GrantFlow;
use crate::models::{DeviceAuthorizationResponse, OAuthErrorResponse, OAuthTokenResponse};
use crate::token::Token;

const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";
const AUTHORIZATION_PENDING: &str = "authorization_pending";

/// Device-code grant flow: the user enters a short code on a second device
/// while this process polls the token endpoint until the provider-declared
/// deadline.
#[derive(Debug, Clone)]
pub struct DeviceCodeGrantFlow {
    http: Client,
    client_id: String,
    scopes: String,
    device_authorization_url: String,
    token_url: String,
    deadline_cap: Option<Duration>,
}

impl DeviceCodeGrantFlow {
    pub fn new(config: &AuthConfig) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(config.http_timeouts.connect)
            .timeout(config.http_timeouts.request)
            .user_agent(config.user_agent.as_deref().unwrap_or("mclogin"))
            .build()?;

        Ok(Self {
            http,
            client_id: config.client_id.clone(),
            scopes: config.scopes.clone(),
            device_authorization_url: config.endpoints.device_authorization.clone(),
            token_url: config.endpoints.oauth_token.clone(),
            deadline_cap: config.grant_deadline_cap,
        })
    }

    async fn start(&self) -> Result<DeviceAuthorizationResponse> {
        let response = self
            .http
            .post(&self.device_authorization_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("scope", self.scopes.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Http {
                status,
                body_snippet: body.chars().take(200).collect(),
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl GrantFlow for DeviceCodeGrantFlow {
    async fn acquire(&self) -> Result<Token> {
        let start = self.start().await?;

        let mut lifetime = Duration::from_secs(start.expires_in);
        if let Some(cap) = self.deadline_cap {
            lifetime = lifetime.min(cap);
        }
        let deadline = Instant::now() + lifetime;
        let interval = Duration::from_secs(start.interval);

        info!(
            "starting device authorization (user code {}, expires in {}s): {}",
            start.user_code, start.expires_in, start.message
        );

        loop {
            sleep(interval).await;
            if Instant::now() >= deadline {
                return Err(AuthError::GrantFlowTimeout);
            }

            let response = self
                .http
                .post(&self.token_url)
                .form(&[
                    ("grant_type", DEVICE_CODE_GRANT),
                    ("device_code", start.device_code.as_str()),
                    ("client_id", self.client_id.as_str()),
                ])
                .send()
                .await?;

            if !response.status().is_success() {
                let body = response.text().await.unwrap_or_default();
                let error = serde_json::from_str::<OAuthErrorResponse>(&body)
                    .map(|e| e.error)
                    .unwrap_or_else(|_| body.chars().take(200).collect());

                if error == AUTHORIZATION_PENDING {
                    debug!("authorization pending, polling again in {interval:?}");
                    continue;
                }
                return Err(AuthError::GrantFlowDenied(error));
            }

            let tokens: OAuthTokenResponse = response.json().await?;
            return Ok(Token::root(
                tokens.access_token,
                tokens.refresh_token,
                tokens.expires_in,
            ));
        }
    }

    async fn refresh(&self, existing: &Token) -> Result<Token> {
        let secret = existing
            .refresh_secret
            .as_deref()
            .ok_or(AuthError::MissingRefreshSecret)?;

        debug!("refreshing root identity");
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", secret),
                ("client_id", self.client_id.as_str()),
                ("scope", self.scopes.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Http {
                status,
                body_snippet: body.chars().take(200).collect(),
            });
        }

        let tokens: OAuthTokenResponse = response.json().await?;
        // providers may omit a rotated refresh token; keep the old secret then
        let refresh_secret = tokens
            .refresh_token
            .or_else(|| existing.refresh_secret.clone());
        Ok(Token::root(
            tokens.access_token,
            refresh_secret,
            tokens.expires_in,
        ))
    }
}
