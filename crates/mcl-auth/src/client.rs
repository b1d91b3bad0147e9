use chrono::{DateTime, Utc};
use reqwest::{Client, Response, StatusCode};
use tracing::debug;

use crate::config::{AuthConfig, Endpoints, RP_BROKER, RP_SESSION};
use crate::errors::{AuthError, Result, XstsDenied};
use crate::models::*;
use crate::profile::ProfileRecord;
use crate::token::Token;

/// HTTP client for the broker and game-session exchanges.
///
/// Each method performs exactly one network call; ordering and caching are the
/// chain resolver's concern.
#[derive(Debug, Clone)]
pub struct BrokerClient {
    http: Client,
    endpoints: Endpoints,
}

impl BrokerClient {
    pub fn new(config: &AuthConfig) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(config.http_timeouts.connect)
            .timeout(config.http_timeouts.request)
            .user_agent(config.user_agent.as_deref().unwrap_or("mclogin"))
            .build()?;

        Ok(Self {
            http,
            endpoints: config.endpoints.clone(),
        })
    }

    /// Exchange the root identity for a broker identity (Xbox user token)
    pub async fn broker_identity(&self, root_token: &str) -> Result<Token> {
        let request = BrokerIdentityRequest {
            properties: BrokerIdentityProperties {
                auth_method: "RPS".to_string(),
                site_name: "user.auth.xboxlive.com".to_string(),
                rps_ticket: format!("d={root_token}"),
            },
            relying_party: RP_BROKER.to_string(),
            token_type: "JWT".to_string(),
        };

        debug!("exchanging root identity for a broker identity");
        let response = self
            .http
            .post(&self.endpoints.broker_identity)
            .header("Accept", "application/json")
            .json(&request)
            .send()
            .await?;

        Self::broker_token(check_status(response).await?).await
    }

    /// Exchange the broker identity for a broker authorization (XSTS token)
    pub async fn broker_authorization(&self, identity: &Token) -> Result<Token> {
        let request = BrokerAuthorizationRequest {
            properties: BrokerAuthorizationProperties {
                sandbox_id: "RETAIL".to_string(),
                user_tokens: vec![identity.value.clone()],
            },
            relying_party: RP_SESSION.to_string(),
            token_type: "JWT".to_string(),
        };

        debug!("exchanging broker identity for a broker authorization");
        let response = self
            .http
            .post(&self.endpoints.broker_authorization)
            .header("Accept", "application/json")
            .json(&request)
            .send()
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            let error: BrokerErrorResponse = response.json().await?;
            return Err(XstsDenied::from_xerr(error.xerr).into());
        }

        Self::broker_token(check_status(response).await?).await
    }

    /// Exchange the broker authorization for a game-session token
    pub async fn session_login(&self, authorization: &Token) -> Result<Token> {
        let uhs = authorization.user_hash.as_deref().ok_or_else(|| {
            AuthError::InvalidResponse("broker authorization is missing its user hash".to_string())
        })?;
        let request = SessionLoginRequest {
            identity_token: format!("XBL3.0 x={uhs};{}", authorization.value),
        };

        debug!("logging in to the game-session service");
        let response = self
            .http
            .post(&self.endpoints.session_login)
            .header("Accept", "application/json")
            .json(&request)
            .send()
            .await?;

        let login: SessionLoginResponse = check_status(response).await?.json().await?;
        Ok(Token::with_lifetime(login.access_token, login.expires_in))
    }

    /// Fetch the game profile for a session token
    pub async fn fetch_profile(&self, session_token: &str) -> Result<ProfileRecord> {
        debug!("fetching game profile");
        let response = self
            .http
            .get(&self.endpoints.profile)
            .header("Accept", "application/json")
            .bearer_auth(session_token)
            .send()
            .await?;

        // the identity exists but has no game profile attached
        if response.status() == StatusCode::NOT_FOUND {
            return Err(AuthError::ProfileNotFound);
        }

        let profile: ProfileResponse = check_status(response).await?.json().await?;
        Ok(ProfileRecord {
            stable_id: profile.id,
            display_name: profile.name,
            fetched_at: Utc::now(),
        })
    }

    async fn broker_token(response: Response) -> Result<Token> {
        let body: BrokerTokenResponse = response.json().await?;
        let uhs = body
            .display_claims
            .xui
            .first()
            .ok_or_else(|| AuthError::InvalidResponse("missing xui claims".to_string()))?
            .uhs
            .clone();

        Ok(Token::broker(body.token, uhs, parse_not_after(&body.not_after)?))
    }
}

fn parse_not_after(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| AuthError::InvalidResponse(format!("unparseable NotAfter '{raw}': {err}")))
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(AuthError::Http {
        status,
        body_snippet: body.chars().take(200).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(server: &MockServer) -> AuthConfig {
        let mut config = AuthConfig::default();
        config.endpoints = Endpoints {
            device_authorization: format!("{}/devicecode", server.uri()),
            oauth_token: format!("{}/token", server.uri()),
            broker_identity: format!("{}/user/authenticate", server.uri()),
            broker_authorization: format!("{}/xsts/authorize", server.uri()),
            session_login: format!("{}/login_with_xbox", server.uri()),
            profile: format!("{}/profile", server.uri()),
        };
        config
    }

    fn broker_body(token: &str, uhs: &str) -> serde_json::Value {
        serde_json::json!({
            "Token": token,
            "DisplayClaims": { "xui": [ { "uhs": uhs } ] },
            "NotAfter": "2099-01-01T00:00:00Z",
            "IssueInstant": "2020-01-01T00:00:00Z"
        })
    }

    #[tokio::test]
    async fn broker_identity_sends_prefixed_ticket() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/user/authenticate"))
            .and(body_string_contains("d=root-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(broker_body("xbl", "hash")))
            .expect(1)
            .mount(&server)
            .await;

        let client = BrokerClient::new(&test_config(&server)).unwrap();
        let token = client.broker_identity("root-token").await.unwrap();
        assert_eq!(token.value, "xbl");
        assert_eq!(token.user_hash.as_deref(), Some("hash"));
        assert!(token.expires_at < Utc::now() + chrono::Duration::days(40 * 365));
    }

    #[tokio::test]
    async fn broker_authorization_maps_xerr_denials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/xsts/authorize"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "XErr": 2148916233u64,
                "Message": ""
            })))
            .mount(&server)
            .await;

        let client = BrokerClient::new(&test_config(&server)).unwrap();
        let identity = Token::broker("xbl", "hash".to_string(), Utc::now());
        let err = client.broker_authorization(&identity).await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::XstsDenied(XstsDenied::NoXboxAccount)
        ));
    }

    #[tokio::test]
    async fn session_login_builds_identity_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login_with_xbox"))
            .and(body_string_contains("XBL3.0 x=hash;xsts-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "username": "ignored",
                "access_token": "session-token",
                "token_type": "Bearer",
                "expires_in": 86400
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = BrokerClient::new(&test_config(&server)).unwrap();
        let authorization = Token::broker(
            "xsts-token",
            "hash".to_string(),
            Utc::now() + chrono::Duration::hours(1),
        );
        let session = client.session_login(&authorization).await.unwrap();
        assert_eq!(session.value, "session-token");
        assert!(session.user_hash.is_none());
    }

    #[tokio::test]
    async fn profile_not_found_is_distinct() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/profile"))
            .and(header("Authorization", "Bearer session-token"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = BrokerClient::new(&test_config(&server)).unwrap();
        let err = client.fetch_profile("session-token").await.unwrap_err();
        assert!(matches!(err, AuthError::ProfileNotFound));
    }
}
