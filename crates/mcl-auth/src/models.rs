use serde::{Deserialize, Serialize};

/// OAuth device-authorization response
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceAuthorizationResponse {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    /// Human-readable instruction to display to the user
    pub message: String,
    /// Polling cadence in seconds
    pub interval: u64,
    /// Lifetime of the device code in seconds
    pub expires_in: u64,
}

/// OAuth token response (device-code and refresh_token grants)
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthTokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: u64,
}

/// OAuth error response body
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthErrorResponse {
    pub error: String,
}

/// Xbox user.authenticate request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BrokerIdentityRequest {
    pub properties: BrokerIdentityProperties,
    pub relying_party: String,
    pub token_type: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BrokerIdentityProperties {
    pub auth_method: String,
    pub site_name: String,
    pub rps_ticket: String,
}

/// XSTS authorize request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BrokerAuthorizationRequest {
    pub properties: BrokerAuthorizationProperties,
    pub relying_party: String,
    pub token_type: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BrokerAuthorizationProperties {
    pub sandbox_id: String,
    pub user_tokens: Vec<String>,
}

/// Shared response shape of user.authenticate and xsts/authorize
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BrokerTokenResponse {
    pub token: String,
    pub display_claims: BrokerDisplayClaims,
    pub not_after: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerDisplayClaims {
    pub xui: Vec<BrokerUserInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerUserInfo {
    pub uhs: String,
}

/// XSTS error response
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerErrorResponse {
    #[serde(rename = "XErr")]
    pub xerr: u64,
    #[serde(rename = "Message", default)]
    pub message: Option<String>,
}

/// Game-session login_with_xbox request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionLoginRequest {
    pub identity_token: String,
}

/// Game-session login_with_xbox response
#[derive(Debug, Clone, Deserialize)]
pub struct SessionLoginResponse {
    pub access_token: String,
    pub expires_in: u64,
}

/// Game profile response
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileResponse {
    /// UUID without dashes
    pub id: String,
    /// Player name
    pub name: String,
}
