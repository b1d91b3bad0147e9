use std::time::Duration;

/// Identity chain endpoints (production defaults)
pub mod endpoints {
    pub const DEVICE_AUTHORIZATION: &str =
        "https://login.microsoftonline.com/consumers/oauth2/v2.0/devicecode";
    pub const OAUTH_TOKEN: &str =
        "https://login.microsoftonline.com/consumers/oauth2/v2.0/token";
    pub const BROKER_IDENTITY: &str = "https://user.auth.xboxlive.com/user/authenticate";
    pub const BROKER_AUTHORIZATION: &str = "https://xsts.auth.xboxlive.com/xsts/authorize";
    pub const SESSION_LOGIN: &str =
        "https://api.minecraftservices.com/authentication/login_with_xbox";
    pub const PROFILE: &str = "https://api.minecraftservices.com/minecraft/profile";
}

/// Well-known public client IDs usable with the device-code grant
pub mod public_clients {
    pub const MULTIMC: &str = "499546d9-bbfe-4b9b-a086-eb3d75afb78f";
    pub const PRISM: &str = "c36a9fb6-4f2a-41ff-90bd-ae7cc92031eb";
}

/// Default OAuth scopes for the device-code grant
pub const DEFAULT_SCOPES: &str = "XboxLive.signin offline_access";

/// Relying parties for the broker exchanges
pub const RP_BROKER: &str = "http://auth.xboxlive.com";
pub const RP_SESSION: &str = "rp://api.minecraftservices.com/";

/// Safety buffer subtracted from every provider-declared credential lifetime,
/// absorbing clock skew and in-flight request latency
pub const TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(10);

/// How long a cached profile record stays fresh, independent of token expiry
pub const DEFAULT_PROFILE_TTL: Duration = Duration::from_secs(8 * 60 * 60);

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpTimeouts {
    pub connect: Duration,
    pub request: Duration,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(30),
            request: Duration::from_secs(30),
        }
    }
}

/// Endpoint set used by the broker client and the device-code grant flow.
///
/// Defaults to the production services; tests point these at local stubs.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub device_authorization: String,
    pub oauth_token: String,
    pub broker_identity: String,
    pub broker_authorization: String,
    pub session_login: String,
    pub profile: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            device_authorization: endpoints::DEVICE_AUTHORIZATION.to_string(),
            oauth_token: endpoints::OAUTH_TOKEN.to_string(),
            broker_identity: endpoints::BROKER_IDENTITY.to_string(),
            broker_authorization: endpoints::BROKER_AUTHORIZATION.to_string(),
            session_login: endpoints::SESSION_LOGIN.to_string(),
            profile: endpoints::PROFILE.to_string(),
        }
    }
}

/// Explicit configuration for the whole credential chain.
///
/// Constructed once by the caller and passed into [`crate::Authenticator`];
/// there is no process-wide implicit state.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// OAuth client ID for the device-code grant
    pub client_id: String,

    /// Space-separated OAuth scopes
    pub scopes: String,

    /// Service endpoints
    pub endpoints: Endpoints,

    /// HTTP client timeouts
    pub http_timeouts: HttpTimeouts,

    /// Custom user agent (optional)
    pub user_agent: Option<String>,

    /// Freshness window for the cached profile record
    pub profile_ttl: Duration,

    /// Treat every cached credential as expired, forcing a full-chain
    /// re-validation (refresh is still preferred over re-acquisition)
    pub force_all_expired: bool,

    /// Optional upper bound on the interactive grant wait. The device-code
    /// provider declares its own lifetime; this clamps it when set.
    pub grant_deadline_cap: Option<Duration>,
}

impl AuthConfig {
    /// Config using a well-known public client ID
    pub fn with_client_id(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            scopes: DEFAULT_SCOPES.to_string(),
            endpoints: Endpoints::default(),
            http_timeouts: HttpTimeouts::default(),
            user_agent: Some("mclogin".to_string()),
            profile_ttl: DEFAULT_PROFILE_TTL,
            force_all_expired: false,
            grant_deadline_cap: None,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::with_client_id(public_clients::MULTIMC)
    }
}
