//! Federated credential chain for Minecraft-style game logins.
//!
//! Authenticates a local account against the three-hop identity chain
//! (Microsoft OAuth2 → Xbox console-identity broker → game-session service)
//! and exposes the short-lived session token plus a cached profile, while
//! persisting every intermediate credential so subsequent runs avoid
//! redundant interactive logins.
//!
//! # Credential chain
//!
//! 1. **Root identity**: OAuth2 access/refresh token, acquired interactively
//!    through a [`GrantFlow`] (the bundled reference is the device-code flow)
//! 2. **Broker identity**: Xbox Live user token derived from the root
//! 3. **Broker authorization**: XSTS token scoped to the game services
//! 4. **Session**: the bearer token the game-profile service accepts
//!
//! Each stage is reused while valid, refreshed when its mechanics allow it,
//! and re-acquired as the fallback of last resort; downstream stages pull
//! their upstream dependency lazily, so a valid cached session touches no
//! network at all.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use mcl_auth::{AuthConfig, Authenticator, CredentialStore, DeviceCodeGrantFlow};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AuthConfig::default();
//!     let grant = Arc::new(DeviceCodeGrantFlow::new(&config)?);
//!     let store_path = CredentialStore::default_path().expect("config dir");
//!
//!     let mut auth = Authenticator::new(config, grant, store_path)?;
//!     let login = auth.login("alice").await?;
//!     println!("logged in as {} ({})", login.display_name, login.profile_id);
//!
//!     // best-effort flush of the credential store before exit
//!     auth.flush().await;
//!     Ok(())
//! }
//! ```

pub mod authenticator;
pub mod client;
pub mod config;
pub mod device_code;
pub mod errors;
pub mod grant;
pub mod models;
pub mod persist;
pub mod profile;
pub mod resolver;
pub mod store;
pub mod token;

pub use authenticator::{Authenticator, LoginData};
pub use client::BrokerClient;
pub use config::{AuthConfig, Endpoints, HttpTimeouts};
pub use device_code::DeviceCodeGrantFlow;
pub use errors::{AuthError, Result, XstsDenied};
pub use grant::GrantFlow;
pub use persist::PersistenceScheduler;
pub use profile::{ProfileCache, ProfileRecord};
pub use resolver::ChainResolver;
pub use store::{AccountBundle, CredentialStore};
pub use token::{Stage, Token};
