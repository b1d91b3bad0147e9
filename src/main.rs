use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use mcl_auth::{AuthConfig, Authenticator, CredentialStore, DeviceCodeGrantFlow};
use tracing_subscriber::EnvFilter;

/// Authenticate a Minecraft account and print its session credentials.
#[derive(Debug, Parser)]
#[command(name = "mclogin", version, about)]
struct Args {
    /// Account identifier (free-form, keys the credential store)
    account: String,

    /// OAuth client ID for the device-code grant
    #[arg(long)]
    client_id: Option<String>,

    /// Credential store file (defaults to the platform config dir)
    #[arg(long)]
    store: Option<PathBuf>,

    /// Treat every cached credential as expired and re-validate the whole chain
    #[arg(long)]
    force: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match args.client_id {
        Some(client_id) => AuthConfig::with_client_id(client_id),
        None => AuthConfig::default(),
    };
    config.force_all_expired = args.force;

    let store_path = match args.store {
        Some(path) => path,
        None => CredentialStore::default_path()
            .context("could not determine a config directory for the credential store")?,
    };

    let grant = Arc::new(DeviceCodeGrantFlow::new(&config)?);
    let mut auth = Authenticator::new(config, grant, store_path)?;

    let login = auth.login(&args.account).await?;

    println!("accessToken={}", login.session_token);
    println!("uuid={}", login.profile_id);
    println!("username={}", login.display_name);

    // give the background persistence a chance to finish before exiting
    auth.flush().await;

    Ok(())
}
