//! CLI command implementations.

pub mod chat;
pub mod config;
pub mod gateway;
pub mod identity;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use gatelink_client::{ClientOptions, FileIdentityStore, GatewayClient, IdentityStore};
use gatelink_core::{paths, Config, ConfigError, SecretString};

use crate::Cli;

/// Settings shared by every command.
pub struct Context {
    /// Loaded configuration with command-line overrides applied.
    pub config: Config,

    /// Config file in use.
    pub config_path: PathBuf,
}

impl Context {
    /// Load the config named on the command line, or the default one.
    pub fn from_cli(cli: &Cli) -> anyhow::Result<Self> {
        let (mut config, config_path) = match &cli.config {
            Some(path) => {
                let path = paths::expand_tilde(&path.to_string_lossy());
                let config = match Config::load(&path) {
                    Ok(config) => config,
                    Err(ConfigError::NotFound(_)) => Config::default(),
                    Err(e) => anyhow::bail!("Failed to load {}: {}", path.display(), e),
                };
                (config, path)
            }
            None => (Config::load_or_default(), paths::config_file()?),
        };

        if let Some(url) = &cli.url {
            config.gateway.url = url.clone();
        }
        if let Some(token) = &cli.token {
            config.gateway.token = SecretString::new(token.as_str()).non_blank();
        }

        Ok(Self {
            config,
            config_path,
        })
    }

    /// Identity store under the default directory.
    pub fn identity_store(&self) -> anyhow::Result<Arc<dyn IdentityStore>> {
        let store = FileIdentityStore::from_default_dir()
            .map_err(|e| anyhow::anyhow!("Failed to open identity store: {}", e))?;
        Ok(Arc::new(store))
    }

    /// Connect to the gateway and wait for the handshake.
    pub async fn connect(&self, wait: Duration) -> anyhow::Result<GatewayClient> {
        self.config.validate()?;
        let client = GatewayClient::new(ClientOptions::from_config(&self.config), self.identity_store()?);
        client.connect()?;
        if let Err(e) = client.wait_until_connected(wait).await {
            let status = client.status();
            client.shutdown().await?;
            anyhow::bail!(
                "Could not connect to {}: {}",
                self.config.gateway.url,
                status.error.unwrap_or_else(|| e.to_string())
            );
        }
        Ok(client)
    }
}

/// How long one-shot commands wait for the handshake.
pub(crate) const CONNECT_WAIT: Duration = Duration::from_secs(15);
