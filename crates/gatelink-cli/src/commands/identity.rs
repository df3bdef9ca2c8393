//! Device identity commands.

use std::sync::Arc;

use clap::Args;
use console::style;
use gatelink_client::{FileIdentityStore, IdentityManager, IdentityStore};

use super::Context;

/// Identity command arguments.
#[derive(Args)]
pub struct IdentityArgs {
    #[command(subcommand)]
    pub command: IdentityCommand,
}

#[derive(clap::Subcommand)]
pub enum IdentityCommand {
    /// Show the device id and public key, creating the identity if needed
    Show,

    /// Delete the device identity and its device token
    Reset,
}

/// Run the identity command.
pub async fn run(ctx: &Context, args: IdentityArgs) -> anyhow::Result<()> {
    let store = Arc::new(
        FileIdentityStore::from_default_dir()
            .map_err(|e| anyhow::anyhow!("Failed to open identity store: {}", e))?,
    );
    let role = &ctx.config.client.role;

    match args.command {
        IdentityCommand::Show => {
            let manager = IdentityManager::new(store.clone());
            let identity = manager.get_or_create().await?;
            let token = store.load_device_token(identity.device_id(), role).await?;

            println!("{} {}", style("device id: ").bold(), identity.device_id());
            println!("{} {}", style("public key:").bold(), identity.public_key());
            println!("{} {}", style("stored in: ").bold(), store.base_dir().display());
            match token {
                Some(entry) => println!(
                    "{} {} ({})",
                    style("token:     ").bold(),
                    style("present").green(),
                    entry.role
                ),
                None => println!("{} {}", style("token:     ").bold(), style("none").dim()),
            }
        }

        IdentityCommand::Reset => {
            if let Some(stored) = store.load_identity().await? {
                store.clear_device_token(&stored.device_id, role).await?;
            }
            store.clear_identity().await?;
            println!("Device identity removed. A new one is created on next connect.");
        }
    }

    Ok(())
}
