//! Gatelink command-line interface.

pub mod commands;
pub mod render;

use clap::{Parser, Subcommand};

/// Gatelink - authenticated gateway client
#[derive(Parser)]
#[command(name = "gatelink")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to config file
    #[arg(short, long, env = "GATELINK_CONFIG", global = true)]
    pub config: Option<std::path::PathBuf>,

    /// Gateway URL (overrides the config file)
    #[arg(long, env = "GATELINK_URL", global = true)]
    pub url: Option<String>,

    /// Shared gateway token (overrides the config file)
    #[arg(long, env = "GATELINK_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Connect and stream gateway events until interrupted
    Watch(commands::gateway::WatchArgs),

    /// Call a gateway method and print the response
    Call(commands::gateway::CallArgs),

    /// Chat session commands
    Chat(commands::chat::ChatArgs),

    /// Manage the device identity
    Identity(commands::identity::IdentityArgs),

    /// Configuration management
    Config(commands::config::ConfigArgs),

    /// Show version information
    Version,
}

/// Run the CLI with the given arguments.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let ctx = commands::Context::from_cli(&cli)?;
    match cli.command {
        Commands::Watch(args) => commands::gateway::watch(&ctx, args).await,
        Commands::Call(args) => commands::gateway::call(&ctx, args).await,
        Commands::Chat(args) => commands::chat::run(&ctx, args).await,
        Commands::Identity(args) => commands::identity::run(&ctx, args).await,
        Commands::Config(args) => commands::config::run(&ctx, args).await,
        Commands::Version => {
            println!("gatelink {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
