//! Chat session commands.

use clap::Args;
use console::style;

use super::{Context, CONNECT_WAIT};
use crate::render;

/// Chat command arguments.
#[derive(Args)]
pub struct ChatArgs {
    #[command(subcommand)]
    pub command: ChatCommand,
}

#[derive(clap::Subcommand)]
pub enum ChatCommand {
    /// Print recent messages of a session
    History {
        /// Session key
        session: String,

        /// Maximum number of messages
        #[arg(short, long)]
        limit: Option<u32>,
    },

    /// Send a message to a session
    Send {
        /// Session key
        session: String,

        /// Message text
        message: String,
    },

    /// Stop the reply currently running in a session
    Abort {
        /// Session key
        session: String,

        /// Run to stop (defaults to whatever is running)
        #[arg(long)]
        run_id: Option<String>,
    },
}

/// Run the chat command.
pub async fn run(ctx: &Context, args: ChatArgs) -> anyhow::Result<()> {
    let client = ctx.connect(CONNECT_WAIT).await?;

    let result = match args.command {
        ChatCommand::History { session, limit } => {
            client.chat_history(&session, limit).await.map(|history| {
                for message in &history.messages {
                    render::render_chat_message(message);
                }
                if let Some(level) = history.thinking_level {
                    eprintln!("{} {}", style("thinking:").dim(), level);
                }
            })
        }
        ChatCommand::Send { session, message } => {
            client.chat_send(&session, &message).await.map(|ack| {
                println!("{}", ack.run_id);
                if let Some(status) = ack.status {
                    eprintln!("{} {}", style("status:").dim(), status);
                }
            })
        }
        ChatCommand::Abort { session, run_id } => client
            .chat_abort(&session, run_id.as_deref())
            .map(|_| eprintln!("abort requested")),
    };

    // Wait for the close so a queued abort reaches the gateway before exit.
    client.shutdown().await?;
    Ok(result?)
}
