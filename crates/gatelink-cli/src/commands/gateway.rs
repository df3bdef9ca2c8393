//! Live gateway commands: `watch` and `call`.

use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use gatelink_client::ConnectionListener;
use gatelink_client::{ClientOptions, GatewayClient};
use gatelink_core::{EventFrame, HelloOk};
use serde_json::Value;
use tracing::warn;

use super::{Context, CONNECT_WAIT};
use crate::render;

/// Watch command arguments.
#[derive(Args)]
pub struct WatchArgs {
    /// Only print events whose name starts with one of these prefixes
    #[arg(short, long)]
    pub event: Vec<String>,
}

/// Call command arguments.
#[derive(Args)]
pub struct CallArgs {
    /// Method name
    pub method: String,

    /// Parameters as a JSON object
    #[arg(short, long)]
    pub params: Option<String>,

    /// Request timeout in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,
}

struct PrintListener {
    prefixes: Vec<String>,
}

impl PrintListener {
    fn wants(&self, name: &str) -> bool {
        self.prefixes.is_empty() || self.prefixes.iter().any(|p| name.starts_with(p.as_str()))
    }
}

impl ConnectionListener for PrintListener {
    fn on_event(&self, event: &EventFrame) {
        if self.wants(&event.event) {
            render::render_event(event);
        }
    }

    fn on_connected(&self, hello: &HelloOk) {
        eprintln!("connected (protocol {})", hello.protocol);
    }

    fn on_disconnected(&self, code: u16, reason: &str) {
        eprintln!("disconnected ({}): {}", code, reason);
    }

    fn on_gap(&self, expected: u64, received: u64) {
        warn!(expected, received, "missed gateway events");
    }
}

/// Connect and print events until Ctrl-C. Reconnects on its own.
pub async fn watch(ctx: &Context, args: WatchArgs) -> anyhow::Result<()> {
    ctx.config.validate()?;
    let client = GatewayClient::new(ClientOptions::from_config(&ctx.config), ctx.identity_store()?);
    client.set_listener(Arc::new(PrintListener { prefixes: args.event }))?;

    let mut status = client.watch_status();
    client.connect()?;

    loop {
        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = status.borrow_and_update().clone();
                render::render_status(&current);
            }
            _ = tokio::signal::ctrl_c() => {
                eprintln!();
                break;
            }
        }
    }

    client.shutdown().await?;
    Ok(())
}

/// Call one method and print its payload.
pub async fn call(ctx: &Context, args: CallArgs) -> anyhow::Result<()> {
    let params = parse_params(args.params.as_deref())?;
    let client = ctx.connect(CONNECT_WAIT).await?;

    let result = match args.timeout_ms {
        Some(ms) => {
            client
                .rpc_with_timeout(&args.method, params, Duration::from_millis(ms))
                .await
        }
        None => client.rpc(&args.method, params).await,
    };
    client.shutdown().await?;

    let payload = result?;
    render::render_json(&payload);
    Ok(())
}

/// Parse `--params`; absent means an empty object.
pub fn parse_params(raw: Option<&str>) -> anyhow::Result<Value> {
    match raw {
        None => Ok(Value::Object(Default::default())),
        Some(raw) => {
            let value: Value = serde_json::from_str(raw)
                .map_err(|e| anyhow::anyhow!("Invalid --params JSON: {}", e))?;
            if !value.is_object() {
                anyhow::bail!("--params must be a JSON object");
            }
            Ok(value)
        }
    }
}
