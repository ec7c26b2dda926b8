//! greenroomd - hosts one built-in greenroom agent per process.
//!
//! ```text
//! greenroomd exact-match --port 9018
//! greenroomd echo --port 9019
//! ```
//!
//! The agent stops on `POST /shutdown` or Ctrl-C.

mod agents;

use std::net::{IpAddr, SocketAddr};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::Level;

use agents::AgentKind;

#[derive(Parser)]
#[command(name = "greenroomd")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Serve a built-in greenroom agent over HTTP", long_about = None)]
struct Cli {
    /// Agent to host
    #[arg(value_enum)]
    agent: AgentKind,

    /// Address to bind
    #[arg(long, default_value = "127.0.0.1", env = "GREENROOMD_HOST")]
    host: IpAddr,

    /// Port to bind (0 picks a free one)
    #[arg(short, long, default_value_t = 9009, env = "GREENROOMD_PORT")]
    port: u16,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    greenroom_core::init_tracing(cli.json, level);

    let addr = SocketAddr::new(cli.host, cli.port);
    let host = agents::host(cli.agent)?;
    let bound = host
        .bind(addr)
        .await
        .with_context(|| format!("cannot serve {} on {addr}", cli.agent))?;
    tracing::info!(agent = %cli.agent, endpoint = %bound.endpoint(), "agent ready");

    bound
        .serve_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "cannot listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await?;
    Ok(())
}
