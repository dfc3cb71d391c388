//! Standalone client binary.
//!
//! Usage:
//!   cargo run -p arena_client -- [--addr 127.0.0.1:40000] [--name bot] [--secs 30]
//!
//! Connects, joins under `--name` and logs a summary of the mirrored world
//! once per second until Ctrl-C or until `--secs` have elapsed.

use std::{env, net::SocketAddr, time::Duration};

use anyhow::Context;
use arena_client::ArenaClient;
use tokio::time::Instant;
use tracing::{info, warn};

struct Args {
    addr: SocketAddr,
    name: String,
    secs: Option<u64>,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut parsed = Args {
        addr: "127.0.0.1:40000".parse().context("default addr")?,
        name: "bot".to_string(),
        secs: None,
    };
    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                parsed.addr = args[i + 1].parse().context("parse --addr")?;
                i += 2;
            }
            "--name" if i + 1 < args.len() => {
                parsed.name = args[i + 1].clone();
                i += 2;
            }
            "--secs" if i + 1 < args.len() => {
                parsed.secs = Some(args[i + 1].parse().context("parse --secs")?);
                i += 2;
            }
            _ => i += 1,
        }
    }
    Ok(parsed)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = parse_args()?;
    info!(server = %args.addr, name = %args.name, "Starting client");

    let mut client = ArenaClient::connect(args.addr).await.context("connect")?;
    let own = client.join(&args.name).await.context("join")?;
    info!(entity = ?own, entities = client.view.len(), "In the arena");

    let deadline = args.secs.map(|s| Instant::now() + Duration::from_secs(s));
    loop {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            res = client.collect_for(Duration::from_secs(1)) => {
                let msgs = match res {
                    Ok(msgs) => msgs,
                    Err(e) => {
                        warn!(error = %e, "Connection lost");
                        break;
                    }
                };
                let own_pos = client.view.get(own).map(|r| r.position);
                info!(
                    received = msgs.len(),
                    entities = client.view.len(),
                    updates = client.view.updates_seen(),
                    ?own_pos,
                    "View"
                );
            }
        }
    }

    info!("Client exiting");
    Ok(())
}
