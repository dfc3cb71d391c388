//! Standalone server binary.
//!
//! Usage:
//!   cargo run -p arena_server -- [--config arena.json] [--addr 127.0.0.1:40000] [--tick-hz 60]
//!
//! Flags override values from the config file. The server runs until Ctrl-C.

use std::env;

use anyhow::Context;
use arena_server::ArenaServer;
use arena_shared::config::ArenaConfig;
use tracing::info;

fn parse_args() -> anyhow::Result<ArenaConfig> {
    let args: Vec<String> = env::args().collect();

    let mut cfg = match args.iter().position(|a| a == "--config") {
        Some(i) => {
            let path = args.get(i + 1).context("--config needs a path")?;
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("read config {path}"))?;
            ArenaConfig::from_json_str(&text).with_context(|| format!("parse config {path}"))?
        }
        None => ArenaConfig::default(),
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                cfg.server_addr = args[i + 1].clone();
                i += 2;
            }
            "--tick-hz" if i + 1 < args.len() => {
                cfg.tick_hz = args[i + 1].parse().context("parse --tick-hz")?;
                i += 2;
            }
            _ => i += 1,
        }
    }
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args()?;
    info!(
        addr = %cfg.server_addr,
        tick_hz = cfg.tick_hz,
        spawn_interval_ms = cfg.spawn_interval_ms,
        "Starting server"
    );

    let server = ArenaServer::start(cfg).await.context("start server")?;
    info!(local = %server.local_addr(), "Server ready, Ctrl-C to stop");

    tokio::signal::ctrl_c().await.context("wait for ctrl-c")?;
    server.shutdown().await;
    Ok(())
}
