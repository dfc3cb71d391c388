//! Shared helpers for the socket-level integration tests.

use std::time::Duration;

use anyhow::Context;
use arena_server::ArenaServer;
use arena_shared::{
    config::{ArenaConfig, LayoutEntry},
    math::Vec2,
    net::{ClientMsg, ReliableConn, ServerMsg},
};

/// How long a test waits for a single expected message.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(3);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

/// Config with the spawner effectively idle and a terrain-only layout.
pub fn quiet_config() -> ArenaConfig {
    ArenaConfig {
        spawn_interval_ms: 3_600_000,
        rng_seed: Some(7),
        ..ArenaConfig::default()
    }
}

pub fn layout_entry(shape: &str, category: &str, position: Vec2) -> LayoutEntry {
    LayoutEntry {
        shape: shape.to_string(),
        category: category.to_string(),
        position,
        angle: 0.0,
    }
}

pub async fn start_server(cfg: ArenaConfig) -> anyhow::Result<ArenaServer> {
    init_tracing();
    ArenaServer::start_ephemeral(cfg).await
}

/// Raw framed connection for asserting on exact traffic.
pub async fn raw_connect(server: &ArenaServer) -> anyhow::Result<ReliableConn> {
    ReliableConn::connect(server.local_addr()).await
}

pub async fn send_join(conn: &mut ReliableConn, nickname: &str) -> anyhow::Result<()> {
    conn.send(&ClientMsg::Join {
        nickname: nickname.to_string(),
    })
    .await
}

/// Next message that is not a periodic `update`.
pub async fn recv_event(conn: &mut ReliableConn) -> anyhow::Result<ServerMsg> {
    loop {
        let msg = tokio::time::timeout(RECV_TIMEOUT, conn.recv::<ServerMsg>())
            .await
            .context("timed out waiting for message")??;
        if !matches!(msg, ServerMsg::Update(_)) {
            return Ok(msg);
        }
    }
}

/// Reads events until `joined` arrives; returns everything before it and
/// the assigned id.
pub async fn recv_until_joined(
    conn: &mut ReliableConn,
) -> anyhow::Result<(Vec<ServerMsg>, arena_shared::entity::EntityId)> {
    let mut before = Vec::new();
    loop {
        match recv_event(conn).await? {
            ServerMsg::Joined { id } => return Ok((before, id)),
            ServerMsg::Rejected { reason } => anyhow::bail!("join rejected: {reason}"),
            msg => before.push(msg),
        }
    }
}
