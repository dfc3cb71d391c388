use std::time::Duration;

use arena_client::ArenaClient;
use arena_tests::{quiet_config, start_server};

/// Smoke test: server runs a few ticks and shuts down cleanly.
#[tokio::test]
async fn server_runs_and_shuts_down() -> anyhow::Result<()> {
    let server = start_server(quiet_config()).await?;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let status = server.status().await;
    assert_eq!(status.known, 1);
    assert_eq!(status.statics, 0);
    assert_eq!(status.dynamics, 0);
    assert_eq!(status.connections, 0);

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn status_tracks_a_connected_player() -> anyhow::Result<()> {
    let server = start_server(quiet_config()).await?;
    let mut client = ArenaClient::connect(server.local_addr()).await?;
    let id = client.join("smoke").await?;

    let status = server.status().await;
    assert_eq!(status.sessions, 1);
    assert_eq!(status.dynamics, 1);
    assert_eq!(status.connections, 1);
    assert!(server.world().get(id).await.is_some());

    server.shutdown().await;
    Ok(())
}
