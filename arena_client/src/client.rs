//! Client implementation.
//!
//! The client maintains:
//! - A framed TCP connection; a reader task feeds decoded messages into a
//!   channel so waiting with a timeout never cuts a frame in half
//! - A mirrored [`WorldView`] updated from every received message
//! - The id of its own player once joined

use std::{net::SocketAddr, time::Duration};

use anyhow::Context;
use arena_shared::{
    entity::EntityId,
    net::{ClientMsg, FrameReader, FrameWriter, ReliableConn, ServerMsg},
};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{self, Instant},
};
use tracing::{debug, info};

use crate::view::WorldView;

/// Headless arena client.
pub struct ArenaClient {
    writer: FrameWriter,
    inbox: mpsc::UnboundedReceiver<anyhow::Result<ServerMsg>>,
    reader: JoinHandle<()>,
    pub view: WorldView,
    pub own_id: Option<EntityId>,
}

async fn read_loop(
    mut reader: FrameReader,
    tx: mpsc::UnboundedSender<anyhow::Result<ServerMsg>>,
) {
    loop {
        let res = reader.recv::<ServerMsg>().await;
        let failed = res.is_err();
        if tx.send(res).is_err() || failed {
            break;
        }
    }
}

impl ArenaClient {
    pub async fn connect(addr: SocketAddr) -> anyhow::Result<Self> {
        info!(server = %addr, "Connecting to server");
        let conn = ReliableConn::connect(addr).await?;
        let (reader, writer) = conn.into_split();
        let (tx, inbox) = mpsc::unbounded_channel();
        let reader = tokio::spawn(read_loop(reader, tx));
        Ok(Self {
            writer,
            inbox,
            reader,
            view: WorldView::new(),
            own_id: None,
        })
    }

    /// Sends `join` and waits for the reply, applying everything received
    /// on the way.
    pub async fn join(&mut self, nickname: &str) -> anyhow::Result<EntityId> {
        self.writer
            .send(&ClientMsg::Join {
                nickname: nickname.to_string(),
            })
            .await?;
        loop {
            match self.recv().await? {
                ServerMsg::Joined { id } => {
                    info!(entity = ?id, nickname, "Joined");
                    self.own_id = Some(id);
                    return Ok(id);
                }
                ServerMsg::Rejected { reason } => anyhow::bail!("join rejected: {reason}"),
                _ => {}
            }
        }
    }

    /// Receives one message and applies it to the view.
    pub async fn recv(&mut self) -> anyhow::Result<ServerMsg> {
        let msg = self.inbox.recv().await.context("connection closed")??;
        self.view.apply(&msg);
        Ok(msg)
    }

    /// Like [`ArenaClient::recv`] but gives up after `timeout`.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> anyhow::Result<Option<ServerMsg>> {
        match time::timeout(timeout, self.recv()).await {
            Ok(res) => res.map(Some),
            Err(_) => Ok(None),
        }
    }

    /// Receives until `pred` holds for the view or `timeout` elapses.
    /// Returns whether the condition was met.
    pub async fn wait_until(
        &mut self,
        timeout: Duration,
        pred: impl Fn(&WorldView) -> bool,
    ) -> anyhow::Result<bool> {
        let deadline = Instant::now() + timeout;
        while !pred(&self.view) {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return Ok(false);
            }
            if let Some(msg) = self.recv_timeout(left).await? {
                debug!(?msg, "Received");
            }
        }
        Ok(true)
    }

    /// Receives everything that arrives within `window`; returns the
    /// messages in order.
    pub async fn collect_for(&mut self, window: Duration) -> anyhow::Result<Vec<ServerMsg>> {
        let deadline = Instant::now() + window;
        let mut out = Vec::new();
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return Ok(out);
            }
            match self.recv_timeout(left).await? {
                Some(msg) => out.push(msg),
                None => return Ok(out),
            }
        }
    }
}

impl Drop for ArenaClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
