//! Outbound transport.
//!
//! The world and session code publish through [`Transport`] and never touch
//! sockets. Broadcasts reach every open connection, joined or not. Sends are
//! fire-and-forget: a failure on one connection is logged and never aborts
//! delivery to the others.
//!
//! [`TcpHub`] gives each connection two bounded queues drained by a writer
//! task. `update` frames that do not fit are dropped; a connection whose
//! reliable queue fills up is cut off, since it can no longer be kept in
//! sync.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU32, Ordering},
        Mutex, MutexGuard, PoisonError,
    },
};

use arena_shared::net::{encode_frame, FrameWriter, ServerMsg};
use bytes::Bytes;
use tokio::sync::{
    mpsc::{self, error::TrySendError},
    oneshot,
};
use tracing::{debug, warn};

/// Frames of unreliable traffic a connection may lag behind before drops.
pub const UNRELIABLE_QUEUE: usize = 4;

/// Reliable frames a connection may lag behind before it is cut off.
pub const RELIABLE_QUEUE: usize = 1024;

static NEXT_CONN_ID: AtomicU32 = AtomicU32::new(1);

/// Identifies a transport connection. Independent of entity ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(pub u32);

impl ConnId {
    pub fn new_unique() -> Self {
        ConnId(NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Publish primitive consumed by the synchronization layer.
pub trait Transport: Send + Sync {
    /// Delivers to every open connection.
    fn broadcast_reliable(&self, msg: &ServerMsg);
    /// Best-effort delivery; a dropped message is superseded by the next one.
    fn broadcast_unreliable(&self, msg: &ServerMsg);
    fn send_to(&self, conn: ConnId, msg: &ServerMsg);
    /// Stops all delivery to `conn`. Unknown connections are ignored.
    fn close(&self, conn: ConnId);
}

struct Outbox {
    reliable: mpsc::Sender<Bytes>,
    unreliable: mpsc::Sender<Bytes>,
}

/// TCP-backed transport: one writer task per registered connection.
#[derive(Default)]
pub struct TcpHub {
    conns: Mutex<HashMap<ConnId, Outbox>>,
}

impl TcpHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn outboxes(&self) -> MutexGuard<'_, HashMap<ConnId, Outbox>> {
        self.conns.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a connection and spawns its writer task.
    ///
    /// The returned receiver resolves once the writer task has exited,
    /// either because the socket failed or the connection was closed.
    pub fn register(&self, conn: ConnId, writer: FrameWriter) -> oneshot::Receiver<()> {
        let (reliable_tx, reliable_rx) = mpsc::channel(RELIABLE_QUEUE);
        let (unreliable_tx, unreliable_rx) = mpsc::channel(UNRELIABLE_QUEUE);
        let (gone_tx, gone_rx) = oneshot::channel();
        self.outboxes().insert(
            conn,
            Outbox {
                reliable: reliable_tx,
                unreliable: unreliable_tx,
            },
        );
        tokio::spawn(write_loop(conn, writer, reliable_rx, unreliable_rx, gone_tx));
        gone_rx
    }

    /// Drops a connection's queues; its writer task exits once drained.
    pub fn unregister(&self, conn: ConnId) {
        self.outboxes().remove(&conn);
    }

    pub fn len(&self) -> usize {
        self.outboxes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn encode(msg: &ServerMsg) -> Option<Bytes> {
    match encode_frame(msg) {
        Ok(frame) => Some(frame),
        Err(e) => {
            warn!(error = %e, "Failed to encode outbound message");
            None
        }
    }
}

/// Queues a reliable frame. Returns false when the connection must be cut.
fn push_reliable(conn: ConnId, outbox: &Outbox, frame: Bytes) -> bool {
    match outbox.reliable.try_send(frame) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            warn!(conn = ?conn, limit = RELIABLE_QUEUE, "Connection fell behind, cutting it off");
            false
        }
        Err(TrySendError::Closed(_)) => {
            warn!(conn = ?conn, "Reliable send to closed connection");
            true
        }
    }
}

impl Transport for TcpHub {
    fn broadcast_reliable(&self, msg: &ServerMsg) {
        let Some(frame) = encode(msg) else { return };
        let mut conns = self.outboxes();
        let lagging: Vec<ConnId> = conns
            .iter()
            .filter(|(conn, outbox)| !push_reliable(**conn, outbox, frame.clone()))
            .map(|(conn, _)| *conn)
            .collect();
        for conn in lagging {
            conns.remove(&conn);
        }
    }

    fn broadcast_unreliable(&self, msg: &ServerMsg) {
        let Some(frame) = encode(msg) else { return };
        for (conn, outbox) in self.outboxes().iter() {
            match outbox.unreliable.try_send(frame.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => debug!(conn = ?conn, "Dropped unreliable frame"),
                Err(TrySendError::Closed(_)) => {
                    warn!(conn = ?conn, "Unreliable send to closed connection")
                }
            }
        }
    }

    fn send_to(&self, conn: ConnId, msg: &ServerMsg) {
        let Some(frame) = encode(msg) else { return };
        let mut conns = self.outboxes();
        let keep = match conns.get(&conn) {
            Some(outbox) => push_reliable(conn, outbox, frame),
            None => {
                debug!(conn = ?conn, "Direct send to unknown connection");
                return;
            }
        };
        if !keep {
            conns.remove(&conn);
        }
    }

    fn close(&self, conn: ConnId) {
        self.unregister(conn);
    }
}

async fn write_loop(
    conn: ConnId,
    mut writer: FrameWriter,
    mut reliable: mpsc::Receiver<Bytes>,
    mut unreliable: mpsc::Receiver<Bytes>,
    _gone: oneshot::Sender<()>,
) {
    loop {
        let frame = tokio::select! {
            biased;
            Some(frame) = reliable.recv() => frame,
            Some(frame) = unreliable.recv() => frame,
            else => break,
        };
        if let Err(e) = writer.send_frame(&frame).await {
            warn!(conn = ?conn, error = %e, "Writer stopped");
            break;
        }
    }
    debug!(conn = ?conn, "Writer exited");
}

/// One recorded outbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Reliable(ServerMsg),
    Unreliable(ServerMsg),
    Direct(ConnId, ServerMsg),
    Opened(ConnId),
    Closed(ConnId),
}

/// Transport that records every outbound event in order.
///
/// Used to drive the server headless and to assert on exact traffic.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    log: Mutex<Vec<Delivery>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, d: Delivery) {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).push(d);
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn clear(&self) {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    /// Marks `conn` as open, the way [`TcpHub::register`] does.
    pub fn open(&self, conn: ConnId) {
        self.push(Delivery::Opened(conn));
    }

    /// Reliable broadcasts in order, regardless of who was connected.
    pub fn reliable_broadcasts(&self) -> Vec<ServerMsg> {
        self.deliveries()
            .into_iter()
            .filter_map(|d| match d {
                Delivery::Reliable(msg) => Some(msg),
                _ => None,
            })
            .collect()
    }

    pub fn unreliable_broadcasts(&self) -> Vec<ServerMsg> {
        self.deliveries()
            .into_iter()
            .filter_map(|d| match d {
                Delivery::Unreliable(msg) => Some(msg),
                _ => None,
            })
            .collect()
    }

    /// Everything `conn` would have received: broadcasts made while it
    /// was open, plus its direct messages.
    pub fn inbox(&self, conn: ConnId) -> Vec<ServerMsg> {
        let mut open = false;
        let mut out = Vec::new();
        for d in self.deliveries() {
            match d {
                Delivery::Opened(c) if c == conn => open = true,
                Delivery::Closed(c) if c == conn => open = false,
                Delivery::Direct(c, msg) if c == conn && open => out.push(msg),
                Delivery::Reliable(msg) | Delivery::Unreliable(msg) if open => out.push(msg),
                _ => {}
            }
        }
        out
    }
}

impl Transport for RecordingTransport {
    fn broadcast_reliable(&self, msg: &ServerMsg) {
        self.push(Delivery::Reliable(msg.clone()));
    }

    fn broadcast_unreliable(&self, msg: &ServerMsg) {
        self.push(Delivery::Unreliable(msg.clone()));
    }

    fn send_to(&self, conn: ConnId, msg: &ServerMsg) {
        self.push(Delivery::Direct(conn, msg.clone()));
    }

    fn close(&self, conn: ConnId) {
        self.push(Delivery::Closed(conn));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use arena_shared::{
        entity::EntityId,
        net::{OneOrMany, ReliableConn, ReliableListener},
        render::UpdateEntry,
    };
    use tokio::time::timeout;

    fn remove(id: u64) -> ServerMsg {
        ServerMsg::Remove(OneOrMany::One(EntityId(id)))
    }

    fn update(id: u64) -> ServerMsg {
        ServerMsg::Update(vec![UpdateEntry {
            i: EntityId(id),
            x: 0,
            y: 0,
            r: 0.0,
        }])
    }

    /// Registers the server side of a loopback connection; returns the
    /// client side for reading.
    async fn loopback(hub: &TcpHub) -> (ConnId, ReliableConn, oneshot::Receiver<()>) {
        let listener = ReliableListener::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let client = ReliableConn::connect(listener.local_addr().unwrap())
            .await
            .unwrap();
        let (server_side, _) = listener.accept().await.unwrap();
        let (_reader, writer) = server_side.into_split();
        let conn = ConnId::new_unique();
        let gone = hub.register(conn, writer);
        (conn, client, gone)
    }

    async fn next(client: &mut ReliableConn) -> ServerMsg {
        timeout(Duration::from_secs(2), client.recv::<ServerMsg>())
            .await
            .expect("timed out")
            .unwrap()
    }

    #[test]
    fn conn_ids_are_unique() {
        assert_ne!(ConnId::new_unique(), ConnId::new_unique());
    }

    #[test]
    fn inbox_only_sees_traffic_while_open() {
        let t = RecordingTransport::new();
        let a = ConnId(100);

        t.broadcast_reliable(&remove(1));
        t.open(a);
        t.broadcast_reliable(&remove(2));
        t.send_to(a, &ServerMsg::Joined { id: EntityId(3) });
        t.send_to(ConnId(101), &ServerMsg::Joined { id: EntityId(4) });
        t.close(a);
        t.broadcast_unreliable(&ServerMsg::Update(Vec::new()));

        assert_eq!(
            t.inbox(a),
            vec![remove(2), ServerMsg::Joined { id: EntityId(3) }]
        );
    }

    #[tokio::test]
    async fn hub_ignores_unknown_connections() {
        let hub = TcpHub::new();
        hub.send_to(ConnId(9999), &ServerMsg::Update(Vec::new()));
        hub.close(ConnId(9999));
        hub.broadcast_reliable(&ServerMsg::Update(Vec::new()));
        assert!(hub.is_empty());
    }

    #[tokio::test]
    async fn registered_connection_gets_broadcasts_without_joining() {
        let hub = TcpHub::new();
        let (_conn, mut client, _gone) = loopback(&hub).await;

        hub.broadcast_reliable(&remove(1));
        hub.broadcast_unreliable(&update(2));

        assert_eq!(next(&mut client).await, remove(1));
        assert_eq!(next(&mut client).await, update(2));
    }

    #[tokio::test]
    async fn closed_peer_does_not_stop_broadcast_to_others() {
        let hub = TcpHub::new();
        let (_alive_id, mut alive, _alive_gone) = loopback(&hub).await;
        let (_dead_id, dead, dead_gone) = loopback(&hub).await;
        drop(dead);

        for n in 0..20 {
            hub.broadcast_reliable(&remove(n));
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        for n in 0..20 {
            assert_eq!(next(&mut alive).await, remove(n));
        }

        // the dead peer's writer has failed by now
        assert!(timeout(Duration::from_secs(2), dead_gone).await.is_ok());
        hub.broadcast_reliable(&remove(99));
        assert_eq!(next(&mut alive).await, remove(99));
    }

    #[tokio::test]
    async fn lagging_reader_loses_updates_but_not_reliable_frames() {
        let hub = TcpHub::new();
        let (_conn, mut client, _gone) = loopback(&hub).await;

        // No await until the reads below, so the writer task has not run yet.
        for n in 0..(UNRELIABLE_QUEUE as u64 * 3) {
            hub.broadcast_unreliable(&update(n));
        }
        for n in 0..3 {
            hub.broadcast_reliable(&remove(n));
        }

        let mut got = Vec::new();
        while let Ok(Ok(msg)) =
            timeout(Duration::from_millis(300), client.recv::<ServerMsg>()).await
        {
            got.push(msg);
        }
        let expected: Vec<ServerMsg> = (0..3)
            .map(remove)
            .chain((0..UNRELIABLE_QUEUE as u64).map(update))
            .collect();
        assert_eq!(got, expected);
    }

    #[tokio::test]
    async fn connection_behind_on_reliable_frames_is_cut_off() {
        let hub = TcpHub::new();
        let (conn, _client, gone) = loopback(&hub).await;

        for n in 0..RELIABLE_QUEUE as u64 {
            hub.broadcast_reliable(&remove(n));
        }
        assert_eq!(hub.len(), 1);

        hub.send_to(conn, &remove(u64::MAX));
        assert!(hub.is_empty());
        assert!(timeout(Duration::from_secs(5), gone).await.is_ok());
    }
}
