//! Networking primitives.
//!
//! Goals:
//! - Provide a framed reliable channel over TCP.
//! - Define the arena message set (`add`, `remove`, `update`, `join`).
//! - Keep serialization explicit: JSON payloads behind a 4-byte big-endian
//!   length prefix.
//!
//! Frames are encoded once into [`Bytes`] so a broadcast can hand the same
//! buffer to every connection.

use anyhow::Context;
use bytes::{BufMut, Bytes, BytesMut};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpListener, TcpStream,
    },
};

use crate::{
    entity::EntityId,
    render::{RenderInfo, UpdateEntry},
};

/// Upper bound on a single frame payload.
pub const MAX_FRAME_LEN: usize = 1 << 20;

/// Either a bare value or a sequence of values.
///
/// Clients branch on the JSON shape, so a single item must stay unwrapped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    /// Collapses a vector: empty -> `None`, one item -> `One`, else `Many`.
    pub fn from_vec(mut items: Vec<T>) -> Option<Self> {
        match items.len() {
            0 => None,
            1 => items.pop().map(OneOrMany::One),
            _ => Some(OneOrMany::Many(items)),
        }
    }

    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(item) => vec![item],
            OneOrMany::Many(items) => items,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            OneOrMany::One(_) => 1,
            OneOrMany::Many(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> From<T> for OneOrMany<T> {
    fn from(item: T) -> Self {
        OneOrMany::One(item)
    }
}

/// Server -> client messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum ServerMsg {
    /// New static/dynamic entities became visible.
    Add(OneOrMany<RenderInfo>),
    /// Entities left the static/dynamic collections.
    Remove(OneOrMany<EntityId>),
    /// Periodic snapshot of awake dynamic entities.
    Update(Vec<UpdateEntry>),
    /// Private reply to a successful join.
    Joined { id: EntityId },
    /// Private reply to a rejected request.
    Rejected { reason: String },
}

/// Client -> server messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum ClientMsg {
    Join { nickname: String },
}

/// Encodes a message as a complete length-prefixed frame.
pub fn encode_frame<T: Serialize>(msg: &T) -> anyhow::Result<Bytes> {
    let payload = serde_json::to_vec(msg).context("serialize msg")?;
    anyhow::ensure!(
        payload.len() <= MAX_FRAME_LEN,
        "frame too large: {} bytes",
        payload.len()
    );
    let mut buf = BytesMut::with_capacity(4 + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.extend_from_slice(&payload);
    Ok(buf.freeze())
}

/// Decodes a frame payload (without the length prefix).
pub fn decode_payload<T: DeserializeOwned>(payload: &[u8]) -> anyhow::Result<T> {
    serde_json::from_slice(payload).context("deserialize msg")
}

/// Read half of a framed connection.
#[derive(Debug)]
pub struct FrameReader {
    stream: OwnedReadHalf,
}

impl FrameReader {
    pub async fn recv<T: DeserializeOwned>(&mut self) -> anyhow::Result<T> {
        let mut len_buf = [0u8; 4];
        self.stream
            .read_exact(&mut len_buf)
            .await
            .context("tcp read len")?;
        let len = u32::from_be_bytes(len_buf) as usize;
        anyhow::ensure!(len <= MAX_FRAME_LEN, "frame too large: {len} bytes");
        let mut payload = vec![0u8; len];
        self.stream
            .read_exact(&mut payload)
            .await
            .context("tcp read payload")?;
        decode_payload(&payload)
    }
}

/// Write half of a framed connection.
#[derive(Debug)]
pub struct FrameWriter {
    stream: OwnedWriteHalf,
}

impl FrameWriter {
    /// Writes a frame produced by [`encode_frame`].
    pub async fn send_frame(&mut self, frame: &Bytes) -> anyhow::Result<()> {
        self.stream.write_all(frame).await.context("tcp write")?;
        Ok(())
    }

    pub async fn send<T: Serialize>(&mut self, msg: &T) -> anyhow::Result<()> {
        let frame = encode_frame(msg)?;
        self.send_frame(&frame).await
    }
}

/// Reliable connection over TCP with length-prefixed frames.
#[derive(Debug)]
pub struct ReliableConn {
    reader: FrameReader,
    writer: FrameWriter,
    peer: SocketAddr,
}

impl ReliableConn {
    pub fn new(stream: TcpStream) -> anyhow::Result<Self> {
        let peer = stream.peer_addr().context("peer addr")?;
        stream.set_nodelay(true).context("set nodelay")?;
        let (read, write) = stream.into_split();
        Ok(Self {
            reader: FrameReader { stream: read },
            writer: FrameWriter { stream: write },
            peer,
        })
    }

    pub async fn connect(addr: SocketAddr) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr).await.context("tcp connect")?;
        Self::new(stream)
    }

    pub async fn send<T: Serialize>(&mut self, msg: &T) -> anyhow::Result<()> {
        self.writer.send(msg).await
    }

    pub async fn recv<T: DeserializeOwned>(&mut self) -> anyhow::Result<T> {
        self.reader.recv().await
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn into_split(self) -> (FrameReader, FrameWriter) {
        (self.reader, self.writer)
    }
}

/// TCP server listener.
pub struct ReliableListener {
    listener: TcpListener,
}

impl ReliableListener {
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await.context("tcp bind")?;
        Ok(Self { listener })
    }

    pub async fn accept(&self) -> anyhow::Result<(ReliableConn, SocketAddr)> {
        let (stream, addr) = self.listener.accept().await.context("tcp accept")?;
        Ok((ReliableConn::new(stream)?, addr))
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{entity::Shape, math::Vec2};

    fn record(id: u64) -> RenderInfo {
        RenderInfo {
            id: EntityId(id),
            shape: Shape::Bag,
            position: Vec2::new(1.0, 2.0),
            angle: None,
        }
    }

    #[test]
    fn single_add_is_bare_record() {
        let msg = ServerMsg::Add(OneOrMany::from_vec(vec![record(3)]).unwrap());
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "add");
        assert!(json["data"].is_object());
        assert_eq!(json["data"]["id"], 3);
    }

    #[test]
    fn plural_remove_is_array() {
        let ids = OneOrMany::from_vec(vec![EntityId(1), EntityId(2)]).unwrap();
        let json = serde_json::to_value(ServerMsg::Remove(ids)).unwrap();
        assert_eq!(json["data"], serde_json::json!([1, 2]));

        let one = OneOrMany::from_vec(vec![EntityId(9)]).unwrap();
        let json = serde_json::to_value(ServerMsg::Remove(one)).unwrap();
        assert_eq!(json["data"], 9);
    }

    #[test]
    fn empty_vec_collapses_to_none() {
        assert!(OneOrMany::<EntityId>::from_vec(Vec::new()).is_none());
    }

    #[test]
    fn empty_update_keeps_array() {
        let json = serde_json::to_value(ServerMsg::Update(Vec::new())).unwrap();
        assert_eq!(json["data"], serde_json::json!([]));
    }

    #[test]
    fn join_wire_shape() {
        let msg: ClientMsg =
            serde_json::from_str(r#"{"type":"join","data":{"nickname":"alice"}}"#).unwrap();
        assert_eq!(
            msg,
            ClientMsg::Join {
                nickname: "alice".to_string()
            }
        );
    }

    #[tokio::test]
    async fn framed_loopback_exchange() {
        let listener = ReliableListener::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await.unwrap();
            let msg: ClientMsg = conn.recv().await.unwrap();
            let ClientMsg::Join { nickname } = msg;
            assert_eq!(nickname, "alice");
            conn.send(&ServerMsg::Joined { id: EntityId(11) }).await.unwrap();
        });

        let mut client = ReliableConn::connect(addr).await.unwrap();
        client
            .send(&ClientMsg::Join {
                nickname: "alice".to_string(),
            })
            .await
            .unwrap();
        let reply: ServerMsg = client.recv().await.unwrap();
        assert_eq!(reply, ServerMsg::Joined { id: EntityId(11) });
        server.await.unwrap();
    }

    #[test]
    fn frame_has_length_prefix() {
        let frame = encode_frame(&ServerMsg::Update(Vec::new())).unwrap();
        let len = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
        assert_eq!(len, frame.len() - 4);
        let back: ServerMsg = decode_payload(&frame[4..]).unwrap();
        assert_eq!(back, ServerMsg::Update(Vec::new()));
    }
}
