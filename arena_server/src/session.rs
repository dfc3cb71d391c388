//! Session management.
//!
//! A session binds one connection to one player entity. Each connection's
//! events are handled in arrival order by its own task; the session table
//! lock additionally serializes joins so a connection can never end up with
//! two players.

use std::{collections::HashMap, fmt, sync::Arc, time::Instant};

use arena_shared::{
    config::PlayerDefaults,
    entity::{Attributes, Category, Entity, EntityId, PlayerAttrs, Shape},
    net::{OneOrMany, ServerMsg},
    physics::BodySpec,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    transport::{ConnId, Transport},
    world::{World, WorldError},
};

/// Runtime binding of a connection to its player.
#[derive(Debug, Clone)]
pub struct Session {
    pub conn: ConnId,
    pub entity: EntityId,
    pub nickname: String,
    pub joined_at: Instant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinError {
    /// The connection already controls a player.
    AlreadyJoined,
    World(WorldError),
}

impl fmt::Display for JoinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinError::AlreadyJoined => write!(f, "already joined"),
            JoinError::World(e) => write!(f, "world error: {e}"),
        }
    }
}

impl std::error::Error for JoinError {}

impl From<WorldError> for JoinError {
    fn from(e: WorldError) -> Self {
        JoinError::World(e)
    }
}

/// Connection-scoped session lifecycle.
pub struct ConnectionManager {
    world: Arc<World>,
    transport: Arc<dyn Transport>,
    player: PlayerDefaults,
    sessions: Mutex<HashMap<ConnId, Session>>,
}

impl ConnectionManager {
    pub fn new(world: Arc<World>, transport: Arc<dyn Transport>, player: PlayerDefaults) -> Self {
        Self {
            world,
            transport,
            player,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn player_body(&self) -> BodySpec {
        BodySpec {
            position: self.player.position,
            angle: 0.0,
            mass: self.player.mass,
            friction: self.player.friction,
            is_static: false,
        }
    }

    /// Creates the connection's player.
    ///
    /// The joiner first receives a private `add` listing every static and
    /// dynamic entity that already exists (skipped when there are none), then
    /// its own player through the public `add`. Both happen under the static
    /// and dynamic locks, so no change lands in between. An open connection
    /// already hears broadcasts before it joins, so the snapshot may repeat
    /// entities it was told about; adds are keyed by id. The returned id is
    /// for the out-of-band reply.
    pub async fn join(&self, conn: ConnId, nickname: String) -> Result<EntityId, JoinError> {
        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(&conn) {
            return Err(JoinError::AlreadyJoined);
        }

        let id = self.world.spawn_body(self.player_body()).await;
        let player = Entity::new(id, Shape::Player, self.player.position, 0.0).with_attributes(
            Attributes::Player(PlayerAttrs {
                nickname: nickname.clone(),
                health: self.player.health,
                tokens: self.player.tokens,
                equipment: None,
            }),
        );

        {
            let mut view = self.world.observe().await;
            let snapshot = view.snapshot();
            if !snapshot.is_empty() {
                debug!(conn = ?conn, count = snapshot.len(), "Sending bootstrap snapshot");
                self.transport
                    .send_to(conn, &ServerMsg::Add(OneOrMany::Many(snapshot)));
            }
            let added = view.add_dynamic(vec![player]).await;
            drop(view);
            if let Err(e) = added {
                self.world.discard_body(id).await;
                warn!(conn = ?conn, error = %e, "Join failed");
                return Err(e.into());
            }
        }

        sessions.insert(
            conn,
            Session {
                conn,
                entity: id,
                nickname: nickname.clone(),
                joined_at: Instant::now(),
            },
        );
        info!(conn = ?conn, entity = ?id, nickname = %nickname, "Player joined");
        Ok(id)
    }

    /// Closes the connection and tears down its session, if any.
    ///
    /// The connection is closed first, so the `remove` broadcast for its
    /// player reaches everyone else only. No resource is dropped in its
    /// place. Returns the removed player's id.
    pub async fn disconnect(&self, conn: ConnId) -> Option<EntityId> {
        let session = self.sessions.lock().await.remove(&conn);
        self.transport.close(conn);
        let Some(session) = session else {
            debug!(conn = ?conn, "Disconnect without session");
            return None;
        };

        self.world.remove(session.entity, Category::Dynamic).await;
        info!(
            conn = ?conn,
            entity = ?session.entity,
            nickname = %session.nickname,
            secs = session.joined_at.elapsed().as_secs(),
            "Player left"
        );
        Some(session.entity)
    }

    pub async fn session(&self, conn: ConnId) -> Option<Session> {
        self.sessions.lock().await.get(&conn).cloned()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
