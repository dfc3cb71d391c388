//! Server implementation.
//!
//! Wires the entity store, session manager and periodic tasks to a TCP
//! listener. Runs:
//! - The simulation step at `tick_hz`
//! - The update broadcast at `tick_hz`
//! - The resource spawner every `spawn_interval_ms`
//! - One accept loop plus one reader task per connection
//!
//! Everything is owned by a [`Scheduler`], so [`ArenaServer::shutdown`]
//! stops the whole server as a unit.

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
};

use anyhow::Context;
use arena_shared::{
    config::{ArenaConfig, LayoutEntry},
    entity::{Category, Entity, Shape},
    net::{ClientMsg, FrameReader, ReliableListener, ServerMsg},
    physics::{BodySpec, KinematicSim},
};
use tokio::{
    sync::{oneshot, watch},
    task::JoinSet,
};
use tracing::{debug, info, warn};

use crate::{
    sched::Scheduler,
    session::ConnectionManager,
    spawner::{SpawnSettings, Spawner},
    ticker::TickBroadcaster,
    transport::{ConnId, TcpHub, Transport},
    world::{World, WorldError},
};

/// Point-in-time counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerStatus {
    pub connections: usize,
    pub sessions: usize,
    pub known: usize,
    pub statics: usize,
    pub dynamics: usize,
}

/// Running arena server.
pub struct ArenaServer {
    pub cfg: ArenaConfig,
    world: Arc<World>,
    hub: Arc<TcpHub>,
    sessions: Arc<ConnectionManager>,
    scheduler: Scheduler,
    local_addr: SocketAddr,
}

impl ArenaServer {
    /// Binds, builds the world from the layout and starts all tasks.
    pub async fn start(cfg: ArenaConfig) -> anyhow::Result<Self> {
        let addr: SocketAddr = cfg.server_addr.parse().context("parse server_addr")?;
        let listener = ReliableListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        let hub = Arc::new(TcpHub::new());
        let transport: Arc<dyn Transport> = hub.clone();
        let world = Arc::new(World::new(Box::new(KinematicSim::new()), transport.clone()));
        let placed = bootstrap_layout(&world, &cfg.layout)
            .await
            .context("build world layout")?;
        info!(entities = placed, "World initialized");

        let sessions = Arc::new(ConnectionManager::new(
            world.clone(),
            transport.clone(),
            cfg.player.clone(),
        ));

        let mut scheduler = Scheduler::new();
        schedule_world_tasks(&mut scheduler, &world, &transport, &cfg);
        {
            let hub = hub.clone();
            let sessions = sessions.clone();
            scheduler.spawn("accept", move |stop| accept_loop(listener, hub, sessions, stop));
        }

        info!(addr = %local_addr, tick_hz = cfg.tick_hz, "Server listening");
        Ok(Self {
            cfg,
            world,
            hub,
            sessions,
            scheduler,
            local_addr,
        })
    }

    /// Starts on an ephemeral localhost port.
    pub async fn start_ephemeral(mut cfg: ArenaConfig) -> anyhow::Result<Self> {
        cfg.server_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0).to_string();
        Self::start(cfg).await
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn world(&self) -> &Arc<World> {
        &self.world
    }

    pub fn sessions(&self) -> &Arc<ConnectionManager> {
        &self.sessions
    }

    pub async fn status(&self) -> ServerStatus {
        ServerStatus {
            connections: self.hub.len(),
            sessions: self.sessions.len().await,
            known: self.world.len(Category::Known).await,
            statics: self.world.len(Category::Static).await,
            dynamics: self.world.len(Category::Dynamic).await,
        }
    }

    /// Stops the accept loop, every connection and every periodic task.
    pub async fn shutdown(self) {
        info!("Server shutting down");
        self.scheduler.shutdown().await;
    }
}

/// Creates the layout entities, one batch per category.
///
/// Returns how many entities were placed.
pub async fn bootstrap_layout(world: &World, layout: &[LayoutEntry]) -> Result<usize, WorldError> {
    let mut batches: Vec<(Category, Vec<Entity>)> =
        Category::ALL.iter().map(|c| (*c, Vec::new())).collect();

    let categories = layout
        .iter()
        .map(|entry| entry.category.parse::<Category>())
        .collect::<Result<Vec<_>, _>>()?;

    for (entry, category) in layout.iter().zip(categories) {
        let spec = match category {
            Category::Dynamic => BodySpec {
                position: entry.position,
                angle: entry.angle,
                mass: 1.0,
                friction: 1.0,
                is_static: false,
            },
            _ => BodySpec::fixed(entry.position, entry.angle),
        };
        let id = world.spawn_body(spec).await;
        let entity = Entity::new(id, Shape::from(entry.shape.clone()), entry.position, entry.angle);
        if let Some((_, batch)) = batches.iter_mut().find(|(c, _)| *c == category) {
            batch.push(entity);
        }
    }

    let mut placed = 0;
    for (category, batch) in batches {
        placed += batch.len();
        world.add(batch, category).await?;
    }
    Ok(placed)
}

/// Registers the simulation step, tick broadcast and spawner.
pub fn schedule_world_tasks(
    scheduler: &mut Scheduler,
    world: &Arc<World>,
    transport: &Arc<dyn Transport>,
    cfg: &ArenaConfig,
) {
    let tick = cfg.tick_interval();
    let dt = tick.as_secs_f64();

    let sim_world = world.clone();
    scheduler.every("simulation", tick, move || {
        let world = sim_world.clone();
        async move {
            world.step(dt).await;
            Ok(())
        }
    });

    let ticker = Arc::new(TickBroadcaster::new(world.clone(), transport.clone()));
    scheduler.every("tick-broadcast", tick, move || {
        let ticker = ticker.clone();
        async move {
            ticker.tick().await;
            Ok(())
        }
    });

    let spawner = Arc::new(Spawner::new(
        world.clone(),
        SpawnSettings::from(cfg),
        cfg.rng_seed,
    ));
    scheduler.every("spawner", cfg.spawn_interval(), move || {
        let spawner = spawner.clone();
        async move { spawner.spawn_once().await.map(|_| ()) }
    });
}

async fn accept_loop(
    listener: ReliableListener,
    hub: Arc<TcpHub>,
    sessions: Arc<ConnectionManager>,
    mut stop: watch::Receiver<bool>,
) {
    // Dropped on exit, which aborts every connection task.
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            _ = stop.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((conn, peer)) => {
                    let id = ConnId::new_unique();
                    info!(conn = ?id, %peer, "Client connected");
                    let (reader, writer) = conn.into_split();
                    let writer_gone = hub.register(id, writer);
                    connections.spawn(serve_connection(
                        id,
                        reader,
                        writer_gone,
                        hub.clone(),
                        sessions.clone(),
                    ));
                }
                Err(e) => warn!(error = %e, "Accept failed"),
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }
}

/// Handles one connection until it closes, its socket fails, or the hub
/// cuts it off for falling behind.
async fn serve_connection(
    conn: ConnId,
    mut reader: FrameReader,
    mut writer_gone: oneshot::Receiver<()>,
    hub: Arc<TcpHub>,
    sessions: Arc<ConnectionManager>,
) {
    loop {
        let msg = tokio::select! {
            msg = reader.recv::<ClientMsg>() => msg,
            _ = &mut writer_gone => {
                debug!(conn = ?conn, "Outbound side closed");
                break;
            }
        };
        match msg {
            Ok(ClientMsg::Join { nickname }) => match sessions.join(conn, nickname).await {
                Ok(id) => hub.send_to(conn, &ServerMsg::Joined { id }),
                Err(e) => {
                    warn!(conn = ?conn, error = %e, "Join rejected");
                    hub.send_to(
                        conn,
                        &ServerMsg::Rejected {
                            reason: e.to_string(),
                        },
                    );
                }
            },
            Err(e) => {
                debug!(conn = ?conn, error = %e, "Connection closed");
                break;
            }
        }
    }
    sessions.disconnect(conn).await;
    info!(conn = ?conn, "Client disconnected");
}
