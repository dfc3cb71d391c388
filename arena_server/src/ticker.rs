//! Tick broadcaster.
//!
//! Samples awake dynamic entities and sends one unreliable `update` per
//! tick. Positions go out rounded to whole units and angles to two decimals;
//! a lost update is superseded by the next one.

use std::sync::Arc;

use arena_shared::{entity::Category, net::ServerMsg, render::UpdateEntry};

use crate::{transport::Transport, world::World};

pub struct TickBroadcaster {
    world: Arc<World>,
    transport: Arc<dyn Transport>,
}

impl TickBroadcaster {
    pub fn new(world: Arc<World>, transport: Arc<dyn Transport>) -> Self {
        Self { world, transport }
    }

    /// Samples and broadcasts under the dynamic collection lock, so the
    /// update never interleaves with an add/remove on that collection.
    /// Returns how many entries were sent.
    pub async fn tick(&self) -> usize {
        let dynamics = self.world.lock(Category::Dynamic).await;
        let entries: Vec<UpdateEntry> = dynamics
            .values()
            .filter(|e| !e.sleeping)
            .map(UpdateEntry::sample)
            .collect();
        let count = entries.len();
        self.transport
            .broadcast_unreliable(&ServerMsg::Update(entries));
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::RecordingTransport;
    use arena_shared::{
        entity::{Entity, EntityId, Shape},
        math::Vec2,
        physics::{BodySpec, KinematicSim},
    };

    async fn setup() -> (Arc<World>, Arc<RecordingTransport>, TickBroadcaster) {
        let t = Arc::new(RecordingTransport::new());
        let world = Arc::new(World::new(Box::new(KinematicSim::new()), t.clone()));
        let ticker = TickBroadcaster::new(world.clone(), t.clone());
        (world, t, ticker)
    }

    async fn add_player(world: &World, pos: Vec2, angle: f64) -> EntityId {
        let id = world
            .spawn_body(BodySpec {
                position: pos,
                angle,
                mass: 1.0,
                friction: 0.0,
                is_static: false,
            })
            .await;
        world
            .add(vec![Entity::new(id, Shape::Player, pos, angle)], Category::Dynamic)
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn empty_world_sends_empty_update() {
        let (_w, t, ticker) = setup().await;
        assert_eq!(ticker.tick().await, 0);
        assert_eq!(t.unreliable_broadcasts(), vec![ServerMsg::Update(Vec::new())]);
    }

    #[tokio::test]
    async fn sleeping_entities_are_skipped() {
        let (w, t, ticker) = setup().await;
        let awake = add_player(&w, Vec2::new(10.4, 20.6), 1.237).await;
        let asleep = add_player(&w, Vec2::ZERO, 0.0).await;
        w.lock(Category::Dynamic)
            .await
            .get_mut(&asleep)
            .unwrap()
            .sleeping = true;

        ticker.tick().await;
        assert_eq!(
            t.unreliable_broadcasts(),
            vec![ServerMsg::Update(vec![UpdateEntry {
                i: awake,
                x: 10,
                y: 21,
                r: 1.24
            }])]
        );
    }

    #[tokio::test]
    async fn static_entities_never_sampled() {
        let (w, t, ticker) = setup().await;
        let id = w.spawn_body(BodySpec::fixed(Vec2::ZERO, 0.0)).await;
        w.add(vec![Entity::new(id, Shape::Bag, Vec2::ZERO, 0.0)], Category::Static)
            .await
            .unwrap();
        assert_eq!(ticker.tick().await, 0);
        assert_eq!(t.unreliable_broadcasts().len(), 1);
    }

    #[tokio::test]
    async fn bodies_fall_asleep_and_drop_out() {
        let (w, _t, ticker) = setup().await;
        let id = add_player(&w, Vec2::ZERO, 0.0).await;
        assert_eq!(ticker.tick().await, 1);

        // A body that never moves rests long enough to sleep.
        for _ in 0..arena_shared::physics::SLEEP_TICKS {
            w.step(1.0 / 60.0).await;
        }
        assert!(w.get(id).await.unwrap().sleeping);
        assert_eq!(ticker.tick().await, 0);
    }
}
