//! Resource spawner.
//!
//! Drops a bag at a random point of the spawn region on every run. Bags go
//! into the static collection through the entity store, so the usual `add`
//! broadcast announces them.

use std::{ops::RangeInclusive, sync::Arc};

use arena_shared::{
    config::ArenaConfig,
    entity::{Attributes, BagAttrs, Category, Entity, EntityId, Equipment, Shape},
    math::{Rect, Vec2},
    physics::BodySpec,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use tokio::sync::Mutex;
use tracing::debug;

use crate::world::World;

/// Spawn parameters, taken from [`ArenaConfig`].
#[derive(Debug, Clone)]
pub struct SpawnSettings {
    pub region: Rect,
    pub points: (u32, u32),
    pub equipment: (u32, u32),
    pub max_resources: Option<usize>,
}

impl From<&ArenaConfig> for SpawnSettings {
    fn from(cfg: &ArenaConfig) -> Self {
        Self {
            region: cfg.spawn_region,
            points: cfg.bag_points,
            equipment: cfg.bag_equipment,
            max_resources: cfg.max_resources,
        }
    }
}

fn span<T: PartialOrd + Copy>((a, b): (T, T)) -> RangeInclusive<T> {
    if a <= b {
        a..=b
    } else {
        b..=a
    }
}

/// Rolls position and attributes for one bag.
pub fn roll_bag(rng: &mut impl Rng, settings: &SpawnSettings) -> (Vec2, BagAttrs) {
    let r = &settings.region;
    let position = Vec2::new(
        rng.gen_range(span((r.min.x, r.max.x))),
        rng.gen_range(span((r.min.y, r.max.y))),
    );
    let attrs = BagAttrs {
        points: rng.gen_range(span(settings.points)),
        equipment: Equipment {
            primary: rng.gen_range(span(settings.equipment)),
            secondary: rng.gen_range(span(settings.equipment)),
        },
    };
    (position, attrs)
}

pub struct Spawner {
    world: Arc<World>,
    settings: SpawnSettings,
    rng: Mutex<StdRng>,
}

impl Spawner {
    pub fn new(world: Arc<World>, settings: SpawnSettings, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            world,
            settings,
            rng: Mutex::new(rng),
        }
    }

    /// Spawns one bag. Returns `None` when the resource cap is reached.
    pub async fn spawn_once(&self) -> anyhow::Result<Option<EntityId>> {
        if let Some(max) = self.settings.max_resources {
            let bags = self
                .world
                .count(Category::Static, |e| e.shape == Shape::Bag)
                .await;
            if bags >= max {
                debug!(bags, max, "Resource cap reached, skipping spawn");
                return Ok(None);
            }
        }

        let (position, attrs) = {
            let mut rng = self.rng.lock().await;
            roll_bag(&mut *rng, &self.settings)
        };
        let id = self.world.spawn_body(BodySpec::fixed(position, 0.0)).await;
        let bag = Entity::new(id, Shape::Bag, position, 0.0).with_attributes(Attributes::Bag(attrs));
        if let Err(e) = self.world.add(vec![bag], Category::Static).await {
            self.world.discard_body(id).await;
            return Err(e.into());
        }
        debug!(entity = ?id, x = position.x, y = position.y, "Spawned bag");
        Ok(Some(id))
    }
}
