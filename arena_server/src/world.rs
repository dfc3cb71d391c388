//! Entity store.
//!
//! Holds the three category collections and the simulation handle. Every
//! add/remove on an announced category reaches the [`ChangeFeed`] before the
//! collection lock is released, so readers that iterate under the same lock
//! (tick broadcast, join bootstrap) always see a state that matches what
//! clients have been told.
//!
//! Lock order: known, static, dynamic, simulation, index. Never acquire an
//! earlier lock while holding a later one.

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    sync::Arc,
};

use arena_shared::{
    entity::{Category, Entity, EntityId, InvalidCategory},
    net::OneOrMany,
    physics::{BodySpec, Simulation},
    render::{render_all, RenderInfo},
};
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::{feed::ChangeFeed, transport::Transport};

/// Entities of one category, ordered by id.
pub type Collection = BTreeMap<EntityId, Entity>;

/// Entity store errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorldError {
    /// Category name outside `known`, `static`, `dynamic`.
    InvalidCategory(String),
    /// The id is already present in some category.
    DuplicateEntity(EntityId),
}

impl fmt::Display for WorldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorldError::InvalidCategory(name) => write!(f, "invalid category '{name}'"),
            WorldError::DuplicateEntity(id) => write!(f, "entity {id} already exists"),
        }
    }
}

impl std::error::Error for WorldError {}

impl From<InvalidCategory> for WorldError {
    fn from(e: InvalidCategory) -> Self {
        WorldError::InvalidCategory(e.0)
    }
}

/// The authoritative world.
pub struct World {
    known: Mutex<Collection>,
    statics: Mutex<Collection>,
    dynamics: Mutex<Collection>,
    sim: Mutex<Box<dyn Simulation>>,
    index: Mutex<HashMap<EntityId, Category>>,
    feed: ChangeFeed,
}

impl World {
    pub fn new(sim: Box<dyn Simulation>, transport: Arc<dyn Transport>) -> Self {
        Self {
            known: Mutex::new(Collection::new()),
            statics: Mutex::new(Collection::new()),
            dynamics: Mutex::new(Collection::new()),
            sim: Mutex::new(sim),
            index: Mutex::new(HashMap::new()),
            feed: ChangeFeed::new(transport),
        }
    }

    /// Locks one category collection.
    pub async fn lock(&self, category: Category) -> MutexGuard<'_, Collection> {
        match category {
            Category::Known => self.known.lock().await,
            Category::Static => self.statics.lock().await,
            Category::Dynamic => self.dynamics.lock().await,
        }
    }

    /// Creates a simulation body and returns the id the entity must use.
    pub async fn spawn_body(&self, spec: BodySpec) -> EntityId {
        self.sim.lock().await.insert_body(spec)
    }

    /// Drops a body that never made it into a collection.
    pub async fn discard_body(&self, id: EntityId) {
        self.sim.lock().await.remove_body(id);
    }

    /// Runs `f` against the simulation.
    pub async fn with_sim<R>(&self, f: impl FnOnce(&mut dyn Simulation) -> R) -> R {
        let mut sim = self.sim.lock().await;
        f(&mut **sim)
    }

    /// Adds entities to `category` as one batch.
    ///
    /// Fails without inserting anything if any id is already present.
    pub async fn add(&self, entities: Vec<Entity>, category: Category) -> Result<(), WorldError> {
        let mut coll = self.lock(category).await;
        self.insert_locked(&mut coll, category, entities).await
    }

    /// [`World::add`] with a category name, as found in configuration.
    pub async fn add_named(&self, entities: Vec<Entity>, category: &str) -> Result<(), WorldError> {
        let category: Category = category.parse()?;
        self.add(entities, category).await
    }

    /// Removes ids from `category` and returns the ones actually removed.
    ///
    /// Absent ids are ignored. Removed entities also leave the simulation.
    pub async fn remove(
        &self,
        ids: impl Into<OneOrMany<EntityId>>,
        category: Category,
    ) -> Vec<EntityId> {
        let mut coll = self.lock(category).await;
        self.remove_locked(&mut coll, category, ids.into().into_vec())
            .await
    }

    /// [`World::remove`] with a category name.
    pub async fn remove_named(
        &self,
        ids: impl Into<OneOrMany<EntityId>>,
        category: &str,
    ) -> Result<Vec<EntityId>, WorldError> {
        let category: Category = category.parse()?;
        Ok(self.remove(ids, category).await)
    }

    /// Category an id currently belongs to.
    pub async fn category_of(&self, id: EntityId) -> Option<Category> {
        self.index.lock().await.get(&id).copied()
    }

    pub async fn len(&self, category: Category) -> usize {
        self.lock(category).await.len()
    }

    pub async fn is_empty(&self, category: Category) -> bool {
        self.lock(category).await.is_empty()
    }

    /// Counts entities in `category` matching `pred`.
    pub async fn count(&self, category: Category, pred: impl Fn(&Entity) -> bool) -> usize {
        self.lock(category).await.values().filter(|e| pred(e)).count()
    }

    pub async fn get(&self, id: EntityId) -> Option<Entity> {
        let category = self.category_of(id).await?;
        self.lock(category).await.get(&id).cloned()
    }

    pub async fn render_info(&self, category: Category) -> Vec<RenderInfo> {
        render_all(self.lock(category).await.values())
    }

    /// Locks the static and dynamic collections together.
    pub async fn observe(&self) -> Observed<'_> {
        let statics = self.statics.lock().await;
        let dynamics = self.dynamics.lock().await;
        Observed {
            world: self,
            statics,
            dynamics,
        }
    }

    /// Advances the simulation one tick and copies body samples into the
    /// dynamic collection. Returns the number of entities updated.
    pub async fn step(&self, dt_sec: f64) -> usize {
        let bodies = {
            let mut sim = self.sim.lock().await;
            sim.advance_tick(dt_sec);
            sim.current_bodies()
        };
        let mut dynamics = self.dynamics.lock().await;
        let mut updated = 0;
        for body in &bodies {
            if let Some(entity) = dynamics.get_mut(&body.id) {
                entity.apply_body(body);
                updated += 1;
            }
        }
        updated
    }

    async fn insert_locked(
        &self,
        coll: &mut Collection,
        category: Category,
        entities: Vec<Entity>,
    ) -> Result<(), WorldError> {
        if entities.is_empty() {
            return Ok(());
        }
        {
            let mut index = self.index.lock().await;
            let mut seen = Vec::with_capacity(entities.len());
            for e in &entities {
                if index.contains_key(&e.id) || seen.contains(&e.id) {
                    return Err(WorldError::DuplicateEntity(e.id));
                }
                seen.push(e.id);
            }
            for id in seen {
                index.insert(id, category);
            }
        }

        let records = category.is_announced().then(|| render_all(&entities));
        debug!(category = %category, count = entities.len(), "Entities added");
        for e in entities {
            coll.insert(e.id, e);
        }
        if let Some(records) = records {
            self.feed.added(records);
        }
        Ok(())
    }

    async fn remove_locked(
        &self,
        coll: &mut Collection,
        category: Category,
        ids: Vec<EntityId>,
    ) -> Vec<EntityId> {
        let removed: Vec<EntityId> = ids
            .into_iter()
            .filter(|id| coll.remove(id).is_some())
            .collect();
        if removed.is_empty() {
            return removed;
        }
        {
            let mut sim = self.sim.lock().await;
            for id in &removed {
                sim.remove_body(*id);
            }
        }
        {
            let mut index = self.index.lock().await;
            for id in &removed {
                index.remove(id);
            }
        }
        debug!(category = %category, count = removed.len(), "Entities removed");
        if category.is_announced() {
            self.feed.removed(removed.clone());
        }
        removed
    }
}

/// Static and dynamic collections held together.
///
/// Nothing can be added, removed or sampled elsewhere while this is alive.
pub struct Observed<'a> {
    world: &'a World,
    statics: MutexGuard<'a, Collection>,
    dynamics: MutexGuard<'a, Collection>,
}

impl Observed<'_> {
    /// Render-info for every static entity, then every dynamic one.
    pub fn snapshot(&self) -> Vec<RenderInfo> {
        render_all(self.statics.values().chain(self.dynamics.values()))
    }

    pub async fn add_dynamic(&mut self, entities: Vec<Entity>) -> Result<(), WorldError> {
        self.world
            .insert_locked(&mut self.dynamics, Category::Dynamic, entities)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::RecordingTransport;
    use arena_shared::{
        entity::Shape,
        math::Vec2,
        net::ServerMsg,
        physics::KinematicSim,
    };

    fn world() -> (World, Arc<RecordingTransport>) {
        let t = Arc::new(RecordingTransport::new());
        (World::new(Box::new(KinematicSim::new()), t.clone()), t)
    }

    async fn make(world: &World, shape: Shape) -> Entity {
        let id = world.spawn_body(BodySpec::fixed(Vec2::new(1.0, 2.0), 0.0)).await;
        Entity::new(id, shape, Vec2::new(1.0, 2.0), 0.0)
    }

    #[tokio::test]
    async fn known_entities_are_never_broadcast() {
        let (w, t) = world();
        let terrain = make(&w, Shape::Terrain).await;
        let id = terrain.id;
        w.add(vec![terrain], Category::Known).await.unwrap();
        assert_eq!(w.remove(id, Category::Known).await, vec![id]);
        assert!(t.deliveries().is_empty());
    }

    #[tokio::test]
    async fn batch_add_is_one_plural_message() {
        let (w, t) = world();
        let a = make(&w, Shape::Bag).await;
        let b = make(&w, Shape::Bag).await;
        w.add(vec![a, b], Category::Static).await.unwrap();

        let msgs = t.reliable_broadcasts();
        assert_eq!(msgs.len(), 1);
        assert!(matches!(&msgs[0], ServerMsg::Add(OneOrMany::Many(v)) if v.len() == 2));
    }

    #[tokio::test]
    async fn id_lives_in_one_category_only() {
        let (w, _t) = world();
        let bag = make(&w, Shape::Bag).await;
        let id = bag.id;
        w.add(vec![bag.clone()], Category::Static).await.unwrap();

        assert_eq!(
            w.add(vec![bag.clone()], Category::Dynamic).await,
            Err(WorldError::DuplicateEntity(id))
        );
        assert_eq!(w.category_of(id).await, Some(Category::Static));
        assert_eq!(w.len(Category::Dynamic).await, 0);

        w.remove(id, Category::Static).await;
        assert_eq!(w.category_of(id).await, None);
        w.add(vec![bag], Category::Dynamic).await.unwrap();
        assert_eq!(w.category_of(id).await, Some(Category::Dynamic));
    }

    #[tokio::test]
    async fn duplicate_within_batch_inserts_nothing() {
        let (w, t) = world();
        let bag = make(&w, Shape::Bag).await;
        let res = w.add(vec![bag.clone(), bag], Category::Static).await;
        assert!(matches!(res, Err(WorldError::DuplicateEntity(_))));
        assert_eq!(w.len(Category::Static).await, 0);
        assert!(t.deliveries().is_empty());
    }

    #[tokio::test]
    async fn emptiness_tracks_each_category() {
        let (w, _t) = world();
        let bag = make(&w, Shape::Bag).await;
        let id = bag.id;
        assert!(w.is_empty(Category::Static).await);

        w.add(vec![bag], Category::Static).await.unwrap();
        assert!(!w.is_empty(Category::Static).await);
        assert!(w.is_empty(Category::Dynamic).await);

        w.remove(id, Category::Static).await;
        assert!(w.is_empty(Category::Static).await);
    }

    #[tokio::test]
    async fn remove_absent_is_silent_noop() {
        let (w, t) = world();
        let removed = w
            .remove(OneOrMany::Many(vec![EntityId(40), EntityId(41)]), Category::Dynamic)
            .await;
        assert!(removed.is_empty());
        assert!(t.deliveries().is_empty());
    }

    #[tokio::test]
    async fn partial_remove_announces_only_present_ids() {
        let (w, t) = world();
        let a = make(&w, Shape::Bag).await;
        let b = make(&w, Shape::Bag).await;
        let (ida, idb) = (a.id, b.id);
        w.add(vec![a, b], Category::Static).await.unwrap();
        t.clear();

        let removed = w
            .remove(OneOrMany::Many(vec![ida, EntityId(999)]), Category::Static)
            .await;
        assert_eq!(removed, vec![ida]);
        assert_eq!(
            t.reliable_broadcasts(),
            vec![ServerMsg::Remove(OneOrMany::One(ida))]
        );

        let ids: Vec<_> = w.render_info(Category::Static).await.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![idb]);
    }

    #[tokio::test]
    async fn named_category_must_be_valid() {
        let (w, _t) = world();
        let bag = make(&w, Shape::Bag).await;
        assert_eq!(
            w.add_named(vec![bag.clone()], "floating").await,
            Err(WorldError::InvalidCategory("floating".to_string()))
        );
        w.add_named(vec![bag.clone()], "static").await.unwrap();
        assert_eq!(
            w.remove_named(bag.id, "static").await,
            Ok(vec![bag.id])
        );
        assert!(w.remove_named(bag.id, "nope").await.is_err());
    }

    #[tokio::test]
    async fn step_syncs_dynamic_bodies() {
        let (w, _t) = world();
        let id = w
            .spawn_body(BodySpec {
                position: Vec2::ZERO,
                angle: 0.0,
                mass: 1.0,
                friction: 0.0,
                is_static: false,
            })
            .await;
        w.add(vec![Entity::new(id, Shape::Player, Vec2::ZERO, 0.0)], Category::Dynamic)
            .await
            .unwrap();
        w.with_sim(|sim| sim.set_velocity(id, Vec2::new(60.0, 0.0), 0.0)).await;

        assert_eq!(w.step(1.0 / 60.0).await, 1);
        let e = w.get(id).await.unwrap();
        assert!((e.position.x - 1.0).abs() < 1e-9);
        assert!(!e.sleeping);
    }
}
