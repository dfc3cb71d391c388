//! Client-side mirror of the server's world.
//!
//! Applies `add`, `remove` and `update` messages in arrival order. Updates
//! carry rounded values, so mirrored positions are whole units.

use std::collections::BTreeMap;

use arena_shared::{entity::EntityId, math::Vec2, net::ServerMsg, render::RenderInfo};

#[derive(Debug, Default, Clone)]
pub struct WorldView {
    entities: BTreeMap<EntityId, RenderInfo>,
    updates: u64,
}

impl WorldView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, msg: &ServerMsg) {
        match msg {
            ServerMsg::Add(records) => {
                for rec in records.clone().into_vec() {
                    self.entities.insert(rec.id, rec);
                }
            }
            ServerMsg::Remove(ids) => {
                for id in ids.clone().into_vec() {
                    self.entities.remove(&id);
                }
            }
            ServerMsg::Update(entries) => {
                self.updates += 1;
                for u in entries {
                    if let Some(rec) = self.entities.get_mut(&u.i) {
                        rec.position = Vec2::new(u.x as f64, u.y as f64);
                        if rec.angle.is_some() {
                            rec.angle = Some(u.r);
                        }
                    }
                }
            }
            ServerMsg::Joined { .. } | ServerMsg::Rejected { .. } => {}
        }
    }

    pub fn get(&self, id: EntityId) -> Option<&RenderInfo> {
        self.entities.get(&id)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn ids(&self) -> Vec<EntityId> {
        self.entities.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Number of `update` messages applied.
    pub fn updates_seen(&self) -> u64 {
        self.updates
    }
}
