//! Change feed.
//!
//! Turns entity store mutations on the static and dynamic collections into
//! reliable `add`/`remove` broadcasts. The store calls it synchronously while
//! still holding the mutated collection, so broadcasts leave in mutation
//! order. A single entity goes out as a bare record or id; two or more go
//! out as a sequence.

use std::sync::Arc;

use arena_shared::{
    entity::EntityId,
    net::{OneOrMany, ServerMsg},
    render::RenderInfo,
};
use tracing::debug;

use crate::transport::Transport;

pub struct ChangeFeed {
    transport: Arc<dyn Transport>,
}

impl ChangeFeed {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Announces added entities. Nothing is sent for an empty batch.
    pub fn added(&self, records: Vec<RenderInfo>) {
        let count = records.len();
        if let Some(payload) = OneOrMany::from_vec(records) {
            debug!(count, "Broadcasting add");
            self.transport.broadcast_reliable(&ServerMsg::Add(payload));
        }
    }

    /// Announces removed ids. Nothing is sent for an empty batch.
    pub fn removed(&self, ids: Vec<EntityId>) {
        let count = ids.len();
        if let Some(payload) = OneOrMany::from_vec(ids) {
            debug!(count, "Broadcasting remove");
            self.transport.broadcast_reliable(&ServerMsg::Remove(payload));
        }
    }
}
