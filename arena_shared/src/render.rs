//! Render-info extraction.
//!
//! Projects entities to the minimal record clients need to draw them. The
//! per-shape rules live in [`render_info`]; add a match arm there when a new
//! shape needs extra fields.

use serde::{Deserialize, Serialize};

use crate::{
    entity::{Entity, EntityId, Shape},
    math::{round_angle, round_coord, Vec2},
};

/// Client-visible projection of one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderInfo {
    pub id: EntityId,
    pub shape: Shape,
    pub position: Vec2,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub angle: Option<f64>,
}

/// Extracts render-info for one entity.
pub fn render_info(entity: &Entity) -> RenderInfo {
    let angle = match entity.shape {
        Shape::Player => Some(entity.angle),
        _ => None,
    };
    RenderInfo {
        id: entity.id,
        shape: entity.shape.clone(),
        position: entity.position,
        angle,
    }
}

/// Extracts render-info for many entities, preserving order.
pub fn render_all<'a>(entities: impl IntoIterator<Item = &'a Entity>) -> Vec<RenderInfo> {
    entities.into_iter().map(render_info).collect()
}

/// One entry of a periodic `update`: rounded position and angle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UpdateEntry {
    pub i: EntityId,
    pub x: i64,
    pub y: i64,
    pub r: f64,
}

impl UpdateEntry {
    pub fn sample(entity: &Entity) -> Self {
        Self {
            i: entity.id,
            x: round_coord(entity.position.x),
            y: round_coord(entity.position.y),
            r: round_angle(entity.angle),
        }
    }
}
