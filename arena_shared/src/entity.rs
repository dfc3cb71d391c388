//! Entity model.
//!
//! Entities are plain records keyed by an id the simulation hands out.
//! Category membership is owned by the server's entity store; this module
//! only defines the vocabulary.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{math::Vec2, physics::BodyState};

/// Opaque entity id, assigned by the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which collection an entity lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Visible to every client a priori; never announced.
    Known,
    /// Placed once, announced on add/remove only.
    Static,
    /// Announced on add/remove and sampled every tick while awake.
    Dynamic,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Known, Category::Static, Category::Dynamic];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Known => "known",
            Category::Static => "static",
            Category::Dynamic => "dynamic",
        }
    }

    /// Whether add/remove on this category reaches clients.
    pub fn is_announced(&self) -> bool {
        !matches!(self, Category::Known)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a category name is not one of `known`, `static`, `dynamic`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidCategory(pub String);

impl fmt::Display for InvalidCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid category '{}'", self.0)
    }
}

impl std::error::Error for InvalidCategory {}

impl FromStr for Category {
    type Err = InvalidCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "known" => Ok(Category::Known),
            "static" => Ok(Category::Static),
            "dynamic" => Ok(Category::Dynamic),
            other => Err(InvalidCategory(other.to_string())),
        }
    }
}

/// Visual/behavioral kind of an entity.
///
/// Unrecognised names are kept verbatim in [`Shape::Other`] so new shapes can
/// be introduced from configuration without a protocol change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Shape {
    Terrain,
    Player,
    Bag,
    Other(String),
}

impl Shape {
    pub fn as_str(&self) -> &str {
        match self {
            Shape::Terrain => "terrain",
            Shape::Player => "player",
            Shape::Bag => "bag",
            Shape::Other(name) => name,
        }
    }
}

impl From<String> for Shape {
    fn from(s: String) -> Self {
        match s.as_str() {
            "terrain" => Shape::Terrain,
            "player" => Shape::Player,
            "bag" => Shape::Bag,
            _ => Shape::Other(s),
        }
    }
}

impl From<Shape> for String {
    fn from(s: Shape) -> Self {
        match s {
            Shape::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Two equipment slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Equipment {
    pub primary: u32,
    pub secondary: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerAttrs {
    pub nickname: String,
    pub health: u32,
    pub tokens: u32,
    pub equipment: Option<Equipment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BagAttrs {
    pub points: u32,
    pub equipment: Equipment,
}

/// Category-specific attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum Attributes {
    #[default]
    None,
    Player(PlayerAttrs),
    Bag(BagAttrs),
}

/// A simulated object as seen by the synchronization layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub id: EntityId,
    pub shape: Shape,
    pub attributes: Attributes,
    pub position: Vec2,
    pub angle: f64,
    pub sleeping: bool,
}

impl Entity {
    pub fn new(id: EntityId, shape: Shape, position: Vec2, angle: f64) -> Self {
        Self {
            id,
            shape,
            attributes: Attributes::None,
            position,
            angle,
            sleeping: false,
        }
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Copies the simulation-owned fields from a body sample.
    pub fn apply_body(&mut self, body: &BodyState) {
        self.position = body.position;
        self.angle = body.angle;
        self.sleeping = body.sleeping;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_parse() {
        assert_eq!("static".parse::<Category>(), Ok(Category::Static));
        assert_eq!(
            "moving".parse::<Category>(),
            Err(InvalidCategory("moving".to_string()))
        );
    }

    #[test]
    fn shape_serializes_as_plain_string() {
        assert_eq!(serde_json::to_string(&Shape::Player).unwrap(), "\"player\"");
        let other: Shape = serde_json::from_str("\"crate\"").unwrap();
        assert_eq!(other, Shape::Other("crate".to_string()));
        assert_eq!(serde_json::to_string(&other).unwrap(), "\"crate\"");
    }

    #[test]
    fn entity_id_is_bare_integer_on_wire() {
        assert_eq!(serde_json::to_string(&EntityId(7)).unwrap(), "7");
    }
}
