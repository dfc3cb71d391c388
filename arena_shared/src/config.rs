//! Configuration system.
//!
//! Loads arena configuration from JSON strings (file IO left to the app).
//! Every field has a default so partial documents are valid.

use serde::{Deserialize, Serialize};

use crate::math::{Rect, Vec2};

/// Root server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    /// Server listen address, e.g. `127.0.0.1:40000`.
    pub server_addr: String,
    /// Simulation and update broadcast rate.
    pub tick_hz: u32,
    /// Period between resource spawns.
    pub spawn_interval_ms: u64,
    /// Region resource bags are dropped into.
    pub spawn_region: Rect,
    /// Inclusive range for a bag's point value.
    pub bag_points: (u32, u32),
    /// Inclusive range for each of a bag's equipment slots.
    pub bag_equipment: (u32, u32),
    /// Spawner stops while this many bags exist. `None` means unbounded.
    pub max_resources: Option<usize>,
    /// Seed for the spawner RNG; entropy-seeded when absent.
    pub rng_seed: Option<u64>,
    pub player: PlayerDefaults,
    /// Entities created at world initialization.
    pub layout: Vec<LayoutEntry>,
}

/// Fixed starting attributes for a joining player.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerDefaults {
    pub position: Vec2,
    pub mass: f64,
    pub friction: f64,
    pub health: u32,
    pub tokens: u32,
}

/// One pre-placed entity. `category` is validated when the world is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutEntry {
    pub shape: String,
    pub category: String,
    #[serde(default)]
    pub position: Vec2,
    #[serde(default)]
    pub angle: f64,
}

impl Default for PlayerDefaults {
    fn default() -> Self {
        Self {
            position: Vec2::new(0.0, -100.0),
            mass: 1.0,
            friction: 0.8,
            health: 100,
            tokens: 100,
        }
    }
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:40000".to_string(),
            tick_hz: 60,
            spawn_interval_ms: 10_000,
            spawn_region: Rect::new(Vec2::new(-1000.0, -1000.0), Vec2::new(1000.0, 1000.0)),
            bag_points: (1, 10),
            bag_equipment: (0, 3),
            max_resources: None,
            rng_seed: None,
            player: PlayerDefaults::default(),
            layout: vec![LayoutEntry {
                shape: "terrain".to_string(),
                category: "known".to_string(),
                position: Vec2::ZERO,
                angle: 0.0,
            }],
        }
    }
}

impl ArenaConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / self.tick_hz.max(1) as f64)
    }

    pub fn spawn_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.spawn_interval_ms.max(1))
    }
}
