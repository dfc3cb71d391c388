//! Physics abstraction.
//!
//! The synchronization layer only talks to the simulation through
//! [`Simulation`]. [`KinematicSim`] is a small stand-in that integrates
//! velocities with friction and reports sleep state; it is not a collision
//! solver.

use std::collections::BTreeMap;

use crate::{entity::EntityId, math::Vec2};

/// Per-body sample exposed by the simulation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyState {
    pub id: EntityId,
    pub position: Vec2,
    pub angle: f64,
    pub sleeping: bool,
}

/// Parameters for a new body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodySpec {
    pub position: Vec2,
    pub angle: f64,
    pub mass: f64,
    pub friction: f64,
    /// Static bodies never move and always report asleep.
    pub is_static: bool,
}

impl BodySpec {
    pub fn fixed(position: Vec2, angle: f64) -> Self {
        Self {
            position,
            angle,
            mass: 0.0,
            friction: 1.0,
            is_static: true,
        }
    }
}

/// Simulation stepper interface.
pub trait Simulation: Send + Sync {
    fn advance_tick(&mut self, dt_sec: f64);
    fn current_bodies(&self) -> Vec<BodyState>;
    fn insert_body(&mut self, spec: BodySpec) -> EntityId;
    /// Removing an unknown id is a no-op.
    fn remove_body(&mut self, id: EntityId);
    fn set_velocity(&mut self, id: EntityId, velocity: Vec2, angular: f64);
}

/// Speed under which a body counts as resting.
pub const SLEEP_SPEED: f64 = 0.05;
/// Consecutive resting ticks before a body is put to sleep.
pub const SLEEP_TICKS: u32 = 30;

#[derive(Debug, Clone)]
struct Body {
    spec: BodySpec,
    position: Vec2,
    angle: f64,
    velocity: Vec2,
    angular: f64,
    resting_ticks: u32,
}

impl Body {
    fn sleeping(&self) -> bool {
        self.spec.is_static || self.resting_ticks >= SLEEP_TICKS
    }
}

/// Velocity integrator with linear friction damping.
#[derive(Debug, Default)]
pub struct KinematicSim {
    next_id: u64,
    bodies: BTreeMap<EntityId, Body>,
}

impl KinematicSim {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }
}

impl Simulation for KinematicSim {
    fn advance_tick(&mut self, dt_sec: f64) {
        for body in self.bodies.values_mut() {
            if body.spec.is_static {
                continue;
            }
            body.position = body.position.add(body.velocity.scale(dt_sec));
            body.angle += body.angular * dt_sec;

            let damping = (1.0 - body.spec.friction * dt_sec).clamp(0.0, 1.0);
            body.velocity = body.velocity.scale(damping);
            body.angular *= damping;

            let speed_sq = body.velocity.len_sq() + body.angular * body.angular;
            if speed_sq < SLEEP_SPEED * SLEEP_SPEED {
                body.resting_ticks = body.resting_ticks.saturating_add(1);
            } else {
                body.resting_ticks = 0;
            }
        }
    }

    fn current_bodies(&self) -> Vec<BodyState> {
        self.bodies
            .iter()
            .map(|(id, b)| BodyState {
                id: *id,
                position: b.position,
                angle: b.angle,
                sleeping: b.sleeping(),
            })
            .collect()
    }

    fn insert_body(&mut self, spec: BodySpec) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        self.bodies.insert(
            id,
            Body {
                spec,
                position: spec.position,
                angle: spec.angle,
                velocity: Vec2::ZERO,
                angular: 0.0,
                resting_ticks: 0,
            },
        );
        id
    }

    fn remove_body(&mut self, id: EntityId) {
        self.bodies.remove(&id);
    }

    fn set_velocity(&mut self, id: EntityId, velocity: Vec2, angular: f64) {
        if let Some(body) = self.bodies.get_mut(&id) {
            if body.spec.is_static {
                return;
            }
            body.velocity = velocity;
            body.angular = angular;
            body.resting_ticks = 0;
        }
    }
}
