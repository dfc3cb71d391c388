//! `arena_shared`
//!
//! Shared libraries used by both client and server.
//!
//! Design goals:
//! - One vocabulary for entities, categories and shapes on both ends.
//! - Wire types that keep the JSON shape clients branch on.
//! - Traits at the simulation seam so the server can be driven headless.
//! - No `unsafe`.

pub mod config;
pub mod entity;
pub mod math;
pub mod net;
pub mod physics;
pub mod render;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::config::*;
    pub use crate::entity::*;
    pub use crate::math::*;
    pub use crate::net::*;
    pub use crate::physics::*;
    pub use crate::render::*;
}
