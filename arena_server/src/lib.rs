//! `arena_server`
//!
//! Server-side world synchronization:
//! - Entity store with known/static/dynamic collections
//! - Change feed turning store mutations into `add`/`remove` broadcasts
//! - Sessions binding connections to player entities
//! - Fixed-rate `update` broadcast of awake dynamic entities
//! - Timed resource spawner
//!
//! Networking model:
//! - TCP, length-prefixed JSON frames
//! - Per-connection reliable queue plus a lossy queue for `update`

pub mod feed;
pub mod sched;
pub mod server;
pub mod session;
pub mod spawner;
pub mod ticker;
pub mod transport;
pub mod world;

pub use server::ArenaServer;
