//! `arena_client`
//!
//! Headless client used by the bot binary and the integration tests:
//! - Framed connection to the server with a background reader
//! - Mirrored world view driven by `add` / `remove` / `update`

pub mod client;
pub mod view;

pub use client::ArenaClient;
pub use view::WorldView;
