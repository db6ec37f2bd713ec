//! Daemon core: event dispatch, context tracking, addons, and the Wayland
//! protocol frontends.

pub mod addon;
pub mod context;
pub mod dispatcher;
pub mod errors;
pub mod events;
pub mod keyboard;
pub mod registry;
pub mod server;
pub mod state;
pub mod wayland;
