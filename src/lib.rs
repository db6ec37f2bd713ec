// imbridge
// Copyright (c) 2026
//
// Input-method framework daemon: routes text-entry sessions between
// Wayland text-input/input-method clients, an X11 raw key source, and
// pluggable input-method addons.

pub mod core;
pub mod prelude;
pub mod util;
pub mod x11;

#[cfg(test)]
mod tests;
