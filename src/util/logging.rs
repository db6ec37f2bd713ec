//! Standardized logging utility for imbridge
//!
//! This module provides the `ilog!` macro which ensures all direct stderr
//! logs follow the `YYYY-MM-DD HH:MM:SS [MODULE] Message` format.

#[macro_export]
macro_rules! ilog {
    ($module:expr, $($arg:tt)*) => {{
        let now = chrono::Local::now();
        eprintln!("{} [{}] {}",
            now.format("%Y-%m-%d %H:%M:%S"),
            $module,
            format!($($arg)*)
        );
    }};
}

/// Standardized module identifiers
pub const MAIN: &str = "MAIN";
pub const CORE: &str = "CORE";
pub const DISPATCH: &str = "DISPATCH";
pub const ADDON: &str = "ADDON";
pub const WAYLAND: &str = "WAYLAND";
pub const SEAT: &str = "SEAT";
pub const X11: &str = "X11";
pub const STATE: &str = "STATE";
