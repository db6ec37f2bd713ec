//! X11 keyboard integration.

pub mod grabber;

pub use grabber::{RawKeyEvent, X11KeyboardGrabber};
