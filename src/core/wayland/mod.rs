//! Wayland protocol frontends.
//!
//! All Dispatch/GlobalDispatch impls hang off `ServerState`; each protocol
//! gets its own module.

pub mod input_method;
pub mod seat;
pub mod text_input;
