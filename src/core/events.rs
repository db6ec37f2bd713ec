//! Event model for the dispatcher.
//!
//! Every display-server notification that reaches the core is expressed as
//! one variant of the closed `Event` union. Protocol frontends (the Wayland
//! bridge, the X11 grabber) translate their native events into this shape
//! and hand them to `Dispatcher::post_event`.

/// Stable identifier for one connected text-entry session.
pub type InputContextId = u64;

// X11-style modifier bit layout, shared by both event sources.
pub const SHIFT_MASK: u32 = 1 << 0;
pub const LOCK_MASK: u32 = 1 << 1;
pub const CONTROL_MASK: u32 = 1 << 2;
pub const MOD1_MASK: u32 = 1 << 3;

/// Default chord that cycles to the next input method (Shift+Control).
pub const IM_SWITCH_CHORD: u32 = SHIFT_MASK | CONTROL_MASK;

/// Cursor rectangle in surface-local coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CursorRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// A physical key transition routed to the active input method.
#[derive(Debug, Clone)]
pub struct KeyEvent {
    /// Context this key belongs to.
    pub context_id: InputContextId,
    /// Resolved keysym, if the source had one (0 otherwise).
    pub keyval: u32,
    /// Hardware keycode (evdev numbering).
    pub keycode: u32,
    /// Modifier state at the time of the event.
    pub modifiers: u32,
    pub is_release: bool,
    /// Millisecond timestamp from the originating display server.
    pub time: u32,
}

impl KeyEvent {
    /// Whether this event is the release edge of the given switch chord.
    pub fn is_switch_release(&self, chord: u32) -> bool {
        self.is_release && self.modifiers == chord
    }
}

/// Closed union of everything the dispatcher routes.
#[derive(Debug, Clone)]
pub enum Event {
    ContextCreated { id: InputContextId },
    ContextDestroyed { id: InputContextId },
    ContextFocused { id: InputContextId },
    ContextUnfocused { id: InputContextId },
    Key(KeyEvent),
    CursorRectChanged { id: InputContextId, rect: CursorRect },
    SurroundingTextChanged {
        id: InputContextId,
        text: String,
        cursor: i32,
        anchor: i32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switch_release_requires_exact_chord() {
        let mut ev = KeyEvent {
            context_id: 1,
            keyval: 0,
            keycode: 42,
            modifiers: IM_SWITCH_CHORD,
            is_release: true,
            time: 0,
        };
        assert!(ev.is_switch_release(IM_SWITCH_CHORD));

        ev.modifiers |= MOD1_MASK;
        assert!(!ev.is_switch_release(IM_SWITCH_CHORD));

        ev.modifiers = IM_SWITCH_CHORD;
        ev.is_release = false;
        assert!(!ev.is_switch_release(IM_SWITCH_CHORD));
    }
}
