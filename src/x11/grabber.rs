//! X11 raw keyboard source.
//!
//! Selects XInput2 raw key events on the root window of all master devices
//! and converts them to evdev-numbered key transitions with a tracked
//! modifier mask. Raw events see every physical key regardless of which X
//! client has input focus, which is what an input-method daemon needs.

use x11rb::connection::Connection;
use x11rb::protocol::xinput::{ConnectionExt as _, Device, EventMask, XIEventMask};
use x11rb::protocol::Event as X11Event;
use x11rb::rust_connection::RustConnection;

use crate::core::errors::CoreError;
use crate::core::events::{CONTROL_MASK, LOCK_MASK, MOD1_MASK, SHIFT_MASK};
use crate::prelude::Result;

/// Offset between X11 keycodes and evdev keycodes.
const XKEYCODE_OFFSET: u32 = 8;

// evdev keycodes of the modifier keys we track.
const KEY_LEFTCTRL: u32 = 29;
const KEY_LEFTSHIFT: u32 = 42;
const KEY_RIGHTSHIFT: u32 = 54;
const KEY_LEFTALT: u32 = 56;
const KEY_CAPSLOCK: u32 = 58;
const KEY_RIGHTCTRL: u32 = 97;
const KEY_RIGHTALT: u32 = 100;

/// One raw key transition, already converted to evdev numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawKeyEvent {
    pub keycode: u32,
    /// Modifier mask at the time of the event, before this transition takes
    /// effect (X11 state semantics). Chord detection keys off this.
    pub modifiers: u32,
    /// Modifier mask with this transition applied, for seat and grab state.
    pub depressed: u32,
    pub is_release: bool,
    pub time: u32,
}

/// Tracks the modifier mask across raw transitions. Raw events carry no
/// server-side state field, so the mask is reconstructed here.
#[derive(Debug, Default, Clone)]
pub struct ModifierTracker {
    depressed: u32,
    locked: u32,
}

impl ModifierTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn mask_of(keycode: u32) -> u32 {
        match keycode {
            KEY_LEFTSHIFT | KEY_RIGHTSHIFT => SHIFT_MASK,
            KEY_LEFTCTRL | KEY_RIGHTCTRL => CONTROL_MASK,
            KEY_LEFTALT | KEY_RIGHTALT => MOD1_MASK,
            _ => 0,
        }
    }

    /// Record a transition and return the effective mask as of the event,
    /// before the transition applies.
    pub fn update(&mut self, keycode: u32, is_release: bool) -> u32 {
        let before = self.effective();
        let mask = Self::mask_of(keycode);
        if mask != 0 {
            if is_release {
                self.depressed &= !mask;
            } else {
                self.depressed |= mask;
            }
        } else if keycode == KEY_CAPSLOCK && !is_release {
            self.locked ^= LOCK_MASK;
        }
        before
    }

    pub fn effective(&self) -> u32 {
        self.depressed | self.locked
    }
}

/// Pure grab lifecycle; the wire calls key off its transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GrabState {
    #[default]
    Stopped,
    Started,
}

impl GrabState {
    /// Returns whether the transition requires a select-events round trip.
    pub fn start(&mut self) -> bool {
        match self {
            GrabState::Stopped => {
                *self = GrabState::Started;
                true
            }
            GrabState::Started => false,
        }
    }

    pub fn stop(&mut self) -> bool {
        match self {
            GrabState::Started => {
                *self = GrabState::Stopped;
                true
            }
            GrabState::Stopped => false,
        }
    }
}

pub struct X11KeyboardGrabber {
    conn: RustConnection,
    root: u32,
    state: GrabState,
    mods: ModifierTracker,
}

impl X11KeyboardGrabber {
    /// Connect to the X server and verify XInput2 raw event support.
    pub fn new() -> Result<Self> {
        let (conn, screen_num) = RustConnection::connect(None)
            .map_err(|e| CoreError::x11_error(format!("failed to connect to X server: {e}")))?;
        let root = conn.setup().roots[screen_num].root;

        let version = conn
            .xinput_xi_query_version(2, 2)
            .map_err(|e| CoreError::x11_error(format!("XI2 query failed: {e}")))?
            .reply()
            .map_err(|e| CoreError::x11_error(format!("XI2 query failed: {e}")))?;
        if version.major_version < 2 {
            return Err(CoreError::x11_error(format!(
                "XInput {}.{} is too old, need 2.2",
                version.major_version, version.minor_version
            )));
        }
        crate::ilog!(
            crate::util::logging::X11,
            "Connected to X server, XInput {}.{}",
            version.major_version,
            version.minor_version
        );

        Ok(Self {
            conn,
            root,
            state: GrabState::default(),
            mods: ModifierTracker::new(),
        })
    }

    /// Begin receiving raw key events. Starting twice is a no-op.
    pub fn start_grab(&mut self) -> Result<()> {
        if !self.state.start() {
            return Ok(());
        }
        self.select_raw_events(XIEventMask::RAW_KEY_PRESS | XIEventMask::RAW_KEY_RELEASE)?;
        crate::ilog!(crate::util::logging::X11, "Raw key grab started");
        Ok(())
    }

    /// Stop receiving raw key events. Stopping twice is a no-op.
    pub fn stop_grab(&mut self) -> Result<()> {
        if !self.state.stop() {
            return Ok(());
        }
        self.select_raw_events(XIEventMask::from(0u32))?;
        crate::ilog!(crate::util::logging::X11, "Raw key grab stopped");
        Ok(())
    }

    fn select_raw_events(&self, mask: XIEventMask) -> Result<()> {
        let masks = [EventMask {
            deviceid: Device::ALL_MASTER.into(),
            mask: vec![mask],
        }];
        self.conn
            .xinput_xi_select_events(self.root, &masks)
            .map_err(|e| CoreError::x11_error(format!("XISelectEvents failed: {e}")))?;
        self.conn
            .flush()
            .map_err(|e| CoreError::x11_error(format!("flush failed: {e}")))?;
        Ok(())
    }

    pub fn is_grabbing(&self) -> bool {
        self.state == GrabState::Started
    }

    /// Fd to poll for readability.
    pub fn as_raw_fd(&self) -> std::os::unix::io::RawFd {
        use std::os::unix::io::{AsFd, AsRawFd};
        self.conn.stream().as_fd().as_raw_fd()
    }

    /// Drain every queued raw key transition.
    pub fn poll_events(&mut self) -> Result<Vec<RawKeyEvent>> {
        let mut out = Vec::new();
        loop {
            let event = self
                .conn
                .poll_for_event()
                .map_err(|e| CoreError::x11_error(format!("X connection error: {e}")))?;
            let Some(event) = event else {
                break;
            };
            match event {
                X11Event::XinputRawKeyPress(ev) => {
                    out.push(self.convert(ev.detail, ev.time, false));
                }
                X11Event::XinputRawKeyRelease(ev) => {
                    out.push(self.convert(ev.detail, ev.time, true));
                }
                _ => {}
            }
        }
        Ok(out)
    }

    fn convert(&mut self, detail: u32, time: u32, is_release: bool) -> RawKeyEvent {
        let keycode = detail.saturating_sub(XKEYCODE_OFFSET);
        let modifiers = self.mods.update(keycode, is_release);
        RawKeyEvent {
            keycode,
            modifiers,
            depressed: self.mods.effective(),
            is_release,
            time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::events::IM_SWITCH_CHORD;

    #[test]
    fn grab_transitions_are_idempotent() {
        let mut state = GrabState::default();
        assert!(state.start());
        assert!(!state.start());
        assert!(state.stop());
        assert!(!state.stop());
    }

    #[test]
    fn tracker_reports_pre_transition_state() {
        let mut mods = ModifierTracker::new();
        assert_eq!(mods.update(KEY_LEFTSHIFT, false), 0);
        assert_eq!(mods.update(KEY_LEFTCTRL, false), SHIFT_MASK);
        // Releasing shift still reports the full chord, matching the state
        // field of cooked X11 key events.
        assert_eq!(mods.update(KEY_LEFTSHIFT, true), IM_SWITCH_CHORD);
        assert_eq!(mods.effective(), CONTROL_MASK);
    }

    #[test]
    fn caps_lock_toggles_on_press_only() {
        let mut mods = ModifierTracker::new();
        mods.update(KEY_CAPSLOCK, false);
        mods.update(KEY_CAPSLOCK, true);
        assert_eq!(mods.effective(), LOCK_MASK);
        mods.update(KEY_CAPSLOCK, false);
        mods.update(KEY_CAPSLOCK, true);
        assert_eq!(mods.effective(), 0);
    }

    #[test]
    fn non_modifier_keys_leave_the_mask_alone() {
        let mut mods = ModifierTracker::new();
        mods.update(KEY_LEFTSHIFT, false);
        assert_eq!(mods.update(30, false), SHIFT_MASK);
        assert_eq!(mods.update(30, true), SHIFT_MASK);
    }
}
