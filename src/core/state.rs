//! Global server state.
//!
//! `ServerState` is the single type all Wayland Dispatch impls hang off.
//! It owns the dispatcher (contexts + addons), the seat keyboard state, and
//! the per-protocol bridge state, and carries the glue paths between them:
//! text-input commits feed the dispatcher and the IME, IME commits feed the
//! focused text input, raw keys go to the grab or to the dispatcher.

use wayland_protocols_misc::zwp_input_method_v2::server::zwp_input_method_keyboard_grab_v2::ZwpInputMethodKeyboardGrabV2;
use wayland_server::protocol::wl_keyboard;
use wayland_server::Resource;

use crate::core::dispatcher::{Dispatcher, Notification};
use crate::core::events::{Event, InputContextId, KeyEvent};
use crate::core::wayland::input_method::{InputMethodState, KeyboardGrabState};
use crate::core::wayland::seat::{self, SeatState};
use crate::core::wayland::text_input::TextInputState;

/// Focus transition computed from a text-input commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusEdge {
    Gained,
    Lost,
}

/// The enable flag only matters when it actually changes.
pub fn focus_edge(was_enabled: bool, now_enabled: bool) -> Option<FocusEdge> {
    match (was_enabled, now_enabled) {
        (false, true) => Some(FocusEdge::Gained),
        (true, false) => Some(FocusEdge::Lost),
        _ => None,
    }
}

pub struct ServerState {
    pub dispatcher: Dispatcher,
    pub seat: SeatState,
    pub text_input: TextInputState,
    pub input_method: InputMethodState,
    serial: u32,
}

impl ServerState {
    pub fn new(dispatcher: Dispatcher, seat_name: &str, layout: &str) -> Self {
        Self {
            dispatcher,
            seat: SeatState::new(seat_name.to_string(), layout.to_string()),
            text_input: TextInputState::default(),
            input_method: InputMethodState::default(),
            serial: 0,
        }
    }

    /// Next wire serial. Serials are per-process and wrap.
    pub fn next_serial(&mut self) -> u32 {
        self.serial = self.serial.wrapping_add(1);
        self.serial
    }

    // ========================================================================
    // Text input enable/disable
    // ========================================================================

    /// Flip a text input's enabled flag. Unlike the `set_*` requests this is
    /// not staged: every enable/disable edge fires immediately, so three
    /// successive enable/disable/enable requests produce three transitions.
    pub fn set_text_input_enabled(&mut self, ti_id: u32, enabled: bool) {
        let Some(instance) = self.text_input.instances.get_mut(&ti_id) else {
            return;
        };
        let context_id = instance.context_id;
        let was = instance.enabled;
        instance.enabled = enabled;
        self.apply_enabled_edge(context_id, was, enabled);
    }

    fn apply_enabled_edge(&mut self, context_id: InputContextId, was: bool, now: bool) {
        let Some(edge) = focus_edge(was, now) else {
            return;
        };
        match edge {
            FocusEdge::Gained => {
                self.dispatcher
                    .post_event(Event::ContextFocused { id: context_id });
                self.input_method.activate();
            }
            FocusEdge::Lost => {
                self.dispatcher
                    .post_event(Event::ContextUnfocused { id: context_id });
                self.input_method.deactivate();
            }
        }
        self.input_method.done();
    }

    // ========================================================================
    // Text input commit
    // ========================================================================

    /// Apply the double-buffered `set_*` state of a text input on its commit.
    pub fn commit_text_input(&mut self, ti_id: u32) {
        let Some(instance) = self.text_input.instances.get_mut(&ti_id) else {
            return;
        };

        let context_id = instance.context_id;
        let surrounding = instance.pending.surrounding.take();
        let content_type = instance.pending.content_type.take();
        let cursor_rect = instance.pending.cursor_rect.take();
        if let Some((ref text, cursor, anchor)) = surrounding {
            instance.surrounding_text = text.clone();
            instance.surrounding_cursor = cursor;
            instance.surrounding_anchor = anchor;
        }
        if let Some(ct) = content_type {
            instance.content_type = ct;
        }
        if let Some(rect) = cursor_rect {
            instance.cursor_rect = rect;
        }
        let enabled = instance.enabled;
        tracing::debug!(
            "Text input {} commit (context {}, enabled: {})",
            ti_id,
            context_id,
            enabled
        );

        let mut im_dirty = false;
        if enabled {
            if let Some((text, cursor, anchor)) = surrounding {
                self.dispatcher.post_event(Event::SurroundingTextChanged {
                    id: context_id,
                    text: text.clone(),
                    cursor,
                    anchor,
                });
                self.input_method
                    .surrounding_text(&text, cursor.max(0) as u32, anchor.max(0) as u32);
                im_dirty = true;
            }
            if let Some(ct) = content_type {
                self.input_method.content_type(ct.hint, ct.purpose);
                im_dirty = true;
            }
            if let Some(rect) = cursor_rect {
                self.dispatcher.post_event(Event::CursorRectChanged {
                    id: context_id,
                    rect,
                });
            }
        }

        if im_dirty {
            self.input_method.done();
        }
    }

    // ========================================================================
    // Keyboard grab
    // ========================================================================

    /// An IME took the keyboard grab: hand it the keymap and current
    /// modifier state, then route raw keys its way.
    pub fn start_keyboard_grab(&mut self, grab: ZwpInputMethodKeyboardGrabV2) {
        use std::os::unix::io::AsFd;

        if let Some((fd, size)) = seat::keymap_fd(&self.seat.layout) {
            grab.keymap(wl_keyboard::KeymapFormat::XkbV1, fd.as_fd(), size);
        }
        let serial = self.next_serial();
        grab.modifiers(
            serial,
            self.seat.mods_depressed,
            self.seat.mods_latched,
            self.seat.mods_locked,
            self.seat.mods_group,
        );
        grab.repeat_info(self.seat.repeat_rate, self.seat.repeat_delay);

        self.input_method.grab = Some(grab);
        self.input_method.grab_state = KeyboardGrabState::GrabbedByIme;
        crate::ilog!(crate::util::logging::WAYLAND, "IME keyboard grab started");
    }

    /// The grab ended: return keys to the dispatcher and resync modifiers
    /// toward regular keyboards, which missed updates while grabbed.
    pub fn end_keyboard_grab(&mut self, resource: &ZwpInputMethodKeyboardGrabV2) {
        let held = self
            .input_method
            .grab
            .as_ref()
            .map_or(false, |g| g.id() == resource.id());
        if !held {
            return;
        }
        self.input_method.grab = None;
        self.input_method.grab_state = KeyboardGrabState::Released;
        let serial = self.next_serial();
        self.seat.broadcast_modifiers(serial);
        crate::ilog!(crate::util::logging::WAYLAND, "IME keyboard grab released");
    }

    // ========================================================================
    // Raw keys
    // ========================================================================

    /// Route one raw key from the platform keyboard source.
    ///
    /// `keycode` is evdev numbering; `modifiers` is the mask as of the event
    /// (before the transition, X11 state semantics, used for chord
    /// detection); `depressed` is the mask with the transition applied and
    /// is what the seat and a held grab see.
    pub fn handle_raw_key(
        &mut self,
        keycode: u32,
        modifiers: u32,
        depressed: u32,
        is_release: bool,
        time: u32,
    ) {
        let mods_changed = self.seat.mods_depressed != depressed;
        self.seat.mods_depressed = depressed;

        if self.input_method.grab_state == KeyboardGrabState::GrabbedByIme {
            if mods_changed {
                let serial = self.next_serial();
                self.input_method.send_grab_modifiers(
                    serial,
                    self.seat.mods_depressed,
                    self.seat.mods_latched,
                    self.seat.mods_locked,
                    self.seat.mods_group,
                );
            }
            let serial = self.next_serial();
            self.input_method
                .send_grab_key(serial, time, keycode, !is_release);
            return;
        }

        let Some(context_id) = self.dispatcher.focused_context() else {
            return;
        };
        self.dispatcher.post_event(Event::Key(KeyEvent {
            context_id,
            keyval: 0,
            keycode,
            modifiers,
            is_release,
            time,
        }));
    }

    // ========================================================================
    // Per-iteration pump
    // ========================================================================

    /// Run deferred dispatcher work and flush its outputs. Called once at
    /// the top of every event-loop iteration.
    pub fn pump(&mut self) {
        self.dispatcher.run_deferred();

        for (context_id, edit) in self.dispatcher.take_edits() {
            self.text_input.apply_edit(context_id, &edit);
        }

        for notification in self.dispatcher.take_notifications() {
            match notification {
                Notification::FocusChanged(focus) => {
                    tracing::debug!("Focus changed: {:?}", focus);
                }
                Notification::EntriesChanged => {
                    crate::ilog!(
                        crate::util::logging::STATE,
                        "Input method entries available: {}",
                        self.dispatcher.registry().entries().len()
                    );
                }
                Notification::InputMethodSwitched { context, index } => {
                    tracing::debug!(
                        "Context {} now uses input method index {}",
                        context,
                        index
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::registry::AddonRegistry;

    #[test]
    fn focus_edges() {
        assert_eq!(focus_edge(false, true), Some(FocusEdge::Gained));
        assert_eq!(focus_edge(true, false), Some(FocusEdge::Lost));
        assert_eq!(focus_edge(true, true), None);
        assert_eq!(focus_edge(false, false), None);
    }

    #[test]
    fn serials_increase_per_call() {
        let mut state =
            ServerState::new(Dispatcher::new(AddonRegistry::new()), "seat0", "us");
        let a = state.next_serial();
        let b = state.next_serial();
        assert_eq!(b, a + 1);
    }

    #[test]
    fn raw_key_without_focus_is_dropped() {
        let mut state =
            ServerState::new(Dispatcher::new(AddonRegistry::new()), "seat0", "us");
        state.handle_raw_key(30, 0, 0, false, 0);
        assert!(state.dispatcher.take_edits().is_empty());
    }

    #[test]
    fn raw_modifier_press_updates_seat_state_immediately() {
        use crate::core::events::SHIFT_MASK;

        let mut state =
            ServerState::new(Dispatcher::new(AddonRegistry::new()), "seat0", "us");
        // Pressing LeftShift: the event mask is still 0, but the seat must
        // already see the shift bit down.
        state.handle_raw_key(42, 0, SHIFT_MASK, false, 0);
        assert_eq!(state.seat.mods_depressed, SHIFT_MASK);
        state.handle_raw_key(42, SHIFT_MASK, 0, true, 1);
        assert_eq!(state.seat.mods_depressed, 0);
    }

    #[test]
    fn enable_disable_enable_fires_three_edges() {
        let mut state =
            ServerState::new(Dispatcher::new(AddonRegistry::new()), "seat0", "us");
        let id = state.dispatcher.new_context_id();
        state.dispatcher.post_event(Event::ContextCreated { id });
        state.dispatcher.take_notifications();

        let mut enabled = false;
        for next in [true, false, true] {
            state.apply_enabled_edge(id, enabled, next);
            enabled = next;
        }

        assert_eq!(
            state.dispatcher.take_notifications(),
            [
                Notification::FocusChanged(Some(id)),
                Notification::FocusChanged(None),
                Notification::FocusChanged(Some(id)),
            ]
        );
    }
}
