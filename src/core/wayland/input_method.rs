//! Input Method protocol implementation.
//!
//! One zwp_input_method_v2 per seat; a second bind is answered with
//! `unavailable`. IME requests between two commits are buffered and applied
//! atomically when the IME commits with a serial matching our done count.
//! The IME may also grab the keyboard, in which case raw keys bypass the
//! dispatcher entirely and flow to the grab resource.

use wayland_protocols_misc::zwp_input_method_v2::server::{
    zwp_input_method_keyboard_grab_v2::{self, ZwpInputMethodKeyboardGrabV2},
    zwp_input_method_manager_v2::{self, ZwpInputMethodManagerV2},
    zwp_input_method_v2::{self, ZwpInputMethodV2},
    zwp_input_popup_surface_v2::{self, ZwpInputPopupSurfaceV2},
};
use wayland_server::{
    protocol::wl_keyboard, Client, DataInit, Dispatch, DisplayHandle, GlobalDispatch, New,
    Resource,
};

use crate::core::addon::ImEdit;
use crate::core::state::ServerState;

// ============================================================================
// State
// ============================================================================

/// Who currently receives raw keyboard input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyboardGrabState {
    /// Keys flow through the dispatcher to the active addon.
    #[default]
    Released,
    /// An IME holds the keyboard grab; keys bypass the dispatcher.
    GrabbedByIme,
}

/// Per-seat input method state.
#[derive(Debug, Default)]
pub struct InputMethodState {
    /// The currently bound input method resource (one per seat).
    pub resource: Option<ZwpInputMethodV2>,
    /// Whether a text input currently has focus from the IME's view.
    pub active: bool,
    /// Number of `done` events sent; the IME echoes it on commit.
    pub done_count: u32,
    /// IME requests buffered until the next commit.
    pending_preedit: Option<(String, i32, i32)>,
    pending_commit: Option<String>,
    pending_delete: Option<(u32, u32)>,
    /// Live keyboard grab resource, if any.
    pub grab: Option<ZwpInputMethodKeyboardGrabV2>,
    pub grab_state: KeyboardGrabState,
}

impl InputMethodState {
    /// Activate the input method when a text input gains focus.
    pub fn activate(&mut self) {
        if let Some(ref res) = self.resource {
            if res.is_alive() {
                res.activate();
                self.active = true;
            }
        }
    }

    /// Deactivate the input method when the text input loses focus.
    pub fn deactivate(&mut self) {
        if let Some(ref res) = self.resource {
            if res.is_alive() {
                res.deactivate();
                self.active = false;
            }
        }
    }

    /// Mirror surrounding text to the IME.
    pub fn surrounding_text(&self, text: &str, cursor: u32, anchor: u32) {
        if let Some(ref res) = self.resource {
            if res.is_alive() && self.active {
                res.surrounding_text(text.to_string(), cursor, anchor);
            }
        }
    }

    /// Mirror the content type to the IME.
    pub fn content_type(&self, hint: u32, purpose: u32) {
        use wayland_protocols::wp::text_input::zv3::server::zwp_text_input_v3::{
            ContentHint, ContentPurpose,
        };
        if let Some(ref res) = self.resource {
            if res.is_alive() && self.active {
                let h = ContentHint::from_bits_truncate(hint);
                let p = ContentPurpose::try_from(purpose).unwrap_or(ContentPurpose::Normal);
                res.content_type(h, p);
            }
        }
    }

    /// Close the current state batch toward the IME.
    pub fn done(&mut self) {
        if let Some(ref res) = self.resource {
            if res.is_alive() {
                res.done();
                self.done_count = self.done_count.wrapping_add(1);
            }
        }
    }

    /// Drain the buffered IME requests into one editing result.
    pub fn take_pending(&mut self) -> ImEdit {
        ImEdit {
            preedit: self.pending_preedit.take(),
            commit: self.pending_commit.take(),
            delete_surrounding: self.pending_delete.take().unwrap_or((0, 0)),
        }
    }

    fn discard_pending(&mut self) {
        self.pending_preedit = None;
        self.pending_commit = None;
        self.pending_delete = None;
    }

    /// Forward a raw key to the grab, if one is held.
    pub fn send_grab_key(&self, serial: u32, time: u32, key: u32, pressed: bool) -> bool {
        let Some(ref grab) = self.grab else {
            return false;
        };
        if !grab.is_alive() {
            return false;
        }
        let state = if pressed {
            wl_keyboard::KeyState::Pressed
        } else {
            wl_keyboard::KeyState::Released
        };
        grab.key(serial, time, key, state);
        true
    }

    /// Mirror the modifier quadruple to the grab.
    pub fn send_grab_modifiers(
        &self,
        serial: u32,
        depressed: u32,
        latched: u32,
        locked: u32,
        group: u32,
    ) {
        if let Some(ref grab) = self.grab {
            if grab.is_alive() {
                grab.modifiers(serial, depressed, latched, locked, group);
            }
        }
    }
}

// ============================================================================
// zwp_input_method_manager_v2
// ============================================================================

impl GlobalDispatch<ZwpInputMethodManagerV2, ()> for ServerState {
    fn bind(
        _state: &mut Self,
        _handle: &DisplayHandle,
        _client: &Client,
        resource: New<ZwpInputMethodManagerV2>,
        _global_data: &(),
        data_init: &mut DataInit<'_, Self>,
    ) {
        data_init.init(resource, ());
        tracing::debug!("Bound zwp_input_method_manager_v2");
    }
}

impl Dispatch<ZwpInputMethodManagerV2, ()> for ServerState {
    fn request(
        state: &mut Self,
        _client: &Client,
        _resource: &ZwpInputMethodManagerV2,
        request: zwp_input_method_manager_v2::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            zwp_input_method_manager_v2::Request::GetInputMethod { seat, input_method } => {
                let seat_id = seat.id().protocol_id();
                let im_res = data_init.init(input_method, ());

                if state.input_method.resource.is_some() {
                    // Only one input method per seat.
                    im_res.unavailable();
                    tracing::warn!("Rejected second input method binding for seat {}", seat_id);
                } else {
                    state.input_method.resource = Some(im_res);
                    tracing::info!("Input method bound for seat {}", seat_id);
                }
            }
            zwp_input_method_manager_v2::Request::Destroy => {
                tracing::debug!("zwp_input_method_manager_v2 destroyed");
            }
            _ => {}
        }
    }
}

// ============================================================================
// zwp_input_method_v2
// ============================================================================

impl Dispatch<ZwpInputMethodV2, ()> for ServerState {
    fn request(
        state: &mut Self,
        _client: &Client,
        resource: &ZwpInputMethodV2,
        request: zwp_input_method_v2::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            zwp_input_method_v2::Request::CommitString { text } => {
                state.input_method.pending_commit = Some(text);
            }
            zwp_input_method_v2::Request::SetPreeditString {
                text,
                cursor_begin,
                cursor_end,
            } => {
                state.input_method.pending_preedit = Some((text, cursor_begin, cursor_end));
            }
            zwp_input_method_v2::Request::DeleteSurroundingText {
                before_length,
                after_length,
            } => {
                state.input_method.pending_delete = Some((before_length, after_length));
            }
            zwp_input_method_v2::Request::Commit { serial } => {
                // The serial must match the number of done events sent. A
                // mismatch means the IME acted on stale state; drop the batch.
                if serial != state.input_method.done_count {
                    tracing::warn!(
                        "Input method commit serial mismatch: got {} expected {}",
                        serial,
                        state.input_method.done_count,
                    );
                    state.input_method.discard_pending();
                    return;
                }

                let edit = state.input_method.take_pending();
                match state.dispatcher.focused_context() {
                    Some(context_id) => {
                        state.text_input.apply_edit(context_id, &edit);
                    }
                    None => {
                        // No focused text input: the batch has nowhere to go.
                        tracing::debug!("Dropping IME commit with no focused context");
                    }
                }
            }
            zwp_input_method_v2::Request::GetInputPopupSurface { id, surface } => {
                let _popup = data_init.init(id, ());
                let sid = surface.id().protocol_id();
                tracing::debug!("Input method popup surface created for surface {}", sid);
            }
            zwp_input_method_v2::Request::GrabKeyboard { keyboard } => {
                let grab = data_init.init(keyboard, ());
                state.start_keyboard_grab(grab);
            }
            zwp_input_method_v2::Request::Destroy => {
                if state
                    .input_method
                    .resource
                    .as_ref()
                    .map_or(false, |r| r.id() == resource.id())
                {
                    state.input_method.resource = None;
                    state.input_method.active = false;
                    state.input_method.discard_pending();
                }
                tracing::debug!("Input method destroyed");
            }
            _ => {}
        }
    }

    fn destroyed(
        state: &mut Self,
        _client: wayland_server::backend::ClientId,
        resource: &ZwpInputMethodV2,
        _data: &(),
    ) {
        if state
            .input_method
            .resource
            .as_ref()
            .map_or(false, |r| r.id() == resource.id())
        {
            state.input_method.resource = None;
            state.input_method.active = false;
            state.input_method.discard_pending();
        }
    }
}

// ============================================================================
// zwp_input_popup_surface_v2 (position-only stub)
// ============================================================================

impl Dispatch<ZwpInputPopupSurfaceV2, ()> for ServerState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &ZwpInputPopupSurfaceV2,
        request: zwp_input_popup_surface_v2::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            zwp_input_popup_surface_v2::Request::Destroy => {}
            _ => {}
        }
    }
}

// ============================================================================
// zwp_input_method_keyboard_grab_v2
// ============================================================================

impl Dispatch<ZwpInputMethodKeyboardGrabV2, ()> for ServerState {
    fn request(
        state: &mut Self,
        _client: &Client,
        resource: &ZwpInputMethodKeyboardGrabV2,
        request: zwp_input_method_keyboard_grab_v2::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            zwp_input_method_keyboard_grab_v2::Request::Release => {
                state.end_keyboard_grab(resource);
            }
            _ => {}
        }
    }

    fn destroyed(
        state: &mut Self,
        _client: wayland_server::backend::ClientId,
        resource: &ZwpInputMethodKeyboardGrabV2,
        _data: &(),
    ) {
        state.end_keyboard_grab(resource);
    }
}

// ============================================================================
// Registration
// ============================================================================

pub fn register_input_method_manager(
    display: &DisplayHandle,
) -> wayland_server::backend::GlobalId {
    display.create_global::<ServerState, ZwpInputMethodManagerV2, ()>(1, ())
}
