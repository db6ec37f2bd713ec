//! wl_seat protocol implementation.
//!
//! The daemon exposes a keyboard-only seat to input-method clients. The
//! keymap sent on get_keyboard (and on the IME keyboard grab) is compiled
//! with xkbcommon from the configured layout and shipped over a memfd.

use wayland_server::{
    protocol::{wl_keyboard, wl_seat},
    Dispatch, DisplayHandle, GlobalDispatch, Resource,
};

use crate::core::state::ServerState;

/// Seat global data
pub struct SeatGlobal {
    pub name: String,
}

impl Default for SeatGlobal {
    fn default() -> Self {
        Self {
            name: "seat0".to_string(),
        }
    }
}

/// Keyboard-side seat state: bound keyboard resources plus the modifier
/// quadruple mirrored to clients and to the IME keyboard grab.
#[derive(Debug, Default)]
pub struct SeatState {
    pub name: String,
    pub layout: String,
    pub keyboards: Vec<wl_keyboard::WlKeyboard>,
    pub mods_depressed: u32,
    pub mods_latched: u32,
    pub mods_locked: u32,
    pub mods_group: u32,
    pub repeat_rate: i32,
    pub repeat_delay: i32,
}

impl SeatState {
    pub fn new(name: String, layout: String) -> Self {
        Self {
            name,
            layout,
            repeat_rate: 33,
            repeat_delay: 500,
            ..Default::default()
        }
    }

    pub fn add_keyboard(&mut self, keyboard: wl_keyboard::WlKeyboard) {
        self.keyboards.push(keyboard);
    }

    pub fn remove_keyboard(&mut self, resource: &wl_keyboard::WlKeyboard) {
        self.keyboards.retain(|k| k.id() != resource.id());
    }

    /// Re-send the current modifier quadruple to every bound keyboard.
    pub fn broadcast_modifiers(&self, serial: u32) {
        for kbd in &self.keyboards {
            if kbd.is_alive() {
                kbd.modifiers(
                    serial,
                    self.mods_depressed,
                    self.mods_latched,
                    self.mods_locked,
                    self.mods_group,
                );
            }
        }
    }
}

// ============================================================================
// wl_seat
// ============================================================================

impl GlobalDispatch<wl_seat::WlSeat, SeatGlobal> for ServerState {
    fn bind(
        _state: &mut Self,
        _handle: &DisplayHandle,
        _client: &wayland_server::Client,
        resource: wayland_server::New<wl_seat::WlSeat>,
        global_data: &SeatGlobal,
        data_init: &mut wayland_server::DataInit<'_, Self>,
    ) {
        let seat = data_init.init(resource, ());

        seat.capabilities(wl_seat::Capability::Keyboard);
        if seat.version() >= 2 {
            seat.name(global_data.name.clone());
        }

        tracing::debug!("Bound wl_seat with keyboard capability");
    }
}

impl Dispatch<wl_seat::WlSeat, ()> for ServerState {
    fn request(
        state: &mut Self,
        _client: &wayland_server::Client,
        _resource: &wl_seat::WlSeat,
        request: wl_seat::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        data_init: &mut wayland_server::DataInit<'_, Self>,
    ) {
        match request {
            wl_seat::Request::GetKeyboard { id } => {
                let keyboard = data_init.init(id, ());
                crate::ilog!(crate::util::logging::SEAT, "Created wl_keyboard resource");

                send_keymap(&keyboard, &state.seat.layout);

                let serial = state.next_serial();
                keyboard.modifiers(
                    serial,
                    state.seat.mods_depressed,
                    state.seat.mods_latched,
                    state.seat.mods_locked,
                    state.seat.mods_group,
                );
                if keyboard.version() >= 4 {
                    keyboard.repeat_info(state.seat.repeat_rate, state.seat.repeat_delay);
                }

                state.seat.add_keyboard(keyboard);
            }
            wl_seat::Request::GetPointer { id } => {
                // No pointer capability was advertised; init and ignore.
                let _ = data_init.init(id, ());
            }
            wl_seat::Request::GetTouch { id } => {
                let _ = data_init.init(id, ());
            }
            wl_seat::Request::Release => {
                tracing::debug!("wl_seat released");
            }
            _ => {}
        }
    }
}

// ============================================================================
// wl_keyboard
// ============================================================================

impl Dispatch<wl_keyboard::WlKeyboard, ()> for ServerState {
    fn request(
        state: &mut Self,
        _client: &wayland_server::Client,
        resource: &wl_keyboard::WlKeyboard,
        request: wl_keyboard::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        _data_init: &mut wayland_server::DataInit<'_, Self>,
    ) {
        match request {
            wl_keyboard::Request::Release => {
                state.seat.remove_keyboard(resource);
                tracing::debug!("wl_keyboard released");
            }
            _ => {}
        }
    }
}

// No pointer/touch capability is advertised; these resources are created on
// request but every request on them is ignored.
impl Dispatch<wayland_server::protocol::wl_pointer::WlPointer, ()> for ServerState {
    fn request(
        _state: &mut Self,
        _client: &wayland_server::Client,
        _resource: &wayland_server::protocol::wl_pointer::WlPointer,
        _request: wayland_server::protocol::wl_pointer::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        _data_init: &mut wayland_server::DataInit<'_, Self>,
    ) {
    }
}

impl Dispatch<wayland_server::protocol::wl_touch::WlTouch, ()> for ServerState {
    fn request(
        _state: &mut Self,
        _client: &wayland_server::Client,
        _resource: &wayland_server::protocol::wl_touch::WlTouch,
        _request: wayland_server::protocol::wl_touch::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        _data_init: &mut wayland_server::DataInit<'_, Self>,
    ) {
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Compile the XKB keymap for a layout and serialize it into a memfd.
/// Returns the fd and the byte size to advertise.
pub fn keymap_fd(layout: &str) -> Option<(std::os::unix::io::OwnedFd, u32)> {
    use xkbcommon::xkb;

    crate::ilog!(
        crate::util::logging::SEAT,
        "Generating XKB keymap for layout {:?}...",
        layout
    );

    let context = xkb::Context::new(xkb::CONTEXT_NO_FLAGS);
    let keymap = xkb::Keymap::new_from_names(
        &context,
        "",      // rules (use defaults)
        "pc105", // model (standard 105-key PC keyboard)
        layout,
        "",   // variant (none)
        None, // options (none)
        xkb::KEYMAP_COMPILE_NO_FLAGS,
    )?;

    let keymap_str = keymap.get_as_string(xkb::KEYMAP_FORMAT_TEXT_V1);
    let len = keymap_str.len() as u32;

    match create_keymap_fd(&keymap_str) {
        Ok(fd) => Some((fd, len)),
        Err(e) => {
            crate::ilog!(
                crate::util::logging::SEAT,
                "ERROR: Failed to create keymap fd: {}",
                e
            );
            None
        }
    }
}

/// Send the compiled keymap to a keyboard resource.
pub fn send_keymap(keyboard: &wl_keyboard::WlKeyboard, layout: &str) {
    use std::os::unix::io::AsFd;

    match keymap_fd(layout) {
        Some((fd, size)) => {
            keyboard.keymap(wl_keyboard::KeymapFormat::XkbV1, fd.as_fd(), size);
            crate::ilog!(crate::util::logging::SEAT, "Sent xkbcommon keymap to client");
        }
        None => {
            crate::ilog!(
                crate::util::logging::SEAT,
                "ERROR: Failed to generate XKB keymap for layout {:?}",
                layout
            );
        }
    }
}

/// Create a file descriptor containing the keymap string.
fn create_keymap_fd(keymap: &str) -> std::io::Result<std::os::unix::io::OwnedFd> {
    use std::ffi::CString;
    use std::io::Write;
    use std::os::unix::io::{FromRawFd, IntoRawFd};

    let name = CString::new("imbridge-keymap").unwrap();
    let fd = unsafe { libc::memfd_create(name.as_ptr(), libc::MFD_CLOEXEC) };
    if fd < 0 {
        return Err(std::io::Error::last_os_error());
    }

    let mut file = unsafe { std::fs::File::from_raw_fd(fd) };
    file.write_all(keymap.as_bytes())?;
    file.write_all(&[0])?; // Null terminator

    Ok(unsafe { std::os::unix::io::OwnedFd::from_raw_fd(file.into_raw_fd()) })
}

/// Register the wl_seat global.
pub fn register_seat(
    display: &DisplayHandle,
    name: &str,
) -> wayland_server::backend::GlobalId {
    display.create_global::<ServerState, wl_seat::WlSeat, SeatGlobal>(
        7,
        SeatGlobal {
            name: name.to_string(),
        },
    )
}
