//! Wayland server plumbing.
//!
//! The `Server` owns the display and the listening socket and drives the
//! protocol side of the daemon: accepting connections, dispatching client
//! requests into `ServerState`, and flushing outgoing events. The business
//! logic lives in the dispatcher; this file is wiring.

use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::Arc;

use anyhow::{Context, Result};
use wayland_server::backend::{ClientData, ClientId, DisconnectReason};
use wayland_server::{Display, DisplayHandle, ListeningSocket};

use crate::core::events::IM_SWITCH_CHORD;
use crate::core::state::ServerState;
use crate::core::wayland::{input_method, seat, text_input};

// ============================================================================
// Configuration
// ============================================================================

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Wayland socket name (e.g. "imbridge-0")
    pub socket_name: String,
    /// Seat name advertised to clients
    pub seat_name: String,
    /// XKB layouts the built-in keyboard addon publishes
    pub keyboard_layouts: Vec<String>,
    /// Modifier chord whose release cycles the input method
    pub switch_chord: u32,
    /// Whether to attach the X11 raw key grabber
    pub enable_x11_grabber: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_name: "imbridge-0".to_string(),
            seat_name: "seat0".to_string(),
            keyboard_layouts: vec!["us".to_string()],
            switch_chord: IM_SWITCH_CHORD,
            enable_x11_grabber: true,
        }
    }
}

impl ServerConfig {
    /// Default configuration with environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(name) = std::env::var("IMBRIDGE_SOCKET") {
            if !name.is_empty() {
                config.socket_name = name;
            }
        }
        if let Ok(seat) = std::env::var("IMBRIDGE_SEAT") {
            if !seat.is_empty() {
                config.seat_name = seat;
            }
        }
        if let Ok(layouts) = std::env::var("IMBRIDGE_LAYOUTS") {
            let layouts: Vec<String> = layouts
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            if !layouts.is_empty() {
                config.keyboard_layouts = layouts;
            }
        }
        if std::env::var_os("IMBRIDGE_NO_X11").is_some() {
            config.enable_x11_grabber = false;
        }
        config
    }
}

// ============================================================================
// Client Data
// ============================================================================

/// Per-client data stored with each Wayland connection
#[derive(Debug)]
struct BridgeClientData;

impl ClientData for BridgeClientData {
    fn initialized(&self, client_id: ClientId) {
        tracing::info!("Client initialized: {:?}", client_id);
    }

    fn disconnected(&self, client_id: ClientId, reason: DisconnectReason) {
        let reason_str = match reason {
            DisconnectReason::ConnectionClosed => "connection closed",
            DisconnectReason::ProtocolError(_) => "protocol error",
        };
        tracing::info!("Client disconnected: {} ({:?})", reason_str, client_id);
    }
}

// ============================================================================
// Server
// ============================================================================

pub struct Server {
    display: Display<ServerState>,
    socket: ListeningSocket,
    socket_name: String,
}

impl Server {
    /// Create the display and bind the listening socket.
    pub fn new(config: &ServerConfig) -> Result<Self> {
        tracing::info!("Creating server with socket: {}", config.socket_name);

        let display = Display::new().context("Failed to create Wayland display")?;
        let socket = ListeningSocket::bind(config.socket_name.as_str())
            .with_context(|| format!("Failed to bind socket {}", config.socket_name))?;

        crate::ilog!(
            crate::util::logging::WAYLAND,
            "Listening on Wayland socket {}",
            config.socket_name
        );

        Ok(Self {
            display,
            socket,
            socket_name: config.socket_name.clone(),
        })
    }

    pub fn handle(&self) -> DisplayHandle {
        self.display.handle()
    }

    pub fn socket_name(&self) -> &str {
        &self.socket_name
    }

    /// Register all protocol globals.
    pub fn register_globals(&self, config: &ServerConfig) {
        let dh = self.display.handle();
        seat::register_seat(&dh, &config.seat_name);
        text_input::register_text_input_manager(&dh);
        input_method::register_input_method_manager(&dh);
        tracing::info!("Registered seat, text-input and input-method globals");
    }

    /// Accept pending client connections.
    pub fn accept_connections(&mut self) {
        loop {
            match self.socket.accept() {
                Ok(Some(stream)) => {
                    match self
                        .display
                        .handle()
                        .insert_client(stream, Arc::new(BridgeClientData))
                    {
                        Ok(client) => {
                            tracing::info!("Accepted client connection: {:?}", client.id());
                        }
                        Err(e) => {
                            tracing::error!("Failed to insert client: {}", e);
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::error!("Socket accept failed: {}", e);
                    break;
                }
            }
        }
    }

    /// Dispatch pending client requests into the state.
    pub fn dispatch(&mut self, state: &mut ServerState) -> Result<usize> {
        let dispatched = self
            .display
            .dispatch_clients(state)
            .context("Failed to dispatch Wayland events")?;
        self.display
            .flush_clients()
            .context("Failed to flush clients")?;
        Ok(dispatched)
    }

    /// Flush all client event queues.
    pub fn flush(&mut self) -> Result<()> {
        self.display
            .flush_clients()
            .context("Failed to flush clients")?;
        Ok(())
    }

    /// Display fd for polling client traffic.
    pub fn display_fd(&mut self) -> RawFd {
        self.display.backend().poll_fd().as_raw_fd()
    }

    /// Listening socket fd for polling new connections.
    pub fn socket_fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.socket_name, "imbridge-0");
        assert_eq!(config.keyboard_layouts, ["us"]);
        assert_eq!(config.switch_chord, IM_SWITCH_CHORD);
        assert!(config.enable_x11_grabber);
    }
}
