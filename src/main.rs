// imbridge
// Copyright (c) 2026

use anyhow::Result;

use imbridge::core::dispatcher::Dispatcher;
use imbridge::core::keyboard::KeyboardAddon;
use imbridge::core::registry::AddonRegistry;
use imbridge::core::server::{Server, ServerConfig};
use imbridge::core::state::ServerState;
use imbridge::ilog;
use imbridge::util::logging::MAIN;
use imbridge::x11::X11KeyboardGrabber;

fn main() -> Result<()> {
    // Initialize logging
    // Set default log level to info
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info,imbridge=debug");
    }
    tracing_subscriber::fmt()
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::new(
            "%Y-%m-%d %H:%M:%S".to_string(),
        ))
        .with_ansi(false)
        .init();

    let config = ServerConfig::from_env();
    ilog!(MAIN, "Starting imbridge daemon");

    let mut registry = AddonRegistry::new();
    registry.register_input_method(Box::new(KeyboardAddon::new(
        config.keyboard_layouts.clone(),
    )));

    let dispatcher = Dispatcher::with_switch_chord(registry, config.switch_chord);
    let primary_layout = config
        .keyboard_layouts
        .first()
        .cloned()
        .unwrap_or_else(|| "us".to_string());
    let mut state = ServerState::new(dispatcher, &config.seat_name, &primary_layout);

    let mut server = Server::new(&config)?;
    server.register_globals(&config);

    let mut grabber = if config.enable_x11_grabber {
        match X11KeyboardGrabber::new() {
            Ok(mut grabber) => {
                grabber.start_grab()?;
                Some(grabber)
            }
            Err(e) => {
                tracing::warn!("X11 keyboard source unavailable: {}", e);
                None
            }
        }
    } else {
        None
    };

    ilog!(MAIN, "Entering event loop (socket: {})", server.socket_name());

    loop {
        // Deferred work first, then flush whatever it produced.
        state.pump();
        server.flush()?;

        let mut fds = vec![
            libc::pollfd {
                fd: server.display_fd(),
                events: libc::POLLIN,
                revents: 0,
            },
            libc::pollfd {
                fd: server.socket_fd(),
                events: libc::POLLIN,
                revents: 0,
            },
        ];
        if let Some(ref g) = grabber {
            fds.push(libc::pollfd {
                fd: g.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            });
        }

        let ret = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, -1) };
        if ret < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err.into());
        }

        server.accept_connections();
        server.dispatch(&mut state)?;

        if let Some(ref mut g) = grabber {
            for key in g.poll_events()? {
                state.handle_raw_key(
                    key.keycode,
                    key.modifiers,
                    key.depressed,
                    key.is_release,
                    key.time,
                );
            }
        }
    }
}
