//! Built-in keyboard addon.
//!
//! Publishes one input-method entry per configured XKB layout and converts
//! key presses to committed text through an xkbcommon state machine. No
//! preedit: every translated press commits immediately.

use std::collections::HashMap;

use xkbcommon::xkb;

use crate::core::addon::{ImEdit, InputMethodAddon, InputMethodEntry, KeyReply};
use crate::core::events::{InputContextId, KeyEvent};

pub const KEYBOARD_ADDON_KEY: &str = "keyboard";

/// Offset between evdev keycodes and XKB keycodes.
const EVDEV_OFFSET: u32 = 8;

pub struct KeyboardAddon {
    layouts: Vec<String>,
    context: xkb::Context,
    /// Per-layout xkb state, compiled on first use. `None` records a failed
    /// compile so we do not retry on every key.
    states: HashMap<String, Option<xkb::State>>,
}

impl KeyboardAddon {
    pub fn new(layouts: Vec<String>) -> Self {
        Self {
            layouts,
            context: xkb::Context::new(xkb::CONTEXT_NO_FLAGS),
            states: HashMap::new(),
        }
    }

    fn entry_id(layout: &str) -> String {
        format!("{KEYBOARD_ADDON_KEY}-{layout}")
    }

    fn layout_of(entry_id: &str) -> &str {
        entry_id
            .strip_prefix(KEYBOARD_ADDON_KEY)
            .and_then(|s| s.strip_prefix('-'))
            .unwrap_or(entry_id)
    }

    fn state_for(&mut self, layout: &str) -> Option<&mut xkb::State> {
        let context = &self.context;
        self.states
            .entry(layout.to_string())
            .or_insert_with(|| {
                let keymap = xkb::Keymap::new_from_names(
                    context,
                    "",      // rules (use defaults)
                    "pc105", // model
                    layout,
                    "", // variant
                    None,
                    xkb::KEYMAP_COMPILE_NO_FLAGS,
                );
                match keymap {
                    Some(keymap) => Some(xkb::State::new(&keymap)),
                    None => {
                        tracing::warn!("Failed to compile keymap for layout {:?}", layout);
                        None
                    }
                }
            })
            .as_mut()
    }
}

impl InputMethodAddon for KeyboardAddon {
    fn key(&self) -> &str {
        KEYBOARD_ADDON_KEY
    }

    fn input_methods(&self) -> Vec<InputMethodEntry> {
        self.layouts
            .iter()
            .map(|layout| InputMethodEntry {
                addon_key: KEYBOARD_ADDON_KEY.to_string(),
                id: Self::entry_id(layout),
                name: format!("Keyboard - {layout}"),
                short_description: layout.clone(),
                description: format!("{layout} keyboard layout"),
                language: layout.clone(),
            })
            .collect()
    }

    fn key_event(&mut self, entry: &InputMethodEntry, event: &KeyEvent) -> KeyReply {
        let layout = Self::layout_of(&entry.id).to_string();
        let Some(state) = self.state_for(&layout) else {
            // Without a keymap the key passes through untranslated.
            return KeyReply::unhandled();
        };

        let keycode: xkb::Keycode = (event.keycode + EVDEV_OFFSET).into();
        let direction = if event.is_release {
            xkb::KeyDirection::Up
        } else {
            xkb::KeyDirection::Down
        };

        // Releases only advance the modifier state machine.
        if event.is_release {
            state.update_key(keycode, direction);
            return KeyReply::unhandled();
        }

        let utf8 = state.key_get_utf8(keycode);
        state.update_key(keycode, direction);

        // Modifiers and control keys translate to nothing printable; let the
        // display server deliver those natively.
        if utf8.is_empty() || utf8.chars().any(|c| c.is_control()) {
            return KeyReply::unhandled();
        }

        KeyReply {
            consumed: true,
            edit: ImEdit {
                commit: Some(utf8),
                ..ImEdit::default()
            },
        }
    }

    fn update_surrounding_text(
        &mut self,
        _id: InputContextId,
        _text: &str,
        _cursor: i32,
        _anchor: i32,
    ) {
        // Stateless per context; nothing to track.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(keycode: u32, is_release: bool) -> KeyEvent {
        KeyEvent {
            context_id: 1,
            keyval: 0,
            keycode,
            modifiers: 0,
            is_release,
            time: 0,
        }
    }

    #[test]
    fn one_entry_per_layout() {
        let addon = KeyboardAddon::new(vec!["us".into(), "de".into()]);
        let entries = addon.input_methods();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, "keyboard-us");
        assert_eq!(entries[1].id, "keyboard-de");
        assert!(entries.iter().all(|e| e.addon_key == KEYBOARD_ADDON_KEY));
    }

    #[test]
    fn entry_id_round_trips_layout() {
        assert_eq!(KeyboardAddon::layout_of("keyboard-us"), "us");
        assert_eq!(KeyboardAddon::layout_of("keyboard-de"), "de");
    }

    #[test]
    fn release_is_never_committed() {
        let mut addon = KeyboardAddon::new(vec!["us".into()]);
        let entries = addon.input_methods();
        let reply = addon.key_event(&entries[0], &key(30, true));
        assert!(!reply.consumed);
        assert!(reply.edit.is_empty());
    }

    #[test]
    fn bogus_layout_passes_keys_through() {
        let mut addon = KeyboardAddon::new(vec!["no-such-layout-xyz".into()]);
        let entries = addon.input_methods();
        let reply = addon.key_event(&entries[0], &key(30, false));
        assert!(!reply.consumed);
    }
}
