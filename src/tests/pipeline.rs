//! End-to-end dispatch scenarios, driven without a display server.

use crate::core::addon::{ImEdit, InputMethodAddon, InputMethodEntry, KeyReply};
use crate::core::dispatcher::{Dispatcher, Notification};
use crate::core::events::{Event, KeyEvent, CONTROL_MASK, SHIFT_MASK};
use crate::core::registry::AddonRegistry;
use crate::core::state::ServerState;
use crate::core::wayland::text_input::TextInputState;

/// Commits a fixed string for every press; ignores releases.
struct EchoAddon {
    key: &'static str,
    text: &'static str,
}

impl InputMethodAddon for EchoAddon {
    fn key(&self) -> &str {
        self.key
    }
    fn input_methods(&self) -> Vec<InputMethodEntry> {
        vec![InputMethodEntry {
            addon_key: self.key.to_string(),
            id: format!("{}-default", self.key),
            name: self.key.to_string(),
            short_description: String::new(),
            description: String::new(),
            language: String::new(),
        }]
    }
    fn key_event(&mut self, _entry: &InputMethodEntry, event: &KeyEvent) -> KeyReply {
        if event.is_release {
            KeyReply::unhandled()
        } else {
            KeyReply::committed(self.text)
        }
    }
}

fn two_addon_dispatcher() -> Dispatcher {
    let mut registry = AddonRegistry::new();
    registry.register_input_method(Box::new(EchoAddon {
        key: "alpha",
        text: "a",
    }));
    registry.register_input_method(Box::new(EchoAddon {
        key: "beta",
        text: "b",
    }));
    let mut dispatcher = Dispatcher::new(registry);
    dispatcher.run_deferred();
    dispatcher.take_notifications();
    dispatcher
}

fn press(dispatcher: &mut Dispatcher, context_id: u64, keycode: u32) -> bool {
    dispatcher.post_event(Event::Key(KeyEvent {
        context_id,
        keyval: 0,
        keycode,
        modifiers: 0,
        is_release: false,
        time: 0,
    }))
}

fn chord_release(dispatcher: &mut Dispatcher, context_id: u64) {
    dispatcher.post_event(Event::Key(KeyEvent {
        context_id,
        keyval: 0,
        keycode: 42,
        modifiers: SHIFT_MASK | CONTROL_MASK,
        is_release: true,
        time: 0,
    }));
}

#[test]
fn test_typing_pipeline_commits_text() {
    let mut dispatcher = two_addon_dispatcher();
    let id = dispatcher.new_context_id();
    dispatcher.post_event(Event::ContextCreated { id });
    dispatcher.post_event(Event::ContextFocused { id });

    assert!(press(&mut dispatcher, id, 30));
    let edits = dispatcher.take_edits();
    assert_eq!(edits.len(), 1);
    assert_eq!(edits[0].0, id);
    assert_eq!(edits[0].1.commit.as_deref(), Some("a"));
}

#[test]
fn test_switch_then_type_targets_new_addon() {
    let mut dispatcher = two_addon_dispatcher();
    let id = dispatcher.new_context_id();
    dispatcher.post_event(Event::ContextCreated { id });
    dispatcher.post_event(Event::ContextFocused { id });

    chord_release(&mut dispatcher, id);
    dispatcher.run_deferred();
    assert!(dispatcher
        .take_notifications()
        .contains(&Notification::InputMethodSwitched { context: id, index: 1 }));

    press(&mut dispatcher, id, 30);
    let edits = dispatcher.take_edits();
    assert_eq!(edits[0].1.commit.as_deref(), Some("b"));
}

#[test]
fn test_switch_wraps_back_to_first_entry() {
    let mut dispatcher = two_addon_dispatcher();
    let id = dispatcher.new_context_id();
    dispatcher.post_event(Event::ContextCreated { id });
    dispatcher.post_event(Event::ContextFocused { id });

    chord_release(&mut dispatcher, id);
    dispatcher.run_deferred();
    chord_release(&mut dispatcher, id);
    dispatcher.run_deferred();

    press(&mut dispatcher, id, 30);
    let edits = dispatcher.take_edits();
    assert_eq!(edits.last().unwrap().1.commit.as_deref(), Some("a"));
}

#[test]
fn test_focus_handoff_between_contexts() {
    let mut dispatcher = two_addon_dispatcher();
    let a = dispatcher.new_context_id();
    let b = dispatcher.new_context_id();
    dispatcher.post_event(Event::ContextCreated { id: a });
    dispatcher.post_event(Event::ContextCreated { id: b });

    dispatcher.post_event(Event::ContextFocused { id: a });
    dispatcher.post_event(Event::ContextFocused { id: b });
    dispatcher.post_event(Event::ContextUnfocused { id: a });

    // Keys for the focused context still work after the stale unfocus.
    assert_eq!(dispatcher.focused_context(), Some(b));
    press(&mut dispatcher, b, 30);
    let edits = dispatcher.take_edits();
    assert_eq!(edits[0].0, b);
}

#[test]
fn test_per_context_input_method_selection() {
    let mut dispatcher = two_addon_dispatcher();
    let a = dispatcher.new_context_id();
    let b = dispatcher.new_context_id();
    dispatcher.post_event(Event::ContextCreated { id: a });
    dispatcher.post_event(Event::ContextCreated { id: b });

    // Only context A switches; B keeps the first entry.
    chord_release(&mut dispatcher, a);
    dispatcher.run_deferred();

    press(&mut dispatcher, a, 30);
    press(&mut dispatcher, b, 30);
    let edits = dispatcher.take_edits();
    assert_eq!(edits[0].1.commit.as_deref(), Some("b"));
    assert_eq!(edits[1].1.commit.as_deref(), Some("a"));
}

#[test]
fn test_edit_with_no_enabled_text_input_is_dropped() {
    let mut text_input = TextInputState::default();
    let edit = ImEdit {
        commit: Some("x".into()),
        ..ImEdit::default()
    };
    assert!(!text_input.apply_edit(1, &edit));
}

#[test]
fn test_raw_keys_reach_focused_context_only() {
    let mut registry = AddonRegistry::new();
    registry.register_input_method(Box::new(EchoAddon {
        key: "alpha",
        text: "a",
    }));
    let mut state = ServerState::new(Dispatcher::new(registry), "seat0", "us");
    state.dispatcher.run_deferred();
    state.dispatcher.take_notifications();

    // No focus yet: the key is dropped.
    state.handle_raw_key(30, 0, 0, false, 0);
    assert!(state.dispatcher.take_edits().is_empty());

    let id = state.dispatcher.new_context_id();
    state.dispatcher.post_event(Event::ContextCreated { id });
    state.dispatcher.post_event(Event::ContextFocused { id });
    state.handle_raw_key(30, 0, 0, false, 1);
    let edits = state.dispatcher.take_edits();
    assert_eq!(edits.len(), 1);
    assert_eq!(edits[0].0, id);
}
