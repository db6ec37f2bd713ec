//! Event dispatcher.
//!
//! The dispatcher is the single owner of the input-context table and the
//! addon registry. Protocol frontends feed it `Event`s; it resolves the
//! active addon for the event's context and invokes the addon contract.
//!
//! Everything here runs on the one event-loop thread. The only deferral is
//! the IM-switch-on-release and the first-publish entries notification,
//! both queued as tasks drained at the top of the next loop iteration. That
//! is a re-entrancy guard: the active-addon index must never change while a
//! call stack is still dispatching a key event into the addon about to be
//! replaced.

use std::collections::VecDeque;

use crate::core::addon::ImEdit;
use crate::core::context::InputContextTable;
use crate::core::events::{Event, InputContextId, KeyEvent, IM_SWITCH_CHORD};
use crate::core::registry::AddonRegistry;

/// Host-visible notifications, drained after each dispatch cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// The process-wide focused context changed (None = no focus).
    FocusChanged(Option<InputContextId>),
    /// The global input-method entry list became non-empty or grew.
    EntriesChanged,
    /// A context's selected input-method index changed.
    InputMethodSwitched {
        context: InputContextId,
        index: usize,
    },
}

/// Work postponed to the next loop iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
enum DeferredTask {
    SwitchInputMethod { context: InputContextId },
}

pub struct Dispatcher {
    contexts: InputContextTable,
    registry: AddonRegistry,
    /// Modifier chord whose release cycles the input method.
    switch_chord: u32,
    deferred: VecDeque<DeferredTask>,
    notifications: Vec<Notification>,
    /// Editing results produced by addons, for the host to forward to the
    /// focused text field.
    pending_edits: Vec<(InputContextId, ImEdit)>,
}

impl Dispatcher {
    pub fn new(registry: AddonRegistry) -> Self {
        Self::with_switch_chord(registry, IM_SWITCH_CHORD)
    }

    pub fn with_switch_chord(registry: AddonRegistry, switch_chord: u32) -> Self {
        Self {
            contexts: InputContextTable::new(),
            registry,
            switch_chord,
            deferred: VecDeque::new(),
            notifications: Vec::new(),
            pending_edits: Vec::new(),
        }
    }

    pub fn registry(&self) -> &AddonRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut AddonRegistry {
        &mut self.registry
    }

    pub fn contexts(&self) -> &InputContextTable {
        &self.contexts
    }

    /// Mint a session id for a new display-server connection.
    pub fn new_context_id(&mut self) -> InputContextId {
        self.contexts.next_context_id()
    }

    pub fn focused_context(&self) -> Option<InputContextId> {
        self.contexts.focused_context()
    }

    /// Route one event. Returns whether a key event was consumed by the
    /// active input method; all other kinds report `false` (side effects
    /// only).
    pub fn post_event(&mut self, event: Event) -> bool {
        match event {
            Event::ContextCreated { id } => {
                self.contexts.register(id);
                self.registry.proxy_create_context(id);
                tracing::debug!("Input context {} created", id);
                false
            }
            Event::ContextDestroyed { id } => {
                // Idempotent: the second destroy for an id is a no-op.
                if self.contexts.remove(id) {
                    self.registry.proxy_destroyed(id);
                    tracing::debug!("Input context {} destroyed", id);
                }
                false
            }
            Event::ContextFocused { id } => {
                self.contexts.focus(id);
                self.notifications
                    .push(Notification::FocusChanged(self.contexts.focused_context()));
                self.registry.proxy_focus_in(id);
                false
            }
            Event::ContextUnfocused { id } => {
                let had_focus = self.contexts.focused_context() == Some(id);
                self.contexts.unfocus(id);
                if had_focus {
                    self.notifications.push(Notification::FocusChanged(None));
                }
                self.registry.proxy_focus_out(id);
                false
            }
            Event::Key(key) => self.post_key_event(key),
            Event::CursorRectChanged { id, rect } => {
                if let Some((_, addon)) = self.resolve_addon(id) {
                    addon.cursor_rectangle_changed(id, rect);
                }
                false
            }
            Event::SurroundingTextChanged {
                id,
                text,
                cursor,
                anchor,
            } => {
                if let Some((_, addon)) = self.resolve_addon(id) {
                    addon.update_surrounding_text(id, &text, cursor, anchor);
                }
                false
            }
        }
    }

    /// Drain deferred work. Must run at the top of each loop iteration,
    /// never from inside `post_event`.
    pub fn run_deferred(&mut self) {
        if self.registry.take_entries_changed() {
            self.notifications.push(Notification::EntriesChanged);
        }
        while let Some(task) = self.deferred.pop_front() {
            match task {
                DeferredTask::SwitchInputMethod { context } => {
                    self.switch_input_method(context);
                }
            }
        }
    }

    /// Take notifications accumulated since the last call.
    pub fn take_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    /// Take addon editing results accumulated since the last call.
    pub fn take_edits(&mut self) -> Vec<(InputContextId, ImEdit)> {
        std::mem::take(&mut self.pending_edits)
    }

    pub fn has_deferred(&self) -> bool {
        !self.deferred.is_empty()
    }

    fn post_key_event(&mut self, key: KeyEvent) -> bool {
        let id = key.context_id;
        if self.contexts.get(id).is_none() {
            debug_assert!(false, "key event for unknown context {id}");
            return false;
        }

        // Releasing the switch chord schedules the cycle for the next tick;
        // the key itself still reaches the current addon below.
        if key.is_switch_release(self.switch_chord) {
            self.deferred
                .push_back(DeferredTask::SwitchInputMethod { context: id });
            tracing::debug!("IM switch scheduled for context {}", id);
        }

        match self.resolve_addon(id) {
            Some((entry, addon)) => {
                let reply = addon.key_event(&entry, &key);
                if !reply.edit.is_empty() {
                    self.pending_edits.push((id, reply.edit));
                }
                reply.consumed
            }
            // No addon resolvable: unhandled, not an error.
            None => false,
        }
    }

    /// Cycle the context's input method to the next published entry.
    fn switch_input_method(&mut self, context: InputContextId) {
        let count = self.registry.entries().len();
        if count == 0 {
            return;
        }
        let Some(ctx) = self.contexts.get_mut(context) else {
            return;
        };
        ctx.im_index = (ctx.im_index + 1) % count;
        let index = ctx.im_index;

        let entry = self.registry.entries()[index].clone();
        tracing::info!(
            "Context {} switched to input method {} ({})",
            context,
            entry.id,
            entry.addon_key
        );
        if let Some(addon) = self.registry.by_key_mut(&entry.addon_key) {
            if let Some(proxy) = addon.proxy() {
                proxy.set_current_im(&entry.id);
            }
        } else {
            debug_assert!(false, "entry {} references unknown addon", entry.id);
        }

        self.notifications
            .push(Notification::InputMethodSwitched { context, index });
    }

    /// Resolve the addon serving a context through its entry index.
    ///
    /// Out-of-range indices and unregistered keys are routing bugs: they
    /// assert in debug builds and degrade to "no addon" in release.
    fn resolve_addon(
        &mut self,
        id: InputContextId,
    ) -> Option<(
        crate::core::addon::InputMethodEntry,
        &mut Box<dyn crate::core::addon::InputMethodAddon>,
    )> {
        let index = self.contexts.get(id)?.im_index;
        if self.registry.entries().is_empty() {
            return None;
        }
        if index >= self.registry.entries().len() {
            debug_assert!(false, "im_index {index} out of range for context {id}");
            return None;
        }
        let entry = self.registry.entries()[index].clone();
        let Some(addon) = self.registry.by_key_mut(&entry.addon_key) else {
            debug_assert!(
                false,
                "entry index {index} references unknown addon {}",
                entry.addon_key
            );
            return None;
        };
        Some((entry, addon))
    }
}
