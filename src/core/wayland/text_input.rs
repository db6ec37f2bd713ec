//! WP Text Input protocol implementation.
//!
//! Each zwp_text_input_v3 object maps to one input context in the
//! dispatcher. The `set_*` requests between two commits are double-buffered
//! in a pending block and applied on Commit. Enable and Disable are not
//! staged: they fire the context focus and input-method activate/deactivate
//! edges immediately on the request.

use std::collections::HashMap;

use wayland_protocols::wp::text_input::zv3::server::{
    zwp_text_input_manager_v3::{self, ZwpTextInputManagerV3},
    zwp_text_input_v3::{self, ZwpTextInputV3},
};
use wayland_server::{
    Client, DataInit, Dispatch, DisplayHandle, GlobalDispatch, New, Resource,
};

use crate::core::addon::ImEdit;
use crate::core::events::{CursorRect, Event, InputContextId};
use crate::core::state::ServerState;

// ============================================================================
// Data Types
// ============================================================================

/// Content type hint for the text input field
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContentType {
    pub hint: u32,
    pub purpose: u32,
}

/// Requests staged since the last commit.
#[derive(Debug, Clone, Default)]
pub struct PendingState {
    pub surrounding: Option<(String, i32, i32)>,
    pub content_type: Option<ContentType>,
    pub cursor_rect: Option<CursorRect>,
}

/// Per-text-input state tracked by the daemon
#[derive(Debug)]
pub struct TextInputInstance {
    pub resource: ZwpTextInputV3,
    pub context_id: InputContextId,
    pub enabled: bool,
    pub pending: PendingState,
    pub surrounding_text: String,
    pub surrounding_cursor: i32,
    pub surrounding_anchor: i32,
    pub content_type: ContentType,
    pub cursor_rect: CursorRect,
    /// Serial of the last done event; strictly increasing per instance.
    pub serial: u32,
}

/// Process-wide text input state
#[derive(Debug, Default)]
pub struct TextInputState {
    /// All live text input instances, keyed by resource protocol ID
    pub instances: HashMap<u32, TextInputInstance>,
}

/// One wire operation of an applied editing batch, in send order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOp {
    Preedit(String, i32, i32),
    Commit(String),
    DeleteSurrounding(u32, u32),
    Done(u32),
}

/// Expand an editing result into the wire sequence for one done batch.
///
/// Order is fixed: preedit, commit string, delete surrounding, done. An
/// empty edit still produces no traffic at all, not a bare done.
pub fn plan_edit_ops(edit: &ImEdit, serial: u32) -> Vec<EditOp> {
    if edit.is_empty() {
        return Vec::new();
    }
    let mut ops = Vec::new();
    if let Some((text, begin, end)) = &edit.preedit {
        ops.push(EditOp::Preedit(text.clone(), *begin, *end));
    }
    if let Some(text) = &edit.commit {
        ops.push(EditOp::Commit(text.clone()));
    }
    let (before, after) = edit.delete_surrounding;
    if before != 0 || after != 0 {
        ops.push(EditOp::DeleteSurrounding(before, after));
    }
    ops.push(EditOp::Done(serial));
    ops
}

impl TextInputState {
    /// The enabled instance bound to a context, if any.
    pub fn enabled_instance_mut(
        &mut self,
        context_id: InputContextId,
    ) -> Option<&mut TextInputInstance> {
        self.instances
            .values_mut()
            .find(|i| i.context_id == context_id && i.enabled)
    }

    /// Forward an editing result to the enabled text input of a context.
    /// Returns whether anything was sent.
    pub fn apply_edit(&mut self, context_id: InputContextId, edit: &ImEdit) -> bool {
        let Some(instance) = self.enabled_instance_mut(context_id) else {
            // Context went away or got disabled since the edit was produced.
            tracing::debug!(
                "Dropping edit for context {} with no enabled text input",
                context_id
            );
            return false;
        };
        if !instance.resource.is_alive() {
            return false;
        }

        instance.serial = instance.serial.wrapping_add(1);
        let ops = plan_edit_ops(edit, instance.serial);
        if ops.is_empty() {
            return false;
        }
        for op in ops {
            match op {
                EditOp::Preedit(text, begin, end) => {
                    instance.resource.preedit_string(Some(text), begin, end);
                }
                EditOp::Commit(text) => {
                    instance.resource.commit_string(Some(text));
                }
                EditOp::DeleteSurrounding(before, after) => {
                    instance.resource.delete_surrounding_text(before, after);
                }
                EditOp::Done(serial) => {
                    instance.resource.done(serial);
                }
            }
        }
        true
    }
}

// ============================================================================
// zwp_text_input_manager_v3
// ============================================================================

impl GlobalDispatch<ZwpTextInputManagerV3, ()> for ServerState {
    fn bind(
        _state: &mut Self,
        _handle: &DisplayHandle,
        _client: &Client,
        resource: New<ZwpTextInputManagerV3>,
        _global_data: &(),
        data_init: &mut DataInit<'_, Self>,
    ) {
        data_init.init(resource, ());
        tracing::debug!("Bound zwp_text_input_manager_v3");
    }
}

impl Dispatch<ZwpTextInputManagerV3, ()> for ServerState {
    fn request(
        state: &mut Self,
        _client: &Client,
        _resource: &ZwpTextInputManagerV3,
        request: zwp_text_input_manager_v3::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            zwp_text_input_manager_v3::Request::GetTextInput { id, seat } => {
                let seat_id = seat.id().protocol_id();
                let context_id = state.dispatcher.new_context_id();
                let text_input = data_init.init(id, context_id);
                let ti_id = text_input.id().protocol_id();

                state.text_input.instances.insert(
                    ti_id,
                    TextInputInstance {
                        resource: text_input,
                        context_id,
                        enabled: false,
                        pending: PendingState::default(),
                        surrounding_text: String::new(),
                        surrounding_cursor: 0,
                        surrounding_anchor: 0,
                        content_type: ContentType::default(),
                        cursor_rect: CursorRect::default(),
                        serial: 0,
                    },
                );
                state
                    .dispatcher
                    .post_event(Event::ContextCreated { id: context_id });

                tracing::debug!(
                    "Created text input {} (context {}) for seat {}",
                    ti_id,
                    context_id,
                    seat_id
                );
            }
            zwp_text_input_manager_v3::Request::Destroy => {
                tracing::debug!("zwp_text_input_manager_v3 destroyed");
            }
            _ => {}
        }
    }
}

// ============================================================================
// zwp_text_input_v3 — user data is the dispatcher context id
// ============================================================================

impl Dispatch<ZwpTextInputV3, InputContextId> for ServerState {
    fn request(
        state: &mut Self,
        _client: &Client,
        resource: &ZwpTextInputV3,
        request: zwp_text_input_v3::Request,
        context_id: &InputContextId,
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        let ti_id = resource.id().protocol_id();
        match request {
            zwp_text_input_v3::Request::Enable => {
                state.set_text_input_enabled(ti_id, true);
            }
            zwp_text_input_v3::Request::Disable => {
                state.set_text_input_enabled(ti_id, false);
            }
            zwp_text_input_v3::Request::SetSurroundingText { text, cursor, anchor } => {
                if let Some(instance) = state.text_input.instances.get_mut(&ti_id) {
                    instance.pending.surrounding = Some((text, cursor, anchor));
                }
            }
            zwp_text_input_v3::Request::SetTextChangeCause { cause: _ } => {
                // The change cause applies to the next commit; nothing to do
                // until an engine consumes it.
            }
            zwp_text_input_v3::Request::SetContentType { hint, purpose } => {
                if let Some(instance) = state.text_input.instances.get_mut(&ti_id) {
                    instance.pending.content_type = Some(ContentType {
                        hint: hint.into(),
                        purpose: purpose.into(),
                    });
                }
            }
            zwp_text_input_v3::Request::SetCursorRectangle { x, y, width, height } => {
                if let Some(instance) = state.text_input.instances.get_mut(&ti_id) {
                    instance.pending.cursor_rect = Some(CursorRect {
                        x,
                        y,
                        width,
                        height,
                    });
                }
            }
            zwp_text_input_v3::Request::Commit => {
                state.commit_text_input(ti_id);
            }
            zwp_text_input_v3::Request::Destroy => {
                state.text_input.instances.remove(&ti_id);
                state
                    .dispatcher
                    .post_event(Event::ContextDestroyed { id: *context_id });
                tracing::debug!("Text input {} destroyed", ti_id);
            }
            _ => {}
        }
    }

    fn destroyed(
        state: &mut Self,
        _client: wayland_server::backend::ClientId,
        resource: &ZwpTextInputV3,
        context_id: &InputContextId,
    ) {
        // Client disconnect without an explicit destroy request.
        state
            .text_input
            .instances
            .remove(&resource.id().protocol_id());
        state
            .dispatcher
            .post_event(Event::ContextDestroyed { id: *context_id });
    }
}

/// Register zwp_text_input_manager_v3 global
pub fn register_text_input_manager(display: &DisplayHandle) -> wayland_server::backend::GlobalId {
    display.create_global::<ServerState, ZwpTextInputManagerV3, ()>(1, ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edit_ops_follow_fixed_order() {
        let edit = ImEdit {
            preedit: Some(("ni".into(), 0, 2)),
            commit: Some("你".into()),
            delete_surrounding: (1, 0),
        };
        let ops = plan_edit_ops(&edit, 7);
        assert_eq!(
            ops,
            [
                EditOp::Preedit("ni".into(), 0, 2),
                EditOp::Commit("你".into()),
                EditOp::DeleteSurrounding(1, 0),
                EditOp::Done(7),
            ]
        );
    }

    #[test]
    fn empty_edit_produces_no_traffic() {
        assert!(plan_edit_ops(&ImEdit::default(), 3).is_empty());
    }

    #[test]
    fn commit_only_edit_still_ends_with_done() {
        let edit = ImEdit {
            commit: Some("a".into()),
            ..ImEdit::default()
        };
        let ops = plan_edit_ops(&edit, 1);
        assert_eq!(ops.len(), 2);
        assert_eq!(ops.last(), Some(&EditOp::Done(1)));
    }
}
