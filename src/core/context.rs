//! Input context table.
//!
//! One `InputContext` per connected text-entry session. The table owns all
//! contexts for the process lifetime of the session and tracks the single
//! process-wide focused context. Focus is exclusive: focusing one context
//! implicitly revokes it from whichever context held it before, and
//! unfocusing never leaves a stale id behind.

use std::collections::HashMap;

use crate::core::events::InputContextId;

/// One connected text-entry session.
#[derive(Debug, Clone)]
pub struct InputContext {
    pub id: InputContextId,
    pub focused: bool,
    /// Index into the global ordered input-method entry list.
    pub im_index: usize,
}

impl InputContext {
    fn new(id: InputContextId) -> Self {
        Self {
            id,
            focused: false,
            im_index: 0,
        }
    }
}

/// Registry of live input contexts plus the exclusive focus holder.
#[derive(Debug, Default)]
pub struct InputContextTable {
    contexts: HashMap<InputContextId, InputContext>,
    focused: Option<InputContextId>,
    next_id: InputContextId,
}

impl InputContextTable {
    pub fn new() -> Self {
        Self {
            contexts: HashMap::new(),
            focused: None,
            next_id: 1,
        }
    }

    /// Mint a fresh session id. Ids are unique for the process lifetime.
    pub fn next_context_id(&mut self) -> InputContextId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Register a context. Re-registering an id is a no-op.
    pub fn register(&mut self, id: InputContextId) {
        self.contexts.entry(id).or_insert_with(|| InputContext::new(id));
    }

    /// Remove a context. Returns whether it existed; removing twice is a
    /// no-op the second time.
    pub fn remove(&mut self, id: InputContextId) -> bool {
        if self.focused == Some(id) {
            self.focused = None;
        }
        self.contexts.remove(&id).is_some()
    }

    /// Focus a context, implicitly unfocusing the previous holder.
    pub fn focus(&mut self, id: InputContextId) {
        if let Some(prev) = self.focused.take() {
            if let Some(ctx) = self.contexts.get_mut(&prev) {
                ctx.focused = false;
            }
        }
        if let Some(ctx) = self.contexts.get_mut(&id) {
            ctx.focused = true;
            self.focused = Some(id);
        }
    }

    /// Clear focus if `id` currently holds it. A late unfocus for a context
    /// that already lost focus does not disturb the current holder.
    pub fn unfocus(&mut self, id: InputContextId) {
        if self.focused == Some(id) {
            self.focused = None;
            if let Some(ctx) = self.contexts.get_mut(&id) {
                ctx.focused = false;
            }
        }
    }

    pub fn focused_context(&self) -> Option<InputContextId> {
        self.focused
    }

    pub fn get(&self, id: InputContextId) -> Option<&InputContext> {
        self.contexts.get(&id)
    }

    pub fn get_mut(&mut self, id: InputContextId) -> Option<&mut InputContext> {
        self.contexts.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}
