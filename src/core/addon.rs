//! Addon capability contracts.
//!
//! Addons are loadable modules classified by capability. The dynamic-library
//! mechanics live outside the core; here an addon is a boxed trait object
//! produced by a registered factory, and capability checks are explicit
//! query methods rather than downcasts.

use std::fmt;

use crate::core::events::{CursorRect, InputContextId, KeyEvent};

/// A registered, selectable input method.
///
/// Published once by the owning addon at init time and immutable afterwards.
/// The ordered sequence of published entries defines the index space used by
/// `InputContext::im_index`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputMethodEntry {
    /// Key of the addon that owns this entry.
    pub addon_key: String,
    /// Globally unique entry id.
    pub id: String,
    /// Display name.
    pub name: String,
    pub short_description: String,
    pub description: String,
    /// Language tag, may be empty.
    pub language: String,
}

/// Editing results an addon hands back for the focused text field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImEdit {
    /// Replacement preedit string with cursor begin/end byte offsets.
    pub preedit: Option<(String, i32, i32)>,
    /// Text to commit at the cursor.
    pub commit: Option<String>,
    /// Bytes to delete before/after the cursor.
    pub delete_surrounding: (u32, u32),
}

impl ImEdit {
    pub fn is_empty(&self) -> bool {
        self.preedit.is_none() && self.commit.is_none() && self.delete_surrounding == (0, 0)
    }
}

/// Reply to a forwarded key event.
#[derive(Debug, Clone, Default)]
pub struct KeyReply {
    /// Whether the key was consumed by the input method.
    pub consumed: bool,
    pub edit: ImEdit,
}

impl KeyReply {
    pub fn unhandled() -> Self {
        Self::default()
    }

    pub fn committed(text: impl Into<String>) -> Self {
        Self {
            consumed: true,
            edit: ImEdit {
                commit: Some(text.into()),
                ..ImEdit::default()
            },
        }
    }
}

/// Contract every input-method addon implements.
pub trait InputMethodAddon {
    /// Stable key identifying this addon in the registry.
    fn key(&self) -> &str;

    /// Ordered entries this addon publishes. Called once at registration.
    fn input_methods(&self) -> Vec<InputMethodEntry>;

    /// Forward a key event for the given entry.
    fn key_event(&mut self, entry: &InputMethodEntry, event: &KeyEvent) -> KeyReply;

    /// Surrounding-text update for a context. Default: ignored.
    fn update_surrounding_text(
        &mut self,
        id: InputContextId,
        text: &str,
        cursor: i32,
        anchor: i32,
    ) {
        let _ = (id, text, cursor, anchor);
    }

    /// Cursor-rectangle update for a context. Default: ignored.
    fn cursor_rectangle_changed(&mut self, id: InputContextId, rect: CursorRect) {
        let _ = (id, rect);
    }

    /// Capability query: proxy addons forward context lifecycle to an
    /// external engine. Default: not proxy-capable.
    fn proxy(&mut self) -> Option<&mut dyn ProxyAddon> {
        None
    }
}

/// Extra contract for addons that mirror contexts into an external engine.
pub trait ProxyAddon: InputMethodAddon {
    fn create_context(&mut self, id: InputContextId);
    fn destroyed(&mut self, id: InputContextId);
    fn focus_in(&mut self, id: InputContextId);
    fn focus_out(&mut self, id: InputContextId);
    fn set_current_im(&mut self, entry_id: &str);
}

/// Contract for frontend addons (display-server facing surfaces).
pub trait FrontendAddon {
    fn name(&self) -> &str;
}

/// Capability category declared in an addon manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddonCategory {
    Frontend,
    InputMethod,
}

impl AddonCategory {
    /// Parse the manifest category string. Unrecognized categories are a
    /// load error, not a panic.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Frontend" => Some(Self::Frontend),
            "InputMethod" => Some(Self::InputMethod),
            _ => None,
        }
    }
}

impl fmt::Display for AddonCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Frontend => write!(f, "Frontend"),
            Self::InputMethod => write!(f, "InputMethod"),
        }
    }
}

/// A loaded addon instance, tagged by capability.
pub enum Addon {
    Frontend(Box<dyn FrontendAddon>),
    InputMethod(Box<dyn InputMethodAddon>),
}

/// On-disk addon descriptor. Discovery and library resolution are handled
/// by the host; the core only consumes the parsed form.
#[derive(Debug, Clone)]
pub struct AddonManifest {
    pub name: String,
    pub category: String,
    pub library: String,
}

/// Factory resolved for a manifest's library by the loading mechanism.
pub type AddonFactory = Box<dyn Fn() -> Addon>;
