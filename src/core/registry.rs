//! Addon registry.
//!
//! Owns every loaded addon for the process lifetime and publishes the global
//! ordered list of input-method entries. Entry order is insertion order and
//! stays stable once published. The first non-empty publish arms a one-shot
//! "entries changed" notification which the dispatcher emits on the next
//! loop iteration, so no observer sees a transient empty list between
//! registration and population.

use std::collections::HashMap;

use crate::core::addon::{
    Addon, AddonCategory, AddonFactory, AddonManifest, FrontendAddon, InputMethodAddon,
    InputMethodEntry,
};
use crate::core::errors::CoreError;
use crate::core::events::InputContextId;
use crate::prelude::Result;

#[derive(Default)]
pub struct AddonRegistry {
    input_methods: HashMap<String, Box<dyn InputMethodAddon>>,
    frontends: Vec<Box<dyn FrontendAddon>>,
    entries: Vec<InputMethodEntry>,
    entries_changed_armed: bool,
}

impl AddonRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load one addon from its manifest through the resolved factory set.
    ///
    /// A manifest with an unrecognized category or no matching factory is
    /// dropped with a warning; loading of the remaining addons continues.
    pub fn load(
        &mut self,
        manifest: &AddonManifest,
        factories: &HashMap<String, AddonFactory>,
    ) -> Result<()> {
        let Some(category) = AddonCategory::parse(&manifest.category) else {
            let err = CoreError::addon_error(format!(
                "addon {} has an invalid category {:?}",
                manifest.name, manifest.category
            ));
            tracing::warn!("{}, skipping", err);
            return Err(err);
        };

        let Some(factory) = factories.get(&manifest.library) else {
            let err = CoreError::addon_error(format!(
                "addon library {:?} has no registered factory for {}",
                manifest.library, manifest.name
            ));
            tracing::warn!("{}, skipping", err);
            return Err(err);
        };

        match (category, factory()) {
            (AddonCategory::Frontend, Addon::Frontend(frontend)) => {
                self.register_frontend(frontend);
                Ok(())
            }
            (AddonCategory::InputMethod, Addon::InputMethod(addon)) => {
                self.register_input_method(addon);
                Ok(())
            }
            _ => {
                let err = CoreError::addon_error(format!(
                    "addon {} does not implement its declared category {}",
                    manifest.name, category
                ));
                tracing::warn!("{}, skipping", err);
                Err(err)
            }
        }
    }

    pub fn register_frontend(&mut self, frontend: Box<dyn FrontendAddon>) {
        tracing::info!("Registered frontend addon {}", frontend.name());
        self.frontends.push(frontend);
    }

    /// Register an input-method addon and publish its entries.
    pub fn register_input_method(&mut self, addon: Box<dyn InputMethodAddon>) {
        let key = addon.key().to_string();
        let entries = addon.input_methods();
        tracing::info!("Registered input method addon {} ({} entries)", key, entries.len());
        self.input_methods.insert(key.clone(), addon);
        self.publish_entries(&key, entries);
    }

    /// Append entries to the global ordered list.
    ///
    /// The first non-empty publish arms the coalesced entries-changed
    /// notification; publishing repeatedly in the same tick arms it once.
    pub fn publish_entries(&mut self, key: &str, entries: Vec<InputMethodEntry>) {
        debug_assert!(entries.iter().all(|e| e.addon_key == key));
        if entries.is_empty() {
            return;
        }
        self.entries.extend(entries);
        self.entries_changed_armed = true;
    }

    /// Take the pending entries-changed notification, if armed.
    pub fn take_entries_changed(&mut self) -> bool {
        std::mem::take(&mut self.entries_changed_armed)
    }

    pub fn entries(&self) -> &[InputMethodEntry] {
        &self.entries
    }

    pub fn by_key(&self, key: &str) -> Option<&dyn InputMethodAddon> {
        self.input_methods.get(key).map(|a| a.as_ref())
    }

    pub fn by_key_mut(&mut self, key: &str) -> Option<&mut Box<dyn InputMethodAddon>> {
        self.input_methods.get_mut(key)
    }

    pub fn input_method_count(&self) -> usize {
        self.input_methods.len()
    }

    /// Notify every proxy-capable addon of a context lifecycle transition.
    pub fn for_each_proxy(&mut self, mut f: impl FnMut(&mut dyn crate::core::addon::ProxyAddon)) {
        for addon in self.input_methods.values_mut() {
            if let Some(proxy) = addon.proxy() {
                f(proxy);
            }
        }
    }

    /// Notify proxies that a context was created.
    pub fn proxy_create_context(&mut self, id: InputContextId) {
        self.for_each_proxy(|p| p.create_context(id));
    }

    pub fn proxy_destroyed(&mut self, id: InputContextId) {
        self.for_each_proxy(|p| p.destroyed(id));
    }

    pub fn proxy_focus_in(&mut self, id: InputContextId) {
        self.for_each_proxy(|p| p.focus_in(id));
    }

    pub fn proxy_focus_out(&mut self, id: InputContextId) {
        self.for_each_proxy(|p| p.focus_out(id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::addon::{KeyReply, ProxyAddon};
    use crate::core::events::KeyEvent;

    struct NullAddon {
        key: String,
        entries: Vec<InputMethodEntry>,
    }

    impl InputMethodAddon for NullAddon {
        fn key(&self) -> &str {
            &self.key
        }
        fn input_methods(&self) -> Vec<InputMethodEntry> {
            self.entries.clone()
        }
        fn key_event(&mut self, _entry: &InputMethodEntry, _event: &KeyEvent) -> KeyReply {
            KeyReply::unhandled()
        }
    }

    fn entry(addon: &str, id: &str) -> InputMethodEntry {
        InputMethodEntry {
            addon_key: addon.to_string(),
            id: id.to_string(),
            name: id.to_string(),
            short_description: String::new(),
            description: String::new(),
            language: String::new(),
        }
    }

    #[test]
    fn publish_appends_in_order() {
        let mut registry = AddonRegistry::new();
        registry.register_input_method(Box::new(NullAddon {
            key: "a".into(),
            entries: vec![entry("a", "a-1"), entry("a", "a-2")],
        }));
        registry.register_input_method(Box::new(NullAddon {
            key: "b".into(),
            entries: vec![entry("b", "b-1")],
        }));

        let ids: Vec<_> = registry.entries().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["a-1", "a-2", "b-1"]);
    }

    #[test]
    fn entries_changed_coalesces_per_tick() {
        let mut registry = AddonRegistry::new();
        registry.publish_entries("a", vec![entry("a", "a-1")]);
        registry.publish_entries("b", vec![entry("b", "b-1")]);

        // Two publishes in one tick fire exactly one notification.
        assert!(registry.take_entries_changed());
        assert!(!registry.take_entries_changed());
    }

    #[test]
    fn empty_publish_does_not_arm() {
        let mut registry = AddonRegistry::new();
        registry.publish_entries("a", Vec::new());
        assert!(!registry.take_entries_changed());
    }

    #[test]
    fn bad_manifest_is_skipped() {
        let mut registry = AddonRegistry::new();
        let factories = HashMap::new();

        let bad_category = AddonManifest {
            name: "weird".into(),
            category: "Renderer".into(),
            library: "libweird".into(),
        };
        assert!(matches!(
            registry.load(&bad_category, &factories),
            Err(CoreError::AddonError(_))
        ));

        let missing_factory = AddonManifest {
            name: "ghost".into(),
            category: "InputMethod".into(),
            library: "libghost".into(),
        };
        assert!(matches!(
            registry.load(&missing_factory, &factories),
            Err(CoreError::AddonError(_))
        ));

        assert_eq!(registry.input_method_count(), 0);
    }

    struct CountingProxy {
        key: String,
        created: Vec<InputContextId>,
    }

    impl InputMethodAddon for CountingProxy {
        fn key(&self) -> &str {
            &self.key
        }
        fn input_methods(&self) -> Vec<InputMethodEntry> {
            Vec::new()
        }
        fn key_event(&mut self, _entry: &InputMethodEntry, _event: &KeyEvent) -> KeyReply {
            KeyReply::unhandled()
        }
        fn proxy(&mut self) -> Option<&mut dyn ProxyAddon> {
            Some(self)
        }
    }

    impl ProxyAddon for CountingProxy {
        fn create_context(&mut self, id: InputContextId) {
            self.created.push(id);
        }
        fn destroyed(&mut self, _id: InputContextId) {}
        fn focus_in(&mut self, _id: InputContextId) {}
        fn focus_out(&mut self, _id: InputContextId) {}
        fn set_current_im(&mut self, _entry_id: &str) {}
    }

    #[test]
    fn proxy_fan_out_reaches_proxy_addons_only() {
        let mut registry = AddonRegistry::new();
        registry.register_input_method(Box::new(NullAddon {
            key: "plain".into(),
            entries: vec![entry("plain", "plain-1")],
        }));
        registry.register_input_method(Box::new(CountingProxy {
            key: "engine".into(),
            created: Vec::new(),
        }));

        registry.proxy_create_context(7);

        let mut seen = 0;
        registry.for_each_proxy(|_| seen += 1);
        assert_eq!(seen, 1);
    }
}
