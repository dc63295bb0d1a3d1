// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module registry
//!
//! Single-instance-per-id cache of module records: the sole source of
//! truth for module identity, so no id is ever fetched or executed
//! twice. Modules are created lazily and never destroyed.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::module::Module;

/// Identity-stable cache of module records
#[derive(Default)]
pub(crate) struct Registry {
    modules: HashMap<String, Rc<RefCell<Module>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached record for `id`, or construct and cache a new
    /// unfetched one with the given fetch uri.
    pub fn get_or_create(&mut self, id: &str, uri: impl FnOnce() -> String) -> Rc<RefCell<Module>> {
        if let Some(module) = self.modules.get(id) {
            return Rc::clone(module);
        }
        let module = Rc::new(RefCell::new(Module::new(id, uri())));
        self.modules.insert(id.to_string(), Rc::clone(&module));
        module
    }

    /// Look up a cached record without creating one
    pub fn get(&self, id: &str) -> Option<Rc<RefCell<Module>>> {
        self.modules.get(id).map(Rc::clone)
    }

    /// Whether a record exists for `id`
    pub fn contains(&self, id: &str) -> bool {
        self.modules.contains_key(id)
    }

    /// Number of cached records
    pub fn len(&self) -> usize {
        self.modules.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_create_is_identity_stable() {
        let mut registry = Registry::new();
        let first = registry.get_or_create("a", || "/a".to_string());
        let second = registry.get_or_create("a", || unreachable!("cached"));
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_get_does_not_create() {
        let registry = Registry::new();
        assert!(registry.get("missing").is_none());
        assert!(!registry.contains("missing"));
    }
}
