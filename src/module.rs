// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module records and lifecycle states

use std::cell::RefCell;
use std::rc::Rc;

use crate::loader::{Loader, Require};

pub use serde_json::Value;

/// Lifecycle states, in monotone order
///
/// A module's state never regresses; `Executed` is terminal and marks
/// the exports as settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ModuleState {
    /// Created lazily on first resolution; nothing requested yet
    Unfetched,
    /// A fetch has been issued and has not completed
    Fetching,
    /// A definition is installed (via fetch self-registration or an
    /// explicit define)
    Fetched,
    /// Dependency walk in progress; some dependencies still pending
    Loading,
    /// All dependencies satisfied; executable
    Loaded,
    /// Producer ran (exactly once); exports are settled
    Executed,
}

/// Stable module identity handed to producers
///
/// Producers never see a live module record; identity is allocated
/// before behavior is installed and stays valid for the process
/// lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    /// Canonical id
    pub id: String,
    /// Derived fetch location (without the source extension)
    pub uri: String,
}

/// An argument passed to a factory
pub enum Arg {
    /// A require function bound to the owning module's id
    Require(Require),
    /// The owning module's shared exports container
    Exports(Rc<RefCell<Value>>),
    /// The owning module's identity
    Module(ModuleInfo),
    /// A dependency's exports
    Dep(Value),
}

impl Arg {
    /// The dependency exports carried by this argument, if any
    pub fn value(&self) -> Option<&Value> {
        match self {
            Arg::Dep(value) => Some(value),
            _ => None,
        }
    }

    /// The require handle carried by this argument, if any
    pub fn require(&self) -> Option<&Require> {
        match self {
            Arg::Require(require) => Some(require),
            _ => None,
        }
    }

    /// The exports container carried by this argument, if any
    pub fn exports(&self) -> Option<&Rc<RefCell<Value>>> {
        match self {
            Arg::Exports(exports) => Some(exports),
            _ => None,
        }
    }
}

type FactoryFn = Box<dyn FnMut(Vec<Arg>) -> Option<Value>>;

/// A producer function
///
/// Rust closures carry no parameter count or source text, so both are
/// supplied explicitly: `arity` bounds positional argument passing
/// under the declared convention, and `source` (when present) feeds the
/// dependency extractor for undeclared definitions.
pub struct Factory {
    arity: usize,
    source: Option<String>,
    call: FactoryFn,
}

impl Factory {
    /// Create a factory expecting `arity` positional arguments
    pub fn new(
        arity: usize,
        call: impl FnMut(Vec<Arg>) -> Option<Value> + 'static,
    ) -> Self {
        Self {
            arity,
            source: None,
            call: Box::new(call),
        }
    }

    /// Create a factory carrying the source text its dependencies can
    /// be sniffed from
    pub fn with_source(
        arity: usize,
        source: impl Into<String>,
        call: impl FnMut(Vec<Arg>) -> Option<Value> + 'static,
    ) -> Self {
        Self {
            arity,
            source: Some(source.into()),
            call: Box::new(call),
        }
    }

    /// Expected positional parameter count
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Source text for sniffing, if supplied
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub(crate) fn invoke(&mut self, args: Vec<Arg>) -> Option<Value> {
        (self.call)(args)
    }
}

impl std::fmt::Debug for Factory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Factory")
            .field("arity", &self.arity)
            .field("source", &self.source.is_some())
            .finish()
    }
}

/// What a definition supplies: a factory invoked once at execution, or
/// a plain value used as the exports directly
#[derive(Debug)]
pub enum Producer {
    /// Plain exports value
    Value(Value),
    /// Factory function
    Factory(Factory),
}

impl Producer {
    /// Positional parameter count (zero for plain values)
    pub fn arity(&self) -> usize {
        match self {
            Producer::Value(_) => 0,
            Producer::Factory(factory) => factory.arity(),
        }
    }

    pub(crate) fn noop() -> Self {
        Producer::Factory(Factory::new(0, |_| None))
    }
}

pub(crate) type LoadHook = Box<dyn FnOnce(&Loader)>;

/// A module record
///
/// Owned by the registry behind `Rc<RefCell<_>>`; all mutation happens
/// through the loader within a single call turn.
pub(crate) struct Module {
    pub id: String,
    pub uri: String,
    /// Raw dependency ids, in declaration (or sniff) order
    pub deps: Vec<String>,
    /// Declared dependency list vs sniffed from source
    pub declared: bool,
    pub state: ModuleState,
    /// Taken exactly once, at execution
    pub producer: Option<Producer>,
    /// Shared exports container; mutable until executed
    pub exports: Rc<RefCell<Value>>,
    /// Pending-dependency counter while loading
    pub remain: usize,
    /// Dependent module ids to notify on load, in registration order.
    /// May grow while being drained.
    pub listeners: Vec<String>,
    /// Optional completion hook (aggregate modules)
    pub on_loaded: Option<LoadHook>,
    /// Disables the cycle short-circuit for this module's own walk
    pub force: bool,
    /// Guards against producer re-entry during execution
    pub executing: bool,
}

impl Module {
    pub fn new(id: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            uri: uri.into(),
            deps: Vec::new(),
            declared: true,
            state: ModuleState::Unfetched,
            producer: Some(Producer::noop()),
            exports: Rc::new(RefCell::new(Value::Object(serde_json::Map::new()))),
            remain: 0,
            listeners: Vec::new(),
            on_loaded: None,
            force: false,
            executing: false,
        }
    }

    /// Advance the lifecycle state; regressions are ignored
    pub fn advance(&mut self, to: ModuleState) {
        if to > self.state {
            self.state = to;
        }
    }

    /// Identity snapshot for producers
    pub fn info(&self) -> ModuleInfo {
        ModuleInfo {
            id: self.id.clone(),
            uri: self.uri.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_order_is_total() {
        use ModuleState::*;
        let order = [Unfetched, Fetching, Fetched, Loading, Loaded, Executed];
        for window in order.windows(2) {
            assert!(window[0] < window[1]);
        }
    }

    #[test]
    fn test_advance_never_regresses() {
        let mut module = Module::new("a", "/a");
        module.advance(ModuleState::Loaded);
        module.advance(ModuleState::Fetching);
        assert_eq!(module.state, ModuleState::Loaded);
    }

    #[test]
    fn test_new_module_defaults() {
        let module = Module::new("a", "/a");
        assert_eq!(module.state, ModuleState::Unfetched);
        assert!(module.declared);
        assert!(module.deps.is_empty());
        assert_eq!(*module.exports.borrow(), serde_json::json!({}));
    }
}
