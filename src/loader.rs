// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The loader context and the define/require surface
//!
//! A [`Loader`] owns the config store and the module registry and runs
//! the load orchestration: fetch delegation, the dependency walk with
//! its cycle short-circuit, listener fan-out, and exactly-once
//! execution. Everything is single-threaded and cooperative; state
//! changes happen synchronously inside a call turn (a define/require
//! call or a collaborator ticket completing), so the whole context
//! lives behind `Rc<RefCell<_>>` and is deliberately `!Send`.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{debug, trace, warn};

use crate::cache::Registry;
use crate::config::{Config, ConfigUpdate, SOURCE_EXT};
use crate::error::{LoaderError, Result};
use crate::fetch::{
    FetchRequest, FetchTicket, Fetcher, InertFetcher, NullPluginLoader, PluginLoader,
    PluginRequest, PluginTicket,
};
use crate::module::{Arg, Factory, Module, ModuleState, Producer, Value};
use crate::resolver::{self, is_plugin, is_reserved};
use crate::sniff::{DependencyExtractor, RequireCallExtractor};

struct Inner {
    config: Config,
    registry: Registry,
    fetcher: Rc<dyn Fetcher>,
    plugins: Rc<dyn PluginLoader>,
    extractor: Rc<dyn DependencyExtractor>,
    /// Initial working context; relative `baseUrl` updates resolve
    /// against it
    root: String,
    /// Id of the fetch currently being issued, for anonymous-define
    /// recovery
    adding: Option<String>,
    /// Generator for aggregate module ids
    next_uid: u64,
}

/// A define/require loader context
///
/// Cheap to clone (a shared handle). Construct via [`Loader::builder`].
#[derive(Clone)]
pub struct Loader {
    inner: Rc<RefCell<Inner>>,
}

/// Builder for [`Loader`]
pub struct LoaderBuilder {
    fetcher: Rc<dyn Fetcher>,
    plugins: Rc<dyn PluginLoader>,
    extractor: Rc<dyn DependencyExtractor>,
    context: String,
}

impl LoaderBuilder {
    fn new() -> Self {
        Self {
            fetcher: Rc::new(InertFetcher),
            plugins: Rc::new(NullPluginLoader),
            extractor: Rc::new(RequireCallExtractor),
            context: String::new(),
        }
    }

    /// Install the source fetcher (defaults to [`InertFetcher`])
    pub fn fetcher(mut self, fetcher: impl Fetcher + 'static) -> Self {
        self.fetcher = Rc::new(fetcher);
        self
    }

    /// Install the plugin loader (defaults to [`NullPluginLoader`])
    pub fn plugin_loader(mut self, plugins: impl PluginLoader + 'static) -> Self {
        self.plugins = Rc::new(plugins);
        self
    }

    /// Install the dependency extractor (defaults to
    /// [`RequireCallExtractor`])
    pub fn extractor(mut self, extractor: impl DependencyExtractor + 'static) -> Self {
        self.extractor = Rc::new(extractor);
        self
    }

    /// The initial working context: the directory the base location
    /// defaults to and relative `baseUrl` updates resolve against
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub fn build(self) -> Loader {
        Loader {
            inner: Rc::new(RefCell::new(Inner {
                config: Config::new(self.context.clone()),
                registry: Registry::new(),
                fetcher: self.fetcher,
                plugins: self.plugins,
                extractor: self.extractor,
                root: self.context,
                adding: None,
                next_uid: 0,
            })),
        }
    }
}

/// A define call, in one of its legal shapes
///
/// The tagged variants normalize into a single (id?, deps?, producer)
/// record before any stateful work. Shapes without a dependency list
/// get their dependencies sniffed from the producer's source text when
/// one is present.
pub enum DefineCall {
    /// `define(producer)` — id recovered from the in-flight fetch
    Anonymous(Producer),
    /// `define(id, producer)`
    Named(String, Producer),
    /// `define(deps, producer)` — id recovered from the in-flight fetch
    WithDeps(Vec<String>, Producer),
    /// `define(id, deps, producer)`
    Full(String, Vec<String>, Producer),
}

impl DefineCall {
    fn normalize(self) -> (Option<String>, Option<Vec<String>>, Producer) {
        match self {
            DefineCall::Anonymous(producer) => (None, None, producer),
            DefineCall::Named(id, producer) => (Some(id), None, producer),
            DefineCall::WithDeps(deps, producer) => (None, Some(deps), producer),
            DefineCall::Full(id, deps, producer) => (Some(id), Some(deps), producer),
        }
    }
}

impl Loader {
    pub fn builder() -> LoaderBuilder {
        LoaderBuilder::new()
    }

    // ---- configuration ----------------------------------------------

    /// Deep-merge a partial configuration update
    pub fn configure(&self, update: ConfigUpdate) {
        let mut inner = self.inner.borrow_mut();
        let root = inner.root.clone();
        inner.config.apply(update, &root);
    }

    /// Parse and apply a camelCase JSON configuration object
    pub fn configure_json(&self, json: &str) -> Result<()> {
        let update: ConfigUpdate = serde_json::from_str(json)?;
        self.configure(update);
        Ok(())
    }

    // ---- define surface ---------------------------------------------

    /// Install a module definition
    ///
    /// Anonymous shapes recover their id from the fetch currently being
    /// evaluated (as reported by the fetcher) or the fetch currently
    /// being issued; with neither, the call is dropped without signal.
    pub fn define(&self, call: DefineCall) {
        let (id, deps, producer) = call.normalize();

        let (deps, declared) = match deps {
            Some(deps) => (deps, true),
            None => match &producer {
                Producer::Factory(factory) => {
                    let sniffed = match factory.source() {
                        Some(source) => {
                            let extractor = Rc::clone(&self.inner.borrow().extractor);
                            extractor.extract(source)
                        }
                        None => Vec::new(),
                    };
                    (sniffed, false)
                }
                Producer::Value(_) => (Vec::new(), true),
            },
        };

        let Some(id) = id.or_else(|| self.recover_define_id()) else {
            trace!("anonymous define with no fetch in flight; dropped");
            return;
        };

        let module = self.get_or_create(&id);
        {
            let mut m = module.borrow_mut();
            m.deps = deps;
            m.declared = declared;
            m.producer = Some(producer);
            m.advance(ModuleState::Fetched);
        }
        debug!(id = %id, "module defined");
    }

    /// Define a module whose exports are a plain value
    pub fn define_value(&self, id: impl Into<String>, value: Value) {
        self.define(DefineCall::Named(id.into(), Producer::Value(value)));
    }

    /// Define a module with a declared dependency list and a factory
    pub fn define_module(&self, id: impl Into<String>, deps: &[&str], factory: Factory) {
        let deps = deps.iter().map(|d| d.to_string()).collect();
        self.define(DefineCall::Full(id.into(), deps, Producer::Factory(factory)));
    }

    // ---- require surface --------------------------------------------

    /// Resolve, load, and execute a single module synchronously
    ///
    /// Fails with [`LoaderError::NotLoaded`] if the target has not
    /// reached the loaded state; a defined but not-yet-walked target is
    /// walked first, so dependency-free definitions are requirable
    /// immediately.
    pub fn require(&self, id: &str) -> Result<Value> {
        self.require_from(id, "")
    }

    /// Load a dependency list and invoke `callback` once all of it is
    /// loaded
    ///
    /// Creates a synthetic aggregate module whose completion hook
    /// requires each listed dependency by canonical id before invoking
    /// the callback with positional exports. `force` disables the cycle
    /// short-circuit for this aggregate's own walk. Returns the
    /// aggregate's canonical id.
    pub fn require_list(&self, deps: &[&str], callback: Option<Factory>, force: bool) -> String {
        self.require_list_from(deps, callback, force, "")
    }

    /// A require handle bound to the loader's root context
    pub fn root_require(&self) -> Require {
        Require {
            loader: self.clone(),
            base: String::new(),
        }
    }

    /// Resolve a raw id against a context id into its canonical form
    pub fn resolve(&self, id: &str, base: &str) -> String {
        let inner = self.inner.borrow();
        resolver::resolve_id(&inner.config, id, base)
    }

    /// The fetch location for an id (without the source extension)
    pub fn to_uri(&self, id: &str) -> String {
        let inner = self.inner.borrow();
        let canonical = resolver::resolve_id(&inner.config, id, "");
        resolver::id_to_uri(&inner.config, &canonical)
    }

    /// Lifecycle state of a module, if one exists for the id
    pub fn state_of(&self, id: &str) -> Option<ModuleState> {
        let canonical = self.resolve(id, "");
        self.module(&canonical).map(|m| m.borrow().state)
    }

    // ---- orchestration ----------------------------------------------

    fn get_or_create(&self, id: &str) -> Rc<RefCell<Module>> {
        let mut inner = self.inner.borrow_mut();
        let Inner {
            config, registry, ..
        } = &mut *inner;
        registry.get_or_create(id, || resolver::id_to_uri(config, id))
    }

    fn module(&self, id: &str) -> Option<Rc<RefCell<Module>>> {
        self.inner.borrow().registry.get(id)
    }

    fn recover_define_id(&self) -> Option<String> {
        let fetcher = Rc::clone(&self.inner.borrow().fetcher);
        let interactive = fetcher.interactive();
        interactive.or_else(|| self.inner.borrow().adding.clone())
    }

    /// Walk a module's dependencies, counting each satisfied one and
    /// listening on the rest
    ///
    /// Reserved pseudo-dependencies resolve immediately and never touch
    /// the registry. A dependency already loaded — or already loading,
    /// when this walk is not forced — counts immediately; the latter is
    /// the cycle short-circuit that trades a possibly-incomplete export
    /// snapshot for guaranteed termination.
    fn load_module(&self, id: &str) {
        let module = self.get_or_create(id);
        let state = module.borrow().state;
        if state == ModuleState::Fetching {
            return;
        }
        if state == ModuleState::Unfetched {
            self.fetch_module(id);
            return;
        }
        if state >= ModuleState::Loading {
            return;
        }

        let (deps, force) = {
            let mut m = module.borrow_mut();
            m.advance(ModuleState::Loading);
            m.remain = m.deps.len();
            (m.deps.clone(), m.force)
        };
        trace!(id, pending = deps.len(), "loading module");

        for dep in &deps {
            if is_reserved(dep) {
                module.borrow_mut().remain -= 1;
                continue;
            }
            if is_plugin(dep) {
                self.load_plugin(dep, id);
                continue;
            }

            let canonical = self.resolve(dep, id);
            let dep_module = self.get_or_create(&canonical);
            let dep_state = dep_module.borrow().state;
            if dep_state >= ModuleState::Loaded
                || (dep_state == ModuleState::Loading && !force)
            {
                module.borrow_mut().remain -= 1;
                continue;
            }
            dep_module.borrow_mut().listeners.push(id.to_string());
            if dep_state < ModuleState::Loading {
                self.load_module(&canonical);
            }
        }

        if module.borrow().remain == 0 {
            self.on_module_loaded(id);
        }
    }

    fn fetch_module(&self, id: &str) {
        let module = self.get_or_create(id);
        let uri = {
            let mut m = module.borrow_mut();
            m.advance(ModuleState::Fetching);
            format!("{}{}", m.uri, SOURCE_EXT)
        };
        debug!(id, uri, "fetching module");

        let fetcher = {
            let mut inner = self.inner.borrow_mut();
            inner.adding = Some(id.to_string());
            Rc::clone(&inner.fetcher)
        };
        fetcher.fetch(
            FetchRequest {
                uri,
                id: id.to_string(),
            },
            FetchTicket::new(self.clone(), id.to_string()),
        );
        self.inner.borrow_mut().adding = None;
    }

    fn load_plugin(&self, dep: &str, owner: &str) {
        let (plugin, resource) = dep.split_once('!').unwrap_or((dep, ""));
        trace!(owner, plugin, resource, "delegating plugin dependency");
        let plugins = Rc::clone(&self.inner.borrow().plugins);
        plugins.load(
            PluginRequest {
                plugin: plugin.to_string(),
                resource: resource.to_string(),
            },
            PluginTicket::new(self.clone(), owner.to_string()),
        );
    }

    /// Fetch-completion entry, driven by [`FetchTicket::done`]
    ///
    /// Proceeds only if evaluating the fetched source installed a
    /// definition; otherwise the module stays fetching forever.
    pub(crate) fn finish_fetch(&self, id: &str) {
        let Some(module) = self.module(id) else {
            return;
        };
        let state = module.borrow().state;
        if state >= ModuleState::Fetched {
            self.load_module(id);
        } else {
            trace!(id, "fetch completed without a definition; module stalls");
        }
    }

    /// One dependency of `owner` became loaded (listener fan-out and
    /// plugin tickets land here)
    pub(crate) fn dependency_loaded(&self, owner: &str) {
        let Some(module) = self.module(owner) else {
            return;
        };
        let satisfied = {
            let mut m = module.borrow_mut();
            m.remain = m.remain.saturating_sub(1);
            m.remain == 0 && m.state == ModuleState::Loading
        };
        if satisfied {
            self.on_module_loaded(owner);
        }
    }

    fn on_module_loaded(&self, id: &str) {
        let Some(module) = self.module(id) else {
            return;
        };
        {
            let mut m = module.borrow_mut();
            if m.state >= ModuleState::Loaded {
                return;
            }
            m.advance(ModuleState::Loaded);
        }
        trace!(id, "module loaded");

        // Listeners fire in registration order; firing one can append
        // more, so drain by index against the live list.
        let mut index = 0;
        loop {
            let listener = module.borrow().listeners.get(index).cloned();
            let Some(owner) = listener else { break };
            index += 1;
            self.dependency_loaded(&owner);
        }

        let hook = module.borrow_mut().on_loaded.take();
        if let Some(hook) = hook {
            hook(self);
        }
    }

    // ---- execution --------------------------------------------------

    fn require_from(&self, raw: &str, base: &str) -> Result<Value> {
        let id = self.resolve(raw, base);
        let module = self.get_or_create(&id);
        let state = module.borrow().state;
        if state == ModuleState::Fetched {
            // Defined but never walked; walk synchronously so that
            // dependency-free definitions are requirable immediately.
            self.load_module(&id);
        }
        self.execute(&id)
    }

    /// Execute a module's producer exactly once and return its exports
    fn execute(&self, id: &str) -> Result<Value> {
        let Some(module) = self.module(id) else {
            return Err(LoaderError::not_loaded(id));
        };
        {
            let m = module.borrow();
            if m.state >= ModuleState::Executed || m.executing {
                // Settled, or re-entered by its own producer: hand out
                // the current (possibly partial) snapshot.
                return Ok(m.exports.borrow().clone());
            }
            if m.state < ModuleState::Loaded {
                return Err(LoaderError::not_loaded(id));
            }
        }

        module.borrow_mut().executing = true;
        let args = match self.materialize_args(id, &module) {
            Ok(args) => args,
            Err(err) => {
                module.borrow_mut().executing = false;
                return Err(err);
            }
        };

        let producer = module.borrow_mut().producer.take();
        let exports = Rc::clone(&module.borrow().exports);
        match producer {
            Some(Producer::Value(value)) => {
                *exports.borrow_mut() = value;
            }
            Some(Producer::Factory(mut factory)) => {
                // A returned value replaces the exports container;
                // otherwise whatever the factory wrote into it stands.
                if let Some(value) = factory.invoke(args) {
                    *exports.borrow_mut() = value;
                }
            }
            None => {}
        }

        {
            let mut m = module.borrow_mut();
            m.advance(ModuleState::Executed);
            m.executing = false;
        }
        trace!(id, "module executed");
        let value = exports.borrow().clone();
        Ok(value)
    }

    /// Build the factory argument list
    ///
    /// Declared convention: positional up to the factory's arity, with
    /// reserved names substituted; extra declared dependencies were
    /// loaded for side effects but are neither passed nor executed.
    /// Sniffed convention: always (require, exports, module) — sniff
    /// order is unreliable for positional passing.
    fn materialize_args(&self, id: &str, module: &Rc<RefCell<Module>>) -> Result<Vec<Arg>> {
        let (declared, deps, arity, exports, info) = {
            let m = module.borrow();
            (
                m.declared,
                m.deps.clone(),
                m.producer.as_ref().map(Producer::arity).unwrap_or(0),
                Rc::clone(&m.exports),
                m.info(),
            )
        };

        let bound_require = || Require {
            loader: self.clone(),
            base: id.to_string(),
        };

        if !declared {
            return Ok(vec![
                Arg::Require(bound_require()),
                Arg::Exports(exports),
                Arg::Module(info),
            ]);
        }

        let count = arity.min(deps.len());
        let mut args = Vec::with_capacity(count);
        for dep in deps.iter().take(count) {
            let arg = match dep.as_str() {
                "require" => Arg::Require(bound_require()),
                "exports" => Arg::Exports(Rc::clone(&exports)),
                "module" => Arg::Module(info.clone()),
                other => Arg::Dep(self.require_from(other, id)?),
            };
            args.push(arg);
        }
        Ok(args)
    }

    // ---- aggregates -------------------------------------------------

    fn require_list_from(
        &self,
        deps: &[&str],
        callback: Option<Factory>,
        force: bool,
        base: &str,
    ) -> String {
        let raw = {
            let mut inner = self.inner.borrow_mut();
            let uid = inner.next_uid;
            inner.next_uid += 1;
            format!("./async_{uid}")
        };
        let id = self.resolve(&raw, base);

        let module = self.get_or_create(&id);
        {
            let mut m = module.borrow_mut();
            m.deps = deps.iter().map(|d| d.to_string()).collect();
            m.declared = true;
            m.producer = Some(callback.map(Producer::Factory).unwrap_or_else(Producer::noop));
            m.force = force;
            m.advance(ModuleState::Fetched);
            let hook_id = id.clone();
            m.on_loaded = Some(Box::new(move |loader: &Loader| {
                loader.run_aggregate(&hook_id);
            }));
        }
        debug!(id = %id, deps = deps.len(), force, "aggregate require");

        self.load_module(&id);
        id
    }

    /// Aggregate completion: force full resolution of every listed
    /// dependency, then execute the callback
    fn run_aggregate(&self, id: &str) {
        let deps = match self.module(id) {
            Some(module) => module.borrow().deps.clone(),
            None => return,
        };
        for dep in &deps {
            if is_plugin(dep) || is_reserved(dep) {
                continue;
            }
            if let Err(err) = self.require_from(dep, id) {
                warn!(
                    aggregate = id,
                    dep = %dep,
                    %err,
                    "aggregate dependency not executable; skipping callback"
                );
                return;
            }
        }
        if let Err(err) = self.execute(id) {
            warn!(aggregate = id, %err, "aggregate callback failed");
        }
    }
}

/// A require function bound to a module's context
///
/// Relative ids resolve against the owning module's id; this is the
/// handle substituted for the reserved `require` dependency.
#[derive(Clone)]
pub struct Require {
    loader: Loader,
    base: String,
}

impl Require {
    /// The context ids resolve against
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Single-id form: resolve, load, and execute synchronously
    pub fn call(&self, id: &str) -> Result<Value> {
        self.loader.require_from(id, &self.base)
    }

    /// List form: aggregate load with an optional callback
    pub fn list(&self, deps: &[&str], callback: Option<Factory>, force: bool) -> String {
        self.loader.require_list_from(deps, callback, force, &self.base)
    }

    /// The fetch location an id maps to (without the source extension)
    pub fn to_url(&self, id: &str) -> String {
        let inner = self.loader.inner.borrow();
        let canonical = resolver::resolve_id(&inner.config, id, &self.base);
        resolver::id_to_uri(&inner.config, &canonical)
    }
}

// ---- process-wide registration -------------------------------------

thread_local! {
    static GLOBAL: std::cell::OnceCell<Loader> = const { std::cell::OnceCell::new() };
}

/// Install a loader as this thread's global entry point
///
/// Non-clobbering: succeeds at most once per thread; returns whether
/// this call performed the installation.
pub fn install(loader: &Loader) -> bool {
    GLOBAL.with(|cell| cell.set(loader.clone()).is_ok())
}

/// The installed loader, if any
pub fn global() -> Option<Loader> {
    GLOBAL.with(|cell| cell.get().cloned())
}

/// Single-id require through the installed loader
pub fn require(id: &str) -> Result<Value> {
    global().ok_or(LoaderError::NotInstalled)?.require(id)
}

/// Define through the installed loader
///
/// Dropped without signal when no loader is installed, consistent with
/// the silent-drop contract for unattributable defines.
pub fn define(call: DefineCall) {
    match global() {
        Some(loader) => loader.define(call),
        None => trace!("define dropped: no loader installed"),
    }
}
