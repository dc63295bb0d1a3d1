// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Asynchronous AMD-style module loader
//!
//! Implements define/require semantics over host-provided transport:
//! textual module ids resolve through configurable package/path/map
//! rules, every module runs a monotone load lifecycle, and dependency
//! graphs — cycles included — load without deadlock, executing each
//! producer exactly once in dependency order and memoizing its result.
//!
//! ## Pieces
//! - [`Config`] / [`ConfigUpdate`] — base location and resolution rules
//! - [`resolver`] — pure id resolution and URI mapping
//! - [`Loader`] — registry, lifecycle orchestration, and the
//!   define/require surface
//! - [`Fetcher`] / [`PluginLoader`] — collaborator seams for transport
//!   and plugin resolution
//!
//! ## Example
//! ```
//! use almandine::{Factory, Loader};
//! use serde_json::json;
//!
//! let loader = Loader::builder().build();
//! loader.define_value("greeting", json!("hello"));
//! loader.define_module(
//!     "app",
//!     &["greeting"],
//!     Factory::new(1, |args| {
//!         let greeting = args[0].value().cloned().unwrap_or_default();
//!         Some(json!({ "banner": greeting }))
//!     }),
//! );
//! let exports = loader.require("app").unwrap();
//! assert_eq!(exports["banner"], json!("hello"));
//! ```

mod cache;
pub mod config;
mod error;
pub mod fetch;
mod loader;
pub mod module;
pub mod resolver;
pub mod sniff;

pub use config::{Config, ConfigUpdate, Package, PackageSpec};
pub use error::{LoaderError, Result};
pub use fetch::{
    FetchRequest, FetchTicket, Fetcher, InertFetcher, NullPluginLoader, PluginLoader,
    PluginRequest, PluginTicket,
};
pub use loader::{define, global, install, require, DefineCall, Loader, LoaderBuilder, Require};
pub use module::{Arg, Factory, ModuleInfo, ModuleState, Producer, Value};
pub use sniff::{DependencyExtractor, RequireCallExtractor};
