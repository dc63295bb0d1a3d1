// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Error types for the module loader

use thiserror::Error;

/// Result type for loader operations
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Errors that can occur in the loader
///
/// Asynchronous failure is never surfaced here: a fetch that never
/// completes simply leaves its dependents pending. Only synchronous
/// misuse and malformed input raise errors.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// Exports were requested before the module reached the loaded state
    #[error("module '{0}' requested before it finished loading")]
    NotLoaded(String),

    /// A free-function entry point was used with no loader installed
    #[error("no loader installed in this thread")]
    NotInstalled,

    /// Configuration input could not be parsed
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl LoaderError {
    /// Create a not-loaded error
    pub fn not_loaded(id: impl Into<String>) -> Self {
        Self::NotLoaded(id.into())
    }
}
