// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Collaborator seams: source fetching and plugin resolution
//!
//! The loader performs no transport itself. A [`Fetcher`] makes module
//! source available asynchronously; evaluating that source is expected
//! to self-register through a define call, after which the fetcher
//! completes its ticket. There is no failure channel: a fetch that
//! never completes is indistinguishable from a pending one, and its
//! dependents stall forever.

use tracing::trace;

use crate::loader::Loader;

/// A request to retrieve module source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Fetch location, with the source extension appended
    pub uri: String,
    /// Canonical id of the module being fetched
    pub id: String,
}

/// Single-use completion callback for a fetch
///
/// Consuming [`done`](FetchTicket::done) reports completion; success is
/// implicit and carries no payload. Dropping the ticket without calling
/// it leaves the module fetching forever.
pub struct FetchTicket {
    loader: Loader,
    id: String,
}

impl FetchTicket {
    pub(crate) fn new(loader: Loader, id: String) -> Self {
        Self { loader, id }
    }

    /// The id of the module this ticket completes
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Report fetch completion
    pub fn done(self) {
        self.loader.finish_fetch(&self.id);
    }
}

/// Retrieves module source asynchronously
pub trait Fetcher {
    /// Make the requested source available and, once it has been
    /// evaluated, complete the ticket.
    fn fetch(&self, request: FetchRequest, ticket: FetchTicket);

    /// The id of the fetch whose source is currently being evaluated,
    /// if the host can tell. Used to recover ids for anonymous defines.
    fn interactive(&self) -> Option<String> {
        None
    }
}

/// A fetcher that never completes
///
/// For hosts that pre-declare every module through explicit defines; a
/// load reaching an undefined module stalls rather than erroring.
#[derive(Debug, Default, Clone, Copy)]
pub struct InertFetcher;

impl Fetcher for InertFetcher {
    fn fetch(&self, request: FetchRequest, _ticket: FetchTicket) {
        trace!(id = %request.id, uri = %request.uri, "inert fetcher dropping request");
    }
}

/// A request delegated to a plugin (`plugin!resource` dependency)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginRequest {
    /// Plugin id (the part before `!`)
    pub plugin: String,
    /// Resource id (the part after `!`)
    pub resource: String,
}

/// Single-use resolution callback for a plugin load
///
/// Must be completed exactly once; the type consumes itself to make a
/// second completion unrepresentable.
pub struct PluginTicket {
    loader: Loader,
    owner: String,
}

impl PluginTicket {
    pub(crate) fn new(loader: Loader, owner: String) -> Self {
        Self { loader, owner }
    }

    /// A loader handle, for plugins that install a definition for the
    /// resource before completing
    pub fn loader(&self) -> &Loader {
        &self.loader
    }

    /// Report the plugin dependency as satisfied
    pub fn done(self) {
        self.loader.dependency_loaded(&self.owner);
    }
}

/// Resolves plugin-delimited dependencies
///
/// Opaque to the core: the loader hands over the split request and a
/// ticket, and counts the dependency satisfied when the ticket
/// completes. A plugin that wants its resource to be requirable under
/// the full `plugin!resource` id should install a definition for that
/// id before completing.
pub trait PluginLoader {
    fn load(&self, request: PluginRequest, ticket: PluginTicket);
}

/// A plugin loader that never resolves anything
///
/// The default: plugin dependencies stall their dependents, matching
/// the no-failure-channel contract.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPluginLoader;

impl PluginLoader for NullPluginLoader {
    fn load(&self, request: PluginRequest, _ticket: PluginTicket) {
        trace!(
            plugin = %request.plugin,
            resource = %request.resource,
            "no plugin loader configured; dependency will stall"
        );
    }
}
