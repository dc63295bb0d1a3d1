// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Loader configuration
//!
//! Holds the base location and the path/map/package rules, and derives
//! the specificity-sorted lookup lists the resolver consumes. Partial
//! updates deep-merge: nested rule maps merge per key, scalar fields
//! overwrite.

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::resolver::join_relative;

/// Default package entry point
pub const DEFAULT_MAIN: &str = "main";

/// Source-file extension appended at fetch time
pub const SOURCE_EXT: &str = ".js";

/// A package descriptor
///
/// Maps a bare package name to its location and entry point, so that
/// requiring `name` resolves to `<location>/<main>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    /// Package name (the id that triggers substitution)
    pub name: String,
    /// Location prefix; defaults to the name
    pub location: String,
    /// Entry-point module within the package
    pub main: String,
}

/// Package configuration input: bare `"name/location"` shorthand or a
/// full record
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PackageSpec {
    /// `"name/location"` — the name is the first path segment
    Shorthand(String),
    /// Full descriptor; location defaults to the name, main to `"main"`
    Full {
        name: String,
        #[serde(default)]
        location: Option<String>,
        #[serde(default)]
        main: Option<String>,
    },
}

impl PackageSpec {
    /// Normalize into a full descriptor, stripping any trailing source
    /// extension from the entry point.
    fn normalize(self) -> Package {
        let (name, location, main) = match self {
            PackageSpec::Shorthand(spec) => {
                let name = spec.split('/').next().unwrap_or(&spec).to_string();
                (name, Some(spec), None)
            }
            PackageSpec::Full {
                name,
                location,
                main,
            } => (name, location, main),
        };
        let location = location.unwrap_or_else(|| name.clone());
        let main = main.unwrap_or_else(|| DEFAULT_MAIN.to_string());
        let main = main
            .strip_suffix(SOURCE_EXT)
            .map(str::to_string)
            .unwrap_or(main);
        Package {
            name,
            location,
            main,
        }
    }
}

/// A partial configuration update
///
/// Deserializes from the camelCase form hosts pass to `require.config`.
/// Unknown keys land in the opaque `extra` bucket and are not
/// interpreted by the core.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConfigUpdate {
    /// New base location; relative forms resolve against the loader's
    /// initial context
    pub base_url: Option<String>,
    /// Path rules to merge (id prefix -> location prefix)
    pub paths: BTreeMap<String, String>,
    /// Map rules to merge (scope prefix -> (id prefix -> substitution))
    pub map: BTreeMap<String, BTreeMap<String, String>>,
    /// Packages to add or replace
    pub packages: Vec<PackageSpec>,
    /// Opaque passthrough values
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Loader configuration store
#[derive(Debug, Clone, Default)]
pub struct Config {
    base_url: String,
    paths: BTreeMap<String, String>,
    map: BTreeMap<String, BTreeMap<String, String>>,
    packages: Vec<Package>,
    extra: BTreeMap<String, Value>,
    // Derived lookup lists, most-specific prefix first, "*" last.
    path_list: Vec<(String, String)>,
    map_list: Vec<(String, Vec<(String, String)>)>,
}

impl Config {
    /// Create a config rooted at the given base location
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// The current base location
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Configured packages
    pub fn packages(&self) -> &[Package] {
        &self.packages
    }

    /// Path rules sorted most-specific first, wildcard last
    pub fn path_list(&self) -> &[(String, String)] {
        &self.path_list
    }

    /// Map scopes sorted most-specific first, wildcard last; entries
    /// within each scope sorted the same way
    pub fn map_list(&self) -> &[(String, Vec<(String, String)>)] {
        &self.map_list
    }

    /// An opaque passthrough value by key
    pub fn extra(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    /// Deep-merge a partial update
    ///
    /// `root` is the loader's initial working context, used to resolve a
    /// relative `baseUrl`. Rule maps merge per key; packages replace
    /// same-name entries; the derived lookup lists are rebuilt.
    pub fn apply(&mut self, update: ConfigUpdate, root: &str) {
        if let Some(base) = update.base_url {
            self.base_url = if base.starts_with('.') {
                join_relative(&base, root)
            } else {
                base
            };
        }

        self.paths.extend(update.paths);
        for (scope, entries) in update.map {
            self.map.entry(scope).or_default().extend(entries);
        }

        for spec in update.packages {
            let pkg = spec.normalize();
            match self.packages.iter_mut().find(|p| p.name == pkg.name) {
                Some(existing) => *existing = pkg,
                None => self.packages.push(pkg),
            }
        }

        for (key, value) in update.extra {
            match self.extra.entry(key) {
                std::collections::btree_map::Entry::Occupied(mut slot) => {
                    match (slot.get_mut(), value) {
                        (Value::Object(target), Value::Object(source)) => {
                            merge_objects(target, source);
                        }
                        (slot, value) => *slot = value,
                    }
                }
                std::collections::btree_map::Entry::Vacant(slot) => {
                    slot.insert(value);
                }
            }
        }

        self.rebuild_lists();
    }

    fn rebuild_lists(&mut self) {
        self.path_list = sorted_entries(&self.paths);
        self.map_list = self
            .map
            .iter()
            .map(|(scope, entries)| (scope.clone(), sorted_entries(entries)))
            .collect();
        sort_by_specificity(&mut self.map_list);
    }
}

/// Recursive merge of JSON objects: objects merge per key, everything
/// else overwrites.
fn merge_objects(
    target: &mut serde_json::Map<String, Value>,
    source: serde_json::Map<String, Value>,
) {
    for (key, value) in source {
        match target.entry(key) {
            serde_json::map::Entry::Occupied(mut slot) => match (slot.get_mut(), value) {
                (Value::Object(t), Value::Object(s)) => merge_objects(t, s),
                (slot, value) => *slot = value,
            },
            serde_json::map::Entry::Vacant(slot) => {
                slot.insert(value);
            }
        }
    }
}

/// Flatten a rule map into a lookup list sorted longest prefix first,
/// with the `*` wildcard always last regardless of length.
fn sorted_entries(map: &BTreeMap<String, String>) -> Vec<(String, String)> {
    let mut list: Vec<(String, String)> = map
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    sort_by_specificity(&mut list);
    list
}

fn sort_by_specificity<T>(list: &mut [(String, T)]) {
    list.sort_by(|(a, _), (b, _)| match (a.as_str(), b.as_str()) {
        ("*", "*") => std::cmp::Ordering::Equal,
        ("*", _) => std::cmp::Ordering::Greater,
        (_, "*") => std::cmp::Ordering::Less,
        (a, b) => b.len().cmp(&a.len()).then_with(|| a.cmp(b)),
    });
}
