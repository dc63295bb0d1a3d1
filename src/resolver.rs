// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Identifier resolution and URI mapping
//!
//! Pure functions over the config store: package substitution, scoped
//! map substitution, relative-path resolution, and longest-prefix path
//! mapping. Deterministic for a fixed config.

use url::Url;

use crate::config::Config;

/// Pseudo-dependencies injected by the loader rather than resolved
/// externally
pub const RESERVED_DEPS: [&str; 3] = ["require", "exports", "module"];

/// Check whether an id names a reserved pseudo-dependency
pub fn is_reserved(id: &str) -> bool {
    RESERVED_DEPS.contains(&id)
}

/// Check whether an id names a plugin-delimited dependency
/// (`plugin!resource`)
pub fn is_plugin(id: &str) -> bool {
    id.contains('!')
}

/// Resolve a raw module id against a context id into its canonical form
///
/// Steps, in order: package substitution, scoped map substitution,
/// relative resolution against the context's directory, and package
/// substitution again (relative resolution may yield a bare package
/// name).
pub fn resolve_id(config: &Config, id: &str, base: &str) -> String {
    let id = packaged_id(config, id);
    let id = mapped_id(config, &id, base);

    let id = if id.starts_with('.') {
        join_relative(&id, dir_name(base))
    } else {
        id
    };

    packaged_id(config, &id)
}

/// Map a canonical id to its fetch location
///
/// Applies the single most specific path rule (the `*` rule only when
/// nothing more specific matched), passes root-rooted paths and full
/// URLs through unchanged, and otherwise resolves against the base
/// location and roots the result. The source extension is appended only
/// at fetch time, never here.
pub fn id_to_uri(config: &Config, id: &str) -> String {
    let mut target = id.to_string();
    for (prefix, subst) in config.path_list() {
        if prefix == "*" {
            target = format!("{}/{}", subst, id);
            break;
        }
        if has_prefix(id, prefix) {
            target = format!("{}{}", subst, &id[prefix.len()..]);
            break;
        }
    }

    if target.starts_with('/') || Url::parse(&target).is_ok() {
        return target;
    }
    format!("/{}", join_relative(&target, config.base_url()))
}

/// Apply package substitution: a bare package name expands to
/// `<location>/<main>`.
fn packaged_id(config: &Config, id: &str) -> String {
    for pkg in config.packages() {
        if pkg.name == id {
            return format!("{}/{}", pkg.location, pkg.main);
        }
    }
    id.to_string()
}

/// Apply scoped map substitution
///
/// The most specific scope whose prefix matches the context (or the `*`
/// scope) is selected; only that scope's entries are consulted, most
/// specific first.
fn mapped_id(config: &Config, id: &str, base: &str) -> String {
    for (scope, entries) in config.map_list() {
        if scope != "*" && !has_prefix(base, scope) {
            continue;
        }
        for (prefix, subst) in entries {
            if has_prefix(id, prefix) {
                return format!("{}{}", subst, &id[prefix.len()..]);
            }
        }
        break;
    }
    id.to_string()
}

/// The directory portion of an id or uri (everything before the last
/// segment), or empty when there is none.
pub fn dir_name(uri: &str) -> &str {
    match uri.rfind('/') {
        Some(idx) => &uri[..idx],
        None => "",
    }
}

/// Resolve a relative reference against a base directory by
/// segment-stack resolution: non-empty, non-`.` segments push, `..`
/// pops.
pub fn join_relative(uri: &str, base: &str) -> String {
    let mut stack: Vec<&str> = Vec::new();
    for segment in base.split('/').chain(uri.split('/')) {
        match segment {
            "" | "." => {}
            ".." => {
                stack.pop();
            }
            other => stack.push(other),
        }
    }
    stack.join("/")
}

/// Segment-aware prefix test: `lib` matches `lib` and `lib/x`, never
/// `library`.
pub fn has_prefix(id: &str, prefix: &str) -> bool {
    id == prefix || (id.starts_with(prefix) && id[prefix.len()..].starts_with('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigUpdate;

    fn config(json: &str) -> Config {
        let mut config = Config::new("");
        config.apply(serde_json::from_str::<ConfigUpdate>(json).unwrap(), "");
        config
    }

    #[test]
    fn test_has_prefix_is_segment_aware() {
        assert!(has_prefix("lib/sub/x", "lib/sub"));
        assert!(has_prefix("lib", "lib"));
        assert!(!has_prefix("library/x", "lib"));
        assert!(!has_prefix("lib/other", "lib/sub"));
    }

    #[test]
    fn test_dir_name() {
        assert_eq!(dir_name("a/b/c"), "a/b");
        assert_eq!(dir_name("top"), "");
        assert_eq!(dir_name(""), "");
    }

    #[test]
    fn test_relative_resolution() {
        let config = Config::new("");
        assert_eq!(resolve_id(&config, "../d", "a/b/c"), "a/d");
        assert_eq!(resolve_id(&config, "./e", "a/b/c"), "a/b/e");
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let config = config(r#"{ "map": { "*": { "old": "new" } } }"#);
        let first = resolve_id(&config, "old/mod", "app/main");
        let second = resolve_id(&config, "old/mod", "app/main");
        assert_eq!(first, second);
        assert_eq!(first, "new/mod");
    }

    #[test]
    fn test_package_substitution() {
        let config = config(r#"{ "packages": ["foo/src"] }"#);
        assert_eq!(resolve_id(&config, "foo", "app/main"), "foo/src/main");
        // Subpath ids are not package-substituted.
        assert_eq!(resolve_id(&config, "foo/util", "app/main"), "foo/util");
    }

    #[test]
    fn test_relative_resolution_reapplies_packages() {
        let config = config(r#"{ "packages": ["foo/src"] }"#);
        // "../foo" from "app/main" collapses to the bare package name.
        assert_eq!(resolve_id(&config, "../foo", "app/main"), "foo/src/main");
    }

    #[test]
    fn test_scoped_map_most_specific_scope_wins() {
        let config = config(
            r#"{ "map": {
                "*": { "dep": "dep/v1" },
                "app": { "dep": "dep/v2" },
                "app/admin": { "dep": "dep/v3" }
            } }"#,
        );
        assert_eq!(resolve_id(&config, "dep", "app/admin/panel"), "dep/v3");
        assert_eq!(resolve_id(&config, "dep", "app/main"), "dep/v2");
        assert_eq!(resolve_id(&config, "dep", "other/main"), "dep/v1");
    }

    #[test]
    fn test_map_substitutes_most_specific_dependency_prefix() {
        let config = config(
            r#"{ "map": { "*": { "lib": "lib/v1", "lib/sub": "lib/v2" } } }"#,
        );
        assert_eq!(resolve_id(&config, "lib/sub/x", "app"), "lib/v2/x");
        assert_eq!(resolve_id(&config, "lib/other", "app"), "lib/v1/other");
    }

    #[test]
    fn test_path_rules_longest_prefix_wins() {
        let config = config(
            r#"{ "paths": { "*": "/cdn", "lib/sub": "/v2", "lib": "/v1" } }"#,
        );
        assert_eq!(id_to_uri(&config, "lib/sub/x"), "/v2/x");
        assert_eq!(id_to_uri(&config, "lib/other"), "/v1/other");
        assert_eq!(id_to_uri(&config, "unrelated"), "/cdn/unrelated");
    }

    #[test]
    fn test_uri_absolute_passthrough() {
        let config = Config::new("base");
        assert_eq!(id_to_uri(&config, "/already/rooted"), "/already/rooted");
        assert_eq!(
            id_to_uri(&config, "https://cdn.example/mod"),
            "https://cdn.example/mod"
        );
    }

    #[test]
    fn test_uri_resolves_against_base() {
        let config = Config::new("assets/js");
        assert_eq!(id_to_uri(&config, "app/main"), "/assets/js/app/main");
    }

    #[test]
    fn test_reserved_names() {
        assert!(is_reserved("require"));
        assert!(is_reserved("exports"));
        assert!(is_reserved("module"));
        assert!(!is_reserved("modules"));
    }
}
