// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Static dependency extraction
//!
//! When a definition carries no declared dependency list, dependencies
//! are sniffed from the producer's textual source: a lexical scan for
//! `require("literal")` call sites after stripping comments. This is
//! best-effort, not semantic parsing — it can both under- and
//! over-collect — and the load orchestrator consumes only the extracted
//! list, never the raw text.

use once_cell::sync::Lazy;
use regex::Regex;

/// Extracts dependency ids from producer source text
pub trait DependencyExtractor {
    /// Scan source text for dependency ids, in call-site order
    fn extract(&self, source: &str) -> Vec<String>;
}

static BLOCK_COMMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/\*(?s:.*?)\*/").expect("block comment pattern"));

// The `[^:]` guard keeps `http://…` inside string literals intact.
static LINE_COMMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)(^|[^:])//.*$").expect("line comment pattern"));

static REQUIRE_CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:^|[^.\w])require\s*\(\s*["']([^"'\s]+)["']\s*\)"#)
        .expect("require call pattern")
});

/// The default extractor: comment-stripping regex scan for
/// single-literal `require(...)` calls
///
/// Member accesses such as `obj.require("x")` are ignored, as are calls
/// whose argument is not a plain string literal.
#[derive(Debug, Default, Clone, Copy)]
pub struct RequireCallExtractor;

impl DependencyExtractor for RequireCallExtractor {
    fn extract(&self, source: &str) -> Vec<String> {
        let stripped = BLOCK_COMMENT.replace_all(source, "");
        let stripped = LINE_COMMENT.replace_all(&stripped, "$1");

        REQUIRE_CALL
            .captures_iter(&stripped)
            .map(|caps| caps[1].to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(source: &str) -> Vec<String> {
        RequireCallExtractor.extract(source)
    }

    #[test]
    fn test_extracts_in_call_order() {
        let source = r#"
            var a = require('dep/a');
            var b = require("dep/b");
        "#;
        assert_eq!(extract(source), vec!["dep/a", "dep/b"]);
    }

    #[test]
    fn test_ignores_commented_calls() {
        let source = r#"
            // var a = require('line');
            /* var b = require('block'); */
            var c = require('kept');
        "#;
        assert_eq!(extract(source), vec!["kept"]);
    }

    #[test]
    fn test_spares_urls_in_line_comment_guard() {
        let source = r#"
            var u = "http://example.com"; var a = require('dep');
        "#;
        assert_eq!(extract(source), vec!["dep"]);
    }

    #[test]
    fn test_ignores_member_access_require() {
        let source = "ctx.require('skipped'); require('taken');";
        assert_eq!(extract(source), vec!["taken"]);
    }

    #[test]
    fn test_ignores_non_literal_arguments() {
        let source = "require(name); require('lit');";
        assert_eq!(extract(source), vec!["lit"]);
    }

    #[test]
    fn test_empty_source() {
        assert!(extract("").is_empty());
    }
}
