// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Shader branch descriptions.
//!
//! A branch is a named permutation of one shader source. It is written as
//! `"Entry[:Name] [MACRO[=VALUE]]..."`: the text before the first space selects
//! the entry point function prefix (and, after an optional `:`, the branch
//! name), the rest is a list of preprocessor macros.

use super::enums::Stage;

/// Marker that declares a branch inside shader source, one per line.
pub const BRANCH_COMMENT_MARKER: &str = "//@";

/// Prefix prepended to every branch macro by default.
pub const DEFAULT_MACRO_PREFIX: &str = "DEF_";

/// A parsed branch description.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Branch {
    /// Branch name, used as key by pipelines.
    pub name: String,
    /// Entry point prefix; stage suffixes are appended to it.
    pub function: String,
    /// Preprocessor macros as `(name, value)`.
    pub macros: Vec<(String, String)>,
}

impl Branch {
    /// Parses a branch description, prefixing every macro name with `macro_prefix`.
    pub fn parse(desc: &str, macro_prefix: &str) -> Self {
        let (entry, rest) = match desc.split_once(' ') {
            Some((entry, rest)) => (entry, rest),
            None => (desc, ""),
        };

        let macros = rest
            .split(' ')
            .filter(|token| !token.is_empty())
            .map(|token| match token.split_once('=') {
                Some((name, value)) => (format!("{macro_prefix}{name}"), value.to_string()),
                None => (format!("{macro_prefix}{token}"), "1".to_string()),
            })
            .collect();

        let (function, name) = match entry.split_once(':') {
            Some((function, name)) => (function, name),
            None => (entry, entry),
        };

        Self {
            name: name.to_string(),
            function: function.to_string(),
            macros,
        }
    }

    /// Entry point name for `stage`, e.g. `mainVS`.
    pub fn entry_point(&self, stage: Stage) -> String {
        format!("{}{}", self.function, stage.suffix())
    }
}

/// Collects branch descriptions declared with [`BRANCH_COMMENT_MARKER`].
pub fn scan_branches(source: &str) -> Vec<String> {
    let mut branches = Vec::new();
    let mut rest = source;
    while let Some(pos) = rest.find(BRANCH_COMMENT_MARKER) {
        let after = &rest[pos + BRANCH_COMMENT_MARKER.len()..];
        let end = after.find(['\r', '\n']).unwrap_or(after.len());
        branches.push(after[..end].to_string());
        rest = &after[end..];
    }
    branches
}

/// Returns `true` if `name` appears in `ignore_list`.
pub fn is_in_ignore_list(ignore_list: &[String], name: &str) -> bool {
    ignore_list.iter().any(|ignored| ignored == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn macros(branch: &Branch) -> Vec<(&str, &str)> {
        branch
            .macros
            .iter()
            .map(|(n, v)| (n.as_str(), v.as_str()))
            .collect()
    }

    #[test]
    fn test_parse_empty() {
        let branch = Branch::parse("", DEFAULT_MACRO_PREFIX);
        assert_eq!(branch.name, "");
        assert_eq!(branch.entry_point(Stage::Vs), "VS");
        assert!(branch.macros.is_empty());
    }

    #[test]
    fn test_parse_entry_only() {
        let branch = Branch::parse("Foo", DEFAULT_MACRO_PREFIX);
        assert_eq!(branch.name, "Foo");
        assert_eq!(branch.entry_point(Stage::Fs), "FooFS");
        assert_eq!(branch.entry_point(Stage::Hs), "FooHS");
    }

    #[test]
    fn test_parse_bare_macros() {
        let branch = Branch::parse("Bar FOO BAR XYZ", DEFAULT_MACRO_PREFIX);
        assert_eq!(branch.name, "Bar");
        assert_eq!(
            macros(&branch),
            vec![("DEF_FOO", "1"), ("DEF_BAR", "1"), ("DEF_XYZ", "1")]
        );
    }

    #[test]
    fn test_parse_valued_macros() {
        let branch = Branch::parse("FooBar FOO=1 BAR=xyz XYZ= XYZ2=", DEFAULT_MACRO_PREFIX);
        assert_eq!(branch.name, "FooBar");
        assert_eq!(
            macros(&branch),
            vec![
                ("DEF_FOO", "1"),
                ("DEF_BAR", "xyz"),
                ("DEF_XYZ", ""),
                ("DEF_XYZ2", "")
            ]
        );
    }

    #[test]
    fn test_parse_named_branch() {
        let branch = Branch::parse("main:#Depth DEPTH", DEFAULT_MACRO_PREFIX);
        assert_eq!(branch.name, "#Depth");
        assert_eq!(branch.function, "main");
        assert_eq!(branch.entry_point(Stage::Vs), "mainVS");
        assert_eq!(macros(&branch), vec![("DEF_DEPTH", "1")]);
    }

    #[test]
    fn test_scan_branches() {
        let source = "// header\n//@main:#\r\nfloat4 x;\n//@main:#Depth DEPTH\nvoid mainVS() {}\n//@main:#Last";
        assert_eq!(
            scan_branches(source),
            vec!["main:#", "main:#Depth DEPTH", "main:#Last"]
        );
        assert!(scan_branches("void mainVS() {}").is_empty());
    }

    #[test]
    fn test_ignore_list() {
        let ignore = vec!["#Old".to_string()];
        assert!(is_in_ignore_list(&ignore, "#Old"));
        assert!(!is_in_ignore_list(&ignore, "#"));
    }
}
