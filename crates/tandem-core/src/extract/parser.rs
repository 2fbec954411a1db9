//! Grammar selection and tree-sitter parsing.

use serde::Serialize;

use crate::errors::{TandemError, TandemResult};
use crate::models::Language;

/// Grammar for a language. `.tsx` files use the TSX dialect, which accepts
/// JSX on top of plain TypeScript.
pub fn grammar(language: Language, filename: &str) -> tree_sitter::Language {
    match language {
        Language::Go => tree_sitter_go::LANGUAGE.into(),
        Language::Python => tree_sitter_python::LANGUAGE.into(),
        Language::TypeScript => {
            if filename.to_lowercase().ends_with(".tsx") {
                tree_sitter_typescript::LANGUAGE_TSX.into()
            } else {
                tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()
            }
        }
        Language::Java => tree_sitter_java::LANGUAGE.into(),
        Language::Rust => tree_sitter_rust::LANGUAGE.into(),
        Language::CSharp => tree_sitter_c_sharp::LANGUAGE.into(),
    }
}

/// Parse `source` into a concrete syntax tree.
///
/// Malformed input still yields a tree containing `ERROR` nodes; only a
/// grammar load failure or an aborted parse is reported as an error.
pub fn parse_tree(
    language: Language,
    source: &[u8],
    filename: &str,
) -> TandemResult<tree_sitter::Tree> {
    let mut parser = tree_sitter::Parser::new();
    parser
        .set_language(&grammar(language, filename))
        .map_err(|e| TandemError::Parse(format!("Failed to set language {language}: {e}")))?;
    parser
        .parse(source, None)
        .ok_or_else(|| TandemError::Parse(format!("Failed to parse {filename}")))
}

#[derive(Clone, Debug, Serialize)]
pub struct GrammarStatus {
    pub language: Language,
    pub available: bool,
    pub abi_version: usize,
    pub reason: String,
}

/// Report which grammars load in this build.
pub fn grammar_capability_report() -> Vec<GrammarStatus> {
    Language::all()
        .iter()
        .map(|lang| {
            let grammar = grammar(*lang, "");
            let abi_version = grammar.version();
            let mut parser = tree_sitter::Parser::new();
            match parser.set_language(&grammar) {
                Ok(()) => GrammarStatus {
                    language: *lang,
                    available: true,
                    abi_version,
                    reason: "ok".to_string(),
                },
                Err(e) => GrammarStatus {
                    language: *lang,
                    available: false,
                    abi_version,
                    reason: e.to_string(),
                },
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_grammars_load() {
        let report = grammar_capability_report();
        assert_eq!(report.len(), 6);
        assert!(report.iter().all(|s| s.available), "{report:?}");
    }

    #[test]
    fn test_csharp_source_parses_cleanly() {
        let src = b"namespace Links;\n\npublic class Service\n{\n    public string Shorten(string raw) => raw;\n}\n";
        let tree = parse_tree(Language::CSharp, src, "Service.cs").unwrap();
        assert!(!tree.root_node().has_error());
        assert_eq!(tree.root_node().kind(), "compilation_unit");
    }

    #[test]
    fn test_malformed_source_still_parses() {
        let tree = parse_tree(Language::Go, b"package main\nfunc (", "broken.go").unwrap();
        assert!(tree.root_node().has_error());
    }

    #[test]
    fn test_tsx_dialect_accepts_jsx() {
        let src = b"const App = () => <div>hi</div>;";
        let tree = parse_tree(Language::TypeScript, src, "App.tsx").unwrap();
        assert!(!tree.root_node().has_error());
    }
}
