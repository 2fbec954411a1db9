//! Syntax extraction: one extractor per language over a shared toolkit.

pub mod csharp;
pub mod go;
pub mod java;
pub mod parser;
pub mod python;
pub mod registry;
pub mod rust;
pub mod toolkit;
pub mod typescript;

use tree_sitter::Node;

use crate::errors::{TandemError, TandemResult};
use crate::models::{Language, ParseResult};

pub use registry::LanguageRegistry;
pub use toolkit::ExtractCtx;

/// Turns one source file into a normalized [`ParseResult`].
///
/// Implementations only provide [`Extractor::extract`]; parsing, UTF-8
/// validation and syntax-error flagging are shared. Malformed input never
/// panics: a partial tree yields partial results, and entities missing a
/// required sub-field are skipped.
pub trait Extractor: Send + Sync {
    fn language(&self) -> Language;

    fn extract(&self, root: Node<'_>, ctx: &ExtractCtx<'_>, out: &mut ParseResult);

    fn parse(&self, source: &[u8], filename: &str) -> TandemResult<ParseResult> {
        std::str::from_utf8(source)
            .map_err(|e| TandemError::Parse(format!("{filename} is not valid UTF-8: {e}")))?;
        let tree = parser::parse_tree(self.language(), source, filename)?;
        let root = tree.root_node();
        let ctx = ExtractCtx::new(source, filename);
        let mut result = ParseResult::empty(filename, self.language());
        result.has_syntax_errors = root.has_error();
        self.extract(root, &ctx, &mut result);
        attach_methods(&mut result);
        Ok(result)
    }
}

/// Record member function names on their owning type when both live in the
/// same file.
fn attach_methods(result: &mut ParseResult) {
    for function in &result.functions {
        let Some(owner) = &function.owner else {
            continue;
        };
        if let Some(ty) = result.types.iter_mut().find(|t| &t.name == owner) {
            if !ty.methods.contains(&function.name) {
                ty.methods.push(function.name.clone());
            }
        }
    }
}
