//! Rust extraction.

use tree_sitter::Node;

use crate::extract::toolkit::{
    ancestor_of_kind, branching_count, child_of_kind, children_by_field, children_of_kind, clean_type,
    collect_calls, descendants, has_ancestor, has_token, named_children, split_generics,
    BranchRules, CallRules, DocStyle, ExtractCtx,
};
use crate::extract::Extractor;
use crate::models::{
    ConstantDef, Field, FunctionDef, FunctionKind, Import, Language, Parameter, ParseResult,
    TypeDef, TypeKind,
};

const DOC: DocStyle = DocStyle {
    comment_kinds: &["line_comment", "block_comment"],
    transparent_kinds: &["attribute_item"],
};

const BRANCHES: BranchRules = BranchRules {
    kinds: &[
        "if_expression",
        "while_expression",
        "loop_expression",
        "for_expression",
        "match_arm",
    ],
    binary_kinds: &["binary_expression"],
    short_circuit_ops: &["&&", "||"],
};

const CALLS: CallRules = CallRules {
    calls: &[("call_expression", "function"), ("macro_invocation", "macro")],
};

const TYPE_ITEMS: &[&str] = &["struct_item", "enum_item", "union_item", "trait_item", "type_item"];

pub struct RustExtractor;

impl Extractor for RustExtractor {
    fn language(&self) -> Language {
        Language::Rust
    }

    fn extract(&self, root: Node<'_>, ctx: &ExtractCtx<'_>, out: &mut ParseResult) {
        out.namespace = module_path(ctx.file);

        for node in descendants(root, &["use_declaration"]) {
            if has_ancestor(node, &["function_item"]) {
                continue;
            }
            if let Some(import) = use_decl(node, ctx) {
                out.imports.push(import);
            }
        }

        for node in descendants(root, &["function_item"]) {
            if has_ancestor(node, &["function_item"]) {
                continue;
            }
            if let Some(function) = function(node, ctx) {
                out.functions.push(function);
            }
        }

        for node in descendants(root, TYPE_ITEMS) {
            if has_ancestor(node, &["function_item"]) {
                continue;
            }
            if let Some(ty) = type_item(node, ctx) {
                out.types.push(ty);
            }
        }

        // `impl Trait for Type` in the same file.
        for node in descendants(root, &["impl_item"]) {
            let Some(trait_name) = node.child_by_field_name("trait").map(|t| ctx.text(t).trim().to_string())
            else {
                continue;
            };
            let Some(target) = impl_target(node, ctx) else {
                continue;
            };
            if let Some(ty) = out.types.iter_mut().find(|t| t.name == target) {
                if !ty.implements.contains(&trait_name) {
                    ty.implements.push(trait_name);
                }
            }
        }

        for node in descendants(root, &["const_item", "static_item"]) {
            if has_ancestor(node, &["function_item"]) {
                continue;
            }
            let Some(name) = ctx.field_text(node, "name") else {
                continue;
            };
            out.constants.push(ConstantDef {
                name,
                type_: ctx.field_text(node, "type"),
                value: ctx.field_text(node, "value"),
                is_public: is_pub(node),
                location: ctx.location(node),
                content_hash: ctx.hash(node),
            });
        }
    }
}

/// `src/store/mod.rs` -> `store`; `src/store/memory.rs` -> `store::memory`.
/// Crate roots have no module path.
fn module_path(file: &str) -> Option<String> {
    let normalized = file.replace('\\', "/");
    let rel = normalized
        .rsplit_once("src/")
        .map(|(_, rest)| rest)
        .unwrap_or(&normalized);
    let stem = rel.trim_end_matches(".rs");
    let mut parts: Vec<&str> = stem.split('/').filter(|s| !s.is_empty()).collect();
    if matches!(parts.last(), Some(&"mod") | Some(&"lib") | Some(&"main")) {
        parts.pop();
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("::"))
    }
}

fn is_pub(node: Node<'_>) -> bool {
    child_of_kind(node, &["visibility_modifier"]).is_some()
}

fn use_decl(node: Node<'_>, ctx: &ExtractCtx<'_>) -> Option<Import> {
    let argument = node.child_by_field_name("argument")?;
    let last_segment = |path: &str| path.rsplit("::").next().unwrap_or(path).to_string();
    let (path, alias, names) = match argument.kind() {
        "use_as_clause" => {
            let path = ctx.field_text(argument, "path")?;
            let names = vec![last_segment(&path)];
            (path, ctx.field_text(argument, "alias"), names)
        }
        "scoped_use_list" => {
            let path = ctx.field_text(argument, "path").unwrap_or_default();
            let names = argument
                .child_by_field_name("list")
                .map(|list| {
                    named_children(list)
                        .into_iter()
                        .map(|item| ctx.text(item).trim().to_string())
                        .collect()
                })
                .unwrap_or_default();
            (path, None, names)
        }
        "use_list" => {
            let names = named_children(argument)
                .into_iter()
                .map(|item| ctx.text(item).trim().to_string())
                .collect();
            (String::new(), None, names)
        }
        "use_wildcard" => {
            let path = ctx.text(argument).trim_end_matches('*').trim_end_matches("::").to_string();
            (path, None, vec!["*".to_string()])
        }
        _ => {
            let path = ctx.text(argument).trim().to_string();
            let names = vec![last_segment(&path)];
            (path, None, names)
        }
    };
    let head = path.split("::").next().unwrap_or("");
    Some(Import {
        is_local: matches!(head, "crate" | "super" | "self"),
        path,
        alias,
        names,
        line: node.start_position().row + 1,
    })
}

/// Attribute texts directly above an item, nearest last.
fn attributes(node: Node<'_>, ctx: &ExtractCtx<'_>) -> Vec<String> {
    let mut attrs = Vec::new();
    let mut current = node.prev_sibling();
    while let Some(sibling) = current {
        match sibling.kind() {
            "attribute_item" => attrs.push(ctx.text(sibling).to_string()),
            "line_comment" | "block_comment" => {}
            _ => break,
        }
        current = sibling.prev_sibling();
    }
    attrs.reverse();
    attrs
}

fn is_test_attribute(attr: &str) -> bool {
    let inner = attr
        .trim()
        .trim_start_matches("#[")
        .trim_end_matches(']')
        .split('(')
        .next()
        .unwrap_or("")
        .trim();
    inner.rsplit("::").next() == Some("test")
}

/// Type name an `impl` block targets, generics stripped.
fn impl_target(node: Node<'_>, ctx: &ExtractCtx<'_>) -> Option<String> {
    let ty = node.child_by_field_name("type")?;
    let base = if ty.kind() == "generic_type" {
        ty.child_by_field_name("type").unwrap_or(ty)
    } else {
        ty
    };
    let text = ctx.text(base).trim();
    Some(text.rsplit("::").next().unwrap_or(text).to_string())
}

fn function(node: Node<'_>, ctx: &ExtractCtx<'_>) -> Option<FunctionDef> {
    let name = ctx.field_text(node, "name")?;
    let body = node.child_by_field_name("body");
    let container = ancestor_of_kind(node, &["impl_item", "trait_item", "function_item"])
        .filter(|c| c.kind() != "function_item");

    let (owner, inherited_pub) = match container {
        Some(c) if c.kind() == "impl_item" => (
            impl_target(c, ctx),
            c.child_by_field_name("trait").is_some(),
        ),
        Some(c) => (ctx.field_text(c, "name"), is_pub(c)),
        None => (None, false),
    };

    let param_list = node.child_by_field_name("parameters");
    let has_self = param_list.is_some_and(|p| child_of_kind(p, &["self_parameter"]).is_some());
    let kind = match (&owner, has_self, name.as_str()) {
        (None, _, _) => FunctionKind::Function,
        (Some(_), false, "new") => FunctionKind::Constructor,
        _ => FunctionKind::Method,
    };
    let is_async = child_of_kind(node, &["function_modifiers"]).is_some_and(|m| has_token(m, "async"));

    Some(FunctionDef {
        is_test: attributes(node, ctx).iter().any(|a| is_test_attribute(a)),
        is_public: is_pub(node) || inherited_pub,
        is_async,
        is_static: owner.is_some() && !has_self,
        kind,
        owner,
        signature: ctx.signature(node, body),
        parameters: param_list.map(|p| parameters(p, ctx)).unwrap_or_default(),
        returns: node
            .child_by_field_name("return_type")
            .and_then(|r| clean_type(ctx.text(r)))
            .into_iter()
            .collect(),
        doc: ctx.doc(node, &DOC),
        body: body.map(|b| ctx.text(b).to_string()),
        complexity: branching_count(body, ctx.source, &BRANCHES),
        calls: collect_calls(body, ctx.source, &CALLS),
        location: ctx.location(node),
        content_hash: ctx.hash(node),
        name,
    })
}

fn parameters(list: Node<'_>, ctx: &ExtractCtx<'_>) -> Vec<Parameter> {
    named_children(list)
        .into_iter()
        .filter_map(|p| match p.kind() {
            "parameter" => Some(Parameter {
                name: ctx.field_text(p, "pattern")?,
                type_: ctx.field_text(p, "type"),
                ..Default::default()
            }),
            "variadic_parameter" => Some(Parameter {
                name: ctx.field_text(p, "pattern").unwrap_or_else(|| "...".to_string()),
                variadic: true,
                ..Default::default()
            }),
            _ => None,
        })
        .collect()
}

fn type_item(node: Node<'_>, ctx: &ExtractCtx<'_>) -> Option<TypeDef> {
    let name = ctx.field_text(node, "name")?;
    let kind = match node.kind() {
        "enum_item" => TypeKind::Enum,
        "union_item" => TypeKind::Union,
        "trait_item" => TypeKind::Interface,
        "type_item" => TypeKind::Alias,
        _ => TypeKind::Struct,
    };
    let mut ty = TypeDef {
        name,
        kind,
        fields: Vec::new(),
        methods: Vec::new(),
        extends: None,
        implements: Vec::new(),
        variants: Vec::new(),
        alias_of: None,
        generics: node
            .child_by_field_name("type_parameters")
            .map(|g| split_generics(ctx.text(g)))
            .unwrap_or_default(),
        doc: ctx.doc(node, &DOC),
        is_public: is_pub(node),
        location: ctx.location(node),
        content_hash: ctx.hash(node),
    };

    let body = node.child_by_field_name("body");
    match (kind, body) {
        (TypeKind::Alias, _) => ty.alias_of = ctx.field_text(node, "type"),
        (TypeKind::Enum, Some(body)) => {
            ty.variants = children_of_kind(body, &["enum_variant"])
                .into_iter()
                .filter_map(|v| ctx.field_text(v, "name"))
                .collect();
        }
        (TypeKind::Interface, Some(body)) => {
            ty.methods = children_of_kind(body, &["function_signature_item"])
                .into_iter()
                .filter_map(|m| ctx.field_text(m, "name"))
                .collect();
            // Supertraits: `trait A: B + C`.
            if let Some(bounds) = node.child_by_field_name("bounds") {
                let mut supers = named_children(bounds)
                    .into_iter()
                    .map(|b| ctx.text(b).trim().to_string());
                ty.extends = supers.next();
                ty.implements.extend(supers);
            }
        }
        (_, Some(body)) => ty.fields = fields(body, ctx),
        _ => {}
    }
    Some(ty)
}

fn fields(body: Node<'_>, ctx: &ExtractCtx<'_>) -> Vec<Field> {
    let tags = |n: Node<'_>| {
        let attrs = attributes(n, ctx);
        if attrs.is_empty() {
            None
        } else {
            Some(attrs.join(" "))
        }
    };
    match body.kind() {
        "ordered_field_declaration_list" => {
            let mut out = Vec::new();
            for (index, ty) in children_by_field(body, "type").into_iter().enumerate() {
                out.push(Field {
                    name: index.to_string(),
                    type_: Some(ctx.text(ty).trim().to_string()),
                    ..Default::default()
                });
            }
            out
        }
        _ => children_of_kind(body, &["field_declaration"])
            .into_iter()
            .filter_map(|f| {
                let type_ = ctx.field_text(f, "type");
                Some(Field {
                    name: ctx.field_text(f, "name")?,
                    optional: type_.as_deref().is_some_and(|t| t.starts_with("Option<")),
                    type_,
                    readonly: false,
                    default: None,
                    tags: tags(f),
                    doc: ctx.doc(f, &DOC),
                })
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str, file: &str) -> ParseResult {
        RustExtractor.parse(src.as_bytes(), file).unwrap()
    }

    const SERVICE: &str = r##"use std::collections::HashMap;
use std::fmt::{self, Display};
use crate::store::Store as LinkStore;
use super::*;
use url::Url;

pub const MAX_LENGTH: usize = 2048;
static PREFIX: &str = "https://";

/// Link status.
#[derive(Debug, Clone)]
pub enum Status {
    Active,
    Expired { at: u64 },
}

/// Shortens links.
pub struct Service<S: Store> {
    #[serde(default)]
    pub prefix: String,
    store: Option<S>,
}

pub struct Code(pub String);

pub trait Shortener {
    fn shorten(&self, raw: &str) -> Result<String, Error>;

    fn name(&self) -> &str {
        "svc"
    }
}

pub type Links = HashMap<String, String>;

impl<S: Store> Service<S> {
    pub fn new(store: S) -> Self {
        Self { prefix: String::new(), store: Some(store) }
    }

    // Validates and stores.
    pub async fn shorten(&self, raw: &str, tags: &[String]) -> Result<String, Error> {
        let url = Url::parse(raw)?;
        if url.scheme().is_empty() || url.host().is_none() {
            return Err(Error::Invalid);
        }
        for tag in tags {
            self.save(tag).await;
        }
        println!("{}", url);
        Ok(url.to_string())
    }
}

impl<S: Store> Shortener for Service<S> {
    fn shorten(&self, raw: &str) -> Result<String, Error> {
        match raw {
            "" => Err(Error::Invalid),
            _ => Ok(raw.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn shortens() {}
}
"##;

    #[test]
    fn test_module_path() {
        assert_eq!(module_path("src/lib.rs"), None);
        assert_eq!(module_path("src/store/mod.rs").as_deref(), Some("store"));
        assert_eq!(module_path("crates/x/src/store/memory.rs").as_deref(), Some("store::memory"));
    }

    #[test]
    fn test_use_declarations() {
        let result = parse(SERVICE, "src/service.rs");
        assert_eq!(result.namespace.as_deref(), Some("service"));
        assert_eq!(result.imports.len(), 5);
        assert_eq!(result.imports[0].path, "std::collections::HashMap");
        assert_eq!(result.imports[0].names, vec!["HashMap"]);
        assert_eq!(result.imports[1].path, "std::fmt");
        assert_eq!(result.imports[1].names, vec!["self", "Display"]);
        assert_eq!(result.imports[2].alias.as_deref(), Some("LinkStore"));
        assert!(result.imports[2].is_local);
        assert_eq!(result.imports[3].path, "super");
        assert!(result.imports[3].is_local);
        assert!(!result.imports[4].is_local);
    }

    #[test]
    fn test_impl_methods() {
        let result = parse(SERVICE, "src/service.rs");
        let shorten = result
            .functions
            .iter()
            .find(|f| f.name == "shorten" && f.is_async)
            .unwrap();
        assert_eq!(shorten.owner.as_deref(), Some("Service"));
        assert_eq!(shorten.kind, FunctionKind::Method);
        assert!(shorten.is_public);
        assert!(!shorten.is_static);
        assert_eq!(shorten.doc.as_deref(), Some("Validates and stores."));
        assert_eq!(shorten.returns, vec!["Result<String, Error>"]);
        let names: Vec<&str> = shorten.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["raw", "tags"]);
        // if + `||` + for
        assert_eq!(shorten.complexity, 4);
        for call in ["parse", "save", "println", "to_string", "Err"] {
            assert!(shorten.calls.contains(call), "missing {call}");
        }

        let new = result.functions.iter().find(|f| f.name == "new").unwrap();
        assert_eq!(new.kind, FunctionKind::Constructor);
        assert!(new.is_static);

        let via_trait = result
            .functions
            .iter()
            .find(|f| f.name == "shorten" && !f.is_async)
            .unwrap();
        assert!(via_trait.is_public);
        assert_eq!(via_trait.complexity, 3);

        let default_method = result.functions.iter().find(|f| f.name == "name").unwrap();
        assert_eq!(default_method.owner.as_deref(), Some("Shortener"));
    }

    #[test]
    fn test_types() {
        let result = parse(SERVICE, "src/service.rs");
        let status = result.types.iter().find(|t| t.name == "Status").unwrap();
        assert_eq!(status.kind, TypeKind::Enum);
        assert_eq!(status.variants, vec!["Active", "Expired"]);
        assert_eq!(status.doc.as_deref(), Some("Link status."));

        let service = result.types.iter().find(|t| t.name == "Service").unwrap();
        assert_eq!(service.kind, TypeKind::Struct);
        assert_eq!(service.generics, vec!["S: Store"]);
        assert_eq!(service.implements, vec!["Shortener"]);
        assert_eq!(service.methods, vec!["new", "shorten"]);
        assert_eq!(service.fields.len(), 2);
        assert_eq!(service.fields[0].tags.as_deref(), Some("#[serde(default)]"));
        assert!(service.fields[1].optional);

        let code = result.types.iter().find(|t| t.name == "Code").unwrap();
        assert_eq!(code.fields[0].name, "0");

        let shortener = result.types.iter().find(|t| t.name == "Shortener").unwrap();
        assert_eq!(shortener.kind, TypeKind::Interface);
        assert_eq!(shortener.methods, vec!["shorten", "name"]);

        let links = result.types.iter().find(|t| t.name == "Links").unwrap();
        assert_eq!(links.kind, TypeKind::Alias);
        assert_eq!(links.alias_of.as_deref(), Some("HashMap<String, String>"));
    }

    #[test]
    fn test_constants_and_tests() {
        let result = parse(SERVICE, "src/service.rs");
        let names: Vec<&str> = result.constants.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["MAX_LENGTH", "PREFIX"]);
        assert!(result.constants[0].is_public);
        assert!(!result.constants[1].is_public);

        let test = result.functions.iter().find(|f| f.name == "shortens").unwrap();
        assert!(test.is_test);
        assert!(is_test_attribute("#[tokio::test]"));
        assert!(!is_test_attribute("#[cfg(test)]"));
    }
}
