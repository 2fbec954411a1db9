//! Go extraction.

use std::collections::HashMap;

use tree_sitter::Node;

use crate::extract::toolkit::{
    branching_count, child_of_kind, children_by_field, children_of_kind, clean_type,
    collect_calls, descendants, has_ancestor, named_children, split_generics, BranchRules,
    CallRules, DocStyle, ExtractCtx,
};
use crate::extract::Extractor;
use crate::models::{
    ConstantDef, Field, FunctionDef, FunctionKind, Import, Language, Parameter, ParseResult,
    TypeDef, TypeKind,
};

const DOC: DocStyle = DocStyle {
    comment_kinds: &["comment"],
    transparent_kinds: &[],
};

const BRANCHES: BranchRules = BranchRules {
    kinds: &[
        "if_statement",
        "for_statement",
        "expression_case",
        "type_case",
        "communication_case",
    ],
    binary_kinds: &["binary_expression"],
    short_circuit_ops: &["&&", "||"],
};

const CALLS: CallRules = CallRules {
    calls: &[("call_expression", "function")],
};

const FUNCTION_SCOPES: &[&str] = &["function_declaration", "method_declaration", "func_literal"];

pub struct GoExtractor;

impl Extractor for GoExtractor {
    fn language(&self) -> Language {
        Language::Go
    }

    fn extract(&self, root: Node<'_>, ctx: &ExtractCtx<'_>, out: &mut ParseResult) {
        out.namespace = descendants(root, &["package_clause"])
            .first()
            .and_then(|p| child_of_kind(*p, &["package_identifier"]))
            .map(|n| ctx.text(n).to_string());

        for spec in descendants(root, &["import_spec"]) {
            if let Some(import) = import_spec(spec, ctx) {
                out.imports.push(import);
            }
        }

        let is_test_file = ctx.file.ends_with("_test.go");
        for node in descendants(root, &["function_declaration", "method_declaration"]) {
            if let Some(function) = function(node, ctx, is_test_file) {
                out.functions.push(function);
            }
        }

        for node in descendants(root, &["type_spec", "type_alias"]) {
            if has_ancestor(node, FUNCTION_SCOPES) {
                continue;
            }
            if let Some(ty) = type_def(node, ctx) {
                out.types.push(ty);
            }
        }

        let mut enum_variants: HashMap<String, Vec<String>> = HashMap::new();
        for decl in descendants(root, &["const_declaration"]) {
            if has_ancestor(decl, FUNCTION_SCOPES) {
                continue;
            }
            let mut current_type: Option<String> = None;
            for spec in children_of_kind(decl, &["const_spec"]) {
                let declared = ctx.field_text(spec, "type");
                let has_value = spec.child_by_field_name("value").is_some();
                if declared.is_some() {
                    current_type = declared.clone();
                } else if has_value {
                    current_type = None;
                }
                for name_node in children_by_field(spec, "name") {
                    if name_node.kind() != "identifier" {
                        continue;
                    }
                    let name = ctx.text(name_node).to_string();
                    if name.is_empty() || name == "_" {
                        continue;
                    }
                    if let Some(ty) = &current_type {
                        enum_variants.entry(ty.clone()).or_default().push(name.clone());
                    }
                    out.constants.push(ConstantDef {
                        is_public: is_exported(&name),
                        name,
                        type_: declared.clone(),
                        value: ctx.field_text(spec, "value"),
                        location: ctx.location(spec),
                        content_hash: ctx.hash(spec),
                    });
                }
            }
        }
        for ty in &mut out.types {
            if let Some(variants) = enum_variants.remove(&ty.name) {
                if ty.kind == TypeKind::Alias {
                    ty.kind = TypeKind::Enum;
                }
                ty.variants = variants;
            }
        }
    }
}

fn is_exported(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_uppercase())
}

fn import_spec(spec: Node<'_>, ctx: &ExtractCtx<'_>) -> Option<Import> {
    let raw = ctx.field_text(spec, "path")?;
    let path = raw.trim_matches(|c| c == '"' || c == '`').to_string();
    if path.is_empty() {
        return None;
    }
    let alias = ctx.field_text(spec, "name");
    let last = path.rsplit('/').next().unwrap_or(&path).to_string();
    Some(Import {
        is_local: path.starts_with('.'),
        names: vec![alias.clone().unwrap_or(last)],
        path,
        alias,
        line: spec.start_position().row + 1,
    })
}

fn function(node: Node<'_>, ctx: &ExtractCtx<'_>, is_test_file: bool) -> Option<FunctionDef> {
    let name = ctx.field_text(node, "name")?;
    let body = node.child_by_field_name("body");
    let owner = node
        .child_by_field_name("receiver")
        .and_then(|r| receiver_type(r, ctx));
    let kind = if owner.is_some() {
        FunctionKind::Method
    } else {
        FunctionKind::Function
    };
    let parameters = node
        .child_by_field_name("parameters")
        .map(|p| parameters(p, ctx))
        .unwrap_or_default();
    let returns = node
        .child_by_field_name("result")
        .map(|r| results(r, ctx))
        .unwrap_or_default();

    Some(FunctionDef {
        is_public: is_exported(&name),
        is_test: is_test_file && owner.is_none() && name.starts_with("Test"),
        kind,
        owner,
        signature: ctx.signature(node, body),
        parameters,
        returns,
        is_async: false,
        is_static: false,
        doc: ctx.doc(node, &DOC),
        body: body.map(|b| ctx.text(b).to_string()),
        complexity: branching_count(body, ctx.source, &BRANCHES),
        calls: collect_calls(body, ctx.source, &CALLS),
        location: ctx.location(node),
        content_hash: ctx.hash(node),
        name,
    })
}

/// `(s *Server[T])` -> `Server`.
fn receiver_type(receiver: Node<'_>, ctx: &ExtractCtx<'_>) -> Option<String> {
    let decl = child_of_kind(receiver, &["parameter_declaration"])?;
    let raw = ctx.field_text(decl, "type")?;
    let base = raw.trim_start_matches('*');
    let base = base.split('[').next().unwrap_or(base).trim();
    if base.is_empty() {
        None
    } else {
        Some(base.to_string())
    }
}

fn parameters(list: Node<'_>, ctx: &ExtractCtx<'_>) -> Vec<Parameter> {
    let mut params = Vec::new();
    for decl in named_children(list) {
        let variadic = decl.kind() == "variadic_parameter_declaration";
        if decl.kind() != "parameter_declaration" && !variadic {
            continue;
        }
        let type_ = ctx.field_text(decl, "type").and_then(|t| clean_type(&t));
        let names = children_by_field(decl, "name");
        if names.is_empty() {
            params.push(Parameter {
                name: "_".to_string(),
                type_,
                variadic,
                ..Default::default()
            });
            continue;
        }
        for name in names {
            params.push(Parameter {
                name: ctx.text(name).to_string(),
                type_: type_.clone(),
                variadic,
                ..Default::default()
            });
        }
    }
    params
}

fn results(result: Node<'_>, ctx: &ExtractCtx<'_>) -> Vec<String> {
    if result.kind() != "parameter_list" {
        return clean_type(ctx.text(result)).into_iter().collect();
    }
    let mut out = Vec::new();
    for decl in named_children(result) {
        let Some(type_) = ctx.field_text(decl, "type") else {
            continue;
        };
        let repeat = children_by_field(decl, "name").len().max(1);
        for _ in 0..repeat {
            out.push(type_.clone());
        }
    }
    out
}

fn type_def(node: Node<'_>, ctx: &ExtractCtx<'_>) -> Option<TypeDef> {
    let name = ctx.field_text(node, "name")?;
    let body = node.child_by_field_name("type")?;
    let generics = node
        .child_by_field_name("type_parameters")
        .map(|g| split_generics(ctx.text(g)))
        .unwrap_or_default();
    // Doc comments sit before the enclosing `type` keyword for single specs.
    let anchor = match node.parent() {
        Some(parent) if parent.kind() == "type_declaration" => {
            if named_children(parent).len() == 1 {
                parent
            } else {
                node
            }
        }
        _ => node,
    };

    let mut ty = TypeDef {
        is_public: is_exported(&name),
        name,
        kind: TypeKind::Alias,
        fields: Vec::new(),
        methods: Vec::new(),
        extends: None,
        implements: Vec::new(),
        variants: Vec::new(),
        alias_of: None,
        generics,
        doc: ctx.doc(anchor, &DOC),
        location: ctx.location(node),
        content_hash: ctx.hash(node),
    };

    match body.kind() {
        "struct_type" => {
            ty.kind = TypeKind::Struct;
            for decl in descendants(body, &["field_declaration"]) {
                struct_field(decl, ctx, &mut ty);
            }
        }
        "interface_type" => {
            ty.kind = TypeKind::Interface;
            for elem in named_children(body) {
                match elem.kind() {
                    "method_elem" | "method_spec" => {
                        if let Some(name) = ctx.field_text(elem, "name") {
                            ty.methods.push(name);
                        }
                    }
                    "type_elem" | "constraint_elem" | "interface_type_name" => {
                        let text = ctx.text(elem).trim().to_string();
                        if text.contains('|') || text.starts_with('~') {
                            ty.kind = TypeKind::Union;
                            ty.variants
                                .extend(text.split('|').map(|v| v.trim().to_string()));
                        } else if !text.is_empty() {
                            ty.implements.push(text);
                        }
                    }
                    _ => {}
                }
            }
        }
        _ => {
            ty.alias_of = clean_type(ctx.text(body));
        }
    }
    Some(ty)
}

fn struct_field(decl: Node<'_>, ctx: &ExtractCtx<'_>, ty: &mut TypeDef) {
    let Some(type_) = ctx.field_text(decl, "type") else {
        return;
    };
    let tags = ctx.field_text(decl, "tag");
    let names = children_by_field(decl, "name");
    if names.is_empty() {
        // Embedded field: the first one acts as the base type.
        let embedded = type_.trim_start_matches('*').to_string();
        if ty.extends.is_none() {
            ty.extends = Some(embedded);
        } else {
            ty.implements.push(embedded);
        }
        return;
    }
    let optional = type_.starts_with('*') || tags.as_deref().is_some_and(|t| t.contains("omitempty"));
    for name in names {
        ty.fields.push(Field {
            name: ctx.text(name).to_string(),
            type_: Some(type_.clone()),
            optional,
            readonly: false,
            default: None,
            tags: tags.clone(),
            doc: ctx.doc(decl, &DOC),
        });
    }
}
