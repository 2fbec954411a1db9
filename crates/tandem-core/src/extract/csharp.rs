//! C# extraction.

use tree_sitter::Node;

use crate::extract::toolkit::{
    ancestor_of_kind, branching_count, child_of_kind, children_of_kind, collect_calls,
    collapse_whitespace, descendants, has_ancestor, named_children, split_generics, BranchRules,
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
        "foreach_statement",
        "while_statement",
        "do_statement",
        "switch_section",
        "switch_expression_arm",
        "catch_clause",
        "conditional_expression",
    ],
    binary_kinds: &["binary_expression"],
    short_circuit_ops: &["&&", "||", "??"],
};

const CALLS: CallRules = CallRules {
    calls: &[
        ("invocation_expression", "function"),
        ("object_creation_expression", "type"),
    ],
};

const TYPE_DECLS: &[&str] = &[
    "class_declaration",
    "struct_declaration",
    "interface_declaration",
    "enum_declaration",
    "record_declaration",
    "record_struct_declaration",
];

const BODY_SCOPES: &[&str] = &[
    "method_declaration",
    "constructor_declaration",
    "local_function_statement",
    "lambda_expression",
];

const TEST_ATTRIBUTES: &[&str] = &["Fact", "Theory", "Test", "TestCase", "TestMethod"];

const PARAMETER_MODIFIERS: &[&str] = &["params", "this", "ref", "out", "in", "scoped", "readonly"];

pub struct CSharpExtractor;

impl Extractor for CSharpExtractor {
    fn language(&self) -> Language {
        Language::CSharp
    }

    fn extract(&self, root: Node<'_>, ctx: &ExtractCtx<'_>, out: &mut ParseResult) {
        out.namespace = descendants(
            root,
            &["namespace_declaration", "file_scoped_namespace_declaration"],
        )
        .first()
        .and_then(|ns| ctx.field_text(*ns, "name"));
        let namespace_root = out
            .namespace
            .as_deref()
            .and_then(|ns| ns.split('.').next())
            .map(str::to_string);

        for node in descendants(root, &["using_directive"]) {
            if let Some(import) = using(node, ctx, namespace_root.as_deref()) {
                out.imports.push(import);
            }
        }

        for node in descendants(root, &["method_declaration", "constructor_declaration"]) {
            if has_ancestor(node, BODY_SCOPES) || node.child_by_field_name("body").is_none() {
                continue;
            }
            if let Some(function) = function(node, ctx) {
                out.functions.push(function);
            }
        }

        for node in descendants(root, TYPE_DECLS) {
            if has_ancestor(node, BODY_SCOPES) {
                continue;
            }
            if let Some(ty) = type_decl(node, ctx, &mut out.constants) {
                out.types.push(ty);
            }
        }
    }
}

fn using(node: Node<'_>, ctx: &ExtractCtx<'_>, namespace_root: Option<&str>) -> Option<Import> {
    let parts = named_children(node);
    let target = parts.last()?;
    let alias = if parts.len() > 1 {
        parts
            .first()
            .map(|a| ctx.text(*a).trim().trim_end_matches('=').trim().to_string())
    } else {
        None
    };
    let path = ctx.text(*target).trim().to_string();
    if path.is_empty() {
        return None;
    }
    let names = vec![alias
        .clone()
        .unwrap_or_else(|| path.rsplit('.').next().unwrap_or(&path).to_string())];
    Some(Import {
        is_local: namespace_root.is_some_and(|root| path == root || path.starts_with(&format!("{root}."))),
        path,
        alias,
        names,
        line: node.start_position().row + 1,
    })
}

fn modifiers(node: Node<'_>, ctx: &ExtractCtx<'_>) -> Vec<String> {
    children_of_kind(node, &["modifier"])
        .into_iter()
        .map(|m| ctx.text(m).trim().to_string())
        .collect()
}

fn attribute_names(node: Node<'_>, ctx: &ExtractCtx<'_>) -> Vec<String> {
    children_of_kind(node, &["attribute_list"])
        .into_iter()
        .flat_map(|list| children_of_kind(list, &["attribute"]))
        .filter_map(|a| ctx.field_text(a, "name"))
        .map(|n| n.rsplit('.').next().unwrap_or(&n).trim_end_matches("Attribute").to_string())
        .collect()
}

fn attribute_text(node: Node<'_>, ctx: &ExtractCtx<'_>) -> Option<String> {
    let lists: Vec<&str> = children_of_kind(node, &["attribute_list"])
        .into_iter()
        .map(|l| ctx.text(l))
        .collect();
    if lists.is_empty() {
        None
    } else {
        Some(lists.join(" "))
    }
}

/// `<summary>` and friends removed from XML doc comments.
fn clean_xml_doc(doc: Option<String>) -> Option<String> {
    let doc = doc?;
    let mut out = String::with_capacity(doc.len());
    let mut in_tag = false;
    for ch in doc.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    let cleaned: Vec<&str> = out.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.join("\n"))
    }
}

fn owner_decl(node: Node<'_>) -> Option<Node<'_>> {
    ancestor_of_kind(node, TYPE_DECLS)
}

fn function(node: Node<'_>, ctx: &ExtractCtx<'_>) -> Option<FunctionDef> {
    let name = ctx.field_text(node, "name")?;
    let body = node.child_by_field_name("body");
    let mods = modifiers(node, ctx);
    let owner = owner_decl(node);
    let in_interface = owner.is_some_and(|o| o.kind() == "interface_declaration");
    let kind = if node.kind() == "constructor_declaration" {
        FunctionKind::Constructor
    } else {
        FunctionKind::Method
    };
    let returns = ctx
        .field_text(node, "returns")
        .or_else(|| ctx.field_text(node, "type"))
        .filter(|t| t != "void");
    Some(FunctionDef {
        is_test: attribute_names(node, ctx)
            .iter()
            .any(|a| TEST_ATTRIBUTES.contains(&a.as_str())),
        is_public: mods.iter().any(|m| m == "public") || in_interface,
        is_async: mods.iter().any(|m| m == "async"),
        is_static: mods.iter().any(|m| m == "static"),
        kind,
        owner: owner.and_then(|o| ctx.field_text(o, "name")),
        signature: ctx.signature(node, body),
        parameters: node
            .child_by_field_name("parameters")
            .map(|p| parameters(p, ctx))
            .unwrap_or_default(),
        returns: returns.into_iter().collect(),
        doc: clean_xml_doc(ctx.doc(node, &DOC)),
        body: body.map(|b| ctx.text(b).to_string()),
        complexity: branching_count(body, ctx.source, &BRANCHES),
        calls: collect_calls(body, ctx.source, &CALLS),
        location: ctx.location(node),
        content_hash: ctx.hash(node),
        name,
    })
}

/// Text after the first top-level `=`.
fn initializer(text: &str) -> Option<String> {
    let (_, value) = text.split_once('=')?;
    let value = collapse_whitespace(value.trim().trim_end_matches(';'));
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn parameters(list: Node<'_>, ctx: &ExtractCtx<'_>) -> Vec<Parameter> {
    let mut out = Vec::new();
    for param in named_children(list) {
        if !matches!(param.kind(), "parameter" | "parameter_array") {
            continue;
        }
        let Some(name_node) = param.child_by_field_name("name").or_else(|| {
            named_children(param)
                .into_iter()
                .rev()
                .find(|c| c.kind() == "identifier")
        }) else {
            continue;
        };
        let text = ctx.text(param).trim();
        let prefix = String::from_utf8_lossy(&ctx.source[param.start_byte()..name_node.start_byte()]);
        let type_ = ctx.field_text(param, "type").or_else(|| {
            let words: Vec<&str> = prefix
                .split_whitespace()
                .filter(|w| !PARAMETER_MODIFIERS.contains(w) && !w.starts_with('[') && !w.ends_with(']'))
                .collect();
            if words.is_empty() {
                None
            } else {
                Some(words.join(" "))
            }
        });
        let default = initializer(&String::from_utf8_lossy(
            &ctx.source[name_node.end_byte()..param.end_byte()],
        ));
        out.push(Parameter {
            name: ctx.text(name_node).to_string(),
            type_,
            optional: default.is_some(),
            variadic: param.kind() == "parameter_array" || text.starts_with("params ") || prefix.contains("params "),
            default,
        });
    }
    out
}

fn type_decl(node: Node<'_>, ctx: &ExtractCtx<'_>, constants: &mut Vec<ConstantDef>) -> Option<TypeDef> {
    let name = ctx.field_text(node, "name")?;
    let kind = match node.kind() {
        "interface_declaration" => TypeKind::Interface,
        "enum_declaration" => TypeKind::Enum,
        "struct_declaration" | "record_declaration" | "record_struct_declaration" => TypeKind::Struct,
        _ => TypeKind::Class,
    };
    let mods = modifiers(node, ctx);
    let mut ty = TypeDef {
        name,
        kind,
        fields: Vec::new(),
        methods: Vec::new(),
        extends: None,
        implements: Vec::new(),
        variants: Vec::new(),
        alias_of: None,
        generics: child_of_kind(node, &["type_parameter_list"])
            .map(|g| split_generics(ctx.text(g)))
            .unwrap_or_default(),
        doc: clean_xml_doc(ctx.doc(node, &DOC)),
        is_public: mods.iter().any(|m| m == "public"),
        location: ctx.location(node),
        content_hash: ctx.hash(node),
    };

    if let Some(bases) = child_of_kind(node, &["base_list"]) {
        let mut parents: Vec<String> = named_children(bases)
            .into_iter()
            .map(|b| ctx.text(b).trim().to_string())
            .filter(|b| !b.is_empty())
            .collect();
        // A class's first base is its superclass unless it follows the
        // interface naming convention.
        let first_is_class = kind != TypeKind::Interface
            && parents.first().is_some_and(|p| !looks_like_interface(p));
        if first_is_class || kind == TypeKind::Interface {
            if !parents.is_empty() {
                ty.extends = Some(parents.remove(0));
            }
        }
        ty.implements = parents;
    }

    if kind == TypeKind::Struct {
        if let Some(components) = child_of_kind(node, &["parameter_list"]) {
            ty.fields = parameters(components, ctx)
                .into_iter()
                .map(|p| Field {
                    name: p.name,
                    type_: p.type_,
                    readonly: true,
                    default: p.default,
                    ..Default::default()
                })
                .collect();
        }
    }

    let Some(body) = node.child_by_field_name("body") else {
        return Some(ty);
    };
    for member in named_children(body) {
        match member.kind() {
            "enum_member_declaration" => {
                if let Some(variant) = ctx.field_text(member, "name") {
                    ty.variants.push(variant);
                }
            }
            "field_declaration" => member_fields(member, ctx, &mut ty.fields, constants),
            "property_declaration" => {
                if let Some(field) = property(member, ctx) {
                    ty.fields.push(field);
                }
            }
            "method_declaration" if member.child_by_field_name("body").is_none() => {
                if let Some(method) = ctx.field_text(member, "name") {
                    ty.methods.push(method);
                }
            }
            _ => {}
        }
    }
    Some(ty)
}

fn looks_like_interface(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next() == Some('I') && chars.next().is_some_and(|c| c.is_ascii_uppercase())
}

fn member_fields(decl: Node<'_>, ctx: &ExtractCtx<'_>, fields: &mut Vec<Field>, constants: &mut Vec<ConstantDef>) {
    let Some(variables) = child_of_kind(decl, &["variable_declaration"]) else {
        return;
    };
    let mods = modifiers(decl, ctx);
    let is_const = mods.iter().any(|m| m == "const");
    let readonly = is_const || mods.iter().any(|m| m == "readonly");
    let type_ = ctx.field_text(variables, "type");
    let doc = clean_xml_doc(ctx.doc(decl, &DOC));
    for declarator in children_of_kind(variables, &["variable_declarator"]) {
        let Some(name) = ctx.field_text(declarator, "name").or_else(|| {
            child_of_kind(declarator, &["identifier"]).map(|n| ctx.text(n).to_string())
        }) else {
            continue;
        };
        let value = initializer(ctx.text(declarator));
        if is_const {
            constants.push(ConstantDef {
                name: name.clone(),
                type_: type_.clone(),
                value: value.clone(),
                is_public: mods.iter().any(|m| m == "public"),
                location: ctx.location(decl),
                content_hash: ctx.hash(declarator),
            });
        }
        fields.push(Field {
            name,
            optional: type_.as_deref().is_some_and(|t| t.ends_with('?')),
            type_: type_.clone(),
            readonly,
            default: value,
            tags: attribute_text(decl, ctx),
            doc: doc.clone(),
        });
    }
}

fn property(node: Node<'_>, ctx: &ExtractCtx<'_>) -> Option<Field> {
    let name = ctx.field_text(node, "name")?;
    let type_ = ctx.field_text(node, "type");
    let accessors = node.child_by_field_name("accessors").map(|a| ctx.text(a));
    let readonly = match accessors {
        Some(text) => !text.contains("set") && !text.contains("init"),
        None => true,
    };
    let default = node
        .child_by_field_name("value")
        .filter(|v| v.kind() != "arrow_expression_clause")
        .map(|v| collapse_whitespace(ctx.text(v)));
    Some(Field {
        name,
        optional: type_.as_deref().is_some_and(|t| t.ends_with('?')),
        type_,
        readonly,
        default,
        tags: attribute_text(node, ctx),
        doc: clean_xml_doc(ctx.doc(node, &DOC)),
    })
}
