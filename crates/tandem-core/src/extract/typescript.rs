//! TypeScript / TSX extraction.

use tree_sitter::Node;

use crate::extract::toolkit::{
    branching_count, child_of_kind, children_by_field, children_of_kind, clean_type,
    collect_calls, descendants, has_ancestor, has_token, named_children, split_generics,
    strip_string_quotes, BranchRules, CallRules, DocStyle, ExtractCtx,
};
use crate::extract::Extractor;
use crate::models::{
    ConstantDef, Field, FunctionDef, FunctionKind, Import, Language, Parameter, ParseResult,
    TypeDef, TypeKind,
};

const DOC: DocStyle = DocStyle {
    comment_kinds: &["comment"],
    transparent_kinds: &["decorator"],
};

const BRANCHES: BranchRules = BranchRules {
    kinds: &[
        "if_statement",
        "for_statement",
        "for_in_statement",
        "while_statement",
        "do_statement",
        "switch_case",
        "catch_clause",
        "ternary_expression",
    ],
    binary_kinds: &["binary_expression"],
    short_circuit_ops: &["&&", "||", "??"],
};

const CALLS: CallRules = CallRules {
    calls: &[("call_expression", "function"), ("new_expression", "constructor")],
};

/// Scopes whose nested declarations are locals, not module members.
const FUNCTION_SCOPES: &[&str] = &[
    "function_declaration",
    "generator_function_declaration",
    "function_expression",
    "function",
    "arrow_function",
    "method_definition",
];

const FUNCTION_VALUES: &[&str] = &["arrow_function", "function_expression", "function"];

pub struct TypeScriptExtractor;

impl Extractor for TypeScriptExtractor {
    fn language(&self) -> Language {
        Language::TypeScript
    }

    fn extract(&self, root: Node<'_>, ctx: &ExtractCtx<'_>, out: &mut ParseResult) {
        for node in descendants(root, &["import_statement"]) {
            if let Some(import) = import(node, ctx) {
                out.imports.push(import);
            }
        }

        for node in descendants(
            root,
            &[
                "function_declaration",
                "generator_function_declaration",
                "lexical_declaration",
                "variable_declaration",
                "method_definition",
            ],
        ) {
            if has_ancestor(node, FUNCTION_SCOPES) {
                continue;
            }
            match node.kind() {
                "method_definition" => {
                    if let Some(f) = method(node, ctx) {
                        out.functions.push(f);
                    }
                }
                "lexical_declaration" | "variable_declaration" => {
                    variables(node, ctx, &mut out.functions, &mut out.constants);
                }
                _ => {
                    if let Some(f) = function_decl(node, ctx) {
                        out.functions.push(f);
                    }
                }
            }
        }

        for node in descendants(
            root,
            &[
                "class_declaration",
                "abstract_class_declaration",
                "interface_declaration",
                "type_alias_declaration",
                "enum_declaration",
            ],
        ) {
            if has_ancestor(node, FUNCTION_SCOPES) {
                continue;
            }
            let ty = match node.kind() {
                "interface_declaration" => interface(node, ctx),
                "type_alias_declaration" => type_alias(node, ctx),
                "enum_declaration" => enum_decl(node, ctx),
                _ => class(node, ctx),
            };
            if let Some(ty) = ty {
                out.types.push(ty);
            }
        }
    }
}

/// The node whose siblings carry its doc comment: the wrapping
/// `export` statement when there is one.
fn doc_anchor(node: Node<'_>) -> Node<'_> {
    match node.parent() {
        Some(parent) if parent.kind() == "export_statement" => parent,
        _ => node,
    }
}

fn is_exported(node: Node<'_>) -> bool {
    node.parent().is_some_and(|p| p.kind() == "export_statement")
}

fn is_test_file(file: &str) -> bool {
    file.contains(".test.") || file.contains(".spec.") || file.contains("__tests__/")
}

fn import(node: Node<'_>, ctx: &ExtractCtx<'_>) -> Option<Import> {
    let source = node.child_by_field_name("source")?;
    let path = strip_string_quotes(ctx.text(source));
    if path.is_empty() {
        return None;
    }
    let mut names = Vec::new();
    let mut alias = None;
    if let Some(clause) = child_of_kind(node, &["import_clause"]) {
        for part in named_children(clause) {
            match part.kind() {
                "identifier" => names.push(ctx.text(part).to_string()),
                "namespace_import" => {
                    alias = child_of_kind(part, &["identifier"]).map(|n| ctx.text(n).to_string());
                    names.push("*".to_string());
                }
                "named_imports" => {
                    for spec in children_of_kind(part, &["import_specifier"]) {
                        if let Some(name) = ctx
                            .field_text(spec, "alias")
                            .or_else(|| ctx.field_text(spec, "name"))
                        {
                            names.push(name);
                        }
                    }
                }
                _ => {}
            }
        }
    }
    Some(Import {
        is_local: path.starts_with('.') || path.starts_with('/'),
        path,
        alias,
        names,
        line: node.start_position().row + 1,
    })
}

fn parameters(node: Node<'_>, ctx: &ExtractCtx<'_>) -> Vec<Parameter> {
    if let Some(single) = node.child_by_field_name("parameter") {
        return vec![Parameter {
            name: ctx.text(single).to_string(),
            ..Default::default()
        }];
    }
    let Some(list) = node.child_by_field_name("parameters") else {
        return Vec::new();
    };
    named_children(list)
        .into_iter()
        .filter(|p| matches!(p.kind(), "required_parameter" | "optional_parameter"))
        .filter_map(|p| {
            let pattern = p.child_by_field_name("pattern")?;
            let variadic = pattern.kind() == "rest_pattern";
            let name = ctx.text(pattern).trim_start_matches("...").trim().to_string();
            if name.is_empty() || name == "this" {
                return None;
            }
            let default = ctx.field_text(p, "value");
            Some(Parameter {
                name,
                type_: p.child_by_field_name("type").and_then(|t| clean_type(ctx.text(t))),
                optional: p.kind() == "optional_parameter" || default.is_some(),
                default,
                variadic,
            })
        })
        .collect()
}

fn returns(node: Node<'_>, ctx: &ExtractCtx<'_>) -> Vec<String> {
    node.child_by_field_name("return_type")
        .and_then(|r| clean_type(ctx.text(r)))
        .into_iter()
        .collect()
}

fn function_decl(node: Node<'_>, ctx: &ExtractCtx<'_>) -> Option<FunctionDef> {
    let name = ctx.field_text(node, "name")?;
    let body = node.child_by_field_name("body");
    Some(FunctionDef {
        is_test: is_test_file(ctx.file) && name.starts_with("test"),
        is_public: is_exported(node),
        is_async: has_token(node, "async"),
        is_static: false,
        kind: FunctionKind::Function,
        owner: None,
        signature: ctx.signature(node, body),
        parameters: parameters(node, ctx),
        returns: returns(node, ctx),
        doc: ctx.doc(doc_anchor(node), &DOC),
        body: body.map(|b| ctx.text(b).to_string()),
        complexity: branching_count(body, ctx.source, &BRANCHES),
        calls: collect_calls(body, ctx.source, &CALLS),
        location: ctx.location(node),
        content_hash: ctx.hash(node),
        name,
    })
}

/// `const f = (...) => ...` becomes a function; other top-level `const`
/// bindings become constants.
fn variables(
    decl: Node<'_>,
    ctx: &ExtractCtx<'_>,
    functions: &mut Vec<FunctionDef>,
    constants: &mut Vec<ConstantDef>,
) {
    let is_const = decl
        .child_by_field_name("kind")
        .is_some_and(|k| ctx.text(k) == "const");
    let exported = is_exported(decl);
    for declarator in children_of_kind(decl, &["variable_declarator"]) {
        let Some(name_node) = declarator.child_by_field_name("name") else {
            continue;
        };
        if name_node.kind() != "identifier" {
            continue;
        }
        let name = ctx.text(name_node).to_string();
        let value = declarator.child_by_field_name("value");

        if let Some(func) = value.filter(|v| FUNCTION_VALUES.contains(&v.kind())) {
            let body = func.child_by_field_name("body");
            functions.push(FunctionDef {
                is_test: is_test_file(ctx.file) && name.starts_with("test"),
                is_public: exported,
                is_async: has_token(func, "async"),
                is_static: false,
                kind: FunctionKind::Function,
                owner: None,
                signature: ctx.signature(decl, body),
                parameters: parameters(func, ctx),
                returns: returns(func, ctx),
                doc: ctx.doc(doc_anchor(decl), &DOC),
                body: body.map(|b| ctx.text(b).to_string()),
                complexity: branching_count(body, ctx.source, &BRANCHES),
                calls: collect_calls(body, ctx.source, &CALLS),
                location: ctx.location(decl),
                content_hash: ctx.hash(declarator),
                name,
            });
            continue;
        }

        if is_const && decl.parent().is_some_and(|p| matches!(p.kind(), "program" | "export_statement")) {
            constants.push(ConstantDef {
                name,
                type_: declarator.child_by_field_name("type").and_then(|t| clean_type(ctx.text(t))),
                value: value.map(|v| ctx.text(v).trim().to_string()),
                is_public: exported,
                location: ctx.location(decl),
                content_hash: ctx.hash(declarator),
            });
        }
    }
}

fn enclosing_type_name(node: Node<'_>, ctx: &ExtractCtx<'_>) -> Option<String> {
    let body = node.parent()?;
    let owner = body.parent()?;
    ctx.field_text(owner, "name")
}

fn member_is_public(node: Node<'_>, ctx: &ExtractCtx<'_>, name: &str) -> bool {
    let restricted = child_of_kind(node, &["accessibility_modifier"])
        .is_some_and(|m| matches!(ctx.text(m), "private" | "protected"));
    !restricted && !name.starts_with('#')
}

fn method(node: Node<'_>, ctx: &ExtractCtx<'_>) -> Option<FunctionDef> {
    let name = ctx.field_text(node, "name")?;
    let body = node.child_by_field_name("body");
    let owner = enclosing_type_name(node, ctx);
    Some(FunctionDef {
        is_test: is_test_file(ctx.file) && name.starts_with("test"),
        is_public: member_is_public(node, ctx, &name),
        is_async: has_token(node, "async"),
        is_static: has_token(node, "static"),
        kind: if name == "constructor" {
            FunctionKind::Constructor
        } else {
            FunctionKind::Method
        },
        owner,
        signature: ctx.signature(node, body),
        parameters: parameters(node, ctx),
        returns: returns(node, ctx),
        doc: ctx.doc(node, &DOC),
        body: body.map(|b| ctx.text(b).to_string()),
        complexity: branching_count(body, ctx.source, &BRANCHES),
        calls: collect_calls(body, ctx.source, &CALLS),
        location: ctx.location(node),
        content_hash: ctx.hash(node),
        name,
    })
}

fn generics(node: Node<'_>, ctx: &ExtractCtx<'_>) -> Vec<String> {
    node.child_by_field_name("type_parameters")
        .map(|g| split_generics(ctx.text(g)))
        .unwrap_or_default()
}

fn new_type(node: Node<'_>, ctx: &ExtractCtx<'_>, name: String, kind: TypeKind) -> TypeDef {
    TypeDef {
        name,
        kind,
        fields: Vec::new(),
        methods: Vec::new(),
        extends: None,
        implements: Vec::new(),
        variants: Vec::new(),
        alias_of: None,
        generics: generics(node, ctx),
        doc: ctx.doc(doc_anchor(node), &DOC),
        is_public: is_exported(node),
        location: ctx.location(node),
        content_hash: ctx.hash(node),
    }
}

fn property_field(node: Node<'_>, ctx: &ExtractCtx<'_>) -> Option<Field> {
    Some(Field {
        name: ctx.field_text(node, "name")?,
        type_: node.child_by_field_name("type").and_then(|t| clean_type(ctx.text(t))),
        optional: has_token(node, "?"),
        readonly: has_token(node, "readonly"),
        default: ctx.field_text(node, "value"),
        tags: None,
        doc: ctx.doc(node, &DOC),
    })
}

fn class(node: Node<'_>, ctx: &ExtractCtx<'_>) -> Option<TypeDef> {
    let name = ctx.field_text(node, "name")?;
    let mut ty = new_type(node, ctx, name, TypeKind::Class);

    if let Some(heritage) = child_of_kind(node, &["class_heritage"]) {
        for clause in named_children(heritage) {
            match clause.kind() {
                "extends_clause" => {
                    ty.extends = clause
                        .child_by_field_name("value")
                        .or_else(|| named_children(clause).into_iter().next())
                        .map(|v| ctx.text(v).trim().to_string());
                }
                "implements_clause" => {
                    ty.implements
                        .extend(named_children(clause).into_iter().map(|t| ctx.text(t).trim().to_string()));
                }
                _ => {}
            }
        }
    }

    let Some(body) = node.child_by_field_name("body") else {
        return Some(ty);
    };
    for member in named_children(body) {
        match member.kind() {
            "public_field_definition" => {
                if let Some(field) = property_field(member, ctx) {
                    ty.fields.push(field);
                }
            }
            "abstract_method_signature" | "method_signature" => {
                if let Some(name) = ctx.field_text(member, "name") {
                    ty.methods.push(name);
                }
            }
            "method_definition" if ctx.field_text(member, "name").as_deref() == Some("constructor") => {
                parameter_properties(member, ctx, &mut ty.fields);
            }
            _ => {}
        }
    }
    Some(ty)
}

/// `constructor(private store: Store)` declares a field.
fn parameter_properties(ctor: Node<'_>, ctx: &ExtractCtx<'_>, fields: &mut Vec<Field>) {
    let Some(list) = ctor.child_by_field_name("parameters") else {
        return;
    };
    for param in named_children(list) {
        if child_of_kind(param, &["accessibility_modifier"]).is_none() && !has_token(param, "readonly") {
            continue;
        }
        let Some(name) = ctx.field_text(param, "pattern") else {
            continue;
        };
        fields.push(Field {
            name,
            type_: param.child_by_field_name("type").and_then(|t| clean_type(ctx.text(t))),
            optional: param.kind() == "optional_parameter",
            readonly: has_token(param, "readonly"),
            default: ctx.field_text(param, "value"),
            tags: None,
            doc: None,
        });
    }
}

fn object_members(body: Node<'_>, ctx: &ExtractCtx<'_>, ty: &mut TypeDef) {
    for member in named_children(body) {
        match member.kind() {
            "property_signature" => {
                if let Some(field) = property_field(member, ctx) {
                    ty.fields.push(field);
                }
            }
            "method_signature" => {
                if let Some(name) = ctx.field_text(member, "name") {
                    ty.methods.push(name);
                }
            }
            _ => {}
        }
    }
}

fn interface(node: Node<'_>, ctx: &ExtractCtx<'_>) -> Option<TypeDef> {
    let name = ctx.field_text(node, "name")?;
    let mut ty = new_type(node, ctx, name, TypeKind::Interface);
    if let Some(clause) = child_of_kind(node, &["extends_type_clause"]) {
        let mut parents = children_by_field(clause, "type");
        if parents.is_empty() {
            parents = named_children(clause);
        }
        let mut parents = parents.into_iter().map(|p| ctx.text(p).trim().to_string());
        ty.extends = parents.next();
        ty.implements.extend(parents);
    }
    if let Some(body) = node.child_by_field_name("body") {
        object_members(body, ctx, &mut ty);
    }
    Some(ty)
}

fn type_alias(node: Node<'_>, ctx: &ExtractCtx<'_>) -> Option<TypeDef> {
    let name = ctx.field_text(node, "name")?;
    let value = node.child_by_field_name("value");
    let kind = match value.map(|v| v.kind()) {
        Some("union_type") => TypeKind::Union,
        Some("object_type") => TypeKind::Struct,
        _ => TypeKind::Alias,
    };
    let mut ty = new_type(node, ctx, name, kind);
    match (kind, value) {
        (TypeKind::Struct, Some(object)) => object_members(object, ctx, &mut ty),
        (_, Some(value)) => ty.alias_of = clean_type(ctx.text(value)),
        _ => {}
    }
    if kind == TypeKind::Union {
        ty.variants = ctx
            .text(value?)
            .split('|')
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect();
    }
    Some(ty)
}

fn enum_decl(node: Node<'_>, ctx: &ExtractCtx<'_>) -> Option<TypeDef> {
    let name = ctx.field_text(node, "name")?;
    let mut ty = new_type(node, ctx, name, TypeKind::Enum);
    if let Some(body) = node.child_by_field_name("body") {
        for member in named_children(body) {
            let variant = match member.kind() {
                "enum_assignment" => ctx.field_text(member, "name"),
                "comment" => None,
                _ => Some(strip_string_quotes(ctx.text(member))),
            };
            if let Some(v) = variant.filter(|v| !v.is_empty()) {
                ty.variants.push(v);
            }
        }
    }
    Some(ty)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str, file: &str) -> ParseResult {
        TypeScriptExtractor.parse(src.as_bytes(), file).unwrap()
    }

    const SERVICE: &str = r#"import { Request, Response as Res } from "express";
import * as path from "path";
import Config from "./config";

export const MAX_LENGTH = 2048;
const prefix = "https://";

// Link status.
export enum Status {
  Active = "active",
  Expired,
}

export type Id = string | number;

export interface Store extends Base {
  readonly name: string;
  ttl?: number;
  save(link: Link): Promise<void>;
}

/** Shortens links. */
export class Service extends Base implements Shortener, Disposable {
  private readonly cache: Map<string, string> = new Map();
  count = 0;

  constructor(private store: Store) {
    super();
  }

  // Validates and stores.
  async shorten(raw: string, ...tags: string[]): Promise<string> {
    const url = new URL(raw);
    if (!url.protocol || !url.host) {
      throw new Error("invalid url");
    }
    for (const tag of tags) {
      await this.store.save(tag);
    }
    return url.toString();
  }

  static create(): Service {
    return new Service(defaultStore());
  }
}

export const handler = async (req: Request, opts?: Options): Promise<void> => {
  return req.ok ? undefined : undefined;
};

function helper(value: number = 1): number {
  return value;
}
"#;

    #[test]
    fn test_imports() {
        let result = parse(SERVICE, "src/service.ts");
        assert_eq!(result.imports.len(), 3);
        assert_eq!(result.imports[0].path, "express");
        assert_eq!(result.imports[0].names, vec!["Request", "Res"]);
        assert!(!result.imports[0].is_local);
        assert_eq!(result.imports[1].alias.as_deref(), Some("path"));
        assert!(result.imports[2].is_local);
        assert_eq!(result.imports[2].names, vec!["Config"]);
    }

    #[test]
    fn test_class_members() {
        let result = parse(SERVICE, "src/service.ts");
        let shorten = result.functions.iter().find(|f| f.name == "shorten").unwrap();
        assert_eq!(shorten.kind, FunctionKind::Method);
        assert_eq!(shorten.owner.as_deref(), Some("Service"));
        assert!(shorten.is_async);
        assert_eq!(shorten.doc.as_deref(), Some("Validates and stores."));
        assert_eq!(shorten.returns, vec!["Promise<string>"]);
        assert_eq!(shorten.parameters.len(), 2);
        assert!(shorten.parameters[1].variadic);
        assert_eq!(shorten.parameters[1].name, "tags");
        // if + `||` + for-of
        assert_eq!(shorten.complexity, 4);
        assert!(shorten.calls.contains("URL"));
        assert!(shorten.calls.contains("Error"));
        assert!(shorten.calls.contains("save"));

        let create = result.functions.iter().find(|f| f.name == "create").unwrap();
        assert!(create.is_static);

        let ctor = result.functions.iter().find(|f| f.name == "constructor").unwrap();
        assert_eq!(ctor.kind, FunctionKind::Constructor);
    }

    #[test]
    fn test_arrow_and_plain_functions() {
        let result = parse(SERVICE, "src/service.ts");
        let handler = result.functions.iter().find(|f| f.name == "handler").unwrap();
        assert_eq!(handler.kind, FunctionKind::Function);
        assert!(handler.is_public);
        assert!(handler.is_async);
        assert_eq!(handler.complexity, 2);
        assert_eq!(handler.parameters.len(), 2);
        assert!(handler.parameters[1].optional);
        assert_eq!(handler.returns, vec!["Promise<void>"]);

        let helper = result.functions.iter().find(|f| f.name == "helper").unwrap();
        assert!(!helper.is_public);
        assert_eq!(helper.parameters[0].default.as_deref(), Some("1"));
        assert!(helper.parameters[0].optional);
        assert_eq!(helper.signature, "function helper(value: number = 1): number");
    }

    #[test]
    fn test_types() {
        let result = parse(SERVICE, "src/service.ts");
        let status = result.types.iter().find(|t| t.name == "Status").unwrap();
        assert_eq!(status.kind, TypeKind::Enum);
        assert_eq!(status.variants, vec!["Active", "Expired"]);
        assert_eq!(status.doc.as_deref(), Some("Link status."));

        let id = result.types.iter().find(|t| t.name == "Id").unwrap();
        assert_eq!(id.kind, TypeKind::Union);
        assert_eq!(id.variants, vec!["string", "number"]);

        let store = result.types.iter().find(|t| t.name == "Store").unwrap();
        assert_eq!(store.kind, TypeKind::Interface);
        assert_eq!(store.extends.as_deref(), Some("Base"));
        assert_eq!(store.methods, vec!["save"]);
        assert!(store.fields[0].readonly);
        assert!(store.fields[1].optional);

        let service = result.types.iter().find(|t| t.name == "Service").unwrap();
        assert_eq!(service.kind, TypeKind::Class);
        assert_eq!(service.doc.as_deref(), Some("Shortens links."));
        assert_eq!(service.extends.as_deref(), Some("Base"));
        assert_eq!(service.implements, vec!["Shortener", "Disposable"]);
        let fields: Vec<&str> = service.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(fields, vec!["cache", "count", "store"]);
        assert!(service.fields[0].readonly);
        assert_eq!(service.fields[0].type_.as_deref(), Some("Map<string, string>"));
        assert_eq!(service.methods, vec!["constructor", "shorten", "create"]);
    }

    #[test]
    fn test_constants() {
        let result = parse(SERVICE, "src/service.ts");
        let names: Vec<&str> = result.constants.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["MAX_LENGTH", "prefix"]);
        assert!(result.constants[0].is_public);
        assert!(!result.constants[1].is_public);
    }

    #[test]
    fn test_tsx_component() {
        let src = "export function App(props: Props) {\n  return props.ok ? <div/> : <span/>;\n}\n";
        let result = parse(src, "src/App.tsx");
        assert!(!result.has_syntax_errors);
        assert_eq!(result.functions[0].name, "App");
        assert_eq!(result.functions[0].complexity, 2);
    }
}
