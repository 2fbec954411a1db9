//! Java extraction.

use tree_sitter::Node;

use crate::extract::toolkit::{
    ancestor_of_kind, branching_count, child_of_kind, children_by_field, children_of_kind,
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
    transparent_kinds: &[],
};

const BRANCHES: BranchRules = BranchRules {
    kinds: &[
        "if_statement",
        "for_statement",
        "enhanced_for_statement",
        "while_statement",
        "do_statement",
        "switch_label",
        "catch_clause",
        "ternary_expression",
    ],
    binary_kinds: &["binary_expression"],
    short_circuit_ops: &["&&", "||"],
};

const CALLS: CallRules = CallRules {
    calls: &[
        ("method_invocation", "name"),
        ("object_creation_expression", "type"),
    ],
};

const TYPE_DECLS: &[&str] = &[
    "class_declaration",
    "interface_declaration",
    "enum_declaration",
    "record_declaration",
];

const BODY_SCOPES: &[&str] = &[
    "method_declaration",
    "constructor_declaration",
    "compact_constructor_declaration",
    "lambda_expression",
];

const TEST_ANNOTATIONS: &[&str] = &["Test", "ParameterizedTest", "RepeatedTest", "TestFactory"];

pub struct JavaExtractor;

impl Extractor for JavaExtractor {
    fn language(&self) -> Language {
        Language::Java
    }

    fn extract(&self, root: Node<'_>, ctx: &ExtractCtx<'_>, out: &mut ParseResult) {
        out.namespace = child_of_kind(root, &["package_declaration"])
            .and_then(|p| child_of_kind(p, &["scoped_identifier", "identifier"]))
            .map(|n| ctx.text(n).to_string());
        let package_root = out
            .namespace
            .as_deref()
            .map(|ns| ns.split('.').take(2).collect::<Vec<_>>().join("."));

        for node in children_of_kind(root, &["import_declaration"]) {
            let Some(target) = child_of_kind(node, &["scoped_identifier", "identifier"]) else {
                continue;
            };
            let mut path = ctx.text(target).to_string();
            let wildcard = child_of_kind(node, &["asterisk"]).is_some();
            let names = if wildcard {
                path.push_str(".*");
                vec!["*".to_string()]
            } else {
                path.rsplit('.').next().map(str::to_string).into_iter().collect()
            };
            out.imports.push(Import {
                is_local: package_root
                    .as_deref()
                    .is_some_and(|root| !root.is_empty() && path.starts_with(root)),
                path,
                alias: None,
                names,
                line: node.start_position().row + 1,
            });
        }

        for node in descendants(
            root,
            &["method_declaration", "constructor_declaration", "compact_constructor_declaration"],
        ) {
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

fn modifiers<'t>(node: Node<'t>) -> Option<Node<'t>> {
    child_of_kind(node, &["modifiers"])
}

fn has_modifier(node: Node<'_>, keyword: &str) -> bool {
    modifiers(node).is_some_and(|m| has_token(m, keyword))
}

fn annotations(node: Node<'_>, ctx: &ExtractCtx<'_>) -> Vec<String> {
    let Some(mods) = modifiers(node) else {
        return Vec::new();
    };
    children_of_kind(mods, &["marker_annotation", "annotation"])
        .into_iter()
        .filter_map(|a| ctx.field_text(a, "name"))
        .map(|n| n.rsplit('.').next().unwrap_or(&n).to_string())
        .collect()
}

fn owner_decl(node: Node<'_>) -> Option<Node<'_>> {
    ancestor_of_kind(node, TYPE_DECLS)
}

fn function(node: Node<'_>, ctx: &ExtractCtx<'_>) -> Option<FunctionDef> {
    let name = ctx.field_text(node, "name")?;
    let body = node.child_by_field_name("body");
    let owner = owner_decl(node);
    let in_interface = owner.is_some_and(|o| o.kind() == "interface_declaration");
    let kind = match node.kind() {
        "method_declaration" => FunctionKind::Method,
        _ => FunctionKind::Constructor,
    };
    let parameters = match node.kind() {
        // A compact record constructor takes the record components.
        "compact_constructor_declaration" => owner
            .and_then(|o| o.child_by_field_name("parameters"))
            .map(|p| parameters(p, ctx))
            .unwrap_or_default(),
        _ => node
            .child_by_field_name("parameters")
            .map(|p| parameters(p, ctx))
            .unwrap_or_default(),
    };
    Some(FunctionDef {
        is_test: annotations(node, ctx)
            .iter()
            .any(|a| TEST_ANNOTATIONS.contains(&a.as_str())),
        is_public: has_modifier(node, "public") || in_interface,
        is_async: false,
        is_static: has_modifier(node, "static"),
        kind,
        owner: owner.and_then(|o| ctx.field_text(o, "name")),
        signature: ctx.signature(node, body),
        parameters,
        returns: ctx
            .field_text(node, "type")
            .filter(|t| t != "void")
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
    let mut out = Vec::new();
    for param in named_children(list) {
        match param.kind() {
            "formal_parameter" => {
                if let Some(name) = ctx.field_text(param, "name") {
                    out.push(Parameter {
                        name,
                        type_: ctx.field_text(param, "type"),
                        ..Default::default()
                    });
                }
            }
            "spread_parameter" => {
                let name = child_of_kind(param, &["variable_declarator"])
                    .and_then(|d| ctx.field_text(d, "name"));
                let type_ = named_children(param)
                    .into_iter()
                    .find(|c| !matches!(c.kind(), "modifiers" | "variable_declarator"))
                    .map(|t| ctx.text(t).to_string());
                if let Some(name) = name {
                    out.push(Parameter {
                        name,
                        type_,
                        variadic: true,
                        optional: true,
                        default: None,
                    });
                }
            }
            _ => {}
        }
    }
    out
}

fn type_list(node: Option<Node<'_>>, ctx: &ExtractCtx<'_>) -> Vec<String> {
    let Some(node) = node else {
        return Vec::new();
    };
    let list = child_of_kind(node, &["type_list"]).unwrap_or(node);
    named_children(list)
        .into_iter()
        .map(|t| ctx.text(t).trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

fn type_decl(node: Node<'_>, ctx: &ExtractCtx<'_>, constants: &mut Vec<ConstantDef>) -> Option<TypeDef> {
    let name = ctx.field_text(node, "name")?;
    let kind = match node.kind() {
        "interface_declaration" => TypeKind::Interface,
        "enum_declaration" => TypeKind::Enum,
        "record_declaration" => TypeKind::Struct,
        _ => TypeKind::Class,
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
        is_public: has_modifier(node, "public"),
        location: ctx.location(node),
        content_hash: ctx.hash(node),
    };

    if kind == TypeKind::Interface {
        let mut parents = type_list(child_of_kind(node, &["extends_interfaces"]), ctx).into_iter();
        ty.extends = parents.next();
        ty.implements.extend(parents);
    } else {
        ty.extends = node
            .child_by_field_name("superclass")
            .and_then(|s| named_children(s).into_iter().next())
            .map(|t| ctx.text(t).trim().to_string());
        ty.implements = type_list(node.child_by_field_name("interfaces"), ctx);
    }

    if kind == TypeKind::Struct {
        if let Some(components) = node.child_by_field_name("parameters") {
            ty.fields = parameters(components, ctx)
                .into_iter()
                .map(|p| Field {
                    name: p.name,
                    type_: p.type_,
                    readonly: true,
                    ..Default::default()
                })
                .collect();
        }
    }

    let Some(body) = node.child_by_field_name("body") else {
        return Some(ty);
    };
    let mut members = named_children(body);
    if kind == TypeKind::Enum {
        for constant in children_of_kind(body, &["enum_constant"]) {
            if let Some(variant) = ctx.field_text(constant, "name") {
                ty.variants.push(variant);
            }
        }
        if let Some(rest) = child_of_kind(body, &["enum_body_declarations"]) {
            members = named_children(rest);
        }
    }

    for member in members {
        match member.kind() {
            "field_declaration" | "constant_declaration" => {
                member_fields(member, ctx, kind, &mut ty.fields, constants);
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

/// Every declarator of a field declaration; `static final` ones (and all
/// interface fields) are constants too.
fn member_fields(
    decl: Node<'_>,
    ctx: &ExtractCtx<'_>,
    owner_kind: TypeKind,
    fields: &mut Vec<Field>,
    constants: &mut Vec<ConstantDef>,
) {
    let type_ = ctx.field_text(decl, "type");
    let is_final = has_modifier(decl, "final");
    let is_constant = owner_kind == TypeKind::Interface
        || decl.kind() == "constant_declaration"
        || (is_final && has_modifier(decl, "static"));
    let doc = ctx.doc(decl, &DOC);
    for declarator in children_by_field(decl, "declarator") {
        let Some(name) = ctx.field_text(declarator, "name") else {
            continue;
        };
        let value = ctx.field_text(declarator, "value");
        if is_constant {
            constants.push(ConstantDef {
                name: name.clone(),
                type_: type_.clone(),
                value: value.clone(),
                is_public: has_modifier(decl, "public") || owner_kind == TypeKind::Interface,
                location: ctx.location(decl),
                content_hash: ctx.hash(declarator),
            });
        }
        fields.push(Field {
            name,
            type_: type_.clone(),
            optional: false,
            readonly: is_final || is_constant,
            default: value,
            tags: annotations_text(decl, ctx),
            doc: doc.clone(),
        });
    }
}

fn annotations_text(decl: Node<'_>, ctx: &ExtractCtx<'_>) -> Option<String> {
    let mods = modifiers(decl)?;
    let raw: Vec<&str> = children_of_kind(mods, &["marker_annotation", "annotation"])
        .into_iter()
        .map(|a| ctx.text(a))
        .collect();
    if raw.is_empty() {
        None
    } else {
        Some(raw.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str, file: &str) -> ParseResult {
        JavaExtractor.parse(src.as_bytes(), file).unwrap()
    }

    const SERVICE: &str = r#"package com.example.links;

import java.net.URI;
import java.util.List;
import static java.util.Objects.requireNonNull;
import com.example.links.store.*;

/**
 * Shortens links.
 */
public class Service extends Base implements Shortener, Closeable {
    public static final int MAX_LENGTH = 2048;
    private final Store store;
    @Inject
    protected String prefix = "https://";

    public Service(Store store) {
        this.store = requireNonNull(store);
    }

    // Validates and stores.
    public String shorten(String raw, String... tags) throws Exception {
        URI uri = new URI(raw);
        if (uri.getScheme() == null || uri.getHost() == null) {
            throw new IllegalArgumentException("invalid url");
        }
        for (String tag : tags) {
            store.save(tag);
        }
        return uri.toString();
    }

    private static int helper(int value) {
        return value > 0 ? value : 0;
    }
}

interface Shortener {
    String shorten(String raw, String... tags) throws Exception;
}

enum Status {
    ACTIVE,
    EXPIRED;

    boolean isLive() {
        return this == ACTIVE;
    }
}

record Link(String url, int hits) {}
"#;

    #[test]
    fn test_package_and_imports() {
        let result = parse(SERVICE, "src/main/java/com/example/links/Service.java");
        assert_eq!(result.namespace.as_deref(), Some("com.example.links"));
        assert_eq!(result.imports.len(), 4);
        assert_eq!(result.imports[0].path, "java.net.URI");
        assert_eq!(result.imports[0].names, vec!["URI"]);
        assert!(!result.imports[0].is_local);
        assert_eq!(result.imports[2].path, "java.util.Objects.requireNonNull");
        assert_eq!(result.imports[3].path, "com.example.links.store.*");
        assert!(result.imports[3].is_local);
    }

    #[test]
    fn test_methods() {
        let result = parse(SERVICE, "Service.java");
        let shorten = result.functions.iter().find(|f| f.name == "shorten").unwrap();
        assert_eq!(shorten.kind, FunctionKind::Method);
        assert_eq!(shorten.owner.as_deref(), Some("Service"));
        assert!(shorten.is_public);
        assert_eq!(shorten.doc.as_deref(), Some("Validates and stores."));
        assert_eq!(shorten.returns, vec!["String"]);
        assert_eq!(shorten.parameters.len(), 2);
        assert_eq!(shorten.parameters[0].type_.as_deref(), Some("String"));
        assert!(shorten.parameters[1].variadic);
        // if + `||` + for-each
        assert_eq!(shorten.complexity, 4);
        for call in ["URI", "getScheme", "IllegalArgumentException", "save", "toString"] {
            assert!(shorten.calls.contains(call), "missing {call}");
        }

        let ctor = result.functions.iter().find(|f| f.kind == FunctionKind::Constructor).unwrap();
        assert_eq!(ctor.name, "Service");
        assert!(ctor.calls.contains("requireNonNull"));

        let helper = result.functions.iter().find(|f| f.name == "helper").unwrap();
        assert!(helper.is_static);
        assert!(!helper.is_public);
        assert_eq!(helper.complexity, 2);

        // The interface's abstract method is not a function body.
        assert_eq!(result.functions.iter().filter(|f| f.name == "shorten").count(), 1);
    }

    #[test]
    fn test_types() {
        let result = parse(SERVICE, "Service.java");
        let service = result.types.iter().find(|t| t.name == "Service").unwrap();
        assert_eq!(service.kind, TypeKind::Class);
        assert!(service.is_public);
        assert_eq!(service.doc.as_deref(), Some("Shortens links."));
        assert_eq!(service.extends.as_deref(), Some("Base"));
        assert_eq!(service.implements, vec!["Shortener", "Closeable"]);
        let fields: Vec<&str> = service.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(fields, vec!["MAX_LENGTH", "store", "prefix"]);
        assert!(service.fields[1].readonly);
        assert_eq!(service.fields[2].tags.as_deref(), Some("@Inject"));
        assert_eq!(service.methods, vec!["Service", "shorten", "helper"]);

        let shortener = result.types.iter().find(|t| t.name == "Shortener").unwrap();
        assert_eq!(shortener.kind, TypeKind::Interface);
        assert_eq!(shortener.methods, vec!["shorten"]);

        let status = result.types.iter().find(|t| t.name == "Status").unwrap();
        assert_eq!(status.kind, TypeKind::Enum);
        assert_eq!(status.variants, vec!["ACTIVE", "EXPIRED"]);
        assert_eq!(status.methods, vec!["isLive"]);

        let link = result.types.iter().find(|t| t.name == "Link").unwrap();
        assert_eq!(link.kind, TypeKind::Struct);
        let fields: Vec<&str> = link.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(fields, vec!["url", "hits"]);
    }

    #[test]
    fn test_constants() {
        let result = parse(SERVICE, "Service.java");
        assert_eq!(result.constants.len(), 1);
        assert_eq!(result.constants[0].name, "MAX_LENGTH");
        assert_eq!(result.constants[0].value.as_deref(), Some("2048"));
    }

    #[test]
    fn test_test_annotations() {
        let src = r#"class ServiceTest {
    @Test
    void shortensValidUrl() {}

    @org.junit.jupiter.params.ParameterizedTest
    void rejects(String raw) {}

    void helper() {}
}
"#;
        let result = parse(src, "ServiceTest.java");
        let tests: Vec<&str> = result
            .functions
            .iter()
            .filter(|f| f.is_test)
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(tests, vec!["shortensValidUrl", "rejects"]);
    }
}
