//! Python extraction.

use tree_sitter::Node;

use crate::extract::toolkit::{
    ancestor_of_kind, branching_count, children_by_field, children_of_kind, clean_type,
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
        "elif_clause",
        "for_statement",
        "while_statement",
        "except_clause",
        "except_group_clause",
        "boolean_operator",
        "conditional_expression",
        "case_clause",
        "for_in_clause",
        "if_clause",
    ],
    binary_kinds: &[],
    short_circuit_ops: &[],
};

const CALLS: CallRules = CallRules {
    calls: &[("call", "function")],
};

const ENUM_BASES: &[&str] = &["Enum", "IntEnum", "StrEnum", "Flag", "IntFlag"];
const INTERFACE_BASES: &[&str] = &["Protocol", "ABC"];
const STRUCT_BASES: &[&str] = &["TypedDict", "NamedTuple", "BaseModel"];

pub struct PythonExtractor;

impl Extractor for PythonExtractor {
    fn language(&self) -> Language {
        Language::Python
    }

    fn extract(&self, root: Node<'_>, ctx: &ExtractCtx<'_>, out: &mut ParseResult) {
        out.namespace = Some(module_name(ctx.file));

        for node in descendants(root, &["import_statement", "import_from_statement"]) {
            imports(node, ctx, &mut out.imports);
        }

        for node in descendants(root, &["function_definition"]) {
            if has_ancestor(node, &["function_definition"]) {
                continue;
            }
            if let Some(function) = function(node, ctx) {
                out.functions.push(function);
            }
        }

        for node in descendants(root, &["class_definition"]) {
            if has_ancestor(node, &["function_definition"]) {
                continue;
            }
            if let Some(ty) = class_def(node, ctx) {
                out.types.push(ty);
            }
        }

        for node in descendants(root, &["type_alias_statement"]) {
            let Some(name) = node
                .child_by_field_name("left")
                .map(|n| ctx.text(n).to_string())
                .filter(|n| !n.is_empty())
            else {
                continue;
            };
            out.types.push(TypeDef {
                is_public: !name.starts_with('_'),
                name,
                kind: TypeKind::Alias,
                fields: Vec::new(),
                methods: Vec::new(),
                extends: None,
                implements: Vec::new(),
                variants: Vec::new(),
                alias_of: ctx.field_text(node, "right"),
                generics: Vec::new(),
                doc: ctx.doc(node, &DOC),
                location: ctx.location(node),
                content_hash: ctx.hash(node),
            });
        }

        for statement in children_of_kind(root, &["expression_statement"]) {
            for assignment in children_of_kind(statement, &["assignment"]) {
                let Some(name) = ctx.field_text(assignment, "left") else {
                    continue;
                };
                if !is_constant_name(&name) {
                    continue;
                }
                out.constants.push(ConstantDef {
                    name,
                    type_: ctx.field_text(assignment, "type"),
                    value: ctx.field_text(assignment, "right"),
                    is_public: true,
                    location: ctx.location(statement),
                    content_hash: ctx.hash(statement),
                });
            }
        }
    }
}

/// `pkg/sub/mod.py` -> `pkg.sub.mod`; `pkg/__init__.py` -> `pkg`.
fn module_name(file: &str) -> String {
    let normalized = file.replace('\\', "/");
    let stem = normalized
        .trim_end_matches(".pyi")
        .trim_end_matches(".py")
        .trim_end_matches("/__init__");
    stem.split('/')
        .filter(|s| !s.is_empty() && *s != "." && *s != "src")
        .collect::<Vec<_>>()
        .join(".")
}

fn is_constant_name(name: &str) -> bool {
    name.chars().any(|c| c.is_ascii_uppercase())
        && name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

fn imports(node: Node<'_>, ctx: &ExtractCtx<'_>, out: &mut Vec<Import>) {
    let line = node.start_position().row + 1;
    if node.kind() == "import_statement" {
        for name in children_by_field(node, "name") {
            let (path, alias) = dotted_or_aliased(name, ctx);
            if path.is_empty() {
                continue;
            }
            out.push(Import {
                names: vec![alias.clone().unwrap_or_else(|| path.clone())],
                is_local: false,
                path,
                alias,
                line,
            });
        }
        return;
    }

    let Some(module) = ctx.field_text(node, "module_name") else {
        return;
    };
    let mut names = Vec::new();
    for name in children_by_field(node, "name") {
        let (path, alias) = dotted_or_aliased(name, ctx);
        if !path.is_empty() {
            names.push(alias.unwrap_or(path));
        }
    }
    if !children_of_kind(node, &["wildcard_import"]).is_empty() {
        names.push("*".to_string());
    }
    out.push(Import {
        is_local: module.starts_with('.'),
        path: module,
        alias: None,
        names,
        line,
    });
}

fn dotted_or_aliased(node: Node<'_>, ctx: &ExtractCtx<'_>) -> (String, Option<String>) {
    if node.kind() == "aliased_import" {
        let path = ctx.field_text(node, "name").unwrap_or_default();
        (path, ctx.field_text(node, "alias"))
    } else {
        (ctx.text(node).trim().to_string(), None)
    }
}

fn decorators<'t>(node: Node<'t>, ctx: &ExtractCtx<'_>) -> (Node<'t>, Vec<String>) {
    match node.parent() {
        Some(parent) if parent.kind() == "decorated_definition" => {
            let names = children_of_kind(parent, &["decorator"])
                .into_iter()
                .map(|d| ctx.text(d).trim_start_matches('@').trim().to_string())
                .collect();
            (parent, names)
        }
        _ => (node, Vec::new()),
    }
}

/// Leading string statement of a block.
fn docstring(body: Option<Node<'_>>, ctx: &ExtractCtx<'_>) -> Option<String> {
    let first = named_children(body?).into_iter().find(|n| n.kind() != "comment")?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let string = named_children(first).into_iter().next()?;
    if string.kind() != "string" {
        return None;
    }
    let doc = strip_string_quotes(ctx.text(string));
    if doc.is_empty() {
        None
    } else {
        Some(doc)
    }
}

fn enclosing_class(node: Node<'_>, ctx: &ExtractCtx<'_>) -> Option<String> {
    let class = ancestor_of_kind(node, &["class_definition", "function_definition"])?;
    if class.kind() != "class_definition" {
        return None;
    }
    ctx.field_text(class, "name")
}

fn function(node: Node<'_>, ctx: &ExtractCtx<'_>) -> Option<FunctionDef> {
    let name = ctx.field_text(node, "name")?;
    let body = node.child_by_field_name("body");
    let (anchor, decorators) = decorators(node, ctx);
    let owner = enclosing_class(node, ctx);
    let is_static = decorators
        .iter()
        .any(|d| d == "staticmethod" || d == "classmethod");
    let kind = match (&owner, name.as_str()) {
        (Some(_), "__init__") => FunctionKind::Constructor,
        (Some(_), _) => FunctionKind::Method,
        (None, _) => FunctionKind::Function,
    };

    let mut parameters: Vec<Parameter> = node
        .child_by_field_name("parameters")
        .map(|p| named_children(p).into_iter().filter_map(|n| parameter(n, ctx)).collect())
        .unwrap_or_default();
    if owner.is_some() && !decorators.iter().any(|d| d == "staticmethod") {
        if let Some(first) = parameters.first() {
            if first.name == "self" || first.name == "cls" {
                parameters.remove(0);
            }
        }
    }

    let file_stem = ctx.file.rsplit('/').next().unwrap_or(ctx.file);
    let in_test_module = file_stem.starts_with("test_") || file_stem.ends_with("_test.py");
    let in_test_class = owner.as_deref().is_some_and(|o| o.starts_with("Test"));

    Some(FunctionDef {
        is_public: !name.starts_with('_') || (name.starts_with("__") && name.ends_with("__")),
        is_test: name.starts_with("test") && (in_test_module || in_test_class),
        is_async: has_token(node, "async"),
        is_static,
        kind,
        owner,
        signature: ctx.signature(node, body),
        parameters,
        returns: node
            .child_by_field_name("return_type")
            .and_then(|r| clean_type(ctx.text(r)))
            .into_iter()
            .collect(),
        doc: docstring(body, ctx).or_else(|| ctx.doc(anchor, &DOC)),
        body: body.map(|b| ctx.text(b).to_string()),
        complexity: branching_count(body, ctx.source, &BRANCHES),
        calls: collect_calls(body, ctx.source, &CALLS),
        location: ctx.location(node),
        content_hash: ctx.hash(node),
        name,
    })
}

fn parameter(node: Node<'_>, ctx: &ExtractCtx<'_>) -> Option<Parameter> {
    let splat_name = |n: Node<'_>| ctx.text(n).trim_start_matches('*').trim().to_string();
    let param = match node.kind() {
        "identifier" => Parameter {
            name: ctx.text(node).to_string(),
            ..Default::default()
        },
        "typed_parameter" => {
            let inner = named_children(node).into_iter().next()?;
            let variadic = inner.kind() != "identifier";
            Parameter {
                name: splat_name(inner),
                type_: ctx.field_text(node, "type"),
                variadic,
                ..Default::default()
            }
        }
        "default_parameter" | "typed_default_parameter" => Parameter {
            name: ctx.field_text(node, "name")?,
            type_: ctx.field_text(node, "type"),
            default: ctx.field_text(node, "value"),
            optional: true,
            variadic: false,
        },
        "list_splat_pattern" | "dictionary_splat_pattern" => Parameter {
            name: splat_name(node),
            variadic: true,
            optional: true,
            ..Default::default()
        },
        _ => return None,
    };
    if param.name.is_empty() {
        None
    } else {
        Some(param)
    }
}

fn class_def(node: Node<'_>, ctx: &ExtractCtx<'_>) -> Option<TypeDef> {
    let name = ctx.field_text(node, "name")?;
    let body = node.child_by_field_name("body");
    let (anchor, decorators) = decorators(node, ctx);

    let mut bases: Vec<String> = Vec::new();
    let mut generics: Vec<String> = node
        .child_by_field_name("type_parameters")
        .map(|g| split_generics(ctx.text(g)))
        .unwrap_or_default();
    if let Some(args) = node.child_by_field_name("superclasses") {
        for arg in named_children(args) {
            if arg.kind() == "keyword_argument" {
                continue;
            }
            let text = ctx.text(arg).trim().to_string();
            if let Some(params) = text.strip_prefix("Generic") {
                generics.extend(split_generics(params));
                continue;
            }
            bases.push(text);
        }
    }
    let base_name = |b: &String| b.rsplit('.').next().unwrap_or(b).to_string();
    let kind = if bases.iter().any(|b| ENUM_BASES.contains(&base_name(b).as_str())) {
        TypeKind::Enum
    } else if bases
        .iter()
        .any(|b| INTERFACE_BASES.contains(&base_name(b).as_str()))
    {
        TypeKind::Interface
    } else if decorators.iter().any(|d| d.starts_with("dataclass"))
        || bases.iter().any(|b| STRUCT_BASES.contains(&base_name(b).as_str()))
    {
        TypeKind::Struct
    } else {
        TypeKind::Class
    };

    let mut fields: Vec<Field> = Vec::new();
    let mut variants: Vec<String> = Vec::new();
    if let Some(body) = body {
        for statement in children_of_kind(body, &["expression_statement"]) {
            for assignment in children_of_kind(statement, &["assignment"]) {
                let Some(field_name) = ctx.field_text(assignment, "left") else {
                    continue;
                };
                if kind == TypeKind::Enum {
                    variants.push(field_name);
                    continue;
                }
                let type_ = ctx.field_text(assignment, "type");
                fields.push(Field {
                    optional: type_.as_deref().is_some_and(|t| t.starts_with("Optional") || t.contains("None")),
                    readonly: type_.as_deref().is_some_and(|t| t.starts_with("Final") || t.starts_with("ClassVar")),
                    name: field_name,
                    type_,
                    default: ctx.field_text(assignment, "right"),
                    tags: None,
                    doc: ctx.doc(statement, &DOC),
                });
            }
        }
        instance_fields(body, ctx, &mut fields);
    }

    let is_interface = kind == TypeKind::Interface;
    let mut parents = bases.into_iter();
    let (extends, implements) = if is_interface {
        (None, parents.collect())
    } else {
        (parents.next(), parents.collect())
    };

    Some(TypeDef {
        is_public: !name.starts_with('_'),
        name,
        kind,
        fields,
        methods: Vec::new(),
        extends,
        implements,
        variants,
        alias_of: None,
        generics,
        doc: docstring(body, ctx).or_else(|| ctx.doc(anchor, &DOC)),
        location: ctx.location(node),
        content_hash: ctx.hash(node),
    })
}

/// `self.x = ...` assignments inside `__init__`.
fn instance_fields(body: Node<'_>, ctx: &ExtractCtx<'_>, fields: &mut Vec<Field>) {
    for def in descendants(body, &["function_definition"]) {
        if ctx.field_text(def, "name").as_deref() != Some("__init__") {
            continue;
        }
        for assignment in descendants(def, &["assignment"]) {
            let Some(left) = assignment.child_by_field_name("left") else {
                continue;
            };
            if left.kind() != "attribute" {
                continue;
            }
            if ctx.field_text(left, "object").as_deref() != Some("self") {
                continue;
            }
            let Some(name) = ctx.field_text(left, "attribute") else {
                continue;
            };
            if fields.iter().any(|f| f.name == name) {
                continue;
            }
            fields.push(Field {
                name,
                type_: ctx.field_text(assignment, "type"),
                default: ctx.field_text(assignment, "right"),
                ..Default::default()
            });
        }
    }
}
