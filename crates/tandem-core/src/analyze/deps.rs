//! Partition import paths into stdlib, local and external dependencies.

use std::collections::{BTreeMap, BTreeSet};

use crate::models::{Dependency, DependencyKind, Language, ParseResult};

const PYTHON_STDLIB: &[&str] = &[
    "__future__", "abc", "argparse", "array", "ast", "asyncio", "base64", "bisect", "builtins",
    "calendar", "collections", "concurrent", "contextlib", "copy", "csv", "dataclasses",
    "datetime", "decimal", "difflib", "email", "enum", "errno", "fnmatch", "fractions",
    "functools", "gc", "getpass", "glob", "gzip", "hashlib", "heapq", "hmac", "html", "http",
    "importlib", "inspect", "io", "ipaddress", "itertools", "json", "logging", "math",
    "mimetypes", "multiprocessing", "operator", "os", "pathlib", "pickle", "platform",
    "pprint", "queue", "random", "re", "secrets", "select", "shlex", "shutil", "signal",
    "socket", "sqlite3", "ssl", "stat", "statistics", "string", "struct", "subprocess", "sys",
    "tempfile", "textwrap", "threading", "time", "timeit", "tomllib", "traceback", "types",
    "typing", "unittest", "urllib", "uuid", "warnings", "weakref", "xml", "zipfile", "zlib",
];

const NODE_BUILTINS: &[&str] = &[
    "assert", "buffer", "child_process", "cluster", "crypto", "dgram", "dns", "events", "fs",
    "http", "http2", "https", "net", "os", "path", "perf_hooks", "process", "querystring",
    "readline", "stream", "string_decoder", "timers", "tls", "url", "util", "v8", "vm",
    "worker_threads", "zlib",
];

const JAVA_STDLIB_PREFIXES: &[&str] = &["java", "javax", "jdk", "sun", "com.sun", "org.w3c", "org.xml"];

const RUST_STDLIB: &[&str] = &["std", "core", "alloc", "proc_macro", "test"];

const CSHARP_STDLIB_PREFIXES: &[&str] = &["System", "Microsoft.CSharp", "Microsoft.Win32"];

/// `path` is `prefix` or continues it past a separator.
fn has_prefix(path: &str, prefix: &str) -> bool {
    if prefix.is_empty() || !path.starts_with(prefix) {
        return false;
    }
    matches!(path[prefix.len()..].chars().next(), None | Some('.' | '/' | ':'))
}

pub fn is_stdlib(path: &str, language: Language) -> bool {
    match language {
        Language::Go => {
            let head = path.split('/').next().unwrap_or(path);
            !head.contains('.') && !path.starts_with('.')
        }
        Language::Python => {
            let head = path.split('.').next().unwrap_or(path);
            PYTHON_STDLIB.contains(&head)
        }
        Language::TypeScript => {
            if path.starts_with("node:") {
                return true;
            }
            let head = path.split('/').next().unwrap_or(path);
            NODE_BUILTINS.contains(&head)
        }
        Language::Java => JAVA_STDLIB_PREFIXES.iter().any(|p| has_prefix(path, p)),
        Language::Rust => {
            let head = path.split("::").next().unwrap_or(path);
            RUST_STDLIB.contains(&head)
        }
        Language::CSharp => CSHARP_STDLIB_PREFIXES.iter().any(|p| has_prefix(path, p)),
    }
}

/// Classify one import path. Local evidence wins over the stdlib table so a
/// project module shadowing a stdlib name is still reported as local.
pub fn classify(
    path: &str,
    language: Language,
    local_hint: bool,
    local_roots: &BTreeSet<String>,
) -> DependencyKind {
    let local = local_hint
        || local_roots
            .iter()
            .any(|root| has_prefix(path, root) || has_prefix(root, path));
    if local {
        DependencyKind::Local
    } else if is_stdlib(path, language) {
        DependencyKind::Stdlib
    } else {
        DependencyKind::External
    }
}

/// Roots that mark an import as project-local: the manifest's module root
/// plus every declared namespace. Go package names and Rust module paths are
/// file-relative and are not useful as roots.
pub fn local_roots(files: &[ParseResult], language: Language, module_root: Option<&str>) -> BTreeSet<String> {
    let mut roots = BTreeSet::new();
    if let Some(root) = module_root.filter(|r| !r.is_empty()) {
        roots.insert(root.to_string());
        if language == Language::Rust {
            roots.insert(root.replace('-', "_"));
        }
    }
    if matches!(language, Language::Python | Language::Java | Language::CSharp) {
        for namespace in files.iter().filter_map(|f| f.namespace.as_deref()) {
            if !namespace.is_empty() {
                roots.insert(namespace.to_string());
            }
        }
    }
    roots
}

/// Distinct import paths across `files`, each classified once, sorted by path.
pub fn partition(files: &[ParseResult], language: Language, module_root: Option<&str>) -> Vec<Dependency> {
    let roots = local_roots(files, language, module_root);
    let mut by_path: BTreeMap<String, DependencyKind> = BTreeMap::new();
    for import in files.iter().flat_map(|f| f.imports.iter()) {
        if import.path.is_empty() {
            continue;
        }
        let kind = classify(&import.path, language, import.is_local, &roots);
        by_path
            .entry(import.path.clone())
            .and_modify(|existing| {
                if kind == DependencyKind::Local {
                    *existing = kind;
                }
            })
            .or_insert(kind);
    }
    by_path
        .into_iter()
        .map(|(path, kind)| Dependency { path, kind })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Import;

    fn file_with_imports(namespace: Option<&str>, language: Language, paths: &[(&str, bool)]) -> ParseResult {
        let mut result = ParseResult::empty("f", language);
        result.namespace = namespace.map(str::to_string);
        result.imports = paths
            .iter()
            .map(|(path, is_local)| Import {
                path: path.to_string(),
                is_local: *is_local,
                ..Default::default()
            })
            .collect();
        result
    }

    fn kinds(deps: &[Dependency]) -> Vec<(&str, DependencyKind)> {
        deps.iter().map(|d| (d.path.as_str(), d.kind)).collect()
    }

    #[test]
    fn test_go_partition_with_module_root() {
        let file = file_with_imports(
            Some("main"),
            Language::Go,
            &[
                ("fmt", false),
                ("net/http", false),
                ("github.com/acme/links/internal/store", false),
                ("github.com/google/uuid", false),
                ("fmt", false),
            ],
        );
        let deps = partition(&[file], Language::Go, Some("github.com/acme/links"));
        assert_eq!(
            kinds(&deps),
            vec![
                ("fmt", DependencyKind::Stdlib),
                ("github.com/acme/links/internal/store", DependencyKind::Local),
                ("github.com/google/uuid", DependencyKind::External),
                ("net/http", DependencyKind::Stdlib),
            ]
        );
    }

    #[test]
    fn test_python_namespaces_are_local() {
        let a = file_with_imports(Some("app.models"), Language::Python, &[("os.path", false), ("requests", false)]);
        let b = file_with_imports(Some("app.service"), Language::Python, &[("app.models", false), (".util", true)]);
        let deps = partition(&[a, b], Language::Python, None);
        assert_eq!(
            kinds(&deps),
            vec![
                (".util", DependencyKind::Local),
                ("app.models", DependencyKind::Local),
                ("os.path", DependencyKind::Stdlib),
                ("requests", DependencyKind::External),
            ]
        );
    }

    #[test]
    fn test_stdlib_tables() {
        assert!(is_stdlib("node:fs", Language::TypeScript));
        assert!(is_stdlib("fs/promises", Language::TypeScript));
        assert!(!is_stdlib("express", Language::TypeScript));
        assert!(is_stdlib("java.util.List", Language::Java));
        assert!(!is_stdlib("javafx.scene", Language::Java));
        assert!(is_stdlib("std::collections::HashMap", Language::Rust));
        assert!(!is_stdlib("serde::Serialize", Language::Rust));
        assert!(is_stdlib("System.Text.Json", Language::CSharp));
        assert!(!is_stdlib("Newtonsoft.Json", Language::CSharp));
    }

    #[test]
    fn test_rust_crate_name_with_dash_is_local() {
        let roots = local_roots(&[], Language::Rust, Some("link-shortener"));
        assert_eq!(
            classify("link_shortener::store", Language::Rust, false, &roots),
            DependencyKind::Local
        );
        assert_eq!(classify("crate::models", Language::Rust, true, &roots), DependencyKind::Local);
    }

    #[test]
    fn test_prefix_requires_separator() {
        assert!(has_prefix("app.models", "app"));
        assert!(!has_prefix("application", "app"));
        assert!(has_prefix("app", "app"));
    }
}
