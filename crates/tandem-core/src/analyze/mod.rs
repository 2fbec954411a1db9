//! Semantic analysis: extraction over a whole project, optional native
//! toolchain enrichment, call/type graphs and dependency partitioning.

pub mod cancel;
pub mod deps;
pub mod filesystem;
pub mod manifest;
pub mod pipeline;
pub mod toolchain;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::AnalyzerOptions;
use crate::errors::{TandemError, TandemResult};
use crate::extract::LanguageRegistry;
use crate::models::{Analysis, Language, ParseResult, ResolvedFunction, ResolvedType, ToolchainStatus};

pub use cancel::CancellationToken;
use manifest::ProjectManifest;
use toolchain::Enrichment;

/// Analyzes projects of any registered language.
///
/// Toolchain availability is looked up at most once per language per analyzer
/// and cached; build one analyzer per request or share it across requests
/// that accept the same options.
pub struct Analyzer<'r> {
    registry: &'r LanguageRegistry,
    options: AnalyzerOptions,
    located: Mutex<HashMap<Language, Option<PathBuf>>>,
}

impl<'r> Analyzer<'r> {
    pub fn new(registry: &'r LanguageRegistry, options: AnalyzerOptions) -> Self {
        Self {
            registry,
            options: options.clamped(),
            located: Mutex::new(HashMap::new()),
        }
    }

    pub fn options(&self) -> &AnalyzerOptions {
        &self.options
    }

    /// Path of the language's checker, searching `PATH` on first use.
    pub fn toolchain_path(&self, language: Language) -> Option<PathBuf> {
        let mut located = self.located.lock();
        located
            .entry(language)
            .or_insert_with(|| toolchain::locate(toolchain::toolchain_for(language).as_ref()))
            .clone()
    }

    /// Analyze `root` in its dominant language.
    pub fn analyze_project(&self, root: &Path) -> TandemResult<Analysis> {
        ensure_dir(root)?;
        let language = filesystem::detect_project_language(root, &self.options.exclude_patterns)
            .ok_or_else(|| TandemError::NoComparableFiles {
                root: root.to_path_buf(),
                language: "any supported".to_string(),
            })?;
        self.analyze(root, language)
    }

    pub fn analyze(&self, root: &Path, language: Language) -> TandemResult<Analysis> {
        self.analyze_with_cancel(root, language, &CancellationToken::new())
    }

    /// Full analysis of `root`. Only input errors and cancellation abort;
    /// per-file and toolchain failures become diagnostics.
    pub fn analyze_with_cancel(
        &self,
        root: &Path,
        language: Language,
        cancel: &CancellationToken,
    ) -> TandemResult<Analysis> {
        ensure_dir(root)?;
        self.registry.get(language)?;
        if cancel.is_cancelled() {
            return Err(TandemError::Cancelled);
        }

        let files = filesystem::iter_source_files(
            root,
            language,
            self.options.include_tests,
            &self.options.exclude_patterns,
        );
        if files.is_empty() {
            return Err(TandemError::NoComparableFiles {
                root: root.to_path_buf(),
                language: language.name().to_string(),
            });
        }
        debug!("Analyzing {} {language} file(s) under {}", files.len(), root.display());

        let outcomes = pipeline::parallel_extract(self.registry, &files, self.options.workers);
        let mut diagnostics = Vec::new();
        let mut parsed = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            diagnostics.extend(outcome.diagnostics);
            if let Some(result) = outcome.result {
                parsed.push(result);
            }
        }
        if cancel.is_cancelled() {
            return Err(TandemError::Cancelled);
        }

        let manifest = manifest::read_manifest(root, language);
        let enrichment = self.enrich(root, language, &files, cancel)?;
        diagnostics.extend(enrichment.diagnostics);
        let enriched = enrichment.status == ToolchainStatus::Enriched;

        attach_cross_file_methods(&mut parsed);
        let (resolved_types, resolved_functions) = resolve(&parsed, language, &manifest, enriched);
        let analysis = Analysis {
            language,
            project_name: manifest.name.clone(),
            root: root.display().to_string(),
            call_graph: call_graph(&parsed),
            type_graph: type_graph(&parsed),
            dependencies: deps::partition(&parsed, language, manifest.module_root.as_deref()),
            files: parsed,
            resolved_types,
            resolved_functions,
            diagnostics,
            toolchain: enrichment.status,
        };

        let summary = analysis.summary();
        info!(
            "Analyzed {} ({language}): {} files, {} functions, {} types, {} warnings, {} errors",
            analysis.project_name,
            summary.files,
            summary.functions,
            summary.types,
            summary.warnings,
            summary.errors
        );
        Ok(analysis)
    }

    fn enrich(
        &self,
        root: &Path,
        language: Language,
        files: &[filesystem::SourceFile],
        cancel: &CancellationToken,
    ) -> TandemResult<Enrichment> {
        if !self.options.enrich {
            return Ok(Enrichment::disabled());
        }
        let toolchain = toolchain::toolchain_for(language);
        match self.toolchain_path(language) {
            None => {
                info!("{} not found, skipping {language} enrichment", toolchain.program());
                Ok(Enrichment::unavailable(
                    toolchain.as_ref(),
                    &format!("{} not on PATH", toolchain.program()),
                ))
            }
            Some(program) => toolchain::enrich(
                toolchain.as_ref(),
                &program,
                root,
                files,
                self.options.toolchain_timeout(),
                cancel,
            ),
        }
    }
}

fn ensure_dir(root: &Path) -> TandemResult<()> {
    if root.is_dir() {
        Ok(())
    } else {
        Err(TandemError::InputNotFound(root.to_path_buf()))
    }
}

pub fn name_separator(language: Language) -> &'static str {
    match language {
        Language::Rust => "::",
        _ => ".",
    }
}

/// Methods declared away from their type (Go receivers, partial classes)
/// are recorded on the type when namespace and owner match.
fn attach_cross_file_methods(files: &mut [ParseResult]) {
    let mut by_owner: BTreeMap<(Option<String>, String), Vec<String>> = BTreeMap::new();
    for file in files.iter() {
        for function in &file.functions {
            if let Some(owner) = &function.owner {
                let methods = by_owner
                    .entry((file.namespace.clone(), owner.clone()))
                    .or_default();
                if !methods.contains(&function.name) {
                    methods.push(function.name.clone());
                }
            }
        }
    }
    for file in files.iter_mut() {
        let namespace = file.namespace.clone();
        for ty in &mut file.types {
            if let Some(methods) = by_owner.get(&(namespace.clone(), ty.name.clone())) {
                for method in methods {
                    if !ty.methods.contains(method) {
                        ty.methods.push(method.clone());
                    }
                }
            }
        }
    }
}

fn qualify(
    language: Language,
    manifest: &ProjectManifest,
    enriched: bool,
    namespace: Option<&str>,
    owner: Option<&str>,
    name: &str,
) -> String {
    let sep = name_separator(language);
    let mut parts: Vec<&str> = Vec::new();
    if enriched {
        if let Some(root) = manifest.module_root.as_deref() {
            let already_rooted = namespace.is_some_and(|ns| ns == root || ns.starts_with(&format!("{root}{sep}")));
            if !already_rooted {
                parts.push(root);
            }
        }
    }
    parts.extend(namespace.filter(|ns| !ns.is_empty()));
    parts.extend(owner);
    parts.push(name);
    parts.join(sep)
}

fn resolve(
    files: &[ParseResult],
    language: Language,
    manifest: &ProjectManifest,
    enriched: bool,
) -> (Vec<ResolvedType>, Vec<ResolvedFunction>) {
    let mut types = Vec::new();
    let mut functions = Vec::new();
    for file in files {
        let namespace = file.namespace.as_deref();
        for ty in &file.types {
            types.push(ResolvedType {
                name: ty.name.clone(),
                qualified_name: qualify(language, manifest, enriched, namespace, None, &ty.name),
                kind: ty.kind,
                file: file.file.clone(),
                fully_qualified: enriched,
            });
        }
        for function in &file.functions {
            functions.push(ResolvedFunction {
                name: function.name.clone(),
                qualified_name: qualify(
                    language,
                    manifest,
                    enriched,
                    namespace,
                    function.owner.as_deref(),
                    &function.name,
                ),
                signature: function.signature.clone(),
                file: file.file.clone(),
                fully_qualified: enriched,
            });
        }
    }
    types.sort_by(|a, b| (&a.qualified_name, &a.file).cmp(&(&b.qualified_name, &b.file)));
    functions.sort_by(|a, b| (&a.qualified_name, &a.file).cmp(&(&b.qualified_name, &b.file)));
    (types, functions)
}

/// `Owner.name` -> sorted callee names. Same-keyed functions from
/// different files are merged.
fn call_graph(files: &[ParseResult]) -> BTreeMap<String, Vec<String>> {
    let mut graph: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for function in files.iter().flat_map(|f| f.functions.iter()) {
        graph
            .entry(function.key())
            .or_default()
            .extend(function.calls.iter().cloned());
    }
    graph
        .into_iter()
        .map(|(k, v)| (k, v.into_iter().collect()))
        .collect()
}

/// Type -> implemented interfaces plus the extended parent.
fn type_graph(files: &[ParseResult]) -> BTreeMap<String, Vec<String>> {
    let mut graph: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for ty in files.iter().flat_map(|f| f.types.iter()) {
        let entry = graph.entry(ty.name.clone()).or_default();
        entry.extend(ty.implements.iter().cloned());
        entry.extend(ty.extends.iter().cloned());
    }
    graph
        .into_iter()
        .map(|(k, v)| (k, v.into_iter().collect()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DependencyKind, DiagnosticSource, Severity};
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, body: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    fn go_project() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        write(root, "go.mod", "module github.com/acme/links\n\ngo 1.22\n");
        write(
            root,
            "store.go",
            r#"package links

import "sync"

// Store keeps links in memory.
type Store struct {
	mu    sync.Mutex
	items map[string]string
}

type Saver interface {
	Save(code, url string) error
}
"#,
        );
        write(
            root,
            "store_ops.go",
            r#"package links

import (
	"fmt"
	"github.com/acme/links/internal/ids"
	"github.com/google/uuid"
)

func (s *Store) Save(code, url string) error {
	if code == "" {
		return fmt.Errorf("empty code")
	}
	s.items[code] = url
	return nil
}

func NewCode() string {
	return ids.Short(uuid.NewString())
}
"#,
        );
        write(root, "store_test.go", "package links\n\nfunc TestSave(t *testing.T) {}\n");
        tmp
    }

    #[test]
    fn test_analyze_go_project() {
        let tmp = go_project();
        let registry = LanguageRegistry::new();
        let analyzer = Analyzer::new(&registry, AnalyzerOptions::offline());
        let analysis = analyzer.analyze(tmp.path(), Language::Go).unwrap();

        assert_eq!(analysis.project_name, "links");
        assert_eq!(analysis.toolchain, ToolchainStatus::Disabled);
        let files: Vec<&str> = analysis.files.iter().map(|f| f.file.as_str()).collect();
        assert_eq!(files, vec!["store.go", "store_ops.go"]);

        let store = analysis.types().find(|t| t.name == "Store").unwrap();
        assert_eq!(store.methods, vec!["Save".to_string()]);

        assert_eq!(
            analysis.call_graph.get("Store.Save"),
            Some(&vec!["Errorf".to_string()])
        );
        let kinds: BTreeMap<&str, DependencyKind> =
            analysis.dependencies.iter().map(|d| (d.path.as_str(), d.kind)).collect();
        assert_eq!(kinds["fmt"], DependencyKind::Stdlib);
        assert_eq!(kinds["github.com/acme/links/internal/ids"], DependencyKind::Local);
        assert_eq!(kinds["github.com/google/uuid"], DependencyKind::External);

        let save = analysis
            .resolved_functions
            .iter()
            .find(|f| f.name == "Save")
            .unwrap();
        assert_eq!(save.qualified_name, "links.Store.Save");
        assert!(!save.fully_qualified);
    }

    #[test]
    fn test_include_tests_option() {
        let tmp = go_project();
        let registry = LanguageRegistry::new();
        let options = AnalyzerOptions {
            include_tests: true,
            ..AnalyzerOptions::offline()
        };
        let analysis = Analyzer::new(&registry, options).analyze(tmp.path(), Language::Go).unwrap();
        assert!(analysis.functions().any(|f| f.name == "TestSave" && f.is_test));
    }

    #[test]
    fn test_type_graph_includes_extends_and_implements() {
        let tmp = TempDir::new().unwrap();
        write(
            tmp.path(),
            "Shapes.java",
            "package geo;\npublic class Square extends Shape implements Comparable<Square>, Drawable {}\n",
        );
        let registry = LanguageRegistry::new();
        let analysis = Analyzer::new(&registry, AnalyzerOptions::offline())
            .analyze(tmp.path(), Language::Java)
            .unwrap();
        let edges = &analysis.type_graph["Square"];
        assert!(edges.contains(&"Shape".to_string()));
        assert!(edges.contains(&"Drawable".to_string()));
    }

    #[test]
    fn test_unparseable_file_is_warning_others_analyzed() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "good.py", "def ok():\n    return 1\n");
        write(tmp.path(), "bad.py", "def broken(:\n    return\n");
        let registry = LanguageRegistry::new();
        let analysis = Analyzer::new(&registry, AnalyzerOptions::offline())
            .analyze(tmp.path(), Language::Python)
            .unwrap();
        let warnings = analysis.diagnostics_for("bad.py");
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].severity, Severity::Warning);
        assert_eq!(warnings[0].source, DiagnosticSource::Parser);
        assert!(analysis.functions().any(|f| f.name == "ok"));
    }

    #[test]
    fn test_input_errors() {
        let registry = LanguageRegistry::new();
        let analyzer = Analyzer::new(&registry, AnalyzerOptions::offline());
        let missing = analyzer.analyze(Path::new("/definitely/not/here"), Language::Go);
        assert!(matches!(missing, Err(TandemError::InputNotFound(_))));

        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "README.md", "# nothing\n");
        let empty = analyzer.analyze(tmp.path(), Language::Rust);
        assert!(matches!(empty, Err(TandemError::NoComparableFiles { .. })));
        assert!(empty.unwrap_err().is_input_error());
    }

    #[test]
    fn test_cancelled_before_start() {
        let tmp = go_project();
        let registry = LanguageRegistry::new();
        let token = CancellationToken::new();
        token.cancel();
        let result = Analyzer::new(&registry, AnalyzerOptions::offline()).analyze_with_cancel(
            tmp.path(),
            Language::Go,
            &token,
        );
        assert!(matches!(result, Err(TandemError::Cancelled)));
    }

    #[test]
    fn test_qualify_with_module_root() {
        let manifest = ProjectManifest {
            name: "links".into(),
            module_root: Some("com.acme".into()),
            source: None,
        };
        assert_eq!(
            qualify(Language::Java, &manifest, true, Some("com.acme.links"), Some("Store"), "save"),
            "com.acme.links.Store.save"
        );
        assert_eq!(
            qualify(Language::Rust, &manifest, true, Some("store"), None, "Store"),
            "com.acme::store::Store"
        );
        assert_eq!(qualify(Language::Go, &manifest, false, None, None, "Run"), "Run");
    }

    #[test]
    fn test_analyze_project_detects_language() {
        let tmp = go_project();
        let registry = LanguageRegistry::new();
        let analysis = Analyzer::new(&registry, AnalyzerOptions::offline())
            .analyze_project(tmp.path())
            .unwrap();
        assert_eq!(analysis.language, Language::Go);
    }
}
