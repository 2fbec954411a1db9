//! Shared typed models used across extraction, analysis, parity and
//! convergence layers.
//!
//! Everything here is created fresh per request and dropped when the request
//! ends; nothing is persisted.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Language
// ---------------------------------------------------------------------------

const LANGUAGE_BY_EXTENSION: &[(&str, Language)] = &[
    ("go", Language::Go),
    ("py", Language::Python),
    ("pyi", Language::Python),
    ("ts", Language::TypeScript),
    ("tsx", Language::TypeScript),
    ("mts", Language::TypeScript),
    ("cts", Language::TypeScript),
    ("java", Language::Java),
    ("rs", Language::Rust),
    ("cs", Language::CSharp),
];

/// The six source languages the extractors understand.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Go,
    Python,
    TypeScript,
    Java,
    Rust,
    CSharp,
}

impl Language {
    pub fn all() -> &'static [Language] {
        &[
            Language::Go,
            Language::Python,
            Language::TypeScript,
            Language::Java,
            Language::Rust,
            Language::CSharp,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Language::Go => "go",
            Language::Python => "python",
            Language::TypeScript => "typescript",
            Language::Java => "java",
            Language::Rust => "rust",
            Language::CSharp => "csharp",
        }
    }

    /// Accepts canonical names plus the usual short aliases.
    pub fn from_name(name: &str) -> Option<Language> {
        match name.trim().to_lowercase().as_str() {
            "go" | "golang" => Some(Language::Go),
            "python" | "py" => Some(Language::Python),
            "typescript" | "ts" | "tsx" => Some(Language::TypeScript),
            "java" => Some(Language::Java),
            "rust" | "rs" => Some(Language::Rust),
            "csharp" | "c#" | "cs" | "dotnet" => Some(Language::CSharp),
            _ => None,
        }
    }

    /// Detect a language from a file extension.
    pub fn from_path(path: &Path) -> Option<Language> {
        let ext = path.extension()?.to_string_lossy().to_lowercase();
        LANGUAGE_BY_EXTENSION
            .iter()
            .find(|(e, _)| *e == ext.as_str())
            .map(|(_, lang)| *lang)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Source locations
// ---------------------------------------------------------------------------

/// A 1-based source range inside one file.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    pub start_line: usize,
    pub start_column: usize,
    pub end_line: usize,
    pub end_column: usize,
}

impl SourceLocation {
    pub fn new(
        file: impl Into<String>,
        start_line: usize,
        start_column: usize,
        end_line: usize,
        end_column: usize,
    ) -> Self {
        Self {
            file: file.into(),
            start_line,
            start_column,
            end_line,
            end_column,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.start_line, self.start_column)
    }
}

// ---------------------------------------------------------------------------
// Extracted entities
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: Option<String>,
    pub default: Option<String>,
    pub optional: bool,
    pub variadic: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionKind {
    Function,
    Method,
    Constructor,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    pub kind: FunctionKind,
    /// Enclosing type or receiver, when the function is a member.
    pub owner: Option<String>,
    pub signature: String,
    pub parameters: Vec<Parameter>,
    pub returns: Vec<String>,
    pub is_async: bool,
    pub is_public: bool,
    pub is_static: bool,
    pub is_test: bool,
    pub doc: Option<String>,
    pub body: Option<String>,
    /// Branching-count heuristic, always >= 1.
    pub complexity: u32,
    pub calls: BTreeSet<String>,
    pub location: SourceLocation,
    pub content_hash: String,
}

impl FunctionDef {
    /// `Owner.name` for members, bare `name` otherwise.
    pub fn key(&self) -> String {
        match &self.owner {
            Some(owner) => format!("{owner}.{}", self.name),
            None => self.name.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeKind {
    Struct,
    Class,
    Interface,
    Enum,
    Alias,
    Union,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: Option<String>,
    pub optional: bool,
    pub readonly: bool,
    pub default: Option<String>,
    /// Raw metadata tags (Go struct tags, annotations, attributes).
    pub tags: Option<String>,
    pub doc: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TypeDef {
    pub name: String,
    pub kind: TypeKind,
    pub fields: Vec<Field>,
    pub methods: Vec<String>,
    pub extends: Option<String>,
    pub implements: Vec<String>,
    pub variants: Vec<String>,
    pub alias_of: Option<String>,
    pub generics: Vec<String>,
    pub doc: Option<String>,
    pub is_public: bool,
    pub location: SourceLocation,
    pub content_hash: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Import {
    pub path: String,
    pub alias: Option<String>,
    pub is_local: bool,
    pub names: Vec<String>,
    pub line: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConstantDef {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: Option<String>,
    pub value: Option<String>,
    pub is_public: bool,
    pub location: SourceLocation,
    pub content_hash: String,
}

/// Normalized output of one extractor run over one file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParseResult {
    pub file: String,
    pub language: Language,
    /// Declared package / namespace / module, if the language has one.
    pub namespace: Option<String>,
    pub functions: Vec<FunctionDef>,
    pub types: Vec<TypeDef>,
    pub imports: Vec<Import>,
    pub constants: Vec<ConstantDef>,
    pub has_syntax_errors: bool,
}

impl ParseResult {
    pub fn empty(file: impl Into<String>, language: Language) -> Self {
        Self {
            file: file.into(),
            language,
            namespace: None,
            functions: Vec::new(),
            types: Vec::new(),
            imports: Vec::new(),
            constants: Vec::new(),
            has_syntax_errors: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticSource {
    Parser,
    Toolchain,
    Analyzer,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub source: DiagnosticSource,
    pub message: String,
    pub file: Option<String>,
    pub line: Option<usize>,
    pub column: Option<usize>,
    pub code: Option<String>,
}

impl Diagnostic {
    pub fn new(severity: Severity, source: DiagnosticSource, message: impl Into<String>) -> Self {
        Self {
            severity,
            source,
            message: message.into(),
            file: None,
            line: None,
            column: None,
            code: None,
        }
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn at(mut self, line: usize, column: Option<usize>) -> Self {
        self.line = Some(line);
        self.column = column;
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    Stdlib,
    Local,
    External,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Dependency {
    pub path: String,
    pub kind: DependencyKind,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedType {
    pub name: String,
    pub qualified_name: String,
    pub kind: TypeKind,
    pub file: String,
    pub fully_qualified: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedFunction {
    pub name: String,
    pub qualified_name: String,
    pub signature: String,
    pub file: String,
    pub fully_qualified: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "detail")]
pub enum ToolchainStatus {
    /// Enrichment was switched off by configuration.
    Disabled,
    Unavailable(String),
    Failed(String),
    TimedOut,
    Enriched,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub language: Language,
    pub project_name: String,
    pub root: String,
    pub files: Vec<ParseResult>,
    pub resolved_types: Vec<ResolvedType>,
    pub resolved_functions: Vec<ResolvedFunction>,
    pub call_graph: BTreeMap<String, Vec<String>>,
    pub type_graph: BTreeMap<String, Vec<String>>,
    pub dependencies: Vec<Dependency>,
    pub diagnostics: Vec<Diagnostic>,
    pub toolchain: ToolchainStatus,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AnalysisSummary {
    pub files: usize,
    pub functions: usize,
    pub types: usize,
    pub imports: usize,
    pub constants: usize,
    pub infos: usize,
    pub warnings: usize,
    pub errors: usize,
}

impl Analysis {
    pub fn functions(&self) -> impl Iterator<Item = &FunctionDef> {
        self.files.iter().flat_map(|f| f.functions.iter())
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeDef> {
        self.files.iter().flat_map(|f| f.types.iter())
    }

    pub fn diagnostics_for(&self, file: &str) -> Vec<&Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.file.as_deref() == Some(file))
            .collect()
    }

    pub fn summary(&self) -> AnalysisSummary {
        let mut summary = AnalysisSummary {
            files: self.files.len(),
            ..Default::default()
        };
        for file in &self.files {
            summary.functions += file.functions.len();
            summary.types += file.types.len();
            summary.imports += file.imports.len();
            summary.constants += file.constants.len();
        }
        for diagnostic in &self.diagnostics {
            match diagnostic.severity {
                Severity::Info => summary.infos += 1,
                Severity::Warning => summary.warnings += 1,
                Severity::Error => summary.errors += 1,
            }
        }
        summary
    }
}

// ---------------------------------------------------------------------------
// Parity
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureCategory {
    Validation,
    Configuration,
    Metadata,
    Async,
    Core,
}

impl FeatureCategory {
    pub fn name(&self) -> &'static str {
        match self {
            FeatureCategory::Validation => "validation",
            FeatureCategory::Configuration => "configuration",
            FeatureCategory::Metadata => "metadata",
            FeatureCategory::Async => "async",
            FeatureCategory::Core => "core",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapSeverity {
    Low,
    Medium,
    High,
}

/// Presence record of one feature inside one implementation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Implementation {
    pub present: bool,
    pub file: Option<String>,
    pub line: Option<usize>,
    pub snippet: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureStatus {
    pub id: String,
    pub name: String,
    pub category: FeatureCategory,
    /// Implementation label -> presence record. The reference label is ground truth.
    pub implementations: indexmap::IndexMap<String, Implementation>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParityGap {
    pub feature_id: String,
    pub feature_name: String,
    pub category: FeatureCategory,
    pub severity: GapSeverity,
    pub missing_in: String,
    pub reference_file: Option<String>,
    pub reference_snippet: Option<String>,
    pub suggested_fix: String,
    pub target_file: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DimensionScores {
    #[serde(rename = "type")]
    pub type_: f64,
    pub structural: f64,
    pub behavioral: f64,
    pub test_coverage: f64,
    pub idiomatic: f64,
}

impl DimensionScores {
    pub fn mean(&self) -> f64 {
        (self.type_ + self.structural + self.behavioral + self.test_coverage + self.idiomatic) / 5.0
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParityReport {
    pub reference: String,
    pub candidates: Vec<String>,
    pub features: Vec<FeatureStatus>,
    pub gaps: Vec<ParityGap>,
    pub score: f64,
    /// Candidate label -> per-dimension scores.
    pub dimensions: BTreeMap<String, DimensionScores>,
    /// Candidate label -> natural-language fix instructions.
    pub fix_instructions: BTreeMap<String, String>,
}

// ---------------------------------------------------------------------------
// Convergence
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Spec,
    Code,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Iteration {
    pub number: usize,
    pub phase: Phase,
    pub score: f64,
    pub gaps_fixed: usize,
    pub gaps_remaining: usize,
    pub touched_files: Vec<String>,
    pub duration_ms: u64,
}

/// Score history and trend state of one refinement run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceMetrics {
    pub history: Vec<f64>,
    pub window: usize,
    pub stuck_threshold: f64,
    /// Least-squares slope over the trailing window.
    pub trend: f64,
    pub is_stuck: bool,
    pub stuck_reason: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopStatus {
    Converged,
    Stuck,
    MaxIterations,
    Fatal,
    Cancelled,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoopResult {
    pub converged: bool,
    pub status: LoopStatus,
    pub final_score: f64,
    pub iterations: Vec<Iteration>,
    pub unresolved_gaps: Vec<ParityGap>,
    pub metrics: ConvergenceMetrics,
    pub summary: String,
    /// Language label -> refinement prompt for the next generation step.
    pub refinement_prompts: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_from_path() {
        assert_eq!(Language::from_path(Path::new("a/b/service.go")), Some(Language::Go));
        assert_eq!(Language::from_path(Path::new("App.TSX")), Some(Language::TypeScript));
        assert_eq!(Language::from_path(Path::new("lib.rs")), Some(Language::Rust));
        assert_eq!(Language::from_path(Path::new("Program.cs")), Some(Language::CSharp));
        assert_eq!(Language::from_path(Path::new("README.md")), None);
        assert_eq!(Language::from_path(Path::new("Makefile")), None);
    }

    #[test]
    fn test_language_from_name_aliases() {
        assert_eq!(Language::from_name("golang"), Some(Language::Go));
        assert_eq!(Language::from_name(" C# "), Some(Language::CSharp));
        assert_eq!(Language::from_name("cobol"), None);
        for lang in Language::all() {
            assert_eq!(Language::from_name(lang.name()), Some(*lang));
        }
    }

    #[test]
    fn test_function_key() {
        let location = SourceLocation::new("a.go", 1, 1, 2, 1);
        let mut function = FunctionDef {
            name: "Run".into(),
            kind: FunctionKind::Method,
            owner: Some("Server".into()),
            signature: String::new(),
            parameters: vec![],
            returns: vec![],
            is_async: false,
            is_public: true,
            is_static: false,
            is_test: false,
            doc: None,
            body: None,
            complexity: 1,
            calls: BTreeSet::new(),
            location,
            content_hash: String::new(),
        };
        assert_eq!(function.key(), "Server.Run");
        function.owner = None;
        assert_eq!(function.key(), "Run");
    }

    #[test]
    fn test_dimension_mean() {
        let scores = DimensionScores {
            type_: 1.0,
            structural: 0.5,
            behavioral: 0.5,
            test_coverage: 0.0,
            idiomatic: 1.0,
        };
        assert!((scores.mean() - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_serialize_snake_case_enums() {
        let json = serde_json::to_string(&TypeKind::Interface).unwrap();
        assert_eq!(json, "\"interface\"");
        let json = serde_json::to_string(&ToolchainStatus::TimedOut).unwrap();
        assert!(json.contains("timed_out"));
    }
}
