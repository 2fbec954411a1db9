//! Per-dimension scores for a candidate against the reference.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::analyze::filesystem::is_test_path;
use crate::config::clamp_unit;
use crate::models::{Analysis, DimensionScores, FunctionKind, Language};

static TS_TEST_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*(?:it|test)(?:\.\w+)?\s*\(").expect("valid test call regex"));

static GO_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9]*$").expect("valid go name regex"));
static SNAKE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^_{0,2}[a-z][a-z0-9_]*$").expect("valid snake_case regex"));
static CAMEL_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z$_][A-Za-z0-9$]*$").expect("valid camelCase regex"));
static PASCAL_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z][A-Za-z0-9]*$").expect("valid PascalCase regex"));

/// What dimension scoring needs from one implementation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StructureProfile {
    pub language: Option<Language>,
    pub type_names: BTreeSet<String>,
    pub public_functions: BTreeSet<String>,
    /// Every non-test, non-constructor function name, as written.
    pub function_names: Vec<String>,
    pub test_count: usize,
}

/// Lowercase with `_` and `-` removed, so `new_store`, `NewStore` and
/// `newStore` compare equal.
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

impl StructureProfile {
    /// Build from an analysis that included test files. TypeScript test
    /// cases are `it(...)`/`test(...)` calls rather than functions, so they
    /// are counted from the test files' text under `root`.
    pub fn from_analysis(analysis: &Analysis, root: &Path) -> Self {
        let mut profile = Self {
            language: Some(analysis.language),
            ..Self::default()
        };
        for file in &analysis.files {
            let test_file = is_test_path(&file.file, analysis.language);
            if !test_file {
                profile
                    .type_names
                    .extend(file.types.iter().map(|t| normalize_name(&t.name)));
            }
            for function in &file.functions {
                if function.is_test {
                    profile.test_count += 1;
                    continue;
                }
                if test_file {
                    continue;
                }
                if function.is_public {
                    profile.public_functions.insert(normalize_name(&function.name));
                }
                if function.kind != FunctionKind::Constructor {
                    profile.function_names.push(function.name.clone());
                }
            }
            if analysis.language == Language::TypeScript && test_file {
                if let Ok(text) = std::fs::read_to_string(root.join(&file.file)) {
                    profile.test_count += TS_TEST_CALL.find_iter(&text).count();
                }
            }
        }
        profile
    }
}

pub fn follows_convention(name: &str, language: Language) -> bool {
    let name = name.trim_start_matches('#');
    match language {
        Language::Go => GO_NAME.is_match(name),
        Language::Python => SNAKE_NAME.is_match(name) || (name.starts_with("__") && name.ends_with("__")),
        Language::Rust => SNAKE_NAME.is_match(name),
        Language::TypeScript | Language::Java => CAMEL_NAME.is_match(name),
        Language::CSharp => PASCAL_NAME.is_match(name),
    }
}

/// Share of `reference` names also in `candidate`; 1.0 when the reference
/// has none.
fn coverage(reference: &BTreeSet<String>, candidate: &BTreeSet<String>) -> f64 {
    if reference.is_empty() {
        return 1.0;
    }
    let shared = reference.intersection(candidate).count();
    shared as f64 / reference.len() as f64
}

fn idiomatic(profile: &StructureProfile) -> f64 {
    let Some(language) = profile.language else {
        return 1.0;
    };
    if profile.function_names.is_empty() {
        return 1.0;
    }
    let ok = profile
        .function_names
        .iter()
        .filter(|name| follows_convention(name, language))
        .count();
    ok as f64 / profile.function_names.len() as f64
}

/// Score `candidate` against `reference`. `behavioral` is the candidate's
/// marker parity. Without a reference structure (a specification), the
/// structural dimensions fall back to `behavioral`.
pub fn score(
    reference: Option<&StructureProfile>,
    candidate: Option<&StructureProfile>,
    behavioral: f64,
) -> DimensionScores {
    let behavioral = clamp_unit(behavioral);
    let (Some(reference), Some(candidate)) = (reference, candidate) else {
        return DimensionScores {
            type_: behavioral,
            structural: behavioral,
            behavioral,
            test_coverage: behavioral,
            idiomatic: candidate.map(idiomatic).unwrap_or(behavioral),
        };
    };
    let test_coverage = if reference.test_count == 0 {
        1.0
    } else {
        (candidate.test_count as f64 / reference.test_count as f64).min(1.0)
    };
    DimensionScores {
        type_: clamp_unit(coverage(&reference.type_names, &candidate.type_names)),
        structural: clamp_unit(coverage(&reference.public_functions, &candidate.public_functions)),
        behavioral,
        test_coverage: clamp_unit(test_coverage),
        idiomatic: clamp_unit(idiomatic(candidate)),
    }
}
