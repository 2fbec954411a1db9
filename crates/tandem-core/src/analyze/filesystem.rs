//! Project file discovery for analysis passes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ignore::overrides::{Override, OverrideBuilder};
use ignore::WalkBuilder;
use tracing::{debug, warn};

use crate::models::Language;

/// Build output, dependency caches and VCS metadata.
pub const SKIP_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    "target",
    "build",
    "dist",
    "out",
    "vendor",
    "__pycache__",
    ".venv",
    "venv",
    ".tox",
    ".mypy_cache",
    ".pytest_cache",
    "bin",
    "obj",
    ".gradle",
    ".idea",
    "coverage",
];

/// Project-local ignore file, gitignore syntax.
pub const IGNORE_FILE: &str = ".tandemignore";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceFile {
    /// Slash-separated path relative to the project root.
    pub rel_path: String,
    pub abs_path: PathBuf,
    pub language: Language,
    pub size_bytes: u64,
}

/// Extra exclude patterns as walk overrides. Patterns follow gitignore
/// syntax relative to `root`; negations and invalid globs are skipped.
fn exclude_overrides(root: &Path, exclude_patterns: &[String]) -> Override {
    let mut builder = OverrideBuilder::new(root);
    for raw in exclude_patterns {
        let pattern = raw.trim();
        if pattern.is_empty() || pattern.starts_with('#') {
            continue;
        }
        if pattern.starts_with('!') {
            debug!("Ignoring negated exclude pattern {pattern}");
            continue;
        }
        let pattern = pattern.strip_prefix("./").unwrap_or(pattern);
        if let Err(e) = builder.add(&format!("!{pattern}")) {
            warn!("Skipping invalid exclude pattern {pattern}: {e}");
        }
    }
    builder.build().unwrap_or_else(|e| {
        warn!("Exclude patterns unusable under {}: {e}", root.display());
        Override::empty()
    })
}

fn relative(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Whether a project-relative path is test code by the language's layout
/// conventions.
pub fn is_test_path(rel_path: &str, language: Language) -> bool {
    let normalized = rel_path.replace('\\', "/");
    let file = normalized.rsplit('/').next().unwrap_or(&normalized);
    let dirs: Vec<&str> = normalized.split('/').rev().skip(1).collect();
    let in_dir = |names: &[&str]| dirs.iter().any(|d| names.contains(d));
    match language {
        Language::Go => file.ends_with("_test.go") || in_dir(&["testdata"]),
        Language::Python => {
            file.starts_with("test_")
                || file.ends_with("_test.py")
                || file == "conftest.py"
                || in_dir(&["tests", "test"])
        }
        Language::TypeScript => {
            file.contains(".test.") || file.contains(".spec.") || in_dir(&["__tests__", "tests", "test"])
        }
        Language::Java => {
            normalized.contains("src/test/")
                || file.ends_with("Test.java")
                || file.ends_with("Tests.java")
                || file.ends_with("IT.java")
        }
        Language::Rust => in_dir(&["tests"]),
        Language::CSharp => {
            file.ends_with("Tests.cs")
                || file.ends_with("Test.cs")
                || dirs
                    .iter()
                    .any(|d| d.ends_with(".Tests") || d.ends_with(".Test") || *d == "tests")
        }
    }
}

fn walker(root: &Path, exclude_patterns: &[String]) -> ignore::Walk {
    WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .require_git(false)
        .add_custom_ignore_filename(IGNORE_FILE)
        .overrides(exclude_overrides(root, exclude_patterns))
        .sort_by_file_name(|a, b| a.cmp(b))
        .filter_entry(|entry| {
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            !(is_dir && entry.depth() > 0 && SKIP_DIRS.contains(&entry.file_name().to_string_lossy().as_ref()))
        })
        .build()
}

fn walk_files<'a>(root: &'a Path, exclude_patterns: &[String]) -> impl Iterator<Item = ignore::DirEntry> + 'a {
    walker(root, exclude_patterns).filter_map(move |item| match item {
        Ok(entry) if entry.file_type().is_some_and(|t| t.is_file()) => Some(entry),
        Ok(_) => None,
        Err(e) => {
            debug!("Skipping unreadable entry under {}: {e}", root.display());
            None
        }
    })
}

/// All source files of `language` under `root`, sorted by relative path.
///
/// Honours `.gitignore` and [`IGNORE_FILE`], skips [`SKIP_DIRS`] and the
/// caller's extra patterns, and drops test files unless `include_tests`.
pub fn iter_source_files(
    root: &Path,
    language: Language,
    include_tests: bool,
    exclude_patterns: &[String],
) -> Vec<SourceFile> {
    let mut files = Vec::new();
    for entry in walk_files(root, exclude_patterns) {
        let path = entry.path();
        if Language::from_path(path) != Some(language) {
            continue;
        }
        let rel_path = relative(path, root);
        if !include_tests && is_test_path(&rel_path, language) {
            debug!("Skipping test file {rel_path}");
            continue;
        }
        let size_bytes = entry.metadata().map(|m| m.len()).unwrap_or(0);
        files.push(SourceFile {
            rel_path,
            abs_path: path.to_path_buf(),
            language,
            size_bytes,
        });
    }
    files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    files
}

/// The language with the most non-test source files under `root`. Ties go
/// to the earlier language in [`Language::all`].
pub fn detect_project_language(root: &Path, exclude_patterns: &[String]) -> Option<Language> {
    let mut counts: BTreeMap<Language, usize> = BTreeMap::new();
    for entry in walk_files(root, exclude_patterns) {
        let Some(language) = Language::from_path(entry.path()) else {
            continue;
        };
        if !is_test_path(&relative(entry.path(), root), language) {
            *counts.entry(language).or_default() += 1;
        }
    }
    let best = counts.values().copied().max()?;
    Language::all().iter().copied().find(|l| counts.get(l) == Some(&best))
}
