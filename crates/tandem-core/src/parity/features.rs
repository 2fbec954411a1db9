//! Marker scanning over source files and specification text.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, warn};

use crate::analyze::filesystem;
use crate::config::{MAX_FILE_BYTES, SNIPPET_LEAD_LINES, SNIPPET_WINDOW_LINES};
use crate::models::{FeatureCategory, Implementation, Language};
use crate::parity::catalog::Catalog;

/// One source file's path and text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceText {
    pub path: String,
    pub text: String,
}

/// Read every comparable file of `language` under `root`, sorted by path.
/// Unreadable and oversized files are left out.
pub fn load_sources(
    root: &Path,
    language: Language,
    include_tests: bool,
    exclude_patterns: &[String],
) -> Vec<SourceText> {
    filesystem::iter_source_files(root, language, include_tests, exclude_patterns)
        .into_iter()
        .filter_map(|file| {
            if file.size_bytes > MAX_FILE_BYTES {
                debug!("Not scanning {} for markers: too large", file.rel_path);
                return None;
            }
            match std::fs::read_to_string(&file.abs_path) {
                Ok(text) => Some(SourceText {
                    path: file.rel_path,
                    text,
                }),
                Err(e) => {
                    warn!("Failed to read {} for marker scan: {e}", file.rel_path);
                    None
                }
            }
        })
        .collect()
}

/// 1-based line containing byte `offset`.
pub fn line_of(text: &str, offset: usize) -> usize {
    let end = offset.min(text.len());
    text.as_bytes()[..end].iter().filter(|b| **b == b'\n').count() + 1
}

/// Fixed window of lines around `line`, starting a little before it.
pub fn snippet(text: &str, line: usize) -> String {
    let start = line.saturating_sub(1).saturating_sub(SNIPPET_LEAD_LINES);
    text.lines()
        .skip(start)
        .take(SNIPPET_WINDOW_LINES)
        .collect::<Vec<_>>()
        .join("\n")
}

fn hit(file: Option<&str>, text: &str, offset: usize) -> Implementation {
    let line = line_of(text, offset);
    Implementation {
        present: true,
        file: file.map(str::to_string),
        line: Some(line),
        snippet: Some(snippet(text, line)),
    }
}

/// Feature id -> first occurrence, for every catalogue feature with a
/// marker match in `sources`. Files are searched in the given order.
pub fn scan_sources(catalog: &Catalog, language: Language, sources: &[SourceText]) -> BTreeMap<String, Implementation> {
    let mut found = BTreeMap::new();
    for feature in catalog.features() {
        let Some(pattern) = feature.code_pattern(language) else {
            continue;
        };
        let first = sources
            .iter()
            .find_map(|source| pattern.find(&source.text).map(|m| (source, m.start())));
        if let Some((source, offset)) = first {
            found.insert(feature.id.clone(), hit(Some(&source.path), &source.text, offset));
        }
    }
    found
}

/// Same as [`scan_sources`] over specification prose.
pub fn scan_spec(catalog: &Catalog, text: &str, source_name: Option<&str>) -> BTreeMap<String, Implementation> {
    let mut found = BTreeMap::new();
    for feature in catalog.features() {
        let Some(pattern) = feature.spec_pattern() else {
            continue;
        };
        if let Some(m) = pattern.find(text) {
            found.insert(feature.id.clone(), hit(source_name, text, m.start()));
        }
    }
    found
}

fn category_keywords(category: FeatureCategory) -> &'static [&'static str] {
    match category {
        FeatureCategory::Validation => &["valid", "check", "sanitiz", "input", "request", "handler", "service"],
        FeatureCategory::Configuration => &["config", "setting", "env", "option", "main", "app"],
        FeatureCategory::Metadata => &["model", "entity", "type", "schema", "domain", "record", "store"],
        FeatureCategory::Async => &["worker", "async", "job", "task", "queue", "server", "service"],
        FeatureCategory::Core => &["service", "core", "handler", "store", "main", "lib", "app", "index", "server"],
    }
}

/// Best-guess file for adding a feature of `category`: the first keyword,
/// in priority order, found in a file name wins; otherwise the first file.
pub fn target_file(category: FeatureCategory, files: &[String]) -> Option<String> {
    let names: Vec<(String, &String)> = files
        .iter()
        .map(|f| (f.rsplit('/').next().unwrap_or(f).to_lowercase(), f))
        .collect();
    category_keywords(category)
        .iter()
        .find_map(|keyword| names.iter().find(|(name, _)| name.contains(keyword)))
        .map(|(_, path)| (*path).clone())
        .or_else(|| files.first().cloned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn source(path: &str, text: &str) -> SourceText {
        SourceText {
            path: path.into(),
            text: text.into(),
        }
    }

    #[test]
    fn test_line_and_snippet_window() {
        let text = (1..=20).map(|n| format!("line {n}")).collect::<Vec<_>>().join("\n");
        let offset = text.find("line 10").unwrap();
        assert_eq!(line_of(&text, offset), 10);
        let window = snippet(&text, 10);
        let lines: Vec<&str> = window.lines().collect();
        assert_eq!(lines.len(), SNIPPET_WINDOW_LINES);
        assert_eq!(lines[0], "line 8");
        assert_eq!(snippet(&text, 1).lines().next(), Some("line 1"));
    }

    #[test]
    fn test_scan_sources_first_match_wins() {
        let catalog = Catalog::builtin().unwrap();
        let sources = vec![
            source("a/handler.go", "package a\n\nfunc H() {}\n"),
            source("a/service.go", "package a\n\nimport \"net/url\"\n\nfunc Check(raw string) error {\n\t_, err := url.Parse(raw)\n\treturn err\n}\n"),
            source("b/other.go", "package b\n\nvar _ = url.Parse\n"),
        ];
        let found = scan_sources(&catalog, Language::Go, &sources);
        let url = &found["url_validation"];
        assert!(url.present);
        assert_eq!(url.file.as_deref(), Some("a/service.go"));
        assert_eq!(url.line, Some(6));
        assert!(url.snippet.as_deref().unwrap().contains("url.Parse(raw)"));
        assert!(!found.contains_key("env_config"));
    }

    #[test]
    fn test_scan_spec_prose() {
        let catalog = Catalog::builtin().unwrap();
        let text = "# Shortener\n\nValidate every submitted URL.\nRead the port from environment variables.\n";
        let found = scan_spec(&catalog, text, Some("spec.md"));
        assert_eq!(found["url_validation"].line, Some(3));
        assert_eq!(found["env_config"].file.as_deref(), Some("spec.md"));
        assert!(!found.contains_key("retry"));
    }

    #[test]
    fn test_target_file_by_category() {
        let files = vec![
            "src/app.ts".to_string(),
            "src/config.ts".to_string(),
            "src/validators.ts".to_string(),
        ];
        assert_eq!(target_file(FeatureCategory::Validation, &files).as_deref(), Some("src/validators.ts"));
        assert_eq!(target_file(FeatureCategory::Configuration, &files).as_deref(), Some("src/config.ts"));
        assert_eq!(target_file(FeatureCategory::Async, &files).as_deref(), Some("src/app.ts"));
        assert_eq!(target_file(FeatureCategory::Core, &[]), None);
    }

    #[test]
    fn test_load_sources_reads_sorted() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("b.py"), "import os\n").unwrap();
        fs::write(tmp.path().join("a.py"), "x = 1\n").unwrap();
        fs::write(tmp.path().join("test_a.py"), "def test_x(): pass\n").unwrap();
        let sources = load_sources(tmp.path(), Language::Python, false, &[]);
        let paths: Vec<&str> = sources.iter().map(|s| s.path.as_str()).collect();
        assert_eq!(paths, vec!["a.py", "b.py"]);
    }
}
