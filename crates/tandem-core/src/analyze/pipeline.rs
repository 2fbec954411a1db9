//! Per-file extraction with Rayon-based parallelism.

use rayon::prelude::*;
use tracing::warn;

use crate::analyze::filesystem::SourceFile;
use crate::config::MAX_FILE_BYTES;
use crate::extract::{Extractor, LanguageRegistry};
use crate::models::{Diagnostic, DiagnosticSource, ParseResult, Severity};

/// Result of extracting one file. `result` is `None` when the file was
/// skipped; the reason is then in `diagnostics`.
#[derive(Clone, Debug)]
pub struct FileOutcome {
    pub file: String,
    pub result: Option<ParseResult>,
    pub diagnostics: Vec<Diagnostic>,
}

impl FileOutcome {
    fn skipped(file: &str, message: String) -> Self {
        warn!("Skipping {file}: {message}");
        Self {
            file: file.to_string(),
            result: None,
            diagnostics: vec![parser_warning(file, message)],
        }
    }
}

fn parser_warning(file: &str, message: String) -> Diagnostic {
    Diagnostic::new(Severity::Warning, DiagnosticSource::Parser, message).with_file(file)
}

/// Read and extract one file. Never fails: unreadable, oversized and
/// undecodable files come back as skipped outcomes, and files with syntax
/// errors keep their partial results alongside a warning.
pub fn extract_file(extractor: &dyn Extractor, file: &SourceFile) -> FileOutcome {
    if file.size_bytes > MAX_FILE_BYTES {
        return FileOutcome::skipped(
            &file.rel_path,
            format!("file is {} bytes, above the {MAX_FILE_BYTES} byte limit", file.size_bytes),
        );
    }
    let source = match std::fs::read(&file.abs_path) {
        Ok(bytes) => bytes,
        Err(e) => return FileOutcome::skipped(&file.rel_path, format!("unreadable: {e}")),
    };
    let result = match extractor.parse(&source, &file.rel_path) {
        Ok(result) => result,
        Err(e) => return FileOutcome::skipped(&file.rel_path, e.to_string()),
    };

    let mut diagnostics = Vec::new();
    if result.has_syntax_errors {
        warn!("Syntax errors in {}, keeping partial results", file.rel_path);
        diagnostics.push(parser_warning(
            &file.rel_path,
            "unparseable syntax; results for this file are partial".to_string(),
        ));
    }
    FileOutcome {
        file: file.rel_path.clone(),
        result: Some(result),
        diagnostics,
    }
}

fn extract_with_registry(registry: &LanguageRegistry, file: &SourceFile) -> FileOutcome {
    match registry.get(file.language) {
        Ok(extractor) => extract_file(extractor, file),
        Err(e) => FileOutcome::skipped(&file.rel_path, e.to_string()),
    }
}

/// Extract every file on a pool of `workers` threads. Output is sorted by
/// path so aggregation does not depend on completion order.
pub fn parallel_extract(
    registry: &LanguageRegistry,
    files: &[SourceFile],
    workers: usize,
) -> Vec<FileOutcome> {
    if files.is_empty() {
        return vec![];
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build();

    let mut outcomes: Vec<FileOutcome> = match pool {
        Ok(pool) => pool.install(|| {
            files
                .par_iter()
                .map(|file| extract_with_registry(registry, file))
                .collect()
        }),
        Err(e) => {
            warn!("Thread pool unavailable, extracting sequentially: {e}");
            files
                .iter()
                .map(|file| extract_with_registry(registry, file))
                .collect()
        }
    };
    outcomes.sort_by(|a, b| a.file.cmp(&b.file));
    outcomes
}
