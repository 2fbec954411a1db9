//! Constructed-once language -> extractor table.

use std::collections::BTreeMap;
use std::path::Path;

use crate::errors::{TandemError, TandemResult};
use crate::extract::csharp::CSharpExtractor;
use crate::extract::go::GoExtractor;
use crate::extract::java::JavaExtractor;
use crate::extract::python::PythonExtractor;
use crate::extract::rust::RustExtractor;
use crate::extract::typescript::TypeScriptExtractor;
use crate::extract::Extractor;
use crate::models::Language;

/// Owns one extractor per supported language. Build it once and pass it by
/// reference to analyzers and comparators; there is no process-wide
/// registry.
pub struct LanguageRegistry {
    extractors: BTreeMap<Language, Box<dyn Extractor>>,
}

impl Default for LanguageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageRegistry {
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(GoExtractor));
        registry.register(Box::new(PythonExtractor));
        registry.register(Box::new(TypeScriptExtractor));
        registry.register(Box::new(JavaExtractor));
        registry.register(Box::new(RustExtractor));
        registry.register(Box::new(CSharpExtractor));
        registry
    }

    pub fn empty() -> Self {
        Self {
            extractors: BTreeMap::new(),
        }
    }

    /// Adds or replaces the extractor for its language.
    pub fn register(&mut self, extractor: Box<dyn Extractor>) {
        self.extractors.insert(extractor.language(), extractor);
    }

    pub fn get(&self, language: Language) -> TandemResult<&dyn Extractor> {
        self.extractors
            .get(&language)
            .map(|e| e.as_ref())
            .ok_or_else(|| TandemError::UnsupportedLanguage(language.name().to_string()))
    }

    pub fn by_name(&self, name: &str) -> TandemResult<&dyn Extractor> {
        let language =
            Language::from_name(name).ok_or_else(|| TandemError::UnsupportedLanguage(name.to_string()))?;
        self.get(language)
    }

    /// Extractor for a file path, by extension.
    pub fn detect(&self, path: &Path) -> Option<&dyn Extractor> {
        let language = Language::from_path(path)?;
        self.extractors.get(&language).map(|e| e.as_ref())
    }

    pub fn languages(&self) -> Vec<Language> {
        self.extractors.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_languages_registered() {
        let registry = LanguageRegistry::new();
        assert_eq!(registry.languages().len(), Language::all().len());
        for lang in Language::all() {
            assert_eq!(registry.get(*lang).unwrap().language(), *lang);
        }
    }

    #[test]
    fn test_detect_by_extension() {
        let registry = LanguageRegistry::new();
        let cases = [
            ("main.go", Language::Go),
            ("app/models.py", Language::Python),
            ("src/App.tsx", Language::TypeScript),
            ("src/index.ts", Language::TypeScript),
            ("Service.java", Language::Java),
            ("src/lib.rs", Language::Rust),
            ("Program.cs", Language::CSharp),
        ];
        for (path, lang) in cases {
            let extractor = registry.detect(Path::new(path)).unwrap();
            assert_eq!(extractor.language(), lang, "{path}");
        }
        assert!(registry.detect(Path::new("README.md")).is_none());
    }

    #[test]
    fn test_unknown_names_are_errors() {
        let registry = LanguageRegistry::new();
        assert!(matches!(
            registry.by_name("cobol"),
            Err(TandemError::UnsupportedLanguage(_))
        ));
        assert!(LanguageRegistry::empty().get(Language::Go).is_err());
    }

    #[test]
    fn test_extraction_through_registry() {
        let registry = LanguageRegistry::new();
        let extractor = registry.detect(Path::new("util.py")).unwrap();
        let result = extractor.parse(b"def ping():\n    return 1\n", "util.py").unwrap();
        assert_eq!(result.functions.len(), 1);
        assert_eq!(result.functions[0].name, "ping");
    }
}
