//! Feature/parity comparison between a reference and candidate
//! implementations.

pub mod catalog;
pub mod dimensions;
pub mod features;
pub mod scoring;

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::analyze::filesystem::{detect_project_language, is_test_path};
use crate::analyze::{Analyzer, CancellationToken};
use crate::config::{AnalyzerOptions, ComparatorOptions};
use crate::errors::{TandemError, TandemResult};
use crate::extract::LanguageRegistry;
use crate::models::{Implementation, Language, ParityReport};

use catalog::Catalog;
use dimensions::StructureProfile;
use scoring::{CandidateContext, Presence};

/// One side of a comparison.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImplementationInput {
    /// A source tree. The language is detected when not given.
    Project {
        root: PathBuf,
        language: Option<Language>,
        label: Option<String>,
    },
    /// Natural-language specification text.
    Specification {
        text: String,
        label: Option<String>,
        source_name: Option<String>,
    },
}

impl ImplementationInput {
    pub fn project(root: impl Into<PathBuf>) -> Self {
        Self::Project {
            root: root.into(),
            language: None,
            label: None,
        }
    }

    pub fn project_in(root: impl Into<PathBuf>, language: Language) -> Self {
        Self::Project {
            root: root.into(),
            language: Some(language),
            label: None,
        }
    }

    pub fn specification(text: impl Into<String>) -> Self {
        Self::Specification {
            text: text.into(),
            label: None,
            source_name: None,
        }
    }

    pub fn with_label(mut self, new_label: impl Into<String>) -> Self {
        match &mut self {
            Self::Project { label, .. } | Self::Specification { label, .. } => *label = Some(new_label.into()),
        }
        self
    }

    /// Absolute project root, for project inputs.
    pub fn root(&self) -> Option<&Path> {
        match self {
            Self::Project { root, .. } => Some(root),
            Self::Specification { .. } => None,
        }
    }
}

/// Everything comparison needs from one input, computed once.
#[derive(Clone, Debug, PartialEq)]
pub struct LoadedImplementation {
    pub label: String,
    pub language: Option<Language>,
    pub root: Option<PathBuf>,
    /// Non-test source files, sorted.
    pub files: Vec<String>,
    pub presence: BTreeMap<String, Implementation>,
    pub structure: Option<StructureProfile>,
}

impl LoadedImplementation {
    pub fn is_specification(&self) -> bool {
        self.root.is_none()
    }
}

pub struct Comparator<'r> {
    registry: &'r LanguageRegistry,
    catalog: Catalog,
    options: ComparatorOptions,
}

impl<'r> Comparator<'r> {
    /// Comparator over the built-in feature catalogue.
    pub fn new(registry: &'r LanguageRegistry, options: ComparatorOptions) -> TandemResult<Self> {
        Ok(Self::with_catalog(registry, Catalog::builtin()?, options))
    }

    pub fn with_catalog(registry: &'r LanguageRegistry, catalog: Catalog, options: ComparatorOptions) -> Self {
        Self {
            registry,
            catalog,
            options,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn options(&self) -> &ComparatorOptions {
        &self.options
    }

    pub fn load(&self, input: &ImplementationInput) -> TandemResult<LoadedImplementation> {
        self.load_with_cancel(input, &CancellationToken::new())
    }

    /// Scan one input for feature markers and, when enabled, its structure.
    pub fn load_with_cancel(
        &self,
        input: &ImplementationInput,
        cancel: &CancellationToken,
    ) -> TandemResult<LoadedImplementation> {
        match input {
            ImplementationInput::Specification {
                text,
                label,
                source_name,
            } => Ok(LoadedImplementation {
                label: label.clone().unwrap_or_else(|| "specification".to_string()),
                language: None,
                root: None,
                files: Vec::new(),
                presence: features::scan_spec(&self.catalog, text, source_name.as_deref()),
                structure: None,
            }),
            ImplementationInput::Project { root, language, label } => {
                self.load_project(root, *language, label.as_deref(), cancel)
            }
        }
    }

    fn load_project(
        &self,
        root: &Path,
        language: Option<Language>,
        label: Option<&str>,
        cancel: &CancellationToken,
    ) -> TandemResult<LoadedImplementation> {
        if !root.is_dir() {
            return Err(TandemError::InputNotFound(root.to_path_buf()));
        }
        let exclude = &self.options.analyzer.exclude_patterns;
        let language = match language {
            Some(language) => language,
            None => detect_project_language(root, exclude).ok_or_else(|| TandemError::NoComparableFiles {
                root: root.to_path_buf(),
                language: "any supported".to_string(),
            })?,
        };
        self.registry.get(language)?;

        let sources = features::load_sources(root, language, self.options.include_tests, exclude);
        if sources.is_empty() {
            return Err(TandemError::NoComparableFiles {
                root: root.to_path_buf(),
                language: language.name().to_string(),
            });
        }
        let presence = features::scan_sources(&self.catalog, language, &sources);
        let files = sources
            .iter()
            .map(|s| s.path.clone())
            .filter(|p| !is_test_path(p, language))
            .collect();

        let structure = if self.options.analyze_structure {
            let options = AnalyzerOptions {
                include_tests: true,
                ..self.options.analyzer.clone()
            };
            match Analyzer::new(self.registry, options).analyze_with_cancel(root, language, cancel) {
                Ok(analysis) => Some(StructureProfile::from_analysis(&analysis, root)),
                Err(TandemError::Cancelled) => return Err(TandemError::Cancelled),
                Err(e) => {
                    warn!("Structural analysis of {} failed: {e}", root.display());
                    None
                }
            }
        } else {
            None
        };

        Ok(LoadedImplementation {
            label: label.map(str::to_string).unwrap_or_else(|| language.name().to_string()),
            language: Some(language),
            root: Some(root.to_path_buf()),
            files,
            presence,
            structure,
        })
    }

    /// First input is the reference, the rest are candidates.
    pub fn compare_all(&self, inputs: &[ImplementationInput]) -> TandemResult<ParityReport> {
        match inputs.split_first() {
            Some((reference, candidates)) if !candidates.is_empty() => self.compare(reference, candidates),
            _ => Err(TandemError::TooFewImplementations(inputs.len())),
        }
    }

    pub fn compare(
        &self,
        reference: &ImplementationInput,
        candidates: &[ImplementationInput],
    ) -> TandemResult<ParityReport> {
        if candidates.is_empty() {
            return Err(TandemError::TooFewImplementations(1));
        }
        let reference = self.load(reference)?;
        let candidates = candidates
            .iter()
            .map(|c| self.load(c))
            .collect::<TandemResult<Vec<_>>>()?;
        self.compare_loaded(&reference, &candidates)
    }

    /// Compare already-loaded implementations. Duplicate labels are
    /// disambiguated with a `#n` suffix.
    pub fn compare_loaded(
        &self,
        reference: &LoadedImplementation,
        candidates: &[LoadedImplementation],
    ) -> TandemResult<ParityReport> {
        if candidates.is_empty() {
            return Err(TandemError::TooFewImplementations(1));
        }
        let labels = unique_labels(
            std::iter::once(reference)
                .chain(candidates.iter())
                .map(|i| i.label.as_str()),
        );
        let (reference_label, candidate_labels) = labels.split_first().ok_or(TandemError::TooFewImplementations(0))?;

        let presences: Vec<Presence<'_>> = std::iter::once(reference)
            .chain(candidates.iter())
            .zip(labels.iter())
            .map(|(implementation, label)| Presence {
                label,
                found: &implementation.presence,
            })
            .collect();
        let features = scoring::feature_matrix(&self.catalog, &presences);
        let contexts: Vec<CandidateContext<'_>> = candidates
            .iter()
            .zip(candidate_labels.iter())
            .map(|(candidate, label)| CandidateContext {
                label,
                files: &candidate.files,
                is_specification: candidate.is_specification(),
            })
            .collect();
        let gaps = scoring::find_gaps(&self.catalog, &features, reference_label, &contexts);
        let reference_count = scoring::reference_feature_count(&features, reference_label);
        let score = scoring::parity_score(gaps.len(), reference_count, candidates.len());

        let mut dimension_scores = BTreeMap::new();
        for (candidate, label) in candidates.iter().zip(candidate_labels.iter()) {
            let missing = gaps.iter().filter(|g| &g.missing_in == label).count();
            let behavioral = scoring::parity_score(missing, reference_count, 1);
            dimension_scores.insert(
                label.clone(),
                dimensions::score(reference.structure.as_ref(), candidate.structure.as_ref(), behavioral),
            );
        }
        let fix_instructions = scoring::fix_instructions(&gaps, &contexts);

        info!(
            "Compared {} against {} candidate(s): {} feature(s), {} gap(s), score {:.3}",
            reference_label,
            candidates.len(),
            features.len(),
            gaps.len(),
            score
        );
        Ok(ParityReport {
            reference: reference_label.clone(),
            candidates: candidate_labels.to_vec(),
            features,
            gaps,
            score,
            dimensions: dimension_scores,
            fix_instructions,
        })
    }
}

/// First occurrence keeps its label; repeats get the lowest `#n` suffix no
/// other label uses.
fn unique_labels<'a>(labels: impl Iterator<Item = &'a str>) -> Vec<String> {
    let labels: Vec<&str> = labels.collect();
    let mut taken: BTreeSet<String> = labels.iter().map(|l| l.to_string()).collect();
    let mut emitted: BTreeSet<&str> = BTreeSet::new();
    let mut next_suffix: BTreeMap<&str, usize> = BTreeMap::new();
    labels
        .iter()
        .map(|&label| {
            if emitted.insert(label) {
                return label.to_string();
            }
            let n = next_suffix.entry(label).or_insert(2);
            let mut candidate = format!("{label}#{n}");
            while taken.contains(&candidate) {
                *n += 1;
                candidate = format!("{label}#{n}");
            }
            *n += 1;
            taken.insert(candidate.clone());
            candidate
        })
        .collect()
}
