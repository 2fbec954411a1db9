//! Feature matrix, gap list, parity score and fix instructions.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use indexmap::IndexMap;

use crate::config::clamp_unit;
use crate::models::{FeatureStatus, GapSeverity, Implementation, ParityGap};
use crate::parity::catalog::{severity_for, Catalog};
use crate::parity::features::target_file;

/// One implementation's presence map, under its label.
pub struct Presence<'a> {
    pub label: &'a str,
    pub found: &'a BTreeMap<String, Implementation>,
}

/// What gap reporting needs to know about a candidate.
pub struct CandidateContext<'a> {
    pub label: &'a str,
    /// Candidate source files, for target-file guessing. Empty for a
    /// specification.
    pub files: &'a [String],
    pub is_specification: bool,
}

/// Rows for every catalogue feature present in at least one
/// implementation. Each row records every implementation, present or not,
/// in input order. Presence never depends on which input is the reference.
pub fn feature_matrix(catalog: &Catalog, implementations: &[Presence<'_>]) -> Vec<FeatureStatus> {
    catalog
        .features()
        .iter()
        .filter(|feature| implementations.iter().any(|p| p.found.contains_key(&feature.id)))
        .map(|feature| FeatureStatus {
            id: feature.id.clone(),
            name: feature.name.clone(),
            category: feature.category,
            implementations: implementations
                .iter()
                .map(|p| {
                    let record = p.found.get(&feature.id).cloned().unwrap_or_default();
                    (p.label.to_string(), record)
                })
                .collect::<IndexMap<_, _>>(),
        })
        .collect()
}

fn is_present(row: &FeatureStatus, label: &str) -> bool {
    row.implementations.get(label).is_some_and(|i| i.present)
}

/// Number of matrix rows the reference has.
pub fn reference_feature_count(features: &[FeatureStatus], reference: &str) -> usize {
    features.iter().filter(|row| is_present(row, reference)).count()
}

fn suggested_fix(row: &FeatureStatus, reference: &Implementation, candidate: &CandidateContext<'_>, target: Option<&str>) -> String {
    let origin = match (&reference.file, reference.line) {
        (Some(file), Some(line)) => format!(" (reference: {file}:{line})"),
        (Some(file), None) => format!(" (reference: {file})"),
        _ => String::new(),
    };
    if candidate.is_specification {
        return format!(
            "Describe {} ({}) in the specification{origin}.",
            row.name,
            row.category.name()
        );
    }
    match target {
        Some(target) => format!(
            "Implement {} in {} ({target}) to match the reference{origin}.",
            row.name, candidate.label
        ),
        None => format!("Implement {} in {} to match the reference{origin}.", row.name, candidate.label),
    }
}

/// A gap for every (feature, candidate) pair where the reference has the
/// feature and the candidate does not. Ordered by severity (high first),
/// then feature id, then candidate label.
pub fn find_gaps(
    catalog: &Catalog,
    features: &[FeatureStatus],
    reference: &str,
    candidates: &[CandidateContext<'_>],
) -> Vec<ParityGap> {
    let mut gaps = Vec::new();
    for row in features {
        let Some(reference_record) = row.implementations.get(reference).filter(|r| r.present) else {
            continue;
        };
        let category = catalog.get(&row.id).map(|f| f.category).unwrap_or(row.category);
        for candidate in candidates {
            if is_present(row, candidate.label) {
                continue;
            }
            let target = if candidate.is_specification {
                None
            } else {
                target_file(category, candidate.files)
            };
            gaps.push(ParityGap {
                feature_id: row.id.clone(),
                feature_name: row.name.clone(),
                category,
                severity: severity_for(category),
                missing_in: candidate.label.to_string(),
                reference_file: reference_record.file.clone(),
                reference_snippet: reference_record.snippet.clone(),
                suggested_fix: suggested_fix(row, reference_record, candidate, target.as_deref()),
                target_file: target,
            });
        }
    }
    sort_gaps(&mut gaps);
    gaps
}

pub fn sort_gaps(gaps: &mut [ParityGap]) {
    gaps.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| a.feature_id.cmp(&b.feature_id))
            .then_with(|| a.missing_in.cmp(&b.missing_in))
    });
}

/// `1 - gaps / (features * candidates)`, clamped to [0, 1]. No comparable
/// features scores 1.0.
pub fn parity_score(gap_count: usize, feature_count: usize, candidate_count: usize) -> f64 {
    let denominator = feature_count * candidate_count;
    if denominator == 0 {
        return 1.0;
    }
    clamp_unit(1.0 - gap_count as f64 / denominator as f64)
}

pub fn severity_label(severity: GapSeverity) -> &'static str {
    match severity {
        GapSeverity::High => "high",
        GapSeverity::Medium => "medium",
        GapSeverity::Low => "low",
    }
}

/// Natural-language instructions per candidate, listing its gaps in
/// severity order with the reference snippet for each.
pub fn fix_instructions(gaps: &[ParityGap], candidates: &[CandidateContext<'_>]) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for candidate in candidates {
        let mine: Vec<&ParityGap> = gaps.iter().filter(|g| g.missing_in == candidate.label).collect();
        let mut text = String::new();
        if mine.is_empty() {
            let _ = writeln!(text, "{} has every feature the reference has.", candidate.label);
            out.insert(candidate.label.to_string(), text);
            continue;
        }
        let _ = writeln!(text, "{} is missing {} feature(s):", candidate.label, mine.len());
        for (index, gap) in mine.iter().enumerate() {
            let _ = writeln!(
                text,
                "{}. [{}] {}: {}",
                index + 1,
                severity_label(gap.severity),
                gap.feature_name,
                gap.suggested_fix
            );
            if let Some(snippet) = gap.reference_snippet.as_deref().filter(|s| !s.trim().is_empty()) {
                for line in snippet.lines() {
                    let _ = writeln!(text, "       | {line}");
                }
            }
        }
        out.insert(candidate.label.to_string(), text);
    }
    out
}
