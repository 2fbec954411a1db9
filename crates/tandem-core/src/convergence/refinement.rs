//! Turn a round's gaps into spec and code change instructions.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::convergence::strategy::is_focused;
use crate::models::{FeatureCategory, GapSeverity, ParityGap, Phase};
use crate::parity::scoring::severity_label;

/// Prompt key for specification-only instructions.
pub const SPECIFICATION_PROMPT: &str = "specification";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    Add,
    Modify,
    Remove,
}

impl ChangeAction {
    fn verb(&self) -> &'static str {
        match self {
            ChangeAction::Add => "add",
            ChangeAction::Modify => "modify",
            ChangeAction::Remove => "remove",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpecChange {
    pub section: String,
    pub action: ChangeAction,
    pub element: String,
    pub description: String,
    pub severity: GapSeverity,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CodeChange {
    pub action: ChangeAction,
    pub element_type: String,
    pub element_name: String,
    pub description: String,
    pub severity: GapSeverity,
    pub target_file: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RefinementPlan {
    pub phase: Phase,
    pub spec_changes: Vec<SpecChange>,
    /// Implementation label -> changes, severity ordered.
    pub code_changes: BTreeMap<String, Vec<CodeChange>>,
}

fn section_for(category: FeatureCategory) -> &'static str {
    match category {
        FeatureCategory::Validation => "Validation",
        FeatureCategory::Configuration => "Configuration",
        FeatureCategory::Metadata => "Data Model",
        FeatureCategory::Async => "Concurrency",
        FeatureCategory::Core => "Behavior",
    }
}

fn element_type_for(category: FeatureCategory) -> &'static str {
    match category {
        FeatureCategory::Validation => "validation",
        FeatureCategory::Configuration => "configuration",
        FeatureCategory::Metadata => "field",
        FeatureCategory::Async | FeatureCategory::Core => "function",
    }
}

impl RefinementPlan {
    /// Split `gaps` into spec and code changes.
    ///
    /// A gap becomes a spec change when the side missing the feature is a
    /// specification, or when the phase is [`Phase::Spec`] and the gap's
    /// category is in that phase's focus. Everything else is a code change
    /// for the implementation that lacks the feature.
    pub fn from_gaps(gaps: &[ParityGap], phase: Phase, specification_labels: &BTreeSet<String>) -> Self {
        let mut spec_changes = Vec::new();
        let mut code_changes: BTreeMap<String, Vec<CodeChange>> = BTreeMap::new();
        let mut spec_elements = BTreeSet::new();

        for gap in gaps {
            let to_spec = specification_labels.contains(&gap.missing_in)
                || (phase == Phase::Spec && is_focused(phase, gap.category));
            if to_spec {
                if spec_elements.insert(gap.feature_id.clone()) {
                    spec_changes.push(SpecChange {
                        section: section_for(gap.category).to_string(),
                        action: ChangeAction::Add,
                        element: gap.feature_name.clone(),
                        description: format!(
                            "State the {} requirement explicitly so every implementation carries it. {}",
                            gap.feature_name.to_lowercase(),
                            gap.suggested_fix
                        ),
                        severity: gap.severity,
                    });
                }
                continue;
            }
            code_changes.entry(gap.missing_in.clone()).or_default().push(CodeChange {
                action: ChangeAction::Add,
                element_type: element_type_for(gap.category).to_string(),
                element_name: gap.feature_id.clone(),
                description: gap.suggested_fix.clone(),
                severity: gap.severity,
                target_file: gap.target_file.clone(),
            });
        }

        spec_changes.sort_by(|a, b| b.severity.cmp(&a.severity).then_with(|| a.element.cmp(&b.element)));
        for changes in code_changes.values_mut() {
            changes.sort_by(|a, b| b.severity.cmp(&a.severity).then_with(|| a.element_name.cmp(&b.element_name)));
        }
        Self {
            phase,
            spec_changes,
            code_changes,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.spec_changes.is_empty() && self.code_changes.values().all(Vec::is_empty)
    }

    fn write_spec_section(&self, out: &mut String) {
        if self.spec_changes.is_empty() {
            return;
        }
        let _ = writeln!(out, "## Specification changes");
        for (i, change) in self.spec_changes.iter().enumerate() {
            let _ = writeln!(
                out,
                "{}. [{}] {} section: {} {}. {}",
                i + 1,
                severity_label(change.severity),
                change.section,
                change.action.verb(),
                change.element,
                change.description
            );
        }
        out.push('\n');
    }

    fn write_code_section(&self, out: &mut String, label: &str, changes: &[CodeChange]) {
        if changes.is_empty() {
            return;
        }
        let _ = writeln!(out, "## Code changes for {label}");
        for (i, change) in changes.iter().enumerate() {
            let location = change
                .target_file
                .as_deref()
                .map(|f| format!(" in {f}"))
                .unwrap_or_default();
            let _ = writeln!(
                out,
                "{}. [{}] {} {} `{}`{location}. {}",
                i + 1,
                severity_label(change.severity),
                change.action.verb(),
                change.element_type,
                change.element_name,
                change.description
            );
        }
        out.push('\n');
    }

    fn header(&self) -> String {
        let phase = match self.phase {
            Phase::Spec => "specification",
            Phase::Code => "code",
        };
        format!("# Refinement instructions ({phase} phase)\n\n")
    }

    /// One prompt covering spec changes and every language's code changes.
    pub fn render(&self) -> String {
        let mut out = self.header();
        if self.is_empty() {
            out.push_str("No parity gaps remain.\n");
            return out;
        }
        self.write_spec_section(&mut out);
        for (label, changes) in &self.code_changes {
            self.write_code_section(&mut out, label, changes);
        }
        out
    }

    /// Per-implementation prompts: the shared spec section plus that
    /// implementation's own code changes. Spec changes also get a prompt of
    /// their own under [`SPECIFICATION_PROMPT`].
    pub fn prompts(&self) -> BTreeMap<String, String> {
        let mut prompts: BTreeMap<String, String> = self
            .code_changes
            .iter()
            .filter(|(_, changes)| !changes.is_empty())
            .map(|(label, changes)| {
                let mut out = self.header();
                self.write_spec_section(&mut out);
                self.write_code_section(&mut out, label, changes);
                (label.clone(), out)
            })
            .collect();
        if !self.spec_changes.is_empty() {
            let mut out = self.header();
            self.write_spec_section(&mut out);
            prompts.entry(SPECIFICATION_PROMPT.to_string()).or_insert(out);
        }
        prompts
    }
}
