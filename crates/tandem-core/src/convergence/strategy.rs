//! Phase selection: which side a refinement round edits.

use crate::config::StrategyKind;
use crate::models::{FeatureCategory, Phase};

/// Rounds a one-sided strategy spends on its first phase.
pub const LEAD_ROUNDS: usize = 2;

impl StrategyKind {
    /// Phase for 1-based `iteration`.
    pub fn phase(&self, iteration: usize) -> Phase {
        match self {
            StrategyKind::SpecFirst if iteration <= LEAD_ROUNDS => Phase::Spec,
            StrategyKind::SpecFirst => Phase::Code,
            StrategyKind::CodeFirst if iteration <= LEAD_ROUNDS => Phase::Code,
            StrategyKind::CodeFirst => Phase::Spec,
            StrategyKind::Balanced if iteration % 2 == 1 => Phase::Spec,
            StrategyKind::Balanced => Phase::Code,
        }
    }
}

/// Gap categories a phase puts first.
pub fn focus_categories(phase: Phase) -> &'static [FeatureCategory] {
    match phase {
        Phase::Spec => &[
            FeatureCategory::Validation,
            FeatureCategory::Configuration,
            FeatureCategory::Metadata,
        ],
        Phase::Code => &[FeatureCategory::Core, FeatureCategory::Async, FeatureCategory::Validation],
    }
}

pub fn is_focused(phase: Phase, category: FeatureCategory) -> bool {
    focus_categories(phase).contains(&category)
}
