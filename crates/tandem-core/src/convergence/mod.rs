//! Iterative refinement loop: compare, record, decide, repeat until the
//! candidates reach parity, stall, or run out of rounds.

pub mod cache;
pub mod metrics;
pub mod refinement;
pub mod strategy;

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::analyze::CancellationToken;
use crate::config::ConvergenceConfig;
use crate::errors::{TandemError, TandemResult};
use crate::models::{
    ConvergenceMetrics, FeatureCategory, Iteration, Language, LoopResult, LoopStatus, ParityGap, ParityReport, Phase,
};
use crate::parity::{Comparator, ImplementationInput, LoadedImplementation};

use cache::{AnalysisCache, Lookup};
use refinement::RefinementPlan;
use strategy::focus_categories;

/// What the evaluator is asked to produce for one round.
#[derive(Clone, Copy, Debug)]
pub struct RoundRequest<'a> {
    /// 1-based round number.
    pub iteration: usize,
    pub phase: Phase,
    pub focus: &'static [FeatureCategory],
    /// Instructions derived from the previous round's gaps.
    pub previous: Option<&'a RefinementPlan>,
    /// The engine's token. Long-running work in the evaluator should stop
    /// with [`TandemError::Cancelled`] once it is set.
    pub cancel: &'a CancellationToken,
}

#[derive(Clone, Debug)]
pub struct RoundEvaluation {
    pub report: ParityReport,
    /// Files that changed since the previous round.
    pub touched_files: Vec<String>,
    /// Report labels that are specification text rather than code.
    pub specification_labels: BTreeSet<String>,
}

impl RoundEvaluation {
    pub fn new(report: ParityReport) -> Self {
        Self {
            report,
            touched_files: Vec::new(),
            specification_labels: BTreeSet::new(),
        }
    }
}

/// The seam to whatever produces candidates between rounds. `Ok(None)`
/// means the round had nothing comparable to score.
pub trait RoundEvaluator {
    fn evaluate(&mut self, request: &RoundRequest<'_>) -> TandemResult<Option<RoundEvaluation>>;
}

/// Evaluates each round by comparing a fixed source of truth against the
/// candidates `provider` returns for that round. Loaded projects are cached
/// for the life of the evaluator and reloaded only when their tree changes.
pub struct ComparatorEvaluator<'c, 'r, P> {
    comparator: &'c Comparator<'r>,
    source: ImplementationInput,
    provider: P,
    cache: AnalysisCache<LoadedImplementation>,
}

impl<'c, 'r, P> ComparatorEvaluator<'c, 'r, P>
where
    P: FnMut(&RoundRequest<'_>) -> TandemResult<Option<Vec<ImplementationInput>>>,
{
    pub fn new(comparator: &'c Comparator<'r>, source: ImplementationInput, provider: P) -> Self {
        Self {
            comparator,
            source,
            provider,
            cache: AnalysisCache::default(),
        }
    }

    pub fn cache(&self) -> &AnalysisCache<LoadedImplementation> {
        &self.cache
    }

    fn load(
        &self,
        input: &ImplementationInput,
        cancel: &CancellationToken,
    ) -> TandemResult<Lookup<LoadedImplementation>> {
        let root = match input.root() {
            Some(root) if root.is_dir() => root,
            _ => {
                return Ok(Lookup {
                    value: self.comparator.load_with_cancel(input, cancel)?,
                    fresh: true,
                    changed: Vec::new(),
                });
            }
        };
        let mut lookup = self
            .cache
            .get_or_load(root, || self.comparator.load_with_cancel(input, cancel))?;
        if let ImplementationInput::Project { label: Some(label), .. } = input {
            lookup.value.label.clone_from(label);
        }
        Ok(lookup)
    }
}

/// Changed paths that are sources of the candidate's language: present in
/// its file list, or removed with a matching extension.
fn touched_sources(candidate: &LoadedImplementation, changed: Vec<String>) -> Vec<String> {
    changed
        .into_iter()
        .filter(|path| {
            if candidate.files.binary_search(path).is_ok() {
                return true;
            }
            let removed = candidate.root.as_ref().is_some_and(|root| !root.join(path).exists());
            removed && candidate.language.is_some() && Language::from_path(Path::new(path)) == candidate.language
        })
        .collect()
}

impl<P> RoundEvaluator for ComparatorEvaluator<'_, '_, P>
where
    P: FnMut(&RoundRequest<'_>) -> TandemResult<Option<Vec<ImplementationInput>>>,
{
    fn evaluate(&mut self, request: &RoundRequest<'_>) -> TandemResult<Option<RoundEvaluation>> {
        let inputs = match (self.provider)(request)? {
            Some(inputs) if !inputs.is_empty() => inputs,
            _ => {
                warn!("Round {} received no candidates", request.iteration);
                return Ok(None);
            }
        };
        if request.cancel.is_cancelled() {
            return Err(TandemError::Cancelled);
        }

        let reference = match self.load(&self.source, request.cancel) {
            Ok(lookup) => lookup.value,
            Err(TandemError::NoComparableFiles { root, language }) => {
                warn!("Source of truth at {} has no {language} files", root.display());
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let mut candidates = Vec::with_capacity(inputs.len());
        let mut touched_files = Vec::new();
        for input in &inputs {
            match self.load(input, request.cancel) {
                Ok(Lookup { value: candidate, changed, .. }) => {
                    if !candidate.is_specification() {
                        touched_files.extend(touched_sources(&candidate, changed));
                    }
                    candidates.push(candidate);
                }
                Err(TandemError::NoComparableFiles { root, language }) => {
                    warn!("Candidate at {} has no {language} files", root.display());
                    return Ok(None);
                }
                Err(e) => return Err(e),
            }
        }

        let report = self.comparator.compare_loaded(&reference, &candidates)?;
        let specification_labels = report
            .candidates
            .iter()
            .zip(candidates.iter())
            .filter(|(_, candidate)| candidate.is_specification())
            .map(|(label, _)| label.clone())
            .collect();
        debug!(
            "Round {} cache: {} hit(s), {} miss(es)",
            request.iteration,
            self.cache.stats().hits,
            self.cache.stats().misses
        );
        Ok(Some(RoundEvaluation {
            report,
            touched_files,
            specification_labels,
        }))
    }
}

pub struct ConvergenceEngine {
    config: ConvergenceConfig,
    cancel: CancellationToken,
}

impl ConvergenceEngine {
    pub fn new(config: ConvergenceConfig) -> Self {
        Self::with_cancellation(config, CancellationToken::new())
    }

    pub fn with_cancellation(config: ConvergenceConfig, cancel: CancellationToken) -> Self {
        Self {
            config: config.clamped(),
            cancel,
        }
    }

    pub fn config(&self) -> &ConvergenceConfig {
        &self.config
    }

    /// Clone of the token checked at the top of every round and handed to
    /// the evaluator with each request.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run rounds until a terminal state. Never fails: evaluator errors end
    /// the loop as [`LoopStatus::Fatal`] with the history gathered so far.
    pub fn run<E: RoundEvaluator + ?Sized>(&self, evaluator: &mut E) -> LoopResult {
        let config = &self.config;
        let mut metrics = ConvergenceMetrics::new(config.trend_window, config.stuck_threshold);
        let mut iterations: Vec<Iteration> = Vec::new();
        let mut last_gaps: Option<Vec<ParityGap>> = None;
        let mut plan: Option<RefinementPlan> = None;
        let mut status = LoopStatus::MaxIterations;
        let mut failure: Option<String> = None;

        info!(
            "Starting refinement: threshold {:.2}, up to {} round(s), {:?} strategy",
            config.threshold, config.max_iterations, config.strategy
        );
        for number in 1..=config.max_iterations {
            if self.cancel.is_cancelled() {
                status = LoopStatus::Cancelled;
                break;
            }
            let phase = config.strategy.phase(number);
            let request = RoundRequest {
                iteration: number,
                phase,
                focus: focus_categories(phase),
                previous: plan.as_ref(),
                cancel: &self.cancel,
            };
            let started = Instant::now();
            let evaluation = match evaluator.evaluate(&request) {
                Ok(Some(evaluation)) => evaluation,
                Ok(None) => {
                    status = LoopStatus::Fatal;
                    failure = Some(format!("round {number} produced no comparable analysis"));
                    break;
                }
                Err(TandemError::Cancelled) => {
                    status = LoopStatus::Cancelled;
                    break;
                }
                Err(e) => {
                    status = LoopStatus::Fatal;
                    failure = Some(format!("round {number} failed: {e}"));
                    break;
                }
            };

            let report = evaluation.report;
            let gaps_remaining = report.gaps.len();
            let gaps_fixed = last_gaps
                .as_ref()
                .map(|previous| previous.len().saturating_sub(gaps_remaining))
                .unwrap_or(0);
            metrics.record(report.score);
            iterations.push(Iteration {
                number,
                phase,
                score: report.score,
                gaps_fixed,
                gaps_remaining,
                touched_files: evaluation.touched_files,
                duration_ms: started.elapsed().as_millis() as u64,
            });
            info!(
                "Round {number} ({phase:?}): score {:.3}, {gaps_remaining} gap(s), {gaps_fixed} fixed, trend {:+.4}",
                report.score, metrics.trend
            );

            plan = Some(RefinementPlan::from_gaps(
                &report.gaps,
                config.strategy.phase(number + 1),
                &evaluation.specification_labels,
            ));
            last_gaps = Some(report.gaps);

            if report.score >= config.threshold {
                status = LoopStatus::Converged;
                break;
            }
            if metrics.is_stuck {
                status = LoopStatus::Stuck;
                break;
            }
        }

        if let Some(reason) = &failure {
            warn!("Refinement stopped: {reason}");
        }
        let final_score = metrics.latest().unwrap_or(0.0);
        let summary = summarize(status, config, &metrics, iterations.len(), last_gaps.as_deref(), failure.as_deref());
        info!("{summary}");
        LoopResult {
            converged: status == LoopStatus::Converged,
            status,
            final_score,
            iterations,
            unresolved_gaps: last_gaps.unwrap_or_default(),
            refinement_prompts: plan.map(|p| p.prompts()).unwrap_or_default(),
            metrics,
            summary,
        }
    }
}

fn summarize(
    status: LoopStatus,
    config: &ConvergenceConfig,
    metrics: &ConvergenceMetrics,
    rounds: usize,
    gaps: Option<&[ParityGap]>,
    failure: Option<&str>,
) -> String {
    let score = metrics
        .latest()
        .map(|s| format!("parity {s:.3} (threshold {:.2})", config.threshold))
        .unwrap_or_else(|| "no score recorded".to_string());
    let unresolved = gaps.map(<[ParityGap]>::len).unwrap_or(0);
    match status {
        LoopStatus::Converged => format!("Converged after {rounds} round(s): {score}, {unresolved} gap(s) unresolved."),
        LoopStatus::Stuck => format!(
            "Stopped after {rounds} round(s) without progress: {score}, {unresolved} gap(s) unresolved; {}.",
            metrics.stuck_reason.as_deref().unwrap_or("trend stalled")
        ),
        LoopStatus::MaxIterations => format!(
            "Reached the {rounds}-round limit without converging: {score}, {unresolved} gap(s) unresolved."
        ),
        LoopStatus::Fatal => format!(
            "Stopped after {rounds} round(s): {}. Last result: {score}.",
            failure.unwrap_or("evaluation failed")
        ),
        LoopStatus::Cancelled => format!("Cancelled after {rounds} round(s): {score}."),
    }
}
