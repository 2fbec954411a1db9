//! Defaults, guardrails and option structs.
//!
//! Every option struct deserializes from JSON (for the transport layer) and
//! can be overlaid from `TANDEM_*` environment variables.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// Defaults
pub const DEFAULT_TOOLCHAIN_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_TREND_WINDOW: usize = 3;
pub const DEFAULT_STUCK_THRESHOLD: f64 = 0.02;
pub const DEFAULT_CONVERGENCE_THRESHOLD: f64 = 0.90;
pub const DEFAULT_MAX_ITERATIONS: usize = 5;
pub const DEFAULT_WORKERS: usize = 4;
pub const SNIPPET_WINDOW_LINES: usize = 8;
pub const SNIPPET_LEAD_LINES: usize = 2;

// Guards
pub const MAX_ITERATIONS_LIMIT: usize = 50;
pub const MAX_TREND_WINDOW: usize = 20;
pub const MIN_TREND_WINDOW: usize = 2;
pub const MAX_TOOLCHAIN_TIMEOUT_SECS: u64 = 600;
pub const MAX_WORKERS: usize = 64;
pub const MAX_FILE_BYTES: u64 = 2 * 1024 * 1024;
pub const MAX_DIAGNOSTICS_PER_TOOL: usize = 500;

pub fn clamp_usize(value: usize, minimum: usize, maximum: usize) -> usize {
    value.max(minimum).min(maximum)
}

pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

fn env_flag(name: &str) -> Option<bool> {
    let val = std::env::var(name).ok()?;
    let v = val.trim().to_lowercase();
    if matches!(v.as_str(), "0" | "false" | "no" | "off") {
        Some(false)
    } else if matches!(v.as_str(), "1" | "true" | "yes" | "on") {
        Some(true)
    } else {
        None
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok()?.trim().parse().ok()
}

// ---------------------------------------------------------------------------
// Analyzer
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerOptions {
    pub include_tests: bool,
    /// Run the language's native toolchain when it is installed.
    pub enrich: bool,
    pub toolchain_timeout_secs: u64,
    pub workers: usize,
    /// Extra gitignore-style patterns to skip.
    pub exclude_patterns: Vec<String>,
}

impl Default for AnalyzerOptions {
    fn default() -> Self {
        Self {
            include_tests: false,
            enrich: true,
            toolchain_timeout_secs: DEFAULT_TOOLCHAIN_TIMEOUT_SECS,
            workers: DEFAULT_WORKERS,
            exclude_patterns: Vec::new(),
        }
    }
}

impl AnalyzerOptions {
    pub fn from_env() -> Self {
        let mut options = Self::default();
        if let Some(v) = env_flag("TANDEM_INCLUDE_TESTS") {
            options.include_tests = v;
        }
        if let Some(v) = env_flag("TANDEM_ENRICH") {
            options.enrich = v;
        }
        if let Some(v) = env_parse("TANDEM_TOOLCHAIN_TIMEOUT_SECS") {
            options.toolchain_timeout_secs = v;
        }
        if let Some(v) = env_parse("TANDEM_WORKERS") {
            options.workers = v;
        }
        options.clamped()
    }

    /// Extraction only, no subprocesses.
    pub fn offline() -> Self {
        Self {
            enrich: false,
            ..Self::default()
        }
    }

    pub fn clamped(mut self) -> Self {
        self.toolchain_timeout_secs =
            self.toolchain_timeout_secs.clamp(1, MAX_TOOLCHAIN_TIMEOUT_SECS);
        self.workers = clamp_usize(self.workers, 1, MAX_WORKERS);
        self
    }

    pub fn toolchain_timeout(&self) -> Duration {
        Duration::from_secs(self.toolchain_timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// Comparator
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparatorOptions {
    /// Scan test files for feature markers too.
    pub include_tests: bool,
    /// Run structural analysis for the type/structural/test/idiomatic dimensions.
    pub analyze_structure: bool,
    pub analyzer: AnalyzerOptions,
}

impl Default for ComparatorOptions {
    fn default() -> Self {
        Self {
            include_tests: false,
            analyze_structure: true,
            analyzer: AnalyzerOptions::offline(),
        }
    }
}

impl ComparatorOptions {
    /// Enrichment stays off unless `TANDEM_ENRICH` turns it on.
    pub fn from_env() -> Self {
        let mut options = Self::default();
        if let Some(v) = env_flag("TANDEM_INCLUDE_TESTS") {
            options.include_tests = v;
        }
        options.analyzer = AnalyzerOptions {
            enrich: env_flag("TANDEM_ENRICH").unwrap_or(false),
            ..AnalyzerOptions::from_env()
        };
        options
    }
}

// ---------------------------------------------------------------------------
// Convergence
// ---------------------------------------------------------------------------

/// Which side the refinement loop edits first.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    #[default]
    SpecFirst,
    CodeFirst,
    Balanced,
}

impl StrategyKind {
    pub fn from_name(name: &str) -> Option<StrategyKind> {
        match name.trim().to_lowercase().replace('-', "_").as_str() {
            "spec_first" => Some(StrategyKind::SpecFirst),
            "code_first" => Some(StrategyKind::CodeFirst),
            "balanced" => Some(StrategyKind::Balanced),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvergenceConfig {
    pub threshold: f64,
    pub max_iterations: usize,
    pub trend_window: usize,
    pub stuck_threshold: f64,
    pub strategy: StrategyKind,
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_CONVERGENCE_THRESHOLD,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            trend_window: DEFAULT_TREND_WINDOW,
            stuck_threshold: DEFAULT_STUCK_THRESHOLD,
            strategy: StrategyKind::default(),
        }
    }
}

impl ConvergenceConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(v) = env_parse("TANDEM_CONVERGENCE_THRESHOLD") {
            config.threshold = v;
        }
        if let Some(v) = env_parse("TANDEM_MAX_ITERATIONS") {
            config.max_iterations = v;
        }
        if let Some(v) = env_parse("TANDEM_TREND_WINDOW") {
            config.trend_window = v;
        }
        if let Some(v) = env_parse("TANDEM_STUCK_THRESHOLD") {
            config.stuck_threshold = v;
        }
        if let Some(strategy) = std::env::var("TANDEM_STRATEGY")
            .ok()
            .and_then(|s| StrategyKind::from_name(&s))
        {
            config.strategy = strategy;
        }
        config.clamped()
    }

    pub fn clamped(mut self) -> Self {
        self.threshold = clamp_unit(self.threshold);
        self.max_iterations = clamp_usize(self.max_iterations, 1, MAX_ITERATIONS_LIMIT);
        self.trend_window = clamp_usize(self.trend_window, MIN_TREND_WINDOW, MAX_TREND_WINDOW);
        self.stuck_threshold = self.stuck_threshold.abs();
        self
    }
}
