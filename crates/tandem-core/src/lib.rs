//! Tandem core library: multi-language source analysis and cross-implementation
//! parity checking.
//!
//! The crate is layered bottom-up:
//!
//! * [`extract`] turns one source file into a [`models::ParseResult`] using a
//!   per-language tree-sitter extractor.
//! * [`analyze`] walks a project, extracts every file in parallel, resolves
//!   names into call/type graphs and optionally enriches the result with the
//!   language's native toolchain.
//! * [`parity`] detects catalogued features in projects or specification text
//!   and scores candidates against a reference.
//! * [`convergence`] drives repeated comparisons until candidates reach the
//!   configured parity threshold or stop improving.

pub mod analyze;
pub mod config;
pub mod convergence;
pub mod errors;
pub mod extract;
pub mod models;
pub mod parity;

pub use analyze::{Analyzer, CancellationToken};
pub use config::{AnalyzerOptions, ComparatorOptions, ConvergenceConfig, StrategyKind};
pub use convergence::{ComparatorEvaluator, ConvergenceEngine, RoundEvaluation, RoundEvaluator, RoundRequest};
pub use errors::{TandemError, TandemResult};
pub use extract::{Extractor, LanguageRegistry};
pub use models::{Analysis, Language, LoopResult, LoopStatus, ParityReport, ParseResult};
pub use parity::{Comparator, ImplementationInput};
