//! End-to-end flows over temporary projects: extract, analyze, compare,
//! converge.

use std::fs;
use std::path::Path;

use tempfile::TempDir;

use tandem_core::config::StrategyKind;
use tandem_core::models::{DiagnosticSource, Severity};
use tandem_core::{
    Analyzer, AnalyzerOptions, CancellationToken, Comparator, ComparatorEvaluator, ComparatorOptions,
    ConvergenceConfig, ConvergenceEngine, ImplementationInput, Language, LanguageRegistry, LoopStatus,
    RoundEvaluation, RoundEvaluator, RoundRequest, TandemError, TandemResult,
};

const GO_REFERENCE: &str = "package links\n\nimport \"net/url\"\n\nfunc Shorten(raw string) (string, error) {\n\tif _, err := url.Parse(raw); err != nil {\n\t\treturn \"\", err\n\t}\n\treturn raw, nil\n}\n";

const GO_UNVALIDATED: &str = "package links\n\nfunc Shorten(raw string) (string, error) {\n\treturn raw, nil\n}\n";

fn write(root: &Path, rel: &str, body: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, body).unwrap();
}

fn project(files: &[(&str, &str)]) -> TempDir {
    let tmp = TempDir::new().unwrap();
    for (rel, body) in files {
        write(tmp.path(), rel, body);
    }
    tmp
}

fn comparator(registry: &LanguageRegistry) -> Comparator<'_> {
    Comparator::new(registry, ComparatorOptions::default()).unwrap()
}

#[test]
fn test_missing_url_validation_is_single_gap() {
    let reference = project(&[("service.go", GO_REFERENCE)]);
    let candidate = project(&[("links/service.py", "def shorten(raw):\n    return raw\n")]);
    let registry = LanguageRegistry::new();
    let report = comparator(&registry)
        .compare_all(&[
            ImplementationInput::project(reference.path()),
            ImplementationInput::project(candidate.path()),
        ])
        .unwrap();

    assert_eq!(report.gaps.len(), 1);
    let gap = &report.gaps[0];
    assert_eq!(gap.feature_id, "url_validation");
    assert_eq!(gap.missing_in, "python");
    assert!(gap.reference_snippet.as_deref().unwrap().contains("url.Parse"));
    assert!(report.fix_instructions["python"].contains("URL validation"));
}

#[test]
fn test_unreadable_project_is_input_error() {
    let reference = project(&[("service.go", GO_REFERENCE)]);
    let registry = LanguageRegistry::new();
    let result = comparator(&registry).compare_all(&[
        ImplementationInput::project(reference.path()),
        ImplementationInput::project(reference.path().join("missing")),
    ]);
    let err = result.unwrap_err();
    assert!(matches!(err, TandemError::InputNotFound(_)));
    assert!(err.is_input_error());
}

#[test]
fn test_unparseable_file_does_not_stop_analysis() {
    let tmp = project(&[
        ("src/lib.rs", "pub fn add(a: i32, b: i32) -> i32 {\n    a + b\n}\n"),
        ("src/broken.rs", "pub fn broken( {\n    let = ;\n"),
        ("src/util.rs", "pub fn double(x: i32) -> i32 {\n    if x > 0 { x * 2 } else { 0 }\n}\n"),
    ]);
    let registry = LanguageRegistry::new();
    let analysis = Analyzer::new(&registry, AnalyzerOptions::offline())
        .analyze(tmp.path(), Language::Rust)
        .unwrap();

    let warnings = analysis.diagnostics_for("src/broken.rs");
    assert!(!warnings.is_empty());
    assert!(warnings
        .iter()
        .all(|d| d.severity == Severity::Warning && d.source == DiagnosticSource::Parser));
    let names: Vec<&str> = analysis.functions().map(|f| f.name.as_str()).collect();
    assert!(names.contains(&"add"));
    assert!(names.contains(&"double"));
    assert!(analysis.diagnostics_for("src/lib.rs").is_empty());
}

#[test]
fn test_reparse_keeps_content_hashes() {
    let registry = LanguageRegistry::new();
    let extractor = registry.get(Language::Python).unwrap();
    let source = "class Store:\n    def put(self, key):\n        return key\n\ndef helper(x):\n    return x + 1\n";
    let first = extractor.parse(source.as_bytes(), "store.py").unwrap();
    let second = extractor.parse(source.as_bytes(), "store.py").unwrap();
    assert_eq!(first, second);

    let edited = source.replace("return x + 1", "return x + 2");
    let third = extractor.parse(edited.as_bytes(), "store.py").unwrap();
    let hash = |result: &tandem_core::ParseResult, name: &str| {
        result
            .functions
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.content_hash.clone())
            .unwrap()
    };
    assert_eq!(hash(&first, "put"), hash(&third, "put"));
    assert_ne!(hash(&first, "helper"), hash(&third, "helper"));
    assert_eq!(first.types[0].content_hash, third.types[0].content_hash);
}

#[test]
fn test_branching_count_grows_with_each_branch() {
    let registry = LanguageRegistry::new();
    let extractor = registry.get(Language::Go).unwrap();
    let mut previous = 0;
    for branches in 0..6 {
        let mut body = String::from("package p\n\nfunc Classify(n int) int {\n\tout := 0\n");
        for i in 0..branches {
            body.push_str(&format!("\tif n > {i} {{\n\t\tout++\n\t}}\n"));
        }
        body.push_str("\treturn out\n}\n");
        let result = extractor.parse(body.as_bytes(), "classify.go").unwrap();
        let complexity = result.functions[0].complexity;
        assert!(complexity >= 1);
        assert!(complexity > previous, "{branches} branch(es) gave {complexity}");
        previous = complexity;
    }
}

#[test]
fn test_no_features_scores_one() {
    let go = project(&[("math.go", "package p\n\nfunc Add(a, b int) int {\n\treturn a + b\n}\n")]);
    let py = project(&[("math.py", "def add(a, b):\n    return a + b\n")]);
    let registry = LanguageRegistry::new();
    let report = comparator(&registry)
        .compare_all(&[ImplementationInput::project(go.path()), ImplementationInput::project(py.path())])
        .unwrap();
    assert!(report.features.is_empty());
    assert!(report.gaps.is_empty());
    assert_eq!(report.score, 1.0);
}

#[test]
fn test_scores_stay_in_unit_range() {
    let rich = project(&[(
        "service.go",
        "package links\n\nimport (\n\t\"log\"\n\t\"net/url\"\n\t\"os\"\n\t\"time\"\n)\n\nfunc Shorten(raw string) error {\n\tlog.Printf(\"shorten %s\", raw)\n\t_ = os.Getenv(\"PREFIX\")\n\t_ = time.Now()\n\t_, err := url.Parse(raw)\n\treturn err\n}\n",
    )]);
    let bare = project(&[("main.py", "def shorten(raw):\n    return raw\n")]);
    let registry = LanguageRegistry::new();
    let comparator = comparator(&registry);
    for inputs in [
        [ImplementationInput::project(rich.path()), ImplementationInput::project(bare.path())],
        [ImplementationInput::project(bare.path()), ImplementationInput::project(rich.path())],
    ] {
        let report = comparator.compare_all(&inputs).unwrap();
        assert!((0.0..=1.0).contains(&report.score));
        for scores in report.dimensions.values() {
            for value in [scores.type_, scores.structural, scores.behavioral, scores.test_coverage, scores.idiomatic] {
                assert!((0.0..=1.0).contains(&value));
            }
        }
    }
}

#[test]
fn test_reference_swap_keeps_presence() {
    let go = project(&[("service.go", GO_REFERENCE)]);
    let py = project(&[(
        "service.py",
        "import logging\n\nlog = logging.getLogger(__name__)\n\ndef shorten(raw):\n    log.info(raw)\n    return raw\n",
    )]);
    let registry = LanguageRegistry::new();
    let comparator = comparator(&registry);
    let forward = comparator
        .compare_all(&[ImplementationInput::project(go.path()), ImplementationInput::project(py.path())])
        .unwrap();
    let backward = comparator
        .compare_all(&[ImplementationInput::project(py.path()), ImplementationInput::project(go.path())])
        .unwrap();

    assert!(forward.gaps.iter().all(|g| g.missing_in == "python"));
    assert!(backward.gaps.iter().all(|g| g.missing_in == "go"));
    let ids = |r: &tandem_core::ParityReport| r.features.iter().map(|f| f.id.clone()).collect::<Vec<_>>();
    assert_eq!(ids(&forward), ids(&backward));
    for (a, b) in forward.features.iter().zip(backward.features.iter()) {
        assert_eq!(a.implementations["go"], b.implementations["go"]);
        assert_eq!(a.implementations["python"], b.implementations["python"]);
    }
}

/// Replays a fixed score sequence through the engine.
struct Replay(Vec<f64>, usize);

impl RoundEvaluator for Replay {
    fn evaluate(&mut self, _request: &RoundRequest<'_>) -> TandemResult<Option<RoundEvaluation>> {
        let Some(score) = self.0.get(self.1).copied() else {
            return Ok(None);
        };
        self.1 += 1;
        Ok(Some(RoundEvaluation::new(tandem_core::ParityReport {
            reference: "go".into(),
            candidates: vec!["rust".into()],
            features: Vec::new(),
            gaps: Vec::new(),
            score,
            dimensions: Default::default(),
            fix_instructions: Default::default(),
        })))
    }
}

#[test]
fn test_loop_stops_at_iteration_limit() {
    let engine = ConvergenceEngine::new(ConvergenceConfig {
        threshold: 0.9,
        max_iterations: 3,
        ..ConvergenceConfig::default()
    });
    let result = engine.run(&mut Replay(vec![0.5, 0.6, 0.65], 0));
    assert!(!result.converged);
    assert_eq!(result.status, LoopStatus::MaxIterations);
    assert_eq!(result.iterations.len(), 3);
}

#[test]
fn test_loop_converges_on_first_passing_round() {
    let engine = ConvergenceEngine::new(ConvergenceConfig {
        threshold: 0.9,
        max_iterations: 10,
        ..ConvergenceConfig::default()
    });
    let mut replay = Replay(vec![0.2, 0.5, 0.8, 0.95, 0.99], 0);
    let result = engine.run(&mut replay);
    assert!(result.converged);
    assert_eq!(result.iterations.len(), 4);
    assert_eq!(replay.1, 4);
}

#[test]
fn test_loop_flags_flat_scores_as_stuck() {
    let engine = ConvergenceEngine::new(ConvergenceConfig::default());
    let result = engine.run(&mut Replay(vec![0.6, 0.61, 0.6, 0.7], 0));
    assert_eq!(result.status, LoopStatus::Stuck);
    assert!(result.metrics.is_stuck);
}

#[test]
fn test_candidate_fixed_between_rounds_converges() {
    let reference = project(&[("service.go", GO_REFERENCE)]);
    let candidate = project(&[("service.go", GO_UNVALIDATED)]);
    let registry = LanguageRegistry::new();
    let comparator = comparator(&registry);
    let candidate_root = candidate.path().to_path_buf();
    let mut instructed = Vec::new();

    let mut evaluator = ComparatorEvaluator::new(
        &comparator,
        ImplementationInput::project(reference.path()),
        |request: &RoundRequest<'_>| {
            if let Some(plan) = request.previous {
                instructed.extend(plan.code_changes.values().flatten().map(|c| c.element_name.clone()));
                fs::write(candidate_root.join("service.go"), GO_REFERENCE)?;
            }
            Ok(Some(vec![ImplementationInput::project(candidate_root.clone())]))
        },
    );
    let engine = ConvergenceEngine::new(ConvergenceConfig {
        threshold: 0.95,
        strategy: StrategyKind::CodeFirst,
        ..ConvergenceConfig::default()
    });
    let result = engine.run(&mut evaluator);
    drop(evaluator);

    assert!(result.converged);
    assert_eq!(result.iterations.len(), 2);
    assert_eq!(result.iterations[0].gaps_remaining, 1);
    assert_eq!(result.iterations[1].gaps_fixed, 1);
    assert_eq!(result.iterations[1].touched_files, vec!["service.go".to_string()]);
    assert_eq!(result.final_score, 1.0);
    assert!(result.unresolved_gaps.is_empty());
    assert_eq!(instructed, vec!["url_validation".to_string()]);
}

#[test]
fn test_cancelled_run_reports_cancelled() {
    let reference = project(&[("service.go", GO_REFERENCE)]);
    let candidate = project(&[("service.go", GO_UNVALIDATED)]);
    let registry = LanguageRegistry::new();
    let comparator = comparator(&registry);
    let token = CancellationToken::new();
    let stopper = token.clone();
    let candidate_root = candidate.path().to_path_buf();

    let mut evaluator = ComparatorEvaluator::new(
        &comparator,
        ImplementationInput::project(reference.path()),
        move |_request: &RoundRequest<'_>| {
            stopper.cancel();
            Ok(Some(vec![ImplementationInput::project(candidate_root.clone())]))
        },
    );
    let result = ConvergenceEngine::with_cancellation(ConvergenceConfig::default(), token).run(&mut evaluator);
    assert_eq!(result.status, LoopStatus::Cancelled);
    assert!(result.iterations.is_empty());
    assert!(!result.converged);
}
