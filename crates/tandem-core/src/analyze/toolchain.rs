//! Native compiler / type-checker enrichment.
//!
//! Each language has a [`NativeToolchain`] describing how to invoke its
//! checker and how to read the output. Running it is optional and bounded:
//! a missing binary, a nonzero exit or a timeout downgrades to an info note.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::LazyLock;
use std::thread;
use std::time::{Duration, Instant};

use regex::Regex;
use tracing::{debug, warn};

use crate::analyze::cancel::CancellationToken;
use crate::analyze::filesystem::SourceFile;
use crate::config::MAX_DIAGNOSTICS_PER_TOOL;
use crate::errors::{TandemError, TandemResult};
use crate::models::{Diagnostic, DiagnosticSource, Language, Severity, ToolchainStatus};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

static GO_VET_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:vet: )?(.+?\.go):(\d+):(?:(\d+):)?\s*(.+)$").expect("valid go vet regex")
});
static MYPY_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.+?\.pyi?):(\d+):(?:(\d+):)?\s*(error|warning|note):\s*(.*?)(?:\s+\[([\w-]+)\])?$")
        .expect("valid mypy regex")
});
static TSC_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.+?)\((\d+),(\d+)\):\s*(error|warning)\s+(TS\d+):\s*(.*)$").expect("valid tsc regex")
});
static JAVAC_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.+?\.java):(\d+):\s*(error|warning):\s*(.*)$").expect("valid javac regex")
});
static DOTNET_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.+?\.cs)\((\d+),(\d+)\):\s*(error|warning)\s+([A-Z]+\d+):\s*(.*?)(?:\s+\[[^\]]+\])?$")
        .expect("valid dotnet regex")
});

/// How to run and read one language's checker.
pub trait NativeToolchain: Send + Sync {
    fn language(&self) -> Language;

    /// Executable name looked up on `PATH`.
    fn program(&self) -> &'static str;

    /// Whether the project has what the tool needs (a module file, sources).
    fn applies(&self, _root: &Path, files: &[SourceFile]) -> bool {
        !files.is_empty()
    }

    fn args(&self, root: &Path, files: &[SourceFile], scratch: &Path) -> Vec<String>;

    fn parse(&self, stdout: &str, stderr: &str, root: &Path) -> Vec<Diagnostic>;
}

fn severity(level: &str) -> Severity {
    match level {
        "error" => Severity::Error,
        "note" | "help" | "info" => Severity::Info,
        _ => Severity::Warning,
    }
}

/// Project-relative, slash-separated form of a path the tool printed.
fn relative_file(raw: &str, root: &Path) -> String {
    let trimmed = raw.trim();
    let path = Path::new(trimmed);
    let rel = if path.is_absolute() {
        let canonical_root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        path.strip_prefix(root)
            .or_else(|_| path.strip_prefix(&canonical_root))
            .unwrap_or(path)
            .to_string_lossy()
            .to_string()
    } else {
        trimmed.to_string()
    };
    rel.replace('\\', "/").trim_start_matches("./").to_string()
}

fn number(text: Option<regex::Match<'_>>) -> Option<usize> {
    text.and_then(|m| m.as_str().parse().ok())
}

fn tool_diagnostic(level: &str, message: &str, file: String, line: Option<usize>, column: Option<usize>) -> Diagnostic {
    let mut diagnostic =
        Diagnostic::new(severity(level), DiagnosticSource::Toolchain, message.trim()).with_file(file);
    if let Some(line) = line {
        diagnostic = diagnostic.at(line, column);
    }
    diagnostic
}

fn text_lines<'a>(stdout: &'a str, stderr: &'a str) -> impl Iterator<Item = &'a str> {
    stdout.lines().chain(stderr.lines()).map(str::trim_end)
}

pub struct GoVet;

impl NativeToolchain for GoVet {
    fn language(&self) -> Language {
        Language::Go
    }

    fn program(&self) -> &'static str {
        "go"
    }

    fn applies(&self, root: &Path, files: &[SourceFile]) -> bool {
        root.join("go.mod").is_file() && !files.is_empty()
    }

    fn args(&self, _root: &Path, _files: &[SourceFile], _scratch: &Path) -> Vec<String> {
        vec!["vet".into(), "./...".into()]
    }

    fn parse(&self, stdout: &str, stderr: &str, root: &Path) -> Vec<Diagnostic> {
        text_lines(stdout, stderr)
            .filter_map(|line| GO_VET_LINE.captures(line))
            .map(|cap| {
                tool_diagnostic(
                    "warning",
                    &cap[4],
                    relative_file(&cap[1], root),
                    number(cap.get(2)),
                    number(cap.get(3)),
                )
            })
            .collect()
    }
}

pub struct Mypy;

impl NativeToolchain for Mypy {
    fn language(&self) -> Language {
        Language::Python
    }

    fn program(&self) -> &'static str {
        "mypy"
    }

    fn args(&self, _root: &Path, _files: &[SourceFile], _scratch: &Path) -> Vec<String> {
        [
            "--no-color-output",
            "--no-error-summary",
            "--show-column-numbers",
            "--ignore-missing-imports",
            ".",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    fn parse(&self, stdout: &str, stderr: &str, root: &Path) -> Vec<Diagnostic> {
        text_lines(stdout, stderr)
            .filter_map(|line| MYPY_LINE.captures(line))
            .map(|cap| {
                let mut diagnostic = tool_diagnostic(
                    &cap[4],
                    &cap[5],
                    relative_file(&cap[1], root),
                    number(cap.get(2)),
                    number(cap.get(3)),
                );
                if let Some(code) = cap.get(6) {
                    diagnostic = diagnostic.with_code(code.as_str());
                }
                diagnostic
            })
            .collect()
    }
}

pub struct Tsc;

impl NativeToolchain for Tsc {
    fn language(&self) -> Language {
        Language::TypeScript
    }

    fn program(&self) -> &'static str {
        "tsc"
    }

    fn args(&self, root: &Path, files: &[SourceFile], _scratch: &Path) -> Vec<String> {
        let mut args: Vec<String> = vec!["--noEmit".into(), "--pretty".into(), "false".into()];
        if !root.join("tsconfig.json").is_file() {
            args.push("--jsx".into());
            args.push("preserve".into());
            args.extend(files.iter().map(|f| f.rel_path.clone()));
        }
        args
    }

    fn parse(&self, stdout: &str, stderr: &str, root: &Path) -> Vec<Diagnostic> {
        text_lines(stdout, stderr)
            .filter_map(|line| TSC_LINE.captures(line))
            .map(|cap| {
                tool_diagnostic(
                    &cap[4],
                    &cap[6],
                    relative_file(&cap[1], root),
                    number(cap.get(2)),
                    number(cap.get(3)),
                )
                .with_code(&cap[5])
            })
            .collect()
    }
}

pub struct Javac;

impl NativeToolchain for Javac {
    fn language(&self) -> Language {
        Language::Java
    }

    fn program(&self) -> &'static str {
        "javac"
    }

    fn args(&self, _root: &Path, files: &[SourceFile], scratch: &Path) -> Vec<String> {
        let mut args = vec![
            "-d".to_string(),
            scratch.to_string_lossy().to_string(),
            "-proc:none".to_string(),
            "-Xlint:none".to_string(),
        ];
        args.extend(files.iter().map(|f| f.rel_path.clone()));
        args
    }

    fn parse(&self, stdout: &str, stderr: &str, root: &Path) -> Vec<Diagnostic> {
        text_lines(stdout, stderr)
            .filter_map(|line| JAVAC_LINE.captures(line))
            .map(|cap| tool_diagnostic(&cap[3], &cap[4], relative_file(&cap[1], root), number(cap.get(2)), None))
            .collect()
    }
}

pub struct CargoCheck;

impl NativeToolchain for CargoCheck {
    fn language(&self) -> Language {
        Language::Rust
    }

    fn program(&self) -> &'static str {
        "cargo"
    }

    fn applies(&self, root: &Path, _files: &[SourceFile]) -> bool {
        root.join("Cargo.toml").is_file()
    }

    fn args(&self, _root: &Path, _files: &[SourceFile], _scratch: &Path) -> Vec<String> {
        vec!["check".into(), "--message-format=json".into(), "--quiet".into()]
    }

    /// `cargo --message-format=json` prints one JSON object per line; only
    /// `compiler-message` records with a primary span are kept.
    fn parse(&self, stdout: &str, _stderr: &str, root: &Path) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        for line in stdout.lines() {
            let Ok(record) = serde_json::from_str::<serde_json::Value>(line) else {
                continue;
            };
            if record.get("reason").and_then(|r| r.as_str()) != Some("compiler-message") {
                continue;
            }
            let Some(message) = record.get("message") else {
                continue;
            };
            let level = message.get("level").and_then(|l| l.as_str()).unwrap_or("warning");
            let text = message.get("message").and_then(|m| m.as_str()).unwrap_or_default();
            let spans = message.get("spans").and_then(|s| s.as_array());
            let Some(primary) = spans.and_then(|spans| {
                spans
                    .iter()
                    .find(|s| s.get("is_primary").and_then(|p| p.as_bool()) == Some(true))
            }) else {
                continue;
            };
            let file = primary.get("file_name").and_then(|f| f.as_str()).unwrap_or_default();
            let line_no = primary.get("line_start").and_then(|l| l.as_u64()).map(|l| l as usize);
            let column = primary.get("column_start").and_then(|c| c.as_u64()).map(|c| c as usize);
            let mut diagnostic = tool_diagnostic(level, text, relative_file(file, root), line_no, column);
            if let Some(code) = message
                .get("code")
                .and_then(|c| c.get("code"))
                .and_then(|c| c.as_str())
            {
                diagnostic = diagnostic.with_code(code);
            }
            diagnostics.push(diagnostic);
        }
        diagnostics
    }
}

pub struct DotnetBuild;

impl NativeToolchain for DotnetBuild {
    fn language(&self) -> Language {
        Language::CSharp
    }

    fn program(&self) -> &'static str {
        "dotnet"
    }

    fn applies(&self, root: &Path, files: &[SourceFile]) -> bool {
        let has_project = std::fs::read_dir(root).is_ok_and(|entries| {
            entries.filter_map(Result::ok).any(|e| {
                e.path()
                    .extension()
                    .is_some_and(|ext| ext == "csproj" || ext == "sln")
            })
        });
        has_project && !files.is_empty()
    }

    fn args(&self, _root: &Path, _files: &[SourceFile], _scratch: &Path) -> Vec<String> {
        vec!["build".into(), "-nologo".into(), "-clp:NoSummary".into()]
    }

    fn parse(&self, stdout: &str, stderr: &str, root: &Path) -> Vec<Diagnostic> {
        let mut diagnostics: Vec<Diagnostic> = text_lines(stdout, stderr)
            .filter_map(|line| DOTNET_LINE.captures(line.trim_start()))
            .map(|cap| {
                tool_diagnostic(
                    &cap[4],
                    &cap[6],
                    relative_file(&cap[1], root),
                    number(cap.get(2)),
                    number(cap.get(3)),
                )
                .with_code(&cap[5])
            })
            .collect();
        // MSBuild repeats each diagnostic once per target.
        let mut seen = Vec::new();
        diagnostics.retain(|d| {
            let key = (d.file.clone(), d.line, d.column, d.code.clone(), d.message.clone());
            if seen.contains(&key) {
                false
            } else {
                seen.push(key);
                true
            }
        });
        diagnostics
    }
}

pub fn toolchain_for(language: Language) -> Box<dyn NativeToolchain> {
    match language {
        Language::Go => Box::new(GoVet),
        Language::Python => Box::new(Mypy),
        Language::TypeScript => Box::new(Tsc),
        Language::Java => Box::new(Javac),
        Language::Rust => Box::new(CargoCheck),
        Language::CSharp => Box::new(DotnetBuild),
    }
}

/// Locate the tool on `PATH`.
pub fn locate(toolchain: &dyn NativeToolchain) -> Option<PathBuf> {
    match which::which(toolchain.program()) {
        Ok(path) => {
            debug!("Found {} at {}", toolchain.program(), path.display());
            Some(path)
        }
        Err(e) => {
            debug!("{} not on PATH: {e}", toolchain.program());
            None
        }
    }
}

#[derive(Debug)]
pub enum RunOutcome {
    Completed {
        success: bool,
        stdout: String,
        stderr: String,
    },
    TimedOut,
    Cancelled,
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<thread::JoinHandle<String>> {
    let mut pipe = pipe?;
    Some(thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).to_string()
    }))
}

fn collect(handle: Option<thread::JoinHandle<String>>) -> String {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

/// Run a program to completion, killing it on timeout or cancellation.
///
/// Output pipes are drained on their own threads so a chatty child cannot
/// block on a full pipe. When the child is killed its readers are detached:
/// grandchildren may keep the pipes open.
pub fn run_bounded(
    program: &Path,
    args: &[String],
    cwd: &Path,
    timeout: Duration,
    cancel: &CancellationToken,
) -> std::io::Result<RunOutcome> {
    let mut child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());
    let started = Instant::now();

    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(RunOutcome::Completed {
                success: status.success(),
                stdout: collect(stdout),
                stderr: collect(stderr),
            });
        }
        let stop = if cancel.is_cancelled() {
            Some(RunOutcome::Cancelled)
        } else if started.elapsed() >= timeout {
            Some(RunOutcome::TimedOut)
        } else {
            None
        };
        if let Some(outcome) = stop {
            let _ = child.kill();
            let _ = child.wait();
            return Ok(outcome);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// What enrichment contributed to an analysis.
#[derive(Clone, Debug, PartialEq)]
pub struct Enrichment {
    pub status: ToolchainStatus,
    pub diagnostics: Vec<Diagnostic>,
}

impl Enrichment {
    fn degraded(status: ToolchainStatus, note: String) -> Self {
        Self {
            status,
            diagnostics: vec![Diagnostic::new(Severity::Info, DiagnosticSource::Analyzer, note)],
        }
    }

    pub fn disabled() -> Self {
        Self {
            status: ToolchainStatus::Disabled,
            diagnostics: Vec::new(),
        }
    }

    pub fn unavailable(toolchain: &dyn NativeToolchain, reason: &str) -> Self {
        Self::degraded(
            ToolchainStatus::Unavailable(reason.to_string()),
            format!(
                "{} toolchain unavailable ({reason}); extractor-only analysis",
                toolchain.language()
            ),
        )
    }
}

fn tail(text: &str) -> String {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(3);
    lines[start..].join(" | ")
}

/// Run `toolchain` over the project. Only cancellation is an error; every
/// other failure comes back as a degraded [`Enrichment`].
pub fn enrich(
    toolchain: &dyn NativeToolchain,
    program: &Path,
    root: &Path,
    files: &[SourceFile],
    timeout: Duration,
    cancel: &CancellationToken,
) -> TandemResult<Enrichment> {
    if !toolchain.applies(root, files) {
        return Ok(Enrichment::unavailable(toolchain, "project layout not supported by the tool"));
    }
    // Removed on drop, whichever way this function returns.
    let scratch = match tempfile::Builder::new().prefix("tandem-").tempdir() {
        Ok(dir) => dir,
        Err(e) => {
            warn!("Could not create scratch dir for {}: {e}", toolchain.program());
            return Ok(Enrichment::degraded(
                ToolchainStatus::Failed(e.to_string()),
                format!("{} scratch dir unavailable: {e}", toolchain.program()),
            ));
        }
    };
    let args = toolchain.args(root, files, scratch.path());
    let outcome = run_bounded(program, &args, root, timeout, cancel);
    drop(scratch);

    let language = toolchain.language();
    match outcome {
        Err(e) => {
            warn!("Failed to run {} for {language}: {e}", toolchain.program());
            Ok(Enrichment::degraded(
                ToolchainStatus::Failed(e.to_string()),
                format!("{} could not be started: {e}", toolchain.program()),
            ))
        }
        Ok(RunOutcome::Cancelled) => Err(TandemError::Cancelled),
        Ok(RunOutcome::TimedOut) => {
            warn!("{} timed out after {}s", toolchain.program(), timeout.as_secs());
            Ok(Enrichment::degraded(
                ToolchainStatus::TimedOut,
                format!("{} timed out after {}s; extractor-only analysis", toolchain.program(), timeout.as_secs()),
            ))
        }
        Ok(RunOutcome::Completed { success, stdout, stderr }) => {
            let mut diagnostics = toolchain.parse(&stdout, &stderr, root);
            diagnostics.truncate(MAX_DIAGNOSTICS_PER_TOOL);
            if !success && diagnostics.is_empty() {
                let detail = tail(&stderr);
                warn!("{} exited unsuccessfully without diagnostics: {detail}", toolchain.program());
                return Ok(Enrichment::degraded(
                    ToolchainStatus::Failed(detail.clone()),
                    format!("{} failed: {detail}", toolchain.program()),
                ));
            }
            debug!("{} reported {} diagnostic(s)", toolchain.program(), diagnostics.len());
            Ok(Enrichment {
                status: ToolchainStatus::Enriched,
                diagnostics,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_go_vet_lines() {
        let stderr = "# example.com/app\n./main.go:12:2: fmt.Printf format %d has arg s of wrong type string\nvet: pkg/a.go:3:1: unreachable code\n";
        let diagnostics = GoVet.parse("", stderr, Path::new("/proj"));
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics[0].file.as_deref(), Some("main.go"));
        assert_eq!(diagnostics[0].line, Some(12));
        assert_eq!(diagnostics[0].column, Some(2));
        assert_eq!(diagnostics[1].file.as_deref(), Some("pkg/a.go"));
    }

    #[test]
    fn test_mypy_lines() {
        let stdout = "app/models.py:7:12: error: Incompatible return value type  [return-value]\napp/x.py:3: note: See docs\n";
        let diagnostics = Mypy.parse(stdout, "", Path::new("/proj"));
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics[0].severity, Severity::Error);
        assert_eq!(diagnostics[0].code.as_deref(), Some("return-value"));
        assert_eq!(diagnostics[0].message, "Incompatible return value type");
        assert_eq!(diagnostics[1].severity, Severity::Info);
        assert_eq!(diagnostics[1].column, None);
    }

    #[test]
    fn test_tsc_and_dotnet_lines() {
        let tsc = Tsc.parse("src/app.ts(4,7): error TS2322: Type 'string' is not assignable to type 'number'.\n", "", Path::new("/p"));
        assert_eq!(tsc[0].code.as_deref(), Some("TS2322"));
        assert_eq!((tsc[0].line, tsc[0].column), (Some(4), Some(7)));

        let line = "/p/Links/Service.cs(10,5): error CS0103: The name 'x' does not exist [/p/Links/Links.csproj]\n";
        let dotnet = DotnetBuild.parse(&format!("{line}{line}"), "", Path::new("/p"));
        assert_eq!(dotnet.len(), 1);
        assert_eq!(dotnet[0].file.as_deref(), Some("Links/Service.cs"));
        assert_eq!(dotnet[0].message, "The name 'x' does not exist");
    }

    #[test]
    fn test_javac_lines() {
        let stderr = "src/main/java/a/B.java:9: error: cannot find symbol\n        foo();\n        ^\n1 error\n";
        let diagnostics = Javac.parse("", stderr, Path::new("/p"));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].line, Some(9));
        assert_eq!(diagnostics[0].severity, Severity::Error);
    }

    #[test]
    fn test_cargo_json_messages() {
        let stdout = concat!(
            r#"{"reason":"compiler-artifact","package_id":"x"}"#,
            "\n",
            r#"{"reason":"compiler-message","message":{"level":"warning","message":"unused variable: `x`","code":{"code":"unused_variables"},"spans":[{"file_name":"src/lib.rs","line_start":3,"column_start":9,"is_primary":true}]}}"#,
            "\n",
            r#"{"reason":"compiler-message","message":{"level":"error","message":"aborting","code":null,"spans":[]}}"#,
            "\n",
        );
        let diagnostics = CargoCheck.parse(stdout, "", Path::new("/p"));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].file.as_deref(), Some("src/lib.rs"));
        assert_eq!(diagnostics[0].code.as_deref(), Some("unused_variables"));
        assert_eq!(diagnostics[0].source, DiagnosticSource::Toolchain);
    }

    #[test]
    fn test_toolchain_table_covers_all_languages() {
        for language in Language::all() {
            assert_eq!(toolchain_for(*language).language(), *language);
        }
    }

    #[test]
    fn test_unavailable_is_info_note() {
        let enrichment = Enrichment::unavailable(&GoVet, "go not on PATH");
        assert!(matches!(enrichment.status, ToolchainStatus::Unavailable(_)));
        assert_eq!(enrichment.diagnostics[0].severity, Severity::Info);
    }

    #[cfg(unix)]
    #[test]
    fn test_run_bounded_times_out_and_cancels() {
        let sh = Path::new("/bin/sh");
        let args = vec!["-c".to_string(), "sleep 5".to_string()];
        let cwd = std::env::temp_dir();
        let token = CancellationToken::new();

        let started = Instant::now();
        let outcome = run_bounded(sh, &args, &cwd, Duration::from_millis(100), &token).unwrap();
        assert!(matches!(outcome, RunOutcome::TimedOut));
        assert!(started.elapsed() < Duration::from_secs(4));

        token.cancel();
        let outcome = run_bounded(sh, &args, &cwd, Duration::from_secs(30), &token).unwrap();
        assert!(matches!(outcome, RunOutcome::Cancelled));
    }

    /// Records the scratch dir it was handed and reports whether it existed
    /// while the command ran.
    #[derive(Default)]
    struct ScratchEcho {
        seen: parking_lot::Mutex<Option<PathBuf>>,
        linger: bool,
    }

    impl NativeToolchain for ScratchEcho {
        fn language(&self) -> Language {
            Language::Java
        }

        fn program(&self) -> &'static str {
            "sh"
        }

        fn applies(&self, _root: &Path, _files: &[SourceFile]) -> bool {
            true
        }

        fn args(&self, _root: &Path, _files: &[SourceFile], scratch: &Path) -> Vec<String> {
            *self.seen.lock() = Some(scratch.to_path_buf());
            let mut script = format!("test -d '{}' && echo present", scratch.display());
            if self.linger {
                script.push_str("; sleep 5");
            }
            vec!["-c".into(), script]
        }

        fn parse(&self, stdout: &str, _stderr: &str, _root: &Path) -> Vec<Diagnostic> {
            stdout
                .lines()
                .map(|line| Diagnostic::new(Severity::Info, DiagnosticSource::Toolchain, line))
                .collect()
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_enrich_removes_scratch_dir() {
        let toolchain = ScratchEcho::default();
        let root = tempfile::TempDir::new().unwrap();
        let enrichment = enrich(
            &toolchain,
            Path::new("/bin/sh"),
            root.path(),
            &[],
            Duration::from_secs(10),
            &CancellationToken::new(),
        )
        .unwrap();
        assert_eq!(enrichment.status, ToolchainStatus::Enriched);
        assert_eq!(enrichment.diagnostics[0].message, "present");
        let scratch = toolchain.seen.lock().clone().unwrap();
        assert!(scratch.file_name().unwrap().to_string_lossy().starts_with("tandem-"));
        assert!(!scratch.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_enrich_cancelled_still_removes_scratch_dir() {
        let toolchain = ScratchEcho {
            linger: true,
            ..ScratchEcho::default()
        };
        let token = CancellationToken::new();
        token.cancel();
        let root = tempfile::TempDir::new().unwrap();
        let result = enrich(
            &toolchain,
            Path::new("/bin/sh"),
            root.path(),
            &[],
            Duration::from_secs(10),
            &token,
        );
        assert!(matches!(result, Err(TandemError::Cancelled)));
        let scratch = toolchain.seen.lock().clone().unwrap();
        assert!(!scratch.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_run_bounded_collects_output() {
        let args = vec!["-c".to_string(), "echo out; echo err >&2; exit 3".to_string()];
        let outcome = run_bounded(
            Path::new("/bin/sh"),
            &args,
            &std::env::temp_dir(),
            Duration::from_secs(10),
            &CancellationToken::new(),
        )
        .unwrap();
        match outcome {
            RunOutcome::Completed { success, stdout, stderr } => {
                assert!(!success);
                assert_eq!(stdout.trim(), "out");
                assert_eq!(stderr.trim(), "err");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }
}
