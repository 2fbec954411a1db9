//! Error types for the tandem core library.
//!
//! Only request-aborting conditions are errors. Per-file parse failures,
//! toolchain problems and missing features are recorded as data
//! (`Diagnostic` entries, absent feature rows) and never surface here.

use std::path::PathBuf;

/// Top-level error enum for the tandem core library.
#[derive(Debug, thiserror::Error)]
pub enum TandemError {
    #[error("Input not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("No comparable {language} files found under {}", .root.display())]
    NoComparableFiles { root: PathBuf, language: String },

    #[error("Parity needs a reference and at least one candidate, got {0} implementation(s)")]
    TooFewImplementations(usize),

    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),
}

impl TandemError {
    /// Input errors abort only the current request and are reported verbatim
    /// to the caller.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            TandemError::InputNotFound(_)
                | TandemError::NoComparableFiles { .. }
                | TandemError::TooFewImplementations(_)
                | TandemError::UnsupportedLanguage(_)
        )
    }
}

pub type TandemResult<T> = Result<T, TandemError>;
