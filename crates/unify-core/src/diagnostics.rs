//! Diagnostic types and build error reporting

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

pub type BuildResult<T> = Result<T, BuildError>;

/// Stable diagnostic codes, consumed by `--fail-on Uxxx`.
///
/// Codes are contract: they never change meaning between releases and are
/// safe to match on in CI configurations.
pub mod codes {
    /// A glob pattern failed to compile and was skipped.
    pub const INVALID_PATTERN: &str = "U001";
    /// `unify.toml` contained a key the loader does not recognize.
    pub const UNKNOWN_CONFIG_KEY: &str = "U002";
    /// A file could not be read or written during the build.
    pub const FILE_IO: &str = "U003";
    /// An include directive names a file that does not exist.
    pub const MISSING_INCLUDE: &str = "U101";
    /// An include directive closes a cycle.
    pub const CIRCULAR_INCLUDE: &str = "U102";
    /// Include nesting exceeded the depth bound.
    pub const INCLUDE_DEPTH: &str = "U103";
    /// A layout override could not be resolved to a file.
    pub const UNRESOLVED_LAYOUT: &str = "U201";
    /// The layout parent chain exceeded the depth bound.
    pub const LAYOUT_CHAIN_DEPTH: &str = "U202";
    /// Frontmatter was malformed, or present on an HTML page.
    pub const BAD_FRONTMATTER: &str = "U301";
    /// A Markdown body contained a `<head>` element outside code fences.
    pub const HEAD_IN_BODY: &str = "U302";
    /// Reported by the security scanner during composition.
    pub const SECURITY: &str = "U401";
    /// A resolved path escaped the source or output root.
    pub const PATH_TRAVERSAL: &str = "U402";
}

/// Severity of a [`Diagnostic`].
///
/// Ordering is used for report sorting: security findings sort first,
/// informational notes last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DiagnosticLevel {
    Security,
    Error,
    Warning,
    Info,
}

/// A recoverable, per-file finding surfaced in the build report.
///
/// Fatal conditions are [`BuildError`] instead; a `Diagnostic` never aborts
/// the build on its own. Whether diagnostics fail the build is decided at
/// the end of the run against the configured `fail_on`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    /// Stable `Uxxx` code, see [`codes`].
    pub code: String,
    pub message: String,
    pub file: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl Diagnostic {
    pub fn error(file: impl Into<PathBuf>, code: &str, message: impl Into<String>) -> Self {
        Self::new(DiagnosticLevel::Error, file, code, message)
    }

    pub fn warning(file: impl Into<PathBuf>, code: &str, message: impl Into<String>) -> Self {
        Self::new(DiagnosticLevel::Warning, file, code, message)
    }

    pub fn security(file: impl Into<PathBuf>, code: &str, message: impl Into<String>) -> Self {
        Self::new(DiagnosticLevel::Security, file, code, message)
    }

    pub fn info(file: impl Into<PathBuf>, code: &str, message: impl Into<String>) -> Self {
        Self::new(DiagnosticLevel::Info, file, code, message)
    }

    fn new(
        level: DiagnosticLevel,
        file: impl Into<PathBuf>,
        code: &str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            level,
            code: code.to_string(),
            message: message.into(),
            file: file.into(),
            suggestion: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// True when the diagnostic should trip the given `--fail-on` selector.
    pub fn matches_fail_on(&self, fail_on: &crate::config::FailOn) -> bool {
        use crate::config::FailOn;
        match fail_on {
            FailOn::Warning => self.level <= DiagnosticLevel::Warning,
            FailOn::Error => self.level <= DiagnosticLevel::Error,
            FailOn::Security => self.level == DiagnosticLevel::Security,
            FailOn::Code(code) => self.code.eq_ignore_ascii_case(code),
        }
    }
}

/// Fatal build errors. Any of these aborts the run before or mid-tree;
/// per-file problems are [`Diagnostic`]s instead.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Source directory not found: {path}")]
    SourceMissing { path: PathBuf },

    #[error("Source path is not a directory: {path}")]
    SourceNotADirectory { path: PathBuf },

    #[error("Refusing to use system directory as a build root: {path}")]
    UnsafeRoot { path: PathBuf },

    #[error("Path escapes the {scope} root: {path}")]
    PathTraversal { scope: &'static str, path: PathBuf },

    #[error("Failed to create output directory: {path}")]
    OutputCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read file: {path}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file: {path}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Refusing to read symlink: {path}")]
    FileSymlink { path: PathBuf },

    #[error("File too large: {path} ({size} bytes, limit {limit} bytes)")]
    FileTooBig {
        path: PathBuf,
        size: u64,
        limit: u64,
    },

    #[error("Not a regular file: {path}")]
    FileNotRegular { path: PathBuf },

    #[error("Build cancelled")]
    Cancelled,

    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}

impl BuildError {
    /// Exit-code class for the CLI: security and traversal failures are 2,
    /// everything else is 1.
    pub fn is_security(&self) -> bool {
        matches!(
            self,
            BuildError::PathTraversal { .. }
                | BuildError::UnsafeRoot { .. }
                | BuildError::Config(crate::config::ConfigError::PathTraversal { .. })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FailOn;

    #[test]
    fn test_level_ordering_security_first() {
        assert!(DiagnosticLevel::Security < DiagnosticLevel::Error);
        assert!(DiagnosticLevel::Error < DiagnosticLevel::Warning);
        assert!(DiagnosticLevel::Warning < DiagnosticLevel::Info);
    }

    #[test]
    fn test_builder_chaining() {
        let diag = Diagnostic::warning("blog/post.html", codes::MISSING_INCLUDE, "not found")
            .with_suggestion("check the include path");
        assert_eq!(diag.code, "U101");
        assert_eq!(diag.suggestion.as_deref(), Some("check the include path"));
        assert_eq!(diag.level, DiagnosticLevel::Warning);
    }

    #[test]
    fn test_fail_on_warning_includes_errors() {
        let warn = Diagnostic::warning("a.html", codes::MISSING_INCLUDE, "m");
        let err = Diagnostic::error("a.html", codes::BAD_FRONTMATTER, "m");
        let info = Diagnostic::info("a.html", codes::UNKNOWN_CONFIG_KEY, "m");
        assert!(warn.matches_fail_on(&FailOn::Warning));
        assert!(err.matches_fail_on(&FailOn::Warning));
        assert!(!info.matches_fail_on(&FailOn::Warning));
    }

    #[test]
    fn test_fail_on_security_only_matches_security() {
        let sec = Diagnostic::security("a.html", codes::SECURITY, "m");
        let err = Diagnostic::error("a.html", codes::BAD_FRONTMATTER, "m");
        assert!(sec.matches_fail_on(&FailOn::Security));
        assert!(!err.matches_fail_on(&FailOn::Security));
    }

    #[test]
    fn test_fail_on_code_is_case_insensitive() {
        let diag = Diagnostic::warning("a.html", codes::CIRCULAR_INCLUDE, "m");
        assert!(diag.matches_fail_on(&FailOn::Code("u102".to_string())));
        assert!(!diag.matches_fail_on(&FailOn::Code("U103".to_string())));
    }

    #[test]
    fn test_diagnostic_serialization_roundtrip() {
        let original = Diagnostic::error("pages/about.md", codes::HEAD_IN_BODY, "head in body")
            .with_suggestion("move head content to frontmatter");
        let json = serde_json::to_string(&original).expect("serialization should succeed");
        let back: Diagnostic = serde_json::from_str(&json).expect("deserialization should succeed");
        assert_eq!(back.level, original.level);
        assert_eq!(back.code, original.code);
        assert_eq!(back.message, original.message);
        assert_eq!(back.file, original.file);
        assert_eq!(back.suggestion, original.suggestion);
    }

    #[test]
    fn test_security_error_classification() {
        let err = BuildError::PathTraversal {
            scope: "source",
            path: "../escape".into(),
        };
        assert!(err.is_security());
        let err = BuildError::Cancelled;
        assert!(!err.is_security());
    }
}
