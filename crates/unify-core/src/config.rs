//! Build configuration
//!
//! `BuildConfig` is the single configuration struct the engine consumes.
//! Values merge from three sources in precedence order: CLI flags over a
//! `unify.toml` at the source root over built-in defaults.

use crate::paths::{self, PatternList, PatternWarning};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Name of the project configuration file looked up at the source root.
pub const CONFIG_FILE_NAME: &str = "unify.toml";

/// Directory roots the engine refuses to build from or into.
const SYSTEM_ROOTS: &[&str] = &[
    "/", "/bin", "/boot", "/dev", "/etc", "/lib", "/proc", "/sbin", "/sys", "/usr", "/var",
    "C:\\", "C:\\Windows", "C:\\Program Files",
];

/// Hard configuration errors. These abort before any file is processed;
/// soft issues are [`ConfigWarning`]s.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("path traversal in pattern '{pattern}'")]
    PathTraversal { pattern: String },

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("unrecognized value '{value}' for {option}")]
    InvalidValue { option: &'static str, value: String },
}

/// A non-fatal configuration issue, reported but not failing the build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub message: String,
}

impl ConfigWarning {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<PatternWarning> for ConfigWarning {
    fn from(w: PatternWarning) -> Self {
        Self::new(format!("ignoring invalid pattern '{}': {}", w.pattern, w.message))
    }
}

/// Condition under which a finished build is reported as failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FailOn {
    Warning,
    Error,
    Security,
    /// A specific diagnostic code, e.g. `U102`.
    Code(String),
}

impl FromStr for FailOn {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "warning" => Ok(FailOn::Warning),
            "error" => Ok(FailOn::Error),
            "security" => Ok(FailOn::Security),
            lower => {
                let rest = lower.strip_prefix('u');
                match rest {
                    Some(digits) if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) => {
                        Ok(FailOn::Code(format!("U{digits}")))
                    }
                    _ => Err(ConfigError::InvalidValue {
                        option: "fail_on",
                        value: s.to_string(),
                    }),
                }
            }
        }
    }
}

impl TryFrom<String> for FailOn {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, ConfigError> {
        s.parse()
    }
}

impl From<FailOn> for String {
    fn from(f: FailOn) -> String {
        match f {
            FailOn::Warning => "warning".to_string(),
            FailOn::Error => "error".to_string(),
            FailOn::Security => "security".to_string(),
            FailOn::Code(code) => code,
        }
    }
}

/// Logging verbosity, forwarded by the CLI into its tracing filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            _ => Err(ConfigError::InvalidValue {
                option: "log_level",
                value: s.to_string(),
            }),
        }
    }
}

/// User-supplied glob pattern sets, evaluated by the file classifier.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatternSets {
    /// Force COPY (tier 1).
    #[serde(default)]
    pub copy: Vec<String>,
    /// Force IGNORED for both render and copy (tier 2).
    #[serde(default)]
    pub ignore: Vec<String>,
    /// Force EMIT (tier 1, beats everything).
    #[serde(default)]
    pub render: Vec<String>,
    /// Force IGNORED for renderable files only (tier 2).
    #[serde(default)]
    pub ignore_render: Vec<String>,
    /// Force IGNORED for copyable files only (tier 2).
    #[serde(default)]
    pub ignore_copy: Vec<String>,
    /// `glob=layout` pairs, or a bare layout path as global fallback.
    #[serde(default)]
    pub default_layout: Vec<String>,
}

impl PatternSets {
    fn all_entries(&self) -> impl Iterator<Item = &String> {
        self.copy
            .iter()
            .chain(&self.ignore)
            .chain(&self.render)
            .chain(&self.ignore_render)
            .chain(&self.ignore_copy)
    }
}

/// A parsed `default_layout` entry.
#[derive(Debug, Clone)]
pub enum DefaultLayoutRule {
    /// `glob=layoutPath`: applies to pages matching the glob.
    Glob { pattern: PatternList, layout: String },
    /// Bare layout path: applies to every page with no nearer layout.
    Global { layout: String },
}

/// Engine configuration. Every knob the CLI surface recognizes lands here;
/// `minify` and `sitemap` are carried for external collaborators and are
/// no-ops inside the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub source: PathBuf,
    pub output: PathBuf,
    pub base_url: Option<String>,
    pub pretty_urls: bool,
    pub clean: bool,
    pub sitemap: bool,
    pub minify: bool,
    pub fail_on: Option<FailOn>,
    pub auto_ignore: bool,
    pub log_level: LogLevel,
    pub dry_run: bool,
    /// Directory (relative to source root) searched for fallback layouts
    /// and short-name layout references.
    pub layouts_dir: String,
    pub patterns: PatternSets,
    pub port: u16,
    pub host: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            source: PathBuf::from("."),
            output: PathBuf::from("dist"),
            base_url: None,
            pretty_urls: false,
            clean: false,
            sitemap: false,
            minify: false,
            fail_on: None,
            auto_ignore: true,
            log_level: LogLevel::Info,
            dry_run: false,
            layouts_dir: "_includes".to_string(),
            patterns: PatternSets::default(),
            port: 3000,
            host: "localhost".to_string(),
        }
    }
}

impl BuildConfig {
    /// Load `unify.toml` from `source_root` if present and merge it under
    /// the current values (the current values win; use on a default config
    /// before applying CLI flags).
    pub fn load_project_file(
        &mut self,
        source_root: &Path,
    ) -> Result<Vec<ConfigWarning>, ConfigError> {
        let path = source_root.join(CONFIG_FILE_NAME);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(_) => return Ok(Vec::new()),
        };
        self.merge_toml(&text, &path)
    }

    /// Parse and merge a `unify.toml` document. Unknown keys produce
    /// warnings, not errors.
    pub fn merge_toml(
        &mut self,
        text: &str,
        path: &Path,
    ) -> Result<Vec<ConfigWarning>, ConfigError> {
        let value: toml::Value = text.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let mut warnings = unknown_key_warnings(&value);
        let file: FileConfig = value.try_into().map_err(|e: toml::de::Error| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        self.apply_file(file);
        warnings.extend(self.validate()?);
        Ok(warnings)
    }

    fn apply_file(&mut self, file: FileConfig) {
        if let Some(build) = file.build {
            if let Some(v) = build.source {
                self.source = v;
            }
            if let Some(v) = build.output {
                self.output = v;
            }
            if let Some(v) = build.base_url {
                self.base_url = Some(v);
            }
            if let Some(v) = build.pretty_urls {
                self.pretty_urls = v;
            }
            if let Some(v) = build.clean {
                self.clean = v;
            }
            if let Some(v) = build.sitemap {
                self.sitemap = v;
            }
            if let Some(v) = build.minify {
                self.minify = v;
            }
            if let Some(v) = build.fail_on {
                self.fail_on = Some(v);
            }
            if let Some(v) = build.auto_ignore {
                self.auto_ignore = v;
            }
            if let Some(v) = build.log_level {
                self.log_level = v;
            }
            if let Some(v) = build.layouts_dir {
                self.layouts_dir = v;
            }
        }
        if let Some(patterns) = file.patterns {
            let dst = &mut self.patterns;
            dst.copy.extend(patterns.copy);
            dst.ignore.extend(patterns.ignore);
            dst.render.extend(patterns.render);
            dst.ignore_render.extend(patterns.ignore_render);
            dst.ignore_copy.extend(patterns.ignore_copy);
            dst.default_layout.extend(patterns.default_layout);
        }
        if let Some(serve) = file.serve {
            if let Some(v) = serve.port {
                self.port = v;
            }
            if let Some(v) = serve.host {
                self.host = v;
            }
        }
    }

    /// Validate the configuration. NUL bytes, oversize patterns, and
    /// traversal attempts are hard errors; syntactically invalid globs are
    /// warnings (the classifier will skip them again at compile time).
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, ConfigError> {
        let mut warnings = Vec::new();
        for raw in self.patterns.all_entries() {
            paths::check_pattern(raw).map_err(|message| ConfigError::InvalidPattern {
                pattern: raw.clone(),
                message,
            })?;
            if raw.split('/').any(|seg| seg == "..") {
                return Err(ConfigError::PathTraversal {
                    pattern: raw.clone(),
                });
            }
            let (_, bad) = PatternList::compile(std::slice::from_ref(raw));
            warnings.extend(bad.into_iter().map(ConfigWarning::from));
        }
        for entry in &self.patterns.default_layout {
            if let Some((glob, layout)) = entry.split_once('=') {
                if glob.is_empty() || layout.is_empty() {
                    warnings.push(ConfigWarning::new(format!(
                        "ignoring malformed default_layout entry '{entry}'"
                    )));
                }
            }
        }
        Ok(warnings)
    }

    /// Parse `default_layout` entries into matchable rules, in declared
    /// order. Malformed entries are skipped (already warned by `validate`).
    pub fn default_layout_rules(&self) -> Vec<DefaultLayoutRule> {
        let mut rules = Vec::new();
        for entry in &self.patterns.default_layout {
            match entry.split_once('=') {
                Some((glob, layout)) => {
                    if glob.is_empty() || layout.is_empty() {
                        continue;
                    }
                    let (pattern, bad) = PatternList::compile(&[glob.to_string()]);
                    if bad.is_empty() {
                        rules.push(DefaultLayoutRule::Glob {
                            pattern,
                            layout: layout.to_string(),
                        });
                    }
                }
                None => rules.push(DefaultLayoutRule::Global {
                    layout: entry.clone(),
                }),
            }
        }
        rules
    }
}

/// Reject system directories as build roots.
pub fn check_safe_root(path: &Path) -> bool {
    let canonical = path.to_string_lossy();
    let trimmed = canonical.trim_end_matches(['/', '\\']);
    let candidate = if trimmed.is_empty() { "/" } else { trimmed };
    !SYSTEM_ROOTS
        .iter()
        .any(|root| candidate.eq_ignore_ascii_case(root.trim_end_matches(['/', '\\'])) || (*root == "/" && candidate == "/"))
}

// ---------------------------------------------------------------------------
// unify.toml shape
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    build: Option<FileBuild>,
    patterns: Option<PatternSets>,
    serve: Option<FileServe>,
}

#[derive(Debug, Default, Deserialize)]
struct FileBuild {
    source: Option<PathBuf>,
    output: Option<PathBuf>,
    base_url: Option<String>,
    pretty_urls: Option<bool>,
    clean: Option<bool>,
    sitemap: Option<bool>,
    minify: Option<bool>,
    fail_on: Option<FailOn>,
    auto_ignore: Option<bool>,
    log_level: Option<LogLevel>,
    layouts_dir: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FileServe {
    port: Option<u16>,
    host: Option<String>,
}

const KNOWN_SECTIONS: &[&str] = &["build", "patterns", "serve"];
const KNOWN_BUILD_KEYS: &[&str] = &[
    "source",
    "output",
    "base_url",
    "pretty_urls",
    "clean",
    "sitemap",
    "minify",
    "fail_on",
    "auto_ignore",
    "log_level",
    "layouts_dir",
];
const KNOWN_PATTERN_KEYS: &[&str] = &[
    "copy",
    "ignore",
    "render",
    "ignore_render",
    "ignore_copy",
    "default_layout",
];
const KNOWN_SERVE_KEYS: &[&str] = &["port", "host"];

fn unknown_key_warnings(value: &toml::Value) -> Vec<ConfigWarning> {
    let mut warnings = Vec::new();
    let Some(table) = value.as_table() else {
        return warnings;
    };
    for (section, entry) in table {
        if !KNOWN_SECTIONS.contains(&section.as_str()) {
            warnings.push(ConfigWarning::new(format!(
                "unknown section [{section}] in {CONFIG_FILE_NAME}"
            )));
            continue;
        }
        let known: &[&str] = match section.as_str() {
            "build" => KNOWN_BUILD_KEYS,
            "patterns" => KNOWN_PATTERN_KEYS,
            "serve" => KNOWN_SERVE_KEYS,
            _ => unreachable!(),
        };
        if let Some(section_table) = entry.as_table() {
            for key in section_table.keys() {
                if !known.contains(&key.as_str()) {
                    warnings.push(ConfigWarning::new(format!(
                        "unknown key '{key}' in [{section}] of {CONFIG_FILE_NAME}"
                    )));
                }
            }
        }
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BuildConfig::default();
        assert_eq!(config.source, PathBuf::from("."));
        assert_eq!(config.output, PathBuf::from("dist"));
        assert!(config.auto_ignore);
        assert!(!config.pretty_urls);
        assert_eq!(config.layouts_dir, "_includes");
        assert_eq!(config.log_level, LogLevel::Info);
    }

    #[test]
    fn test_fail_on_parsing() {
        assert_eq!("warning".parse::<FailOn>().unwrap(), FailOn::Warning);
        assert_eq!("Security".parse::<FailOn>().unwrap(), FailOn::Security);
        assert_eq!(
            "u102".parse::<FailOn>().unwrap(),
            FailOn::Code("U102".to_string())
        );
        assert!("bogus".parse::<FailOn>().is_err());
        assert!("u".parse::<FailOn>().is_err());
        assert!("u12x".parse::<FailOn>().is_err());
    }

    #[test]
    fn test_merge_toml_overrides_defaults() {
        let mut config = BuildConfig::default();
        let warnings = config
            .merge_toml(
                r#"
[build]
output = "public"
pretty_urls = true
fail_on = "U102"

[patterns]
ignore = ["drafts/**"]

[serve]
port = 8080
"#,
                Path::new("unify.toml"),
            )
            .unwrap();
        assert!(warnings.is_empty(), "no warnings expected: {:?}", warnings);
        assert_eq!(config.output, PathBuf::from("public"));
        assert!(config.pretty_urls);
        assert_eq!(config.fail_on, Some(FailOn::Code("U102".to_string())));
        assert_eq!(config.patterns.ignore, vec!["drafts/**".to_string()]);
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn test_unknown_keys_warn_but_parse() {
        let mut config = BuildConfig::default();
        let warnings = config
            .merge_toml(
                r#"
[build]
output = "public"
shiny = true

[extra]
x = 1
"#,
                Path::new("unify.toml"),
            )
            .unwrap();
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].message.contains("shiny") || warnings[1].message.contains("shiny"));
        assert_eq!(config.output, PathBuf::from("public"));
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let mut config = BuildConfig::default();
        let result = config.merge_toml("not [valid", Path::new("unify.toml"));
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_validate_rejects_nul_pattern() {
        let mut config = BuildConfig::default();
        config.patterns.ignore.push("bad\0glob".to_string());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_traversal_pattern() {
        let mut config = BuildConfig::default();
        config.patterns.copy.push("../outside/**".to_string());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::PathTraversal { .. })
        ));
    }

    #[test]
    fn test_validate_warns_on_bad_glob() {
        let mut config = BuildConfig::default();
        config.patterns.ignore.push("[".to_string());
        let warnings = config.validate().unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("["));
    }

    #[test]
    fn test_default_layout_rules_parsing() {
        let mut config = BuildConfig::default();
        config.patterns.default_layout = vec![
            "blog/**=blog-layout.html".to_string(),
            "shared.html".to_string(),
        ];
        let rules = config.default_layout_rules();
        assert_eq!(rules.len(), 2);
        match &rules[0] {
            DefaultLayoutRule::Glob { pattern, layout } => {
                assert!(pattern.matches("blog/post.md"));
                assert_eq!(layout, "blog-layout.html");
            }
            other => panic!("expected glob rule, got {:?}", other),
        }
        match &rules[1] {
            DefaultLayoutRule::Global { layout } => assert_eq!(layout, "shared.html"),
            other => panic!("expected global rule, got {:?}", other),
        }
    }

    #[test]
    fn test_system_roots_rejected() {
        assert!(!check_safe_root(Path::new("/etc")));
        assert!(!check_safe_root(Path::new("/")));
        assert!(!check_safe_root(Path::new("/usr/")));
        assert!(check_safe_root(Path::new("/home/user/site")));
        assert!(
            check_safe_root(Path::new("/var/www/site")),
            "only exact system roots are rejected, not their descendants"
        );
    }
}
