//! Build orchestration: walk, classify, render, aggregate.
//!
//! The walk streams into parallel per-file work over a rayon bridge with
//! thread-local accumulators, and a shared stop flag implements
//! cancellation at every I/O boundary. Output is deterministic regardless
//! of scheduling: classifications and diagnostics are sorted at the end of
//! the run.

use crate::classify::{self, Action, Classification, FileClassifier, FileKind};
use crate::compose::{self, DocumentParts};
use crate::config::{check_safe_root, BuildConfig, FailOn};
use crate::deps::DependencyTracker;
use crate::diagnostics::{codes, BuildError, BuildResult, Diagnostic, DiagnosticLevel};
use crate::file_utils;
use crate::include::IncludeExpander;
use crate::layout::{self, LayoutResolver};
use crate::parsers::frontmatter::{self, PageMeta};
use crate::parsers::html::Attr;
use crate::parsers::markdown;
use crate::paths;
use ignore::WalkBuilder;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Cooperative cancellation flag, checked at every I/O boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Hook invoked on every composed page before it is written. The engine
/// ships a no-op; an external scanner can report findings as
/// [`DiagnosticLevel::Security`] diagnostics.
pub trait SecurityScanner: Send + Sync {
    fn scan(&self, page: &Path, html: &str) -> Vec<Diagnostic>;
}

/// Default scanner: reports nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopScanner;

impl SecurityScanner for NoopScanner {
    fn scan(&self, _page: &Path, _html: &str) -> Vec<Diagnostic> {
        Vec::new()
    }
}

/// Aggregated result of a build (or dry run).
#[derive(Debug, Clone, Default, Serialize)]
#[non_exhaustive]
pub struct BuildReport {
    pub classifications: Vec<Classification>,
    pub diagnostics: Vec<Diagnostic>,
    pub pages_built: usize,
    pub files_copied: usize,
    pub files_skipped: usize,
    pub files_ignored: usize,
    pub dry_run: bool,
    /// Resolved layout chains per EMIT page (source-relative paths),
    /// populated on dry runs for the report.
    pub layout_chains: BTreeMap<String, Vec<String>>,
    pub build_time_ms: Option<u64>,
}

impl BuildReport {
    pub fn with_timing(mut self, ms: u64) -> Self {
        self.build_time_ms = Some(ms);
        self
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.level == DiagnosticLevel::Error)
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.level == DiagnosticLevel::Warning)
            .count()
    }

    pub fn has_security_findings(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.level == DiagnosticLevel::Security)
    }

    /// Whether the configured `fail_on` condition trips on this report.
    pub fn should_fail(&self, fail_on: Option<&FailOn>) -> bool {
        match fail_on {
            None => false,
            Some(selector) => self
                .diagnostics
                .iter()
                .any(|d| d.matches_fail_on(selector)),
        }
    }
}

#[derive(Default)]
struct Accumulator {
    classifications: Vec<Classification>,
    diagnostics: Vec<Diagnostic>,
    pages_built: usize,
    files_copied: usize,
}

impl Accumulator {
    fn merge(mut self, other: Accumulator) -> Accumulator {
        self.classifications.extend(other.classifications);
        self.diagnostics.extend(other.diagnostics);
        self.pages_built += other.pages_built;
        self.files_copied += other.files_copied;
        self
    }
}

/// The build engine: owns the configuration, the classifier, the layout
/// resolver, the include expander, and the shared dependency tracker.
pub struct Orchestrator {
    config: BuildConfig,
    source_root: PathBuf,
    output_root: PathBuf,
    classifier: FileClassifier,
    resolver: LayoutResolver,
    expander: IncludeExpander,
    tracker: Mutex<DependencyTracker>,
    scanner: Box<dyn SecurityScanner>,
    cancel: CancelToken,
    config_diagnostics: Vec<Diagnostic>,
}

impl Orchestrator {
    pub fn new(config: BuildConfig) -> BuildResult<Self> {
        let mut config_diagnostics = Vec::new();
        for warning in config.validate()? {
            config_diagnostics.push(Diagnostic::warning(
                config.source.clone(),
                codes::INVALID_PATTERN,
                warning.message,
            ));
        }

        let source_root = std::fs::canonicalize(&config.source).map_err(|_| {
            BuildError::SourceMissing {
                path: config.source.clone(),
            }
        })?;
        if !source_root.is_dir() {
            return Err(BuildError::SourceNotADirectory { path: source_root });
        }
        if !check_safe_root(&source_root) {
            return Err(BuildError::UnsafeRoot { path: source_root });
        }

        let output_root = std::path::absolute(&config.output).map_err(|source| {
            BuildError::OutputCreate {
                path: config.output.clone(),
                source,
            }
        })?;
        if !check_safe_root(&output_root) {
            return Err(BuildError::UnsafeRoot { path: output_root });
        }
        if output_root == source_root || source_root.starts_with(&output_root) {
            return Err(BuildError::PathTraversal {
                scope: "output",
                path: output_root,
            });
        }

        let (classifier, pattern_warnings) =
            FileClassifier::new(&config.patterns, config.auto_ignore);
        for warning in pattern_warnings {
            config_diagnostics.push(Diagnostic::warning(
                source_root.clone(),
                codes::INVALID_PATTERN,
                format!(
                    "ignoring invalid pattern '{}': {}",
                    warning.pattern, warning.message
                ),
            ));
        }

        let resolver = LayoutResolver::new(
            source_root.clone(),
            config.layouts_dir.clone(),
            config.default_layout_rules(),
        );
        let expander = IncludeExpander::new(source_root.clone());

        Ok(Self {
            config,
            source_root,
            output_root,
            classifier,
            resolver,
            expander,
            tracker: Mutex::new(DependencyTracker::new()),
            scanner: Box::new(NoopScanner),
            cancel: CancelToken::new(),
            config_diagnostics,
        })
    }

    pub fn with_scanner(mut self, scanner: Box<dyn SecurityScanner>) -> Self {
        self.scanner = scanner;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn tracker(&self) -> &Mutex<DependencyTracker> {
        &self.tracker
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Run a full build (or a dry run when configured).
    pub fn build(&mut self) -> BuildResult<BuildReport> {
        let started = Instant::now();
        let files = self.collect_files()?;

        if self.config.dry_run {
            let report = self.classify_only(&files)?;
            return Ok(report.with_timing(elapsed_ms(started)));
        }

        self.prepare_output_root()?;

        let accumulated = files
            .par_iter()
            .fold(Accumulator::default, |mut acc, (abs, rel)| {
                if self.cancel.is_cancelled() {
                    return acc;
                }
                let classification = self.classifier.classify(rel);
                match classification.action {
                    Action::Emit => {
                        let (diags, wrote) = self.render_page(abs, rel);
                        acc.diagnostics.extend(diags);
                        if wrote {
                            acc.pages_built += 1;
                        }
                    }
                    Action::Copy => {
                        let target = self.output_root.join(rel);
                        match file_utils::copy_file(abs, &target) {
                            Ok(()) => acc.files_copied += 1,
                            Err(err) => acc.diagnostics.push(Diagnostic::error(
                                abs.clone(),
                                codes::FILE_IO,
                                format!("copy failed: {err}"),
                            )),
                        }
                    }
                    Action::Skip | Action::Ignored => {}
                }
                acc.classifications.push(classification);
                acc
            })
            .reduce(Accumulator::default, Accumulator::merge);

        if self.cancel.is_cancelled() {
            return Err(BuildError::Cancelled);
        }

        Ok(self
            .finish_report(accumulated, false)
            .with_timing(elapsed_ms(started)))
    }

    /// Rebuild a single source file (used by the external watcher).
    pub fn build_page(&self, abs: &Path) -> Vec<Diagnostic> {
        let rel = paths::relative_posix(abs, &self.source_root);
        let classification = self.classifier.classify(&rel);
        match classification.action {
            Action::Emit => self.render_page(abs, &rel).0,
            Action::Copy => {
                let target = self.output_root.join(&rel);
                match file_utils::copy_file(abs, &target) {
                    Ok(()) => Vec::new(),
                    Err(err) => vec![Diagnostic::error(
                        abs,
                        codes::FILE_IO,
                        format!("copy failed: {err}"),
                    )],
                }
            }
            Action::Skip | Action::Ignored => Vec::new(),
        }
    }

    /// Walk the source tree, register layout/include conventions, and
    /// return `(absolute, source-relative POSIX)` pairs sorted by relative
    /// path.
    fn collect_files(&mut self) -> BuildResult<Vec<(PathBuf, String)>> {
        // The walk yields canonical-rooted paths; compare against the
        // canonical output root when it already exists.
        let output_root =
            std::fs::canonicalize(&self.output_root).unwrap_or_else(|_| self.output_root.clone());
        let mut files: Vec<(PathBuf, String)> = Vec::new();

        for entry in WalkBuilder::new(&self.source_root)
            .standard_filters(false)
            .hidden(true)
            .filter_entry(move |entry| entry.path() != output_root)
            .build()
        {
            if self.cancel.is_cancelled() {
                return Err(BuildError::Cancelled);
            }
            let Ok(entry) = entry else { continue };
            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }
            let abs = entry.path().to_path_buf();
            let rel = paths::relative_posix(&abs, &self.source_root);
            files.push((abs, rel));
        }
        files.sort_by(|a, b| a.1.cmp(&b.1));

        let layouts_prefix = format!("{}/", self.config.layouts_dir);
        for (_, rel) in &files {
            if is_layout_basename(rel) {
                self.classifier.register_layout(rel);
            } else if rel.starts_with(&layouts_prefix) {
                self.classifier.register_include(rel);
            }
        }
        Ok(files)
    }

    fn prepare_output_root(&self) -> BuildResult<()> {
        if self.config.clean && self.output_root.exists() {
            std::fs::remove_dir_all(&self.output_root).map_err(|source| {
                BuildError::OutputCreate {
                    path: self.output_root.clone(),
                    source,
                }
            })?;
        }
        std::fs::create_dir_all(&self.output_root).map_err(|source| BuildError::OutputCreate {
            path: self.output_root.clone(),
            source,
        })
    }

    /// Dry run: classify everything, resolve layout chains for EMIT pages,
    /// write nothing.
    fn classify_only(&self, files: &[(PathBuf, String)]) -> BuildResult<BuildReport> {
        let mut acc = Accumulator::default();
        let mut layout_chains = BTreeMap::new();

        for (abs, rel) in files {
            if self.cancel.is_cancelled() {
                return Err(BuildError::Cancelled);
            }
            let classification = self.classifier.classify(rel);
            if classification.action == Action::Emit {
                let override_spec = self.page_override(abs, rel);
                let chain = self
                    .resolver
                    .layout_chain(abs, override_spec.as_deref(), rel);
                layout_chains.insert(
                    rel.clone(),
                    chain
                        .chain
                        .iter()
                        .map(|p| paths::relative_posix(p, &self.source_root))
                        .collect(),
                );
            }
            acc.classifications.push(classification);
        }

        let mut report = self.finish_report(acc, true);
        report.layout_chains = layout_chains;
        Ok(report)
    }

    /// The page's layout override: frontmatter `layout:` for Markdown,
    /// `data-unify` on `<html>`/`<body>` for HTML.
    fn page_override(&self, abs: &Path, rel: &str) -> Option<String> {
        let content = file_utils::safe_read_file(abs).ok()?;
        match FileClassifier::kind_of(rel) {
            FileKind::Markdown => {
                let fm = frontmatter::split(&content);
                PageMeta::parse(&fm.raw).ok().and_then(|meta| meta.layout)
            }
            _ => layout::declared_parent(&content),
        }
    }

    /// Render one EMIT page end to end. Returns its diagnostics and
    /// whether output was written.
    fn render_page(&self, abs: &Path, rel: &str) -> (Vec<Diagnostic>, bool) {
        let mut diagnostics = Vec::new();

        let content = match file_utils::safe_read_file(abs) {
            Ok(content) => content,
            Err(err) => {
                diagnostics.push(Diagnostic::error(
                    abs,
                    codes::FILE_IO,
                    format!("read failed: {err}"),
                ));
                return (diagnostics, false);
            }
        };

        let kind = FileClassifier::kind_of(rel);
        let mut meta = PageMeta::default();
        let mut page_head = String::new();
        let mut html_attrs: Vec<Attr> = Vec::new();
        let mut body_attrs: Vec<Attr> = Vec::new();

        let body = match kind {
            FileKind::Markdown => {
                let fm = frontmatter::split(&content);
                if fm.present && !fm.closed {
                    diagnostics.push(Diagnostic::warning(
                        abs,
                        codes::BAD_FRONTMATTER,
                        "frontmatter opened with '---' but never closed",
                    ));
                }
                match PageMeta::parse(&fm.raw) {
                    Ok(parsed) => meta = parsed,
                    Err(err) => diagnostics.push(Diagnostic::error(
                        abs,
                        codes::BAD_FRONTMATTER,
                        format!("malformed frontmatter: {err}"),
                    )),
                }
                if markdown::contains_head_element(&fm.body) {
                    diagnostics.push(Diagnostic::warning(
                        abs,
                        codes::HEAD_IN_BODY,
                        "markdown body contains a <head> element outside code fences",
                    ));
                }
                page_head = compose::frontmatter_head(&meta);
                html_attrs = to_attrs(meta.root_attrs("html_"));
                body_attrs = to_attrs(meta.root_attrs("body_"));
                markdown::render(&fm.body)
            }
            _ => {
                if content.trim_start().starts_with("---") {
                    // Frontmatter belongs to Markdown pages; emit the HTML
                    // page raw and record the error.
                    diagnostics.push(Diagnostic::error(
                        abs,
                        codes::BAD_FRONTMATTER,
                        "frontmatter is not supported on HTML pages",
                    ));
                    let wrote = self.write_page(rel, &content, &mut diagnostics);
                    return (diagnostics, wrote);
                }
                content.clone()
            }
        };

        if self.cancel.is_cancelled() {
            return (diagnostics, false);
        }

        let expansion = self.expander.expand(&body, abs);
        diagnostics.extend(expansion.diagnostics);
        let mut include_deps = expansion.dependencies;
        let body = expansion.html;

        let override_spec = match kind {
            FileKind::Markdown => meta.layout.clone(),
            _ => layout::declared_parent(&content),
        };
        let chain_result = self
            .resolver
            .layout_chain(abs, override_spec.as_deref(), rel);
        diagnostics.extend(chain_result.diagnostics);
        let chain = chain_result.chain;

        let final_html = if chain.is_empty() {
            body
        } else {
            let mut layout_texts = Vec::with_capacity(chain.len());
            for layout_path in &chain {
                match self.resolver.read_layout(layout_path) {
                    Ok(text) => {
                        let expanded = self.expander.expand(&text, layout_path);
                        diagnostics.extend(expanded.diagnostics);
                        for dep in expanded.dependencies {
                            if !include_deps.contains(&dep) {
                                include_deps.push(dep);
                            }
                        }
                        layout_texts.push(expanded.html);
                    }
                    Err(err) => diagnostics.push(Diagnostic::warning(
                        layout_path.clone(),
                        codes::UNRESOLVED_LAYOUT,
                        format!("failed to read layout: {err}"),
                    )),
                }
            }
            let parts = match kind {
                FileKind::Markdown => DocumentParts {
                    head: page_head,
                    body,
                    html_attrs,
                    body_attrs,
                },
                _ => compose::split_document(&body),
            };
            compose::compose_chain(parts, &layout_texts)
        };

        diagnostics.extend(self.scanner.scan(abs, &final_html));

        if self.cancel.is_cancelled() {
            return (diagnostics, false);
        }

        let wrote = self.write_page(rel, &final_html, &mut diagnostics);
        if wrote {
            self.tracker
                .lock()
                .expect("dependency tracker poisoned")
                .record(abs, &include_deps, &chain);
        }
        (diagnostics, wrote)
    }

    fn write_page(&self, rel: &str, html: &str, diagnostics: &mut Vec<Diagnostic>) -> bool {
        let target = self.output_path_for(rel);
        match file_utils::write_output(&target, html) {
            Ok(()) => true,
            Err(err) => {
                diagnostics.push(Diagnostic::error(
                    target,
                    codes::FILE_IO,
                    format!("write failed: {err}"),
                ));
                false
            }
        }
    }

    /// Output mapping: Markdown renders to `.html`; with pretty URLs a
    /// renderable `X.html` (except any `index.html`) emits to
    /// `X/index.html`.
    pub fn output_path_for(&self, rel: &str) -> PathBuf {
        let html_rel = match FileClassifier::kind_of(rel) {
            FileKind::Markdown => {
                let stem = rel.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(rel);
                format!("{stem}.html")
            }
            _ => rel.to_string(),
        };
        let pretty = if self.config.pretty_urls {
            let (dir, name) = match html_rel.rsplit_once('/') {
                Some((dir, name)) => (Some(dir), name),
                None => (None, html_rel.as_str()),
            };
            if name != "index.html" && name.ends_with(".html") {
                let stem = &name[..name.len() - ".html".len()];
                match dir {
                    Some(dir) => format!("{dir}/{stem}/index.html"),
                    None => format!("{stem}/index.html"),
                }
            } else {
                html_rel.clone()
            }
        } else {
            html_rel.clone()
        };
        self.output_root.join(pretty)
    }

    fn finish_report(&self, acc: Accumulator, dry_run: bool) -> BuildReport {
        let mut report = BuildReport {
            dry_run,
            ..Default::default()
        };
        report.classifications = acc.classifications;
        report.diagnostics = acc.diagnostics;
        report
            .diagnostics
            .extend(self.config_diagnostics.iter().cloned());
        report.pages_built = acc.pages_built;
        report.files_copied = acc.files_copied;
        report.files_skipped = count_action(&report.classifications, Action::Skip);
        report.files_ignored = count_action(&report.classifications, Action::Ignored);

        classify::sort_classifications(&mut report.classifications);
        report.diagnostics.sort_by(|a, b| {
            a.level
                .cmp(&b.level)
                .then_with(|| a.file.cmp(&b.file))
                .then_with(|| a.code.cmp(&b.code))
        });
        report
    }
}

fn count_action(classifications: &[Classification], action: Action) -> usize {
    classifications
        .iter()
        .filter(|c| c.action == action)
        .count()
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn to_attrs(pairs: Vec<(String, String)>) -> Vec<Attr> {
    pairs
        .into_iter()
        .map(|(name, value)| Attr::new(name, value))
        .collect()
}

/// Layout filenames the pre-scan registers: `_layout.html`/`.htm` and the
/// extended `_<name>.layout.html`/`.htm` variant.
fn is_layout_basename(rel: &str) -> bool {
    let name = rel.rsplit('/').next().unwrap_or(rel);
    if name == "_layout.html" || name == "_layout.htm" {
        return true;
    }
    name.starts_with('_') && (name.ends_with(".layout.html") || name.ends_with(".layout.htm"))
}
