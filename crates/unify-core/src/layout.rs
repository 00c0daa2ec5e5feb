//! Layout discovery and chain resolution.
//!
//! Discovery climbs from the page's directory to the source root looking
//! for `_layout.html` (preferred) or `_layout.htm`. A page can override
//! discovery with frontmatter `layout:` or a `data-unify` attribute; the
//! override then replaces the discovered chain. A layout whose root element
//! declares `data-unify` redirects the rest of the chain to its declared
//! parent; otherwise the directory walk continues upward. When nothing is
//! found, configured `default_layout` rules and the `_includes/` fallback
//! apply, in that order.

use crate::config::DefaultLayoutRule;
use crate::diagnostics::{codes, BuildResult, Diagnostic};
use crate::file_utils;
use crate::parsers::html::{self, Token};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Bound on the layout chain, counting `data-unify` parents.
pub const MAX_LAYOUT_CHAIN: usize = 16;

/// Filenames recognized by auto-discovery, in preference order.
const LAYOUT_BASENAMES: &[&str] = &["_layout.html", "_layout.htm"];

/// Result of chain resolution: the chain innermost-first plus any
/// recoverable diagnostics.
#[derive(Debug, Default)]
pub struct ChainResult {
    pub chain: Vec<PathBuf>,
    pub diagnostics: Vec<Diagnostic>,
}

enum OverrideResolution {
    Found(PathBuf),
    Traversal,
    NotFound,
}

/// Resolves layout chains and caches layout text. The cache is
/// read-mostly: entries are inserted once and shared immutably.
#[derive(Debug)]
pub struct LayoutResolver {
    source_root: PathBuf,
    includes_dir: String,
    default_rules: Vec<DefaultLayoutRule>,
    cache: RwLock<HashMap<PathBuf, Arc<str>>>,
}

impl LayoutResolver {
    pub fn new(
        source_root: PathBuf,
        includes_dir: String,
        default_rules: Vec<DefaultLayoutRule>,
    ) -> Self {
        Self {
            source_root,
            includes_dir,
            default_rules,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Read a layout through the shared cache.
    pub fn read_layout(&self, path: &Path) -> BuildResult<Arc<str>> {
        if let Some(text) = self
            .cache
            .read()
            .expect("layout cache poisoned")
            .get(path)
        {
            return Ok(Arc::clone(text));
        }
        let text: Arc<str> = Arc::from(file_utils::safe_read_file(path)?);
        self.cache
            .write()
            .expect("layout cache poisoned")
            .insert(path.to_path_buf(), Arc::clone(&text));
        Ok(text)
    }

    /// The innermost layout for a page, if any.
    pub fn find_layout_for_page(
        &self,
        page_abs: &Path,
        override_spec: Option<&str>,
        page_rel: &str,
    ) -> Option<PathBuf> {
        self.layout_chain(page_abs, override_spec, page_rel)
            .chain
            .into_iter()
            .next()
    }

    /// Resolve the full chain, innermost first. Never contains duplicates.
    pub fn layout_chain(
        &self,
        page_abs: &Path,
        override_spec: Option<&str>,
        page_rel: &str,
    ) -> ChainResult {
        let mut result = ChainResult::default();

        // Seed: explicit override replaces discovery entirely.
        let mut seed: Option<(PathBuf, Option<PathBuf>)> = match override_spec {
            Some(spec) => match self.resolve_spec(spec, page_abs) {
                OverrideResolution::Found(path) => Some((path, None)),
                OverrideResolution::Traversal => {
                    result.diagnostics.push(Diagnostic::security(
                        page_abs,
                        codes::PATH_TRAVERSAL,
                        format!("layout override '{spec}' escapes the source root"),
                    ));
                    return result;
                }
                OverrideResolution::NotFound => {
                    result.diagnostics.push(
                        Diagnostic::warning(
                            page_abs,
                            codes::UNRESOLVED_LAYOUT,
                            format!("layout override '{spec}' could not be resolved"),
                        )
                        .with_suggestion(
                            "use a path relative to the page, an absolute path from the source \
                             root, or a short name resolvable on the ancestor chain",
                        ),
                    );
                    return result;
                }
            },
            None => {
                let discovered = page_abs.parent().and_then(|dir| self.discover_from(dir));
                match discovered {
                    Some((layout, dir)) => Some((layout, Some(dir))),
                    None => self
                        .default_rule_layout(page_abs, page_rel, &mut result.diagnostics)
                        .or_else(|| self.fallback_layout())
                        .map(|layout| (layout, None)),
                }
            }
        };

        while let Some((path, walk_dir)) = seed.take() {
            if result.chain.contains(&path) {
                result.diagnostics.push(Diagnostic::warning(
                    page_abs,
                    codes::LAYOUT_CHAIN_DEPTH,
                    format!("layout chain loops at {}", path.display()),
                ));
                break;
            }
            if result.chain.len() >= MAX_LAYOUT_CHAIN {
                result.diagnostics.push(Diagnostic::error(
                    page_abs,
                    codes::LAYOUT_CHAIN_DEPTH,
                    format!("layout chain exceeds {MAX_LAYOUT_CHAIN} layouts"),
                ));
                result.chain.clear();
                break;
            }

            let text = match self.read_layout(&path) {
                Ok(text) => text,
                Err(err) => {
                    result.diagnostics.push(Diagnostic::warning(
                        path.clone(),
                        codes::UNRESOLVED_LAYOUT,
                        format!("failed to read layout: {err}"),
                    ));
                    break;
                }
            };
            result.chain.push(path.clone());

            if let Some(parent_spec) = declared_parent(&text) {
                match self.resolve_spec(&parent_spec, &path) {
                    OverrideResolution::Found(parent) => seed = Some((parent, None)),
                    OverrideResolution::Traversal => {
                        result.diagnostics.push(Diagnostic::security(
                            path.clone(),
                            codes::PATH_TRAVERSAL,
                            format!("layout parent '{parent_spec}' escapes the source root"),
                        ));
                    }
                    OverrideResolution::NotFound => {
                        result.diagnostics.push(Diagnostic::warning(
                            path.clone(),
                            codes::UNRESOLVED_LAYOUT,
                            format!("layout parent '{parent_spec}' could not be resolved"),
                        ));
                    }
                }
            } else if let Some(dir) = walk_dir {
                if dir != self.source_root {
                    seed = dir
                        .parent()
                        .filter(|parent| parent.starts_with(&self.source_root))
                        .and_then(|parent| self.discover_from(parent))
                        .map(|(layout, found_dir)| (layout, Some(found_dir)));
                }
            }
        }

        result
    }

    /// Resolve a layout specification (override, frontmatter, or
    /// `default_layout` value) against a page path. `None` covers both
    /// unresolvable and escaping specs; chain resolution distinguishes the
    /// two for diagnostics.
    pub fn resolve_override(&self, spec: &str, page_abs: &Path) -> Option<PathBuf> {
        match self.resolve_spec(spec, page_abs) {
            OverrideResolution::Found(path) => Some(path),
            OverrideResolution::Traversal | OverrideResolution::NotFound => None,
        }
    }

    /// All layout files whose presence affects this page: the chain plus
    /// the `_includes/` fallback, deduplicated in first-seen order.
    pub fn layout_dependencies(
        &self,
        page_abs: &Path,
        override_spec: Option<&str>,
        page_rel: &str,
    ) -> Vec<PathBuf> {
        let mut deps = self.layout_chain(page_abs, override_spec, page_rel).chain;
        if let Some(fallback) = self.fallback_layout() {
            if !deps.contains(&fallback) {
                deps.push(fallback);
            }
        }
        deps
    }

    /// Walk from `start_dir` to the source root; first directory with a
    /// layout file wins. Returns the layout and the directory it sits in.
    fn discover_from(&self, start_dir: &Path) -> Option<(PathBuf, PathBuf)> {
        let mut dir = start_dir.to_path_buf();
        loop {
            if !dir.starts_with(&self.source_root) {
                return None;
            }
            if let Some(layout) = discover_in_dir(&dir) {
                return Some((layout, dir));
            }
            if dir == self.source_root {
                return None;
            }
            dir = dir.parent()?.to_path_buf();
        }
    }

    fn fallback_layout(&self) -> Option<PathBuf> {
        let dir = self.source_root.join(&self.includes_dir);
        for name in ["layout.html", "layout.htm"] {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        None
    }

    fn default_rule_layout(
        &self,
        page_abs: &Path,
        page_rel: &str,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Option<PathBuf> {
        for rule in &self.default_rules {
            let layout = match rule {
                DefaultLayoutRule::Glob { pattern, layout } => {
                    if !pattern.matches(page_rel) {
                        continue;
                    }
                    layout
                }
                DefaultLayoutRule::Global { layout } => layout,
            };
            match self.resolve_spec(layout, page_abs) {
                OverrideResolution::Found(path) => return Some(path),
                _ => {
                    diagnostics.push(Diagnostic::warning(
                        page_abs,
                        codes::UNRESOLVED_LAYOUT,
                        format!("default layout '{layout}' could not be resolved"),
                    ));
                }
            }
        }
        None
    }

    /// Resolve a layout specification relative to `from` (a page or layout
    /// file). Three forms: absolute-from-source (`/...`), relative (has an
    /// extension or separator), and short name.
    fn resolve_spec(&self, spec: &str, from: &Path) -> OverrideResolution {
        let spec = spec.trim();
        if spec.is_empty() {
            return OverrideResolution::NotFound;
        }

        if let Some(rooted) = spec.strip_prefix('/') {
            let candidate = self.source_root.join(rooted);
            return self.check_candidate(&candidate);
        }

        if spec.contains('/') || spec.contains('.') {
            let base = from.parent().unwrap_or(&self.source_root);
            let candidate = base.join(spec);
            return self.check_candidate(&candidate);
        }

        self.resolve_short_name(spec, from)
    }

    /// Short names search the page's directory and each ancestor for
    /// `_<name>.layout.html`, `_<name>.layout.htm`, `_<name>.html`,
    /// `_<name>.htm` (the `.layout.` form preferred), then `_includes/`
    /// with and without the underscore prefix.
    fn resolve_short_name(&self, name: &str, from: &Path) -> OverrideResolution {
        let basenames = [
            format!("_{name}.layout.html"),
            format!("_{name}.layout.htm"),
            format!("_{name}.html"),
            format!("_{name}.htm"),
        ];
        let mut dir = from.parent().map(Path::to_path_buf);
        while let Some(current) = dir {
            if !current.starts_with(&self.source_root) {
                break;
            }
            for basename in &basenames {
                let candidate = current.join(basename);
                if candidate.is_file() {
                    return OverrideResolution::Found(candidate);
                }
            }
            if current == self.source_root {
                break;
            }
            dir = current.parent().map(Path::to_path_buf);
        }

        let includes = self.source_root.join(&self.includes_dir);
        for basename in [
            format!("_{name}.layout.html"),
            format!("{name}.layout.html"),
            format!("_{name}.layout.htm"),
            format!("{name}.layout.htm"),
            format!("_{name}.html"),
            format!("{name}.html"),
            format!("_{name}.htm"),
            format!("{name}.htm"),
        ] {
            let candidate = includes.join(basename);
            if candidate.is_file() {
                return OverrideResolution::Found(candidate);
            }
        }
        OverrideResolution::NotFound
    }

    fn check_candidate(&self, candidate: &Path) -> OverrideResolution {
        match crate::paths::normalize_lexical(candidate) {
            Some(normalized) => {
                if !normalized.starts_with(&self.source_root) {
                    return OverrideResolution::Traversal;
                }
                if normalized.is_file() {
                    OverrideResolution::Found(normalized)
                } else {
                    OverrideResolution::NotFound
                }
            }
            None => OverrideResolution::Traversal,
        }
    }
}

/// Auto-discovery inside a single directory: `_layout.html` preferred over
/// `_layout.htm`.
fn discover_in_dir(dir: &Path) -> Option<PathBuf> {
    for basename in LAYOUT_BASENAMES {
        let candidate = dir.join(basename);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

/// The `data-unify` parent declared on a document's root element, checking
/// `<html>`, then `<body>`, then the first open tag.
pub fn declared_parent(text: &str) -> Option<String> {
    let mut html_val: Option<String> = None;
    let mut body_val: Option<String> = None;
    let mut first_val: Option<String> = None;
    let mut saw_first = false;
    for token in html::scan(text) {
        let Token::Open(tag) = token else { continue };
        let value = tag
            .attr("data-unify")
            .map(str::to_string)
            .filter(|v| !v.is_empty());
        match tag.name.as_str() {
            "html" => html_val = value,
            "body" => {
                body_val = value;
                break; // root attributes are decided by now
            }
            _ => {
                if !saw_first {
                    saw_first = true;
                    first_val = value;
                }
            }
        }
    }
    html_val.or(body_val).or(first_val)
}
