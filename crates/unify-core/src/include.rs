//! Server-side include expansion with cycle protection.
//!
//! Two directive forms, case-sensitive: `<!--#include file="P" -->`
//! resolves relative to the including file, `<!--#include virtual="P" -->`
//! relative to the source root (leading `/` optional). Expansion recurses
//! with a visited set and a depth bound; a missing target becomes an inline
//! warning comment and the build continues.

use crate::diagnostics::{codes, Diagnostic};
use crate::file_utils;
use crate::parsers::markdown;
use crate::paths::normalize_lexical;
use crate::regex_util::static_regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Bound on include nesting.
pub const MAX_INCLUDE_DEPTH: usize = 10;

static_regex!(
    fn include_directive,
    r#"<!--#include\s+(file|virtual)="([^"]*)"\s*-->"#
);

/// Result of expanding a document's directives.
#[derive(Debug, Default)]
pub struct Expansion {
    pub html: String,
    pub diagnostics: Vec<Diagnostic>,
    /// Every include file that was read (or attempted), in first-seen
    /// order. Feeds the dependency tracker.
    pub dependencies: Vec<PathBuf>,
}

/// Expands include directives under a fixed source root.
#[derive(Debug)]
pub struct IncludeExpander {
    source_root: PathBuf,
}

impl IncludeExpander {
    pub fn new(source_root: PathBuf) -> Self {
        Self { source_root }
    }

    /// Expand every directive in `content`, which lives at `file_abs`.
    pub fn expand(&self, content: &str, file_abs: &Path) -> Expansion {
        let mut expansion = Expansion::default();
        let mut visited = HashSet::new();
        let mut trail = Vec::new();
        if let Some(normalized) = normalize_lexical(file_abs) {
            visited.insert(normalized.clone());
            trail.push(normalized);
        }
        expansion.html = self.expand_inner(content, file_abs, &visited, &trail, 0, &mut expansion.diagnostics, &mut expansion.dependencies);
        expansion
    }

    /// The set of paths `expand` would attempt to read, without splicing
    /// any content. Recursive, with the same cycle guard.
    pub fn extract_dependencies(&self, content: &str, file_abs: &Path) -> Vec<PathBuf> {
        let mut deps = Vec::new();
        let mut visited = HashSet::new();
        if let Some(normalized) = normalize_lexical(file_abs) {
            visited.insert(normalized);
        }
        self.collect_dependencies(content, file_abs, &visited, 0, &mut deps);
        deps
    }

    #[allow(clippy::too_many_arguments)]
    fn expand_inner(
        &self,
        content: &str,
        file_abs: &Path,
        visited: &HashSet<PathBuf>,
        trail: &[PathBuf],
        depth: usize,
        diagnostics: &mut Vec<Diagnostic>,
        dependencies: &mut Vec<PathBuf>,
    ) -> String {
        let mut out = String::with_capacity(content.len());
        let mut cursor = 0usize;

        for captures in include_directive().captures_iter(content) {
            let whole = captures.get(0).expect("capture 0 always present");
            let kind = &captures[1];
            let target = &captures[2];
            out.push_str(&content[cursor..whole.start()]);
            cursor = whole.end();

            let resolved = match self.resolve(kind, target, file_abs) {
                Ok(path) => path,
                Err(diag) => {
                    out.push_str(&format!(
                        "<!-- WARNING: Include path not allowed: {target} -->"
                    ));
                    diagnostics.push(diag);
                    continue;
                }
            };

            if depth >= MAX_INCLUDE_DEPTH {
                out.push_str(&format!(
                    "<!-- ERROR: Include depth limit exceeded at: {target} -->"
                ));
                diagnostics.push(Diagnostic::error(
                    file_abs,
                    codes::INCLUDE_DEPTH,
                    format!(
                        "include nesting exceeds {MAX_INCLUDE_DEPTH} levels at '{target}'"
                    ),
                ));
                continue;
            }

            if visited.contains(&resolved) {
                let mut cycle: Vec<String> = trail
                    .iter()
                    .skip_while(|p| **p != resolved)
                    .map(|p| p.display().to_string())
                    .collect();
                cycle.push(resolved.display().to_string());
                out.push_str(&format!(
                    "<!-- ERROR: Circular include detected: {target} -->"
                ));
                diagnostics.push(Diagnostic::error(
                    file_abs,
                    codes::CIRCULAR_INCLUDE,
                    format!("circular include: {}", cycle.join(" -> ")),
                ));
                continue;
            }

            if !dependencies.contains(&resolved) {
                dependencies.push(resolved.clone());
            }

            let text = match file_utils::safe_read_file(&resolved) {
                Ok(text) => text,
                Err(_) => {
                    out.push_str(&format!(
                        "<!-- WARNING: Include file not found: {target} -->"
                    ));
                    diagnostics.push(
                        Diagnostic::warning(
                            file_abs,
                            codes::MISSING_INCLUDE,
                            format!("include file not found: {target}"),
                        )
                        .with_suggestion(format!(
                            "expected at {}",
                            resolved.display()
                        )),
                    );
                    continue;
                }
            };

            let text = if is_markdown(&resolved) {
                markdown::render(&text)
            } else {
                text
            };

            let mut next_visited = visited.clone();
            next_visited.insert(resolved.clone());
            let mut next_trail = trail.to_vec();
            next_trail.push(resolved.clone());
            let expanded = self.expand_inner(
                &text,
                &resolved,
                &next_visited,
                &next_trail,
                depth + 1,
                diagnostics,
                dependencies,
            );
            out.push_str(&expanded);
        }
        out.push_str(&content[cursor..]);
        out
    }

    fn collect_dependencies(
        &self,
        content: &str,
        file_abs: &Path,
        visited: &HashSet<PathBuf>,
        depth: usize,
        deps: &mut Vec<PathBuf>,
    ) {
        if depth >= MAX_INCLUDE_DEPTH {
            return;
        }
        for captures in include_directive().captures_iter(content) {
            let Ok(resolved) = self.resolve(&captures[1], &captures[2], file_abs) else {
                continue;
            };
            if visited.contains(&resolved) {
                continue;
            }
            if !deps.contains(&resolved) {
                deps.push(resolved.clone());
            }
            if let Ok(text) = file_utils::safe_read_file(&resolved) {
                let text = if is_markdown(&resolved) {
                    markdown::render(&text)
                } else {
                    text
                };
                let mut next_visited = visited.clone();
                next_visited.insert(resolved.clone());
                self.collect_dependencies(&text, &resolved, &next_visited, depth + 1, deps);
            }
        }
    }

    /// Resolve a directive target. `file` is relative to the including
    /// file, `virtual` to the source root. Escapes are rejected.
    fn resolve(&self, kind: &str, target: &str, file_abs: &Path) -> Result<PathBuf, Diagnostic> {
        let candidate = match kind {
            "virtual" => self.source_root.join(target.trim_start_matches('/')),
            _ => file_abs
                .parent()
                .unwrap_or(&self.source_root)
                .join(target),
        };
        match normalize_lexical(&candidate) {
            Some(normalized) if normalized.starts_with(&self.source_root) => Ok(normalized),
            _ => Err(Diagnostic::security(
                file_abs,
                codes::PATH_TRAVERSAL,
                format!("include '{target}' escapes the source root"),
            )),
        }
    }
}

fn is_markdown(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()).as_deref(),
        Some("md") | Some("markdown")
    )
}
