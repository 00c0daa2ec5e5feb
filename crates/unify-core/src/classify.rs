//! File classification under the three-tier precedence hierarchy.
//!
//! Every source file gets exactly one [`Classification`] per build. Tier 1
//! holds the explicit `render`/`copy` overrides, tier 2 the ignore rules and
//! the underscore auto-ignore, tier 3 the extension defaults.

use crate::config::PatternSets;
use crate::paths::{PatternList, PatternWarning};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// What the build does with a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Action {
    /// Render to HTML in the output tree.
    Emit,
    /// Stream verbatim into the output tree.
    Copy,
    /// Produce no output, without an explicit rule saying so.
    Skip,
    /// Produce no output because a rule said so.
    Ignored,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::Emit => "EMIT",
            Action::Copy => "COPY",
            Action::Skip => "SKIP",
            Action::Ignored => "IGNORED",
        })
    }
}

/// Precedence level that produced a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tier {
    ExplicitOverrides = 1,
    IgnoreRules = 2,
    DefaultBehavior = 3,
}

/// Extension category of a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileKind {
    Html,
    Markdown,
    Asset,
    Other,
}

impl FileKind {
    pub fn is_renderable(self) -> bool {
        matches!(self, FileKind::Html | FileKind::Markdown)
    }
}

/// Extensions treated as copyable assets.
const ASSET_EXTENSIONS: &[&str] = &[
    "css", "js", "mjs", "json", "xml", "txt", "ico", "png", "jpg", "jpeg", "gif", "svg", "webp",
    "avif", "woff", "woff2", "ttf", "otf", "eot", "map", "pdf", "mp3", "mp4", "webm",
];

/// Directory segments that mark an asset subtree for the tier-3 default.
const ASSET_DIRECTORIES: &[&str] = &[
    "assets", "static", "public", "css", "js", "images", "img", "fonts", "media",
];

/// The decision for one source file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub action: Action,
    pub tier: Tier,
    /// Human-readable rule that decided, e.g. `--render` or
    /// `auto-ignore (underscore)`.
    pub reason: String,
    /// Source-relative POSIX path.
    pub path: String,
}

/// Classifies source-relative POSIX paths. Pure: the result depends only on
/// the path, the compiled configuration, and the registered layout/include
/// sets.
#[derive(Debug, Default)]
pub struct FileClassifier {
    copy: PatternList,
    ignore: PatternList,
    render: PatternList,
    ignore_render: PatternList,
    ignore_copy: PatternList,
    auto_ignore: bool,
    registered_layouts: HashSet<String>,
    registered_includes: HashSet<String>,
}

impl FileClassifier {
    /// Compile the configured pattern sets. Invalid patterns are returned
    /// as warnings and skipped.
    pub fn new(patterns: &PatternSets, auto_ignore: bool) -> (Self, Vec<PatternWarning>) {
        let mut warnings = Vec::new();
        let mut compile = |set: &[String]| {
            let (list, bad) = PatternList::compile(set);
            warnings.extend(bad);
            list
        };
        let classifier = Self {
            copy: compile(&patterns.copy),
            ignore: compile(&patterns.ignore),
            render: compile(&patterns.render),
            ignore_render: compile(&patterns.ignore_render),
            ignore_copy: compile(&patterns.ignore_copy),
            auto_ignore,
            registered_layouts: HashSet::new(),
            registered_includes: HashSet::new(),
        };
        (classifier, warnings)
    }

    /// Register a layout file (source-relative POSIX path) so auto-ignore
    /// excludes it from emission.
    pub fn register_layout(&mut self, rel: &str) {
        self.registered_layouts.insert(rel.to_string());
    }

    /// Register an include file, same contract as [`register_layout`].
    ///
    /// [`register_layout`]: Self::register_layout
    pub fn register_include(&mut self, rel: &str) {
        self.registered_includes.insert(rel.to_string());
    }

    pub fn kind_of(rel: &str) -> FileKind {
        let ext = rel
            .rsplit('/')
            .next()
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase());
        match ext.as_deref() {
            Some("html") | Some("htm") => FileKind::Html,
            Some("md") | Some("markdown") => FileKind::Markdown,
            Some(ext) if ASSET_EXTENSIONS.contains(&ext) => FileKind::Asset,
            _ => FileKind::Other,
        }
    }

    /// Classify one source-relative POSIX path.
    pub fn classify(&self, rel: &str) -> Classification {
        let kind = Self::kind_of(rel);

        // Tier 1: explicit overrides. Render beats copy on overlap.
        if self.render.matches(rel) {
            return self.decided(rel, Action::Emit, Tier::ExplicitOverrides, "--render");
        }
        if self.copy.matches(rel) {
            return self.decided(rel, Action::Copy, Tier::ExplicitOverrides, "--copy");
        }

        // Tier 2: ignore rules.
        if self.ignore.matches(rel) {
            return self.decided(rel, Action::Ignored, Tier::IgnoreRules, "--ignore");
        }
        if kind.is_renderable() && self.ignore_render.matches(rel) {
            return self.decided(rel, Action::Ignored, Tier::IgnoreRules, "--ignore-render");
        }
        if kind == FileKind::Asset && self.ignore_copy.matches(rel) {
            return self.decided(rel, Action::Ignored, Tier::IgnoreRules, "--ignore-copy");
        }
        if self.auto_ignore {
            if has_underscore_segment(rel) {
                return self.decided(
                    rel,
                    Action::Ignored,
                    Tier::IgnoreRules,
                    "auto-ignore (underscore)",
                );
            }
            if self.registered_layouts.contains(rel) {
                return self.decided(rel, Action::Ignored, Tier::IgnoreRules, "registered layout");
            }
            if self.registered_includes.contains(rel) {
                return self.decided(rel, Action::Ignored, Tier::IgnoreRules, "registered include");
            }
        }

        // Tier 3: defaults by extension category.
        match kind {
            FileKind::Html | FileKind::Markdown => {
                self.decided(rel, Action::Emit, Tier::DefaultBehavior, "default (renderable)")
            }
            FileKind::Asset if in_asset_directory(rel) => {
                self.decided(rel, Action::Copy, Tier::DefaultBehavior, "default (asset)")
            }
            _ => self.decided(rel, Action::Skip, Tier::DefaultBehavior, "no rule matched"),
        }
    }

    /// Classify a batch of source-relative POSIX paths.
    pub fn classify_all<'a>(
        &self,
        paths: impl IntoIterator<Item = &'a str>,
    ) -> Vec<Classification> {
        paths.into_iter().map(|rel| self.classify(rel)).collect()
    }

    fn decided(&self, rel: &str, action: Action, tier: Tier, reason: &str) -> Classification {
        Classification {
            action,
            tier,
            reason: reason.to_string(),
            path: rel.to_string(),
        }
    }
}

/// True when any path segment (file or directory) starts with `_`.
fn has_underscore_segment(rel: &str) -> bool {
    rel.split('/').any(|segment| segment.starts_with('_'))
}

fn in_asset_directory(rel: &str) -> bool {
    let mut segments: Vec<&str> = rel.split('/').collect();
    segments.pop(); // file name is not a directory
    segments
        .iter()
        .any(|seg| ASSET_DIRECTORIES.iter().any(|d| d.eq_ignore_ascii_case(seg)))
}

/// Sort classifications for deterministic reporting: action group order,
/// then lexicographic path.
pub fn sort_classifications(classifications: &mut [Classification]) {
    classifications.sort_by(|a, b| a.action.cmp(&b.action).then_with(|| a.path.cmp(&b.path)));
}

/// Render the dry-run report: grouped counts and per-action listings, with
/// tier detail at debug verbosity. `layout_chains` maps EMIT paths to their
/// resolved chains.
pub fn format_dry_run(
    classifications: &[Classification],
    layout_chains: &std::collections::BTreeMap<String, Vec<String>>,
    debug: bool,
) -> String {
    let mut sorted: Vec<Classification> = classifications.to_vec();
    sort_classifications(&mut sorted);

    let mut out = String::new();
    for action in [Action::Emit, Action::Copy, Action::Skip, Action::Ignored] {
        let group: Vec<&Classification> = sorted.iter().filter(|c| c.action == action).collect();
        if group.is_empty() {
            continue;
        }
        out.push_str(&format!("{} ({})\n", action, group.len()));
        for c in group {
            if debug {
                out.push_str(&format!("  {} [tier {}: {}]\n", c.path, c.tier as u8, c.reason));
            } else {
                out.push_str(&format!("  {}\n", c.path));
            }
            if action == Action::Emit {
                if let Some(chain) = layout_chains.get(&c.path) {
                    if !chain.is_empty() {
                        out.push_str(&format!("    layout: {}\n", chain.join(" -> ")));
                    }
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier(patterns: PatternSets, auto_ignore: bool) -> FileClassifier {
        let (c, warnings) = FileClassifier::new(&patterns, auto_ignore);
        assert!(warnings.is_empty(), "unexpected warnings: {:?}", warnings);
        c
    }

    fn default_classifier() -> FileClassifier {
        classifier(PatternSets::default(), true)
    }

    #[test]
    fn test_renderable_defaults_to_emit() {
        let c = default_classifier();
        let result = c.classify("index.html");
        assert_eq!(result.action, Action::Emit);
        assert_eq!(result.tier, Tier::DefaultBehavior);
        assert_eq!(c.classify("blog/post.md").action, Action::Emit);
    }

    #[test]
    fn test_asset_in_asset_dir_copies() {
        let c = default_classifier();
        assert_eq!(c.classify("assets/site.css").action, Action::Copy);
        assert_eq!(c.classify("static/img/logo.png").action, Action::Copy);
    }

    #[test]
    fn test_asset_outside_asset_dir_skips() {
        let c = default_classifier();
        assert_eq!(c.classify("notes/data.json").action, Action::Skip);
    }

    #[test]
    fn test_other_files_skip() {
        let c = default_classifier();
        assert_eq!(c.classify("Makefile").action, Action::Skip);
        assert_eq!(c.classify("src/tool.py").action, Action::Skip);
    }

    #[test]
    fn test_underscore_file_auto_ignored() {
        let c = default_classifier();
        let result = c.classify("_layout.html");
        assert_eq!(result.action, Action::Ignored);
        assert_eq!(result.reason, "auto-ignore (underscore)");
    }

    #[test]
    fn test_underscore_ancestor_auto_ignored() {
        let c = default_classifier();
        assert_eq!(c.classify("_includes/nav.html").action, Action::Ignored);
        assert_eq!(c.classify("blog/_drafts/wip.md").action, Action::Ignored);
    }

    #[test]
    fn test_auto_ignore_off_emits_layout_file() {
        let c = classifier(PatternSets::default(), false);
        let result = c.classify("_layout.html");
        assert_eq!(result.action, Action::Emit);
        assert_eq!(result.tier, Tier::DefaultBehavior);
    }

    #[test]
    fn test_registered_layout_ignored_only_with_auto_ignore() {
        let mut c = default_classifier();
        c.register_layout("shared/base.html");
        let result = c.classify("shared/base.html");
        assert_eq!(result.action, Action::Ignored);
        assert_eq!(result.reason, "registered layout");

        let (mut c, _) = FileClassifier::new(&PatternSets::default(), false);
        c.register_layout("shared/base.html");
        assert_eq!(c.classify("shared/base.html").action, Action::Emit);
    }

    #[test]
    fn test_render_beats_copy() {
        let patterns = PatternSets {
            render: vec!["special/**".to_string()],
            copy: vec!["special/**".to_string()],
            ..Default::default()
        };
        let c = classifier(patterns, true);
        let result = c.classify("special/file.html");
        assert_eq!(result.action, Action::Emit);
        assert_eq!(result.reason, "--render");
    }

    #[test]
    fn test_render_beats_ignore_render() {
        let patterns = PatternSets {
            render: vec!["docs/**".to_string()],
            ignore_render: vec!["docs/**".to_string()],
            ..Default::default()
        };
        let c = classifier(patterns, true);
        assert_eq!(c.classify("docs/guide.html").action, Action::Emit);
    }

    #[test]
    fn test_copy_forces_renderable_to_copy() {
        let patterns = PatternSets {
            copy: vec!["raw/**".to_string()],
            ..Default::default()
        };
        let c = classifier(patterns, true);
        let result = c.classify("raw/snippet.html");
        assert_eq!(result.action, Action::Copy);
        assert_eq!(result.tier, Tier::ExplicitOverrides);
    }

    #[test]
    fn test_ignore_render_only_hits_renderables() {
        let patterns = PatternSets {
            ignore_render: vec!["**/*".to_string()],
            ..Default::default()
        };
        let c = classifier(patterns, true);
        assert_eq!(c.classify("page.html").action, Action::Ignored);
        assert_eq!(c.classify("assets/site.css").action, Action::Copy);
    }

    #[test]
    fn test_ignore_copy_only_hits_assets() {
        let patterns = PatternSets {
            ignore_copy: vec!["assets/**".to_string()],
            ..Default::default()
        };
        let c = classifier(patterns, true);
        assert_eq!(c.classify("assets/site.css").action, Action::Ignored);
        assert_eq!(c.classify("assets/page.html").action, Action::Emit);
    }

    #[test]
    fn test_negation_restores_default() {
        let patterns = PatternSets {
            ignore: vec!["**/blog/**".to_string(), "!**/blog/featured/**".to_string()],
            ..Default::default()
        };
        let c = classifier(patterns, true);
        assert_eq!(c.classify("blog/regular.md").action, Action::Ignored);
        let restored = c.classify("blog/featured/post.md");
        assert_eq!(restored.action, Action::Emit);
        assert_eq!(restored.tier, Tier::DefaultBehavior);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let c = default_classifier();
        let a = c.classify("blog/post.md");
        let b = c.classify("blog/post.md");
        assert_eq!(a.action, b.action);
        assert_eq!(a.reason, b.reason);
    }

    #[test]
    fn test_kind_of() {
        assert_eq!(FileClassifier::kind_of("a.html"), FileKind::Html);
        assert_eq!(FileClassifier::kind_of("a.HTM"), FileKind::Html);
        assert_eq!(FileClassifier::kind_of("a.md"), FileKind::Markdown);
        assert_eq!(FileClassifier::kind_of("a.css"), FileKind::Asset);
        assert_eq!(FileClassifier::kind_of("a"), FileKind::Other);
        assert_eq!(FileClassifier::kind_of("dir.html/file"), FileKind::Other);
    }

    #[test]
    fn test_dry_run_report_groups_and_sorts() {
        let c = default_classifier();
        let classifications = vec![
            c.classify("b.html"),
            c.classify("a.html"),
            c.classify("assets/x.css"),
            c.classify("_layout.html"),
        ];
        let chains = std::collections::BTreeMap::from([(
            "a.html".to_string(),
            vec!["_layout.html".to_string()],
        )]);
        let report = format_dry_run(&classifications, &chains, false);
        let emit_pos = report.find("EMIT (2)").expect("emit group present");
        let copy_pos = report.find("COPY (1)").expect("copy group present");
        let ignored_pos = report.find("IGNORED (1)").expect("ignored group present");
        assert!(emit_pos < copy_pos && copy_pos < ignored_pos);
        assert!(report.find("a.html").unwrap() < report.find("b.html").unwrap());
        assert!(report.contains("layout: _layout.html"));
    }

    #[test]
    fn test_dry_run_report_debug_shows_tiers() {
        let c = default_classifier();
        let classifications = vec![c.classify("_layout.html")];
        let report = format_dry_run(&classifications, &Default::default(), true);
        assert!(report.contains("[tier 2: auto-ignore (underscore)]"));
    }
}
