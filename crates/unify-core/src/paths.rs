//! Path normalization and ordered glob-pattern evaluation.
//!
//! All pattern matching happens on source-relative POSIX paths; the OS-native
//! form is used only for filesystem I/O. Pattern lists evaluate in declared
//! order with last-match-wins semantics, and a `!`-prefixed entry that
//! matches re-includes a previously matched path.

use std::path::{Component, Path, PathBuf};

/// Hard cap on a single pattern's byte length.
pub const MAX_PATTERN_LEN: usize = 4096;
/// Hard cap on wildcard metacharacters per pattern.
pub const MAX_PATTERN_WILDCARDS: usize = 64;
/// Hard cap on `{a,b}` alternation expansion per pattern.
pub const MAX_BRACE_EXPANSIONS: usize = 64;

/// Glob match options: `*` never crosses a separator (use `**`), matching is
/// case-sensitive, a leading dot is an ordinary character.
const PATTERN_MATCH_OPTIONS: glob::MatchOptions = glob::MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Convert a path to forward-slash POSIX form for pattern evaluation.
pub fn to_posix(path: &Path) -> String {
    let mut out = String::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => {
                if !out.is_empty() {
                    out.push('/');
                }
                out.push_str(&part.to_string_lossy());
            }
            Component::RootDir | Component::Prefix(_) => {}
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.is_empty() {
                    out.push('/');
                }
                out.push_str("..");
            }
        }
    }
    out
}

/// Source-relative POSIX form of `path` under `root`. Falls back to the
/// full path when `path` is not under `root`.
pub fn relative_posix(path: &Path, root: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    to_posix(rel)
}

/// Lexically normalize a path: resolve `.` and `..` without touching the
/// filesystem. Returns `None` when `..` would climb past the start, which
/// callers treat as a traversal attempt.
pub fn normalize_lexical(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    let mut depth: usize = 0;
    for component in path.components() {
        match component {
            Component::Prefix(p) => out.push(p.as_os_str()),
            Component::RootDir => out.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return None;
                }
                out.pop();
                depth -= 1;
            }
            Component::Normal(part) => {
                out.push(part);
                depth += 1;
            }
        }
    }
    Some(out)
}

/// A pattern that could not be compiled; surfaced as a `U001` diagnostic by
/// the classifier and as a [`ConfigWarning`](crate::config::ConfigWarning)
/// by config validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternWarning {
    pub pattern: String,
    pub message: String,
}

#[derive(Debug, Clone)]
struct PatternEntry {
    raw: String,
    negated: bool,
    globs: Vec<glob::Pattern>,
}

impl PatternEntry {
    fn matches(&self, path: &str) -> bool {
        self.globs
            .iter()
            .any(|g| g.matches_with(path, PATTERN_MATCH_OPTIONS))
    }
}

/// An ordered, compiled pattern list.
#[derive(Debug, Clone, Default)]
pub struct PatternList {
    entries: Vec<PatternEntry>,
}

impl PatternList {
    /// Compile a pattern list. Invalid entries become warnings and are
    /// skipped rather than failing the whole list.
    pub fn compile(patterns: &[String]) -> (Self, Vec<PatternWarning>) {
        let mut entries = Vec::with_capacity(patterns.len());
        let mut warnings = Vec::new();
        for raw in patterns {
            match compile_entry(raw) {
                Ok(entry) => entries.push(entry),
                Err(message) => warnings.push(PatternWarning {
                    pattern: raw.clone(),
                    message,
                }),
            }
        }
        (Self { entries }, warnings)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Evaluate `path` against the list. The last matching entry decides:
    /// a non-negated match yields `true`, a negated match re-includes the
    /// path and yields `false`.
    pub fn matches(&self, path: &str) -> bool {
        let mut matched = false;
        for entry in &self.entries {
            if entry.matches(path) {
                matched = !entry.negated;
            }
        }
        matched
    }

    /// The raw text of the last entry that decides the match, if any.
    /// Used for classification reasons.
    pub fn matching_pattern(&self, path: &str) -> Option<&str> {
        let mut found = None;
        for entry in &self.entries {
            if entry.matches(path) {
                found = if entry.negated {
                    None
                } else {
                    Some(entry.raw.as_str())
                };
            }
        }
        found
    }
}

/// Reject NUL bytes, oversize patterns, and wildcard blowups before any
/// compilation happens.
pub fn check_pattern(raw: &str) -> Result<(), String> {
    if raw.contains('\0') {
        return Err("pattern contains a NUL byte".to_string());
    }
    if raw.len() > MAX_PATTERN_LEN {
        return Err(format!(
            "pattern is {} bytes, limit is {}",
            raw.len(),
            MAX_PATTERN_LEN
        ));
    }
    let wildcards = raw
        .chars()
        .filter(|c| matches!(c, '*' | '?' | '[' | '{'))
        .count();
    if wildcards > MAX_PATTERN_WILDCARDS {
        return Err(format!(
            "pattern has {} wildcards, limit is {}",
            wildcards, MAX_PATTERN_WILDCARDS
        ));
    }
    Ok(())
}

fn compile_entry(raw: &str) -> Result<PatternEntry, String> {
    check_pattern(raw)?;
    let (negated, body) = match raw.strip_prefix('!') {
        Some(rest) => (true, rest),
        None => (false, raw),
    };
    let body = body.replace('\\', "/");
    let expanded = expand_braces(&body)?;
    let mut globs = Vec::with_capacity(expanded.len());
    for candidate in &expanded {
        let compiled = glob::Pattern::new(candidate).map_err(|e| e.to_string())?;
        globs.push(compiled);
    }
    Ok(PatternEntry {
        raw: raw.to_string(),
        negated,
        globs,
    })
}

/// Expand `{a,b}` alternation into plain glob patterns, since
/// `glob::Pattern` has no brace support. Nested braces are handled by
/// repeated expansion; the total is capped.
fn expand_braces(pattern: &str) -> Result<Vec<String>, String> {
    let mut queue = vec![pattern.to_string()];
    let mut done = Vec::new();
    while let Some(current) = queue.pop() {
        match split_first_brace(&current) {
            Some((prefix, alternatives, suffix)) => {
                for alt in alternatives {
                    queue.push(format!("{prefix}{alt}{suffix}"));
                    if queue.len() + done.len() > MAX_BRACE_EXPANSIONS {
                        return Err(format!(
                            "brace expansion exceeds {} alternatives",
                            MAX_BRACE_EXPANSIONS
                        ));
                    }
                }
            }
            None => done.push(current),
        }
    }
    Ok(done)
}

/// Split `prefix{a,b}suffix` at the first balanced brace group. Returns
/// `None` when the pattern has no (complete) group.
fn split_first_brace(pattern: &str) -> Option<(&str, Vec<&str>, &str)> {
    let open = pattern.find('{')?;
    let mut depth = 0usize;
    let mut close = None;
    let mut cuts = Vec::new();
    for (i, c) in pattern[open..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    close = Some(open + i);
                    break;
                }
            }
            ',' if depth == 1 => cuts.push(open + i),
            _ => {}
        }
    }
    let close = close?;
    let mut alternatives = Vec::with_capacity(cuts.len() + 1);
    let mut start = open + 1;
    for cut in cuts {
        alternatives.push(&pattern[start..cut]);
        start = cut + 1;
    }
    alternatives.push(&pattern[start..close]);
    Some((&pattern[..open], alternatives, &pattern[close + 1..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(patterns: &[&str]) -> PatternList {
        let raw: Vec<String> = patterns.iter().map(|s| s.to_string()).collect();
        let (list, warnings) = PatternList::compile(&raw);
        assert!(warnings.is_empty(), "unexpected warnings: {:?}", warnings);
        list
    }

    #[test]
    fn test_to_posix_joins_with_forward_slash() {
        let p = Path::new("blog").join("posts").join("a.md");
        assert_eq!(to_posix(&p), "blog/posts/a.md");
    }

    #[test]
    fn test_relative_posix_strips_root() {
        let root = Path::new("/site/src");
        let p = Path::new("/site/src/blog/a.md");
        assert_eq!(relative_posix(p, root), "blog/a.md");
    }

    #[test]
    fn test_normalize_lexical_resolves_dots() {
        let p = Path::new("/root/a/./b/../c");
        assert_eq!(normalize_lexical(p), Some(PathBuf::from("/root/a/c")));
    }

    #[test]
    fn test_normalize_lexical_rejects_escape() {
        assert_eq!(normalize_lexical(Path::new("a/../../b")), None);
    }

    #[test]
    fn test_star_does_not_cross_separator() {
        let l = list(&["blog/*.md"]);
        assert!(l.matches("blog/a.md"));
        assert!(!l.matches("blog/sub/a.md"));
    }

    #[test]
    fn test_double_star_crosses_segments() {
        let l = list(&["**/blog/**"]);
        assert!(l.matches("blog/a.md"), "leading ** matches zero segments");
        assert!(l.matches("site/blog/deep/a.md"));
        assert!(!l.matches("other/a.md"));
    }

    #[test]
    fn test_last_match_wins_with_negation() {
        let l = list(&["**/blog/**", "!**/blog/featured/**"]);
        assert!(l.matches("blog/regular.md"));
        assert!(
            !l.matches("blog/featured/post.md"),
            "trailing negation re-includes the path"
        );
    }

    #[test]
    fn test_negation_then_rematch() {
        let l = list(&["**/*.md", "!drafts/**", "drafts/ready.md"]);
        assert!(l.matches("notes/a.md"));
        assert!(!l.matches("drafts/wip.md"));
        assert!(l.matches("drafts/ready.md"), "later entry wins over negation");
    }

    #[test]
    fn test_brace_alternation() {
        let l = list(&["**/*.{png,jpg}"]);
        assert!(l.matches("images/a.png"));
        assert!(l.matches("images/b.jpg"));
        assert!(!l.matches("images/c.gif"));
    }

    #[test]
    fn test_nested_braces() {
        let expanded = expand_braces("a{b,c{d,e}}f").unwrap();
        let mut expanded = expanded;
        expanded.sort();
        assert_eq!(expanded, vec!["abf", "acdf", "acef"]);
    }

    #[test]
    fn test_question_mark_single_char() {
        let l = list(&["file?.txt"]);
        assert!(l.matches("file1.txt"));
        assert!(!l.matches("file12.txt"));
        assert!(!l.matches("dir/file1.txt"));
    }

    #[test]
    fn test_character_class() {
        let l = list(&["page[0-9].html"]);
        assert!(l.matches("page3.html"));
        assert!(!l.matches("pagex.html"));
    }

    #[test]
    fn test_matching_pattern_reports_deciding_entry() {
        let l = list(&["**/blog/**", "!**/blog/featured/**"]);
        assert_eq!(l.matching_pattern("blog/regular.md"), Some("**/blog/**"));
        assert_eq!(l.matching_pattern("blog/featured/post.md"), None);
    }

    #[test]
    fn test_invalid_pattern_becomes_warning() {
        let (l, warnings) = PatternList::compile(&["[".to_string(), "ok/**".to_string()]);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].pattern, "[");
        assert!(l.matches("ok/file.txt"), "valid entries still compile");
    }

    #[test]
    fn test_nul_byte_rejected() {
        assert!(check_pattern("bad\0pattern").is_err());
    }

    #[test]
    fn test_oversize_pattern_rejected() {
        let huge = "a".repeat(MAX_PATTERN_LEN + 1);
        assert!(check_pattern(&huge).is_err());
    }

    #[test]
    fn test_wildcard_blowup_rejected() {
        let hostile = "*".repeat(MAX_PATTERN_WILDCARDS + 1);
        assert!(check_pattern(&hostile).is_err());
    }

    #[test]
    fn test_brace_expansion_cap() {
        // 4 groups of 4 alternatives = 256 expansions, over the cap.
        let hostile = "{a,b,c,d}{a,b,c,d}{a,b,c,d}{a,b,c,d}";
        let (_, warnings) = PatternList::compile(&[hostile.to_string()]);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_empty_list_matches_nothing() {
        let l = PatternList::default();
        assert!(l.is_empty());
        assert!(!l.matches("anything"));
    }
}
