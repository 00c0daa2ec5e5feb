//! Dependency tracking for incremental rebuilds.
//!
//! Bidirectional maps between pages and the includes/layouts they use.
//! `record` replaces a page's outgoing edges atomically; reverse sets never
//! stay empty. `affected_pages` walks the reverse edges transitively with a
//! per-call visited set, so include graphs with user-authored cycles still
//! terminate in O(nodes + edges) of the reachable subgraph.

use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

#[derive(Debug, Default)]
pub struct DependencyTracker {
    includes_in_page: HashMap<PathBuf, Vec<PathBuf>>,
    pages_by_include: HashMap<PathBuf, HashSet<PathBuf>>,
    known_files: HashSet<PathBuf>,
}

/// Counters reported by [`DependencyTracker::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DependencyStats {
    pub total_files: usize,
    pub pages_with_dependencies: usize,
    pub include_files: usize,
    pub total_relationships: usize,
}

impl DependencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace `page`'s outgoing edges with `includes` followed by
    /// `layouts`, deduplicated in first-seen order. Reverse edges are kept
    /// consistent in the same call.
    pub fn record(&mut self, page: &Path, includes: &[PathBuf], layouts: &[PathBuf]) {
        self.remove_outgoing(page);

        let mut deps: Vec<PathBuf> = Vec::with_capacity(includes.len() + layouts.len());
        for dep in includes.iter().chain(layouts) {
            if !deps.contains(dep) {
                deps.push(dep.clone());
            }
        }

        self.known_files.insert(page.to_path_buf());
        for dep in &deps {
            self.known_files.insert(dep.clone());
            self.pages_by_include
                .entry(dep.clone())
                .or_default()
                .insert(page.to_path_buf());
        }
        if !deps.is_empty() {
            self.includes_in_page.insert(page.to_path_buf(), deps);
        }
    }

    /// Every page transitively depending on `dependency`, sorted for
    /// deterministic rebuild order.
    pub fn affected_pages(&self, dependency: &Path) -> Vec<PathBuf> {
        let mut visited: HashSet<&Path> = HashSet::new();
        let mut queue: VecDeque<&Path> = VecDeque::new();
        let mut affected: Vec<PathBuf> = Vec::new();
        queue.push_back(dependency);
        visited.insert(dependency);

        while let Some(current) = queue.pop_front() {
            let Some(pages) = self.pages_by_include.get(current) else {
                continue;
            };
            for page in pages {
                if visited.insert(page.as_path()) {
                    affected.push(page.clone());
                    queue.push_back(page.as_path());
                }
            }
        }
        affected.sort();
        affected
    }

    /// Direct dependencies recorded for a page, in recorded order.
    pub fn dependencies_of(&self, page: &Path) -> &[PathBuf] {
        self.includes_in_page
            .get(page)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// True when the path is known as a page or as a dependency.
    pub fn is_known(&self, file: &Path) -> bool {
        self.known_files.contains(file)
    }

    /// Forget `file`: drop its outgoing edges, remove it from every reverse
    /// set, and release emptied entries.
    pub fn remove(&mut self, file: &Path) {
        self.remove_outgoing(file);
        self.pages_by_include.retain(|_, pages| {
            pages.remove(file);
            !pages.is_empty()
        });
        self.known_files.remove(file);
    }

    pub fn clear(&mut self) {
        self.includes_in_page.clear();
        self.pages_by_include.clear();
        self.known_files.clear();
    }

    pub fn stats(&self) -> DependencyStats {
        DependencyStats {
            total_files: self.known_files.len(),
            pages_with_dependencies: self.includes_in_page.len(),
            include_files: self.pages_by_include.len(),
            total_relationships: self.includes_in_page.values().map(Vec::len).sum(),
        }
    }

    fn remove_outgoing(&mut self, page: &Path) {
        let Some(old) = self.includes_in_page.remove(page) else {
            return;
        };
        for dep in old {
            if let Some(pages) = self.pages_by_include.get_mut(&dep) {
                pages.remove(page);
                if pages.is_empty() {
                    self.pages_by_include.remove(&dep);
                }
            }
        }
    }

    /// Consistency check used by tests: every forward edge has its reverse
    /// edge and the converse, and no reverse set is empty.
    #[cfg(test)]
    fn check_invariants(&self) {
        for (page, deps) in &self.includes_in_page {
            for dep in deps {
                assert!(
                    self.pages_by_include
                        .get(dep)
                        .is_some_and(|pages| pages.contains(page)),
                    "forward edge ({}, {}) missing its reverse",
                    page.display(),
                    dep.display()
                );
            }
        }
        for (dep, pages) in &self.pages_by_include {
            assert!(!pages.is_empty(), "empty reverse set for {}", dep.display());
            for page in pages {
                assert!(
                    self.includes_in_page
                        .get(page)
                        .is_some_and(|deps| deps.contains(dep)),
                    "reverse edge ({}, {}) missing its forward",
                    dep.display(),
                    page.display()
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> PathBuf {
        PathBuf::from(s)
    }

    #[test]
    fn test_record_builds_both_directions() {
        let mut tracker = DependencyTracker::new();
        tracker.record(&p("page.html"), &[p("_nav.html")], &[p("_layout.html")]);
        tracker.check_invariants();
        assert_eq!(
            tracker.dependencies_of(&p("page.html")),
            &[p("_nav.html"), p("_layout.html")]
        );
        assert_eq!(tracker.affected_pages(&p("_nav.html")), vec![p("page.html")]);
        assert_eq!(
            tracker.affected_pages(&p("_layout.html")),
            vec![p("page.html")]
        );
    }

    #[test]
    fn test_record_replaces_previous_edges() {
        let mut tracker = DependencyTracker::new();
        tracker.record(&p("page.html"), &[p("_old.html")], &[]);
        tracker.record(&p("page.html"), &[p("_new.html")], &[]);
        tracker.check_invariants();
        assert!(tracker.affected_pages(&p("_old.html")).is_empty());
        assert_eq!(tracker.affected_pages(&p("_new.html")), vec![p("page.html")]);
    }

    #[test]
    fn test_record_dedups_include_and_layout_overlap() {
        let mut tracker = DependencyTracker::new();
        tracker.record(
            &p("page.html"),
            &[p("_shared.html"), p("_shared.html")],
            &[p("_shared.html")],
        );
        assert_eq!(tracker.dependencies_of(&p("page.html")), &[p("_shared.html")]);
        assert_eq!(tracker.stats().total_relationships, 1);
    }

    #[test]
    fn test_remove_releases_empty_reverse_entries() {
        let mut tracker = DependencyTracker::new();
        tracker.record(&p("a.html"), &[p("_d1.html"), p("_d2.html")], &[]);
        tracker.record(&p("b.html"), &[p("_d1.html")], &[]);
        tracker.remove(&p("a.html"));
        tracker.check_invariants();
        assert!(tracker.affected_pages(&p("_d2.html")).is_empty());
        assert_eq!(tracker.affected_pages(&p("_d1.html")), vec![p("b.html")]);
        assert!(!tracker.is_known(&p("a.html")));
    }

    #[test]
    fn test_remove_file_that_is_also_dependency() {
        let mut tracker = DependencyTracker::new();
        tracker.record(&p("page.html"), &[p("fragment.html")], &[]);
        tracker.record(&p("fragment.html"), &[p("_inner.html")], &[]);
        tracker.remove(&p("fragment.html"));
        tracker.check_invariants();
        // fragment's own edges are gone, and page no longer reaches it.
        assert!(tracker.affected_pages(&p("_inner.html")).is_empty());
        assert!(tracker.affected_pages(&p("fragment.html")).is_empty());
    }

    #[test]
    fn test_affected_pages_transitive() {
        let mut tracker = DependencyTracker::new();
        // page includes fragment; fragment (as a page) includes _deep
        tracker.record(&p("page.html"), &[p("fragment.html")], &[]);
        tracker.record(&p("fragment.html"), &[p("_deep.html")], &[]);
        let affected = tracker.affected_pages(&p("_deep.html"));
        assert_eq!(affected, vec![p("fragment.html"), p("page.html")]);
    }

    #[test]
    fn test_affected_pages_terminates_on_cycles() {
        let mut tracker = DependencyTracker::new();
        tracker.record(&p("a.html"), &[p("b.html")], &[]);
        tracker.record(&p("b.html"), &[p("a.html")], &[]);
        let affected = tracker.affected_pages(&p("a.html"));
        assert_eq!(affected, vec![p("b.html")]);
        let affected = tracker.affected_pages(&p("b.html"));
        assert_eq!(affected, vec![p("a.html")]);
    }

    #[test]
    fn test_clear_releases_everything() {
        let mut tracker = DependencyTracker::new();
        tracker.record(&p("page.html"), &[p("_nav.html")], &[p("_layout.html")]);
        tracker.clear();
        assert_eq!(tracker.stats().total_files, 0);
        assert_eq!(tracker.stats().total_relationships, 0);
        assert!(tracker.affected_pages(&p("_nav.html")).is_empty());
    }

    #[test]
    fn test_stats_counts() {
        let mut tracker = DependencyTracker::new();
        tracker.record(&p("a.html"), &[p("_x.html")], &[p("_l.html")]);
        tracker.record(&p("b.html"), &[p("_x.html")], &[]);
        let stats = tracker.stats();
        assert_eq!(stats.total_files, 4);
        assert_eq!(stats.pages_with_dependencies, 2);
        assert_eq!(stats.include_files, 2);
        assert_eq!(stats.total_relationships, 3);
    }

    #[test]
    fn test_record_empty_deps_leaves_no_entry() {
        let mut tracker = DependencyTracker::new();
        tracker.record(&p("page.html"), &[], &[]);
        assert_eq!(tracker.stats().pages_with_dependencies, 0);
        assert!(tracker.is_known(&p("page.html")));
    }

    #[test]
    fn test_affected_pages_cycle_a() {
        // affected_pages(a) where a depends on b and b on a: both reachable
        // sides terminate and neither includes the start node itself.
        let mut tracker = DependencyTracker::new();
        tracker.record(&p("a.html"), &[p("b.html")], &[]);
        tracker.record(&p("b.html"), &[p("a.html")], &[]);
        tracker.check_invariants();
        assert!(!tracker.affected_pages(&p("a.html")).contains(&p("a.html")));
    }
}
