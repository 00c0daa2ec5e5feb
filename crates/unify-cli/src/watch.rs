//! Watch mode: rebuild on filesystem change, incrementally where the
//! dependency graph allows it.

use crate::args::ReportFormat;
use crate::report;
use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebounceEventResult};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;
use unify_core::{BuildConfig, CancelToken, Orchestrator};

const DEBOUNCE: Duration = Duration::from_millis(400);

pub fn run(config: BuildConfig) -> anyhow::Result<()> {
    let log_level = config.log_level;
    let mut orch = Orchestrator::new(config)?;
    let report = orch.build()?;
    report::print(&report, ReportFormat::Human, log_level);

    let cancel = orch.cancel_token();
    let handler_cancel = cancel.clone();
    ctrlc::set_handler(move || handler_cancel.cancel())?;

    watch_loop(&mut orch, &cancel, log_level)
}

/// The debounced event loop, shared by `watch` and `serve`.
pub fn watch_loop(
    orch: &mut Orchestrator,
    cancel: &CancelToken,
    log_level: unify_core::LogLevel,
) -> anyhow::Result<()> {
    let (tx, rx) = mpsc::channel::<DebounceEventResult>();
    let mut debouncer = new_debouncer(DEBOUNCE, tx)?;
    debouncer
        .watcher()
        .watch(orch.source_root(), RecursiveMode::Recursive)?;
    tracing::info!("watching {}", orch.source_root().display());

    loop {
        if cancel.is_cancelled() {
            tracing::info!("watch stopped");
            return Ok(());
        }
        match rx.recv_timeout(Duration::from_millis(250)) {
            Ok(Ok(events)) => {
                let changed: Vec<PathBuf> = events.into_iter().map(|e| e.path).collect();
                handle_changes(orch, &changed, log_level);
            }
            Ok(Err(err)) => tracing::warn!("watch error: {err:?}"),
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => return Ok(()),
        }
    }
}

fn handle_changes(orch: &mut Orchestrator, changed: &[PathBuf], log_level: unify_core::LogLevel) {
    let relevant: Vec<&PathBuf> = changed
        .iter()
        .filter(|p| !p.starts_with(orch.output_root()))
        .collect();
    if relevant.is_empty() {
        return;
    }

    // Deletions and shared-convention changes (underscore files, the
    // project config) invalidate more than the graph records; rebuild
    // everything.
    let needs_full = relevant
        .iter()
        .any(|p| !p.exists() || is_shared_source(p));
    if needs_full {
        tracing::info!("shared file changed, full rebuild");
        for path in &relevant {
            if !path.exists() {
                orch.tracker()
                    .lock()
                    .expect("dependency tracker poisoned")
                    .remove(path);
            }
        }
        match orch.build() {
            Ok(report) => report::print(&report, ReportFormat::Human, log_level),
            Err(err) => tracing::error!("rebuild failed: {err}"),
        }
        return;
    }

    // Incremental: the changed files plus every page transitively
    // depending on them.
    let mut targets: BTreeSet<PathBuf> = BTreeSet::new();
    for path in &relevant {
        targets.insert((*path).clone());
        let affected = orch
            .tracker()
            .lock()
            .expect("dependency tracker poisoned")
            .affected_pages(path);
        targets.extend(affected);
    }

    let mut diagnostics = Vec::new();
    let mut rebuilt = 0usize;
    for target in &targets {
        if !target.exists() {
            continue;
        }
        diagnostics.extend(orch.build_page(target));
        rebuilt += 1;
    }
    tracing::info!("rebuilt {rebuilt} file(s)");
    for diag in diagnostics {
        tracing::warn!("[{}] {}: {}", diag.code, diag.file.display(), diag.message);
    }
}

/// Underscore-prefixed files are layouts/includes by convention; their
/// reverse edges may be stale, and `unify.toml` changes the configuration.
fn is_shared_source(path: &Path) -> bool {
    if path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n == unify_core::config::CONFIG_FILE_NAME)
    {
        return true;
    }
    path.components().any(|c| {
        c.as_os_str()
            .to_str()
            .is_some_and(|s| s.starts_with('_'))
    })
}
