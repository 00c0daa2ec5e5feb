//! Terminal rendering of build reports.

use crate::args::ReportFormat;
use colored::Colorize;
use unify_core::{classify, BuildReport, DiagnosticLevel, LogLevel};

pub fn print(report: &BuildReport, format: ReportFormat, log_level: LogLevel) {
    match format {
        ReportFormat::Json => match serde_json::to_string_pretty(report) {
            Ok(json) => println!("{json}"),
            Err(err) => eprintln!("{} failed to serialize report: {err}", "error:".red()),
        },
        ReportFormat::Human => print_human(report, log_level),
    }
}

fn print_human(report: &BuildReport, log_level: LogLevel) {
    if report.dry_run {
        let debug = log_level == LogLevel::Debug;
        print!(
            "{}",
            classify::format_dry_run(&report.classifications, &report.layout_chains, debug)
        );
        println!(
            "{} nothing written (dry run)",
            "done:".bold()
        );
        return;
    }

    for diag in &report.diagnostics {
        let label = match diag.level {
            DiagnosticLevel::Security => "security".red().bold(),
            DiagnosticLevel::Error => "error".red(),
            DiagnosticLevel::Warning => "warning".yellow(),
            DiagnosticLevel::Info => "info".blue(),
        };
        println!(
            "{label} [{}] {}: {}",
            diag.code,
            diag.file.display(),
            diag.message
        );
        if let Some(suggestion) = &diag.suggestion {
            println!("  {} {suggestion}", "hint:".dimmed());
        }
    }

    let timing = report
        .build_time_ms
        .map(|ms| format!(" in {ms}ms"))
        .unwrap_or_default();
    let summary = format!(
        "built {} page(s), copied {} file(s), ignored {}, skipped {}{timing}",
        report.pages_built, report.files_copied, report.files_ignored, report.files_skipped
    );
    if report.error_count() > 0 || report.has_security_findings() {
        println!(
            "{} {summary} with {} error(s), {} warning(s)",
            "done:".red().bold(),
            report.error_count(),
            report.warning_count()
        );
    } else if report.warning_count() > 0 {
        println!(
            "{} {summary} with {} warning(s)",
            "done:".yellow().bold(),
            report.warning_count()
        );
    } else {
        println!("{} {summary}", "done:".green().bold());
    }
}
