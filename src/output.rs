//! CLI output formatting for every command.
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects. Diagnostics go to stderr
//! through `tracing`; this module is only the human-facing report.
//!
//! # Output Format
//!
//! ## Budget
//!
//! ```text
//! index.html
//!     ✓ Document     12.40KB / 50KB (25%)
//!     ✗ Script       21.03KB / 20KB (105%)
//!
//! Skipping now.html (not found)
//!
//! 0/1 pages within budget
//! ```
//!
//! ## Check
//!
//! ```text
//! error   index.html  single-h1  expected exactly one <h1>, found 2
//! warning index.html  description  description should be longer than 50 characters
//!
//! Checked 2 files: 1 error, 1 warning
//! ```
//!
//! ## Service worker
//!
//! ```text
//! Installed portfolio-v1.0.0
//!     200 http://localhost:8080/  (1.2 KB)
//! Active portfolio-v1.0.0
//!     Deleted portfolio-v0.9.0
//! ```

use crate::audit::{AuditReport, Severity};
use crate::budget::BudgetReport;
use crate::config::{ImageFormat, OgConfig};
use crate::htmlfix::FixResult;
use crate::optimize::{ImageOutcome, picture_snippet};
use crate::sw::{DeclineReason, FetchOutcome, InstallReport, Request, SweepReport};
use std::path::Path;

// ============================================================================
// Shared helpers
// ============================================================================

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn mark(ok: bool) -> &'static str {
    if ok { "✓" } else { "✗" }
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

fn human_size(bytes: usize) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    }
}

// ============================================================================
// Budget
// ============================================================================

pub fn format_budget_report(report: &BudgetReport) -> Vec<String> {
    let mut lines = Vec::new();
    for page in &report.pages {
        lines.push(page.page.clone());
        for check in &page.checks {
            lines.push(format!(
                "{}{} {:<12} {:.2}KB / {}KB ({}%)",
                indent(1),
                mark(check.within),
                check.resource.to_string(),
                check.size,
                check.budget,
                check.percentage
            ));
        }
        lines.push(String::new());
    }
    for page in &report.skipped {
        lines.push(format!("Skipping {page} (not found)"));
    }
    if !report.skipped.is_empty() {
        lines.push(String::new());
    }
    lines.push(format!(
        "{}/{} pages within budget",
        report.passed_count(),
        report.pages.len()
    ));
    if !report.passed() {
        lines.push("Budget exceeded! Optimize before committing.".to_string());
    }
    lines
}

pub fn print_budget_report(report: &BudgetReport) {
    print_lines(&format_budget_report(report));
}

// ============================================================================
// Check
// ============================================================================

pub fn format_audit_report(report: &AuditReport) -> Vec<String> {
    let mut findings: Vec<_> = report.findings.iter().collect();
    // Errors first, then by file; rule order inside a file is kept.
    findings.sort_by(|a, b| b.severity.cmp(&a.severity).then(a.target.cmp(&b.target)));

    let mut lines: Vec<String> = findings
        .iter()
        .map(|f| {
            let label = match f.severity {
                Severity::Error => "error  ",
                Severity::Warning => "warning",
            };
            format!("{label} {}  {}  {}", f.target, f.rule, f.message)
        })
        .collect();
    if !lines.is_empty() {
        lines.push(String::new());
    }
    lines.push(format!(
        "Checked {}: {}, {}",
        plural(report.checked.len(), "file"),
        plural(report.errors(), "error"),
        plural(report.warnings(), "warning")
    ));
    lines
}

pub fn print_audit_report(report: &AuditReport) {
    print_lines(&format_audit_report(report));
}

// ============================================================================
// Service worker
// ============================================================================

pub fn format_install_report(report: &InstallReport) -> Vec<String> {
    let mut lines = vec![format!("Installed {}", report.cache_name)];
    for (key, status, size) in &report.entries {
        lines.push(format!("{}{status} {key}  ({})", indent(1), human_size(*size)));
    }
    lines
}

pub fn format_sweep_report(report: &SweepReport) -> Vec<String> {
    let mut lines = vec![format!("Active {}", report.cache_name)];
    if report.deleted.is_empty() && report.failed.is_empty() {
        lines.push(format!("{}No stale generations", indent(1)));
    }
    for name in &report.deleted {
        lines.push(format!("{}Deleted {name}", indent(1)));
    }
    for (name, error) in &report.failed {
        lines.push(format!("{}Kept {name}: {error}", indent(1)));
    }
    lines
}

pub fn format_fetch_outcome(request: &Request, outcome: &FetchOutcome) -> Vec<String> {
    let head = format!("{} {}", request.method, request.url);
    let source = match outcome {
        FetchOutcome::Declined(DeclineReason::NotControlling) => {
            return vec![format!("{head} → passed through (controller not active)")];
        }
        FetchOutcome::Declined(DeclineReason::Method(m)) => {
            return vec![format!("{head} → passed through ({m} is not intercepted)")];
        }
        FetchOutcome::Declined(DeclineReason::Origin) => {
            return vec![format!("{head} → passed through (cross-origin, not https)")];
        }
        FetchOutcome::Cached(_) => "cache",
        FetchOutcome::Network(_) => "network",
        FetchOutcome::OfflineFallback(_) => "offline fallback",
    };
    let mut lines = vec![format!("{head} → {source}")];
    if let Some(response) = outcome.response() {
        lines.push(format!(
            "{}{} {}  ({})",
            indent(1),
            response.status,
            response.content_type().unwrap_or("-"),
            human_size(response.body.len())
        ));
    }
    lines
}

/// `generations` is (name, keys) in storage order; `current` is marked.
pub fn format_generations(generations: &[(String, Vec<String>)], current: &str) -> Vec<String> {
    if generations.is_empty() {
        return vec!["No cache generations".to_string()];
    }
    let mut lines = Vec::new();
    for (name, keys) in generations {
        let marker = if name == current { " (current)" } else { "" };
        lines.push(format!("{name}{marker}: {}", plural(keys.len(), "key")));
        for key in keys {
            lines.push(format!("{}{key}", indent(1)));
        }
    }
    lines
}

pub fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{}", line);
    }
}

// ============================================================================
// fix-html
// ============================================================================

pub fn format_fix_results(results: &[FixResult]) -> Vec<String> {
    let mut lines: Vec<String> = results
        .iter()
        .map(|r| {
            if r.changed {
                format!("✓ Fixed {}", r.file)
            } else {
                format!("  {} already clean", r.file)
            }
        })
        .collect();
    let changed = results.iter().filter(|r| r.changed).count();
    lines.push(format!("{changed} of {} changed", plural(results.len(), "file")));
    lines
}

pub fn print_fix_results(results: &[FixResult]) {
    print_lines(&format_fix_results(results));
}

// ============================================================================
// Cards
// ============================================================================

pub fn format_cards_output(written: &[impl AsRef<Path>], og: &OgConfig) -> Vec<String> {
    let mut lines: Vec<String> = written
        .iter()
        .map(|p| format!("✓ Generated {}", p.as_ref().display()))
        .collect();
    let pngs: Vec<String> = og
        .cards
        .iter()
        .map(|c| Path::new(&c.filename).with_extension("png").display().to_string())
        .collect();
    lines.push(String::new());
    lines.push("To create PNG images from these cards:".to_string());
    lines.push("1. Open each HTML file in a browser (1200x630 viewport)".to_string());
    lines.push("2. Take a screenshot or use browser dev tools".to_string());
    lines.push(format!("3. Save as {}", pngs.join(", ")));
    if let (Some(card), Some(png)) = (og.cards.first(), pngs.first()) {
        lines.push(String::new());
        lines.push("Or with a headless browser:".to_string());
        lines.push(format!(
            "{}chromium --headless --window-size=1200,630 --screenshot={png} {}/{}",
            indent(1),
            og.output_dir,
            card.filename
        ));
    }
    lines
}

// ============================================================================
// optimize-images
// ============================================================================

pub fn format_optimize_results(results: &[ImageOutcome], formats: &[ImageFormat]) -> Vec<String> {
    let mut lines = Vec::new();
    for outcome in results {
        match outcome {
            ImageOutcome::Converted {
                source,
                original_kb,
                dimensions,
                conversions,
            } => {
                lines.push(format!(
                    "✓ {source} ({}x{}, {original_kb:.1}KB)",
                    dimensions.width, dimensions.height
                ));
                for c in conversions {
                    lines.push(format!(
                        "{}{} {:.1}KB ({}% smaller)",
                        indent(1),
                        c.output,
                        c.size_kb,
                        c.savings_percent
                    ));
                }
            }
            ImageOutcome::Skipped { source } => {
                lines.push(format!("⚠ Skipping {source} (not found)"));
            }
            ImageOutcome::Failed { source, error } => {
                lines.push(format!("✗ Failed to convert {source}: {error}"));
            }
        }
    }

    let converted: Vec<_> = results
        .iter()
        .filter(|r| matches!(r, ImageOutcome::Converted { .. }))
        .collect();
    if !converted.is_empty() {
        lines.push(String::new());
        lines.push("HTML <picture> snippets:".to_string());
        for outcome in converted {
            lines.push(String::new());
            lines.push(format!("<!-- {} -->", outcome.source()));
            lines.push(picture_snippet(outcome.source(), formats).into_string());
        }
    }
    lines
}

pub fn print_optimize_results(results: &[ImageOutcome], formats: &[ImageFormat]) {
    print_lines(&format_optimize_results(results, formats));
}
