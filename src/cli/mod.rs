//! water-scan CLI module
//!
//! The binary takes no operational flags; settings come from
//! [`crate::config::PipelineConfig`]. This module only parses `--help` /
//! `--version` and prints the final summary.

use clap::Parser;
use colored::*;

use crate::pipeline::PipelineReport;

// ─── Styling helpers ───────────────────────────────────────────────────────────

const W: usize = 58; // box inner width

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }
fn warn(s: &str) -> ColoredString   { s.truecolor(230, 180, 80) }

fn line_box_top()    { println!("  {}", dim("┌─────────────────────────────────────────────────────────┐")); }
fn line_box_bottom() { println!("  {}", dim("└─────────────────────────────────────────────────────────┘")); }
fn line_box_sep()    { println!("  {}", dim("├─────────────────────────────────────────────────────────┤")); }

fn line_box(content: &str) {
    let visible_len = strip_ansi(content).chars().count();
    let pad = W.saturating_sub(visible_len);
    println!("  {}  {}{} {}", dim("│"), content, " ".repeat(pad), dim("│"));
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::new();
    let mut in_escape = false;
    for c in s.chars() {
        if c == '\x1b' { in_escape = true; continue; }
        if in_escape { if c == 'm' { in_escape = false; } continue; }
        out.push(c);
    }
    out
}

fn kv(key: &str, val: &str) -> String {
    format!("{} {}", muted(&format!("{:<22}", key)), val.white())
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

/// Format a metric, rendering NaN as "n/a"
fn metric(value: f64) -> String {
    if value.is_nan() {
        "n/a".to_string()
    } else {
        format!("{:.4}", value)
    }
}

#[derive(Parser, Debug)]
#[command(name = "water-scan")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Water potability classification: impute, balance, search, track and register")]
#[command(long_about = None)]
pub struct Cli {}

pub fn print_banner() {
    println!();
    println!("  {}", "water-scan".truecolor(120, 170, 255).bold());
    println!("  {}", dim(&format!("potability pipeline  ·  v{}", env!("CARGO_PKG_VERSION"))));
}

/// Print the final results of a run
pub fn print_summary(report: &PipelineReport) {
    section("Data");
    line_box_top();
    line_box(&kv("experiment", &report.experiment_name));
    line_box(&kv("missing before", &report.missing_before.total().to_string()));
    line_box(&kv("missing after", &report.missing_after.total().to_string()));
    line_box_sep();
    line_box(&kv(
        "train rows",
        &format!("{} → {} (balanced)", report.n_train_before_balance, report.n_train),
    ));
    line_box(&kv("test rows", &report.n_test.to_string()));
    line_box_bottom();

    section("Search");
    line_box_top();
    line_box(&kv("trials", &report.n_trials.to_string()));
    let failed = if report.failed_trial_logs == 0 {
        ok("0").to_string()
    } else {
        warn(&report.failed_trial_logs.to_string()).to_string()
    };
    line_box(&kv("untracked trials", &failed));
    line_box(&kv("best search accuracy", &metric(report.best_search_accuracy)));
    for (name, value) in &report.best_params {
        line_box(&kv(name, &value.to_string()));
    }
    line_box_bottom();

    section("Final model");
    line_box_top();
    line_box(&kv("final_accuracy", &accent(&metric(report.final_accuracy)).to_string()));
    line_box(&kv("precision", &metric(report.final_metrics.precision)));
    line_box(&kv("recall", &metric(report.final_metrics.recall)));
    line_box(&kv("f1_score", &metric(report.final_metrics.f1_score)));
    line_box(&kv("balanced_accuracy", &metric(report.final_metrics.balanced_accuracy)));
    line_box(&kv("roc_auc", &metric(report.final_metrics.roc_auc)));
    line_box_sep();
    for (name, importance) in report.importances.iter().take(5) {
        line_box(&kv(name, &format!("{:.4}", importance)));
    }
    line_box_bottom();

    println!();
    for line in report.classification_report.lines() {
        println!("  {}", line);
    }

    section("Registry");
    println!(
        "  {} Model '{}' (version {}) promoted to '{}'",
        ok("✓"),
        report.registered.name,
        report.registered.version,
        report.registered.current_stage
    );
    println!("  {}", dim(&report.model_uri));
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_ansi() {
        let colored = ok("done").to_string();
        assert_eq!(strip_ansi(&colored), "done");
    }

    #[test]
    fn test_metric_formats_nan() {
        assert_eq!(metric(f64::NAN), "n/a");
        assert_eq!(metric(0.5), "0.5000");
    }

    #[test]
    fn test_cli_has_no_flags() {
        assert!(Cli::try_parse_from(["water-scan"]).is_ok());
        assert!(Cli::try_parse_from(["water-scan", "--trials", "3"]).is_err());
    }
}
