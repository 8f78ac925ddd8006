use crate::check::ConsistencyReport;
use crate::equality::canonical_string;
use crate::types::{BatchReport, CaseResult, Got, SuiteResult};
use crate::{t, t_args};
use colored::Colorize;
use serde_json::Value;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputKind {
    #[default]
    Normal,
    Terse,
    Json,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReportOptions {
    pub kind: OutputKind,
    pub hide_passes: bool,
    pub hide_fails: bool,
}

/// Renders a call the way it would be written: `fib(4)`.
pub fn render_invocation(name: &str, input: &[Value]) -> String {
    let args: Vec<String> = input.iter().map(canonical_string).collect();
    format!("{name}({})", args.join(", "))
}

fn render_got(got: &Got) -> String {
    match got {
        Got::Value(v) => canonical_string(v),
        Got::Error(e) => e.clone(),
    }
}

pub fn render(report: &BatchReport, opts: ReportOptions) -> String {
    match opts.kind {
        OutputKind::Json => render_json(report),
        OutputKind::Normal | OutputKind::Terse => render_human(report, opts),
    }
}

pub fn render_json(report: &BatchReport) -> String {
    serde_json::to_string_pretty(report).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
}

pub fn render_human(report: &BatchReport, opts: ReportOptions) -> String {
    let mut out = String::new();
    for suite in &report.tested {
        out.push_str(&render_suite(suite, opts));
    }
    for name in &report.missing {
        out.push_str(&format!(
            "{}\n",
            t_args!("report-missing", "name" => name).yellow()
        ));
    }
    let failed = report.failed_cases();
    out.push_str(&t_args!("report-totals",
        "total" => report.total_cases(),
        "passed" => report.passed_cases().to_string().green(),
        "failed" => if failed > 0 {
            failed.to_string().red().bold().to_string()
        } else {
            failed.to_string().green().to_string()
        },
        "missing" => report.missing.len()
    ));
    out.push('\n');
    out
}

fn render_suite(suite: &SuiteResult, opts: ReportOptions) -> String {
    let mut out = String::new();
    let line = t_args!("report-cases-passed",
        "passed" => suite.passed,
        "total" => suite.total
    );
    if opts.kind == OutputKind::Terse {
        let line = format!("{}: {line}", suite.name);
        let line = if suite.passed == suite.total {
            line.green()
        } else {
            line.red()
        };
        out.push_str(&format!("{line}\n"));
        return out;
    }

    out.push_str(&format!("{}\n", suite.name.bold().underline()));
    for case in &suite.results {
        if (case.passed && opts.hide_passes) || (!case.passed && opts.hide_fails) {
            continue;
        }
        out.push_str(&render_case(&suite.name, case));
    }
    out.push_str(&format!("{line}\n"));
    out
}

fn render_case(name: &str, case: &CaseResult) -> String {
    let call = render_invocation(name, &case.input);
    if case.passed {
        return format!("{} {}\n", "[OK]".green().bold(), call.green());
    }
    let mut out = format!("{} {}\n", "[FAIL]".red().bold(), call.red().bold());
    let label = match case.got {
        Got::Value(_) => t!("report-got"),
        Got::Error(_) => t!("report-error"),
    };
    out.push_str(&format!(
        "  {} {}\n",
        format!("{label:<9}:").bold(),
        render_got(&case.got)
    ));
    out.push_str(&format!(
        "  {} {}\n",
        format!("{:<9}:", t!("report-expected")).bold(),
        canonical_string(&case.expected)
    ));
    out
}

pub fn render_consistency(report: &ConsistencyReport) -> String {
    fn names(set: &BTreeSet<String>) -> String {
        set.iter().cloned().collect::<Vec<_>>().join(", ")
    }
    let mut lines = Vec::new();
    if report.sets_without_problems.is_empty() && report.unused_problem_sets.is_empty() {
        lines.push(t_args!("check-all-sets", "count" => report.set_count));
    } else {
        if !report.sets_without_problems.is_empty() {
            lines.push(t_args!("check-sets-without-problems",
                "names" => names(&report.sets_without_problems)));
        }
        if !report.unused_problem_sets.is_empty() {
            lines.push(t_args!("check-unused-sets",
                "names" => names(&report.unused_problem_sets)));
        }
    }
    if report.only_in_problem_sets.is_empty() && report.only_in_tests.is_empty() {
        lines.push(t_args!("check-all-tests", "count" => report.test_count));
    } else {
        if !report.only_in_problem_sets.is_empty() {
            lines.push(t_args!("check-only-in-problems",
                "names" => names(&report.only_in_problem_sets)));
        }
        if !report.only_in_tests.is_empty() {
            lines.push(t_args!("check-only-in-tests",
                "names" => names(&report.only_in_tests)));
        }
    }
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

pub fn print_human(report: &BatchReport, opts: ReportOptions) {
    print!("{}", render(report, opts));
}
