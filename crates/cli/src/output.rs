//! Text rendering of run outcomes and hook listings

use lintel_engine::{HookResult, HookStatus, RunOutcome};
use owo_colors::OwoColorize;
use std::fmt::Write as _;
use std::time::Duration;

/// Width of a status line
const LINE_WIDTH: usize = 79;

/// Status word, coloured
fn status_label(status: HookStatus) -> String {
    let label = status.label();
    match status {
        HookStatus::Passed => label.green().to_string(),
        HookStatus::Failed => label.red().bold().to_string(),
        HookStatus::Modified => label.yellow().bold().to_string(),
        HookStatus::Skipped => label.dimmed().to_string(),
    }
}

/// Left column of a status line: the id, plus the display name when it differs
fn hook_label(hook_id: &str, name: &str) -> String {
    if name == hook_id {
        hook_id.to_string()
    } else {
        format!("{name} ({hook_id})")
    }
}

/// `label.......status (1.23s)` padded to [`LINE_WIDTH`]
fn status_line(label: &str, status: HookStatus, duration: Option<Duration>) -> String {
    let elapsed = duration
        .map(|d| format!(" ({:.2}s)", d.as_secs_f64()))
        .unwrap_or_default();
    let used = label.chars().count() + status.label().len() + elapsed.len();
    let dots = LINE_WIDTH.saturating_sub(used).max(3);
    format!(
        "{label}{}{}{}",
        ".".repeat(dots),
        status_label(status),
        elapsed.dimmed()
    )
}

fn details(out: &mut String, result: &HookResult, with_output: bool) {
    let _ = writeln!(out, "{}", format!("- hook id: {}", result.hook_id).dimmed());
    if result.exit_code != 0 {
        let _ = writeln!(
            out,
            "{}",
            format!("- exit code: {}", result.exit_code).dimmed()
        );
    }
    if result.modified {
        let _ = writeln!(out, "{}", "- files were modified by this hook".dimmed());
    }

    if with_output {
        for captured in [&result.stdout, &result.stderr] {
            let captured = captured.trim_end();
            if !captured.is_empty() {
                let _ = writeln!(out, "\n{captured}");
            }
        }
        out.push('\n');
    }
}

/// Render a run outcome as status lines in declaration order
///
/// Output of failed hooks is always shown; output of hooks that only
/// modified files is shown in verbose mode.
#[must_use]
pub fn render_outcome(outcome: &RunOutcome, verbose: bool) -> String {
    let mut out = String::new();

    for result in &outcome.results {
        let status = result.status();
        let _ = writeln!(
            out,
            "{}",
            status_line(
                &hook_label(&result.hook_id, &result.name),
                status,
                Some(result.duration)
            )
        );
        match status {
            HookStatus::Failed => details(&mut out, result, true),
            HookStatus::Modified => details(&mut out, result, verbose),
            HookStatus::Passed | HookStatus::Skipped => {}
        }
    }
    for skipped in &outcome.skipped {
        let _ = writeln!(
            out,
            "{}",
            status_line(
                &hook_label(&skipped.hook_id, &skipped.name),
                HookStatus::Skipped,
                None
            )
        );
    }

    if outcome.results.is_empty() && outcome.skipped.is_empty() {
        let _ = writeln!(out, "{}", "No hooks to run.".yellow());
        return out;
    }

    let count = |wanted: HookStatus| outcome.results.iter().filter(|r| r.status() == wanted).count();
    let _ = writeln!(
        out,
        "\n{} passed, {} failed, {} modified, {} skipped",
        count(HookStatus::Passed).green(),
        count(HookStatus::Failed).red(),
        count(HookStatus::Modified).yellow(),
        outcome.skipped.len().dimmed()
    );
    out
}
