//! Human-readable output.

use super::{AlignResult, BootstrapResult, CommitResult, Formatter, PreviewResult};
use engine::{has_errors, Severity};
use std::fmt::Write;
use std::time::Duration;

pub struct HumanFormatter;

impl Formatter for HumanFormatter {
    fn bootstrap(&self, result: &BootstrapResult) -> String {
        let mut out = String::new();

        if result.success {
            let _ = writeln!(out, "✔ Bootstrap complete!");
        } else {
            let _ = writeln!(out, "✗ Bootstrap failed!");
        }

        if !result.providers_installed.is_empty() {
            let _ = writeln!(
                out,
                "✔ Installed {} provider(s): {}",
                result.providers_installed.len(),
                result.providers_installed.join(", ")
            );
        }

        let _ = writeln!(out, "✔ Found {} resource instances", result.resource_count);

        if result.modules_loaded > 0 {
            let _ = writeln!(out, "✔ Loaded {} modules", result.modules_loaded);
        }

        if result.policy_violations.is_empty() {
            let _ = writeln!(out, "✔ No policy violations found");
        } else {
            let _ = writeln!(
                out,
                "⚠ Found {} policy violations:",
                result.policy_violations.len()
            );
            for violation in &result.policy_violations {
                let _ = writeln!(
                    out,
                    "  {} {}: {}",
                    severity_icon(violation.severity),
                    violation.resource_id,
                    violation.message
                );
            }
            if has_errors(&result.policy_violations) {
                let _ = writeln!(out, "✗ Error-severity violations block execution");
            }
        }

        if let Some(error) = &result.error {
            let _ = writeln!(out, "✗ Error: {error}");
        }

        out
    }

    fn preview(&self, result: &PreviewResult) -> String {
        let mut out = String::new();

        if result.changes.is_empty() {
            let _ = writeln!(out, "✔ No changes detected");
        } else {
            let _ = writeln!(out, "Changes detected:\n");
            let creates = result.changes.iter().filter(|c| c.kind == "create").count();
            let updates = result.changes.iter().filter(|c| c.kind == "update").count();
            let deletes = result.changes.iter().filter(|c| c.kind == "delete").count();
            if creates > 0 {
                let _ = writeln!(out, "+ {creates} resource(s) will be created");
            }
            if updates > 0 {
                let _ = writeln!(out, "~ {updates} resource(s) will be updated");
            }
            if deletes > 0 {
                let _ = writeln!(out, "- {deletes} resource(s) will be removed");
            }

            let _ = writeln!(out, "\nDetailed changes:");
            for change in &result.changes {
                let _ = writeln!(
                    out,
                    "{} {} {}.{}",
                    change_icon(&change.kind),
                    title_case(&change.kind),
                    change.resource_kind,
                    change.resource_name
                );
            }
        }

        if result.has_drift() {
            let _ = writeln!(out, "\nDrift detected:");
            for drift in result.drift_results.iter().filter(|d| d.has_drift) {
                let _ = writeln!(out, "  • {}", drift.resource_name);
                for change in &drift.changes {
                    let _ = writeln!(out, "    - {change}");
                }
            }
        }

        match &result.error {
            Some(error) => {
                let _ = writeln!(out, "\n✗ Error: {error}");
            }
            None if !result.changes.is_empty() => {
                let _ = writeln!(out, "\nNext: run 'runestone commit' to apply these changes.");
            }
            None => {}
        }

        out
    }

    fn commit(&self, result: &CommitResult) -> String {
        let mut out = String::new();

        for level in &result.execution_levels {
            let _ = writeln!(
                out,
                "--- Execution Level {} ({}) ---",
                level.level,
                format_duration(level.duration)
            );
            for resource in &level.resources {
                let _ = writeln!(out, "  {resource}");
            }
        }

        let _ = writeln!(out, "--- Execution Complete ---");
        if result.success {
            let _ = writeln!(
                out,
                "✔ Commit complete (duration: {})",
                format_duration(result.total_duration)
            );
            let _ = writeln!(out, "+ Applied {} resources", result.resources_applied);
        } else {
            let _ = writeln!(out, "✗ Commit completed with errors");
            if let Some(error) = &result.error {
                let _ = writeln!(out, "Error: {error}");
            }
        }

        out
    }

    fn align(&self, result: &AlignResult) -> String {
        let mut out = String::new();

        if result.drift_detected {
            let _ = writeln!(
                out,
                "🔄 Drift detected, {} action(s) applied",
                result.actions_applied
            );
            for resource in &result.resources {
                let _ = writeln!(
                    out,
                    "  {} {} ({})",
                    status_icon(&resource.status),
                    resource.name,
                    resource.status
                );
                for change in &resource.changes {
                    let _ = writeln!(out, "    - {change}");
                }
            }
        } else {
            let _ = writeln!(out, "✔ Infrastructure aligned (no drift detected)");
        }

        if let Some(error) = &result.error {
            let _ = writeln!(out, "✗ Error: {error}");
        }

        out
    }
}

fn severity_icon(severity: Severity) -> &'static str {
    match severity {
        Severity::Error => "✗",
        Severity::Warning => "⚠",
        Severity::Info => "ℹ",
    }
}

fn change_icon(kind: &str) -> &'static str {
    match kind {
        "create" => "+",
        "update" => "~",
        "delete" => "-",
        _ => "•",
    }
}

fn status_icon(status: &str) -> &'static str {
    match status {
        "aligned" => "✔",
        "drifted" => "🔄",
        "healed" => "🔧",
        "error" => "✗",
        _ => "•",
    }
}

fn title_case(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

pub(crate) fn format_duration(d: Duration) -> String {
    if d < Duration::from_secs(1) {
        format!("{}ms", d.as_millis())
    } else if d < Duration::from_secs(60) {
        format!("{:.1}s", d.as_secs_f64())
    } else {
        let secs = d.as_secs();
        format!("{}m{}s", secs / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::ChangeReport;

    #[test]
    fn durations_format_by_magnitude() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(2500)), "2.5s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m30s");
    }

    #[test]
    fn preview_lists_changes_and_next_step() {
        let result = PreviewResult {
            success: true,
            changes: vec![ChangeReport {
                kind: "create".into(),
                resource_kind: "aws:s3:bucket".into(),
                resource_name: "logs".into(),
                description: String::new(),
            }],
            drift_results: Vec::new(),
            duration: Duration::ZERO,
            error: None,
        };
        let text = HumanFormatter.preview(&result);
        assert!(text.contains("+ 1 resource(s) will be created"));
        assert!(text.contains("+ Create aws:s3:bucket.logs"));
        assert!(text.contains("runestone commit"));
    }

    #[test]
    fn empty_preview_reports_no_changes() {
        let text = HumanFormatter.preview(&PreviewResult {
            success: true,
            ..PreviewResult::default()
        });
        assert!(text.contains("No changes detected"));
        assert!(!text.contains("Next:"));
    }
}
