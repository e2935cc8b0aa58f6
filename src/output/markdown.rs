//! Markdown output for reports shared in PRs and chat.

use super::human::format_duration;
use super::{AlignResult, BootstrapResult, CommitResult, Formatter, PreviewResult};
use engine::Severity;
use std::fmt::Write;

pub struct MarkdownFormatter;

impl Formatter for MarkdownFormatter {
    fn bootstrap(&self, result: &BootstrapResult) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# Infrastructure Bootstrap\n");

        let _ = writeln!(out, "## Summary\n");
        let _ = writeln!(out, "**Status:** {}", status_line(result.success));
        let _ = writeln!(out, "**Duration:** {}", format_duration(result.duration));
        let _ = writeln!(out, "**Resources:** {}", result.resource_count);
        let _ = writeln!(out, "**Modules loaded:** {}\n", result.modules_loaded);

        if !result.providers_installed.is_empty() {
            let _ = writeln!(out, "## Providers Installed\n");
            for provider in &result.providers_installed {
                let _ = writeln!(out, "- {provider}");
            }
            let _ = writeln!(out);
        }

        if !result.policy_violations.is_empty() {
            let _ = writeln!(out, "## Policy Violations\n");
            for violation in &result.policy_violations {
                let _ = writeln!(
                    out,
                    "- {} **{}** ({}): {}",
                    severity_icon(violation.severity),
                    violation.resource_id,
                    violation.rule_name,
                    violation.message
                );
            }
            let _ = writeln!(out);
        }

        write_error(&mut out, &result.error);
        out
    }

    fn preview(&self, result: &PreviewResult) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# Infrastructure Preview\n");

        let _ = writeln!(out, "## Summary\n");
        let _ = writeln!(out, "**Status:** {}", status_line(result.success));
        let _ = writeln!(out, "**Duration:** {}", format_duration(result.duration));
        let _ = writeln!(out, "**Changes detected:** {}", result.changes.len());
        let _ = writeln!(out, "**Drift detected:** {}\n", result.has_drift());

        if !result.changes.is_empty() {
            let _ = writeln!(out, "## Planned Changes\n");
            for change in &result.changes {
                let _ = writeln!(
                    out,
                    "- {} `{}.{}`",
                    change.kind, change.resource_kind, change.resource_name
                );
                if !change.description.is_empty() {
                    let _ = writeln!(out, "  - {}", change.description);
                }
            }
            let _ = writeln!(out);
        }

        if !result.drift_results.is_empty() {
            let _ = writeln!(out, "## Drift Detection\n");
            for drift in &result.drift_results {
                if drift.has_drift {
                    let _ = writeln!(out, "- 🔄 **{}** (drift detected)", drift.resource_name);
                    for change in &drift.changes {
                        let _ = writeln!(out, "  - {change}");
                    }
                } else {
                    let _ = writeln!(out, "- ✅ **{}** (no drift)", drift.resource_name);
                }
            }
            let _ = writeln!(out);
        }

        write_error(&mut out, &result.error);
        out
    }

    fn commit(&self, result: &CommitResult) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# Infrastructure Commit\n");

        let _ = writeln!(out, "## Summary\n");
        let _ = writeln!(out, "**Status:** {}", status_line(result.success));
        let _ = writeln!(
            out,
            "**Duration:** {}",
            format_duration(result.total_duration)
        );
        let _ = writeln!(out, "**Resources applied:** {}\n", result.resources_applied);

        if !result.execution_levels.is_empty() {
            let _ = writeln!(out, "## Execution Levels\n");
            for level in &result.execution_levels {
                let _ = writeln!(
                    out,
                    "- **Level {}** ({}): {}",
                    level.level,
                    format_duration(level.duration),
                    level.resources.join(", ")
                );
            }
            let _ = writeln!(out);
        }

        write_error(&mut out, &result.error);
        out
    }

    fn align(&self, result: &AlignResult) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# Infrastructure Alignment\n");

        let _ = writeln!(out, "## Summary\n");
        let _ = writeln!(out, "**Status:** {}", status_line(result.success));
        let _ = writeln!(out, "**Duration:** {}", format_duration(result.duration));
        let _ = writeln!(out, "**Drift detected:** {}", result.drift_detected);
        let _ = writeln!(out, "**Actions applied:** {}\n", result.actions_applied);

        if !result.resources.is_empty() {
            let _ = writeln!(out, "## Resources\n");
            for resource in &result.resources {
                let _ = writeln!(out, "- **{}**: {}", resource.name, resource.status);
                for change in &resource.changes {
                    let _ = writeln!(out, "  - {change}");
                }
            }
            let _ = writeln!(out);
        }

        write_error(&mut out, &result.error);
        out
    }
}

fn status_line(success: bool) -> &'static str {
    if success {
        "✅ Success"
    } else {
        "❌ Failed"
    }
}

fn severity_icon(severity: Severity) -> &'static str {
    match severity {
        Severity::Error => "❌",
        Severity::Warning => "⚠️",
        Severity::Info => "ℹ️",
    }
}

fn write_error(out: &mut String, error: &Option<String>) {
    if let Some(error) = error {
        let _ = writeln!(out, "## Error\n");
        let _ = writeln!(out, "```\n{error}\n```\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn bootstrap_markdown_sections() {
        let result = BootstrapResult {
            success: true,
            providers_installed: vec!["aws".into()],
            resource_count: 2,
            modules_loaded: 0,
            policy_violations: Vec::new(),
            duration: Duration::from_secs(1),
            error: None,
        };
        let text = MarkdownFormatter.bootstrap(&result);
        assert!(text.contains("# Infrastructure Bootstrap"));
        assert!(text.contains("**Status:** ✅ Success"));
        assert!(text.contains("## Providers Installed"));
        assert!(!text.contains("## Error"));
    }

    #[test]
    fn error_section_renders_as_code_block() {
        let result = CommitResult {
            success: false,
            error: Some("node failed".into()),
            ..CommitResult::default()
        };
        let text = MarkdownFormatter.commit(&result);
        assert!(text.contains("**Status:** ❌ Failed"));
        assert!(text.contains("## Error"));
        assert!(text.contains("node failed"));
    }
}
